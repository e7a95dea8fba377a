//! Terminal output for the CLI
//!
//! Uses `cliclack` for interactive terminals with automatic fallback to
//! plain `[OK]`/`[WARN]`/`[FAIL]` lines in CI and pipes.
//!
//! # Example
//!
//! ```rust,ignore
//! use packrat::ui::{self, UiContext, TaskSpinner};
//!
//! let ctx = UiContext::for_config(&config);
//! ui::intro(&ctx, "packrat restore");
//!
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Restoring snapshot...");
//! spinner.stop("Restored 412 packages");
//!
//! ui::outro_success(&ctx, "Done");
//! ```

mod context;
mod output;
mod progress;
mod prompts;
mod theme;

pub use context::UiContext;
pub use output::{
    intro, key_value, key_value_status, outro_error, outro_success, outro_warn, remark, section,
    step_error, step_error_detail, step_info, step_ok, step_ok_detail, step_warn, step_warn_hint,
};
pub use progress::{install_bar, TaskSpinner};
pub use prompts::confirm;
pub use theme::{init_theme, PackratTheme};
