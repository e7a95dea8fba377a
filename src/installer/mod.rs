//! Installer orchestrator
//!
//! Wires the lockfile, cache, cloud, registry and plugin subsystems into one
//! install run. Packages are independent units of work; one failing never
//! stops its siblings, only a fatal condition ends the run.

pub mod analyze;
pub mod orchestrator;
pub mod report;
pub mod scripts;

pub use analyze::{analyze, clean_modules, Analysis};
pub use orchestrator::Installer;
pub use report::{FailedPackage, InstallOutcome, InstallReport, PackageResult, PackageSource, PackageStatus};
pub use scripts::{lifecycle_order, link_bins, run_lifecycle_scripts, LIFECYCLE_EVENTS};
