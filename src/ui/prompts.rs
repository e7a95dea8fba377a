//! Confirmation prompt with CI/non-interactive fallback

use super::context::UiContext;
use crate::error::{PackratError, PackratResult};

/// Ask before a destructive action
///
/// `--yes` approves without asking; a non-interactive session gets
/// `default`.
pub async fn confirm(ctx: &UiContext, message: &str, default: bool) -> PackratResult<bool> {
    if ctx.auto_yes() {
        println!("  {} (auto-approved)", message);
        return Ok(true);
    }

    if !ctx.is_interactive() {
        return Ok(default);
    }

    // cliclack blocks on the terminal
    let message = message.to_string();
    let result = tokio::task::spawn_blocking(move || {
        cliclack::confirm(&message)
            .initial_value(default)
            .interact()
    })
    .await
    .map_err(|e| PackratError::User(format!("Prompt task failed: {}", e)))?;

    result.map_err(|e| PackratError::User(format!("Prompt failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn confirm_auto_yes() {
        let ctx = UiContext::non_interactive().with_auto_yes(true);
        assert!(confirm(&ctx, "Clear the cache?", false).await.unwrap());
    }

    #[tokio::test]
    async fn confirm_non_interactive_default() {
        let ctx = UiContext::non_interactive();
        assert!(confirm(&ctx, "Clear the cache?", true).await.unwrap());
        assert!(!confirm(&ctx, "Clear the cache?", false).await.unwrap());
    }
}
