use crate::classifier::ApiError;
use async_trait::async_trait;

/// Obtains a fresh credential after a call failed with an AUTH error.
///
/// `Ok(())` means a refreshed credential is in place and the call may be
/// retried; any error means the user has to sign in again.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn handle_token_error(&self, error: &ApiError) -> anyhow::Result<()>;
}

/// Used when no credential source is configured: every refresh fails.
pub struct NoTokenRefresher;

#[async_trait]
impl TokenRefresher for NoTokenRefresher {
    async fn handle_token_error(&self, _error: &ApiError) -> anyhow::Result<()> {
        anyhow::bail!("no token refresher configured")
    }
}
