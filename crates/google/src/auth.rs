//! Bearer tokens for the calendar API.

use {async_trait::async_trait, secrecy::Secret};

use agenda_calendar::Result;

/// Supplies an already-valid OAuth access token for each request.
///
/// Token acquisition and refresh happen elsewhere; implementations only hand
/// out what they currently hold.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<Secret<String>>;
}

/// A fixed token, e.g. from configuration or the environment.
#[derive(Clone)]
pub struct StaticToken {
    token: Secret<String>,
}

impl StaticToken {
    pub fn new(token: Secret<String>) -> Self {
        Self { token }
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl AccessTokenProvider for StaticToken {
    async fn access_token(&self) -> Result<Secret<String>> {
        Ok(self.token.clone())
    }
}
