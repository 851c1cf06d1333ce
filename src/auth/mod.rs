//! Management-plane credentials.
//!
//! Acquiring tokens (service principals, managed identity, CLI login) is
//! someone else's job. The client only needs a bearer token per request,
//! so it asks a [`TokenProvider`] each time.

use crate::error::DeployError;
use async_trait::async_trait;

/// Environment variable [`StaticToken::from_env`] reads.
pub const ACCESS_TOKEN_ENV: &str = "AZURE_ACCESS_TOKEN";

/// Source of bearer tokens for the management API.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn bearer_token(&self) -> Result<String, DeployError>;
}

/// A fixed token, e.g. from `az account get-access-token`.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn from_env() -> Result<Self, DeployError> {
        dotenvy::dotenv().ok();
        std::env::var(ACCESS_TOKEN_ENV)
            .map(Self)
            .map_err(|_| DeployError::Config(format!("{} is not set", ACCESS_TOKEN_ENV)))
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(***)")
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn bearer_token(&self) -> Result<String, DeployError> {
        if self.0.trim().is_empty() {
            return Err(DeployError::Config("access token is empty".into()));
        }
        Ok(self.0.clone())
    }
}
