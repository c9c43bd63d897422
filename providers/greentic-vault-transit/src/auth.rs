use async_trait::async_trait;
use greentic_transit::{AuthError, TokenProvider};

/// Hands out a fixed Vault token, typically `VAULT_TOKEN`.
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenProvider")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<String, AuthError> {
        if self.token.trim().is_empty() {
            return Err(AuthError::MissingToken);
        }
        Ok(self.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blank_token_is_rejected() {
        let provider = StaticTokenProvider::new("  ");
        assert_eq!(provider.token().await, Err(AuthError::MissingToken));
    }

    #[tokio::test]
    async fn token_is_returned_and_redacted_in_debug() {
        let provider = StaticTokenProvider::new("s.abc");
        assert_eq!(provider.token().await.expect("token"), "s.abc");
        assert!(!format!("{provider:?}").contains("s.abc"));
    }
}
