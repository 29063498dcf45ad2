//! Replica authorization.

use async_trait::async_trait;
use std::net::SocketAddr;
use subtle::ConstantTimeEq;

/// Decides whether a connected replica may be served.
#[async_trait]
pub trait AuthorizationHandler: Send + Sync {
    /// Check the credentials a peer presented in its `Auth` request.
    async fn authorize(&self, peer: SocketAddr, credentials: &str) -> bool;
}

/// Accepts any credentials equal to one of a fixed set of tokens.
pub struct StaticTokenAuthorizer {
    tokens: Vec<String>,
}

impl StaticTokenAuthorizer {
    pub fn new(tokens: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl AuthorizationHandler for StaticTokenAuthorizer {
    async fn authorize(&self, peer: SocketAddr, credentials: &str) -> bool {
        // Compare against every token so timing does not reveal which matched.
        let matched = self.tokens.iter().fold(0u8, |acc, token| {
            acc | token.as_bytes().ct_eq(credentials.as_bytes()).unwrap_u8()
        });
        if matched == 0 {
            tracing::info!(%peer, "replica presented unknown credentials");
        }
        matched == 1
    }
}

impl std::fmt::Debug for StaticTokenAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenAuthorizer")
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "10.0.0.7:5000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_known_token_is_accepted() {
        let auth = StaticTokenAuthorizer::new(["alpha", "beta"]);
        assert!(auth.authorize(peer(), "beta").await);
    }

    #[tokio::test]
    async fn test_unknown_or_prefix_token_is_rejected() {
        let auth = StaticTokenAuthorizer::new(["alpha"]);
        assert!(!auth.authorize(peer(), "alp").await);
        assert!(!auth.authorize(peer(), "alphabet").await);
        assert!(!auth.authorize(peer(), "").await);
    }

    #[tokio::test]
    async fn test_empty_token_list_rejects_everyone() {
        let auth = StaticTokenAuthorizer::new(Vec::<String>::new());
        assert!(!auth.authorize(peer(), "anything").await);
    }

    #[test]
    fn test_debug_hides_tokens() {
        let auth = StaticTokenAuthorizer::new(["secret"]);
        assert!(!format!("{auth:?}").contains("secret"));
    }
}
