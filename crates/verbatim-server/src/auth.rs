//! Credential seam for the streaming socket. Validation itself is an
//! external concern; the server only needs a verifier to map a bearer token
//! to a user id before the upgrade.

#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("authentication token required")]
    MissingToken,
    #[error("invalid authentication token")]
    InvalidToken,
}

pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError>;
}

/// Single shared-token verifier for deployments without a user directory.
pub struct StaticTokenVerifier {
    token: String,
    user_id: String,
}

impl StaticTokenVerifier {
    pub fn new(token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user_id: user_id.into(),
        }
    }
}

impl TokenVerifier for StaticTokenVerifier {
    fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        if token != self.token {
            return Err(AuthError::InvalidToken);
        }
        Ok(AuthenticatedUser {
            user_id: self.user_id.clone(),
        })
    }
}
