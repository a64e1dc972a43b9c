//! Identity provider
//!
//! Handles:
//! - Resolving the signed-in viewer
//! - Signing out
//! - Sharing the access token with the remote stores

mod http;
mod session;

pub use http::HttpIdentityProvider;
pub use session::{AccessToken, AuthUser, StaticIdentity};

use async_trait::async_trait;

use crate::error::AppError;

/// Identity collaborator
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The signed-in user, or `None` for an unauthenticated viewer
    async fn current_user(&self) -> Result<Option<AuthUser>, AppError>;

    /// End the identity session
    async fn sign_out(&self) -> Result<(), AppError>;
}
