//! Session credentials
//!
//! The access token is shared between the identity provider and the
//! remote stores, so signing out downgrades every later request to the
//! public API key without rebuilding anything.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::IdentityProvider;
use crate::error::AppError;

/// Signed-in user as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Stable user identifier
    pub id: String,
    pub email: Option<String>,
}

impl AuthUser {
    /// Name shown before a profile exists: the local part of the email
    pub fn fallback_name(&self) -> Option<&str> {
        self.email
            .as_deref()
            .and_then(|email| email.split('@').next())
            .filter(|local| !local.is_empty())
    }
}

/// Shared bearer token slot
#[derive(Debug, Clone, Default)]
pub struct AccessToken(Arc<RwLock<Option<String>>>);

impl AccessToken {
    pub fn new(token: Option<String>) -> Self {
        Self(Arc::new(RwLock::new(
            token.filter(|value| !value.trim().is_empty()),
        )))
    }

    pub fn get(&self) -> Option<String> {
        self.0.read().ok().and_then(|slot| slot.clone())
    }

    pub fn set(&self, token: Option<String>) {
        if let Ok(mut slot) = self.0.write() {
            *slot = token;
        }
    }

    pub fn clear(&self) {
        self.set(None);
    }

    pub fn is_present(&self) -> bool {
        self.get().is_some()
    }
}

/// Identity provider with a fixed answer
///
/// Used for embedding the core behind an already-authenticated host and
/// for tests.
#[derive(Debug, Default)]
pub struct StaticIdentity {
    user: RwLock<Option<AuthUser>>,
}

impl StaticIdentity {
    pub fn signed_in(id: &str, email: Option<&str>) -> Self {
        Self {
            user: RwLock::new(Some(AuthUser {
                id: id.to_string(),
                email: email.map(str::to_string),
            })),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user(&self) -> Result<Option<AuthUser>, AppError> {
        Ok(self.user.read().ok().and_then(|user| user.clone()))
    }

    async fn sign_out(&self) -> Result<(), AppError> {
        if let Ok(mut user) = self.user.write() {
            *user = None;
        }
        Ok(())
    }
}
