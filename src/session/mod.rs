//! Session and identity.
//!
//! The signed-in [`Session`] is resolved once by an [`IdentityProvider`] and
//! then handed by value to each component that needs it. Nothing reads it
//! from global state, so tests can fabricate one freely.

pub mod hosted;

pub use hosted::HostedIdentity;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;

/// A user's role inside their workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    #[serde(other)]
    Staff,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Staff => write!(f, "staff"),
        }
    }
}

/// The authenticated user and the workspace they act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: Uuid,
    pub workspace_id: Uuid,
    pub role: Role,
}

impl Session {
    pub fn new(user_id: Uuid, workspace_id: Uuid, role: Role) -> Self {
        Self {
            user_id,
            workspace_id,
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// What the identity provider currently knows about the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// A sign-in or session lookup is in flight.
    Loading,
    SignedOut,
    Active(Session),
}

impl SessionState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Active(session) => Some(session),
            _ => None,
        }
    }
}

/// New account details. The backend provisions the workspace itself.
#[derive(Debug, Clone)]
pub struct SignUpRequest {
    pub email: String,
    pub password: SecretString,
    pub business_name: String,
    pub display_name: String,
}

/// Resolves who is signed in.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current session state.
    async fn current_session(&self) -> SessionState;

    /// Password sign-in; on success the session becomes active.
    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<Session, AuthError>;

    /// Register a new account and business.
    async fn sign_up(&self, request: &SignUpRequest) -> Result<(), AuthError>;

    /// Forget the current session.
    async fn sign_out(&self);
}
