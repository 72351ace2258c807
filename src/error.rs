//! Error types for CareOps.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the application.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Onboarding error: {0}")]
    Onboarding(#[from] OnboardingError),

    #[error("Inbox error: {0}")]
    Inbox(#[from] InboxError),

    #[error("Permission denied: {action} requires role {required}")]
    PermissionDenied { action: String, required: String },
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Failures talking to the hosted data backend.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Request to {table} failed: {reason}")]
    RequestFailed { table: String, reason: String },

    #[error("Backend returned {status} for {table}: {body}")]
    Status {
        table: String,
        status: u16,
        body: String,
    },

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Failed to decode {table} response: {reason}")]
    Decode { table: String, reason: String },

    #[error("Request to {table} timed out after {timeout:?}")]
    Timeout { table: String, timeout: Duration },

    #[error("Subscription for conversation {conversation_id} closed")]
    SubscriptionClosed { conversation_id: Uuid },
}

/// Identity provider errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("User {user_id} has no workspace membership")]
    NoMembership { user_id: Uuid },

    #[error("Sign up rejected: {0}")]
    SignUpRejected(String),

    #[error("Auth request failed: {0}")]
    RequestFailed(String),
}

/// Form input rejected before any write.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Required field is empty: {field}")]
    MissingField { field: &'static str },

    #[error("Invalid value for {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Onboarding wizard navigation errors.
#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error("Step {0} does not exist")]
    UnknownStep(u8),

    #[error("Step {target} is locked (current step is {current})")]
    StepLocked { target: u8, current: u8 },

    #[error("Step {step} has no {trigger} action")]
    UnsupportedTrigger { step: u8, trigger: &'static str },

    #[error("Already at the first step")]
    AtFirstStep,
}

/// Inbox / conversation view errors.
#[derive(Debug, thiserror::Error)]
pub enum InboxError {
    #[error("No conversation selected")]
    NoSelection,

    #[error("Message draft is blank")]
    BlankDraft,

    #[error("Conversation {0} is not in the loaded list")]
    UnknownConversation(Uuid),
}
