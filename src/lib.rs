//! CareOps: operations backend for small service businesses.

pub mod api;
pub mod config;
pub mod error;
pub mod forms;
pub mod gateway;
pub mod inbox;
pub mod inventory;
pub mod notify;
pub mod onboarding;
pub mod session;
pub mod slug;
