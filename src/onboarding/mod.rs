//! Onboarding: the eight-step setup wizard for a new workspace.
//!
//! The owner walks through business details, services, and stock, and
//! finally activates the workspace. Progress is recorded on the workspace
//! row so a reload resumes on the same step.

pub mod manager;
pub mod model;
pub mod routes;
pub mod state;

pub use manager::OnboardingManager;
pub use model::{AdvanceOutcome, FormInput, ServiceForm, Step, WizardStatus, WorkspaceForm};
pub use routes::onboarding_routes;
pub use state::{Indicator, StepKind};
