//! OnboardingManager owns wizard state and drives step transitions.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::model::{
    AdvanceOutcome, FormInput, FormsSnapshot, ServiceForm, Step, StepOutcome, WizardStatus,
    WorkspaceForm,
};
use super::state::{ALL_STEPS, StepKind, stepper};
use crate::error::{Error, OnboardingError, ValidationError};
use crate::gateway::{DataGateway, WorkspaceStatus, WorkspaceUpdate};
use crate::inventory::InventoryForm;
use crate::notify::Notifier;
use crate::session::Session;

/// In-memory wizard state for one workspace.
#[derive(Debug, Clone)]
struct WizardState {
    current: StepKind,
    /// One entry per step, indexed by `id - 1`.
    steps: Vec<Step>,
    status: WorkspaceStatus,
}

impl WizardState {
    fn new() -> Self {
        Self {
            current: StepKind::Workspace,
            steps: ALL_STEPS.into_iter().map(Step::initial).collect(),
            status: WorkspaceStatus::Draft,
        }
    }

    fn step_mut(&mut self, kind: StepKind) -> &mut Step {
        &mut self.steps[usize::from(kind.id() - 1)]
    }

    fn step(&self, kind: StepKind) -> &Step {
        &self.steps[usize::from(kind.id() - 1)]
    }

    fn workspace_form(&self) -> WorkspaceForm {
        match self.step(StepKind::Workspace) {
            Step::Workspace(form) => form.clone(),
            _ => WorkspaceForm::default(),
        }
    }

    fn service_form(&self) -> ServiceForm {
        match self.step(StepKind::Bookings) {
            Step::Bookings(form) => form.clone(),
            _ => ServiceForm::default(),
        }
    }

    fn inventory_form(&self) -> InventoryForm {
        match self.step(StepKind::Inventory) {
            Step::Inventory(form) => form.clone(),
            _ => InventoryForm::default(),
        }
    }
}

/// Coordinates the setup wizard: restores progress, validates and saves
/// each step, and persists the progress marker.
///
/// Every operation holds the state write lock for its whole duration, so
/// concurrent actions on the same wizard are serialized.
pub struct OnboardingManager {
    gateway: Arc<dyn DataGateway>,
    session: Session,
    notifier: Notifier,
    state: RwLock<WizardState>,
}

impl OnboardingManager {
    pub fn new(gateway: Arc<dyn DataGateway>, session: Session, notifier: Notifier) -> Self {
        Self {
            gateway,
            session,
            notifier,
            state: RwLock::new(WizardState::new()),
        }
    }

    pub fn workspace_id(&self) -> Uuid {
        self.session.workspace_id
    }

    /// Restore the current step and the workspace form from the backend.
    ///
    /// A missing marker starts at step 1; out-of-range markers are clamped.
    pub async fn load(&self) -> Result<StepKind, Error> {
        let workspace_id = self.session.workspace_id;
        let workspace = match self.gateway.get_workspace(workspace_id).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!(workspace_id = %workspace_id, error = %e, "Failed to load workspace");
                self.notifier.failure("Could not load workspace", &e);
                return Err(e.into());
            }
        };

        let mut state = self.state.write().await;
        *state = WizardState::new();
        match workspace {
            Some(ws) => {
                state.current = StepKind::clamped(ws.onboarding_step.unwrap_or(1));
                state.status = ws.status;
                *state.step_mut(StepKind::Workspace) =
                    Step::Workspace(WorkspaceForm::from_workspace(&ws));
                info!(
                    workspace_id = %workspace_id,
                    step = state.current.id(),
                    status = %ws.status,
                    "Onboarding state restored"
                );
            }
            None => {
                debug!(workspace_id = %workspace_id, "No workspace row yet, starting at step 1");
            }
        }
        Ok(state.current)
    }

    pub async fn current_step(&self) -> StepKind {
        self.state.read().await.current
    }

    /// Whether the workspace has gone live.
    pub async fn is_active(&self) -> bool {
        self.state.read().await.status == WorkspaceStatus::Active
    }

    pub async fn status(&self) -> WizardStatus {
        let state = self.state.read().await;
        let current = state.current;
        let step = state.step(current);
        WizardStatus {
            current_step: current.id(),
            title: current.title(),
            description: current.description(),
            action_label: step.action_label(),
            workspace_status: state.status,
            is_active: state.status == WorkspaceStatus::Active,
            can_advance: step.is_ready(),
            can_skip: current.can_skip(),
            can_go_back: current.previous().is_some(),
            steps: stepper(current),
            forms: FormsSnapshot {
                workspace: state.workspace_form(),
                bookings: state.service_form(),
                inventory: state.inventory_form(),
            },
        }
    }

    /// Replace the contents of one step's form.
    pub async fn update_form(&self, input: FormInput) {
        let mut state = self.state.write().await;
        let kind = input.kind();
        *state.step_mut(kind) = match input {
            FormInput::Workspace(form) => Step::Workspace(form),
            FormInput::Bookings(form) => Step::Bookings(form),
            FormInput::Inventory(form) => Step::Inventory(form),
        };
        debug!(step = %kind, "Form updated");
    }

    /// The primary action: save the current step, then move to the next.
    ///
    /// On a failed write nothing changes locally and the error is both
    /// returned and notified. On the last step the workspace is activated
    /// and the wizard stays where it is.
    pub async fn save_and_advance(&self) -> Result<AdvanceOutcome, Error> {
        let workspace_id = self.session.workspace_id;
        let mut state = self.state.write().await;
        let current = state.current;

        let step = state.step_mut(current);
        if !step.is_ready() {
            return Err(ValidationError::MissingField { field: "name" }.into());
        }
        let outcome = match step.save(self.gateway.as_ref(), workspace_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(step = %current, error = %e, "Failed to save onboarding step");
                if matches!(e, Error::Gateway(_)) {
                    self.notifier.failure("Error", &e);
                }
                return Err(e);
            }
        };

        match outcome {
            StepOutcome::Activated => {
                state.status = WorkspaceStatus::Active;
                info!(workspace_id = %workspace_id, "Workspace activated");
                self.notifier.success(
                    "🚀 Workspace activated!",
                    Some("Your business is now live!".to_string()),
                );
                return Ok(AdvanceOutcome::Activated);
            }
            StepOutcome::Saved(title) => {
                info!(step = %current, "Onboarding step saved");
                self.notifier.success(title, None);
            }
            StepOutcome::Continued => {}
        }

        let next = self.move_forward(&mut state).await;
        Ok(AdvanceOutcome::Advanced { step: next.id() })
    }

    /// Advance without saving. Only steps 2–7 can be skipped.
    pub async fn skip(&self) -> Result<StepKind, Error> {
        let mut state = self.state.write().await;
        let current = state.current;
        if !current.can_skip() {
            return Err(OnboardingError::UnsupportedTrigger {
                step: current.id(),
                trigger: "skip",
            }
            .into());
        }
        debug!(step = %current, "Step skipped");
        Ok(self.move_forward(&mut state).await)
    }

    /// Go back one step. Nothing is written.
    pub async fn back(&self) -> Result<StepKind, Error> {
        let mut state = self.state.write().await;
        let previous = state
            .current
            .previous()
            .ok_or(OnboardingError::AtFirstStep)?;
        state.current = previous;
        Ok(previous)
    }

    /// Select a step from the stepper. Steps ahead of the current one are
    /// locked and the request is refused without changing anything.
    pub async fn jump_to(&self, id: u8) -> Result<StepKind, Error> {
        let target = StepKind::from_id(id).ok_or(OnboardingError::UnknownStep(id))?;
        let mut state = self.state.write().await;
        if target.is_locked(state.current) {
            return Err(OnboardingError::StepLocked {
                target: id,
                current: state.current.id(),
            }
            .into());
        }
        state.current = target;
        Ok(target)
    }

    /// Move to the next step and record it as the progress marker.
    ///
    /// The marker write is best effort: on failure the local step still
    /// advances and a later resume may land on an earlier step. Callers never
    /// reach here on the last step.
    async fn move_forward(&self, state: &mut WizardState) -> StepKind {
        let Some(next) = state.current.next() else {
            return state.current;
        };
        state.current = next;

        let workspace_id = self.session.workspace_id;
        if let Err(e) = self
            .gateway
            .update_workspace(workspace_id, &WorkspaceUpdate::step(next.id()))
            .await
        {
            warn!(
                workspace_id = %workspace_id,
                step = next.id(),
                error = %e,
                "Failed to persist onboarding step"
            );
        }
        next
    }
}
