//! Onboarding data model: per-step forms and the step enum that owns them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{StepInfo, StepKind};
use crate::error::{Error, ValidationError};
use crate::forms::{parse_positive, parse_price, require};
use crate::gateway::{DataGateway, NewService, Workspace, WorkspaceStatus, WorkspaceUpdate};
use crate::inventory::InventoryForm;
use crate::slug::slugify;

pub const DEFAULT_TIMEZONE: &str = "UTC";
pub const DEFAULT_DURATION: &str = "60";

/// Business details collected on the first step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceForm {
    pub name: String,
    pub address: String,
    pub timezone: String,
    pub contact_email: String,
}

impl Default for WorkspaceForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            address: String::new(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            contact_email: String::new(),
        }
    }
}

impl WorkspaceForm {
    /// Pre-fill from a stored workspace.
    pub fn from_workspace(workspace: &Workspace) -> Self {
        Self {
            name: workspace.name.clone(),
            address: workspace.address.clone().unwrap_or_default(),
            timezone: workspace
                .timezone
                .clone()
                .filter(|tz| !tz.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
            contact_email: workspace.contact_email.clone().unwrap_or_default(),
        }
    }

    pub fn is_ready(&self) -> bool {
        !self.name.trim().is_empty()
    }

    /// The workspace update this form saves, slug included.
    pub fn to_update(&self) -> Result<WorkspaceUpdate, ValidationError> {
        let name = require("name", &self.name)?;
        Ok(WorkspaceUpdate {
            name: Some(name.to_string()),
            address: Some(self.address.trim().to_string()),
            timezone: Some(self.timezone.trim().to_string()),
            contact_email: Some(self.contact_email.trim().to_string()),
            slug: Some(slugify(name)),
            ..Default::default()
        })
    }
}

/// One bookable service, as typed on the bookings step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceForm {
    pub name: String,
    /// Minutes.
    pub duration: String,
    pub price: String,
    pub location: String,
}

impl Default for ServiceForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            duration: DEFAULT_DURATION.to_string(),
            price: String::new(),
            location: String::new(),
        }
    }
}

impl ServiceForm {
    pub fn is_ready(&self) -> bool {
        !self.name.trim().is_empty()
    }

    pub fn to_new_service(&self, workspace_id: Uuid) -> Result<NewService, ValidationError> {
        let name = require("name", &self.name)?;
        Ok(NewService {
            workspace_id,
            name: name.to_string(),
            duration: parse_positive("duration", &self.duration)?,
            price: parse_price("price", &self.price)?,
            location: self.location.trim().to_string(),
            slug: slugify(name),
        })
    }

    /// Ready for the next service; the duration carries over.
    pub fn clear(&mut self) {
        self.name.clear();
        self.price.clear();
        self.location.clear();
    }
}

/// A wizard step together with whatever input it collects.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Workspace(WorkspaceForm),
    Bookings(ServiceForm),
    Inventory(InventoryForm),
    /// Steps that only describe a capability and write nothing.
    Informational(StepKind),
    Activate,
}

/// What a successful save did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Data was written; carries the success toast title.
    Saved(&'static str),
    /// Nothing to write.
    Continued,
    /// The workspace went live.
    Activated,
}

impl Step {
    /// A step with a blank form.
    pub fn initial(kind: StepKind) -> Self {
        match kind {
            StepKind::Workspace => Self::Workspace(WorkspaceForm::default()),
            StepKind::Bookings => Self::Bookings(ServiceForm::default()),
            StepKind::Inventory => Self::Inventory(InventoryForm::default()),
            StepKind::Activate => Self::Activate,
            other => Self::Informational(other),
        }
    }

    pub fn kind(&self) -> StepKind {
        match self {
            Self::Workspace(_) => StepKind::Workspace,
            Self::Bookings(_) => StepKind::Bookings,
            Self::Inventory(_) => StepKind::Inventory,
            Self::Informational(kind) => *kind,
            Self::Activate => StepKind::Activate,
        }
    }

    /// Whether the primary action is enabled.
    pub fn is_ready(&self) -> bool {
        match self {
            Self::Workspace(form) => form.is_ready(),
            Self::Bookings(form) => form.is_ready(),
            Self::Inventory(form) => form.is_ready(),
            Self::Informational(_) | Self::Activate => true,
        }
    }

    /// Label of the primary action button.
    pub fn action_label(&self) -> &'static str {
        match self {
            Self::Workspace(_) => "Save & Continue",
            Self::Bookings(_) => "Add Service & Continue",
            Self::Inventory(_) => "Add Item & Continue",
            Self::Informational(_) => "Continue",
            Self::Activate => "Activate Workspace",
        }
    }

    /// Write this step's data. Forms that add rows are cleared only after
    /// the write succeeds, so a failure keeps the input for a retry.
    pub async fn save(
        &mut self,
        gateway: &dyn DataGateway,
        workspace_id: Uuid,
    ) -> Result<StepOutcome, Error> {
        match self {
            Self::Workspace(form) => {
                let update = form.to_update()?;
                gateway.update_workspace(workspace_id, &update).await?;
                Ok(StepOutcome::Saved("Workspace saved!"))
            }
            Self::Bookings(form) => {
                let service = form.to_new_service(workspace_id)?;
                gateway.insert_service(&service).await?;
                form.clear();
                Ok(StepOutcome::Saved("Service created!"))
            }
            Self::Inventory(form) => {
                let item = form.to_new_item(workspace_id)?;
                gateway.insert_inventory_item(&item).await?;
                form.clear();
                Ok(StepOutcome::Saved("Inventory item added!"))
            }
            Self::Informational(_) => Ok(StepOutcome::Continued),
            Self::Activate => {
                gateway
                    .update_workspace(workspace_id, &WorkspaceUpdate::status(WorkspaceStatus::Active))
                    .await?;
                Ok(StepOutcome::Activated)
            }
        }
    }
}

/// Form edits sent by the client, tagged by step.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum FormInput {
    Workspace(WorkspaceForm),
    Bookings(ServiceForm),
    Inventory(InventoryForm),
}

impl FormInput {
    pub fn kind(&self) -> StepKind {
        match self {
            Self::Workspace(_) => StepKind::Workspace,
            Self::Bookings(_) => StepKind::Bookings,
            Self::Inventory(_) => StepKind::Inventory,
        }
    }
}

/// Result of the primary action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdvanceOutcome {
    Advanced { step: u8 },
    Activated,
}

/// Current form contents, for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct FormsSnapshot {
    pub workspace: WorkspaceForm,
    pub bookings: ServiceForm,
    pub inventory: InventoryForm,
}

/// Snapshot of the wizard for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct WizardStatus {
    pub current_step: u8,
    pub title: &'static str,
    pub description: &'static str,
    pub action_label: &'static str,
    pub workspace_status: WorkspaceStatus,
    pub is_active: bool,
    pub can_advance: bool,
    pub can_skip: bool,
    pub can_go_back: bool,
    pub steps: Vec<StepInfo>,
    pub forms: FormsSnapshot,
}
