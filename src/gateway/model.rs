//! Row types exchanged with the hosted backend.
//!
//! Field names follow the backend's column names so rows serialize straight
//! onto the REST API.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceStatus {
    #[default]
    Draft,
    Active,
}

impl std::fmt::Display for WorkspaceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Active => write!(f, "active"),
        }
    }
}

/// A business workspace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub status: WorkspaceStatus,
    /// 1-indexed onboarding progress marker.
    #[serde(default)]
    pub onboarding_step: Option<u8>,
}

impl Workspace {
    /// A fresh draft workspace, as provisioned at signup.
    pub fn draft(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            address: None,
            timezone: None,
            contact_email: None,
            slug: None,
            status: WorkspaceStatus::Draft,
            onboarding_step: Some(1),
        }
    }
}

/// Partial update of a workspace row. Only `Some` fields are written.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct WorkspaceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkspaceStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onboarding_step: Option<u8>,
}

impl WorkspaceUpdate {
    pub fn step(step: u8) -> Self {
        Self {
            onboarding_step: Some(step),
            ..Default::default()
        }
    }

    pub fn status(status: WorkspaceStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Apply the present fields onto a workspace row.
    pub fn apply_to(&self, workspace: &mut Workspace) {
        if let Some(name) = &self.name {
            workspace.name = name.clone();
        }
        if let Some(address) = &self.address {
            workspace.address = Some(address.clone());
        }
        if let Some(timezone) = &self.timezone {
            workspace.timezone = Some(timezone.clone());
        }
        if let Some(email) = &self.contact_email {
            workspace.contact_email = Some(email.clone());
        }
        if let Some(slug) = &self.slug {
            workspace.slug = Some(slug.clone());
        }
        if let Some(status) = self.status {
            workspace.status = status;
        }
        if let Some(step) = self.onboarding_step {
            workspace.onboarding_step = Some(step);
        }
    }
}

/// A bookable service offering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    /// Minutes.
    pub duration: u32,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewService {
    pub workspace_id: Uuid,
    pub name: String,
    pub duration: u32,
    pub price: Option<Decimal>,
    pub location: String,
    pub slug: String,
}

/// A tracked stock item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryItem {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub low_stock_threshold: u32,
    #[serde(default)]
    pub unit: Option<String>,
}

impl InventoryItem {
    /// Low when stock has fallen to or below the alert threshold.
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.low_stock_threshold
    }

    /// Fill level for the stock gauge, 0..=100.
    ///
    /// A full gauge is three times the alert threshold; a zero threshold is
    /// treated as 1 so the ratio is always defined.
    pub fn stock_percent(&self) -> f64 {
        let full = (u64::from(self.low_stock_threshold) * 3).max(1) as f64;
        (f64::from(self.quantity) / full * 100.0).min(100.0)
    }

    /// Unit label for display, "units" when none was set.
    pub fn unit_label(&self) -> &str {
        self.unit.as_deref().unwrap_or("units")
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewInventoryItem {
    pub workspace_id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub low_stock_threshold: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// A customer of the workspace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// A conversation thread with one contact, joined with that contact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub contact_id: Uuid,
    pub status: String,
    #[serde(default)]
    pub automation_paused: bool,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "contacts")]
    pub contact: Option<Contact>,
}

impl Conversation {
    pub fn contact_name(&self) -> Option<&str> {
        self.contact.as_ref().map(|c| c.name.as_str())
    }
}

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    Staff,
    #[serde(other)]
    Contact,
}

/// Whether a message was typed by a person or produced by automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Manual,
    Auto,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: Sender,
    pub content: String,
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender: Sender,
    pub content: String,
    pub message_type: MessageType,
}

impl NewMessage {
    /// A message typed by staff in the inbox.
    pub fn manual(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            conversation_id,
            sender: Sender::Staff,
            content: content.into(),
            message_type: MessageType::Manual,
        }
    }
}
