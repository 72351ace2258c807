//! Data access gateway, the narrow interface onto the hosted backend.
//!
//! Every read and write the application performs goes through
//! [`DataGateway`]. Two implementations ship with the crate: the
//! [`RestGateway`] that talks to the hosted REST API, and the
//! [`InMemoryGateway`] used for local runs and tests.

pub mod memory;
pub mod model;
pub mod rest;

pub use memory::InMemoryGateway;
pub use model::{
    Contact, Conversation, InventoryItem, Message, MessageType, NewInventoryItem, NewMessage,
    NewService, Sender, Service, Workspace, WorkspaceStatus, WorkspaceUpdate,
};
pub use rest::{RestClient, RestGateway};

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::GatewayError;

/// Buffer size for live message subscriptions.
pub const SUBSCRIPTION_BUFFER: usize = 256;

/// Identifies one live subscription so it can be torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A live feed of newly inserted messages for one conversation.
///
/// The receiver yields `None` once the backend closes the channel or the
/// subscription is removed with [`DataGateway::unsubscribe`].
pub struct MessageSubscription {
    pub id: SubscriptionId,
    pub conversation_id: Uuid,
    pub receiver: mpsc::Receiver<Message>,
}

/// Backend-agnostic access to workspace data.
#[async_trait]
pub trait DataGateway: Send + Sync {
    // ── Workspaces ──────────────────────────────────────────────────

    /// Fetch a workspace by id.
    async fn get_workspace(&self, id: Uuid) -> Result<Option<Workspace>, GatewayError>;

    /// Write the present fields of `update` onto the workspace.
    async fn update_workspace(&self, id: Uuid, update: &WorkspaceUpdate)
    -> Result<(), GatewayError>;

    // ── Services ────────────────────────────────────────────────────

    /// Insert a service row. Never deduplicates.
    async fn insert_service(&self, service: &NewService) -> Result<Service, GatewayError>;

    // ── Inventory ───────────────────────────────────────────────────

    /// Insert an inventory row. Never deduplicates.
    async fn insert_inventory_item(
        &self,
        item: &NewInventoryItem,
    ) -> Result<InventoryItem, GatewayError>;

    /// All inventory items of a workspace, ordered by name.
    async fn list_inventory(&self, workspace_id: Uuid) -> Result<Vec<InventoryItem>, GatewayError>;

    // ── Conversations ───────────────────────────────────────────────

    /// Conversations of a workspace joined with their contact, most recent
    /// activity first, never-active conversations last.
    async fn list_conversations(&self, workspace_id: Uuid)
    -> Result<Vec<Conversation>, GatewayError>;

    /// Set or clear the automation-paused flag on a conversation.
    async fn set_automation_paused(
        &self,
        conversation_id: Uuid,
        paused: bool,
    ) -> Result<(), GatewayError>;

    // ── Messages ────────────────────────────────────────────────────

    /// Full message history of a conversation, oldest first.
    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, GatewayError>;

    /// Insert a message and return the stored row.
    async fn insert_message(&self, message: &NewMessage) -> Result<Message, GatewayError>;

    /// Start receiving messages inserted into `conversation_id` from now on.
    async fn subscribe_messages(
        &self,
        conversation_id: Uuid,
    ) -> Result<MessageSubscription, GatewayError>;

    /// Tear down a subscription. Unknown ids are ignored.
    async fn unsubscribe(&self, id: SubscriptionId);
}

/// Order conversations by `last_message_at` descending, `None` last.
pub fn sort_by_recent_activity(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| match (a.last_message_at, b.last_message_at) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}
