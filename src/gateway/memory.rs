//! In-memory gateway, a process-local stand-in for the hosted backend.
//!
//! Tables live behind a single `RwLock`. Inserted messages are fanned out to
//! every live subscription for their conversation. Writes to a table can be
//! made to fail on demand so callers' failure paths can be exercised.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use super::model::{
    Contact, Conversation, InventoryItem, Message, NewInventoryItem, NewMessage, NewService,
    Service, Workspace, WorkspaceUpdate,
};
use super::{
    DataGateway, MessageSubscription, SUBSCRIPTION_BUFFER, SubscriptionId, sort_by_recent_activity,
};
use crate::error::GatewayError;

#[derive(Default)]
struct Tables {
    workspaces: HashMap<Uuid, Workspace>,
    services: Vec<Service>,
    inventory: Vec<InventoryItem>,
    contacts: HashMap<Uuid, Contact>,
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
}

struct Subscriber {
    conversation_id: Uuid,
    tx: mpsc::Sender<Message>,
}

/// Process-local implementation of [`DataGateway`].
#[derive(Default)]
pub struct InMemoryGateway {
    tables: RwLock<Tables>,
    subscribers: Mutex<HashMap<SubscriptionId, Subscriber>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write to `table` fail until [`Self::heal`].
    ///
    /// Table names: `workspaces`, `services`, `inventory`, `conversations`,
    /// `messages`.
    pub fn fail_writes_to(&self, table: &'static str) {
        self.lock_failing().insert(table);
    }

    /// Stop failing writes to `table`.
    pub fn heal(&self, table: &'static str) {
        self.lock_failing().remove(table);
    }

    // ── Seeding ─────────────────────────────────────────────────────

    pub async fn put_workspace(&self, workspace: Workspace) {
        self.tables
            .write()
            .await
            .workspaces
            .insert(workspace.id, workspace);
    }

    pub async fn put_contact(&self, contact: Contact) {
        self.tables.write().await.contacts.insert(contact.id, contact);
    }

    /// Store a conversation. The joined contact is filled in on read.
    pub async fn put_conversation(&self, conversation: Conversation) {
        self.tables.write().await.conversations.push(conversation);
    }

    // ── Inspection ──────────────────────────────────────────────────

    pub async fn workspace(&self, id: Uuid) -> Option<Workspace> {
        self.tables.read().await.workspaces.get(&id).cloned()
    }

    pub async fn services(&self, workspace_id: Uuid) -> Vec<Service> {
        self.tables
            .read()
            .await
            .services
            .iter()
            .filter(|s| s.workspace_id == workspace_id)
            .cloned()
            .collect()
    }

    pub async fn conversation(&self, id: Uuid) -> Option<Conversation> {
        self.tables
            .read()
            .await
            .conversations
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    /// Number of subscriptions currently registered.
    pub fn subscription_count(&self) -> usize {
        self.lock_subscribers().len()
    }

    /// Close every open subscription as if the backend dropped them.
    pub fn drop_all_subscriptions(&self) {
        let dropped = std::mem::take(&mut *self.lock_subscribers());
        debug!(count = dropped.len(), "Dropped all message subscriptions");
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn check_writable(&self, table: &str) -> Result<(), GatewayError> {
        if self.lock_failing().contains(table) {
            return Err(GatewayError::RequestFailed {
                table: table.to_string(),
                reason: "write rejected by backend".to_string(),
            });
        }
        Ok(())
    }

    fn lock_failing(&self) -> std::sync::MutexGuard<'_, HashSet<&'static str>> {
        self.failing.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, HashMap<SubscriptionId, Subscriber>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn fan_out(&self, message: &Message) {
        let targets: Vec<(SubscriptionId, mpsc::Sender<Message>)> = self
            .lock_subscribers()
            .iter()
            .filter(|(_, s)| s.conversation_id == message.conversation_id)
            .map(|(id, s)| (*id, s.tx.clone()))
            .collect();

        for (id, tx) in targets {
            if tx.send(message.clone()).await.is_err() {
                debug!(subscription = %id, "Subscriber went away, removing");
                self.lock_subscribers().remove(&id);
            }
        }
    }
}

#[async_trait]
impl DataGateway for InMemoryGateway {
    async fn get_workspace(&self, id: Uuid) -> Result<Option<Workspace>, GatewayError> {
        Ok(self.tables.read().await.workspaces.get(&id).cloned())
    }

    async fn update_workspace(
        &self,
        id: Uuid,
        update: &WorkspaceUpdate,
    ) -> Result<(), GatewayError> {
        self.check_writable("workspaces")?;
        let mut tables = self.tables.write().await;
        let workspace = tables
            .workspaces
            .get_mut(&id)
            .ok_or_else(|| GatewayError::NotFound {
                entity: "workspace".into(),
                id: id.to_string(),
            })?;
        update.apply_to(workspace);
        Ok(())
    }

    async fn insert_service(&self, service: &NewService) -> Result<Service, GatewayError> {
        self.check_writable("services")?;
        let row = Service {
            id: Uuid::new_v4(),
            workspace_id: service.workspace_id,
            name: service.name.clone(),
            duration: service.duration,
            price: service.price,
            location: Some(service.location.clone()),
            slug: Some(service.slug.clone()),
        };
        self.tables.write().await.services.push(row.clone());
        Ok(row)
    }

    async fn insert_inventory_item(
        &self,
        item: &NewInventoryItem,
    ) -> Result<InventoryItem, GatewayError> {
        self.check_writable("inventory")?;
        let row = InventoryItem {
            id: Uuid::new_v4(),
            workspace_id: item.workspace_id,
            name: item.name.clone(),
            quantity: item.quantity,
            low_stock_threshold: item.low_stock_threshold,
            unit: item.unit.clone(),
        };
        self.tables.write().await.inventory.push(row.clone());
        Ok(row)
    }

    async fn list_inventory(&self, workspace_id: Uuid) -> Result<Vec<InventoryItem>, GatewayError> {
        let mut items: Vec<InventoryItem> = self
            .tables
            .read()
            .await
            .inventory
            .iter()
            .filter(|i| i.workspace_id == workspace_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    async fn list_conversations(
        &self,
        workspace_id: Uuid,
    ) -> Result<Vec<Conversation>, GatewayError> {
        let tables = self.tables.read().await;
        let mut list: Vec<Conversation> = tables
            .conversations
            .iter()
            .filter(|c| c.workspace_id == workspace_id)
            .map(|c| Conversation {
                contact: tables.contacts.get(&c.contact_id).cloned(),
                ..c.clone()
            })
            .collect();
        sort_by_recent_activity(&mut list);
        Ok(list)
    }

    async fn set_automation_paused(
        &self,
        conversation_id: Uuid,
        paused: bool,
    ) -> Result<(), GatewayError> {
        self.check_writable("conversations")?;
        let mut tables = self.tables.write().await;
        let convo = tables
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
            .ok_or_else(|| GatewayError::NotFound {
                entity: "conversation".into(),
                id: conversation_id.to_string(),
            })?;
        convo.automation_paused = paused;
        Ok(())
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, GatewayError> {
        let mut messages: Vec<Message> = self
            .tables
            .read()
            .await
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<Message, GatewayError> {
        self.check_writable("messages")?;
        let row = Message {
            id: Uuid::new_v4(),
            conversation_id: message.conversation_id,
            sender: message.sender,
            content: message.content.clone(),
            message_type: message.message_type,
            created_at: Utc::now(),
        };
        {
            let mut tables = self.tables.write().await;
            if let Some(convo) = tables
                .conversations
                .iter_mut()
                .find(|c| c.id == row.conversation_id)
            {
                convo.last_message_at = Some(row.created_at);
            }
            tables.messages.push(row.clone());
        }
        self.fan_out(&row).await;
        Ok(row)
    }

    async fn subscribe_messages(
        &self,
        conversation_id: Uuid,
    ) -> Result<MessageSubscription, GatewayError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let id = SubscriptionId::new();
        self.lock_subscribers()
            .insert(id, Subscriber { conversation_id, tx });
        debug!(subscription = %id, conversation_id = %conversation_id, "Message subscription armed");
        Ok(MessageSubscription {
            id,
            conversation_id,
            receiver: rx,
        })
    }

    async fn unsubscribe(&self, id: SubscriptionId) {
        if self.lock_subscribers().remove(&id).is_none() {
            debug!(subscription = %id, "Unsubscribe for unknown subscription");
        }
    }
}
