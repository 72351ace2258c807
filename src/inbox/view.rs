//! ConversationView: live view of one selected conversation.
//!
//! Selecting a conversation loads its history, arms a message subscription,
//! and runs a catch-up fetch for anything inserted in between. A pump task
//! then appends live messages as they arrive. Everything funnels through a
//! [`MessageTimeline`], so a message delivered by more than one path shows
//! up once.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::timeline::MessageTimeline;
use crate::error::{Error, GatewayError, InboxError};
use crate::gateway::{
    Contact, Conversation, DataGateway, Message, MessageSubscription, NewMessage, SubscriptionId,
    sort_by_recent_activity,
};
use crate::notify::Notifier;
use crate::session::Session;

const DEFAULT_EVENT_CAPACITY: usize = 256;
const DEFAULT_RESUBSCRIBE_ATTEMPTS: u32 = 3;
const DEFAULT_RESUBSCRIBE_BACKOFF: Duration = Duration::from_millis(500);

/// Changes pushed to live listeners.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboxEvent {
    /// A conversation was selected; carries its full timeline.
    Selected {
        conversation_id: Uuid,
        messages: Vec<Message>,
    },
    MessageAppended {
        conversation_id: Uuid,
        message: Message,
    },
    AutomationPaused {
        conversation_id: Uuid,
    },
}

#[derive(Default)]
struct ViewState {
    conversations: Vec<Conversation>,
    selected: Option<Uuid>,
    /// Bumped on every selection change; work started under an older
    /// generation is discarded.
    generation: u64,
    timeline: MessageTimeline,
    draft: String,
}

/// The running subscription pump of the selected conversation.
struct Pump {
    handle: JoinHandle<()>,
    /// Updated by the pump whenever it re-arms.
    subscription: Arc<Mutex<SubscriptionId>>,
}

/// Everything the pump task needs, detached from the view.
#[derive(Clone)]
struct PumpContext {
    gateway: Arc<dyn DataGateway>,
    state: Arc<RwLock<ViewState>>,
    events: broadcast::Sender<InboxEvent>,
    notifier: Notifier,
    conversation_id: Uuid,
    generation: u64,
    resubscribe_attempts: u32,
    resubscribe_backoff: Duration,
}

impl PumpContext {
    /// Merge messages into the timeline if this selection is still current.
    async fn merge(&self, messages: Vec<Message>) -> bool {
        let mut state = self.state.write().await;
        if state.generation != self.generation {
            return false;
        }
        for message in state.timeline.extend(messages) {
            let _ = self.events.send(InboxEvent::MessageAppended {
                conversation_id: self.conversation_id,
                message,
            });
        }
        true
    }

    /// Fetch history and merge anything at or after `since`.
    async fn catch_up(&self, since: Option<DateTime<Utc>>) {
        match self.gateway.list_messages(self.conversation_id).await {
            Ok(messages) => {
                let missed: Vec<Message> = messages
                    .into_iter()
                    .filter(|m| since.is_none_or(|at| m.created_at >= at))
                    .collect();
                debug!(
                    conversation_id = %self.conversation_id,
                    candidates = missed.len(),
                    "Catch-up fetch"
                );
                self.merge(missed).await;
            }
            Err(e) => {
                warn!(conversation_id = %self.conversation_id, error = %e, "Catch-up fetch failed");
            }
        }
    }

    async fn latest_seen(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.timeline.latest_created_at()
    }

    async fn resubscribe(&self) -> Option<MessageSubscription> {
        for attempt in 1..=self.resubscribe_attempts {
            tokio::time::sleep(self.resubscribe_backoff * attempt).await;
            match self.gateway.subscribe_messages(self.conversation_id).await {
                Ok(subscription) => {
                    info!(
                        conversation_id = %self.conversation_id,
                        attempt,
                        "Message subscription re-armed"
                    );
                    return Some(subscription);
                }
                Err(e) => {
                    warn!(
                        conversation_id = %self.conversation_id,
                        attempt,
                        error = %e,
                        "Resubscribe failed"
                    );
                }
            }
        }
        None
    }

    /// Forward live messages until the selection changes or the feed is
    /// lost for good.
    async fn run(
        self,
        mut subscription: MessageSubscription,
        current: Arc<Mutex<SubscriptionId>>,
        _release: SubscriptionRelease,
    ) {
        loop {
            while let Some(message) = subscription.receiver.recv().await {
                if !self.merge(vec![message]).await {
                    debug!(conversation_id = %self.conversation_id, "Selection changed, pump exiting");
                    return;
                }
            }

            warn!(conversation_id = %self.conversation_id, "Message subscription closed");
            self.gateway.unsubscribe(subscription.id).await;
            let Some(next) = self.resubscribe().await else {
                let err = GatewayError::SubscriptionClosed {
                    conversation_id: self.conversation_id,
                };
                warn!(conversation_id = %self.conversation_id, "Giving up on live updates");
                self.notifier.failure("Live updates stopped", &err);
                return;
            };
            *current.lock().unwrap_or_else(|e| e.into_inner()) = next.id;
            subscription = next;
            let since = self.latest_seen().await;
            self.catch_up(since).await;
        }
    }
}

/// Unsubscribes whatever the pump holds when the pump task ends, aborted or
/// not. Owned by the task's future, so it also fires if the task is aborted
/// before its first poll.
struct SubscriptionRelease {
    gateway: Arc<dyn DataGateway>,
    current: Arc<Mutex<SubscriptionId>>,
}

impl Drop for SubscriptionRelease {
    fn drop(&mut self) {
        let id = *self.current.lock().unwrap_or_else(|e| e.into_inner());
        let gateway = Arc::clone(&self.gateway);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move { gateway.unsubscribe(id).await });
        }
    }
}

/// Inbox controller: conversation list, one selected conversation with a
/// live timeline, and a draft.
pub struct ConversationView {
    gateway: Arc<dyn DataGateway>,
    session: Session,
    notifier: Notifier,
    state: Arc<RwLock<ViewState>>,
    pump: Mutex<Option<Pump>>,
    events: broadcast::Sender<InboxEvent>,
    resubscribe_attempts: u32,
    resubscribe_backoff: Duration,
}

impl ConversationView {
    pub fn new(gateway: Arc<dyn DataGateway>, session: Session, notifier: Notifier) -> Self {
        let (events, _rx) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        Self {
            gateway,
            session,
            notifier,
            state: Arc::new(RwLock::new(ViewState::default())),
            pump: Mutex::new(None),
            events,
            resubscribe_attempts: DEFAULT_RESUBSCRIBE_ATTEMPTS,
            resubscribe_backoff: DEFAULT_RESUBSCRIBE_BACKOFF,
        }
    }

    /// How often, and how patiently, a dropped feed is re-armed.
    pub fn with_resubscribe(mut self, attempts: u32, backoff: Duration) -> Self {
        self.resubscribe_attempts = attempts;
        self.resubscribe_backoff = backoff;
        self
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<InboxEvent> {
        self.events.subscribe()
    }

    /// Fetch the workspace's conversations, most recent activity first.
    pub async fn load_conversations(&self) -> Result<Vec<Conversation>, Error> {
        let workspace_id = self.session.workspace_id;
        match self.gateway.list_conversations(workspace_id).await {
            Ok(list) => {
                debug!(workspace_id = %workspace_id, count = list.len(), "Conversations loaded");
                self.state.write().await.conversations = list.clone();
                Ok(list)
            }
            Err(e) => {
                warn!(workspace_id = %workspace_id, error = %e, "Failed to load conversations");
                self.notifier.failure("Could not load conversations", &e);
                Err(e.into())
            }
        }
    }

    /// Loaded conversations whose contact name contains `query`, ignoring
    /// case. Conversations without a contact never match.
    pub async fn conversations(&self, query: &str) -> Vec<Conversation> {
        let needle = query.to_lowercase();
        self.state
            .read()
            .await
            .conversations
            .iter()
            .filter(|c| {
                c.contact_name()
                    .is_some_and(|name| name.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect()
    }

    pub async fn selected(&self) -> Option<Uuid> {
        self.state.read().await.selected
    }

    /// Contact of the selected conversation, for the header.
    pub async fn selected_contact(&self) -> Option<Contact> {
        let state = self.state.read().await;
        let id = state.selected?;
        state
            .conversations
            .iter()
            .find(|c| c.id == id)
            .and_then(|c| c.contact.clone())
    }

    pub async fn timeline(&self) -> Vec<Message> {
        self.state.read().await.timeline.messages().to_vec()
    }

    pub async fn draft(&self) -> String {
        self.state.read().await.draft.clone()
    }

    pub async fn set_draft(&self, draft: impl Into<String>) {
        self.state.write().await.draft = draft.into();
    }

    /// Make `conversation_id` the selected conversation and go live on it.
    ///
    /// The previous feed is torn down first. If another selection starts
    /// while this one is still loading, this one's results are dropped.
    pub async fn select(&self, conversation_id: Uuid) -> Result<(), Error> {
        let (generation, previous) = {
            let mut state = self.state.write().await;
            if !state.conversations.iter().any(|c| c.id == conversation_id) {
                return Err(InboxError::UnknownConversation(conversation_id).into());
            }
            state.generation += 1;
            state.selected = Some(conversation_id);
            state.timeline.clear();
            (state.generation, self.take_pump())
        };
        if let Some(pump) = previous {
            self.teardown(pump).await;
        }

        let snapshot = match self.gateway.list_messages(conversation_id).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "Failed to load messages");
                self.notifier.failure("Could not load messages", &e);
                return Err(e.into());
            }
        };
        let since = {
            let mut state = self.state.write().await;
            if state.generation != generation {
                debug!(conversation_id = %conversation_id, "Discarding stale snapshot");
                return Ok(());
            }
            state.timeline.replace(snapshot);
            state.timeline.latest_created_at()
        };

        let subscription = match self.gateway.subscribe_messages(conversation_id).await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "Failed to subscribe to messages");
                self.notifier.failure("Live updates unavailable", &e);
                return Err(e.into());
            }
        };

        let ctx = PumpContext {
            gateway: Arc::clone(&self.gateway),
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            notifier: self.notifier.clone(),
            conversation_id,
            generation,
            resubscribe_attempts: self.resubscribe_attempts,
            resubscribe_backoff: self.resubscribe_backoff,
        };
        // Closes the gap between the snapshot and the subscription going live.
        ctx.catch_up(since).await;

        let state = self.state.read().await;
        if state.generation != generation {
            drop(state);
            self.gateway.unsubscribe(subscription.id).await;
            return Ok(());
        }
        let _ = self.events.send(InboxEvent::Selected {
            conversation_id,
            messages: state.timeline.messages().to_vec(),
        });
        let current = Arc::new(Mutex::new(subscription.id));
        let release = SubscriptionRelease {
            gateway: Arc::clone(&self.gateway),
            current: Arc::clone(&current),
        };
        let handle = tokio::spawn(ctx.run(subscription, Arc::clone(&current), release));
        *self.lock_pump() = Some(Pump {
            handle,
            subscription: current,
        });
        info!(
            conversation_id = %conversation_id,
            messages = state.timeline.len(),
            "Conversation selected"
        );
        Ok(())
    }

    /// Drop the selection and stop the live feed.
    pub async fn close(&self) {
        let previous = {
            let mut state = self.state.write().await;
            state.generation += 1;
            state.selected = None;
            state.timeline.clear();
            self.take_pump()
        };
        if let Some(pump) = previous {
            self.teardown(pump).await;
        }
    }

    /// Send `content` as a staff message in the selected conversation.
    pub async fn send_text(&self, content: impl Into<String>) -> Result<Message, Error> {
        self.set_draft(content).await;
        self.send().await
    }

    /// Send the current draft.
    ///
    /// A manual reply pauses automation on the conversation. The draft is
    /// cleared once the message is stored; if pausing fails afterwards that
    /// is reported but the send still counts.
    pub async fn send(&self) -> Result<Message, Error> {
        let (conversation_id, content) = {
            let state = self.state.read().await;
            let id = state.selected.ok_or(InboxError::NoSelection)?;
            let content = state.draft.trim();
            if content.is_empty() {
                return Err(InboxError::BlankDraft.into());
            }
            (id, content.to_string())
        };

        let message = match self
            .gateway
            .insert_message(&NewMessage::manual(conversation_id, content))
            .await
        {
            Ok(message) => message,
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "Failed to send message");
                self.notifier.failure("Could not send message", &e);
                return Err(e.into());
            }
        };
        info!(conversation_id = %conversation_id, message_id = %message.id, "Message sent");

        let paused = match self
            .gateway
            .set_automation_paused(conversation_id, true)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "Failed to pause automation");
                self.notifier.failure("Could not pause automation", &e);
                false
            }
        };

        let mut state = self.state.write().await;
        state.draft.clear();
        if let Some(convo) = state
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        {
            convo.last_message_at = Some(message.created_at);
            if paused {
                convo.automation_paused = true;
            }
        }
        sort_by_recent_activity(&mut state.conversations);
        if paused {
            let _ = self
                .events
                .send(InboxEvent::AutomationPaused { conversation_id });
        }
        if state.selected == Some(conversation_id) && state.timeline.insert(message.clone()) {
            let _ = self.events.send(InboxEvent::MessageAppended {
                conversation_id,
                message: message.clone(),
            });
        }
        Ok(message)
    }

    fn lock_pump(&self) -> std::sync::MutexGuard<'_, Option<Pump>> {
        self.pump.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take_pump(&self) -> Option<Pump> {
        self.lock_pump().take()
    }

    async fn teardown(&self, pump: Pump) {
        pump.handle.abort();
        // Once the task has stopped, the stored id cannot change any more.
        let _ = pump.handle.await;
        let id = *pump.subscription.lock().unwrap_or_else(|e| e.into_inner());
        self.gateway.unsubscribe(id).await;
        debug!(subscription = %id, "Message subscription torn down");
    }
}

impl Drop for ConversationView {
    fn drop(&mut self) {
        if let Some(pump) = self.take_pump() {
            pump.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{InMemoryGateway, MessageType, Sender};
    use crate::notify::Severity;
    use crate::session::Role;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    struct Fixture {
        gw: Arc<InMemoryGateway>,
        view: ConversationView,
        alice: Uuid,
        bob: Uuid,
    }

    async fn seed_conversation(gw: &InMemoryGateway, workspace_id: Uuid, name: &str) -> Uuid {
        let contact = Contact {
            id: Uuid::new_v4(),
            name: name.into(),
            email: None,
        };
        let convo = Conversation {
            id: Uuid::new_v4(),
            workspace_id,
            contact_id: contact.id,
            status: "open".into(),
            automation_paused: false,
            last_message_at: None,
            contact: None,
        };
        let id = convo.id;
        gw.put_contact(contact).await;
        gw.put_conversation(convo).await;
        id
    }

    async fn fixture() -> Fixture {
        let gw = Arc::new(InMemoryGateway::new());
        let session = Session::new(Uuid::new_v4(), Uuid::new_v4(), Role::Staff);
        let alice = seed_conversation(&gw, session.workspace_id, "Alice Smith").await;
        let bob = seed_conversation(&gw, session.workspace_id, "Bob Jones").await;
        let view = ConversationView::new(gw.clone(), session, Notifier::new())
            .with_resubscribe(3, Duration::from_millis(10));
        view.load_conversations().await.unwrap();
        Fixture { gw, view, alice, bob }
    }

    fn inbound(conversation_id: Uuid, content: &str) -> NewMessage {
        NewMessage {
            conversation_id,
            sender: Sender::Contact,
            content: content.into(),
            message_type: MessageType::Manual,
        }
    }

    async fn next_appended(rx: &mut broadcast::Receiver<InboxEvent>) -> Message {
        loop {
            let event = timeout(WAIT, rx.recv()).await.expect("timed out").unwrap();
            if let InboxEvent::MessageAppended { message, .. } = event {
                return message;
            }
        }
    }

    #[tokio::test]
    async fn filter_by_contact_name() {
        let f = fixture().await;
        assert_eq!(f.view.conversations("").await.len(), 2);
        let hits = f.view.conversations("aLiCe").await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, f.alice);
        assert!(f.view.conversations("zed").await.is_empty());
        assert!(f.view.conversations(" alice ").await.is_empty(), "query is not trimmed");
    }

    #[tokio::test]
    async fn conversation_without_contact_never_matches() {
        let f = fixture().await;
        let orphan = Conversation {
            id: Uuid::new_v4(),
            workspace_id: f.view.session.workspace_id,
            contact_id: Uuid::new_v4(),
            status: "open".into(),
            automation_paused: false,
            last_message_at: None,
            contact: None,
        };
        f.gw.put_conversation(orphan).await;
        assert_eq!(f.view.load_conversations().await.unwrap().len(), 3);

        assert_eq!(f.view.conversations("").await.len(), 2);
    }

    #[tokio::test]
    async fn dropping_the_view_releases_the_feed() {
        let f = fixture().await;
        f.view.select(f.alice).await.unwrap();
        assert_eq!(f.gw.subscription_count(), 1);

        drop(f.view);
        timeout(WAIT, async {
            while f.gw.subscription_count() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("subscription was not released");
    }

    #[tokio::test]
    async fn teardown_after_rearm_releases_the_new_feed() {
        let f = fixture().await;
        f.view.select(f.alice).await.unwrap();

        f.gw.drop_all_subscriptions();
        timeout(WAIT, async {
            while f.gw.subscription_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("feed was not re-armed");

        f.view.close().await;
        assert_eq!(f.gw.subscription_count(), 0);
    }

    #[tokio::test]
    async fn select_loads_history_and_goes_live() {
        let f = fixture().await;
        f.gw.insert_message(&inbound(f.alice, "hello")).await.unwrap();

        let mut rx = f.view.subscribe_events();
        f.view.select(f.alice).await.unwrap();
        assert_eq!(f.view.timeline().await.len(), 1);
        assert_eq!(
            f.view.selected_contact().await.map(|c| c.name),
            Some("Alice Smith".to_string())
        );

        f.gw.insert_message(&inbound(f.alice, "are you there?")).await.unwrap();
        let live = next_appended(&mut rx).await;
        assert_eq!(live.content, "are you there?");
        assert_eq!(f.view.timeline().await.len(), 2);
    }

    #[tokio::test]
    async fn switching_conversation_tears_down_previous_feed() {
        let f = fixture().await;
        f.view.select(f.alice).await.unwrap();
        assert_eq!(f.gw.subscription_count(), 1);

        f.view.select(f.bob).await.unwrap();
        assert_eq!(f.gw.subscription_count(), 1);

        let mut rx = f.view.subscribe_events();
        f.gw.insert_message(&inbound(f.alice, "stale")).await.unwrap();
        f.gw.insert_message(&inbound(f.bob, "fresh")).await.unwrap();
        let live = next_appended(&mut rx).await;
        assert_eq!(live.content, "fresh");
        let contents: Vec<String> = f.view.timeline().await.into_iter().map(|m| m.content).collect();
        assert_eq!(contents, ["fresh"]);
    }

    #[tokio::test]
    async fn send_pauses_automation_and_appends_once() {
        let f = fixture().await;
        f.view.select(f.alice).await.unwrap();
        f.view.set_draft("  On our way!  ").await;

        let sent = f.view.send().await.unwrap();
        assert_eq!(sent.sender, Sender::Staff);
        assert_eq!(sent.message_type, MessageType::Manual);
        assert_eq!(sent.content, "On our way!");
        assert_eq!(f.view.draft().await, "");

        // The live feed delivers the same row; give the pump a moment.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let timeline = f.view.timeline().await;
        assert_eq!(timeline.iter().filter(|m| m.id == sent.id).count(), 1);
        assert!(f.gw.conversation(f.alice).await.unwrap().automation_paused);
    }

    #[tokio::test]
    async fn send_requires_selection_and_content() {
        let f = fixture().await;
        assert!(matches!(
            f.view.send_text("hi").await,
            Err(Error::Inbox(InboxError::NoSelection))
        ));
        f.view.select(f.alice).await.unwrap();
        assert!(matches!(
            f.view.send_text("   ").await,
            Err(Error::Inbox(InboxError::BlankDraft))
        ));
        assert!(f.view.timeline().await.is_empty());
    }

    #[tokio::test]
    async fn failed_insert_keeps_draft() {
        let f = fixture().await;
        let mut notes = f.view.notifier.subscribe();
        f.view.select(f.alice).await.unwrap();
        f.gw.fail_writes_to("messages");

        assert!(f.view.send_text("hello").await.is_err());
        assert_eq!(f.view.draft().await, "hello");
        assert_eq!(notes.recv().await.unwrap().severity, Severity::Destructive);
        assert!(!f.gw.conversation(f.alice).await.unwrap().automation_paused);
    }

    #[tokio::test]
    async fn failed_pause_still_sends() {
        let f = fixture().await;
        f.view.select(f.alice).await.unwrap();
        f.gw.fail_writes_to("conversations");

        let sent = f.view.send_text("hello").await.unwrap();
        assert_eq!(f.view.draft().await, "");
        assert!(f.view.timeline().await.iter().any(|m| m.id == sent.id));
        assert!(!f.gw.conversation(f.alice).await.unwrap().automation_paused);
    }

    #[tokio::test]
    async fn unknown_conversation_is_rejected() {
        let f = fixture().await;
        let missing = Uuid::new_v4();
        assert!(matches!(
            f.view.select(missing).await,
            Err(Error::Inbox(InboxError::UnknownConversation(id))) if id == missing
        ));
        assert_eq!(f.view.selected().await, None);
    }

    #[tokio::test]
    async fn dropped_feed_is_rearmed_and_caught_up() {
        let f = fixture().await;
        f.view.select(f.alice).await.unwrap();

        f.gw.drop_all_subscriptions();
        // Inserted while no feed is armed; only the catch-up can find it.
        f.gw.insert_message(&inbound(f.alice, "while you were away")).await.unwrap();

        let mut found = false;
        for _ in 0..100 {
            if f.view.timeline().await.len() == 1 {
                found = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(found, "catch-up did not recover the missed message");
        assert_eq!(f.gw.subscription_count(), 1);

        let mut rx = f.view.subscribe_events();
        f.gw.insert_message(&inbound(f.alice, "back online")).await.unwrap();
        assert_eq!(next_appended(&mut rx).await.content, "back online");
    }

    #[tokio::test]
    async fn close_stops_feed() {
        let f = fixture().await;
        f.view.select(f.alice).await.unwrap();
        f.view.close().await;
        assert_eq!(f.view.selected().await, None);
        assert_eq!(f.gw.subscription_count(), 0);
    }
}
