//! Hosted backend gateway: a PostgREST-style HTTP API over `reqwest`.
//!
//! Rows are addressed with query filters (`id=eq.<uuid>`), inserts ask for
//! the stored row back with `Prefer: return=representation`, and every
//! request carries the project key plus the signed-in user's bearer token so
//! row-level security applies. Live message delivery is a polling task per
//! subscription that re-reads a trailing window behind the newest row it
//! forwarded, so rows that commit late are still picked up.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::model::{
    Conversation, InventoryItem, Message, NewInventoryItem, NewMessage, NewService, Service,
    Workspace, WorkspaceUpdate,
};
use super::{DataGateway, MessageSubscription, SUBSCRIPTION_BUFFER, SubscriptionId};
use crate::config::AppConfig;
use crate::error::{ConfigError, GatewayError};

/// Shared HTTP client for the hosted backend (REST and auth endpoints).
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: SecretString,
    timeout: Duration,
    access_token: RwLock<Option<SecretString>>,
}

impl RestClient {
    pub fn new(config: &AppConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "CAREOPS_REQUEST_TIMEOUT_SECS".into(),
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            timeout: config.request_timeout,
            access_token: RwLock::new(None),
        })
    }

    /// Record (or clear) the bearer token used for row-level security.
    pub fn set_access_token(&self, token: Option<SecretString>) {
        *self.access_token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    pub fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    /// Start a request carrying the project key and the current bearer token
    /// (the project key itself when nobody is signed in).
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let bearer = self
            .access_token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|t| t.expose_secret().to_string())
            .unwrap_or_else(|| self.anon_key.expose_secret().to_string());
        self.http
            .request(method, url)
            .header("apikey", self.anon_key.expose_secret())
            .bearer_auth(bearer)
    }

    /// Send and decode a JSON body.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        table: &str,
        request: RequestBuilder,
    ) -> Result<T, GatewayError> {
        let response = self.send(table, request).await?;
        response.json::<T>().await.map_err(|e| GatewayError::Decode {
            table: table.to_string(),
            reason: e.to_string(),
        })
    }

    /// Send and discard the body.
    pub async fn send_empty(&self, table: &str, request: RequestBuilder) -> Result<(), GatewayError> {
        self.send(table, request).await.map(|_| ())
    }

    async fn send(
        &self,
        table: &str,
        request: RequestBuilder,
    ) -> Result<reqwest::Response, GatewayError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout {
                    table: table.to_string(),
                    timeout: self.timeout,
                }
            } else {
                GatewayError::RequestFailed {
                    table: table.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                table: table.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

/// How far behind the newest forwarded row each poll looks again.
///
/// `created_at` is stamped when the inserting transaction starts, so a row
/// can become visible after a newer one. This bounds how late it may be.
const POLL_LOOKBACK_SECS: i64 = 60;

type Pollers = Arc<Mutex<HashMap<SubscriptionId, JoinHandle<()>>>>;

fn lock_pollers(pollers: &Pollers) -> MutexGuard<'_, HashMap<SubscriptionId, JoinHandle<()>>> {
    pollers.lock().unwrap_or_else(|e| e.into_inner())
}

/// [`DataGateway`] backed by the hosted REST API.
pub struct RestGateway {
    client: Arc<RestClient>,
    poll_interval: Duration,
    pollers: Pollers,
}

impl RestGateway {
    pub fn new(client: Arc<RestClient>, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
            pollers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn insert_returning<B, T>(&self, table: &str, body: &B) -> Result<T, GatewayError>
    where
        B: serde::Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let request = self
            .client
            .request(Method::POST, &self.client.rest_url(table))
            .header("Prefer", "return=representation")
            .json(body);
        let mut rows: Vec<T> = self.client.send_json(table, request).await?;
        if rows.is_empty() {
            return Err(GatewayError::Decode {
                table: table.to_string(),
                reason: "insert returned no row".to_string(),
            });
        }
        Ok(rows.swap_remove(0))
    }
}

impl Drop for RestGateway {
    fn drop(&mut self) {
        let handles: Vec<JoinHandle<()>> = lock_pollers(&self.pollers)
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        for handle in handles {
            handle.abort();
        }
    }
}

#[async_trait]
impl DataGateway for RestGateway {
    async fn get_workspace(&self, id: Uuid) -> Result<Option<Workspace>, GatewayError> {
        let request = self
            .client
            .request(Method::GET, &self.client.rest_url("workspaces"))
            .query(&[("id", format!("eq.{id}")), ("select", "*".to_string())]);
        let rows: Vec<Workspace> = self.client.send_json("workspaces", request).await?;
        Ok(rows.into_iter().next())
    }

    async fn update_workspace(
        &self,
        id: Uuid,
        update: &WorkspaceUpdate,
    ) -> Result<(), GatewayError> {
        let request = self
            .client
            .request(Method::PATCH, &self.client.rest_url("workspaces"))
            .query(&[("id", format!("eq.{id}"))])
            .json(update);
        self.client.send_empty("workspaces", request).await
    }

    async fn insert_service(&self, service: &NewService) -> Result<Service, GatewayError> {
        self.insert_returning("services", service).await
    }

    async fn insert_inventory_item(
        &self,
        item: &NewInventoryItem,
    ) -> Result<InventoryItem, GatewayError> {
        self.insert_returning("inventory", item).await
    }

    async fn list_inventory(&self, workspace_id: Uuid) -> Result<Vec<InventoryItem>, GatewayError> {
        let request = self
            .client
            .request(Method::GET, &self.client.rest_url("inventory"))
            .query(&[
                ("workspace_id", format!("eq.{workspace_id}")),
                ("order", "name.asc".to_string()),
            ]);
        self.client.send_json("inventory", request).await
    }

    async fn list_conversations(
        &self,
        workspace_id: Uuid,
    ) -> Result<Vec<Conversation>, GatewayError> {
        let request = self
            .client
            .request(Method::GET, &self.client.rest_url("conversations"))
            .query(&[
                ("select", "*,contacts(*)".to_string()),
                ("workspace_id", format!("eq.{workspace_id}")),
                ("order", "last_message_at.desc.nullslast".to_string()),
            ]);
        self.client.send_json("conversations", request).await
    }

    async fn set_automation_paused(
        &self,
        conversation_id: Uuid,
        paused: bool,
    ) -> Result<(), GatewayError> {
        let request = self
            .client
            .request(Method::PATCH, &self.client.rest_url("conversations"))
            .query(&[("id", format!("eq.{conversation_id}"))])
            .json(&serde_json::json!({ "automation_paused": paused }));
        self.client.send_empty("conversations", request).await
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, GatewayError> {
        fetch_messages_since(&self.client, conversation_id, None).await
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<Message, GatewayError> {
        self.insert_returning("messages", message).await
    }

    /// Start a poller for `conversation_id`.
    ///
    /// Only the newest row at subscribe time counts as delivered. Older rows
    /// inside the lookback window are forwarded once on the first poll; the
    /// consumer deduplicates them by id.
    async fn subscribe_messages(
        &self,
        conversation_id: Uuid,
    ) -> Result<MessageSubscription, GatewayError> {
        let request = self
            .client
            .request(Method::GET, &self.client.rest_url("messages"))
            .query(&[
                ("conversation_id", format!("eq.{conversation_id}")),
                ("order", "created_at.desc".to_string()),
                ("limit", "1".to_string()),
            ]);
        let latest: Vec<Message> = self.client.send_json("messages", request).await?;
        let cursor = PollCursor::from_latest(
            latest.first(),
            chrono::Duration::seconds(POLL_LOOKBACK_SECS),
        );

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let id = SubscriptionId::new();
        let entry = PollerEntry {
            pollers: Arc::clone(&self.pollers),
            id,
        };
        {
            // Held across the spawn so the task cannot drop its entry first.
            let mut pollers = lock_pollers(&self.pollers);
            let handle = tokio::spawn(poll_messages(
                Arc::clone(&self.client),
                conversation_id,
                tx,
                self.poll_interval,
                cursor,
                entry,
            ));
            pollers.insert(id, handle);
        }
        info!(subscription = %id, conversation_id = %conversation_id, "Message poller started");

        Ok(MessageSubscription {
            id,
            conversation_id,
            receiver: rx,
        })
    }

    async fn unsubscribe(&self, id: SubscriptionId) {
        let handle = lock_pollers(&self.pollers).remove(&id);
        if let Some(handle) = handle {
            handle.abort();
            debug!(subscription = %id, "Message poller stopped");
        }
    }
}

/// A poller's slot in the gateway's map, released when the task ends.
struct PollerEntry {
    pollers: Pollers,
    id: SubscriptionId,
}

impl Drop for PollerEntry {
    fn drop(&mut self) {
        lock_pollers(&self.pollers).remove(&self.id);
    }
}

/// What a poller has already forwarded.
///
/// Each poll asks for everything from `newest - lookback` on. Ids inside that
/// window are remembered so nothing goes out twice; older ids are forgotten
/// since the query no longer returns them.
#[derive(Debug)]
struct PollCursor {
    newest: Option<DateTime<Utc>>,
    lookback: chrono::Duration,
    seen: HashMap<Uuid, DateTime<Utc>>,
}

impl PollCursor {
    fn from_latest(latest: Option<&Message>, lookback: chrono::Duration) -> Self {
        let mut cursor = Self {
            newest: None,
            lookback,
            seen: HashMap::new(),
        };
        if let Some(message) = latest {
            cursor.advance(message);
        }
        cursor
    }

    /// Lower bound of the next poll.
    fn since(&self) -> Option<DateTime<Utc>> {
        self.newest.map(|at| at - self.lookback)
    }

    /// Record `message`; false if it was already forwarded.
    fn advance(&mut self, message: &Message) -> bool {
        if self.seen.contains_key(&message.id) {
            return false;
        }
        self.seen.insert(message.id, message.created_at);
        if self.newest.is_none_or(|at| message.created_at > at) {
            self.newest = Some(message.created_at);
        }
        true
    }

    fn forget_expired(&mut self) {
        if let Some(floor) = self.since() {
            self.seen.retain(|_, at| *at >= floor);
        }
    }
}

async fn fetch_messages_since(
    client: &RestClient,
    conversation_id: Uuid,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<Message>, GatewayError> {
    let mut query = vec![
        ("conversation_id", format!("eq.{conversation_id}")),
        ("order", "created_at.asc".to_string()),
    ];
    if let Some(since) = since {
        query.push(("created_at", format!("gte.{}", since.to_rfc3339())));
    }
    let request = client
        .request(Method::GET, &client.rest_url("messages"))
        .query(&query);
    client.send_json("messages", request).await
}

async fn poll_messages(
    client: Arc<RestClient>,
    conversation_id: Uuid,
    tx: mpsc::Sender<Message>,
    interval: Duration,
    mut cursor: PollCursor,
    _entry: PollerEntry,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let rows = match fetch_messages_since(&client, conversation_id, cursor.since()).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "Message poll failed");
                continue;
            }
        };
        for row in rows {
            if !cursor.advance(&row) {
                continue;
            }
            if tx.send(row).await.is_err() {
                debug!(conversation_id = %conversation_id, "Poll receiver dropped, stopping");
                return;
            }
        }
        cursor.forget_expired();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::extract::{Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use chrono::Duration as TimeDelta;
    use serde_json::{Value, json};
    use tokio::time::timeout;

    use super::*;
    use crate::gateway::model::{MessageType, Sender};

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);
    const WORKSPACE_ID: &str = "0b8f3f2e-3d8e-4c6f-9a3e-7d2c1e5f4a22";
    const SLOW_WORKSPACE_ID: &str = "5d0e7a11-6c0b-4d5e-8f43-2a9b3c7d1e00";

    fn message_at(conversation_id: Uuid, at: DateTime<Utc>) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender: Sender::Contact,
            content: "hi".into(),
            message_type: MessageType::Manual,
            created_at: at,
        }
    }

    fn lookback() -> TimeDelta {
        TimeDelta::seconds(POLL_LOOKBACK_SECS)
    }

    #[test]
    fn cursor_skips_already_forwarded() {
        let t0 = Utc::now();
        let first = message_at(Uuid::nil(), t0);
        let mut cursor = PollCursor::from_latest(Some(&first), lookback());

        assert!(!cursor.advance(&first), "latest at subscribe time is not re-sent");

        let same_instant = message_at(Uuid::nil(), t0);
        assert!(cursor.advance(&same_instant));
        assert!(!cursor.advance(&same_instant));

        let later = message_at(Uuid::nil(), t0 + TimeDelta::seconds(1));
        assert!(cursor.advance(&later));
        assert_eq!(cursor.newest, Some(later.created_at));
    }

    #[test]
    fn late_committed_row_is_still_forwarded() {
        let t0 = Utc::now();
        let mut cursor = PollCursor::from_latest(None, lookback());
        assert!(cursor.since().is_none());

        assert!(cursor.advance(&message_at(Uuid::nil(), t0 + TimeDelta::seconds(2))));
        let late = message_at(Uuid::nil(), t0 + TimeDelta::seconds(1));
        assert!(cursor.advance(&late));
        assert!(!cursor.advance(&late));

        // The next poll still covers rows older than the newest one.
        assert_eq!(cursor.newest, Some(t0 + TimeDelta::seconds(2)));
        assert!(cursor.since().is_some_and(|since| since <= late.created_at));
    }

    #[test]
    fn ids_outside_the_window_are_forgotten() {
        let t0 = Utc::now();
        let old = message_at(Uuid::nil(), t0);
        let mut cursor = PollCursor::from_latest(Some(&old), TimeDelta::seconds(10));
        let recent = message_at(Uuid::nil(), t0 + TimeDelta::seconds(30));
        cursor.advance(&recent);

        cursor.forget_expired();
        assert!(!cursor.seen.contains_key(&old.id));
        assert!(cursor.seen.contains_key(&recent.id));
    }

    #[test]
    fn urls_are_rooted_at_backend() {
        let config = AppConfig {
            backend_url: "https://example.test/".into(),
            ..AppConfig::default()
        };
        let client = RestClient::new(&config).unwrap();
        assert_eq!(client.rest_url("workspaces"), "https://example.test/rest/v1/workspaces");
        assert_eq!(client.auth_url("signup"), "https://example.test/auth/v1/signup");
        assert!(!client.has_access_token());
        client.set_access_token(Some(SecretString::from("token".to_string())));
        assert!(client.has_access_token());
    }

    // --- Stub backend ---

    #[derive(Default)]
    struct Stub {
        messages: Mutex<Vec<Message>>,
        patches: Mutex<Vec<(String, Value)>>,
    }

    impl Stub {
        fn push(&self, message: Message) {
            self.messages.lock().unwrap().push(message);
        }
    }

    type Params = Query<HashMap<String, String>>;

    fn authorized(headers: &HeaderMap) -> bool {
        let bearer = headers.get("authorization").and_then(|v| v.to_str().ok());
        let apikey = headers.get("apikey").and_then(|v| v.to_str().ok());
        bearer == Some("Bearer user-token") && apikey == Some("anon")
    }

    fn param<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
        params.get(key).map(String::as_str)
    }

    async fn get_workspace(headers: HeaderMap, Query(params): Params) -> Response {
        if !authorized(&headers) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        if param(&params, "id") == Some(format!("eq.{SLOW_WORKSPACE_ID}").as_str()) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        if param(&params, "id") != Some(format!("eq.{WORKSPACE_ID}").as_str()) {
            return Json(json!([])).into_response();
        }
        Json(json!([{
            "id": WORKSPACE_ID,
            "name": "Acme Services",
            "status": "draft",
            "onboarding_step": 3
        }]))
        .into_response()
    }

    async fn patch_workspace(
        State(stub): State<Arc<Stub>>,
        Query(params): Params,
        Json(body): Json<Value>,
    ) -> StatusCode {
        let filter = param(&params, "id").unwrap_or_default().to_string();
        stub.patches.lock().unwrap().push((filter, body));
        StatusCode::NO_CONTENT
    }

    async fn insert_service(headers: HeaderMap, Json(mut body): Json<Value>) -> Response {
        let prefer = headers.get("prefer").and_then(|v| v.to_str().ok());
        if prefer != Some("return=representation") {
            return StatusCode::BAD_REQUEST.into_response();
        }
        if body["name"] == "Ghost" {
            return Json(json!([])).into_response();
        }
        body["id"] = json!(Uuid::new_v4());
        (StatusCode::CREATED, Json(json!([body]))).into_response()
    }

    async fn list_conversations(Query(params): Params) -> Response {
        if param(&params, "select") != Some("*,contacts(*)")
            || param(&params, "order") != Some("last_message_at.desc.nullslast")
            || param(&params, "workspace_id") != Some(format!("eq.{WORKSPACE_ID}").as_str())
        {
            return (StatusCode::BAD_REQUEST, "unexpected filters").into_response();
        }
        let contact_id = Uuid::new_v4();
        Json(json!([
            {
                "id": Uuid::new_v4(),
                "workspace_id": WORKSPACE_ID,
                "contact_id": contact_id,
                "status": "open",
                "automation_paused": false,
                "last_message_at": "2026-10-18T09:00:00Z",
                "contacts": {"id": contact_id, "name": "Ada Lovelace", "email": null}
            },
            {
                "id": Uuid::new_v4(),
                "workspace_id": WORKSPACE_ID,
                "contact_id": Uuid::new_v4(),
                "status": "open",
                "last_message_at": null,
                "contacts": null
            }
        ]))
        .into_response()
    }

    async fn list_inventory() -> (StatusCode, &'static str) {
        (StatusCode::INTERNAL_SERVER_ERROR, "boom: relation does not exist")
    }

    async fn list_messages(State(stub): State<Arc<Stub>>, Query(params): Params) -> Json<Vec<Message>> {
        let conversation = param(&params, "conversation_id")
            .and_then(|v| v.strip_prefix("eq."))
            .and_then(|v| Uuid::parse_str(v).ok());
        let since = param(&params, "created_at")
            .and_then(|v| v.strip_prefix("gte."))
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|at| at.with_timezone(&Utc));
        let mut rows: Vec<Message> = stub
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| Some(m.conversation_id) == conversation)
            .filter(|m| since.is_none_or(|at| m.created_at >= at))
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.created_at);
        if param(&params, "order") == Some("created_at.desc") {
            rows.reverse();
        }
        if let Some(limit) = param(&params, "limit").and_then(|v| v.parse().ok()) {
            rows.truncate(limit);
        }
        Json(rows)
    }

    async fn start_stub(request_timeout: Duration) -> (RestGateway, Arc<Stub>) {
        let stub = Arc::new(Stub::default());
        let app = Router::new()
            .route("/rest/v1/workspaces", get(get_workspace).patch(patch_workspace))
            .route("/rest/v1/services", post(insert_service))
            .route("/rest/v1/conversations", get(list_conversations))
            .route("/rest/v1/inventory", get(list_inventory))
            .route("/rest/v1/messages", get(list_messages))
            .with_state(Arc::clone(&stub));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let config = AppConfig {
            backend_url: format!("http://127.0.0.1:{port}"),
            anon_key: SecretString::from("anon".to_string()),
            request_timeout,
            ..AppConfig::default()
        };
        let client = Arc::new(RestClient::new(&config).unwrap());
        client.set_access_token(Some(SecretString::from("user-token".to_string())));
        (RestGateway::new(client, Duration::from_millis(20)), stub)
    }

    async fn wait_for_no_pollers(gateway: &RestGateway) {
        timeout(TEST_TIMEOUT, async {
            while !lock_pollers(&gateway.pollers).is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("pollers were not released");
    }

    #[tokio::test]
    async fn workspace_is_fetched_by_id_with_bearer() {
        let (gateway, _stub) = start_stub(Duration::from_secs(5)).await;
        let id = Uuid::parse_str(WORKSPACE_ID).unwrap();

        let ws = gateway.get_workspace(id).await.unwrap().unwrap();
        assert_eq!(ws.name, "Acme Services");
        assert_eq!(ws.onboarding_step, Some(3));
        assert!(gateway.get_workspace(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn workspace_update_patches_only_set_fields() {
        let (gateway, stub) = start_stub(Duration::from_secs(5)).await;
        let id = Uuid::parse_str(WORKSPACE_ID).unwrap();

        gateway.update_workspace(id, &WorkspaceUpdate::step(4)).await.unwrap();

        let patches = stub.patches.lock().unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].0, format!("eq.{WORKSPACE_ID}"));
        assert_eq!(patches[0].1, json!({"onboarding_step": 4}));
    }

    #[tokio::test]
    async fn insert_returns_the_stored_row() {
        let (gateway, _stub) = start_stub(Duration::from_secs(5)).await;
        let mut service = NewService {
            workspace_id: Uuid::parse_str(WORKSPACE_ID).unwrap(),
            name: "Deep Clean".into(),
            duration: 90,
            price: None,
            location: "On site".into(),
            slug: "deep-clean".into(),
        };

        let stored = gateway.insert_service(&service).await.unwrap();
        assert_eq!(stored.name, "Deep Clean");
        assert_eq!(stored.duration, 90);
        assert_eq!(stored.slug.as_deref(), Some("deep-clean"));

        service.name = "Ghost".into();
        let err = gateway.insert_service(&service).await.unwrap_err();
        assert!(
            matches!(&err, GatewayError::Decode { table, reason } if table == "services" && reason.contains("no row")),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn conversations_join_contacts_most_recent_first() {
        let (gateway, _stub) = start_stub(Duration::from_secs(5)).await;

        let list = gateway
            .list_conversations(Uuid::parse_str(WORKSPACE_ID).unwrap())
            .await
            .unwrap();

        assert_eq!(list.len(), 2);
        assert_eq!(list[0].contact_name(), Some("Ada Lovelace"));
        assert!(list[1].contact.is_none());
        assert!(list[1].last_message_at.is_none());
    }

    #[tokio::test]
    async fn error_status_keeps_code_and_body() {
        let (gateway, _stub) = start_stub(Duration::from_secs(5)).await;

        let err = gateway.list_inventory(Uuid::new_v4()).await.unwrap_err();

        match err {
            GatewayError::Status { table, status, body } => {
                assert_eq!(table, "inventory");
                assert_eq!(status, 500);
                assert!(body.contains("boom"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_backend_is_a_timeout() {
        let (gateway, _stub) = start_stub(Duration::from_millis(200)).await;

        let err = gateway
            .get_workspace(Uuid::parse_str(SLOW_WORKSPACE_ID).unwrap())
            .await
            .unwrap_err();

        assert!(
            matches!(&err, GatewayError::Timeout { table, .. } if table == "workspaces"),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn poller_forwards_new_and_late_committed_rows() {
        let (gateway, stub) = start_stub(Duration::from_secs(5)).await;
        let conversation_id = Uuid::new_v4();
        let t0 = Utc::now();
        stub.push(message_at(conversation_id, t0));

        let mut sub = gateway.subscribe_messages(conversation_id).await.unwrap();

        let newer = message_at(conversation_id, t0 + TimeDelta::seconds(2));
        stub.push(newer.clone());
        let got = timeout(TEST_TIMEOUT, sub.receiver.recv()).await.unwrap().unwrap();
        assert_eq!(got.id, newer.id, "the row present at subscribe time is not re-sent");

        // Stamped before `newer` but only visible now.
        let late = message_at(conversation_id, t0 + TimeDelta::seconds(1));
        stub.push(late.clone());
        let got = timeout(TEST_TIMEOUT, sub.receiver.recv()).await.unwrap().unwrap();
        assert_eq!(got.id, late.id);

        stub.push(message_at(Uuid::new_v4(), t0 + TimeDelta::seconds(3)));
        assert!(
            timeout(Duration::from_millis(200), sub.receiver.recv()).await.is_err(),
            "rows of other conversations are not forwarded, nothing is sent twice"
        );

        gateway.unsubscribe(sub.id).await;
        assert!(lock_pollers(&gateway.pollers).is_empty());
    }

    #[tokio::test]
    async fn finished_poller_releases_its_slot() {
        let (gateway, stub) = start_stub(Duration::from_secs(5)).await;
        let conversation_id = Uuid::new_v4();

        let sub = gateway.subscribe_messages(conversation_id).await.unwrap();
        assert_eq!(lock_pollers(&gateway.pollers).len(), 1);
        drop(sub);

        // The poller notices the dropped receiver on its next delivery.
        stub.push(message_at(conversation_id, Utc::now()));
        wait_for_no_pollers(&gateway).await;
    }
}
