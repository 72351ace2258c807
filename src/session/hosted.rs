//! Identity provider backed by the hosted auth API.
//!
//! Sign-in uses the password grant; the returned access token is installed
//! on the shared [`RestClient`] so later data requests run as that user.
//! Workspace and role come from the user's row in `user_roles`.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use super::{IdentityProvider, Role, Session, SessionState, SignUpRequest};
use crate::error::{AuthError, GatewayError};
use crate::gateway::RestClient;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: Uuid,
}

#[derive(Debug, Deserialize)]
struct Membership {
    workspace_id: Uuid,
    role: Role,
}

pub struct HostedIdentity {
    client: Arc<RestClient>,
    state: RwLock<SessionState>,
}

impl HostedIdentity {
    pub fn new(client: Arc<RestClient>) -> Self {
        Self {
            client,
            state: RwLock::new(SessionState::SignedOut),
        }
    }

    async fn resolve_membership(&self, user_id: Uuid) -> Result<Membership, AuthError> {
        let request = self
            .client
            .request(Method::GET, &self.client.rest_url("user_roles"))
            .query(&[
                ("user_id", format!("eq.{user_id}")),
                ("select", "workspace_id,role".to_string()),
            ]);
        let rows: Vec<Membership> = self
            .client
            .send_json("user_roles", request)
            .await
            .map_err(|e| AuthError::RequestFailed(e.to_string()))?;
        rows.into_iter()
            .next()
            .ok_or(AuthError::NoMembership { user_id })
    }

    async fn password_grant(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<TokenResponse, AuthError> {
        let request = self
            .client
            .request(Method::POST, &self.client.auth_url("token"))
            .query(&[("grant_type", "password")])
            .json(&serde_json::json!({
                "email": email,
                "password": password.expose_secret(),
            }));
        match self.client.send_json::<TokenResponse>("auth", request).await {
            Ok(token) => Ok(token),
            Err(GatewayError::Status { status: 400 | 401, .. }) => Err(AuthError::InvalidCredentials),
            Err(e) => Err(AuthError::RequestFailed(e.to_string())),
        }
    }
}

#[async_trait]
impl IdentityProvider for HostedIdentity {
    async fn current_session(&self) -> SessionState {
        self.state.read().await.clone()
    }

    async fn sign_in(&self, email: &str, password: &SecretString) -> Result<Session, AuthError> {
        *self.state.write().await = SessionState::Loading;

        let result = async {
            let token = self.password_grant(email, password).await?;
            self.client
                .set_access_token(Some(SecretString::from(token.access_token)));
            let membership = self.resolve_membership(token.user.id).await?;
            Ok::<_, AuthError>(Session::new(
                token.user.id,
                membership.workspace_id,
                membership.role,
            ))
        }
        .await;

        let mut state = self.state.write().await;
        match result {
            Ok(session) => {
                info!(
                    user_id = %session.user_id,
                    workspace_id = %session.workspace_id,
                    role = %session.role,
                    "Signed in"
                );
                *state = SessionState::Active(session.clone());
                Ok(session)
            }
            Err(e) => {
                warn!(error = %e, "Sign in failed");
                self.client.set_access_token(None);
                *state = SessionState::SignedOut;
                Err(e)
            }
        }
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<(), AuthError> {
        let http = self
            .client
            .request(Method::POST, &self.client.auth_url("signup"))
            .json(&serde_json::json!({
                "email": request.email,
                "password": request.password.expose_secret(),
                "data": {
                    "business_name": request.business_name,
                    "display_name": request.display_name,
                },
            }));
        match self.client.send_empty("auth", http).await {
            Ok(()) => {
                info!(email = %request.email, business = %request.business_name, "Account created");
                Ok(())
            }
            Err(GatewayError::Status { status, body, .. }) if (400..500).contains(&status) => {
                Err(AuthError::SignUpRejected(body))
            }
            Err(e) => Err(AuthError::RequestFailed(e.to_string())),
        }
    }

    async fn sign_out(&self) {
        self.client.set_access_token(None);
        *self.state.write().await = SessionState::SignedOut;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::Value;

    use super::*;
    use crate::config::AppConfig;

    const USER_ID: &str = "6f1c5a34-94a2-4f63-8f7e-1b5d4b0a9e11";
    const WORKSPACE_ID: &str = "0b8f3f2e-3d8e-4c6f-9a3e-7d2c1e5f4a22";

    async fn token(
        Query(params): Query<HashMap<String, String>>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        if params.get("grant_type").map(String::as_str) != Some("password") {
            return (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": "grant"})));
        }
        if body["password"] != "correct horse" {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "invalid_grant"})),
            );
        }
        (
            StatusCode::OK,
            Json(serde_json::json!({"access_token": "user-token", "user": {"id": USER_ID}})),
        )
    }

    async fn user_roles(headers: HeaderMap) -> (StatusCode, Json<Value>) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if auth != "Bearer user-token" {
            return (StatusCode::UNAUTHORIZED, Json(serde_json::json!([])));
        }
        (
            StatusCode::OK,
            Json(serde_json::json!([{"workspace_id": WORKSPACE_ID, "role": "admin"}])),
        )
    }

    async fn signup(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        if body["email"] == "taken@example.com" {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({"msg": "User already registered"})),
            );
        }
        assert_eq!(body["data"]["business_name"], "Acme Services");
        (StatusCode::OK, Json(serde_json::json!({})))
    }

    async fn stub_backend() -> Arc<RestClient> {
        let app = Router::new()
            .route("/auth/v1/token", post(token))
            .route("/auth/v1/signup", post(signup))
            .route("/rest/v1/user_roles", get(user_roles));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let config = AppConfig {
            backend_url: format!("http://127.0.0.1:{port}"),
            anon_key: SecretString::from("anon".to_string()),
            ..AppConfig::default()
        };
        Arc::new(RestClient::new(&config).unwrap())
    }

    #[tokio::test]
    async fn sign_in_resolves_workspace_and_role() {
        let client = stub_backend().await;
        let identity = HostedIdentity::new(Arc::clone(&client));
        assert_eq!(identity.current_session().await, SessionState::SignedOut);

        let session = identity
            .sign_in("owner@example.com", &SecretString::from("correct horse".to_string()))
            .await
            .unwrap();

        assert_eq!(session.user_id, Uuid::parse_str(USER_ID).unwrap());
        assert_eq!(session.workspace_id, Uuid::parse_str(WORKSPACE_ID).unwrap());
        assert_eq!(session.role, Role::Admin);
        assert_eq!(identity.current_session().await, SessionState::Active(session));
        assert!(client.has_access_token());
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials() {
        let client = stub_backend().await;
        let identity = HostedIdentity::new(Arc::clone(&client));

        let err = identity
            .sign_in("owner@example.com", &SecretString::from("nope".to_string()))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::InvalidCredentials));
        assert_eq!(identity.current_session().await, SessionState::SignedOut);
        assert!(!client.has_access_token());
    }

    #[tokio::test]
    async fn sign_up_reports_rejection() {
        let client = stub_backend().await;
        let identity = HostedIdentity::new(client);
        let mut request = SignUpRequest {
            email: "new@example.com".into(),
            password: SecretString::from("hunter22".to_string()),
            business_name: "Acme Services".into(),
            display_name: "Jane Smith".into(),
        };
        identity.sign_up(&request).await.unwrap();

        request.email = "taken@example.com".into();
        let err = identity.sign_up(&request).await.unwrap_err();
        assert!(matches!(err, AuthError::SignUpRejected(_)));
    }

    #[tokio::test]
    async fn sign_out_clears_token() {
        let client = stub_backend().await;
        let identity = HostedIdentity::new(Arc::clone(&client));
        identity
            .sign_in("owner@example.com", &SecretString::from("correct horse".to_string()))
            .await
            .unwrap();
        identity.sign_out().await;
        assert_eq!(identity.current_session().await, SessionState::SignedOut);
        assert!(!client.has_access_token());
    }
}
