use std::sync::Arc;

use anyhow::Context;

use careops::api::{self, AppState};
use careops::config::AppConfig;
use careops::gateway::{DataGateway, RestClient, RestGateway};
use careops::inbox::ConversationView;
use careops::inventory::InventoryManager;
use careops::notify::Notifier;
use careops::onboarding::OnboardingManager;
use careops::session::{HostedIdentity, IdentityProvider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export CAREOPS_BACKEND_URL=https://<project>.example.co");
        eprintln!("  export CAREOPS_ANON_KEY=...");
        std::process::exit(1);
    });

    let (Some(email), Some(password)) = (
        config.operator_email.clone(),
        config.operator_password.clone(),
    ) else {
        eprintln!("Error: CAREOPS_EMAIL and CAREOPS_PASSWORD must be set to sign in");
        std::process::exit(1);
    };

    eprintln!("🧹 CareOps v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Backend: {}", config.backend_url);
    eprintln!("   API: http://0.0.0.0:{}/api", config.http_port);
    eprintln!("   Inbox WS: ws://0.0.0.0:{}/ws/inbox", config.http_port);

    // ── Session ─────────────────────────────────────────────────────────
    let client = Arc::new(RestClient::new(&config)?);
    let identity = HostedIdentity::new(Arc::clone(&client));
    let session = identity
        .sign_in(&email, &password)
        .await
        .with_context(|| format!("sign-in failed for {email}"))?;
    eprintln!(
        "   Signed in: {} ({}, workspace {})",
        email, session.role, session.workspace_id
    );

    // ── Managers ────────────────────────────────────────────────────────
    let gateway: Arc<dyn DataGateway> =
        Arc::new(RestGateway::new(Arc::clone(&client), config.poll_interval));
    let notifier = Notifier::new();

    let onboarding = Arc::new(OnboardingManager::new(
        Arc::clone(&gateway),
        session.clone(),
        notifier.clone(),
    ));
    match onboarding.load().await {
        Ok(step) => eprintln!("   Onboarding: step {} ({})", step.id(), step.title()),
        Err(e) => tracing::warn!(error = %e, "Could not restore onboarding progress"),
    }

    let inbox = Arc::new(
        ConversationView::new(Arc::clone(&gateway), session.clone(), notifier.clone())
            .with_resubscribe(config.resubscribe_attempts, config.poll_interval),
    );
    if let Err(e) = inbox.load_conversations().await {
        tracing::warn!(error = %e, "Could not load conversations");
    }

    let inventory = Arc::new(InventoryManager::new(
        Arc::clone(&gateway),
        session,
        notifier.clone(),
    ));

    // ── HTTP ────────────────────────────────────────────────────────────
    let app = api::router(AppState {
        onboarding,
        inbox,
        inventory,
        notifier,
    });
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.http_port))
        .await
        .with_context(|| format!("failed to bind port {}", config.http_port))?;
    tracing::info!(port = config.http_port, "HTTP server started");
    axum::serve(listener, app).await?;

    Ok(())
}
