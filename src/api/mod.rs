//! Server assembly: database pool, migrations, background workers, router,
//! and the listener.

use crate::{
    janitor,
    mailer::{self, EmailSender, LogEmailSender, SmtpConfig, SmtpSender},
    password::PasswordHasher,
    token::TokenSigner,
};
use anyhow::{Context, Result};
use axum::{
    Extension,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
};
use chrono::NaiveTime;
use self::handlers::auth::{
    AuthConfig, AuthEngine, AuthState, EngineConfig, MemoryOtpStore, PgStore, RefreshStore,
    storage,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;

pub mod handlers;
mod openapi;

pub use openapi::openapi;

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Start the server.
///
/// # Errors
/// Returns an error if the database is unreachable, migrations fail, the SMTP
/// transport cannot be built, or the listener cannot bind.
#[allow(clippy::too_many_arguments)]
pub async fn new(
    port: u16,
    dsn: String,
    signer: Arc<TokenSigner>,
    hasher: PasswordHasher,
    engine_config: EngineConfig,
    auth_config: AuthConfig,
    smtp: Option<SmtpConfig>,
    mailer_capacity: usize,
    janitor_time: NaiveTime,
) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .context("failed to run database migrations")?;
    storage::seed_roles(&pool)
        .await
        .context("failed to seed roles")?;

    let sender: Arc<dyn EmailSender> = match smtp {
        Some(config) => Arc::new(SmtpSender::new(&config)?),
        None => {
            info!("SMTP not configured; outbound email will be logged");
            Arc::new(LogEmailSender)
        }
    };
    let (mail_queue, _mail_worker) = mailer::spawn_mailer(sender, mailer_capacity);

    let store = Arc::new(PgStore::new(pool));
    let engine = AuthEngine::new(
        store.clone(),
        store.clone(),
        Arc::new(MemoryOtpStore::new()),
        signer,
        hasher,
        mail_queue,
        engine_config,
    );
    let auth_state = Arc::new(AuthState::new(engine, auth_config));

    let _janitor = janitor::spawn_daily_cleanup(store as Arc<dyn RefreshStore>, janitor_time);

    let (router, _openapi) = router().split_for_parts();
    let app = router.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(auth_state)),
    );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
