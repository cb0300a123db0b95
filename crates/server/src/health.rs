use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use charstats_docs::GoogleDocsClient;
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    docs_client: Arc<GoogleDocsClient>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub document_source: HealthCheck,
    pub checked_at: String,
}

pub fn router(docs_client: Arc<GoogleDocsClient>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { docs_client })
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    docs_client: Arc<GoogleDocsClient>,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(docs_client)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let document_source = document_source_check(&state.docs_client).await;
    let ready = document_source.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "charstats-server runtime initialized".to_string(),
        },
        document_source,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn document_source_check(client: &GoogleDocsClient) -> HealthCheck {
    if !client.credentials_readable() {
        return HealthCheck {
            status: "degraded",
            detail: "service account credentials are not readable".to_string(),
        };
    }

    let session = if client.is_open().await { "open" } else { "idle" };
    HealthCheck {
        status: "ready",
        detail: format!(
            "credentials readable; document `{}` session {session}",
            client.settings().document_id
        ),
    }
}
