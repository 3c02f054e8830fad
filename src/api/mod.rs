// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{DefaultBodyLimit, Request},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{
        Account, CreateAccountRequest, CreateAccountResponse, EmailData, SendBulkEmailRequest,
        SendBulkEmailResponse, SendEmailRequest,
    },
    state::AppState,
};

pub mod accounts;
pub mod health;
pub mod send;

#[cfg(test)]
pub(crate) mod testing;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/email", post(accounts::create_account))
        .route("/email/bulksend", post(send::send_bulk_email))
        .route("/email/{id}", get(accounts::get_account))
        .route("/email/{id}/send", post(send::send_email))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    let trace_layer = TraceLayer::new_for_http().make_span_with(|request: &Request| {
        let request_id = request
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");
        tracing::info_span!(
            "http",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    });

    Router::new()
        .nest("/api/v1", v1_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(trace_layer)
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

#[derive(OpenApi)]
#[openapi(
    paths(
        accounts::create_account,
        accounts::get_account,
        send::send_email,
        send::send_bulk_email,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            Account,
            CreateAccountRequest,
            CreateAccountResponse,
            EmailData,
            SendEmailRequest,
            SendBulkEmailRequest,
            SendBulkEmailResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Accounts", description = "Recipient registration and lookup"),
        (name = "Sending", description = "Single and bulk dispatch"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;
