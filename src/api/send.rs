// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use super::accounts::load_account;
use crate::{
    dispatch::MessageTemplate,
    error::ApiError,
    models::{Account, EmailData, SendBulkEmailRequest, SendBulkEmailResponse, SendEmailRequest},
    state::AppState,
    storage::{normalize_email, AccountRepository, AccountResult},
};

/// Fill in the sender from server config when the request omits it.
fn message_template(
    data: EmailData,
    default_from: Option<&str>,
) -> Result<MessageTemplate, ApiError> {
    let from = data
        .from
        .filter(|f| !f.trim().is_empty())
        .or_else(|| default_from.map(str::to_string))
        .ok_or_else(|| ApiError::bad_request("email_data.from is required"))?;

    Ok(MessageTemplate {
        from,
        subject: data.subject,
        body: data.body,
    })
}

#[utoipa::path(
    post,
    path = "/api/v1/email/{id}/send",
    params(
        ("id" = String, Path, description = "Account identifier")
    ),
    request_body = SendEmailRequest,
    tag = "Sending",
    responses(
        (status = 204, description = "Message sent"),
        (status = 400, description = "Recipient has no public key and the send is secure-only"),
        (status = 404, description = "Unknown account"),
        (status = 500, description = "Encryption failed"),
        (status = 502, description = "Mail relay rejected or timed out")
    )
)]
pub async fn send_email(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<SendEmailRequest>,
) -> Result<StatusCode, ApiError> {
    let account = load_account(&state, id.clone()).await?;
    let template = message_template(request.email_data, state.default_from.as_deref())?;

    let delivery = state
        .dispatcher
        .dispatch_one(&account, &template, request.secure_only)
        .await?;

    tracing::info!(account_id = %id, ?delivery, "Email sent");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/email/bulksend",
    request_body = SendBulkEmailRequest,
    tag = "Sending",
    responses(
        (status = 204, description = "Every recipient was sent the message"),
        (status = 201, body = SendBulkEmailResponse, description = "Some recipients failed"),
        (status = 400, description = "Both ids and emails given")
    )
)]
pub async fn send_bulk_email(
    State(state): State<AppState>,
    Json(request): Json<SendBulkEmailRequest>,
) -> Result<Response, ApiError> {
    request.validate().map_err(ApiError::bad_request)?;
    let template = message_template(request.email_data, state.default_from.as_deref())?;

    let accounts = Arc::clone(&state.accounts);
    let keys = Arc::clone(&state.keys);
    let (ids, emails) = (request.ids, request.emails);

    // Resolution reads keyrings from disk.
    let targets = tokio::task::spawn_blocking(move || -> AccountResult<Vec<Account>> {
        let repo = AccountRepository::new(&accounts, &keys);
        if !ids.is_empty() {
            let found = repo.get_many(&ids)?;
            if found.len() < ids.len() {
                tracing::debug!(
                    requested = ids.len(),
                    found = found.len(),
                    "Unknown ids dropped from bulk send"
                );
            }
            return Ok(found.into_iter().map(Account::from).collect());
        }

        // Unparseable addresses stay as given and fail at the transport.
        Ok(emails
            .iter()
            .map(|raw| {
                let email = normalize_email(raw).unwrap_or_else(|_| raw.clone());
                let has_key = keys.has_public_key(&email);
                Account::ephemeral(email, has_key)
            })
            .collect())
    })
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "Bulk target resolution task failed");
        ApiError::internal("Failed to resolve recipients")
    })?
    .map_err(ApiError::from)?;

    let total = targets.len();
    let failed = state
        .dispatcher
        .dispatch_bulk(targets, template, request.secure_only)
        .await;

    tracing::info!(recipients = total, failed = failed.len(), "Bulk send finished");

    if failed.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let mut failed_emails: Vec<String> = failed.into_iter().collect();
    failed_emails.sort();
    Ok((
        StatusCode::CREATED,
        Json(SendBulkEmailResponse { failed_emails }),
    )
        .into_response())
}
