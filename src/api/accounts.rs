// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::ApiError,
    models::{Account, CreateAccountRequest, CreateAccountResponse},
    state::AppState,
    storage::AccountRepository,
};

#[utoipa::path(
    post,
    path = "/api/v1/email",
    request_body = CreateAccountRequest,
    tag = "Accounts",
    responses(
        (status = 201, body = CreateAccountResponse),
        (status = 400, description = "Invalid address or public key"),
        (status = 409, description = "Address already registered")
    )
)]
pub async fn create_account(
    State(state): State<AppState>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<CreateAccountResponse>), ApiError> {
    let accounts = Arc::clone(&state.accounts);
    let keys = Arc::clone(&state.keys);

    // Key import may shell out to gpg.
    let stored = tokio::task::spawn_blocking(move || {
        AccountRepository::new(&accounts, &keys)
            .create(&request.email, request.pubkey.as_deref().map(str::as_bytes))
    })
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "Account creation task failed");
        ApiError::internal("Account creation failed")
    })??;

    Ok((
        StatusCode::CREATED,
        Json(CreateAccountResponse { id: stored.id }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/email/{id}",
    params(
        ("id" = String, Path, description = "Account identifier")
    ),
    tag = "Accounts",
    responses(
        (status = 200, body = Account),
        (status = 404, description = "Unknown account")
    )
)]
pub async fn get_account(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Account>, ApiError> {
    Ok(Json(load_account(&state, id).await?))
}

/// Load an account off the async workers.
///
/// Loading a keyless account re-reads the public keyring and may wait on the
/// database write lock, which a concurrent creation holds across key import.
pub(crate) async fn load_account(state: &AppState, id: String) -> Result<Account, ApiError> {
    let accounts = Arc::clone(&state.accounts);
    let keys = Arc::clone(&state.keys);

    let stored = tokio::task::spawn_blocking(move || {
        AccountRepository::new(&accounts, &keys).get(&id)
    })
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "Account lookup task failed");
        ApiError::internal("Account lookup failed")
    })??;

    Ok(Account::from(stored))
}
