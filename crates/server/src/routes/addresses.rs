use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{get, post, put},
};
use db::models::address::{Address, CreateAddress, UpdateAddress};
use tracing::debug;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// GET /api/accounts/{account_id}/addresses
pub async fn list_addresses(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<Address>>>, ApiError> {
    let addresses = state.address_book().list(account_id).await?;
    debug!(account_id = %account_id, count = addresses.len(), "Listed addresses");
    Ok(ResponseJson(ApiResponse::success(addresses)))
}

/// POST /api/accounts/{account_id}/addresses
pub async fn create_address(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
    axum::Json(payload): axum::Json<CreateAddress>,
) -> Result<ResponseJson<ApiResponse<Address>>, ApiError> {
    let address = state.address_book().create(account_id, payload).await?;
    Ok(ResponseJson(ApiResponse::success_with_message(
        address,
        "Address saved",
    )))
}

/// PUT /api/accounts/{account_id}/addresses/{address_id}
pub async fn update_address(
    State(state): State<AppState>,
    Path((account_id, address_id)): Path<(Uuid, Uuid)>,
    axum::Json(payload): axum::Json<UpdateAddress>,
) -> Result<ResponseJson<ApiResponse<Address>>, ApiError> {
    let address = state
        .address_book()
        .update(account_id, address_id, payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success_with_message(
        address,
        "Address updated",
    )))
}

/// DELETE /api/accounts/{account_id}/addresses/{address_id}
pub async fn delete_address(
    State(state): State<AppState>,
    Path((account_id, address_id)): Path<(Uuid, Uuid)>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    state.address_book().delete(account_id, address_id).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

/// POST /api/accounts/{account_id}/addresses/{address_id}/default
pub async fn set_default_address(
    State(state): State<AppState>,
    Path((account_id, address_id)): Path<(Uuid, Uuid)>,
) -> Result<ResponseJson<ApiResponse<Address>>, ApiError> {
    let address = state
        .address_book()
        .set_default(account_id, address_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(address)))
}

pub fn router(_state: &AppState) -> Router<AppState> {
    Router::new().nest(
        "/accounts/{account_id}/addresses",
        Router::new()
            .route("/", get(list_addresses).post(create_address))
            .route("/{address_id}", put(update_address).delete(delete_address))
            .route("/{address_id}/default", post(set_default_address)),
    )
}
