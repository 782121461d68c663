use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use services::services::{address_book::AddressBookError, address_draft::AddressField};
use thiserror::Error;
use tracing::error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    AddressBook(#[from] AddressBookError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::AddressBook(e) => match e {
                AddressBookError::NotFound => StatusCode::NOT_FOUND,
                AddressBookError::LimitReached | AddressBookError::TypeTaken(_) => {
                    StatusCode::CONFLICT
                }
                AddressBookError::MissingField(_) => StatusCode::UNPROCESSABLE_ENTITY,
                AddressBookError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        // A missing field is named in `error_data` so the client can highlight it.
        let body: ApiResponse<(), AddressField> = match self {
            ApiError::AddressBook(AddressBookError::MissingField(field)) => {
                ApiResponse::error_with_data(&message, field)
            }
            _ => ApiResponse::error(&message),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use db::models::address::AddressType;

    use super::*;

    #[test]
    fn domain_errors_map_to_status_codes() {
        let cases = [
            (AddressBookError::NotFound, StatusCode::NOT_FOUND),
            (AddressBookError::LimitReached, StatusCode::CONFLICT),
            (
                AddressBookError::TypeTaken(AddressType::Work),
                StatusCode::CONFLICT,
            ),
            (
                AddressBookError::MissingField(AddressField::Pincode),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).into_response().status(), expected);
        }
    }

    #[test]
    fn database_errors_are_internal() {
        let response = ApiError::from(sqlx::Error::PoolClosed).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn missing_field_is_named_in_error_data() {
        let response =
            ApiError::from(AddressBookError::MissingField(AddressField::Pincode)).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error_data"], "pincode");
        assert_eq!(body["message"], "Pincode is required");
    }
}
