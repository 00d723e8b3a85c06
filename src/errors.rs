// src/errors.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

#[derive(Debug, Error)]
pub enum AppError {
    /// Sieć padła albo żądanie przekroczyło limit czasu.
    /// Timeout traktujemy dokładnie tak samo jak każdy inny błąd żądania.
    #[error("Brak połączenia z serwerem sklepu: {0}")]
    ApiUnreachable(String),

    /// Zaplecze odrzuciło operację (success=false lub status 4xx/5xx).
    #[error("Serwer sklepu odrzucił operację: {0}")]
    ApiRejected(String),

    #[error("Nie znaleziono zasobu")]
    NotFound,

    #[error("Błędy walidacji formularza")]
    ValidationError(#[from] ValidationErrors),

    #[error("Nieprawidłowe dane wejściowe: {0}")]
    UnprocessableEntity(String),

    /// Dla tej pozycji/operacji trwa już żądanie; duplikat odrzucamy.
    #[error("Operacja jest już w toku: {0}")]
    OperationInProgress(String),

    #[error("Wewnętrzny błąd serwera")]
    InternalServerError(String),

    #[error("Niepoprawne żądanie")]
    BadRequest(String),
}

impl AppError {
    /// Komunikat pokazywany użytkownikowi w powiadomieniu (toast).
    pub fn user_message(&self) -> String {
        match self {
            AppError::ApiUnreachable(_) => {
                "Nie udało się połączyć z serwerem. Spróbuj ponownie.".to_string()
            }
            AppError::ApiRejected(message) => message.clone(),
            AppError::NotFound => "Nie znaleziono zasobu.".to_string(),
            AppError::ValidationError(_) => "Popraw zaznaczone pola formularza.".to_string(),
            AppError::UnprocessableEntity(message) => message.clone(),
            AppError::OperationInProgress(message) => message.clone(),
            AppError::InternalServerError(_) => {
                "Wystąpił błąd serwera. Spróbuj ponownie później.".to_string()
            }
            AppError::BadRequest(message) => message.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ApiUnreachable(details) => {
                tracing::error!("Błąd połączenia z API zaplecza: {}", details);
                (
                    StatusCode::BAD_GATEWAY,
                    "Brak połączenia z serwerem sklepu".to_string(),
                )
            }
            AppError::ApiRejected(message) => (StatusCode::BAD_GATEWAY, message),
            AppError::NotFound => (StatusCode::NOT_FOUND, "Nie znaleziono zasobu".to_string()),
            AppError::ValidationError(errors) => {
                let mut messages = Vec::new();
                for (field, field_errors) in errors.field_errors() {
                    for error in field_errors {
                        let msg = error.message.as_ref().map_or_else(
                            || format!("Pole '{}' jest nieprawidłowe", field),
                            |m| m.to_string(),
                        );
                        messages.push(msg);
                    }
                }
                (StatusCode::UNPROCESSABLE_ENTITY, messages.join("; "))
            }
            AppError::UnprocessableEntity(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),
            AppError::OperationInProgress(message) => (StatusCode::CONFLICT, message),
            AppError::InternalServerError(message) => {
                tracing::error!("Wewnętrzny błąd serwera: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Wystąpił wewnętrzny błąd serwera".to_string(),
                )
            }
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            tracing::warn!("Żądanie do API zaplecza przekroczyło limit czasu: {}", err);
            AppError::ApiUnreachable("przekroczono limit czasu żądania".to_string())
        } else if err.is_connect() {
            AppError::ApiUnreachable(format!("błąd połączenia: {}", err))
        } else {
            AppError::ApiUnreachable(err.to_string())
        }
    }
}
