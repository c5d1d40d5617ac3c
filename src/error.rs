use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error response structure sent to clients.
///
/// Every failed request produces this JSON shape:
/// ```json
/// {
///   "status": "fail",
///   "message": "Invalid or expired confirmation code"
/// }
/// ```
/// Kept separate from `HttpError` so internal context never leaks into the
/// API contract.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => write!(f, "{}", s),
            Err(_) => Err(fmt::Error),
        }
    }
}

/// Canned error messages reused across handlers.
///
/// One variant per recurring error condition; one-off messages are built
/// inline at the call site.
#[derive(Debug, PartialEq)]
pub enum ErrorMessage {
    // Authentication errors
    InvalidToken,
    TokenNotProvided,
    UserNotAuthenticated,
    InvalidConfirmationCode,

    // Authorization errors
    PermissionDenied,

    // User management errors
    UserNoLongerExist,
    UsernameTaken,
    EmailTaken,

    //Else
    ServerError,
}

impl fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            ErrorMessage::InvalidToken => "Token is invalid or expired".to_string(),
            ErrorMessage::TokenNotProvided => {
                "You are not logged in, please provide a token".to_string()
            }
            ErrorMessage::UserNotAuthenticated => {
                "Authentication required. Please log in.".to_string()
            }
            ErrorMessage::InvalidConfirmationCode => {
                "Invalid or expired confirmation code".to_string()
            }
            ErrorMessage::PermissionDenied => {
                "You are not allowed to perform this action".to_string()
            }
            ErrorMessage::UserNoLongerExist => {
                "User belonging to this token no longer exists".to_string()
            }
            ErrorMessage::UsernameTaken => {
                "A user with that username already exists".to_string()
            }
            ErrorMessage::EmailTaken => "A user with that email already exists".to_string(),
            ErrorMessage::ServerError => "Server Error. Please try again later".to_string(),
        };
        write!(f, "{}", message)
    }
}

/// Internal HTTP error type used throughout the application.
///
/// Handlers return `Result<T, HttpError>`; axum converts the error into a
/// JSON response via `IntoResponse`, so error handling stays a one-liner at
/// the call site.
#[derive(Debug, Clone)]
pub struct HttpError {
    pub message: String,
    pub status: StatusCode,
}

impl HttpError {
    pub fn new(message: impl Into<String>, status: StatusCode) -> Self {
        HttpError {
            message: message.into(),
            status,
        }
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        HttpError {
            message: message.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Invalid input, malformed requests, validation failures.
    pub fn bad_request(message: impl Into<String>) -> Self {
        HttpError {
            message: message.into(),
            status: StatusCode::BAD_REQUEST,
        }
    }

    /// Database constraint violations surfaced by concurrent writes.
    pub fn unique_constraint_violation(message: impl Into<String>) -> Self {
        HttpError {
            message: message.into(),
            status: StatusCode::CONFLICT,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        HttpError {
            message: message.into(),
            status: StatusCode::UNAUTHORIZED,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        HttpError {
            message: message.into(),
            status: StatusCode::NOT_FOUND,
        }
    }

    pub fn into_http_response(self) -> Response {
        let json_response = Json(ErrorResponse {
            status: "fail".to_string(),
            message: self.message.clone(),
        });

        (self.status, json_response).into_response()
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HttpError: message: {}, status: {}",
            self.message, self.status
        )
    }
}

impl std::error::Error for HttpError {}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        self.into_http_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_map_to_expected_status_codes() {
        assert_eq!(HttpError::bad_request("x").status, StatusCode::BAD_REQUEST);
        assert_eq!(HttpError::not_found("x").status, StatusCode::NOT_FOUND);
        assert_eq!(HttpError::unauthorized("x").status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            HttpError::unique_constraint_violation("x").status,
            StatusCode::CONFLICT
        );
        assert_eq!(
            HttpError::server_error("x").status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn error_messages_are_human_readable() {
        assert_eq!(
            ErrorMessage::InvalidConfirmationCode.to_string(),
            "Invalid or expired confirmation code"
        );
        assert_eq!(
            ErrorMessage::UsernameTaken.to_string(),
            "A user with that username already exists"
        );
    }
}
