use crate::{
    AppState,
    db::UserExt,
    dtos::{Response, SignupDto, TokenRequestDto, TokenResponseDto},
    error::{ErrorMessage, HttpError},
    mail::mails::send_confirmation_email,
    models::User,
    utils::{code, token},
};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use validator::Validate;

use tracing::instrument;

/// Router for authentication endpoints
pub fn auth_handler() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/token", post(token))
}

/// Request a confirmation code.
///
/// A fresh (username, email) pair creates the account and mails a code.
/// Resubmitting the exact same pair never creates a second record: it only
/// re-dispatches a code bound to the account's current state. A username or
/// email already claimed by a different account is rejected.
#[instrument(skip(app_state, body), fields(username = %body.username, email = %body.email))]
pub async fn signup(
    State(app_state): State<AppState>,
    Json(body): Json<SignupDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(|e| {
        tracing::error!("Invalid signup input: {}", e);
        HttpError::bad_request(e.to_string())
    })?;

    let existing = app_state
        .db_client
        .get_user_by_credentials(&body.username, &body.email)
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting user by credentials: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    if let Some(user) = existing {
        dispatch_code(&app_state, &user).await;
        tracing::info!(username = %user.username, "Confirmation code re-dispatched");
        return Ok((StatusCode::OK, Json(code_sent_response())));
    }

    // The pair did not match as a whole; either half being taken by another
    // account is a conflict.
    let username_taken = app_state
        .db_client
        .get_user(None, Some(&body.username), None)
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting user by username: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?
        .is_some();
    if username_taken {
        return Err(HttpError::bad_request(ErrorMessage::UsernameTaken.to_string()));
    }

    let email_taken = app_state
        .db_client
        .get_user(None, None, Some(&body.email))
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting user by email: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?
        .is_some();
    if email_taken {
        return Err(HttpError::bad_request(ErrorMessage::EmailTaken.to_string()));
    }

    let result = app_state
        .db_client
        .save_user(&body.username, &body.email)
        .await;

    match result {
        Ok(user) => {
            dispatch_code(&app_state, &user).await;
            tracing::info!(username = %user.username, email = %user.email, "Signup successful");
            Ok((StatusCode::OK, Json(code_sent_response())))
        }
        Err(sqlx::Error::Database(db_err)) => {
            // A concurrent signup won the race past the checks above.
            if db_err.is_unique_violation() {
                tracing::error!("DB error, saving user, unique violation: {}", db_err);
                Err(HttpError::unique_constraint_violation(
                    ErrorMessage::UsernameTaken.to_string(),
                ))
            } else {
                tracing::error!("DB error, saving user: {}", db_err);
                Err(HttpError::server_error(
                    ErrorMessage::ServerError.to_string(),
                ))
            }
        }
        Err(e) => {
            tracing::error!("DB error, saving user: {}", e);
            Err(HttpError::server_error(
                ErrorMessage::ServerError.to_string(),
            ))
        }
    }
}

fn code_sent_response() -> Response {
    Response {
        status: "success",
        message: "Confirmation code sent to your email. Exchange it at /api/v1/auth/token."
            .to_string(),
    }
}

/// Generate a code for the user's current state and mail it.
/// Delivery is fire-and-forget: the account change already committed, so a
/// failed send is logged and the request still succeeds.
async fn dispatch_code(app_state: &AppState, user: &User) {
    let confirmation_code = code::make_code(user, app_state.env.secret_key.as_bytes());

    if let Err(e) = send_confirmation_email(&user.email, &user.username, &confirmation_code).await
    {
        tracing::error!(username = %user.username, "Failed to send confirmation email: {}", e);
    }
}

/// Exchange a confirmation code for a bearer access token.
///
/// Unknown username is a 404; a code that does not match the one
/// regenerated from the user's current state is a 400. The issued token is
/// not persisted anywhere; its signature is the only thing checked later.
#[instrument(skip(app_state, body), fields(username = %body.username))]
pub async fn token(
    State(app_state): State<AppState>,
    Json(body): Json<TokenRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(|e| {
        tracing::error!("Invalid token input: {}", e);
        HttpError::bad_request(e.to_string())
    })?;

    let user = app_state
        .db_client
        .get_user(None, Some(&body.username), None)
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting user: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?
        .ok_or_else(|| {
            tracing::error!("User not found");
            HttpError::not_found(format!("User {} not found", body.username))
        })?;

    if !code::check_code(
        &user,
        &body.confirmation_code,
        app_state.env.secret_key.as_bytes(),
    ) {
        tracing::error!(username = %user.username, "Confirmation code mismatch");
        return Err(HttpError::bad_request(
            ErrorMessage::InvalidConfirmationCode.to_string(),
        ));
    }

    let access_token = token::create_token(
        &user.id.to_string(),
        app_state.env.jwt_secret.as_bytes(),
        app_state.env.jwt_maxage,
    )
    .map_err(|e| {
        tracing::error!("Access token creation error: {}", e);
        HttpError::server_error(ErrorMessage::ServerError.to_string())
    })?;

    tracing::info!(username = %user.username, "Access token issued");
    Ok(Json(TokenResponseDto {
        token: access_token,
    }))
}
