use std::str::FromStr;

use crate::{
    AppState,
    db::{UserChanges, UserExt},
    dtos::{
        CreateUserDto, FilterUserDto, RequestQueryDto, UpdateMeDto, UpdateUserDto, UserData,
        UserListResponseDto, UserResponseDto,
    },
    error::{ErrorMessage, HttpError},
    middleware::{JWTAuthMiddleware, role_check},
    models::UserRole,
};
use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::get,
};
use tracing::instrument;
use validator::Validate;

/// Router for user management endpoints.
///
/// The auth middleware is applied to the whole router in routes.rs; the
/// admin-only routes add a role check on top. `/me` is open to any
/// authenticated user.
pub fn users_handler() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me).patch(update_me))
        .route(
            "/",
            get(get_users)
                .post(create_user)
                .layer(middleware::from_fn(|req, next| {
                    role_check(req, next, vec![UserRole::Admin])
                })),
        )
        .route(
            "/{username}",
            get(get_user)
                .patch(update_user)
                .delete(delete_user)
                .layer(middleware::from_fn(|req, next| {
                    role_check(req, next, vec![UserRole::Admin])
                })),
        )
}

/// Get the authenticated user's own profile
#[instrument(skip(user), fields(username = %user.user.username))]
pub async fn get_me(
    Extension(user): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let filtered_user = FilterUserDto::filter_user(&user.user);

    let response = UserResponseDto {
        status: "success".to_string(),
        data: UserData {
            user: filtered_user,
        },
    };
    tracing::info!("get_me successful");
    Ok(Json(response))
}

/// Update the authenticated user's own profile.
/// The role is not part of the payload: users cannot promote themselves.
#[instrument(skip(app_state, user, body), fields(username = %user.user.username))]
pub async fn update_me(
    State(app_state): State<AppState>,
    Extension(user): Extension<JWTAuthMiddleware>,
    Json(body): Json<UpdateMeDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(|e| {
        tracing::error!("Invalid update_me input: {}", e);
        HttpError::bad_request(e.to_string())
    })?;

    check_identity_conflicts(
        &app_state,
        body.username.as_deref(),
        body.email.as_deref(),
        Some(&user.user.username),
    )
    .await?;

    let changes = UserChanges {
        username: body.username,
        email: body.email,
        first_name: body.first_name,
        last_name: body.last_name,
        bio: body.bio,
        role: None,
    };

    let updated = apply_user_update(&app_state, &user.user.username, &changes).await?;

    tracing::info!("update_me successful");
    Ok(Json(updated))
}

/// Get paginated list of all users (admin only)
#[instrument(skip(app_state))]
pub async fn get_users(
    Query(query_params): Query<RequestQueryDto>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    query_params.validate().map_err(|e| {
        tracing::error!("Invalid get_users input: {}", e);
        HttpError::bad_request(e.to_string())
    })?;

    let page = query_params.page.unwrap_or(1);
    let limit = query_params.limit.unwrap_or(10);

    let users = app_state
        .db_client
        .get_users(page as u32, limit)
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting users: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    let user_count = app_state.db_client.get_user_count().await.map_err(|e| {
        tracing::error!("DB error, getting user count: {}", e);
        HttpError::server_error(ErrorMessage::ServerError.to_string())
    })?;

    let response = UserListResponseDto {
        status: "success".to_string(),
        users: FilterUserDto::filter_users(&users),
        results: user_count,
    };
    tracing::info!("get_users successful");
    Ok(Json(response))
}

/// Create a user with an explicit role (admin only).
/// The new account holds no code yet; its owner signs up with the same
/// (username, email) pair to get one mailed.
#[instrument(skip(app_state, body), fields(username = %body.username))]
pub async fn create_user(
    State(app_state): State<AppState>,
    Json(body): Json<CreateUserDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(|e| {
        tracing::error!("Invalid create_user input: {}", e);
        HttpError::bad_request(e.to_string())
    })?;

    check_identity_conflicts(&app_state, Some(&body.username), Some(&body.email), None).await?;

    // Validated above; unknown strings never reach this point.
    let role = body
        .role
        .as_deref()
        .map(|r| UserRole::from_str(r).unwrap_or(UserRole::User))
        .unwrap_or(UserRole::User);

    let result = app_state
        .db_client
        .create_user(
            &body.username,
            &body.email,
            body.first_name.as_deref(),
            body.last_name.as_deref(),
            body.bio.as_deref(),
            role,
        )
        .await;

    let user = match result {
        Ok(user) => user,
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            tracing::error!("DB error, creating user, unique violation: {}", db_err);
            return Err(HttpError::unique_constraint_violation(
                ErrorMessage::UsernameTaken.to_string(),
            ));
        }
        Err(e) => {
            tracing::error!("DB error, creating user: {}", e);
            return Err(HttpError::server_error(
                ErrorMessage::ServerError.to_string(),
            ));
        }
    };

    let response = UserResponseDto {
        status: "success".to_string(),
        data: UserData {
            user: FilterUserDto::filter_user(&user),
        },
    };
    tracing::info!("create_user successful");
    Ok((StatusCode::CREATED, Json(response)))
}

/// Get a specific user (admin only)
#[instrument(skip(app_state))]
pub async fn get_user(
    Path(username): Path<String>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    let user = app_state
        .db_client
        .get_user(None, Some(&username), None)
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting user: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?
        .ok_or_else(|| HttpError::not_found(format!("User {username} not found")))?;

    let response = UserResponseDto {
        status: "success".to_string(),
        data: UserData {
            user: FilterUserDto::filter_user(&user),
        },
    };
    tracing::info!("get_user successful");
    Ok(Json(response))
}

/// Partially update a user, including their role (admin only)
#[instrument(skip(app_state, body))]
pub async fn update_user(
    Path(username): Path<String>,
    State(app_state): State<AppState>,
    Json(body): Json<UpdateUserDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(|e| {
        tracing::error!("Invalid update_user input: {}", e);
        HttpError::bad_request(e.to_string())
    })?;

    check_identity_conflicts(
        &app_state,
        body.username.as_deref(),
        body.email.as_deref(),
        Some(&username),
    )
    .await?;

    let changes = UserChanges {
        username: body.username,
        email: body.email,
        first_name: body.first_name,
        last_name: body.last_name,
        bio: body.bio,
        // Validated above; unknown strings never reach this point.
        role: body.role.as_deref().and_then(|r| UserRole::from_str(r).ok()),
    };

    let updated = apply_user_update(&app_state, &username, &changes).await?;

    tracing::info!("update_user successful");
    Ok(Json(updated))
}

/// Delete a user (admin only)
#[instrument(skip(app_state))]
pub async fn delete_user(
    Path(username): Path<String>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    app_state
        .db_client
        .delete_user(&username)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                HttpError::not_found(format!("User {username} not found"))
            }
            e => {
                tracing::error!("DB error, deleting user: {}", e);
                HttpError::server_error(ErrorMessage::ServerError.to_string())
            }
        })?;

    tracing::info!("delete_user successful");
    Ok(StatusCode::NO_CONTENT)
}

/// Rejects a username or email already claimed by an account other than
/// `exempt_username` (the account being edited, when updating).
async fn check_identity_conflicts(
    app_state: &AppState,
    username: Option<&str>,
    email: Option<&str>,
    exempt_username: Option<&str>,
) -> Result<(), HttpError> {
    if let Some(username) = username {
        let holder = app_state
            .db_client
            .get_user(None, Some(username), None)
            .await
            .map_err(|e| {
                tracing::error!("DB error, getting user by username: {}", e);
                HttpError::server_error(ErrorMessage::ServerError.to_string())
            })?;
        if let Some(holder) = holder {
            if exempt_username != Some(holder.username.as_str()) {
                return Err(HttpError::bad_request(
                    ErrorMessage::UsernameTaken.to_string(),
                ));
            }
        }
    }

    if let Some(email) = email {
        let holder = app_state
            .db_client
            .get_user(None, None, Some(email))
            .await
            .map_err(|e| {
                tracing::error!("DB error, getting user by email: {}", e);
                HttpError::server_error(ErrorMessage::ServerError.to_string())
            })?;
        if let Some(holder) = holder {
            if exempt_username != Some(holder.username.as_str()) {
                return Err(HttpError::bad_request(ErrorMessage::EmailTaken.to_string()));
            }
        }
    }

    Ok(())
}

/// Runs the update and maps the unique-violation race to a conflict.
async fn apply_user_update(
    app_state: &AppState,
    username: &str,
    changes: &UserChanges,
) -> Result<UserResponseDto, HttpError> {
    let result = app_state.db_client.update_user(username, changes).await;

    let user = match result {
        Ok(Some(user)) => user,
        Ok(None) => {
            return Err(HttpError::not_found(format!("User {username} not found")));
        }
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            tracing::error!("DB error, updating user, unique violation: {}", db_err);
            return Err(HttpError::unique_constraint_violation(
                ErrorMessage::UsernameTaken.to_string(),
            ));
        }
        Err(e) => {
            tracing::error!("DB error, updating user: {}", e);
            return Err(HttpError::server_error(
                ErrorMessage::ServerError.to_string(),
            ));
        }
    };

    Ok(UserResponseDto {
        status: "success".to_string(),
        data: UserData {
            user: FilterUserDto::filter_user(&user),
        },
    })
}
