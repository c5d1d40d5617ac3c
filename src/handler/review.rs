use crate::{
    AppState,
    db::{ReviewExt, TitleExt},
    dtos::{
        InputReviewDto, PaginationDto, ReviewListResponseDto, SingleReviewResponseDto,
        RequestQueryDto, UpdateReviewDto,
    },
    error::{ErrorMessage, HttpError},
    middleware::{JWTAuthMiddleware, auth, is_owner_or_staff},
};
use axum::{
    Extension, Json, Router, middleware,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};
use tracing::instrument;
use validator::Validate;

use super::comment::comment_handler;

/// Router for review endpoints, nested under /titles/{title_id}/reviews.
/// Reads are public; creating needs authentication; editing and deleting
/// need ownership or the moderation capability.
pub fn review_handler(app_state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(get_reviews))
        .route(
            "/",
            post(create_review)
                .layer(middleware::from_fn_with_state(app_state.clone(), auth)),
        )
        .route("/{review_id}", get(get_review))
        .route(
            "/{review_id}",
            patch(update_review)
                .delete(delete_review)
                .layer(middleware::from_fn_with_state(app_state.clone(), auth)),
        )
        .nest("/{review_id}/comments", comment_handler(app_state))
}

/// Get paginated reviews of a title, newest first
#[instrument(skip(app_state))]
pub async fn get_reviews(
    Query(params): Query<RequestQueryDto>,
    Path(title_id): Path<i64>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    params.validate().map_err(|e| {
        tracing::error!("Invalid get_reviews input: {}", e);
        HttpError::bad_request(e.to_string())
    })?;

    ensure_title_exists(&app_state, title_id).await?;

    let page = params.page.unwrap_or(1);
    let limit = params.limit.unwrap_or(10);

    let reviews = app_state
        .db_client
        .get_reviews(title_id, page as u32, limit)
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting reviews: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    let total = app_state
        .db_client
        .get_review_count(title_id)
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting review count: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    let total_pages = (total as f64 / limit as f64).ceil() as i32;

    let response = Json(ReviewListResponseDto {
        status: "success".to_string(),
        data: reviews,
        pagination: PaginationDto {
            page: page as i32,
            limit: limit as i32,
            total: total as i32,
            total_pages,
        },
    });
    tracing::info!("get_reviews successful");
    Ok(response)
}

/// Create a review for a title.
///
/// The author always comes from the auth extension. A second review by the
/// same author for the same title trips the (title_id, author_id) unique
/// constraint; under concurrency exactly one attempt commits.
#[instrument(skip(app_state, body, jwt), fields(username = %jwt.user.username))]
pub async fn create_review(
    Path(title_id): Path<i64>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
    Json(body): Json<InputReviewDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(|e| {
        tracing::error!("Invalid create_review input: {}", e);
        HttpError::bad_request(e.to_string())
    })?;

    ensure_title_exists(&app_state, title_id).await?;

    let result = app_state
        .db_client
        .save_review(title_id, jwt.user.id, &body.text, body.score)
        .await;

    let review = match result {
        Ok(review) => review,
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            tracing::error!("DB error, saving review, unique violation: {}", db_err);
            return Err(HttpError::bad_request(
                "You have already reviewed this title".to_string(),
            ));
        }
        Err(e) => {
            tracing::error!("DB error, saving review: {}", e);
            return Err(HttpError::server_error(
                ErrorMessage::ServerError.to_string(),
            ));
        }
    };

    let response = Json(SingleReviewResponseDto {
        status: "success".to_string(),
        data: review,
    });
    tracing::info!("create_review successful");
    Ok((StatusCode::CREATED, response))
}

/// Get a single review; the id must belong to the stated title
#[instrument(skip(app_state))]
pub async fn get_review(
    Path((title_id, review_id)): Path<(i64, i64)>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    let review = app_state
        .db_client
        .get_review_dto(title_id, review_id)
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting review: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?
        .ok_or_else(|| HttpError::not_found(format!("Review {review_id} not found")))?;

    let response = Json(SingleReviewResponseDto {
        status: "success".to_string(),
        data: review,
    });
    tracing::info!("get_review successful");
    Ok(response)
}

/// Partially update a review (owner, moderator or admin)
#[instrument(skip(app_state, body, jwt), fields(username = %jwt.user.username))]
pub async fn update_review(
    Path((title_id, review_id)): Path<(i64, i64)>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
    Json(body): Json<UpdateReviewDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(|e| {
        tracing::error!("Invalid update_review input: {}", e);
        HttpError::bad_request(e.to_string())
    })?;

    let existing = app_state
        .db_client
        .get_review(title_id, review_id)
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting review: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?
        .ok_or_else(|| HttpError::not_found(format!("Review {review_id} not found")))?;

    if !is_owner_or_staff(&jwt.user, existing.author_id) {
        return Err(HttpError::new(
            ErrorMessage::PermissionDenied.to_string(),
            StatusCode::FORBIDDEN,
        ));
    }

    let review = app_state
        .db_client
        .update_review(review_id, body.text.as_deref(), body.score)
        .await
        .map_err(|e| {
            tracing::error!("DB error, updating review: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    let response = Json(SingleReviewResponseDto {
        status: "success".to_string(),
        data: review,
    });
    tracing::info!("update_review successful");
    Ok(response)
}

/// Delete a review (owner, moderator or admin)
#[instrument(skip(app_state, jwt), fields(username = %jwt.user.username))]
pub async fn delete_review(
    Path((title_id, review_id)): Path<(i64, i64)>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let existing = app_state
        .db_client
        .get_review(title_id, review_id)
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting review: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?
        .ok_or_else(|| HttpError::not_found(format!("Review {review_id} not found")))?;

    if !is_owner_or_staff(&jwt.user, existing.author_id) {
        return Err(HttpError::new(
            ErrorMessage::PermissionDenied.to_string(),
            StatusCode::FORBIDDEN,
        ));
    }

    app_state
        .db_client
        .delete_review(review_id)
        .await
        .map_err(|e| {
            tracing::error!("DB error, deleting review: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    tracing::info!("delete_review successful");
    Ok(StatusCode::NO_CONTENT)
}

/// 404 for any review operation against an unknown title.
pub(super) async fn ensure_title_exists(
    app_state: &AppState,
    title_id: i64,
) -> Result<(), HttpError> {
    let exists = app_state
        .db_client
        .title_exists(title_id)
        .await
        .map_err(|e| {
            tracing::error!("DB error, checking title existence: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    if !exists {
        return Err(HttpError::not_found(format!("Title {title_id} not found")));
    }

    Ok(())
}
