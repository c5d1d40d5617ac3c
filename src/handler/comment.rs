use crate::{
    AppState,
    db::{CommentExt, ReviewExt},
    dtos::{
        CommentListResponseDto, InputCommentDto, PaginationDto, RequestQueryDto,
        SingleCommentResponseDto,
    },
    error::{ErrorMessage, HttpError},
    middleware::{JWTAuthMiddleware, auth, is_owner_or_staff},
    models::Review,
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

/// Router for comment endpoints, nested under
/// /titles/{title_id}/reviews/{review_id}/comments.
pub fn comment_handler(app_state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(get_comments))
        .route(
            "/",
            post(create_comment)
                .layer(middleware::from_fn_with_state(app_state.clone(), auth)),
        )
        .route("/{comment_id}", get(get_comment))
        .route(
            "/{comment_id}",
            patch(update_comment)
                .delete(delete_comment)
                .layer(middleware::from_fn_with_state(app_state, auth)),
        )
}

/// Get paginated comments of a review, newest first
#[instrument(skip(app_state))]
pub async fn get_comments(
    Query(params): Query<RequestQueryDto>,
    Path((title_id, review_id)): Path<(i64, i64)>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    params.validate().map_err(|e| {
        tracing::error!("Invalid get_comments input: {}", e);
        HttpError::bad_request(e.to_string())
    })?;

    ensure_review_exists(&app_state, title_id, review_id).await?;

    let page = params.page.unwrap_or(1);
    let limit = params.limit.unwrap_or(10);

    let comments = app_state
        .db_client
        .get_comments(review_id, page as u32, limit)
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting comments: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    let total = app_state
        .db_client
        .get_comment_count(review_id)
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting comment count: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    let total_pages = (total as f64 / limit as f64).ceil() as i32;

    let response = Json(CommentListResponseDto {
        status: "success".to_string(),
        data: comments,
        pagination: PaginationDto {
            page: page as i32,
            limit: limit as i32,
            total: total as i32,
            total_pages,
        },
    });
    tracing::info!("get_comments successful");
    Ok(response)
}

/// Comment on a review.
///
/// The (title_id, review_id) pair is checked as a whole: a real review id
/// stated under the wrong title is a 404, which blocks cross-title comment
/// injection. The author always comes from the auth extension.
#[instrument(skip(app_state, body, jwt), fields(username = %jwt.user.username))]
pub async fn create_comment(
    Path((title_id, review_id)): Path<(i64, i64)>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
    Json(body): Json<InputCommentDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(|e| {
        tracing::error!("Invalid create_comment input: {}", e);
        HttpError::bad_request(e.to_string())
    })?;

    ensure_review_exists(&app_state, title_id, review_id).await?;

    let comment = app_state
        .db_client
        .save_comment(review_id, jwt.user.id, &body.text)
        .await
        .map_err(|e| {
            tracing::error!("DB error, saving comment: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    let response = Json(SingleCommentResponseDto {
        status: "success".to_string(),
        data: comment,
    });
    tracing::info!("create_comment successful");
    Ok((StatusCode::CREATED, response))
}

/// Get a single comment
#[instrument(skip(app_state))]
pub async fn get_comment(
    Path((title_id, review_id, comment_id)): Path<(i64, i64, i64)>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    ensure_review_exists(&app_state, title_id, review_id).await?;

    let comment = app_state
        .db_client
        .get_comment_dto(review_id, comment_id)
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting comment: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?
        .ok_or_else(|| HttpError::not_found(format!("Comment {comment_id} not found")))?;

    let response = Json(SingleCommentResponseDto {
        status: "success".to_string(),
        data: comment,
    });
    tracing::info!("get_comment successful");
    Ok(response)
}

/// Partially update a comment (owner, moderator or admin)
#[instrument(skip(app_state, body, jwt), fields(username = %jwt.user.username))]
pub async fn update_comment(
    Path((title_id, review_id, comment_id)): Path<(i64, i64, i64)>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
    Json(body): Json<InputCommentDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(|e| {
        tracing::error!("Invalid update_comment input: {}", e);
        HttpError::bad_request(e.to_string())
    })?;

    let existing = fetch_comment(&app_state, title_id, review_id, comment_id).await?;

    if !is_owner_or_staff(&jwt.user, existing.author_id) {
        return Err(HttpError::new(
            ErrorMessage::PermissionDenied.to_string(),
            StatusCode::FORBIDDEN,
        ));
    }

    let comment = app_state
        .db_client
        .update_comment(comment_id, &body.text)
        .await
        .map_err(|e| {
            tracing::error!("DB error, updating comment: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    let response = Json(SingleCommentResponseDto {
        status: "success".to_string(),
        data: comment,
    });
    tracing::info!("update_comment successful");
    Ok(response)
}

/// Delete a comment (owner, moderator or admin)
#[instrument(skip(app_state, jwt), fields(username = %jwt.user.username))]
pub async fn delete_comment(
    Path((title_id, review_id, comment_id)): Path<(i64, i64, i64)>,
    State(app_state): State<AppState>,
    Extension(jwt): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let existing = fetch_comment(&app_state, title_id, review_id, comment_id).await?;

    if !is_owner_or_staff(&jwt.user, existing.author_id) {
        return Err(HttpError::new(
            ErrorMessage::PermissionDenied.to_string(),
            StatusCode::FORBIDDEN,
        ));
    }

    app_state
        .db_client
        .delete_comment(comment_id)
        .await
        .map_err(|e| {
            tracing::error!("DB error, deleting comment: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    tracing::info!("delete_comment successful");
    Ok(StatusCode::NO_CONTENT)
}

/// Compound lookup chain: the review must belong to the title and the
/// comment to the review, otherwise 404.
async fn fetch_comment(
    app_state: &AppState,
    title_id: i64,
    review_id: i64,
    comment_id: i64,
) -> Result<crate::models::Comment, HttpError> {
    ensure_review_exists(app_state, title_id, review_id).await?;

    app_state
        .db_client
        .get_comment(review_id, comment_id)
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting comment: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?
        .ok_or_else(|| HttpError::not_found(format!("Comment {comment_id} not found")))
}

async fn ensure_review_exists(
    app_state: &AppState,
    title_id: i64,
    review_id: i64,
) -> Result<Review, HttpError> {
    app_state
        .db_client
        .get_review(title_id, review_id)
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting review: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?
        .ok_or_else(|| HttpError::not_found(format!("Review {review_id} not found")))
}
