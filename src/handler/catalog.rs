use crate::{
    AppState,
    db::CatalogExt,
    dtos::{
        CategoryDto, CategoryListResponseDto, CategoryResponseDto, GenreDto, GenreListResponseDto,
        GenreResponseDto, InputCategoryDto, InputGenreDto, PaginationDto, SearchQueryDto,
    },
    error::{ErrorMessage, HttpError},
    middleware::{auth, role_check},
    models::UserRole,
};
use axum::{
    Json, Router, middleware,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use tracing::instrument;
use validator::Validate;

/// Router for category endpoints: reads are public, writes admin-only.
pub fn category_handler(app_state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(get_categories))
        .route(
            "/",
            post(create_category)
                .layer(middleware::from_fn(|req, next| {
                    role_check(req, next, vec![UserRole::Admin])
                }))
                .layer(middleware::from_fn_with_state(app_state.clone(), auth)),
        )
        .route(
            "/{slug}",
            delete(delete_category)
                .layer(middleware::from_fn(|req, next| {
                    role_check(req, next, vec![UserRole::Admin])
                }))
                .layer(middleware::from_fn_with_state(app_state, auth)),
        )
}

/// Router for genre endpoints; same shape as categories.
pub fn genre_handler(app_state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(get_genres))
        .route(
            "/",
            post(create_genre)
                .layer(middleware::from_fn(|req, next| {
                    role_check(req, next, vec![UserRole::Admin])
                }))
                .layer(middleware::from_fn_with_state(app_state.clone(), auth)),
        )
        .route(
            "/{slug}",
            delete(delete_genre)
                .layer(middleware::from_fn(|req, next| {
                    role_check(req, next, vec![UserRole::Admin])
                }))
                .layer(middleware::from_fn_with_state(app_state, auth)),
        )
}

/// Get paginated categories, optionally filtered with ?search= on the name
#[instrument(skip(app_state))]
pub async fn get_categories(
    Query(params): Query<SearchQueryDto>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    params.validate().map_err(|e| {
        tracing::error!("Invalid get_categories input: {}", e);
        HttpError::bad_request(e.to_string())
    })?;

    let page = params.page.unwrap_or(1);
    let limit = params.limit.unwrap_or(10);

    let categories = app_state
        .db_client
        .get_categories(page as u32, limit, params.search.as_deref())
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting categories: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    let total = app_state
        .db_client
        .get_category_count(params.search.as_deref())
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting category count: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    let total_pages = (total as f64 / limit as f64).ceil() as i32;

    let response = Json(CategoryListResponseDto {
        status: "success".to_string(),
        data: categories.iter().map(CategoryDto::from_model).collect(),
        pagination: PaginationDto {
            page: page as i32,
            limit: limit as i32,
            total: total as i32,
            total_pages,
        },
    });
    tracing::info!("get_categories successful");
    Ok(response)
}

/// Create a category (admin only)
#[instrument(skip(app_state, body), fields(slug = %body.slug))]
pub async fn create_category(
    State(app_state): State<AppState>,
    Json(body): Json<InputCategoryDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(|e| {
        tracing::error!("Invalid create_category input: {}", e);
        HttpError::bad_request(e.to_string())
    })?;

    let taken = app_state
        .db_client
        .get_category_by_slug(&body.slug)
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting category by slug: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?
        .is_some();
    if taken {
        return Err(HttpError::bad_request(format!(
            "Category with slug '{}' already exists",
            body.slug
        )));
    }

    let result = app_state.db_client.save_category(&body.name, &body.slug).await;

    let category = match result {
        Ok(category) => category,
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            tracing::error!("DB error, saving category, unique violation: {}", db_err);
            return Err(HttpError::unique_constraint_violation(format!(
                "Category with slug '{}' already exists",
                body.slug
            )));
        }
        Err(e) => {
            tracing::error!("DB error, saving category: {}", e);
            return Err(HttpError::server_error(
                ErrorMessage::ServerError.to_string(),
            ));
        }
    };

    let response = Json(CategoryResponseDto {
        status: "success".to_string(),
        data: CategoryDto::from_model(&category),
    });
    tracing::info!("create_category successful");
    Ok((StatusCode::CREATED, response))
}

/// Delete a category by slug (admin only).
/// Titles referencing it survive with their category cleared.
#[instrument(skip(app_state))]
pub async fn delete_category(
    Path(slug): Path<String>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    app_state
        .db_client
        .delete_category(&slug)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                HttpError::not_found(format!("Category with slug '{slug}' not found"))
            }
            e => {
                tracing::error!("DB error, deleting category: {}", e);
                HttpError::server_error(ErrorMessage::ServerError.to_string())
            }
        })?;

    tracing::info!("delete_category successful");
    Ok(StatusCode::NO_CONTENT)
}

/// Get paginated genres, optionally filtered with ?search= on the name
#[instrument(skip(app_state))]
pub async fn get_genres(
    Query(params): Query<SearchQueryDto>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    params.validate().map_err(|e| {
        tracing::error!("Invalid get_genres input: {}", e);
        HttpError::bad_request(e.to_string())
    })?;

    let page = params.page.unwrap_or(1);
    let limit = params.limit.unwrap_or(10);

    let genres = app_state
        .db_client
        .get_genres(page as u32, limit, params.search.as_deref())
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting genres: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    let total = app_state
        .db_client
        .get_genre_count(params.search.as_deref())
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting genre count: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    let total_pages = (total as f64 / limit as f64).ceil() as i32;

    let response = Json(GenreListResponseDto {
        status: "success".to_string(),
        data: genres.iter().map(GenreDto::from_model).collect(),
        pagination: PaginationDto {
            page: page as i32,
            limit: limit as i32,
            total: total as i32,
            total_pages,
        },
    });
    tracing::info!("get_genres successful");
    Ok(response)
}

/// Create a genre (admin only)
#[instrument(skip(app_state, body), fields(slug = %body.slug))]
pub async fn create_genre(
    State(app_state): State<AppState>,
    Json(body): Json<InputGenreDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(|e| {
        tracing::error!("Invalid create_genre input: {}", e);
        HttpError::bad_request(e.to_string())
    })?;

    let taken = app_state
        .db_client
        .get_genre_by_slug(&body.slug)
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting genre by slug: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?
        .is_some();
    if taken {
        return Err(HttpError::bad_request(format!(
            "Genre with slug '{}' already exists",
            body.slug
        )));
    }

    let result = app_state.db_client.save_genre(&body.name, &body.slug).await;

    let genre = match result {
        Ok(genre) => genre,
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            tracing::error!("DB error, saving genre, unique violation: {}", db_err);
            return Err(HttpError::unique_constraint_violation(format!(
                "Genre with slug '{}' already exists",
                body.slug
            )));
        }
        Err(e) => {
            tracing::error!("DB error, saving genre: {}", e);
            return Err(HttpError::server_error(
                ErrorMessage::ServerError.to_string(),
            ));
        }
    };

    let response = Json(GenreResponseDto {
        status: "success".to_string(),
        data: GenreDto::from_model(&genre),
    });
    tracing::info!("create_genre successful");
    Ok((StatusCode::CREATED, response))
}

/// Delete a genre by slug (admin only).
/// Linked titles survive; only the link's genre reference is cleared.
#[instrument(skip(app_state))]
pub async fn delete_genre(
    Path(slug): Path<String>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    app_state
        .db_client
        .delete_genre(&slug)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                HttpError::not_found(format!("Genre with slug '{slug}' not found"))
            }
            e => {
                tracing::error!("DB error, deleting genre: {}", e);
                HttpError::server_error(ErrorMessage::ServerError.to_string())
            }
        })?;

    tracing::info!("delete_genre successful");
    Ok(StatusCode::NO_CONTENT)
}
