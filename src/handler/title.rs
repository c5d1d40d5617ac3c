use std::collections::HashMap;

use crate::{
    AppState,
    db::{CatalogExt, ReviewExt, TitleChanges, TitleExt, TitleFilter, TitleGenreRow, TitleRecord},
    dtos::{
        CategoryDto, GenreDto, InputTitleDto, PaginationDto, TitleDto, TitleListResponseDto,
        TitleResponseDto, TitlesQueryDto, UpdateTitleDto,
    },
    error::{ErrorMessage, HttpError},
    middleware::{auth, role_check},
    models::{Category, Genre, UserRole},
};
use axum::{
    Json, Router, middleware,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};
use tracing::instrument;
use validator::Validate;

use super::review::review_handler;

/// Router for title endpoints: reads public, writes admin-only.
/// Reviews (and through them, comments) nest under each title.
pub fn title_handler(app_state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(get_titles))
        .route(
            "/",
            post(create_title)
                .layer(middleware::from_fn(|req, next| {
                    role_check(req, next, vec![UserRole::Admin])
                }))
                .layer(middleware::from_fn_with_state(app_state.clone(), auth)),
        )
        .route("/{title_id}", get(get_title))
        .route(
            "/{title_id}",
            patch(update_title)
                .delete(delete_title)
                .layer(middleware::from_fn(|req, next| {
                    role_check(req, next, vec![UserRole::Admin])
                }))
                .layer(middleware::from_fn_with_state(app_state.clone(), auth)),
        )
        .nest("/{title_id}/reviews", review_handler(app_state))
}

/// Get paginated titles with filters on category/genre slug, name and year
#[instrument(skip(app_state))]
pub async fn get_titles(
    Query(params): Query<TitlesQueryDto>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    params.validate().map_err(|e| {
        tracing::error!("Invalid get_titles input: {}", e);
        HttpError::bad_request(e.to_string())
    })?;

    let page = params.page.unwrap_or(1);
    let limit = params.limit.unwrap_or(10);
    let filter = TitleFilter {
        category: params.category,
        genre: params.genre,
        name: params.name,
        year: params.year,
    };

    let records = app_state
        .db_client
        .get_titles(&filter, page as u32, limit)
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting titles: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    let total = app_state
        .db_client
        .get_title_count(&filter)
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting title count: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    let data = expand_records(&app_state, records).await?;

    let total_pages = (total as f64 / limit as f64).ceil() as i32;

    let response = Json(TitleListResponseDto {
        status: "success".to_string(),
        data,
        pagination: PaginationDto {
            page: page as i32,
            limit: limit as i32,
            total: total as i32,
            total_pages,
        },
    });
    tracing::info!("get_titles successful");
    Ok(response)
}

/// Get a single title with nested category/genres and its rating
#[instrument(skip(app_state))]
pub async fn get_title(
    Path(title_id): Path<i64>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    let record = read_title_record(&app_state, title_id).await?;

    let mut dtos = expand_records(&app_state, vec![record]).await?;

    let response = Json(TitleResponseDto {
        status: "success".to_string(),
        data: dtos.remove(0),
    });
    tracing::info!("get_title successful");
    Ok(response)
}

/// Create a title (admin only).
///
/// Category and genres arrive as slugs; an unknown slug is a validation
/// error, not a 404 (the title route itself resolved fine).
#[instrument(skip(app_state, body), fields(name = %body.name))]
pub async fn create_title(
    State(app_state): State<AppState>,
    Json(body): Json<InputTitleDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(|e| {
        tracing::error!("Invalid create_title input: {}", e);
        HttpError::bad_request(e.to_string())
    })?;

    let category = resolve_category(&app_state, &body.category).await?;
    let genres = resolve_genres(&app_state, &body.genre).await?;
    let genre_ids: Vec<i64> = genres.iter().map(|g| g.id).collect();

    let title = app_state
        .db_client
        .save_title(
            &body.name,
            body.year,
            body.description.as_deref(),
            category.id,
            &genre_ids,
        )
        .await
        .map_err(|e| {
            tracing::error!("DB error, saving title: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    let response = Json(TitleResponseDto {
        status: "success".to_string(),
        data: TitleDto {
            id: title.id,
            name: title.name,
            year: title.year,
            rating: None,
            description: title.description,
            genre: genres.iter().map(GenreDto::from_model).collect(),
            category: Some(CategoryDto::from_model(&category)),
        },
    });
    tracing::info!("create_title successful");
    Ok((StatusCode::CREATED, response))
}

/// Partially update a title (admin only).
/// A genre list in the payload replaces the whole link set.
#[instrument(skip(app_state, body))]
pub async fn update_title(
    Path(title_id): Path<i64>,
    State(app_state): State<AppState>,
    Json(body): Json<UpdateTitleDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate().map_err(|e| {
        tracing::error!("Invalid update_title input: {}", e);
        HttpError::bad_request(e.to_string())
    })?;

    let category_id = match &body.category {
        Some(slug) => Some(resolve_category(&app_state, slug).await?.id),
        None => None,
    };
    let genre_ids = match &body.genre {
        Some(slugs) => Some(
            resolve_genres(&app_state, slugs)
                .await?
                .iter()
                .map(|g| g.id)
                .collect::<Vec<i64>>(),
        ),
        None => None,
    };

    let changes = TitleChanges {
        name: body.name,
        year: body.year,
        description: body.description,
        category_id,
        genre_ids,
    };

    let updated = app_state
        .db_client
        .update_title(title_id, &changes)
        .await
        .map_err(|e| {
            tracing::error!("DB error, updating title: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    if updated.is_none() {
        return Err(HttpError::not_found(format!("Title {title_id} not found")));
    }

    // Re-read so the response matches a GET, rating included.
    let record = read_title_record(&app_state, title_id).await?;

    let mut dtos = expand_records(&app_state, vec![record]).await?;

    let response = Json(TitleResponseDto {
        status: "success".to_string(),
        data: dtos.remove(0),
    });
    tracing::info!("update_title successful");
    Ok(response)
}

/// Delete a title (admin only); its reviews and their comments cascade.
#[instrument(skip(app_state))]
pub async fn delete_title(
    Path(title_id): Path<i64>,
    State(app_state): State<AppState>,
) -> Result<impl IntoResponse, HttpError> {
    app_state
        .db_client
        .delete_title(title_id)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                HttpError::not_found(format!("Title {title_id} not found"))
            }
            e => {
                tracing::error!("DB error, deleting title: {}", e);
                HttpError::server_error(ErrorMessage::ServerError.to_string())
            }
        })?;

    tracing::info!("delete_title successful");
    Ok(StatusCode::NO_CONTENT)
}

async fn resolve_category(app_state: &AppState, slug: &str) -> Result<Category, HttpError> {
    app_state
        .db_client
        .get_category_by_slug(slug)
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting category by slug: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?
        .ok_or_else(|| {
            HttpError::bad_request(format!("Category with slug '{slug}' does not exist"))
        })
}

/// Resolves every slug; repeated slugs yield repeated links, matching the
/// schema's tolerance for duplicate genre-title pairs.
async fn resolve_genres(app_state: &AppState, slugs: &[String]) -> Result<Vec<Genre>, HttpError> {
    let mut genres = Vec::with_capacity(slugs.len());
    for slug in slugs {
        let genre = app_state
            .db_client
            .get_genre_by_slug(slug)
            .await
            .map_err(|e| {
                tracing::error!("DB error, getting genre by slug: {}", e);
                HttpError::server_error(ErrorMessage::ServerError.to_string())
            })?
            .ok_or_else(|| {
                HttpError::bad_request(format!("Genre with slug '{slug}' does not exist"))
            })?;
        genres.push(genre);
    }
    Ok(genres)
}

/// Fetches one title and pairs it with its computed rating.
async fn read_title_record(
    app_state: &AppState,
    title_id: i64,
) -> Result<TitleRecord, HttpError> {
    let title = app_state
        .db_client
        .get_title(title_id)
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting title: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?
        .ok_or_else(|| HttpError::not_found(format!("Title {title_id} not found")))?;

    let rating = app_state
        .db_client
        .title_rating(title_id)
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting title rating: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    Ok(TitleRecord {
        id: title.id,
        name: title.name,
        year: title.year,
        description: title.description,
        category_id: title.category_id,
        rating,
    })
}

/// Fetches the genres and categories for a page of title records and builds
/// the response DTOs.
async fn expand_records(
    app_state: &AppState,
    records: Vec<TitleRecord>,
) -> Result<Vec<TitleDto>, HttpError> {
    let title_ids: Vec<i64> = records.iter().map(|t| t.id).collect();
    let genre_rows = app_state
        .db_client
        .get_genres_for_titles(&title_ids)
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting genres for titles: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    let category_ids: Vec<i64> = records.iter().filter_map(|t| t.category_id).collect();
    let categories = app_state
        .db_client
        .get_categories_by_ids(&category_ids)
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting categories for titles: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    Ok(build_title_dtos(records, genre_rows, categories))
}

/// Pure assembly of title DTOs from their already-fetched parts.
fn build_title_dtos(
    records: Vec<TitleRecord>,
    genre_rows: Vec<TitleGenreRow>,
    categories: Vec<Category>,
) -> Vec<TitleDto> {
    let category_by_id: HashMap<i64, &Category> =
        categories.iter().map(|c| (c.id, c)).collect();

    let mut genres_by_title: HashMap<i64, Vec<GenreDto>> = HashMap::new();
    for row in &genre_rows {
        genres_by_title.entry(row.title_id).or_default().push(GenreDto {
            name: row.name.clone(),
            slug: row.slug.clone(),
        });
    }

    records
        .into_iter()
        .map(|record| TitleDto {
            id: record.id,
            name: record.name,
            year: record.year,
            rating: record.rating,
            description: record.description,
            genre: genres_by_title.remove(&record.id).unwrap_or_default(),
            category: record
                .category_id
                .and_then(|id| category_by_id.get(&id).copied())
                .map(CategoryDto::from_model),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, category_id: Option<i64>, rating: Option<f64>) -> TitleRecord {
        TitleRecord {
            id,
            name: format!("title-{id}"),
            year: 2000,
            description: None,
            category_id,
            rating,
        }
    }

    fn genre_row(title_id: i64, slug: &str) -> TitleGenreRow {
        TitleGenreRow {
            title_id,
            id: 1,
            name: slug.to_uppercase(),
            slug: slug.to_string(),
        }
    }

    #[test]
    fn rating_passes_through_and_absent_stays_absent() {
        let dtos = build_title_dtos(
            vec![record(1, None, Some(7.5)), record(2, None, None)],
            vec![],
            vec![],
        );
        assert_eq!(dtos[0].rating, Some(7.5));
        assert_eq!(dtos[1].rating, None);
    }

    #[test]
    fn genres_group_by_title() {
        let dtos = build_title_dtos(
            vec![record(1, None, None), record(2, None, None)],
            vec![
                genre_row(1, "sci-fi"),
                genre_row(1, "drama"),
                genre_row(2, "drama"),
            ],
            vec![],
        );
        let slugs: Vec<&str> = dtos[0].genre.iter().map(|g| g.slug.as_str()).collect();
        assert_eq!(slugs, vec!["sci-fi", "drama"]);
        assert_eq!(dtos[1].genre.len(), 1);
    }

    #[test]
    fn duplicate_genre_links_are_preserved() {
        let dtos = build_title_dtos(
            vec![record(1, None, None)],
            vec![genre_row(1, "drama"), genre_row(1, "drama")],
            vec![],
        );
        assert_eq!(dtos[0].genre.len(), 2);
    }

    #[test]
    fn detached_category_renders_as_null() {
        let films = Category {
            id: 10,
            name: "Films".to_string(),
            slug: "films".to_string(),
        };
        let dtos = build_title_dtos(
            vec![record(1, Some(10), None), record(2, None, None)],
            vec![],
            vec![films],
        );
        assert_eq!(dtos[0].category.as_ref().unwrap().slug, "films");
        assert!(dtos[1].category.is_none());
    }
}
