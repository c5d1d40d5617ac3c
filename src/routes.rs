use axum::{Router, middleware};
use tower_http::trace::TraceLayer;

use crate::{
    AppState,
    handler::{
        auth::auth_handler,
        catalog::{category_handler, genre_handler},
        title::title_handler,
        users::users_handler,
    },
    middleware::auth,
};

/// The /api/v1 surface. Reviews nest under titles and comments under
/// reviews inside title_handler, mirroring the resource hierarchy.
pub fn create_router(app_state: AppState) -> Router {
    let api_route = Router::new()
        .nest("/auth", auth_handler())
        .nest(
            "/users",
            users_handler().layer(middleware::from_fn_with_state(app_state.clone(), auth)),
        )
        .nest("/categories", category_handler(app_state.clone()))
        .nest("/genres", genre_handler(app_state.clone()))
        .nest("/titles", title_handler(app_state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    Router::new().nest("/api/v1", api_route)
}
