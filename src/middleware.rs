use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::IntoResponse,
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    AppState,
    db::UserExt,
    error::{ErrorMessage, HttpError},
    models::{User, UserRole},
    utils::token,
};

/// Request extension carrying the authenticated user.
///
/// Inserted by the `auth` middleware; handlers extract it with
/// `Extension<JWTAuthMiddleware>` and must take the acting user from here,
/// never from client-supplied body fields.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JWTAuthMiddleware {
    pub user: User,
}

/// Pulls the token out of the `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|auth_header| auth_header.to_str().ok())
        .and_then(|auth_value| auth_value.strip_prefix("Bearer ").map(|t| t.to_owned()))
}

/// Authentication middleware.
///
/// Decodes the bearer token, re-fetches the user (the account may have been
/// deleted since the token was issued) and attaches it to the request.
/// Returns 401 when the token is missing, invalid, expired, or orphaned.
pub async fn auth(
    State(app_state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, HttpError> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::TokenNotProvided.to_string()))?;

    let user_id = match token::decode_token(token, app_state.env.jwt_secret.as_bytes()) {
        Ok(subject) => Uuid::parse_str(&subject)
            .map_err(|_| HttpError::unauthorized(ErrorMessage::InvalidToken.to_string()))?,
        Err(_) => {
            return Err(HttpError::unauthorized(
                ErrorMessage::InvalidToken.to_string(),
            ));
        }
    };

    let user = app_state
        .db_client
        .get_user(Some(user_id), None, None)
        .await
        .map_err(|e| {
            tracing::error!("DB error, getting user for auth: {}", e);
            HttpError::server_error(ErrorMessage::ServerError.to_string())
        })?;

    let user =
        user.ok_or_else(|| HttpError::unauthorized(ErrorMessage::UserNoLongerExist.to_string()))?;

    req.extensions_mut().insert(JWTAuthMiddleware { user });

    Ok(next.run(req).await)
}

/// Role-based access control middleware; must run after `auth`.
///
/// Returns 401 when no authenticated user is attached, 403 when the user's
/// role is not in the required set.
pub async fn role_check(
    req: Request,
    next: Next,
    required_roles: Vec<UserRole>,
) -> Result<impl IntoResponse, HttpError> {
    let user = req
        .extensions()
        .get::<JWTAuthMiddleware>()
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::UserNotAuthenticated.to_string()))?;

    if !required_roles.contains(&user.user.role) {
        return Err(HttpError::new(
            ErrorMessage::PermissionDenied.to_string(),
            StatusCode::FORBIDDEN,
        ));
    }

    Ok(next.run(req).await)
}

/// Mutation gate for reviews and comments: the author themselves, or anyone
/// holding the moderation capability.
pub fn is_owner_or_staff(user: &User, author_id: Uuid) -> bool {
    user.id == author_id || user.role.can_moderate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn user_with_role(role: UserRole) -> User {
        User {
            id: Uuid::parse_str("4ac1dc73-7e17-4f1e-b5a1-0d6b1b1c2a3b").unwrap(),
            username: "alice".to_string(),
            email: "a@x.com".to_string(),
            first_name: None,
            last_name: None,
            bio: None,
            role,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn bearer_token_is_extracted_from_the_authorization_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi".to_string()));
    }

    #[test]
    fn non_bearer_authorization_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        );
        assert_eq!(bearer_token(&headers), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn owner_may_mutate_their_own_resource() {
        let user = user_with_role(UserRole::User);
        assert!(is_owner_or_staff(&user, user.id));
    }

    #[test]
    fn plain_user_may_not_mutate_someone_elses_resource() {
        let user = user_with_role(UserRole::User);
        let other = Uuid::parse_str("0f8fad5b-d9cb-469f-a165-70867728950e").unwrap();
        assert!(!is_owner_or_staff(&user, other));
    }

    #[test]
    fn moderator_and_admin_may_mutate_any_resource() {
        let other = Uuid::parse_str("0f8fad5b-d9cb-469f-a165-70867728950e").unwrap();
        assert!(is_owner_or_staff(&user_with_role(UserRole::Moderator), other));
        assert!(is_owner_or_staff(&user_with_role(UserRole::Admin), other));
    }
}
