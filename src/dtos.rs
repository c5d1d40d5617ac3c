use crate::models::{Category, Genre, MAX_SCORE, MIN_SCORE, User, UserRole};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::{Validate, ValidationError};

// DTOs define the structure of data exchanged with clients. They are
// separate from the database models to control exactly what is exposed.

// ============================================================================
// Custom validators
// ============================================================================

/// Username rule: letters, digits and @/./+/-/_ only, and never the
/// reserved literal "me" (it is the path segment for the self profile).
fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username == "me" {
        let mut err = ValidationError::new("reserved_username");
        err.message = Some("Username \"me\" is reserved".into());
        return Err(err);
    }
    let well_formed = username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-'));
    if !well_formed {
        let mut err = ValidationError::new("invalid_username");
        err.message =
            Some("Username may only contain letters, digits and @/./+/-/_ characters".into());
        return Err(err);
    }
    Ok(())
}

fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    let well_formed = slug
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'));
    if !well_formed {
        let mut err = ValidationError::new("invalid_slug");
        err.message =
            Some("Slug may only contain ASCII letters, digits, hyphens and underscores".into());
        return Err(err);
    }
    Ok(())
}

fn validate_score(score: i32) -> Result<(), ValidationError> {
    if score < MIN_SCORE {
        let mut err = ValidationError::new("score_too_low");
        err.message = Some(format!("Score must not be less than {MIN_SCORE}").into());
        return Err(err);
    }
    if score > MAX_SCORE {
        let mut err = ValidationError::new("score_too_high");
        err.message = Some(format!("Score must not be greater than {MAX_SCORE}").into());
        return Err(err);
    }
    Ok(())
}

/// A title's release year may not lie beyond the server's wall-clock year.
fn validate_year(year: i32) -> Result<(), ValidationError> {
    let current_year = Utc::now().year();
    if year > current_year {
        let mut err = ValidationError::new("year_in_future");
        err.message = Some(format!("Year must not be greater than {current_year}").into());
        return Err(err);
    }
    Ok(())
}

fn validate_role(role: &str) -> Result<(), ValidationError> {
    if UserRole::from_str(role).is_err() {
        let mut err = ValidationError::new("unknown_role");
        err.message = Some("Role must be one of: user, moderator, admin".into());
        return Err(err);
    }
    Ok(())
}

// ============================================================================
// Authentication DTOs
// ============================================================================

/// Signup request: no password, just the pair a confirmation code gets
/// mailed to.
#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct SignupDto {
    #[validate(
        length(min = 1, max = 150, message = "Username must be 1 to 150 characters"),
        custom(function = "validate_username")
    )]
    pub username: String,

    #[validate(
        length(min = 1, max = 254, message = "Email must be 1 to 254 characters"),
        email(message = "Email is invalid")
    )]
    pub email: String,
}

/// Confirmation-code exchange request.
#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct TokenRequestDto {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,

    #[validate(length(min = 1, message = "Confirmation code is required"))]
    pub confirmation_code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponseDto {
    pub token: String,
}

// ============================================================================
// Pagination & query DTOs
// ============================================================================

/// Generic pagination query parameters
#[derive(Serialize, Deserialize, Validate, Debug)]
pub struct RequestQueryDto {
    #[validate(range(min = 1))]
    pub page: Option<usize>,

    #[validate(range(min = 1, max = 50))]
    pub limit: Option<usize>,
}

/// Pagination plus a substring match on the name column.
#[derive(Serialize, Deserialize, Validate, Debug)]
pub struct SearchQueryDto {
    #[validate(range(min = 1))]
    pub page: Option<usize>,

    #[validate(range(min = 1, max = 50))]
    pub limit: Option<usize>,

    #[validate(length(min = 1))]
    pub search: Option<String>,
}

/// Title listing filters; category and genre filter by slug.
#[derive(Serialize, Deserialize, Validate, Debug)]
pub struct TitlesQueryDto {
    #[validate(range(min = 1))]
    pub page: Option<usize>,

    #[validate(range(min = 1, max = 50))]
    pub limit: Option<usize>,

    #[validate(length(min = 1))]
    pub category: Option<String>,

    #[validate(length(min = 1))]
    pub genre: Option<String>,

    #[validate(length(min = 1))]
    pub name: Option<String>,

    pub year: Option<i32>,
}

/// Pagination metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct PaginationDto {
    pub page: i32,
    pub limit: i32,
    pub total: i32,
    pub total_pages: i32,
}

/// Generic success response
#[derive(Serialize, Deserialize)]
pub struct Response {
    pub status: &'static str,
    pub message: String,
}

// ============================================================================
// User DTOs
// ============================================================================

/// User data sent to clients; the role travels as its lowercase string form.
#[derive(Debug, Serialize, Deserialize)]
pub struct FilterUserDto {
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub role: String,
}

impl FilterUserDto {
    pub fn filter_user(user: &User) -> Self {
        FilterUserDto {
            username: user.username.to_owned(),
            email: user.email.to_owned(),
            first_name: user.first_name.to_owned(),
            last_name: user.last_name.to_owned(),
            bio: user.bio.to_owned(),
            role: user.role.to_str().to_string(),
        }
    }

    pub fn filter_users(users: &[User]) -> Vec<FilterUserDto> {
        users.iter().map(FilterUserDto::filter_user).collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserData {
    pub user: FilterUserDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponseDto {
    pub status: String,
    pub data: UserData,
}

/// User list with count
#[derive(Debug, Serialize, Deserialize)]
pub struct UserListResponseDto {
    pub status: String,
    pub users: Vec<FilterUserDto>,
    pub results: i64,
}

/// Admin user creation; role defaults to "user" when omitted.
#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct CreateUserDto {
    #[validate(
        length(min = 1, max = 150, message = "Username must be 1 to 150 characters"),
        custom(function = "validate_username")
    )]
    pub username: String,

    #[validate(
        length(min = 1, max = 254, message = "Email must be 1 to 254 characters"),
        email(message = "Email is invalid")
    )]
    pub email: String,

    #[validate(length(max = 150, message = "First name must be at most 150 characters"))]
    pub first_name: Option<String>,

    #[validate(length(max = 150, message = "Last name must be at most 150 characters"))]
    pub last_name: Option<String>,

    pub bio: Option<String>,

    #[validate(custom(function = "validate_role"))]
    pub role: Option<String>,
}

/// Admin partial update; every field optional, absent means unchanged.
#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct UpdateUserDto {
    #[validate(
        length(min = 1, max = 150, message = "Username must be 1 to 150 characters"),
        custom(function = "validate_username")
    )]
    pub username: Option<String>,

    #[validate(
        length(min = 1, max = 254, message = "Email must be 1 to 254 characters"),
        email(message = "Email is invalid")
    )]
    pub email: Option<String>,

    #[validate(length(max = 150, message = "First name must be at most 150 characters"))]
    pub first_name: Option<String>,

    #[validate(length(max = 150, message = "Last name must be at most 150 characters"))]
    pub last_name: Option<String>,

    pub bio: Option<String>,

    #[validate(custom(function = "validate_role"))]
    pub role: Option<String>,
}

/// Self-service profile update: same as the admin update minus the role,
/// which a user may never change on their own account.
#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct UpdateMeDto {
    #[validate(
        length(min = 1, max = 150, message = "Username must be 1 to 150 characters"),
        custom(function = "validate_username")
    )]
    pub username: Option<String>,

    #[validate(
        length(min = 1, max = 254, message = "Email must be 1 to 254 characters"),
        email(message = "Email is invalid")
    )]
    pub email: Option<String>,

    #[validate(length(max = 150, message = "First name must be at most 150 characters"))]
    pub first_name: Option<String>,

    #[validate(length(max = 150, message = "Last name must be at most 150 characters"))]
    pub last_name: Option<String>,

    pub bio: Option<String>,
}

// ============================================================================
// Category & genre DTOs
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CategoryDto {
    pub name: String,
    pub slug: String,
}

impl CategoryDto {
    pub fn from_model(category: &Category) -> Self {
        CategoryDto {
            name: category.name.to_owned(),
            slug: category.slug.to_owned(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenreDto {
    pub name: String,
    pub slug: String,
}

impl GenreDto {
    pub fn from_model(genre: &Genre) -> Self {
        GenreDto {
            name: genre.name.to_owned(),
            slug: genre.slug.to_owned(),
        }
    }
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct InputCategoryDto {
    #[validate(length(min = 1, max = 256, message = "Name must be 1 to 256 characters"))]
    pub name: String,

    #[validate(
        length(min = 1, max = 50, message = "Slug must be 1 to 50 characters"),
        custom(function = "validate_slug")
    )]
    pub slug: String,
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct InputGenreDto {
    #[validate(length(min = 1, max = 256, message = "Name must be 1 to 256 characters"))]
    pub name: String,

    #[validate(
        length(min = 1, max = 50, message = "Slug must be 1 to 50 characters"),
        custom(function = "validate_slug")
    )]
    pub slug: String,
}

#[derive(Debug, Serialize)]
pub struct CategoryResponseDto {
    pub status: String,
    pub data: CategoryDto,
}

#[derive(Debug, Serialize)]
pub struct CategoryListResponseDto {
    pub status: String,
    pub data: Vec<CategoryDto>,
    pub pagination: PaginationDto,
}

#[derive(Debug, Serialize)]
pub struct GenreResponseDto {
    pub status: String,
    pub data: GenreDto,
}

#[derive(Debug, Serialize)]
pub struct GenreListResponseDto {
    pub status: String,
    pub data: Vec<GenreDto>,
    pub pagination: PaginationDto,
}

// ============================================================================
// Title DTOs
// ============================================================================

/// Full title representation: nested category/genres plus the computed
/// rating. `rating` is null (not zero) for a title nobody has reviewed.
#[derive(Debug, Serialize, Deserialize)]
pub struct TitleDto {
    pub id: i64,
    pub name: String,
    pub year: i32,
    pub rating: Option<f64>,
    pub description: Option<String>,
    pub genre: Vec<GenreDto>,
    pub category: Option<CategoryDto>,
}

/// Title creation payload; category and genres are referenced by slug.
#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct InputTitleDto {
    #[validate(length(min = 1, max = 256, message = "Name must be 1 to 256 characters"))]
    pub name: String,

    #[validate(custom(function = "validate_year"))]
    pub year: i32,

    pub description: Option<String>,

    pub genre: Vec<String>,

    pub category: String,
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct UpdateTitleDto {
    #[validate(length(min = 1, max = 256, message = "Name must be 1 to 256 characters"))]
    pub name: Option<String>,

    #[validate(custom(function = "validate_year"))]
    pub year: Option<i32>,

    pub description: Option<String>,

    pub genre: Option<Vec<String>>,

    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TitleResponseDto {
    pub status: String,
    pub data: TitleDto,
}

#[derive(Debug, Serialize)]
pub struct TitleListResponseDto {
    pub status: String,
    pub data: Vec<TitleDto>,
    pub pagination: PaginationDto,
}

// ============================================================================
// Review DTOs
// ============================================================================

/// Review projection with the author's username joined in.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReviewDto {
    pub id: i64,
    pub title: i64,
    pub author: String,
    pub text: String,
    pub score: i32,
    pub pub_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct InputReviewDto {
    #[validate(length(min = 1, message = "Text is required."))]
    pub text: String,

    #[validate(custom(function = "validate_score"))]
    pub score: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateReviewDto {
    #[validate(length(min = 1, message = "Text is required."))]
    pub text: Option<String>,

    #[validate(custom(function = "validate_score"))]
    pub score: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct SingleReviewResponseDto {
    pub status: String,
    pub data: ReviewDto,
}

#[derive(Debug, Serialize)]
pub struct ReviewListResponseDto {
    pub status: String,
    pub data: Vec<ReviewDto>,
    pub pagination: PaginationDto,
}

// ============================================================================
// Comment DTOs
// ============================================================================

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct CommentDto {
    pub id: i64,
    pub author: String,
    pub text: String,
    pub pub_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct InputCommentDto {
    #[validate(length(min = 1, message = "Text is required."))]
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SingleCommentResponseDto {
    pub status: String,
    pub data: CommentDto,
}

#[derive(Debug, Serialize)]
pub struct CommentListResponseDto {
    pub status: String,
    pub data: Vec<CommentDto>,
    pub pagination: PaginationDto,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(username: &str, email: &str) -> SignupDto {
        SignupDto {
            username: username.to_string(),
            email: email.to_string(),
        }
    }

    #[test]
    fn valid_signup_passes() {
        assert!(signup("alice", "a@x.com").validate().is_ok());
        assert!(signup("a.b+c@d-e_f", "ok@example.org").validate().is_ok());
    }

    #[test]
    fn reserved_username_me_is_rejected() {
        let err = signup("me", "a@x.com").validate().unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn username_with_forbidden_characters_is_rejected() {
        for bad in ["has space", "semi;colon", "sla/sh", "exclaim!"] {
            assert!(signup(bad, "a@x.com").validate().is_err(), "username: {bad:?}");
        }
    }

    #[test]
    fn overlong_username_is_rejected() {
        assert!(signup(&"x".repeat(150), "a@x.com").validate().is_ok());
        assert!(signup(&"x".repeat(151), "a@x.com").validate().is_err());
    }

    #[test]
    fn invalid_email_is_rejected() {
        assert!(signup("alice", "not-an-email").validate().is_err());
        assert!(signup("alice", "").validate().is_err());
    }

    #[test]
    fn score_boundaries_are_inclusive() {
        for score in [MIN_SCORE, MAX_SCORE, 5] {
            let dto = InputReviewDto {
                text: "fine".to_string(),
                score,
            };
            assert!(dto.validate().is_ok(), "score: {score}");
        }
    }

    #[test]
    fn out_of_range_score_names_the_violated_bound() {
        let low = InputReviewDto {
            text: "fine".to_string(),
            score: MIN_SCORE - 1,
        };
        let err = low.validate().unwrap_err();
        assert!(err.to_string().contains("must not be less than 1"));

        let high = InputReviewDto {
            text: "fine".to_string(),
            score: MAX_SCORE + 1,
        };
        let err = high.validate().unwrap_err();
        assert!(err.to_string().contains("must not be greater than 10"));
    }

    #[test]
    fn partial_review_update_checks_score_when_present() {
        let dto = UpdateReviewDto {
            text: None,
            score: Some(MAX_SCORE + 1),
        };
        assert!(dto.validate().is_err());

        let dto = UpdateReviewDto {
            text: None,
            score: None,
        };
        assert!(dto.validate().is_ok());
    }

    fn title(year: i32) -> InputTitleDto {
        InputTitleDto {
            name: "Dune".to_string(),
            year,
            description: None,
            genre: vec!["sci-fi".to_string()],
            category: "films".to_string(),
        }
    }

    #[test]
    fn current_year_is_accepted_next_year_is_not() {
        let current_year = Utc::now().year();
        assert!(title(current_year).validate().is_ok());
        assert!(title(current_year - 50).validate().is_ok());

        let err = title(current_year + 1).validate().unwrap_err();
        assert!(
            err.to_string()
                .contains(&format!("must not be greater than {current_year}"))
        );
    }

    #[test]
    fn role_names_are_validated() {
        for role in ["user", "moderator", "admin"] {
            let dto = CreateUserDto {
                username: "alice".to_string(),
                email: "a@x.com".to_string(),
                role: Some(role.to_string()),
                ..Default::default()
            };
            assert!(dto.validate().is_ok(), "role: {role}");
        }

        let dto = CreateUserDto {
            username: "alice".to_string(),
            email: "a@x.com".to_string(),
            role: Some("superuser".to_string()),
            ..Default::default()
        };
        assert!(dto.validate().is_err());
    }

    #[test]
    fn slug_shape_is_validated() {
        let good = InputCategoryDto {
            name: "Films".to_string(),
            slug: "films_and-series".to_string(),
        };
        assert!(good.validate().is_ok());

        for bad in ["with space", "ünïcode", "dot.dot", ""] {
            let dto = InputCategoryDto {
                name: "Films".to_string(),
                slug: bad.to_string(),
            };
            assert!(dto.validate().is_err(), "slug: {bad:?}");
        }
    }

    #[test]
    fn unrated_title_serializes_rating_as_null() {
        let dto = TitleDto {
            id: 1,
            name: "Dune".to_string(),
            year: 1965,
            rating: None,
            description: None,
            genre: vec![],
            category: None,
        };
        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["rating"], serde_json::Value::Null);

        let rated = TitleDto { rating: Some(7.5), ..dto };
        let json = serde_json::to_value(&rated).unwrap();
        assert_eq!(json["rating"], serde_json::json!(7.5));
    }
}
