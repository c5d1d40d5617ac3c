use super::DBClient;
use crate::dtos::ReviewDto;
use crate::models::Review;
use uuid::Uuid;

const REVIEW_PROJECTION: &str =
    "r.id, r.title_id AS title, u.username AS author, r.text, r.score, r.pub_date";

/// Review database operations trait
pub trait ReviewExt {
    /// Paginated reviews of a title, newest first.
    async fn get_reviews(
        &self,
        title_id: i64,
        page: u32,
        limit: usize,
    ) -> Result<Vec<ReviewDto>, sqlx::Error>;

    async fn get_review_count(&self, title_id: i64) -> Result<i64, sqlx::Error>;

    /// Compound lookup: the review must belong to the stated title, so a
    /// valid review id under the wrong title resolves to None.
    async fn get_review(
        &self,
        title_id: i64,
        review_id: i64,
    ) -> Result<Option<Review>, sqlx::Error>;

    async fn get_review_dto(
        &self,
        title_id: i64,
        review_id: i64,
    ) -> Result<Option<ReviewDto>, sqlx::Error>;

    /// Insert a review. The UNIQUE (title_id, author_id) constraint makes
    /// exactly one of any set of concurrent attempts commit; the rest
    /// surface as unique violations. pub_date is assigned by the database.
    async fn save_review(
        &self,
        title_id: i64,
        author_id: Uuid,
        text: &str,
        score: i32,
    ) -> Result<ReviewDto, sqlx::Error>;

    /// Partial update of text and/or score.
    async fn update_review(
        &self,
        review_id: i64,
        text: Option<&str>,
        score: Option<i32>,
    ) -> Result<ReviewDto, sqlx::Error>;

    async fn delete_review(&self, review_id: i64) -> Result<(), sqlx::Error>;

    /// Arithmetic mean of the title's scores; None when it has no reviews.
    async fn title_rating(&self, title_id: i64) -> Result<Option<f64>, sqlx::Error>;
}

impl ReviewExt for DBClient {
    async fn get_reviews(
        &self,
        title_id: i64,
        page: u32,
        limit: usize,
    ) -> Result<Vec<ReviewDto>, sqlx::Error> {
        let offset = (page - 1) * limit as u32;

        sqlx::query_as::<_, ReviewDto>(&format!(
            "SELECT {REVIEW_PROJECTION} FROM reviews r \
             JOIN users u ON u.id = r.author_id \
             WHERE r.title_id = $1 \
             ORDER BY r.pub_date DESC LIMIT $2 OFFSET $3"
        ))
        .bind(title_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_review_count(&self, title_id: i64) -> Result<i64, sqlx::Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE title_id = $1")
            .bind(title_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn get_review(
        &self,
        title_id: i64,
        review_id: i64,
    ) -> Result<Option<Review>, sqlx::Error> {
        sqlx::query_as::<_, Review>(
            "SELECT id, title_id, author_id, text, score, pub_date \
             FROM reviews WHERE id = $1 AND title_id = $2",
        )
        .bind(review_id)
        .bind(title_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_review_dto(
        &self,
        title_id: i64,
        review_id: i64,
    ) -> Result<Option<ReviewDto>, sqlx::Error> {
        sqlx::query_as::<_, ReviewDto>(&format!(
            "SELECT {REVIEW_PROJECTION} FROM reviews r \
             JOIN users u ON u.id = r.author_id \
             WHERE r.id = $1 AND r.title_id = $2"
        ))
        .bind(review_id)
        .bind(title_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn save_review(
        &self,
        title_id: i64,
        author_id: Uuid,
        text: &str,
        score: i32,
    ) -> Result<ReviewDto, sqlx::Error> {
        sqlx::query_as::<_, ReviewDto>(&format!(
            "WITH new_review AS (\
                 INSERT INTO reviews (title_id, author_id, text, score) \
                 VALUES ($1, $2, $3, $4) \
                 RETURNING * \
             ) \
             SELECT {} FROM new_review r JOIN users u ON u.id = r.author_id",
            REVIEW_PROJECTION
        ))
        .bind(title_id)
        .bind(author_id)
        .bind(text)
        .bind(score)
        .fetch_one(&self.pool)
        .await
    }

    async fn update_review(
        &self,
        review_id: i64,
        text: Option<&str>,
        score: Option<i32>,
    ) -> Result<ReviewDto, sqlx::Error> {
        // COALESCE keeps the stored value wherever the change is NULL.
        sqlx::query_as::<_, ReviewDto>(&format!(
            "WITH updated_review AS (\
                 UPDATE reviews \
                 SET text = COALESCE($1, text), score = COALESCE($2, score) \
                 WHERE id = $3 \
                 RETURNING * \
             ) \
             SELECT {} FROM updated_review r JOIN users u ON u.id = r.author_id",
            REVIEW_PROJECTION
        ))
        .bind(text)
        .bind(score)
        .bind(review_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn delete_review(&self, review_id: i64) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(review_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        Ok(())
    }

    async fn title_rating(&self, title_id: i64) -> Result<Option<f64>, sqlx::Error> {
        let rating: Option<f64> =
            sqlx::query_scalar("SELECT AVG(score)::float8 FROM reviews WHERE title_id = $1")
                .bind(title_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(rating)
    }
}
