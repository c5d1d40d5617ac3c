use super::DBClient;
use crate::dtos::CommentDto;
use crate::models::Comment;
use uuid::Uuid;

const COMMENT_PROJECTION: &str = "c.id, u.username AS author, c.text, c.pub_date";

/// Comment database operations trait
pub trait CommentExt {
    /// Paginated comments of a review, newest first.
    async fn get_comments(
        &self,
        review_id: i64,
        page: u32,
        limit: usize,
    ) -> Result<Vec<CommentDto>, sqlx::Error>;

    async fn get_comment_count(&self, review_id: i64) -> Result<i64, sqlx::Error>;

    async fn get_comment(
        &self,
        review_id: i64,
        comment_id: i64,
    ) -> Result<Option<Comment>, sqlx::Error>;

    async fn get_comment_dto(
        &self,
        review_id: i64,
        comment_id: i64,
    ) -> Result<Option<CommentDto>, sqlx::Error>;

    /// Insert a comment; pub_date is assigned by the database.
    async fn save_comment(
        &self,
        review_id: i64,
        author_id: Uuid,
        text: &str,
    ) -> Result<CommentDto, sqlx::Error>;

    async fn update_comment(
        &self,
        comment_id: i64,
        text: &str,
    ) -> Result<CommentDto, sqlx::Error>;

    async fn delete_comment(&self, comment_id: i64) -> Result<(), sqlx::Error>;
}

impl CommentExt for DBClient {
    async fn get_comments(
        &self,
        review_id: i64,
        page: u32,
        limit: usize,
    ) -> Result<Vec<CommentDto>, sqlx::Error> {
        let offset = (page - 1) * limit as u32;

        sqlx::query_as::<_, CommentDto>(&format!(
            "SELECT {COMMENT_PROJECTION} FROM comments c \
             JOIN users u ON u.id = c.author_id \
             WHERE c.review_id = $1 \
             ORDER BY c.pub_date DESC LIMIT $2 OFFSET $3"
        ))
        .bind(review_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_comment_count(&self, review_id: i64) -> Result<i64, sqlx::Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE review_id = $1")
            .bind(review_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn get_comment(
        &self,
        review_id: i64,
        comment_id: i64,
    ) -> Result<Option<Comment>, sqlx::Error> {
        sqlx::query_as::<_, Comment>(
            "SELECT id, review_id, author_id, text, pub_date \
             FROM comments WHERE id = $1 AND review_id = $2",
        )
        .bind(comment_id)
        .bind(review_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_comment_dto(
        &self,
        review_id: i64,
        comment_id: i64,
    ) -> Result<Option<CommentDto>, sqlx::Error> {
        sqlx::query_as::<_, CommentDto>(&format!(
            "SELECT {COMMENT_PROJECTION} FROM comments c \
             JOIN users u ON u.id = c.author_id \
             WHERE c.id = $1 AND c.review_id = $2"
        ))
        .bind(comment_id)
        .bind(review_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn save_comment(
        &self,
        review_id: i64,
        author_id: Uuid,
        text: &str,
    ) -> Result<CommentDto, sqlx::Error> {
        sqlx::query_as::<_, CommentDto>(&format!(
            "WITH new_comment AS (\
                 INSERT INTO comments (review_id, author_id, text) \
                 VALUES ($1, $2, $3) \
                 RETURNING * \
             ) \
             SELECT {} FROM new_comment c JOIN users u ON u.id = c.author_id",
            COMMENT_PROJECTION
        ))
        .bind(review_id)
        .bind(author_id)
        .bind(text)
        .fetch_one(&self.pool)
        .await
    }

    async fn update_comment(
        &self,
        comment_id: i64,
        text: &str,
    ) -> Result<CommentDto, sqlx::Error> {
        sqlx::query_as::<_, CommentDto>(&format!(
            "WITH updated_comment AS (\
                 UPDATE comments SET text = $1 WHERE id = $2 RETURNING * \
             ) \
             SELECT {} FROM updated_comment c JOIN users u ON u.id = c.author_id",
            COMMENT_PROJECTION
        ))
        .bind(text)
        .bind(comment_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn delete_comment(&self, comment_id: i64) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(comment_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        Ok(())
    }
}
