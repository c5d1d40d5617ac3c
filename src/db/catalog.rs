use super::DBClient;
use crate::models::{Category, Genre};
use sqlx::{Postgres, QueryBuilder};

/// Category and genre database operations.
///
/// The two resources are structurally identical slug-addressed lookup
/// tables, so their queries live side by side here.
pub trait CatalogExt {
    /// Paginated categories, optionally filtered by a name substring.
    async fn get_categories(
        &self,
        page: u32,
        limit: usize,
        search: Option<&str>,
    ) -> Result<Vec<Category>, sqlx::Error>;

    async fn get_category_count(&self, search: Option<&str>) -> Result<i64, sqlx::Error>;

    async fn get_category_by_slug(&self, slug: &str) -> Result<Option<Category>, sqlx::Error>;

    async fn save_category(&self, name: &str, slug: &str) -> Result<Category, sqlx::Error>;

    /// Delete a category; referencing titles keep existing with a cleared
    /// category (ON DELETE SET NULL).
    async fn delete_category(&self, slug: &str) -> Result<(), sqlx::Error>;

    async fn get_genres(
        &self,
        page: u32,
        limit: usize,
        search: Option<&str>,
    ) -> Result<Vec<Genre>, sqlx::Error>;

    async fn get_genre_count(&self, search: Option<&str>) -> Result<i64, sqlx::Error>;

    async fn get_genre_by_slug(&self, slug: &str) -> Result<Option<Genre>, sqlx::Error>;

    async fn save_genre(&self, name: &str, slug: &str) -> Result<Genre, sqlx::Error>;

    /// Delete a genre; link rows keep their titles (ON DELETE SET NULL).
    async fn delete_genre(&self, slug: &str) -> Result<(), sqlx::Error>;
}

fn list_query<'a>(table: &str, search: Option<&'a str>, limit: usize, offset: u32) -> QueryBuilder<'a, Postgres> {
    let mut qb: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("SELECT id, name, slug FROM {table}"));
    if let Some(term) = search {
        qb.push(" WHERE name ILIKE ").push_bind(format!("%{term}%"));
    }
    qb.push(" ORDER BY name LIMIT ").push_bind(limit as i64);
    qb.push(" OFFSET ").push_bind(offset as i64);
    qb
}

fn count_query<'a>(table: &str, search: Option<&'a str>) -> QueryBuilder<'a, Postgres> {
    let mut qb: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("SELECT COUNT(*) FROM {table}"));
    if let Some(term) = search {
        qb.push(" WHERE name ILIKE ").push_bind(format!("%{term}%"));
    }
    qb
}

impl CatalogExt for DBClient {
    async fn get_categories(
        &self,
        page: u32,
        limit: usize,
        search: Option<&str>,
    ) -> Result<Vec<Category>, sqlx::Error> {
        let offset = (page - 1) * limit as u32;

        list_query("categories", search, limit, offset)
            .build_query_as::<Category>()
            .fetch_all(&self.pool)
            .await
    }

    async fn get_category_count(&self, search: Option<&str>) -> Result<i64, sqlx::Error> {
        count_query("categories", search)
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
    }

    async fn get_category_by_slug(&self, slug: &str) -> Result<Option<Category>, sqlx::Error> {
        sqlx::query_as::<_, Category>("SELECT id, name, slug FROM categories WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
    }

    async fn save_category(&self, name: &str, slug: &str) -> Result<Category, sqlx::Error> {
        sqlx::query_as::<_, Category>(
            "INSERT INTO categories (name, slug) VALUES ($1, $2) RETURNING id, name, slug",
        )
        .bind(name)
        .bind(slug)
        .fetch_one(&self.pool)
        .await
    }

    async fn delete_category(&self, slug: &str) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM categories WHERE slug = $1")
            .bind(slug)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        Ok(())
    }

    async fn get_genres(
        &self,
        page: u32,
        limit: usize,
        search: Option<&str>,
    ) -> Result<Vec<Genre>, sqlx::Error> {
        let offset = (page - 1) * limit as u32;

        list_query("genres", search, limit, offset)
            .build_query_as::<Genre>()
            .fetch_all(&self.pool)
            .await
    }

    async fn get_genre_count(&self, search: Option<&str>) -> Result<i64, sqlx::Error> {
        count_query("genres", search)
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
    }

    async fn get_genre_by_slug(&self, slug: &str) -> Result<Option<Genre>, sqlx::Error> {
        sqlx::query_as::<_, Genre>("SELECT id, name, slug FROM genres WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
    }

    async fn save_genre(&self, name: &str, slug: &str) -> Result<Genre, sqlx::Error> {
        sqlx::query_as::<_, Genre>(
            "INSERT INTO genres (name, slug) VALUES ($1, $2) RETURNING id, name, slug",
        )
        .bind(name)
        .bind(slug)
        .fetch_one(&self.pool)
        .await
    }

    async fn delete_genre(&self, slug: &str) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM genres WHERE slug = $1")
            .bind(slug)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        Ok(())
    }
}
