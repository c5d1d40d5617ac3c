use super::DBClient;
use crate::models::{Category, Title};
use sqlx::{Postgres, QueryBuilder};

/// One row of the title listing: the title plus its computed rating.
/// `rating` is NULL (None) when the title has no reviews; the average is
/// never coerced to zero.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TitleRecord {
    pub id: i64,
    pub name: String,
    pub year: i32,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub rating: Option<f64>,
}

/// Filters for the title listing; all optional, combined with AND.
#[derive(Debug, Default, Clone)]
pub struct TitleFilter {
    pub category: Option<String>,
    pub genre: Option<String>,
    pub name: Option<String>,
    pub year: Option<i32>,
}

/// Partial update for a title. `genre_ids` of `Some` replaces the whole
/// link set; `None` leaves the links alone.
#[derive(Debug, Default, Clone)]
pub struct TitleChanges {
    pub name: Option<String>,
    pub year: Option<i32>,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub genre_ids: Option<Vec<i64>>,
}

/// A genre row tagged with the title it is linked to, for batch expansion
/// of title listings.
#[derive(Debug, sqlx::FromRow)]
pub struct TitleGenreRow {
    pub title_id: i64,
    pub id: i64,
    pub name: String,
    pub slug: String,
}

const TITLE_SELECT: &str =
    "SELECT t.id, t.name, t.year, t.description, t.category_id, AVG(r.score)::float8 AS rating \
     FROM titles t LEFT JOIN reviews r ON r.title_id = t.id";

/// Appends the filter conditions.
/// Genre and category go through subqueries so the review join used for the
/// rating average is never multiplied by link rows.
fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &TitleFilter) {
    qb.push(" WHERE true");
    if let Some(category) = &filter.category {
        qb.push(" AND EXISTS (SELECT 1 FROM categories c WHERE c.id = t.category_id AND c.slug = ");
        qb.push_bind(category.clone());
        qb.push(")");
    }
    if let Some(genre) = &filter.genre {
        qb.push(
            " AND EXISTS (SELECT 1 FROM genre_title gt JOIN genres g ON g.id = gt.genre_id \
             WHERE gt.title_id = t.id AND g.slug = ",
        );
        qb.push_bind(genre.clone());
        qb.push(")");
    }
    if let Some(name) = &filter.name {
        qb.push(" AND t.name ILIKE ");
        qb.push_bind(format!("%{name}%"));
    }
    if let Some(year) = filter.year {
        qb.push(" AND t.year = ");
        qb.push_bind(year);
    }
}

/// Title database operations trait
pub trait TitleExt {
    async fn get_titles(
        &self,
        filter: &TitleFilter,
        page: u32,
        limit: usize,
    ) -> Result<Vec<TitleRecord>, sqlx::Error>;

    async fn get_title_count(&self, filter: &TitleFilter) -> Result<i64, sqlx::Error>;

    async fn get_title(&self, title_id: i64) -> Result<Option<Title>, sqlx::Error>;

    async fn title_exists(&self, title_id: i64) -> Result<bool, sqlx::Error>;

    /// Insert a title together with its genre links in one transaction.
    /// Duplicate links are allowed by the schema and inserted as given.
    async fn save_title(
        &self,
        name: &str,
        year: i32,
        description: Option<&str>,
        category_id: i64,
        genre_ids: &[i64],
    ) -> Result<Title, sqlx::Error>;

    async fn update_title(
        &self,
        title_id: i64,
        changes: &TitleChanges,
    ) -> Result<Option<Title>, sqlx::Error>;

    async fn delete_title(&self, title_id: i64) -> Result<(), sqlx::Error>;

    /// Genres linked to any of the given titles, used to expand listings
    /// without a per-title query.
    async fn get_genres_for_titles(
        &self,
        title_ids: &[i64],
    ) -> Result<Vec<TitleGenreRow>, sqlx::Error>;

    async fn get_categories_by_ids(
        &self,
        category_ids: &[i64],
    ) -> Result<Vec<Category>, sqlx::Error>;
}

impl TitleExt for DBClient {
    async fn get_titles(
        &self,
        filter: &TitleFilter,
        page: u32,
        limit: usize,
    ) -> Result<Vec<TitleRecord>, sqlx::Error> {
        let offset = (page - 1) * limit as u32;

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(TITLE_SELECT);
        push_filters(&mut qb, filter);
        qb.push(" GROUP BY t.id ORDER BY t.name LIMIT ");
        qb.push_bind(limit as i64);
        qb.push(" OFFSET ");
        qb.push_bind(offset as i64);

        qb.build_query_as::<TitleRecord>()
            .fetch_all(&self.pool)
            .await
    }

    async fn get_title_count(&self, filter: &TitleFilter) -> Result<i64, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM titles t");
        push_filters(&mut qb, filter);

        qb.build_query_scalar::<i64>().fetch_one(&self.pool).await
    }

    async fn get_title(&self, title_id: i64) -> Result<Option<Title>, sqlx::Error> {
        sqlx::query_as::<_, Title>(
            "SELECT id, name, year, description, category_id FROM titles WHERE id = $1",
        )
        .bind(title_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn title_exists(&self, title_id: i64) -> Result<bool, sqlx::Error> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM titles WHERE id = $1)")
            .bind(title_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }

    async fn save_title(
        &self,
        name: &str,
        year: i32,
        description: Option<&str>,
        category_id: i64,
        genre_ids: &[i64],
    ) -> Result<Title, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let title = sqlx::query_as::<_, Title>(
            "INSERT INTO titles (name, year, description, category_id) \
             VALUES ($1, $2, $3, $4) RETURNING id, name, year, description, category_id",
        )
        .bind(name)
        .bind(year)
        .bind(description)
        .bind(category_id)
        .fetch_one(&mut *tx)
        .await?;

        for genre_id in genre_ids {
            sqlx::query("INSERT INTO genre_title (title_id, genre_id) VALUES ($1, $2)")
                .bind(title.id)
                .bind(*genre_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(title)
    }

    async fn update_title(
        &self,
        title_id: i64,
        changes: &TitleChanges,
    ) -> Result<Option<Title>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // COALESCE keeps the stored value wherever the change is NULL.
        let title = sqlx::query_as::<_, Title>(
            "UPDATE titles SET \
                 name = COALESCE($1, name), \
                 year = COALESCE($2, year), \
                 description = COALESCE($3, description), \
                 category_id = COALESCE($4, category_id) \
             WHERE id = $5 RETURNING id, name, year, description, category_id",
        )
        .bind(changes.name.as_deref())
        .bind(changes.year)
        .bind(changes.description.as_deref())
        .bind(changes.category_id)
        .bind(title_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(title) = title else {
            return Ok(None);
        };

        if let Some(genre_ids) = &changes.genre_ids {
            sqlx::query("DELETE FROM genre_title WHERE title_id = $1")
                .bind(title_id)
                .execute(&mut *tx)
                .await?;
            for genre_id in genre_ids {
                sqlx::query("INSERT INTO genre_title (title_id, genre_id) VALUES ($1, $2)")
                    .bind(title_id)
                    .bind(*genre_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;

        Ok(Some(title))
    }

    async fn delete_title(&self, title_id: i64) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM titles WHERE id = $1")
            .bind(title_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        Ok(())
    }

    async fn get_genres_for_titles(
        &self,
        title_ids: &[i64],
    ) -> Result<Vec<TitleGenreRow>, sqlx::Error> {
        if title_ids.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, TitleGenreRow>(
            "SELECT gt.title_id, g.id, g.name, g.slug \
             FROM genre_title gt JOIN genres g ON g.id = gt.genre_id \
             WHERE gt.title_id = ANY($1) ORDER BY gt.title_id, g.name",
        )
        .bind(title_ids)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_categories_by_ids(
        &self,
        category_ids: &[i64],
    ) -> Result<Vec<Category>, sqlx::Error> {
        if category_ids.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, Category>("SELECT id, name, slug FROM categories WHERE id = ANY($1)")
            .bind(category_ids)
            .fetch_all(&self.pool)
            .await
    }
}
