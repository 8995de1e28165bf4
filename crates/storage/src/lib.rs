use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::{
    domain::{Night, NightId},
    error::StoreError,
    store::{NightStore, StoreResult},
};

/// SQLite-backed night store. Cheap to clone; all clones share one pool.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::backend(err)
}

fn night_from_row(row: &SqliteRow) -> Night {
    Night {
        id: NightId(row.get::<i64, _>(0)),
        start_time: row.get::<DateTime<Utc>, _>(1),
        end_time: row.get::<DateTime<Utc>, _>(2),
        quality: row.get::<Option<i32>, _>(3),
    }
}

#[async_trait]
impl NightStore for Storage {
    async fn insert(&self, start_time: DateTime<Utc>) -> StoreResult<Night> {
        let row =
            sqlx::query("INSERT INTO nights (start_time, end_time) VALUES (?, ?) RETURNING id")
                .bind(start_time)
                .bind(start_time)
                .fetch_one(&self.pool)
                .await
                .map_err(backend)?;

        Ok(Night {
            id: NightId(row.get::<i64, _>(0)),
            start_time,
            end_time: start_time,
            quality: None,
        })
    }

    async fn update(&self, night: &Night) -> StoreResult<()> {
        let updated =
            sqlx::query("UPDATE nights SET start_time = ?, end_time = ?, quality = ? WHERE id = ?")
                .bind(night.start_time)
                .bind(night.end_time)
                .bind(night.quality)
                .bind(night.id.0)
                .execute(&self.pool)
                .await
                .map_err(backend)?
                .rows_affected();

        if updated == 0 {
            return Err(StoreError::NotFound(night.id));
        }
        Ok(())
    }

    async fn get(&self, id: NightId) -> StoreResult<Option<Night>> {
        let row = sqlx::query("SELECT id, start_time, end_time, quality FROM nights WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        Ok(row.as_ref().map(night_from_row))
    }

    async fn most_recent(&self) -> StoreResult<Option<Night>> {
        let row = sqlx::query(
            "SELECT id, start_time, end_time, quality FROM nights ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row.as_ref().map(night_from_row))
    }

    async fn all_nights(&self) -> StoreResult<Vec<Night>> {
        let rows =
            sqlx::query("SELECT id, start_time, end_time, quality FROM nights ORDER BY id DESC")
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;
        Ok(rows.iter().map(night_from_row).collect())
    }

    async fn clear_all(&self) -> StoreResult<()> {
        sqlx::query("DELETE FROM nights")
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
