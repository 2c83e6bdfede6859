use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, instrument};

use crate::contracts::{Sample, SampleStore, ScanFilter};
use crate::error::{PingStatError, Result};

/// Row shape of the `pongs` table
#[derive(Debug, Clone, sqlx::FromRow)]
struct PongRow {
    room_id: String,
    ping_id: String,
    pong_server: String,
    ping_server: String,
    receive_diff: i64,
    pong_timestamp: i64,
}

impl From<PongRow> for Sample {
    fn from(row: PongRow) -> Self {
        Sample {
            room_id: row.room_id,
            ping_id: row.ping_id,
            pong_server: row.pong_server,
            ping_server: row.ping_server,
            receive_diff: row.receive_diff,
            pong_timestamp: row.pong_timestamp,
        }
    }
}

/// Sample store backed by a PostgreSQL `pongs` table
#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a bounded pool and make sure the schema exists
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;
        let storage = Self::new(pool);
        storage.ensure_schema().await?;
        info!(max_connections, "Connected to PostgreSQL sample store");
        Ok(storage)
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    #[instrument(skip(self))]
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pongs (
                room_id TEXT NOT NULL,
                ping_id TEXT NOT NULL,
                pong_server TEXT NOT NULL,
                ping_server TEXT NOT NULL,
                receive_diff BIGINT NOT NULL,
                pong_timestamp BIGINT NOT NULL,
                PRIMARY KEY (room_id, ping_id, pong_server)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS pongs_room_timestamp_idx
                ON pongs (room_id, pong_timestamp)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SampleStore for PostgresStorage {
    #[instrument(skip(self, sample), fields(room_id = %sample.room_id, ping_id = %sample.ping_id))]
    async fn insert(&self, sample: Sample) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO pongs (
                room_id,
                ping_id,
                pong_server,
                ping_server,
                receive_diff,
                pong_timestamp
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (room_id, ping_id, pong_server) DO NOTHING
            "#,
        )
        .bind(&sample.room_id)
        .bind(&sample.ping_id)
        .bind(&sample.pong_server)
        .bind(&sample.ping_server)
        .bind(sample.receive_diff)
        .bind(sample.pong_timestamp)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PingStatError::DuplicateKey {
                room_id: sample.room_id,
                ping_id: sample.ping_id,
                pong_server: sample.pong_server,
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn scan(&self, room_id: &str, filter: &ScanFilter) -> Result<Vec<Sample>> {
        let rows = sqlx::query_as::<_, PongRow>(
            r#"
            SELECT
                room_id,
                ping_id,
                pong_server,
                ping_server,
                receive_diff,
                pong_timestamp
            FROM pongs
            WHERE room_id = $1
              AND pong_timestamp BETWEEN $2 AND $3
              AND receive_diff BETWEEN $4 AND $5
            "#,
        )
        .bind(room_id)
        .bind(filter.min_timestamp)
        .bind(filter.max_timestamp)
        .bind(filter.min_diff)
        .bind(filter.max_diff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Sample::from).collect())
    }

    #[instrument(skip(self))]
    async fn rewrite_room(&self, old_room_id: &str, new_room_id: &str) -> Result<u64> {
        if old_room_id == new_room_id {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        // Blocks concurrent writers (not readers) until commit
        sqlx::query("LOCK TABLE pongs IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        let conflicts = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM pongs old
            JOIN pongs new
              ON new.room_id = $2
             AND new.ping_id = old.ping_id
             AND new.pong_server = old.pong_server
            WHERE old.room_id = $1
            "#,
        )
        .bind(old_room_id)
        .bind(new_room_id)
        .fetch_one(&mut *tx)
        .await?;

        if conflicts > 0 {
            tx.rollback().await?;
            return Err(PingStatError::KeyCollision {
                old_room_id: old_room_id.to_string(),
                new_room_id: new_room_id.to_string(),
                conflicts: conflicts as u64,
            });
        }

        let result = sqlx::query("UPDATE pongs SET room_id = $2 WHERE room_id = $1")
            .bind(old_room_id)
            .bind(new_room_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn count(&self, room_id: &str) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM pongs WHERE room_id = $1")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}
