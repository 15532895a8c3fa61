//! Postgres catalog.
//!
//! The catalog owns every piece of persistent pipeline state. All access goes
//! through the named methods on [`Catalog`], one per SQL statement, grouped
//! by entity in the submodules.

mod cameras;
mod dives;
mod images;
mod jobs;
mod labels;
mod summary;

pub use dives::CandidateDive;
pub use images::ImageLocation;
pub use jobs::PoolRow;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::Result;

/// Statements executed by [`Catalog::initialize_schema`]. All are idempotent.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS cameras (
        idx SERIAL PRIMARY KEY,
        serial_number TEXT UNIQUE NOT NULL,
        lens_cal_path TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS dives (
        path TEXT PRIMARY KEY,
        checksum TEXT,
        date DATE,
        invalid_image BOOLEAN NOT NULL DEFAULT FALSE,
        multiple_date BOOLEAN NOT NULL DEFAULT FALSE,
        priority TEXT NOT NULL DEFAULT 'low'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS canonical_dives (
        checksum TEXT PRIMARY KEY,
        path TEXT NOT NULL,
        date DATE,
        camera_idx INTEGER REFERENCES cameras(idx)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        job_id UUID PRIMARY KEY,
        worker TEXT NOT NULL,
        origin TEXT NOT NULL,
        job_type TEXT NOT NULL,
        expiration TIMESTAMPTZ NOT NULL,
        job_status SMALLINT NOT NULL DEFAULT 0,
        progress SMALLINT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS images (
        checksum TEXT PRIMARY KEY,
        path TEXT NOT NULL,
        dive TEXT NOT NULL REFERENCES dives(path),
        data_path TEXT NOT NULL,
        camera_sn TEXT,
        date TIMESTAMPTZ,
        preprocess_jpeg_path TEXT,
        laser_jpeg_path TEXT,
        preprocess_job UUID REFERENCES jobs(job_id),
        headtail_job UUID REFERENCES jobs(job_id),
        UNIQUE (dive, path)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS laser_labels (
        checksum TEXT PRIMARY KEY REFERENCES images(checksum),
        task_id BIGINT NOT NULL,
        x INTEGER,
        y INTEGER,
        complete BOOLEAN NOT NULL DEFAULT FALSE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS headtail_labels (
        checksum TEXT PRIMARY KEY REFERENCES images(checksum),
        task_id BIGINT NOT NULL,
        head_x INTEGER,
        head_y INTEGER,
        tail_x INTEGER,
        tail_y INTEGER,
        complete BOOLEAN NOT NULL DEFAULT FALSE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_images_dive ON images (dive)",
    "CREATE INDEX IF NOT EXISTS idx_images_camera_sn_null ON images (checksum) WHERE camera_sn IS NULL",
    "CREATE INDEX IF NOT EXISTS idx_images_date_null ON images (checksum) WHERE date IS NULL",
    "CREATE INDEX IF NOT EXISTS idx_jobs_open ON jobs (expiration) WHERE job_status IN (0, 1)",
];

#[derive(Clone, Debug)]
pub struct Catalog {
    pool: PgPool,
}

impl Catalog {
    /// Connect eagerly; used at service startup so a bad database
    /// configuration fails before the listener binds.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests and tools).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Bring the schema up. Every statement is `IF NOT EXISTS`; reruns are
    /// no-ops.
    pub async fn initialize_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}
