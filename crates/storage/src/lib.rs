use anyhow::{bail, ensure, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use delivery::{DeliveryStore, DeliveryTx};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite, Transaction,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

use shared::domain::{FacilityId, RouteId, RouteStatus, StorageFacility, TransportRoute};

#[derive(Clone, Debug)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

/// Route as handed over by the scheduling side before the delivery core takes charge.
#[derive(Debug, Clone)]
pub struct NewRoute {
    pub status: RouteStatus,
    pub current_load_kg: f64,
    pub destination_storage_id: Option<FacilityId>,
    pub pending_delivery_kg: f64,
}

impl NewRoute {
    pub fn scheduled(load_kg: f64, destination: Option<FacilityId>) -> Self {
        Self {
            status: RouteStatus::Scheduled,
            current_load_kg: load_kg,
            destination_storage_id: destination,
            pending_delivery_kg: if destination.is_some() { load_kg } else { 0.0 },
        }
    }

    pub fn with_status(mut self, status: RouteStatus) -> Self {
        self.status = status;
        self
    }
}

/// One SQLite transaction. Dropping it without committing rolls it back.
pub struct StorageTx {
    tx: Transaction<'static, Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
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

    pub async fn create_facility(&self, name: &str, level_kg: f64) -> Result<FacilityId> {
        ensure!(
            level_kg.is_finite() && level_kg >= 0.0,
            "facility level must be a non-negative number of kg, got {level_kg}"
        );
        let now = Utc::now();
        let rec = sqlx::query(
            "INSERT INTO storage_facilities (name, current_level_kg, created_at, updated_at)
             VALUES (?, ?, ?, ?)
             RETURNING id",
        )
        .bind(name)
        .bind(level_kg)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(FacilityId(rec.get::<i64, _>(0)))
    }

    pub async fn create_route(&self, route: &NewRoute) -> Result<RouteId> {
        ensure!(
            route.current_load_kg.is_finite() && route.current_load_kg >= 0.0,
            "route load must be a non-negative number of kg, got {}",
            route.current_load_kg
        );
        ensure!(
            route.pending_delivery_kg.is_finite() && route.pending_delivery_kg >= 0.0,
            "pending delivery must be a non-negative number of kg, got {}",
            route.pending_delivery_kg
        );
        let now = Utc::now();
        let rec = sqlx::query(
            "INSERT INTO transport_routes (status, current_load_kg, destination_storage_id, pending_delivery_kg, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(route.status.as_str())
        .bind(route.current_load_kg)
        .bind(route.destination_storage_id.map(|id| id.0))
        .bind(route.pending_delivery_kg)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert transport route")?;
        Ok(RouteId(rec.get::<i64, _>(0)))
    }

    pub async fn load_route(&self, route_id: RouteId) -> Result<Option<TransportRoute>> {
        let row = sqlx::query(
            "SELECT id, status, current_load_kg, destination_storage_id, pending_delivery_kg, updated_at
             FROM transport_routes
             WHERE id = ?",
        )
        .bind(route_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(route_from_row).transpose()
    }

    pub async fn load_facility(&self, facility_id: FacilityId) -> Result<Option<StorageFacility>> {
        let row = sqlx::query(
            "SELECT id, name, current_level_kg, updated_at FROM storage_facilities WHERE id = ?",
        )
        .bind(facility_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| StorageFacility {
            id: FacilityId(r.get::<i64, _>(0)),
            name: r.get::<String, _>(1),
            current_level_kg: r.get::<f64, _>(2),
            updated_at: r.get::<DateTime<Utc>, _>(3),
        }))
    }
}

#[async_trait]
impl DeliveryStore for Storage {
    type Tx = StorageTx;

    async fn begin(&self) -> Result<StorageTx> {
        let tx = self
            .pool
            .begin()
            .await
            .context("failed to begin delivery transaction")?;
        Ok(StorageTx { tx })
    }
}

#[async_trait]
impl DeliveryTx for StorageTx {
    async fn lock_route(&mut self, route_id: RouteId) -> Result<Option<TransportRoute>> {
        // The no-op write takes SQLite's write lock up front, so competing delivery
        // transactions queue behind this one instead of reading a stale snapshot.
        let row = sqlx::query(
            "UPDATE transport_routes
             SET status = status
             WHERE id = ?
             RETURNING id, status, current_load_kg, destination_storage_id, pending_delivery_kg, updated_at",
        )
        .bind(route_id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .with_context(|| format!("failed to lock route {route_id}"))?;
        row.as_ref().map(route_from_row).transpose()
    }

    async fn set_route_status(
        &mut self,
        route_id: RouteId,
        status: RouteStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let result =
            sqlx::query("UPDATE transport_routes SET status = ?, updated_at = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(at)
                .bind(route_id.0)
                .execute(&mut *self.tx)
                .await
                .with_context(|| format!("failed to set route {route_id} to {status}"))?;
        if result.rows_affected() != 1 {
            bail!("route {route_id} disappeared while setting status {status}");
        }
        Ok(())
    }

    async fn finalize_route(&mut self, route_id: RouteId, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE transport_routes
             SET status = ?,
                 current_load_kg = 0,
                 destination_storage_id = NULL,
                 pending_delivery_kg = 0,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(RouteStatus::Delivered.as_str())
        .bind(at)
        .bind(route_id.0)
        .execute(&mut *self.tx)
        .await
        .with_context(|| format!("failed to finalize route {route_id}"))?;
        if result.rows_affected() != 1 {
            bail!("route {route_id} disappeared while finalizing delivery");
        }
        Ok(())
    }

    async fn add_facility_level(
        &mut self,
        facility_id: FacilityId,
        delta_kg: f64,
        at: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        let row = sqlx::query(
            "UPDATE storage_facilities
             SET current_level_kg = current_level_kg + ?, updated_at = ?
             WHERE id = ?
             RETURNING current_level_kg",
        )
        .bind(delta_kg)
        .bind(at)
        .bind(facility_id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .with_context(|| format!("failed to update level of facility {facility_id}"))?;
        let level_kg = row.map(|r| r.get::<f64, _>(0));
        debug!(%facility_id, delta_kg, ?level_kg, "applied facility delta");
        Ok(level_kg)
    }

    async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .context("failed to commit delivery transaction")
    }

    async fn rollback(self) -> Result<()> {
        self.tx
            .rollback()
            .await
            .context("failed to roll back delivery transaction")
    }
}

fn route_from_row(row: &SqliteRow) -> Result<TransportRoute> {
    let status = row
        .try_get::<String, _>("status")?
        .parse::<RouteStatus>()?;
    Ok(TransportRoute {
        id: RouteId(row.try_get::<i64, _>("id")?),
        status,
        current_load_kg: row.try_get::<f64, _>("current_load_kg")?,
        destination_storage_id: row
            .try_get::<Option<i64>, _>("destination_storage_id")?
            .map(FacilityId),
        pending_delivery_kg: row.try_get::<f64, _>("pending_delivery_kg")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
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
