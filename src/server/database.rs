use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::{query, query_as, query_scalar, FromRow};
use std::sync::Arc;
use tracing::{error, info, warn};

#[cfg(feature = "sqlite")]
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

#[cfg(feature = "postgres")]
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::{get_config, DatabaseConfig};
use crate::errors::{LicenseError, LicenseResult};
use crate::lifecycle::{
    adjust_expiry, classify, inactive_sentinel, timestamp, DateOperation, ExpiryClass,
    LicenseTable,
};

/// Raw row as stored in `apipremium` / `apipro`.
#[derive(Debug, Clone, FromRow)]
struct LicenseRow {
    id: i64,
    serial: String,
    license: Option<String>,
    cupon: Option<String>,
    licensedate: Option<NaiveDateTime>,
    whitelist: Option<String>,
    createdate: Option<NaiveDateTime>,
}

/// Subset of a row needed to move its expiry.
#[derive(Debug, Clone, FromRow)]
struct ExpiryRow {
    id: i64,
    serial: String,
    licensedate: Option<NaiveDateTime>,
}

impl ExpiryRow {
    /// A missing expiry counts as never activated.
    fn expiry(&self) -> NaiveDateTime {
        self.licensedate.unwrap_or_else(inactive_sentinel)
    }

    fn is_temporal(&self) -> bool {
        classify(self.expiry()) == ExpiryClass::Temporal
    }
}

/// A license row annotated with the table it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LicenseRecord {
    pub id: i64,
    pub serial: String,
    pub license: String,
    pub cupon: Option<String>,
    #[serde(serialize_with = "timestamp::serialize")]
    pub licensedate: NaiveDateTime,
    pub whitelist: String,
    #[serde(serialize_with = "timestamp::option::serialize")]
    pub created_at: Option<NaiveDateTime>,
    pub source_table: LicenseTable,
}

impl LicenseRecord {
    /// Convert a stored row, applying the dashboard label for its table.
    fn from_row(row: LicenseRow, table: LicenseTable) -> Self {
        let stored = row.license.unwrap_or_default();
        Self {
            id: row.id,
            serial: row.serial,
            license: table.display_label(&stored),
            cupon: row.cupon,
            licensedate: row.licensedate.unwrap_or_else(inactive_sentinel),
            whitelist: row.whitelist.unwrap_or_default(),
            created_at: row.createdate,
            source_table: table,
        }
    }
}

/// A license to insert. The table is resolved from the kind by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLicense {
    pub serial: String,
    pub license: String,
    pub cupon: Option<String>,
    pub licensedate: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub table: LicenseTable,
}

impl NewLicense {
    fn into_record(self, id: i64) -> LicenseRecord {
        LicenseRecord {
            id,
            serial: self.serial,
            license: self.license,
            cupon: self.cupon,
            licensedate: self.licensedate,
            whitelist: "RESET".to_string(),
            created_at: Some(self.created_at),
            source_table: self.table,
        }
    }
}

/// A row removed by `delete_by_serials`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct DeletedLicense {
    pub serial: String,
    pub id: i64,
    pub license: Option<String>,
}

/// Result of a delete request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub deleted_count: u64,
    pub deleted: Vec<DeletedLicense>,
}

impl DeleteOutcome {
    /// Record a matched row once, even when its serial was requested twice.
    fn push_unique(&mut self, found: Option<DeletedLicense>) {
        if let Some(row) = found {
            if !self.deleted.iter().any(|seen| seen.id == row.id) {
                self.deleted.push(row);
            }
        }
    }
}

/// One expiry change applied by an adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Adjustment {
    pub id: i64,
    pub serial: String,
    #[serde(serialize_with = "timestamp::serialize")]
    pub old_date: NaiveDateTime,
    #[serde(serialize_with = "timestamp::serialize")]
    pub new_date: NaiveDateTime,
    pub table: LicenseTable,
}

impl Adjustment {
    fn new(row: ExpiryRow, new_date: NaiveDateTime, table: LicenseTable) -> Self {
        Self {
            old_date: row.expiry(),
            id: row.id,
            serial: row.serial,
            new_date,
            table,
        }
    }
}

/// Result of an id-list adjustment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchAdjustment {
    pub updated: Vec<Adjustment>,
    /// Ids with no temporal match in any table
    pub skipped: Vec<i64>,
}

/// Row counts per table, reported by the health check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub apipremium: i64,
    pub apipro: i64,
}

/// Log a store failure and fold it into `LicenseError::DatabaseError`.
fn store_error(backend: &'static str, op: &'static str) -> impl Fn(sqlx::Error) -> LicenseError {
    move |e| {
        error!("{backend} {op} failed: {e}");
        let unique = e
            .as_database_error()
            .is_some_and(|db| db.is_unique_violation());
        if unique {
            LicenseError::DatabaseError(format!("duplicate serial: {e}"))
        } else {
            LicenseError::DatabaseError(e.to_string())
        }
    }
}

fn not_adjustable(serial: &str) -> LicenseError {
    LicenseError::RecordNotAdjustable(format!(
        "no license with a temporal expiry found for serial '{serial}'"
    ))
}

const SELECT_COLUMNS: &str = "id, serial, license, cupon, licensedate, whitelist, createdate";

/// Unified database abstraction over SQLite and Postgres.
///
/// Available variants depend on enabled features:
/// - `sqlite` feature enables `Database::SQLite`
/// - `postgres` feature enables `Database::Postgres`
#[derive(Debug, Clone)]
pub enum Database {
    #[cfg(feature = "sqlite")]
    SQLite(SqlitePool),
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
}

impl Database {
    /// Initialize the database connection from the global configuration.
    pub async fn new() -> LicenseResult<Arc<Self>> {
        let config = get_config()?;
        Self::connect(&config.database).await
    }

    /// Open a pool for the configured backend.
    pub async fn connect(db_config: &DatabaseConfig) -> LicenseResult<Arc<Self>> {
        match db_config.db_type.as_str() {
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                let pool = SqlitePoolOptions::new()
                    .max_connections(db_config.max_connections)
                    .connect(&db_config.sqlite_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to SQLite: {e}");
                        LicenseError::DatabaseError(format!("failed to connect to SQLite: {e}"))
                    })?;

                Ok(Arc::new(Database::SQLite(pool)))
            }
            #[cfg(not(feature = "sqlite"))]
            "sqlite" => Err(LicenseError::ConfigError(
                "SQLite support not compiled in. Enable the 'sqlite' feature.".to_string(),
            )),
            #[cfg(feature = "postgres")]
            "postgres" => {
                let pool = PgPoolOptions::new()
                    .max_connections(db_config.max_connections)
                    .connect(&db_config.postgres_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to PostgreSQL: {e}");
                        LicenseError::DatabaseError(format!(
                            "failed to connect to PostgreSQL: {e}"
                        ))
                    })?;

                Ok(Arc::new(Database::Postgres(pool)))
            }
            #[cfg(not(feature = "postgres"))]
            "postgres" => Err(LicenseError::ConfigError(
                "PostgreSQL support not compiled in. Enable the 'postgres' feature.".to_string(),
            )),
            other => Err(LicenseError::ConfigError(format!(
                "unsupported database type: {other}"
            ))),
        }
    }

    /// Backend name, as used in `database.db_type`.
    pub fn db_type(&self) -> &'static str {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(_) => "sqlite",
            #[cfg(feature = "postgres")]
            Database::Postgres(_) => "postgres",
        }
    }

    /// Create both license tables if they do not exist.
    pub async fn ensure_schema(&self) -> LicenseResult<()> {
        for table in LicenseTable::ALL {
            match self {
                #[cfg(feature = "sqlite")]
                Database::SQLite(pool) => {
                    let sql = format!(
                        r#"
                        CREATE TABLE IF NOT EXISTS {table} (
                            id          INTEGER PRIMARY KEY AUTOINCREMENT,
                            serial      TEXT NOT NULL UNIQUE,
                            license     TEXT,
                            cupon       TEXT,
                            licensedate DATETIME,
                            whitelist   TEXT DEFAULT 'RESET',
                            createdate  DATETIME DEFAULT CURRENT_TIMESTAMP
                        )
                        "#
                    );
                    query(&sql)
                        .execute(pool)
                        .await
                        .map_err(store_error("SQLite", "ensure_schema"))?;
                }
                #[cfg(feature = "postgres")]
                Database::Postgres(pool) => {
                    let sql = format!(
                        r#"
                        CREATE TABLE IF NOT EXISTS {table} (
                            id          BIGSERIAL PRIMARY KEY,
                            serial      TEXT NOT NULL UNIQUE,
                            license     TEXT,
                            cupon       TEXT,
                            licensedate TIMESTAMP,
                            whitelist   TEXT DEFAULT 'RESET',
                            createdate  TIMESTAMP DEFAULT CURRENT_TIMESTAMP
                        )
                        "#
                    );
                    query(&sql)
                        .execute(pool)
                        .await
                        .map_err(store_error("Postgres", "ensure_schema"))?;
                }
            }
        }

        info!("License tables ready ({})", self.db_type());
        Ok(())
    }

    /// Number of rows in each table.
    pub async fn table_counts(&self) -> LicenseResult<TableCounts> {
        let mut counts = TableCounts::default();

        for table in LicenseTable::ALL {
            let sql = format!("SELECT COUNT(*) FROM {table}");
            let n: i64 = match self {
                #[cfg(feature = "sqlite")]
                Database::SQLite(pool) => query_scalar::<_, i64>(&sql)
                    .fetch_one(pool)
                    .await
                    .map_err(store_error("SQLite", "table_counts"))?,
                #[cfg(feature = "postgres")]
                Database::Postgres(pool) => query_scalar::<_, i64>(&sql)
                    .fetch_one(pool)
                    .await
                    .map_err(store_error("Postgres", "table_counts"))?,
            };

            match table {
                LicenseTable::ApiPremium => counts.apipremium = n,
                LicenseTable::ApiPro => counts.apipro = n,
            }
        }

        Ok(counts)
    }

    /// Insert a batch of licenses in one transaction.
    ///
    /// A duplicate serial (or any other failure) rolls back the whole batch.
    pub async fn insert_licenses(&self, batch: Vec<NewLicense>) -> LicenseResult<Vec<LicenseRecord>> {
        let mut records = Vec::with_capacity(batch.len());

        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let mut tx = pool
                    .begin()
                    .await
                    .map_err(store_error("SQLite", "insert_licenses"))?;

                for item in batch {
                    let sql = format!(
                        "INSERT INTO {} (serial, license, cupon, licensedate, whitelist, createdate) \
                         VALUES (?, ?, ?, ?, 'RESET', ?) RETURNING id",
                        item.table
                    );
                    let id: i64 = query_scalar::<_, i64>(&sql)
                        .bind(&item.serial)
                        .bind(&item.license)
                        .bind(&item.cupon)
                        .bind(item.licensedate)
                        .bind(item.created_at)
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(store_error("SQLite", "insert_licenses"))?;
                    records.push(item.into_record(id));
                }

                tx.commit()
                    .await
                    .map_err(store_error("SQLite", "insert_licenses"))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let mut tx = pool
                    .begin()
                    .await
                    .map_err(store_error("Postgres", "insert_licenses"))?;

                for item in batch {
                    let sql = format!(
                        "INSERT INTO {} (serial, license, cupon, licensedate, whitelist, createdate) \
                         VALUES ($1, $2, $3, $4, 'RESET', $5) RETURNING id",
                        item.table
                    );
                    let id: i64 = query_scalar::<_, i64>(&sql)
                        .bind(&item.serial)
                        .bind(&item.license)
                        .bind(&item.cupon)
                        .bind(item.licensedate)
                        .bind(item.created_at)
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(store_error("Postgres", "insert_licenses"))?;
                    records.push(item.into_record(id));
                }

                tx.commit()
                    .await
                    .map_err(store_error("Postgres", "insert_licenses"))?;
            }
        }

        Ok(records)
    }

    /// Read one page of a table, newest first.
    async fn select_page(
        &self,
        table: LicenseTable,
        only_labelled: bool,
        limit: i64,
        offset: i64,
    ) -> LicenseResult<Vec<LicenseRow>> {
        let filter = if only_labelled {
            "WHERE license IS NOT NULL AND license <> ''"
        } else {
            ""
        };

        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let sql = format!(
                    "SELECT {SELECT_COLUMNS} FROM {table} {filter} \
                     ORDER BY createdate DESC, id DESC LIMIT ? OFFSET ?"
                );
                query_as::<_, LicenseRow>(&sql)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(pool)
                    .await
                    .map_err(store_error("SQLite", "select_page"))
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let sql = format!(
                    "SELECT {SELECT_COLUMNS} FROM {table} {filter} \
                     ORDER BY createdate DESC, id DESC LIMIT $1 OFFSET $2"
                );
                query_as::<_, LicenseRow>(&sql)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(pool)
                    .await
                    .map_err(store_error("Postgres", "select_page"))
            }
        }
    }

    /// The `limit` most recent rows of each table, merged newest first.
    pub async fn list_bounded(&self, limit: u32) -> LicenseResult<Vec<LicenseRecord>> {
        let mut records = Vec::new();

        for table in LicenseTable::ALL {
            let rows = self.select_page(table, false, i64::from(limit), 0).await?;
            records.extend(rows.into_iter().map(|row| LicenseRecord::from_row(row, table)));
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// Every labelled row of the managed table, read `page_size` rows at a time.
    ///
    /// Stops on a short page or after `max_pages` pages.
    pub async fn list_unbounded(
        &self,
        page_size: u32,
        max_pages: u32,
    ) -> LicenseResult<Vec<LicenseRecord>> {
        let table = LicenseTable::MANAGED;
        let page_size = i64::from(page_size);

        let expected: i64 = {
            let sql =
                format!("SELECT COUNT(*) FROM {table} WHERE license IS NOT NULL AND license <> ''");
            match self {
                #[cfg(feature = "sqlite")]
                Database::SQLite(pool) => query_scalar::<_, i64>(&sql)
                    .fetch_one(pool)
                    .await
                    .map_err(store_error("SQLite", "list_unbounded"))?,
                #[cfg(feature = "postgres")]
                Database::Postgres(pool) => query_scalar::<_, i64>(&sql)
                    .fetch_one(pool)
                    .await
                    .map_err(store_error("Postgres", "list_unbounded"))?,
            }
        };

        let mut records = Vec::new();
        for page in 0..i64::from(max_pages) {
            let rows = self
                .select_page(table, true, page_size, page * page_size)
                .await?;
            let fetched = rows.len() as i64;
            records.extend(rows.into_iter().map(|row| LicenseRecord::from_row(row, table)));

            if fetched < page_size {
                break;
            }
        }

        if records.len() as i64 != expected {
            warn!(
                "Unbounded listing of {} returned {} rows, expected {}",
                table,
                records.len(),
                expected
            );
        }

        Ok(records)
    }

    /// Delete rows of the managed table by serial, all or nothing.
    ///
    /// When no serial matches, nothing is deleted and an empty outcome is returned.
    pub async fn delete_by_serials(&self, serials: &[String]) -> LicenseResult<DeleteOutcome> {
        let table = LicenseTable::MANAGED;
        let mut outcome = DeleteOutcome::default();

        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let mut tx = pool
                    .begin()
                    .await
                    .map_err(store_error("SQLite", "delete_by_serials"))?;

                let select = format!("SELECT serial, id, license FROM {table} WHERE serial = ?");
                for serial in serials {
                    let found = query_as::<_, DeletedLicense>(&select)
                        .bind(serial)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(store_error("SQLite", "delete_by_serials"))?;
                    outcome.push_unique(found);
                }

                if outcome.deleted.is_empty() {
                    tx.rollback()
                        .await
                        .map_err(store_error("SQLite", "delete_by_serials"))?;
                    return Ok(outcome);
                }

                let delete = format!("DELETE FROM {table} WHERE id = ?");
                for row in &outcome.deleted {
                    outcome.deleted_count += query(&delete)
                        .bind(row.id)
                        .execute(&mut *tx)
                        .await
                        .map_err(store_error("SQLite", "delete_by_serials"))?
                        .rows_affected();
                }

                tx.commit()
                    .await
                    .map_err(store_error("SQLite", "delete_by_serials"))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let mut tx = pool
                    .begin()
                    .await
                    .map_err(store_error("Postgres", "delete_by_serials"))?;

                let select = format!("SELECT serial, id, license FROM {table} WHERE serial = $1");
                for serial in serials {
                    let found = query_as::<_, DeletedLicense>(&select)
                        .bind(serial)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(store_error("Postgres", "delete_by_serials"))?;
                    outcome.push_unique(found);
                }

                if outcome.deleted.is_empty() {
                    tx.rollback()
                        .await
                        .map_err(store_error("Postgres", "delete_by_serials"))?;
                    return Ok(outcome);
                }

                let delete = format!("DELETE FROM {table} WHERE id = $1");
                for row in &outcome.deleted {
                    outcome.deleted_count += query(&delete)
                        .bind(row.id)
                        .execute(&mut *tx)
                        .await
                        .map_err(store_error("Postgres", "delete_by_serials"))?
                        .rows_affected();
                }

                tx.commit()
                    .await
                    .map_err(store_error("Postgres", "delete_by_serials"))?;
            }
        }

        Ok(outcome)
    }

    /// Move the expiry of the first temporal license with this serial.
    ///
    /// Tables are searched in `LicenseTable::ADJUSTMENT_ORDER`. Fails with
    /// `RecordNotAdjustable` when no table holds a temporal match.
    pub async fn adjust_by_serial(
        &self,
        serial: &str,
        op: DateOperation,
        days: u32,
    ) -> LicenseResult<Adjustment> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let mut tx = pool
                    .begin()
                    .await
                    .map_err(store_error("SQLite", "adjust_by_serial"))?;

                for table in LicenseTable::ADJUSTMENT_ORDER {
                    let select =
                        format!("SELECT id, serial, licensedate FROM {table} WHERE serial = ?");
                    let found = query_as::<_, ExpiryRow>(&select)
                        .bind(serial)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(store_error("SQLite", "adjust_by_serial"))?;

                    let Some(row) = found.filter(ExpiryRow::is_temporal) else {
                        continue;
                    };
                    let new_date = adjust_expiry(row.expiry(), op, days)?;

                    let update = format!("UPDATE {table} SET licensedate = ? WHERE id = ?");
                    query(&update)
                        .bind(new_date)
                        .bind(row.id)
                        .execute(&mut *tx)
                        .await
                        .map_err(store_error("SQLite", "adjust_by_serial"))?;

                    tx.commit()
                        .await
                        .map_err(store_error("SQLite", "adjust_by_serial"))?;
                    return Ok(Adjustment::new(row, new_date, table));
                }

                Err(not_adjustable(serial))
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let mut tx = pool
                    .begin()
                    .await
                    .map_err(store_error("Postgres", "adjust_by_serial"))?;

                for table in LicenseTable::ADJUSTMENT_ORDER {
                    let select =
                        format!("SELECT id, serial, licensedate FROM {table} WHERE serial = $1");
                    let found = query_as::<_, ExpiryRow>(&select)
                        .bind(serial)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(store_error("Postgres", "adjust_by_serial"))?;

                    let Some(row) = found.filter(ExpiryRow::is_temporal) else {
                        continue;
                    };
                    let new_date = adjust_expiry(row.expiry(), op, days)?;

                    let update = format!("UPDATE {table} SET licensedate = $1 WHERE id = $2");
                    query(&update)
                        .bind(new_date)
                        .bind(row.id)
                        .execute(&mut *tx)
                        .await
                        .map_err(store_error("Postgres", "adjust_by_serial"))?;

                    tx.commit()
                        .await
                        .map_err(store_error("Postgres", "adjust_by_serial"))?;
                    return Ok(Adjustment::new(row, new_date, table));
                }

                Err(not_adjustable(serial))
            }
        }
    }

    /// Move the expiry of every id that has a temporal match, in one transaction.
    ///
    /// Each id is resolved against the tables in priority order. Ids with no
    /// temporal match, or whose move would leave the valid range, are skipped.
    pub async fn adjust_by_ids(
        &self,
        ids: &[i64],
        op: DateOperation,
        days: u32,
    ) -> LicenseResult<BatchAdjustment> {
        let mut outcome = BatchAdjustment::default();

        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let mut tx = pool
                    .begin()
                    .await
                    .map_err(store_error("SQLite", "adjust_by_ids"))?;

                'ids: for &id in ids {
                    for table in LicenseTable::ADJUSTMENT_ORDER {
                        let select =
                            format!("SELECT id, serial, licensedate FROM {table} WHERE id = ?");
                        let found = query_as::<_, ExpiryRow>(&select)
                            .bind(id)
                            .fetch_optional(&mut *tx)
                            .await
                            .map_err(store_error("SQLite", "adjust_by_ids"))?;

                        let Some(row) = found.filter(ExpiryRow::is_temporal) else {
                            continue;
                        };
                        let new_date = match adjust_expiry(row.expiry(), op, days) {
                            Ok(date) => date,
                            Err(e) => {
                                warn!("Skipping id {} in {}: {}", id, table, e);
                                break;
                            }
                        };

                        let update = format!("UPDATE {table} SET licensedate = ? WHERE id = ?");
                        query(&update)
                            .bind(new_date)
                            .bind(row.id)
                            .execute(&mut *tx)
                            .await
                            .map_err(store_error("SQLite", "adjust_by_ids"))?;

                        outcome.updated.push(Adjustment::new(row, new_date, table));
                        continue 'ids;
                    }
                    outcome.skipped.push(id);
                }

                tx.commit()
                    .await
                    .map_err(store_error("SQLite", "adjust_by_ids"))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let mut tx = pool
                    .begin()
                    .await
                    .map_err(store_error("Postgres", "adjust_by_ids"))?;

                'ids: for &id in ids {
                    for table in LicenseTable::ADJUSTMENT_ORDER {
                        let select =
                            format!("SELECT id, serial, licensedate FROM {table} WHERE id = $1");
                        let found = query_as::<_, ExpiryRow>(&select)
                            .bind(id)
                            .fetch_optional(&mut *tx)
                            .await
                            .map_err(store_error("Postgres", "adjust_by_ids"))?;

                        let Some(row) = found.filter(ExpiryRow::is_temporal) else {
                            continue;
                        };
                        let new_date = match adjust_expiry(row.expiry(), op, days) {
                            Ok(date) => date,
                            Err(e) => {
                                warn!("Skipping id {} in {}: {}", id, table, e);
                                break;
                            }
                        };

                        let update = format!("UPDATE {table} SET licensedate = $1 WHERE id = $2");
                        query(&update)
                            .bind(new_date)
                            .bind(row.id)
                            .execute(&mut *tx)
                            .await
                            .map_err(store_error("Postgres", "adjust_by_ids"))?;

                        outcome.updated.push(Adjustment::new(row, new_date, table));
                        continue 'ids;
                    }
                    outcome.skipped.push(id);
                }

                tx.commit()
                    .await
                    .map_err(store_error("Postgres", "adjust_by_ids"))?;
            }
        }

        Ok(outcome)
    }
}
