use async_trait::async_trait;
use chrono::Utc;
use libsql::{Row, params};
use std::collections::BTreeSet;
use thiserror::Error;

use super::models::{
    HostDetails, HostRecord, HostType, NewHost, millis_to_timestamp, non_blank, timestamp_to_millis,
};
use crate::monitoring::store::HostStore;
use crate::monitoring::types::{HostId, HostTarget, ProbeOutcome};
use crate::pool::{LibsqlManager, LibsqlPool};
use crate::validation::{SegmentFilter, normalize_address, parse_address, segment_of};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("'{0}' is not a valid IP address")]
    InvalidAddress(String),

    #[error("invalid host type '{0}'")]
    InvalidHostType(String),

    #[error("address {0} is already registered")]
    Duplicate(String),

    #[error("host not found")]
    NotFound,

    #[error("database query failed: {0}")]
    QueryFailure(#[from] libsql::Error),

    #[error("database connection unavailable: {0}")]
    Pool(String),

    #[error("stored row is corrupt: {0}")]
    Corrupt(String),
}

/// CRUD operations of the host registry
#[async_trait]
pub trait HostRepository: Send + Sync {
    /// Register a new address, alias optional
    async fn register_host(&self, host: NewHost) -> Result<HostRecord, StoreError>;

    /// Replace the editable details of the host with this address
    async fn update_details(&self, address: &str, details: HostDetails) -> Result<HostRecord, StoreError>;

    /// Point an existing host at another address
    async fn change_address(&self, id: HostId, address: &str) -> Result<HostRecord, StoreError>;

    /// Remove a host, false if it did not exist
    async fn delete_host(&self, id: HostId) -> Result<bool, StoreError>;

    async fn get_host(&self, address: &str) -> Result<Option<HostRecord>, StoreError>;

    async fn get_host_by_id(&self, id: HostId) -> Result<Option<HostRecord>, StoreError>;

    /// All hosts, newest first, optionally restricted to one segment
    async fn list_records(&self, filter: Option<SegmentFilter>) -> Result<Vec<HostRecord>, StoreError>;

    /// Sorted distinct segments of the stored addresses
    async fn segments(&self) -> Result<Vec<String>, StoreError>;
}

const RECORD_COLUMNS: &str = "id, address, alias, host_name, host_type, location, notes, created_at, \
                              reachable, resolved_hostname, latency_ms, probe_output, checked_at";

/// LibSQL backed host store
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>, StoreError> {
        self.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))
    }

    async fn id_for_address(&self, address: &str) -> Result<Option<HostId>, StoreError> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query("SELECT id FROM hosts WHERE address = ?", params![address]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    async fn query_records(&self, sql: &str, args: impl libsql::params::IntoParams) -> Result<Vec<HostRecord>, StoreError> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(sql, args).await?;
        let mut records = Vec::new();

        while let Some(row) = rows.next().await? {
            records.push(row_to_record(&row)?);
        }

        Ok(records)
    }
}

fn is_unique_violation(error: &libsql::Error) -> bool {
    error.to_string().contains("UNIQUE constraint failed")
}

fn row_to_record(row: &Row) -> Result<HostRecord, StoreError> {
    let address: String = row.get(1)?;
    let ip = parse_address(&address).ok_or_else(|| StoreError::Corrupt(format!("address '{address}'")))?;
    let host_type: Option<String> = row.get(4)?;
    let created_at: i64 = row.get(7)?;
    let checked_at: Option<i64> = row.get(12)?;

    let last_probe = match checked_at {
        Some(checked_at) => Some(ProbeOutcome {
            reachable: row.get::<Option<i64>>(8)?.unwrap_or(0) != 0,
            resolved_hostname: row.get(9)?,
            checked_at: millis_to_timestamp(checked_at),
            latency_ms: row.get::<Option<i64>>(10)?.map(|v| v as u64),
            output: row.get(11)?,
        }),
        None => None,
    };

    Ok(HostRecord {
        id: row.get(0)?,
        segment: segment_of(&ip),
        address,
        alias: row.get(2)?,
        host_name: row.get(3)?,
        host_type: host_type.and_then(|t| t.parse::<HostType>().ok()),
        location: row.get(5)?,
        notes: row.get(6)?,
        created_at: millis_to_timestamp(created_at),
        last_probe,
    })
}

#[async_trait]
impl HostRepository for DatabaseImpl {
    async fn register_host(&self, host: NewHost) -> Result<HostRecord, StoreError> {
        let address =
            normalize_address(&host.address).ok_or_else(|| StoreError::InvalidAddress(host.address.trim().to_string()))?;

        if self.id_for_address(&address).await?.is_some() {
            return Err(StoreError::Duplicate(address));
        }

        let alias = host.alias.as_deref().and_then(non_blank);
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO hosts (address, alias, created_at) VALUES (?, ?, ?)",
            params![address.clone(), alias, timestamp_to_millis(Utc::now())],
        )
        .await
        .map_err(|e| if is_unique_violation(&e) { StoreError::Duplicate(address.clone()) } else { e.into() })?;

        let id = conn.last_insert_rowid();
        drop(conn);
        tracing::info!(host_id = id, address = %address, "Registered host");
        self.get_host_by_id(id).await?.ok_or(StoreError::NotFound)
    }

    async fn update_details(&self, address: &str, details: HostDetails) -> Result<HostRecord, StoreError> {
        let address = normalize_address(address).ok_or_else(|| StoreError::InvalidAddress(address.to_string()))?;

        let host_type = match non_blank(&details.host_type) {
            Some(raw) => Some(raw.parse::<HostType>().map_err(StoreError::InvalidHostType)?),
            None => None,
        };

        let conn = self.get_conn().await?;
        let updated = conn
            .execute(
                "UPDATE hosts SET alias = ?, host_name = ?, host_type = ?, location = ?, notes = ? WHERE address = ?",
                params![
                    non_blank(&details.alias),
                    non_blank(&details.host_name),
                    host_type.map(|t| t.as_str().to_string()),
                    non_blank(&details.location),
                    non_blank(&details.notes),
                    address.clone()
                ],
            )
            .await?;
        drop(conn);

        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_host(&address).await?.ok_or(StoreError::NotFound)
    }

    async fn change_address(&self, id: HostId, address: &str) -> Result<HostRecord, StoreError> {
        let address = normalize_address(address).ok_or_else(|| StoreError::InvalidAddress(address.trim().to_string()))?;

        match self.id_for_address(&address).await? {
            Some(existing) if existing != id => return Err(StoreError::Duplicate(address)),
            _ => {}
        }

        let conn = self.get_conn().await?;
        let updated = conn
            .execute("UPDATE hosts SET address = ? WHERE id = ?", params![address.clone(), id])
            .await
            .map_err(|e| if is_unique_violation(&e) { StoreError::Duplicate(address.clone()) } else { e.into() })?;
        drop(conn);

        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        tracing::info!(host_id = id, address = %address, "Changed host address");
        self.get_host_by_id(id).await?.ok_or(StoreError::NotFound)
    }

    async fn delete_host(&self, id: HostId) -> Result<bool, StoreError> {
        let conn = self.get_conn().await?;
        let deleted = conn.execute("DELETE FROM hosts WHERE id = ?", params![id]).await?;
        Ok(deleted > 0)
    }

    async fn get_host(&self, address: &str) -> Result<Option<HostRecord>, StoreError> {
        let Some(address) = normalize_address(address) else {
            return Ok(None);
        };
        let sql = format!("SELECT {RECORD_COLUMNS} FROM hosts WHERE address = ?");
        Ok(self.query_records(&sql, params![address]).await?.into_iter().next())
    }

    async fn get_host_by_id(&self, id: HostId) -> Result<Option<HostRecord>, StoreError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM hosts WHERE id = ?");
        Ok(self.query_records(&sql, params![id]).await?.into_iter().next())
    }

    async fn list_records(&self, filter: Option<SegmentFilter>) -> Result<Vec<HostRecord>, StoreError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM hosts ORDER BY created_at DESC, id DESC");
        let records = self.query_records(&sql, ()).await?;

        Ok(match filter {
            Some(filter) => records
                .into_iter()
                .filter(|record| parse_address(&record.address).is_some_and(|ip| filter.matches(&ip)))
                .collect(),
            None => records,
        })
    }

    async fn segments(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query("SELECT address FROM hosts", ()).await?;
        let mut segments = BTreeSet::new();

        while let Some(row) = rows.next().await? {
            let address: String = row.get(0)?;
            if let Some(ip) = parse_address(&address) {
                segments.insert(segment_of(&ip));
            }
        }

        Ok(segments.into_iter().collect())
    }
}

#[async_trait]
impl HostStore for DatabaseImpl {
    async fn list_hosts(&self) -> anyhow::Result<Vec<HostTarget>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query("SELECT id, address FROM hosts ORDER BY id", ()).await?;
        let mut hosts = Vec::new();

        while let Some(row) = rows.next().await? {
            hosts.push(HostTarget::new(row.get(0)?, row.get::<String>(1)?));
        }

        Ok(hosts)
    }

    async fn save_outcome(&self, id: HostId, outcome: &ProbeOutcome) -> anyhow::Result<bool> {
        let conn = self.get_conn().await?;
        let checked_at = timestamp_to_millis(outcome.checked_at);

        // single statement, and never step back in time
        let updated = conn
            .execute(
                "UPDATE hosts SET reachable = ?, resolved_hostname = ?, latency_ms = ?, probe_output = ?, checked_at = ? \
                 WHERE id = ? AND (checked_at IS NULL OR checked_at <= ?)",
                params![
                    if outcome.reachable { 1 } else { 0 },
                    outcome.resolved_hostname.clone(),
                    outcome.latency_ms.map(|v| v as i64),
                    outcome.output.clone(),
                    checked_at,
                    id,
                    checked_at
                ],
            )
            .await?;

        Ok(updated > 0)
    }
}
