//! Partition lifecycle management
//!
//! Each (tenant, application, schema) triple owns a chain of time-bounded
//! physical partitions. The partition for the next period is provisioned
//! proactively, at schema upsert and whenever the current period rolls
//! over, so writes never block on partition creation. Re-provisioning an
//! existing partition is a no-op.

use crate::column::ColumnStore;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use loam_core::{PartitionGranularity, Result};
use loam_registry::SchemaKey;
use std::sync::Arc;
use tracing::{debug, warn};

/// Physical table name for one schema version
///
/// Deterministic function of the schema key; shared with index naming so
/// reconciliation targets the same table the documents land in.
pub fn table_name(key: &SchemaKey) -> String {
    format!(
        "doc_{}_{}_{}_{}",
        sanitize(key.tenant.as_str()),
        sanitize(key.application.as_str()),
        sanitize(&key.entity),
        sanitize(&key.version),
    )
}

pub(crate) fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Inclusive start and exclusive end of the period containing `at`
fn period_bounds(
    granularity: PartitionGranularity,
    at: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    match granularity {
        PartitionGranularity::Month => {
            let start = Utc
                .with_ymd_and_hms(at.year(), at.month(), 1, 0, 0, 0)
                .single()
                .expect("first of month is always valid");
            let (next_year, next_month) = if at.month() == 12 {
                (at.year() + 1, 1)
            } else {
                (at.year(), at.month() + 1)
            };
            let end = Utc
                .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
                .single()
                .expect("first of month is always valid");
            (start, end)
        }
        PartitionGranularity::Year => {
            let start = Utc
                .with_ymd_and_hms(at.year(), 1, 1, 0, 0, 0)
                .single()
                .expect("new year is always valid");
            let end = Utc
                .with_ymd_and_hms(at.year() + 1, 1, 1, 0, 0, 0)
                .single()
                .expect("new year is always valid");
            (start, end)
        }
    }
}

fn partition_name(table: &str, granularity: PartitionGranularity, start: DateTime<Utc>) -> String {
    match granularity {
        PartitionGranularity::Month => format!("{table}_p{}", start.format("%Y%m")),
        PartitionGranularity::Year => format!("{table}_p{}", start.format("%Y")),
    }
}

/// Provisions and maintains partition chains
pub struct PartitionManager {
    store: Arc<dyn ColumnStore>,
}

impl PartitionManager {
    pub fn new(store: Arc<dyn ColumnStore>) -> Self {
        Self { store }
    }

    /// Ensure the partition for `at`'s period and the following one exist
    pub fn ensure_current_and_next(
        &self,
        key: &SchemaKey,
        granularity: PartitionGranularity,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let table = table_name(key);

        let (current_start, current_end) = period_bounds(granularity, at);
        self.provision(&table, granularity, current_start, current_end)?;

        // Next period starts where the current one ends.
        let (next_start, next_end) = period_bounds(granularity, current_end);
        self.provision(&table, granularity, next_start, next_end)?;

        Ok(())
    }

    fn provision(
        &self,
        table: &str,
        granularity: PartitionGranularity,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<()> {
        let name = partition_name(table, granularity, from);
        match self.store.create_partition(table, &name, from, to) {
            Ok(true) => {
                debug!(%table, partition = %name, "partition provisioned");
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => {
                warn!(%table, partition = %name, error = %e, "partition provisioning failed");
                Err(e)
            }
        }
    }
}
