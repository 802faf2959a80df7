use std::sync::Arc;
use tracing::debug;

use super::{ChangeSet, MetricStore, StoreError};
use crate::data::{DataPoint, Metric};

/// Per-iteration change set against a store.
///
/// Reads go straight to the store; writes are staged and applied as one
/// batch by [`UnitOfWork::commit`]. A unit that is dropped without being
/// committed discards its staged writes.
pub struct UnitOfWork {
    store: Arc<dyn MetricStore>,
    pending: ChangeSet,
}

impl UnitOfWork {
    pub fn new(store: Arc<dyn MetricStore>) -> Self {
        Self {
            store,
            pending: ChangeSet::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn MetricStore> {
        &self.store
    }

    pub fn stage_data_point(&mut self, point: DataPoint) {
        self.pending.data_points.push(point);
    }

    pub fn stage_metric(&mut self, metric: Metric) {
        self.pending.metrics.push(metric);
    }

    pub fn pending(&self) -> &ChangeSet {
        &self.pending
    }

    /// Apply staged writes and return how many were applied
    pub async fn commit(&mut self) -> Result<usize, StoreError> {
        if self.pending.is_empty() {
            return Ok(0);
        }

        let changes = std::mem::take(&mut self.pending);
        let count = changes.len();
        self.store.apply(changes).await?;
        debug!(changes = count, "Committed unit of work");
        Ok(count)
    }
}
