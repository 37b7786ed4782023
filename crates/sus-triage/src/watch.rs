// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Watch-driven corpus updates
//!
//! Change notifications arrive as capture directory names on an mpsc
//! channel. [`CaptureUpdater`] consumes them one at a time, in delivery
//! order, and runs [`CorpusIndex::insert_incremental`] on the blocking pool.
//! [`PollingNotifier`] is the notification source: it lists the capture
//! root every tick and sends each directory not yet indexed.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use sus_corpus::{CaptureId, CorpusError, CorpusIndex, InsertOutcome};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Capacity of the notification channel
pub const NOTIFICATION_CHANNEL_CAPACITY: usize = 256;

/// What one notification did to the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Capture added to the index
    Indexed {
        /// Whether it started a new group
        new_group: bool,
    },
    /// Already indexed, or being indexed by another task
    Duplicate,
    /// Name is not a capture id
    Rejected,
    /// Read failed; the capture stays unmarked
    Failed {
        /// The previous attempt for this capture failed too
        repeated: bool,
    },
}

/// Counters for one updater run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdaterStats {
    /// Notifications received
    pub notifications: u64,
    /// Captures indexed
    pub indexed: u64,
    /// Groups created
    pub new_groups: u64,
    /// Notifications for captures already indexed
    pub duplicates: u64,
    /// Names that were not capture ids
    pub rejected: u64,
    /// Failed attempts left for retry
    pub failed: u64,
}

impl UpdaterStats {
    fn record(&mut self, outcome: &UpdateOutcome) {
        self.notifications += 1;
        match outcome {
            UpdateOutcome::Indexed { new_group } => {
                self.indexed += 1;
                self.new_groups += u64::from(*new_group);
            }
            UpdateOutcome::Duplicate => self.duplicates += 1,
            UpdateOutcome::Rejected => self.rejected += 1,
            UpdateOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

// ============================================================================
// Updater
// ============================================================================

/// Applies change notifications to a shared corpus index
///
/// The first failure for a capture is logged as a warning; repeats stay at
/// debug until the capture indexes.
#[derive(Clone)]
pub struct CaptureUpdater {
    index: Arc<CorpusIndex>,
    failing: Arc<Mutex<HashSet<CaptureId>>>,
}

impl CaptureUpdater {
    /// Create an updater for `index`
    #[must_use]
    pub fn new(index: Arc<CorpusIndex>) -> Self {
        Self {
            index,
            failing: Arc::default(),
        }
    }

    /// Whether the last attempt for `name` failed
    #[must_use]
    pub fn is_failing(&self, name: &str) -> bool {
        CaptureId::parse(name).is_ok_and(|id| self.failing_set().contains(&id))
    }

    fn failing_set(&self) -> MutexGuard<'_, HashSet<CaptureId>> {
        self.failing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_failure(&self, id: &CaptureId) -> bool {
        !self.failing_set().insert(id.clone())
    }

    /// Handle one notification
    pub async fn handle(&self, name: &str) -> UpdateOutcome {
        let id = match CaptureId::parse(name) {
            Ok(id) => id,
            Err(e) => {
                warn!(name, error = %e, "Ignoring notification");
                return UpdateOutcome::Rejected;
            }
        };

        let index = Arc::clone(&self.index);
        let task_id = id.clone();
        let result = tokio::task::spawn_blocking(move || index.insert_incremental(&task_id)).await;

        match result {
            Ok(Ok(InsertOutcome::Inserted {
                signature_hash,
                new_group,
            })) => {
                self.failing_set().remove(&id);
                info!(capture = %id, signature = %signature_hash, new_group, "New crash capture");
                UpdateOutcome::Indexed { new_group }
            }
            Ok(Ok(InsertOutcome::AlreadyIndexed | InsertOutcome::InProgress)) => {
                UpdateOutcome::Duplicate
            }
            Ok(Err(e)) => {
                let repeated = self.record_failure(&id);
                if repeated {
                    debug!(capture = %id, error = %e, "Capture still not indexable");
                } else {
                    warn!(capture = %id, error = %e, "Capture not indexed, left for retry");
                }
                UpdateOutcome::Failed { repeated }
            }
            Err(e) => {
                error!(capture = %id, error = %e, "Indexing task failed");
                UpdateOutcome::Failed {
                    repeated: self.record_failure(&id),
                }
            }
        }
    }

    /// Consume notifications until every sender is dropped
    pub async fn run(self, mut notifications: mpsc::Receiver<String>) -> UpdaterStats {
        let mut stats = UpdaterStats::default();
        while let Some(name) = notifications.recv().await {
            let outcome = self.handle(&name).await;
            stats.record(&outcome);
        }
        debug!(?stats, "Updater stopped");
        stats
    }
}

// ============================================================================
// Polling notification source
// ============================================================================

/// Sends the name of every capture directory not yet indexed, each tick
///
/// A capture that failed because it was still being written is sent again
/// on the next tick.
pub struct PollingNotifier {
    index: Arc<CorpusIndex>,
    interval: Duration,
}

impl PollingNotifier {
    /// Poll the root of `index` every `interval`
    #[must_use]
    pub fn new(index: Arc<CorpusIndex>, interval: Duration) -> Self {
        Self { index, interval }
    }

    /// Names of captures on disk that are not indexed
    ///
    /// Ids whose timestamp can never parse are left out.
    ///
    /// # Errors
    ///
    /// Returns an error if the capture root cannot be listed.
    pub fn pending(&self) -> Result<Vec<String>, CorpusError> {
        pending_captures(&self.index)
    }

    /// Poll until `shutdown` flips to true or the receiver is dropped
    pub async fn run(self, notifications: mpsc::Sender<String>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let index = Arc::clone(&self.index);
            let pending = match tokio::task::spawn_blocking(move || pending_captures(&index)).await {
                Ok(Ok(pending)) => pending,
                Ok(Err(e)) => {
                    warn!(error = %e, "Failed to list capture directory");
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "Listing task failed");
                    continue;
                }
            };

            for name in pending {
                if notifications.send(name).await.is_err() {
                    debug!("Updater gone, stopping notifier");
                    return;
                }
            }
        }
        debug!("Notifier stopped");
    }
}

fn pending_captures(index: &CorpusIndex) -> Result<Vec<String>, CorpusError> {
    let mut ids = index.reader().list()?;
    ids.retain(|id| !index.is_indexed(id) && id.created_at().is_ok());
    ids.sort();
    Ok(ids.into_iter().map(|id| id.to_string()).collect())
}
