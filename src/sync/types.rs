use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDataType {
    Calculation,
    Settings,
    UserData,
    Analytics,
}

impl SyncDataType {
    /// Path of the endpoint accepting this kind of payload.
    pub fn endpoint(&self) -> &'static str {
        match self {
            SyncDataType::Calculation => "/api/calculations/sync",
            SyncDataType::Settings => "/api/settings/sync",
            SyncDataType::UserData => "/api/user/sync",
            SyncDataType::Analytics => "/api/analytics/sync",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncData {
    pub id: String,
    #[serde(rename = "type")]
    pub data_type: SyncDataType,
    pub data: serde_json::Value,
    /// Epoch milliseconds at which the item was queued.
    pub timestamp: u64,
    #[serde(default)]
    pub retry_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    Synced,
    Abandoned,
    Cleared,
}

/// One line of the pending-sync journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JournalRecord {
    Queued { item: SyncData },
    Retried { id: String, retry_count: u32 },
    Removed { id: String, reason: RemovalReason },
}

/// Apply journal records, in order, on top of a snapshot.
pub fn replay<I>(mut pending: Vec<SyncData>, records: I) -> Vec<SyncData>
where
    I: IntoIterator<Item = JournalRecord>,
{
    for record in records {
        match record {
            JournalRecord::Queued { item } => {
                pending.retain(|p| p.id != item.id);
                pending.push(item);
            }
            JournalRecord::Retried { id, retry_count } => {
                if let Some(item) = pending.iter_mut().find(|p| p.id == id) {
                    item.retry_count = retry_count;
                }
            }
            JournalRecord::Removed { id, .. } => pending.retain(|p| p.id != id),
        }
    }
    pending
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced,
    Retry { retry_count: u32 },
    Abandoned,
    /// The rate limiter refused the send; the item stays queued untouched.
    Deferred { retry_after: Option<u64> },
    /// Another send of the same item is still running.
    InFlight,
    Missing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub attempted: usize,
    pub synced: usize,
    pub retried: usize,
    pub abandoned: usize,
    pub deferred: usize,
}

impl SyncReport {
    pub fn record(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Synced => self.synced += 1,
            SyncOutcome::Retry { .. } => self.retried += 1,
            SyncOutcome::Abandoned => self.abandoned += 1,
            SyncOutcome::Deferred { .. } => self.deferred += 1,
            SyncOutcome::InFlight | SyncOutcome::Missing => return,
        }
        self.attempted += 1;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub pending: usize,
    pub synced: u64,
    pub failed_attempts: u64,
    pub abandoned: u64,
    pub deferred: u64,
}

/// Events that wake the sync loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// Connectivity restored.
    Online,
    /// Connectivity lost; sends pause until `Online`.
    Offline,
    /// The client came back to the foreground.
    Visible,
    /// Interval tick.
    Periodic,
}
