use serde::{Deserialize, Serialize};

/// Aggregate counts over the record set.
///
/// `completed_works` is computed by its own store accessor and currently
/// equals `completed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total: u64,
    pub pending: u64,
    pub completed: u64,
    pub completed_works: u64,
}
