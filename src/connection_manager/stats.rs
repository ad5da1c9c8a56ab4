//! Registry statistics structures

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Point-in-time copy of registry counts.
///
/// Holds no connection handles, so it can be rendered or serialized after the
/// registry lock is released.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    pub room_count: usize,
    pub connection_count: usize,
    /// room name -> member count
    pub rooms: BTreeMap<String, usize>,
    pub taken_at: DateTime<Utc>,
}

impl RegistrySnapshot {
    /// Rooms ordered by member count, largest first
    pub fn busiest_rooms(&self) -> Vec<(&str, usize)> {
        let mut rooms: Vec<(&str, usize)> = self
            .rooms
            .iter()
            .map(|(name, count)| (name.as_str(), *count))
            .collect();
        rooms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        rooms
    }
}
