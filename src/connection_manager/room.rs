use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use super::ConnectionHandle;

/// Members of a single room, keyed by connection id.
///
/// A `Room` only lives inside the registry map and is removed in the same
/// critical section that removes its last member.
#[derive(Debug, Default)]
pub struct Room {
    members: HashMap<Uuid, Arc<ConnectionHandle>>,
}

impl Room {
    pub(crate) fn insert(&mut self, handle: Arc<ConnectionHandle>) -> bool {
        self.members.insert(handle.id, handle).is_none()
    }

    pub(crate) fn remove(&mut self, connection_id: &Uuid) -> Option<Arc<ConnectionHandle>> {
        self.members.remove(connection_id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, connection_id: &Uuid) -> bool {
        self.members.contains_key(connection_id)
    }

    /// Independent copy of the member list for lock-free delivery
    pub(crate) fn members_snapshot(&self, skip: Option<Uuid>) -> Vec<Arc<ConnectionHandle>> {
        self.members
            .values()
            .filter(|handle| Some(handle.id) != skip)
            .cloned()
            .collect()
    }
}
