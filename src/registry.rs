use std::collections::HashMap;

use crate::protocol_objects::{PeerId, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Replaced,
    Ignored,
}

/// Known peers keyed by id. The local peer is always present and listed first.
///
/// Observations replace the prior record wholesale; there is no field or
/// activity-log merge, so a late stale observation wins over a newer one.
#[derive(Debug, Clone)]
pub struct PresenceRegistry {
    local: User,
    remote: HashMap<PeerId, User>,
}

impl PresenceRegistry {
    pub fn new(local: User) -> Self {
        Self {
            local,
            remote: HashMap::new(),
        }
    }

    pub fn register(&mut self, local: User) {
        self.remote.remove(&local.id);
        self.local = local;
    }

    pub fn upsert(&mut self, user: User) -> Upsert {
        if user.id.is_empty() {
            return Upsert::Ignored;
        }

        if user.id == self.local.id {
            self.local = user;
            return Upsert::Replaced;
        }

        match self.remote.insert(user.id.clone(), user) {
            Some(_) => Upsert::Replaced,
            None => Upsert::Inserted,
        }
    }

    /// Removes a remote peer. The local entry cannot be removed.
    pub fn remove(&mut self, id: &str) -> Option<User> {
        self.remote.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&User> {
        if id == self.local.id {
            Some(&self.local)
        } else {
            self.remote.get(id)
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn local(&self) -> &User {
        &self.local
    }

    /// Known peers, the local one included.
    pub fn peer_count(&self) -> usize {
        self.remote.len() + 1
    }

    pub fn snapshot(&self) -> Vec<User> {
        let mut others: Vec<&User> = self.remote.values().collect();
        others.sort_by(|a, b| a.id.cmp(&b.id));

        std::iter::once(&self.local)
            .chain(others)
            .cloned()
            .collect()
    }
}
