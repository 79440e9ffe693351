use std::collections::HashSet;

/// Live set of remote participants in the current channel.
#[derive(Debug, Default)]
pub(crate) struct PresenceTracker {
    remotes: HashSet<u32>,
    seen_any: bool,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `uid` was not already present.
    pub fn on_remote_join(&mut self, uid: u32) -> bool {
        self.seen_any = true;
        self.remotes.insert(uid)
    }

    /// Returns `true` if `uid` was present.
    pub fn on_remote_leave(&mut self, uid: u32) -> bool {
        self.remotes.remove(&uid)
    }

    pub fn count(&self) -> usize {
        self.remotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remotes.is_empty()
    }

    /// Whether any remote has been observed since the last reset.
    pub fn has_seen_remote(&self) -> bool {
        self.seen_any
    }

    pub fn reset(&mut self) {
        self.remotes.clear();
        self.seen_any = false;
    }

    pub fn participants(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.remotes.iter().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_is_idempotent() {
        let mut presence = PresenceTracker::new();
        assert!(presence.on_remote_join(5));
        assert!(!presence.on_remote_join(5));
        assert_eq!(presence.count(), 1);
    }

    #[test]
    fn test_leave_of_absent_is_noop() {
        let mut presence = PresenceTracker::new();
        presence.on_remote_join(1);
        assert!(!presence.on_remote_leave(9));
        assert_eq!(presence.count(), 1);
    }

    #[test]
    fn test_seen_survives_empty_until_reset() {
        let mut presence = PresenceTracker::new();
        assert!(!presence.has_seen_remote());
        presence.on_remote_join(3);
        presence.on_remote_leave(3);
        assert!(presence.is_empty());
        assert!(presence.has_seen_remote());

        presence.reset();
        assert!(!presence.has_seen_remote());
        assert_eq!(presence.count(), 0);
    }

    #[test]
    fn test_participants_sorted() {
        let mut presence = PresenceTracker::new();
        for uid in [9, 2, 5] {
            presence.on_remote_join(uid);
        }
        assert_eq!(presence.participants(), vec![2, 5, 9]);
    }
}
