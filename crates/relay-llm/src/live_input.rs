//! # Cancellation Gate
//!
//! Process-wide registry of root requests the user still wants answered.
//!
//! The transport layer calls [`LiveInputRegistry::start_user_input`] when a
//! user request begins and [`LiveInputRegistry::end_user_input`] when it is
//! superseded or finished. The executor asks
//! [`LiveInputRegistry::check_live_user_input`] before every attempt; a
//! request that is no longer live is abandoned without another provider
//! call.
//!
//! Liveness is inherited by prefix: a request id derived from a live root
//! (`req_1-child`, `req_1-async-bg`) is live as long as the root is. Async
//! branches (ids containing [`ASYNC_BRANCH_MARKER`]) also stay live after
//! the user has no entries at all, so background work may outlive the
//! conversation turn that spawned it.
//!
//! [`ASYNC_BRANCH_MARKER`]: relay_core::ids::ASYNC_BRANCH_MARKER

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use relay_core::ids::{RequestId, UserId};
use relay_settings::LiveInputSettings;
use tracing::debug;

/// Registry of live root request ids per user.
#[derive(Debug)]
pub struct LiveInputRegistry {
    enabled: bool,
    live: Mutex<HashMap<UserId, Vec<RequestId>>>,
}

impl Default for LiveInputRegistry {
    fn default() -> Self {
        Self::new(true)
    }
}

impl LiveInputRegistry {
    /// Create a registry. With `enabled = false` every request is live.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Create a registry from settings.
    pub fn from_settings(settings: &LiveInputSettings) -> Self {
        Self::new(settings.check_enabled)
    }

    /// Whether liveness checks are enforced.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Mark `id` live for `user`. Re-adding a live id is a no-op.
    pub fn start_user_input(&self, user: &UserId, id: &RequestId) {
        let mut live = self.live.lock();
        let ids = live.entry(user.clone()).or_default();
        if !ids.contains(id) {
            ids.push(id.clone());
        }
    }

    /// Remove `id` from `user`'s live set.
    ///
    /// Removing an id that is not live is a no-op. A user whose set becomes
    /// empty is dropped from the registry.
    pub fn end_user_input(&self, user: &UserId, id: &RequestId) {
        let mut live = self.live.lock();
        let Some(ids) = live.get_mut(user) else {
            debug!(user_id = %user, request_id = %id, "end_user_input for user with no live inputs");
            return;
        };
        let Some(pos) = ids.iter().position(|live_id| live_id == id) else {
            debug!(user_id = %user, request_id = %id, "end_user_input for id that is not live");
            return;
        };
        let _ = ids.remove(pos);
        if ids.is_empty() {
            let _ = live.remove(user);
        }
    }

    /// Whether work for `id` should still run.
    ///
    /// True when checks are disabled, when some live root of `user` is a
    /// string prefix of `id`, or when `user` has no live entries and `id`
    /// is an async branch. A call without a user id is treated like a user
    /// with no entries.
    pub fn check_live_user_input(&self, user: Option<&UserId>, id: &RequestId) -> bool {
        if !self.enabled {
            return true;
        }
        let live = self.live.lock();
        match user.and_then(|u| live.get(u)) {
            None => id.is_async_branch(),
            Some(ids) => ids.iter().any(|root| id.descends_from(root.as_str())),
        }
    }

    /// Start `id` and return a guard that ends it on drop.
    pub fn track(self: &Arc<Self>, user: UserId, id: RequestId) -> LiveInputGuard {
        self.start_user_input(&user, &id);
        LiveInputGuard {
            registry: Arc::clone(self),
            user,
            id,
        }
    }

    /// Number of live ids across all users.
    pub fn live_count(&self) -> usize {
        self.live.lock().values().map(Vec::len).sum()
    }

    /// Live ids for one user, oldest first.
    pub fn live_ids(&self, user: &UserId) -> Vec<RequestId> {
        self.live.lock().get(user).cloned().unwrap_or_default()
    }
}

/// Ends a live input exactly once when dropped.
#[derive(Debug)]
#[must_use = "dropping the guard ends the live input immediately"]
pub struct LiveInputGuard {
    registry: Arc<LiveInputRegistry>,
    user: UserId,
    id: RequestId,
}

impl LiveInputGuard {
    /// The tracked request id.
    pub fn request_id(&self) -> &RequestId {
        &self.id
    }
}

impl Drop for LiveInputGuard {
    fn drop(&mut self) {
        self.registry.end_user_input(&self.user, &self.id);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use relay_core::logging::capture_logs;
    use tracing::Level;

    use super::*;

    fn user() -> UserId {
        UserId::from_raw("user_1")
    }

    fn req(id: &str) -> RequestId {
        RequestId::from_raw(id)
    }

    #[test]
    fn started_id_is_live() {
        let registry = LiveInputRegistry::new(true);
        registry.start_user_input(&user(), &req("req_a"));
        assert!(registry.check_live_user_input(Some(&user()), &req("req_a")));
    }

    #[test]
    fn children_inherit_liveness_by_prefix() {
        let registry = LiveInputRegistry::new(true);
        let root = req("req_a");
        registry.start_user_input(&user(), &root);
        assert!(registry.check_live_user_input(Some(&user()), &root.child("tool-1")));
        assert!(registry.check_live_user_input(Some(&user()), &root.async_branch("bg")));
        assert!(!registry.check_live_user_input(Some(&user()), &req("req_b")));
    }

    #[test]
    fn ended_id_is_not_live_and_empty_user_removed() {
        let registry = LiveInputRegistry::new(true);
        registry.start_user_input(&user(), &req("req_a"));
        registry.end_user_input(&user(), &req("req_a"));
        assert!(!registry.check_live_user_input(Some(&user()), &req("req_a")));
        assert_eq!(registry.live_count(), 0);
        assert!(registry.live_ids(&user()).is_empty());
    }

    #[test]
    fn async_branch_outlives_empty_user() {
        let registry = LiveInputRegistry::new(true);
        let branch = req("req_a").async_branch("bg");
        assert!(registry.check_live_user_input(Some(&user()), &branch));
        assert!(registry.check_live_user_input(None, &branch));
        assert!(!registry.check_live_user_input(None, &req("req_a")));
    }

    #[test]
    fn async_branch_of_other_root_is_dead_while_user_has_entries() {
        let registry = LiveInputRegistry::new(true);
        registry.start_user_input(&user(), &req("req_new"));
        let stale_branch = req("req_old").async_branch("bg");
        assert!(!registry.check_live_user_input(Some(&user()), &stale_branch));
    }

    #[test]
    fn disabled_registry_is_always_live() {
        let registry = LiveInputRegistry::new(false);
        assert!(!registry.is_enabled());
        assert!(registry.check_live_user_input(Some(&user()), &req("anything")));
        assert!(registry.check_live_user_input(None, &req("anything")));
    }

    #[test]
    fn double_end_is_a_logged_noop() {
        let (logs, _guard) = capture_logs();
        let registry = LiveInputRegistry::new(true);
        registry.start_user_input(&user(), &req("req_a"));
        registry.start_user_input(&user(), &req("req_b"));
        registry.end_user_input(&user(), &req("req_a"));
        registry.end_user_input(&user(), &req("req_a"));
        assert_eq!(registry.live_ids(&user()), vec![req("req_b")]);
        assert!(logs.has_event(Level::DEBUG, "not live"));
    }

    #[test]
    fn duplicate_start_keeps_single_entry() {
        let registry = LiveInputRegistry::new(true);
        registry.start_user_input(&user(), &req("req_a"));
        registry.start_user_input(&user(), &req("req_a"));
        assert_eq!(registry.live_count(), 1);
        registry.end_user_input(&user(), &req("req_a"));
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn guard_ends_input_on_drop() {
        let registry = Arc::new(LiveInputRegistry::new(true));
        {
            let guard = registry.track(user(), req("req_a"));
            assert_eq!(guard.request_id(), &req("req_a"));
            assert!(registry.check_live_user_input(Some(&user()), &req("req_a")));
        }
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn concurrent_start_and_end() {
        let registry = Arc::new(LiveInputRegistry::new(true));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let id = req(&format!("req_{t}_{i}"));
                        registry.start_user_input(&user(), &id);
                        registry.end_user_input(&user(), &id);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.live_count(), 0);
    }
}
