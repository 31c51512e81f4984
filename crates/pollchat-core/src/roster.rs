//! Presence roster: who is known and who is online.

use std::{
    collections::{BTreeSet, HashSet},
    sync::{Arc, PoisonError, RwLock},
};

use crate::User;

/// Merge the full user list with the online subset.
///
/// One entry per distinct name in `all`, sorted online-first, then by
/// username. Online names missing from `all` are ignored.
#[must_use]
pub fn build_roster(all: &[String], online: &[String]) -> Vec<User> {
    let online: HashSet<&str> = online.iter().map(String::as_str).collect();
    let names: BTreeSet<&str> = all.iter().map(String::as_str).collect();

    let mut roster: Vec<User> = names
        .into_iter()
        .map(|name| User::new(name, online.contains(name)))
        .collect();
    roster.sort_by(|a, b| {
        b.is_online
            .cmp(&a.is_online)
            .then_with(|| a.username.cmp(&b.username))
    });
    roster
}

/// Last published roster snapshot.
///
/// Writers replace the whole list; readers get a shared immutable view.
#[derive(Debug, Default)]
pub struct PresenceRoster {
    current: RwLock<Arc<Vec<User>>>,
}

impl PresenceRoster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot, dropping `exclude` (the local user) if present.
    pub fn publish(&self, mut roster: Vec<User>, exclude: Option<&str>) {
        if let Some(me) = exclude {
            roster.retain(|user| user.username != me);
        }
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(roster);
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<User>> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Online usernames other than `me`, in roster order.
    #[must_use]
    pub fn online_peers(&self, me: &str) -> Vec<String> {
        self.snapshot()
            .iter()
            .filter(|user| user.is_online && user.username != me)
            .map(|user| user.username.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.publish(Vec::new(), None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn sorts_online_first_then_alphabetically() {
        let roster = build_roster(&names(&["Bern", "BernCLI", "Ada"]), &names(&["Ada"]));
        assert_eq!(
            roster,
            vec![
                User::new("Ada", true),
                User::new("Bern", false),
                User::new("BernCLI", false),
            ]
        );
    }

    #[test]
    fn drops_duplicates_and_unlisted_online_users() {
        let roster = build_roster(&names(&["Carl", "Ada", "Carl"]), &names(&["Zed", "Carl"]));
        assert_eq!(roster, vec![User::new("Carl", true), User::new("Ada", false)]);
    }

    #[test]
    fn online_only_name_is_not_a_roster_entry() {
        let roster = build_roster(&names(&["Ada"]), &names(&["Ada", "Ghost"]));
        assert_eq!(roster, vec![User::new("Ada", true)]);
    }

    #[test]
    fn publish_excludes_local_user() {
        let presence = PresenceRoster::new();
        presence.publish(
            build_roster(&names(&["Ada", "Bern", "Carl"]), &names(&["Ada", "Bern"])),
            Some("Bern"),
        );
        let snapshot = presence.snapshot();
        assert!(snapshot.iter().all(|u| u.username != "Bern"));
        assert_eq!(snapshot.len(), 2);
        assert_eq!(presence.online_peers("Bern"), vec!["Ada".to_owned()]);
    }

    #[test]
    fn old_snapshots_are_unaffected_by_publish() {
        let presence = PresenceRoster::new();
        presence.publish(vec![User::new("Ada", true)], None);
        let before = presence.snapshot();
        presence.clear();
        assert_eq!(before.len(), 1);
        assert!(presence.snapshot().is_empty());
    }
}
