//! Merge-diff between live provider inventory and the persisted registry.
//!
//! `stored` must be sorted by `uid`: each live record is located with a
//! binary search. Feeding an unsorted `stored` slice silently produces a
//! wrong plan (spurious inserts and removals), so callers must uphold the
//! [`ResourceStore::get_resources`](crate::store::ResourceStore::get_resources)
//! ordering contract.

use std::collections::HashSet;
use stratus_core::{Resource, ResourceId};

/// A status change for a stored resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub id: ResourceId,
    pub uid: String,
    pub status: String,
}

/// Writes needed to converge the registry to the live inventory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffPlan {
    /// Live resources absent from the registry.
    pub inserts: Vec<Resource>,
    /// Stored resources whose status changed.
    pub updates: Vec<StatusUpdate>,
    /// Stored resources no longer observed live.
    pub removals: Vec<Resource>,
    /// Live resources matched to a stored entry, carrying its registry id.
    pub matched: Vec<Resource>,
}

impl DiffPlan {
    pub fn is_noop(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.removals.is_empty()
    }
}

/// Compute the plan for one account.
///
/// Duplicate live uids are collapsed to their first occurrence.
pub fn plan_diff(live: Vec<Resource>, stored: &[Resource]) -> DiffPlan {
    let mut plan = DiffPlan::default();
    let mut visited = vec![false; stored.len()];
    let mut seen = HashSet::with_capacity(live.len());

    for mut resource in live {
        if !seen.insert(resource.uid.clone()) {
            tracing::debug!(uid = %resource.uid, "Ignoring duplicate live resource");
            continue;
        }

        match stored.binary_search_by(|s| s.uid.as_str().cmp(resource.uid.as_str())) {
            Err(_) => plan.inserts.push(resource),
            Ok(index) => {
                visited[index] = true;
                let existing = &stored[index];
                resource.id = existing.id;
                if existing.status != resource.status {
                    if let Some(id) = existing.id {
                        plan.updates.push(StatusUpdate {
                            id,
                            uid: existing.uid.clone(),
                            status: resource.status.clone(),
                        });
                    }
                }
                plan.matched.push(resource);
            }
        }
    }

    plan.removals = stored
        .iter()
        .zip(visited)
        .filter(|(_, hit)| !hit)
        .map(|(resource, _)| resource.clone())
        .collect();

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_core::{CloudAccountRef, ResourceType};

    fn live(uid: &str, status: &str) -> Resource {
        Resource::new(uid, uid, ResourceType::Vm, status, CloudAccountRef::new(1, "gcp"))
    }

    fn stored(id: ResourceId, uid: &str, status: &str) -> Resource {
        let mut r = live(uid, status);
        r.id = Some(id);
        r
    }

    fn uids(resources: &[Resource]) -> Vec<&str> {
        resources.iter().map(|r| r.uid.as_str()).collect()
    }

    #[test]
    fn test_insert_update_remove_scenario() {
        let stored = vec![stored(1, "a", "STOPPED"), stored(2, "c", "RUNNING")];
        let plan = plan_diff(vec![live("a", "RUNNING"), live("b", "RUNNING")], &stored);

        assert_eq!(uids(&plan.inserts), vec!["b"]);
        assert_eq!(
            plan.updates,
            vec![StatusUpdate {
                id: 1,
                uid: "a".to_string(),
                status: "RUNNING".to_string(),
            }]
        );
        assert_eq!(uids(&plan.removals), vec!["c"]);
        assert_eq!(plan.matched[0].id, Some(1));
    }

    #[test]
    fn test_matching_inventory_is_noop() {
        let stored = vec![stored(1, "a", "RUNNING"), stored(2, "b", "STOPPED")];
        let plan = plan_diff(vec![live("b", "STOPPED"), live("a", "RUNNING")], &stored);
        assert!(plan.is_noop());
        assert_eq!(plan.matched.len(), 2);
    }

    #[test]
    fn test_empty_live_removes_everything() {
        let stored = vec![stored(1, "a", "RUNNING"), stored(2, "b", "RUNNING")];
        let plan = plan_diff(vec![], &stored);
        assert!(plan.inserts.is_empty());
        assert_eq!(uids(&plan.removals), vec!["a", "b"]);
    }

    #[test]
    fn test_matched_entries_are_never_removed() {
        let stored: Vec<Resource> = (0..50)
            .map(|i| stored(i, &format!("uid-{i:03}"), "RUNNING"))
            .collect();
        let live_set: Vec<Resource> = (0..50)
            .filter(|i| i % 3 == 0)
            .map(|i| live(&format!("uid-{i:03}"), "RUNNING"))
            .collect();

        let plan = plan_diff(live_set, &stored);
        assert!(plan.inserts.is_empty());
        assert_eq!(plan.removals.len(), 50 - 17);
        assert!(plan.removals.iter().all(|r| r.id.unwrap() % 3 != 0));
    }

    #[test]
    fn test_duplicate_live_uid_inserted_once() {
        let plan = plan_diff(vec![live("x", "RUNNING"), live("x", "STOPPED")], &[]);
        assert_eq!(plan.inserts.len(), 1);
        assert_eq!(plan.inserts[0].status, "RUNNING");
    }

    /// Documents the ordering contract: with `stored` in descending order the
    /// binary search misses an existing entry, which turns into a bogus
    /// insert plus a bogus removal.
    #[test]
    fn test_unsorted_stored_input_produces_wrong_plan() {
        let unsorted = vec![
            stored(3, "c", "RUNNING"),
            stored(2, "b", "RUNNING"),
            stored(1, "a", "RUNNING"),
        ];
        let plan = plan_diff(vec![live("a", "RUNNING")], &unsorted);

        assert_eq!(uids(&plan.inserts), vec!["a"]);
        assert!(uids(&plan.removals).contains(&"a"));

        let mut sorted = unsorted.clone();
        sorted.sort_by(|x, y| x.uid.cmp(&y.uid));
        let plan = plan_diff(vec![live("a", "RUNNING")], &sorted);
        assert!(plan.inserts.is_empty());
        assert_eq!(uids(&plan.removals), vec!["b", "c"]);
    }
}
