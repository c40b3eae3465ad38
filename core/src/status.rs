//! The `StatusCache`: accumulates per-resource, per-condition results during
//! a build and is committed at the end of each resource's processing. An
//! accessor buffers condition updates and is committed exactly once per
//! resource.

use ahash::AHashMap as HashMap;
use chrono::{DateTime, Utc};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Condition {
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub observed_generation: Option<i64>,
    pub last_transition_time: Option<DateTime<Utc>>,
}

/// Identifies the Kubernetes object a set of conditions is about.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub generation: i64,
}

/// One committed resource's conditions, ready for a status writer to
/// persist as `RouteParentStatus`/`GatewayStatus`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusUpdate {
    pub resource: ResourceRef,
    pub conditions: Vec<Condition>,
}

/// Buffers condition updates for a single resource during processing.
///
/// Earlier revisions had this borrow `&mut StatusCache` for its whole
/// lifetime and commit on `Drop`. That shape doesn't survive contact with a
/// processor that needs to mutate the `Dag` *while* an accessor for the
/// resource it's processing is still open (every processor does this): a
/// live borrow of `dag.status` through the accessor conflicts with the
/// `&mut Dag` that `ensure_virtual_host`/`ensure_service`/etc. need, since
/// those methods can't statically prove they leave `status` alone. So the
/// accessor here is a plain owned buffer with no borrow on the cache at
/// all; a processor calls `StatusCache::commit` explicitly once it's done
/// with a resource, committing its conditions atomically at the end of
/// that resource's handling.
pub struct ConditionsAccessor {
    resource: ResourceRef,
    conditions: Vec<Condition>,
    committed: bool,
}

impl ConditionsAccessor {
    pub fn add_valid(&mut self, type_: impl Into<String>, reason: impl Into<String>, message: impl Into<String>) {
        self.conditions.push(Condition {
            type_: type_.into(),
            status: ConditionStatus::True,
            reason: reason.into(),
            message: message.into(),
            observed_generation: Some(self.resource.generation),
            last_transition_time: Some(Utc::now()),
        });
    }

    pub fn add_invalid(&mut self, type_: impl Into<String>, reason: impl Into<String>, message: impl Into<String>) {
        self.conditions.push(Condition {
            type_: type_.into(),
            status: ConditionStatus::False,
            reason: reason.into(),
            message: message.into(),
            observed_generation: Some(self.resource.generation),
            last_transition_time: Some(Utc::now()),
        });
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    pub fn is_valid(&self) -> bool {
        self.conditions.iter().all(|c| c.status != ConditionStatus::False)
    }
}

impl Drop for ConditionsAccessor {
    fn drop(&mut self) {
        debug_assert!(
            self.committed,
            "ConditionsAccessor for {:?} dropped without being committed",
            self.resource
        );
    }
}

#[derive(Debug, Default)]
pub struct StatusCache {
    updates: HashMap<ResourceRef, StatusUpdate>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Obtains a fresh accessor for `resource`. The caller appends
    /// conditions to it and hands it to `commit` once processing for that
    /// resource is done; a resource's conditions must be committed exactly
    /// once per build, which a processor upholds simply by calling `commit`
    /// once per resource it visits.
    pub fn accessor(&self, resource: ResourceRef) -> ConditionsAccessor {
        ConditionsAccessor {
            resource,
            conditions: Vec::new(),
            committed: false,
        }
    }

    /// Commits an accessor's buffered conditions. If none were added, a
    /// default "valid" condition is committed instead.
    pub fn commit(&mut self, mut accessor: ConditionsAccessor) {
        accessor.committed = true;
        let mut conditions = std::mem::take(&mut accessor.conditions);
        if conditions.is_empty() {
            conditions.push(Condition {
                type_: "Valid".to_string(),
                status: ConditionStatus::True,
                reason: "Valid".to_string(),
                message: String::new(),
                observed_generation: Some(accessor.resource.generation),
                last_transition_time: Some(Utc::now()),
            });
        }
        self.updates.insert(
            accessor.resource.clone(),
            StatusUpdate {
                resource: accessor.resource.clone(),
                conditions,
            },
        );
    }

    /// Returns the committed updates for the status writer to persist.
    pub fn get_updates(&self) -> Vec<&StatusUpdate> {
        self.updates.values().collect()
    }

    pub fn get(&self, resource: &ResourceRef) -> Option<&StatusUpdate> {
        self.updates.get(resource)
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rref(name: &str) -> ResourceRef {
        ResourceRef {
            kind: "Ingress".to_string(),
            namespace: "default".to_string(),
            name: name.to_string(),
            generation: 1,
        }
    }

    #[test]
    fn default_condition_committed_when_untouched() {
        let mut cache = StatusCache::new();
        let accessor = cache.accessor(rref("a"));
        cache.commit(accessor);
        let update = cache.get(&rref("a")).unwrap();
        assert_eq!(update.conditions.len(), 1);
        assert_eq!(update.conditions[0].type_, "Valid");
    }

    #[test]
    fn explicit_condition_replaces_default() {
        let mut cache = StatusCache::new();
        let mut accessor = cache.accessor(rref("b"));
        accessor.add_invalid("ResolvedRefs", "SecretNotFound", "missing secret");
        cache.commit(accessor);
        let update = cache.get(&rref("b")).unwrap();
        assert_eq!(update.conditions.len(), 1);
        assert_eq!(update.conditions[0].status, ConditionStatus::False);
    }

    #[test]
    fn one_entry_per_resource_generation() {
        let mut cache = StatusCache::new();
        let a1 = cache.accessor(rref("c"));
        cache.commit(a1);
        let a2 = cache.accessor(rref("c"));
        cache.commit(a2);
        assert_eq!(cache.len(), 1);
    }
}
