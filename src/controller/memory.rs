//! # In-Memory Object Store
//!
//! [`ObjectStore`] implementation holding objects in a map. Used by the
//! `cpoctl render` dry run and by tests. It mimics the parts of API server
//! behavior the orchestrator depends on:
//!
//! - `metadata.generation` is bumped whenever the desired body changes
//! - `status` written by other controllers survives updates
//! - optional simulation of workload controllers reporting ready rollouts
//! - injectable conflicts for exercising the retry path

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use kube::core::DynamicObject;
use serde_json::{json, Value};

use crate::controller::store::{ObjectKey, ObjectStore, StoreError};

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ObjectKey, DynamicObject>,
    conflicts: BTreeMap<ObjectKey, u32>,
    writes: Vec<ObjectKey>,
    next_uid: u64,
}

/// Map-backed object store
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    state: Mutex<State>,
    ready_workloads: bool,
}

impl MemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report every written Deployment/StatefulSet as fully rolled out
    #[must_use]
    pub fn with_ready_workloads(mut self) -> Self {
        self.ready_workloads = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an object without recording a write
    pub fn insert(&self, object: DynamicObject) -> Result<(), StoreError> {
        let key = ObjectKey::from_object(&object)?;
        self.lock().objects.insert(key, object);
        Ok(())
    }

    /// Current copy of an object
    #[must_use]
    pub fn object(&self, key: &ObjectKey) -> Option<DynamicObject> {
        self.lock().objects.get(key).cloned()
    }

    /// All stored objects in key order
    #[must_use]
    pub fn objects(&self) -> Vec<DynamicObject> {
        self.lock().objects.values().cloned().collect()
    }

    /// Replace the `status` of a stored object
    pub fn set_status(&self, key: &ObjectKey, status: Value) -> Result<(), StoreError> {
        let mut state = self.lock();
        let object = state
            .objects
            .get_mut(key)
            .ok_or_else(|| StoreError::Internal(format!("{key} not found")))?;
        body_mut(object)?.insert("status".to_string(), status);
        Ok(())
    }

    /// Make the next `count` writes of `key` fail with a conflict
    pub fn inject_conflicts(&self, key: ObjectKey, count: u32) {
        self.lock().conflicts.insert(key, count);
    }

    /// Keys of every successful write, in order
    #[must_use]
    pub fn writes(&self) -> Vec<ObjectKey> {
        self.lock().writes.clone()
    }

    #[must_use]
    pub fn write_count(&self) -> usize {
        self.lock().writes.len()
    }

    /// Forget the write log (objects are kept)
    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<DynamicObject>, StoreError> {
        Ok(self.object(key))
    }

    async fn create_or_update(&self, object: &DynamicObject) -> Result<(), StoreError> {
        let key = ObjectKey::from_object(object)?;
        let mut state = self.lock();

        if let Some(remaining) = state.conflicts.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Conflict(key.to_string()));
            }
        }

        let mut desired = object.clone();
        let existing = state.objects.get(&key).cloned();
        let generation = match &existing {
            Some(current) => {
                let current_generation = current.metadata.generation.unwrap_or(1);
                if without_status(current) == without_status(&desired) {
                    current_generation
                } else {
                    current_generation + 1
                }
            }
            None => 1,
        };

        match &existing {
            Some(current) => {
                desired.metadata.uid.clone_from(&current.metadata.uid);
                if let Some(status) = current.data.get("status") {
                    body_mut(&mut desired)?.insert("status".to_string(), status.clone());
                }
            }
            None => {
                state.next_uid += 1;
                desired.metadata.uid = Some(format!("uid-{}", state.next_uid));
            }
        }
        desired.metadata.generation = Some(generation);
        desired.metadata.resource_version = Some(generation.to_string());

        if self.ready_workloads && matches!(key.kind.as_str(), "Deployment" | "StatefulSet") {
            let replicas = desired
                .data
                .get("spec")
                .and_then(|s| s.get("replicas"))
                .and_then(Value::as_i64)
                .unwrap_or(1);
            let revision = format!("{}-{generation}", key.name);
            body_mut(&mut desired)?.insert(
                "status".to_string(),
                json!({
                    "observedGeneration": generation,
                    "replicas": replicas,
                    "updatedReplicas": replicas,
                    "availableReplicas": replicas,
                    "readyReplicas": replicas,
                    "currentRevision": revision,
                    "updateRevision": revision,
                }),
            );
        }

        state.objects.insert(key.clone(), desired);
        state.writes.push(key);
        Ok(())
    }
}

fn body_mut(object: &mut DynamicObject) -> Result<&mut serde_json::Map<String, Value>, StoreError> {
    if object.data.is_null() {
        object.data = json!({});
    }
    object
        .data
        .as_object_mut()
        .ok_or_else(|| StoreError::Internal("object body is not a map".to_string()))
}

/// Desired-state view of an object: body without status, labels and annotations
fn without_status(object: &DynamicObject) -> (Value, Option<BTreeMap<String, String>>, Option<BTreeMap<String, String>>) {
    let mut data = object.data.clone();
    if let Some(map) = data.as_object_mut() {
        map.remove("status");
    }
    (
        data,
        object.metadata.labels.clone(),
        object.metadata.annotations.clone(),
    )
}
