//! Shared fixtures for integration tests
//!
//! A tenant in `clusters-example` backed by an in-memory object store whose
//! workloads report ready as soon as they are written.

#![allow(dead_code, reason = "each test crate uses a subset of the fixtures")]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use kube::core::DynamicObject;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use controlplane_operator::component::{ReleaseImages, WorkloadContext};
use controlplane_operator::components::default_registry;
use controlplane_operator::controller::apply::RetryPolicy;
use controlplane_operator::controller::store::{MemoryObjectStore, ObjectKey, ObjectStore};
use controlplane_operator::crd::HostedControlPlaneStatus;
use controlplane_operator::{HostedControlPlane, Orchestrator, OrchestratorSettings, PassReport};

pub const NAMESPACE: &str = "clusters-example";

/// HostedControlPlane with the given spec overrides merged over an AWS default
pub fn hosted_control_plane(overrides: Value) -> HostedControlPlane {
    let mut spec = json!({
        "platform": {"type": "AWS"},
        "clusterID": "5b1e7a57-7d0e-4a3c-9a0e-2b4f3c1d9e10",
        "infraID": "example-x7k2p",
        "releaseImage": "quay.io/openshift-release-dev/ocp-release:4.17.0-x86_64"
    });
    if let (Some(spec), Some(overrides)) = (spec.as_object_mut(), overrides.as_object()) {
        for (key, value) in overrides {
            spec.insert(key.clone(), value.clone());
        }
    }
    serde_json::from_value(json!({
        "apiVersion": "hypershift.openshift.io/v1beta1",
        "kind": "HostedControlPlane",
        "metadata": {
            "name": "example",
            "namespace": NAMESPACE,
            "uid": "0d6b4a3e-1f2c-4b5d-8e9f-a0b1c2d3e4f5",
            "generation": 1
        },
        "spec": spec
    }))
    .expect("valid HostedControlPlane")
}

/// Same HostedControlPlane carrying an annotation
pub fn annotated(mut hcp: HostedControlPlane, key: &str, value: &str) -> HostedControlPlane {
    hcp.metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value.to_string());
    hcp
}

/// Same HostedControlPlane with the status recorded by a previous pass
pub fn with_status(mut hcp: HostedControlPlane, report: &PassReport) -> HostedControlPlane {
    hcp.status = Some(HostedControlPlaneStatus {
        components: report.statuses.clone(),
        ..HostedControlPlaneStatus::default()
    });
    hcp
}

pub fn release() -> ReleaseImages {
    ReleaseImages::new(
        "4.17.0",
        BTreeMap::from([(
            "cluster-autoscaler".to_string(),
            "quay.io/openshift-release-dev/ocp-v4.0-art-dev@sha256:c1a5".to_string(),
        )]),
        "quay.io/openshift",
    )
}

pub fn secret(name: &str, key: &str, value: &str) -> DynamicObject {
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {"name": name, "namespace": NAMESPACE},
        "stringData": {key: value}
    }))
    .expect("valid secret")
}

pub fn config_map(name: &str, key: &str, value: &str) -> DynamicObject {
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": name, "namespace": NAMESPACE},
        "data": {key: value}
    }))
    .expect("valid configmap")
}

/// Store seeded with the kube-apiserver rollout sources
pub fn seeded_store() -> Arc<MemoryObjectStore> {
    let store = MemoryObjectStore::new().with_ready_workloads();
    store
        .insert(secret("kas-server-crt", "tls.crt", "certificate-v1"))
        .expect("seed secret");
    store
        .insert(config_map("kas-config", "config.json", r#"{"apiVersion":"v1"}"#))
        .expect("seed configmap");
    Arc::new(store)
}

pub fn context(hcp: HostedControlPlane, store: &Arc<MemoryObjectStore>) -> WorkloadContext {
    let backend: Arc<dyn ObjectStore> = Arc::clone(store) as Arc<dyn ObjectStore>;
    WorkloadContext::new(Arc::new(hcp), Arc::new(release()), backend)
}

/// Retry policy that does not slow tests down
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        backoff_start: Duration::from_millis(1),
        backoff_max: Duration::from_millis(2),
    }
}

pub fn orchestrator(retry: RetryPolicy) -> Orchestrator {
    Orchestrator::new(
        Arc::new(default_registry().expect("catalog is valid")),
        OrchestratorSettings {
            retry,
            ..OrchestratorSettings::default()
        },
    )
}

pub async fn run_pass(orchestrator: &Orchestrator, ctx: &WorkloadContext) -> PassReport {
    orchestrator.reconcile(ctx, &CancellationToken::new()).await
}

pub fn key(api_version: &str, kind: &str, name: &str) -> ObjectKey {
    ObjectKey::new(api_version, kind, NAMESPACE, name)
}

pub fn deployment_key(name: &str) -> ObjectKey {
    key("apps/v1", "Deployment", name)
}

pub fn statefulset_key(name: &str) -> ObjectKey {
    key("apps/v1", "StatefulSet", name)
}

/// Stored object as JSON
pub fn stored(store: &MemoryObjectStore, key: &ObjectKey) -> Value {
    let object = store
        .object(key)
        .unwrap_or_else(|| panic!("{key} should have been written"));
    serde_json::to_value(object).expect("serializable object")
}

/// Writes recorded for objects named `name`
pub fn writes_named(store: &MemoryObjectStore, name: &str) -> Vec<ObjectKey> {
    store.writes().into_iter().filter(|k| k.name == name).collect()
}
