//! # Reconciliation Pass Tests
//!
//! Full passes of the default component catalog against an in-memory store.
//!
//! These tests verify:
//! - Dependency order and isolation of failing components
//! - Predicate gating leaves objects untouched
//! - Rollouts are triggered only by configuration content changes
//! - Repeated passes converge without writes
//! - Conflict retries and cancellation

mod common;

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use controlplane_operator::components::default_registry;
use controlplane_operator::constants::{
    CLUSTER_AUTOSCALER_IMAGE_ANNOTATION, DISABLE_CLUSTER_AUTOSCALER_ANNOTATION,
    ROLLOUT_FINGERPRINT_ANNOTATION,
};
use controlplane_operator::controller::apply::RetryPolicy;
use controlplane_operator::controller::store::MemoryObjectStore;
use controlplane_operator::crd::ComponentPhase;
use controlplane_operator::{Orchestrator, OrchestratorSettings};

use common::*;

fn config_hash(store: &MemoryObjectStore) -> String {
    stored(store, &deployment_key("kube-apiserver"))["spec"]["template"]["metadata"]["annotations"]
        [ROLLOUT_FINGERPRINT_ANNOTATION]
        .as_str()
        .expect("fingerprint annotation is set")
        .to_string()
}

#[tokio::test]
async fn test_first_pass_reconciles_every_component() {
    let store = seeded_store();
    let ctx = context(hosted_control_plane(json!({})), &store);

    let report = run_pass(&orchestrator(RetryPolicy::default()), &ctx).await;

    assert_eq!(report.phase("etcd"), Some(ComponentPhase::Available));
    assert_eq!(report.phase("kube-apiserver"), Some(ComponentPhase::Available));
    assert_eq!(report.phase("cluster-autoscaler"), Some(ComponentPhase::Available));
    assert_eq!(report.phase("karpenter-operator"), Some(ComponentPhase::PredicateSkipped));
    assert!(report.all_available());
    assert!(!report.cancelled);

    let names: Vec<&str> = report.statuses.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["etcd", "kube-apiserver", "cluster-autoscaler", "karpenter-operator"]
    );
}

#[tokio::test]
async fn test_dependencies_are_written_before_dependents() {
    let store = seeded_store();
    let ctx = context(hosted_control_plane(json!({})), &store);

    run_pass(&orchestrator(RetryPolicy::default()), &ctx).await;

    let writes = store.writes();
    let last_etcd = writes
        .iter()
        .rposition(|k| k.name.starts_with("etcd"))
        .expect("etcd objects written");
    let first_kas = writes
        .iter()
        .position(|k| k.name == "kube-apiserver")
        .expect("kube-apiserver objects written");
    let first_autoscaler = writes
        .iter()
        .position(|k| k.name == "cluster-autoscaler")
        .expect("cluster-autoscaler objects written");
    assert!(last_etcd < first_kas);
    assert!(first_kas < first_autoscaler);
}

#[tokio::test]
async fn test_rendered_objects_are_scoped_to_tenant() {
    let store = seeded_store();
    let ctx = context(hosted_control_plane(json!({})), &store);

    run_pass(&orchestrator(RetryPolicy::default()), &ctx).await;

    let service = stored(&store, &key("v1", "Service", "etcd-client"));
    assert_eq!(service["metadata"]["namespace"], NAMESPACE);
    assert_eq!(
        service["metadata"]["ownerReferences"][0]["kind"],
        "HostedControlPlane"
    );
    assert_eq!(
        service["metadata"]["ownerReferences"][0]["uid"],
        "0d6b4a3e-1f2c-4b5d-8e9f-a0b1c2d3e4f5"
    );

    let binding = stored(
        &store,
        &key("rbac.authorization.k8s.io/v1", "RoleBinding", "cluster-autoscaler"),
    );
    assert_eq!(binding["subjects"][0]["namespace"], NAMESPACE);
}

#[tokio::test]
async fn test_second_pass_writes_nothing() {
    let store = seeded_store();
    let hcp = hosted_control_plane(json!({}));
    let orchestrator = orchestrator(RetryPolicy::default());

    let first = run_pass(&orchestrator, &context(hcp.clone(), &store)).await;
    assert!(store.write_count() > 0);
    store.clear_writes();

    let second = run_pass(&orchestrator, &context(with_status(hcp, &first), &store)).await;

    assert_eq!(store.write_count(), 0, "unexpected writes: {:?}", store.writes());
    for (before, after) in first.statuses.iter().zip(&second.statuses) {
        assert_eq!(before.phase, after.phase);
        assert_eq!(before.last_applied_fingerprint, after.last_applied_fingerprint);
        assert_eq!(before.last_transition_time, after.last_transition_time);
    }
}

#[tokio::test]
async fn test_injected_sidecar_does_not_trigger_reapply() {
    let store = seeded_store();
    let hcp = hosted_control_plane(json!({}));
    let orchestrator = orchestrator(RetryPolicy::default());

    let first = run_pass(&orchestrator, &context(hcp.clone(), &store)).await;

    // A mutating webhook adds a container and a volume to the live workload
    let mut live = stored(&store, &deployment_key("kube-apiserver"));
    let pod_spec = &mut live["spec"]["template"]["spec"];
    pod_spec["containers"]
        .as_array_mut()
        .expect("containers")
        .insert(0, json!({"name": "istio-proxy", "image": "proxy:1.22"}));
    pod_spec["volumes"]
        .as_array_mut()
        .expect("volumes")
        .push(json!({"name": "istio-envoy", "emptyDir": {}}));
    store
        .insert(serde_json::from_value(live).expect("valid deployment"))
        .expect("replace deployment");
    store.clear_writes();

    run_pass(&orchestrator, &context(with_status(hcp, &first), &store)).await;

    assert!(
        writes_named(&store, "kube-apiserver").is_empty(),
        "unexpected writes: {:?}",
        store.writes()
    );
}

#[tokio::test]
async fn test_secret_change_rolls_out_workload() {
    let store = seeded_store();
    let hcp = hosted_control_plane(json!({}));
    let orchestrator = orchestrator(RetryPolicy::default());

    let first = run_pass(&orchestrator, &context(hcp.clone(), &store)).await;
    let before = config_hash(&store);
    assert_eq!(
        first.status("kube-apiserver").and_then(|s| s.last_applied_fingerprint.as_deref()),
        Some(before.as_str())
    );

    store
        .insert(secret("kas-server-crt", "tls.crt", "certificate-v2"))
        .expect("replace secret");
    store.clear_writes();
    let second = run_pass(&orchestrator, &context(with_status(hcp, &first), &store)).await;

    let after = config_hash(&store);
    assert_ne!(before, after);
    assert_eq!(
        second.status("kube-apiserver").and_then(|s| s.last_applied_fingerprint.as_deref()),
        Some(after.as_str())
    );
    assert_eq!(store.writes(), vec![deployment_key("kube-apiserver")]);
    assert_eq!(
        stored(&store, &deployment_key("kube-apiserver"))["metadata"]["generation"],
        2
    );
}

#[tokio::test]
async fn test_config_map_change_rolls_out_workload() {
    let store = seeded_store();
    let hcp = hosted_control_plane(json!({}));
    let orchestrator = orchestrator(RetryPolicy::default());

    let first = run_pass(&orchestrator, &context(hcp.clone(), &store)).await;
    let before = config_hash(&store);

    store
        .insert(config_map("kas-config", "config.json", r#"{"apiVersion":"v2"}"#))
        .expect("replace configmap");
    run_pass(&orchestrator, &context(with_status(hcp, &first), &store)).await;

    assert_ne!(before, config_hash(&store));
}

#[tokio::test]
async fn test_missing_rollout_source_degrades_component() {
    let store = Arc::new(MemoryObjectStore::new().with_ready_workloads());
    store
        .insert(secret("kas-server-crt", "tls.crt", "certificate-v1"))
        .expect("seed secret");
    let ctx = context(hosted_control_plane(json!({})), &store);

    let report = run_pass(&orchestrator(RetryPolicy::default()), &ctx).await;

    let kas = report.status("kube-apiserver").expect("status recorded");
    assert_eq!(kas.phase, ComponentPhase::Degraded);
    assert!(kas.message.as_deref().is_some_and(|m| m.contains("kas-config")));
    assert!(writes_named(&store, "kube-apiserver").is_empty());
    assert_eq!(report.phase("etcd"), Some(ComponentPhase::Available));
    assert_eq!(
        report.phase("cluster-autoscaler"),
        Some(ComponentPhase::BlockedOnDependency)
    );
}

#[tokio::test]
async fn test_degraded_dependency_blocks_dependents() {
    let store = seeded_store();
    store.inject_conflicts(statefulset_key("etcd"), 10);
    let ctx = context(hosted_control_plane(json!({})), &store);

    let report = run_pass(&orchestrator(fast_retry(3)), &ctx).await;

    let etcd = report.status("etcd").expect("status recorded");
    assert_eq!(etcd.phase, ComponentPhase::Degraded);
    assert!(etcd.message.as_deref().is_some_and(|m| m.contains("3 attempts")));

    let kas = report.status("kube-apiserver").expect("status recorded");
    assert_eq!(kas.phase, ComponentPhase::BlockedOnDependency);
    assert_eq!(
        kas.message.as_deref(),
        Some("waiting for dependencies: etcd is Degraded")
    );
    assert_eq!(
        report.phase("cluster-autoscaler"),
        Some(ComponentPhase::BlockedOnDependency)
    );
    assert!(writes_named(&store, "kube-apiserver").is_empty());
    assert!(writes_named(&store, "cluster-autoscaler").is_empty());
    assert!(report.converging());
}

#[tokio::test]
async fn test_conflicts_are_retried_within_pass() {
    let store = seeded_store();
    store.inject_conflicts(statefulset_key("etcd"), 2);
    let ctx = context(hosted_control_plane(json!({})), &store);

    let report = run_pass(&orchestrator(fast_retry(5)), &ctx).await;

    assert_eq!(report.phase("etcd"), Some(ComponentPhase::Available));
    assert_eq!(report.phase("kube-apiserver"), Some(ComponentPhase::Available));
    assert_eq!(writes_named(&store, "etcd").len(), 1);
}

#[tokio::test]
async fn test_predicate_false_leaves_objects_untouched() {
    let store = seeded_store();
    let existing: kube::core::DynamicObject = serde_json::from_value(json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {"name": "cluster-autoscaler", "namespace": NAMESPACE},
        "spec": {"replicas": 1}
    }))
    .expect("valid deployment");
    store.insert(existing).expect("seed deployment");
    let ctx = context(hosted_control_plane(json!({"platform": {"type": "None"}})), &store);

    let report = run_pass(&orchestrator(RetryPolicy::default()), &ctx).await;

    assert_eq!(
        report.phase("cluster-autoscaler"),
        Some(ComponentPhase::PredicateSkipped)
    );
    assert!(writes_named(&store, "cluster-autoscaler").is_empty());
    let deployment = stored(&store, &deployment_key("cluster-autoscaler"));
    assert_eq!(deployment["spec"], json!({"replicas": 1}));
    assert!(report.all_available());
}

#[tokio::test]
async fn test_disable_annotation_scales_autoscaler_to_zero() {
    let store = seeded_store();
    let hcp = annotated(
        hosted_control_plane(json!({})),
        DISABLE_CLUSTER_AUTOSCALER_ANNOTATION,
        "true",
    );
    let ctx = context(hcp, &store);

    let report = run_pass(&orchestrator(RetryPolicy::default()), &ctx).await;

    let deployment = stored(&store, &deployment_key("cluster-autoscaler"));
    assert_eq!(deployment["spec"]["replicas"], 0);
    assert_eq!(report.phase("cluster-autoscaler"), Some(ComponentPhase::Available));
}

#[tokio::test]
async fn test_autoscaler_image_override_and_kubeconfig() {
    let store = seeded_store();
    let hcp = annotated(
        hosted_control_plane(json!({})),
        CLUSTER_AUTOSCALER_IMAGE_ANNOTATION,
        "registry.example.com/autoscaler:dev",
    );
    let ctx = context(hcp, &store);

    run_pass(&orchestrator(RetryPolicy::default()), &ctx).await;

    let pod = &stored(&store, &deployment_key("cluster-autoscaler"))["spec"]["template"]["spec"];
    let container = pod["containers"]
        .as_array()
        .and_then(|c| c.iter().find(|c| c["name"] == "cluster-autoscaler"))
        .expect("autoscaler container");
    assert_eq!(container["image"], "registry.example.com/autoscaler:dev");

    let kubeconfig = pod["volumes"]
        .as_array()
        .and_then(|v| v.iter().find(|v| v["name"] == "kubeconfig"))
        .expect("kubeconfig volume");
    assert_eq!(kubeconfig["secret"]["secretName"], "example-x7k2p-kubeconfig");
    assert_eq!(pod["initContainers"][0]["name"], "availability-prober");
}

#[tokio::test]
async fn test_karpenter_operator_requires_auto_node() {
    let store = seeded_store();
    let ctx = context(
        hosted_control_plane(json!({"autoNode": {"roleArn": "arn:aws:iam::123:role/karpenter"}})),
        &store,
    );

    let report = run_pass(&orchestrator(RetryPolicy::default()), &ctx).await;

    assert_eq!(report.phase("karpenter-operator"), Some(ComponentPhase::Available));
    let pod = &stored(&store, &deployment_key("karpenter-operator"))["spec"]["template"]["spec"];
    let proxy_args: Vec<String> = pod["containers"]
        .as_array()
        .into_iter()
        .flatten()
        .filter(|c| c["name"] != "karpenter-operator")
        .flat_map(|c| c["args"].as_array().cloned().unwrap_or_default())
        .filter_map(|a| a.as_str().map(str::to_string))
        .collect();
    assert!(proxy_args.contains(&"--connect-directly-to-cloud-apis=true".to_string()));
}

#[tokio::test]
async fn test_highly_available_etcd_lists_every_member() {
    let store = seeded_store();
    let ctx = context(
        hosted_control_plane(json!({"controllerAvailabilityPolicy": "HighlyAvailable"})),
        &store,
    );

    run_pass(&orchestrator(RetryPolicy::default()), &ctx).await;

    let statefulset = stored(&store, &statefulset_key("etcd"));
    assert_eq!(statefulset["spec"]["replicas"], 3);
    let args = statefulset["spec"]["template"]["spec"]["containers"][0]["args"].to_string();
    for member in 0..3 {
        assert!(args.contains(&format!(
            "etcd-{member}=https://etcd-{member}.etcd-discovery.{NAMESPACE}.svc:2380"
        )));
    }
}

#[tokio::test]
async fn test_progressing_dependency_blocks_unless_allowed() {
    let store = Arc::new(MemoryObjectStore::new());
    store
        .insert(secret("kas-server-crt", "tls.crt", "certificate-v1"))
        .expect("seed secret");
    store
        .insert(config_map("kas-config", "config.json", "{}"))
        .expect("seed configmap");
    let ctx = context(hosted_control_plane(json!({})), &store);

    let strict = run_pass(&orchestrator(RetryPolicy::default()), &ctx).await;
    assert_eq!(strict.phase("etcd"), Some(ComponentPhase::Progressing));
    assert_eq!(
        strict.phase("kube-apiserver"),
        Some(ComponentPhase::BlockedOnDependency)
    );

    let relaxed = Orchestrator::new(
        Arc::new(default_registry().expect("catalog is valid")),
        OrchestratorSettings {
            allow_progressing_dependencies: true,
            ..OrchestratorSettings::default()
        },
    );
    let report = run_pass(&relaxed, &ctx).await;
    assert_eq!(report.phase("kube-apiserver"), Some(ComponentPhase::Progressing));
    assert!(report.converging());
}

#[tokio::test]
async fn test_cancelled_pass_leaves_components_pending() {
    let store = seeded_store();
    let ctx = context(hosted_control_plane(json!({})), &store);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = orchestrator(RetryPolicy::default()).reconcile(&ctx, &cancel).await;

    assert!(report.cancelled);
    assert!(report
        .statuses
        .iter()
        .all(|s| s.phase == ComponentPhase::Pending));
    assert_eq!(report.statuses.len(), 4);
    assert_eq!(store.write_count(), 0);
}
