//! # Dependency Resolver
//!
//! Two halves:
//!
//! - [`resolve_order`] runs once at startup and turns declared dependencies
//!   into a reconciliation order (Kahn's algorithm). Independent components
//!   keep their registration order so passes are reproducible.
//! - [`check_dependencies`] runs per component per pass and decides whether
//!   its dependencies are ready for it, based on the statuses recorded
//!   earlier in the same pass.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::fmt;

use crate::component::{Component, ConfigurationError};
use crate::crd::{ComponentPhase, ComponentStatus};

/// Reconciliation order as indices into `components`
///
/// # Errors
///
/// - a dependency names a component that is not registered
/// - the dependency graph contains a cycle (the error carries one cycle path)
pub fn resolve_order(components: &[Component]) -> Result<Vec<usize>, ConfigurationError> {
    let index: HashMap<&str, usize> = components
        .iter()
        .enumerate()
        .map(|(i, c)| (c.name(), i))
        .collect();

    let n = components.len();
    let mut out: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut indeg = vec![0usize; n];
    for (i, component) in components.iter().enumerate() {
        for dependency in component.dependencies() {
            let &d = index.get(dependency.as_str()).ok_or_else(|| {
                ConfigurationError::UnresolvedDependency {
                    component: component.name().to_string(),
                    dependency: dependency.clone(),
                }
            })?;
            out[d].push(i);
            indeg[i] += 1;
        }
    }

    // Min-heap on registration index keeps independent components in order
    let mut ready: BinaryHeap<Reverse<usize>> = indeg
        .iter()
        .enumerate()
        .filter(|&(_, &d)| d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();
    let mut remaining = indeg.clone();
    let mut order = Vec::with_capacity(n);
    while let Some(Reverse(u)) = ready.pop() {
        order.push(u);
        for &v in &out[u] {
            remaining[v] -= 1;
            if remaining[v] == 0 {
                ready.push(Reverse(v));
            }
        }
    }

    if order.len() == n {
        return Ok(order);
    }

    let cycle = find_cycle(&out, &remaining)
        .unwrap_or_else(|| (0..n).filter(|&i| remaining[i] > 0).collect());
    Err(ConfigurationError::DependencyCycle {
        cycle: cycle.into_iter().map(|i| components[i].name().to_string()).collect(),
    })
}

/// One cycle among the nodes Kahn's algorithm could not place, closed on its first node
fn find_cycle(out: &[Vec<usize>], remaining: &[usize]) -> Option<Vec<usize>> {
    fn dfs(
        u: usize,
        out: &[Vec<usize>],
        remaining: &[usize],
        state: &mut [u8],
        stack: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        state[u] = 1;
        stack.push(u);
        for &v in &out[u] {
            if remaining[v] == 0 {
                continue;
            }
            match state[v] {
                0 => {
                    if let Some(cycle) = dfs(v, out, remaining, state, stack) {
                        return Some(cycle);
                    }
                }
                1 => {
                    let start = stack.iter().position(|&node| node == v)?;
                    let mut cycle = stack[start..].to_vec();
                    cycle.push(v);
                    return Some(cycle);
                }
                _ => {}
            }
        }
        stack.pop();
        state[u] = 2;
        None
    }

    let mut state = vec![0u8; out.len()];
    let mut stack = Vec::new();
    (0..out.len())
        .filter(|&u| remaining[u] > 0)
        .find_map(|u| {
            if state[u] != 0 {
                return None;
            }
            dfs(u, out, remaining, &mut state, &mut stack)
        })
}

/// A dependency that is not ready for its dependents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmetDependency {
    pub name: String,
    /// Phase recorded this pass, `None` if it has not been reconciled yet
    pub phase: Option<ComponentPhase>,
}

impl fmt::Display for UnmetDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.phase {
            Some(phase) => write!(f, "{} is {phase}", self.name),
            None => write!(f, "{} has not been reconciled", self.name),
        }
    }
}

/// Outcome of the per-pass dependency check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Blocked(Vec<UnmetDependency>),
}

impl Readiness {
    /// Status message listing the unmet dependencies
    #[must_use]
    pub fn message(&self) -> Option<String> {
        match self {
            Readiness::Ready => None,
            Readiness::Blocked(unmet) => Some(format!(
                "waiting for dependencies: {}",
                unmet.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
            )),
        }
    }
}

/// Check a component's dependencies against this pass's statuses
///
/// Only `Available` satisfies a dependency, or `Progressing` when
/// `allow_progressing` is set. A dependency whose predicate skipped it is not
/// ready either.
#[must_use]
pub fn check_dependencies(
    component: &Component,
    statuses: &BTreeMap<String, ComponentStatus>,
    allow_progressing: bool,
) -> Readiness {
    let unmet: Vec<UnmetDependency> = component
        .dependencies()
        .iter()
        .filter_map(|name| match statuses.get(name) {
            Some(status) if status.satisfies_dependents(allow_progressing) => None,
            Some(status) => Some(UnmetDependency {
                name: name.clone(),
                phase: Some(status.phase),
            }),
            None => Some(UnmetDependency {
                name: name.clone(),
                phase: None,
            }),
        })
        .collect();

    if unmet.is_empty() {
        Readiness::Ready
    } else {
        Readiness::Blocked(unmet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPLOYMENT: &str = r"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: placeholder
spec:
  selector:
    matchLabels:
      app: placeholder
  template:
    spec:
      containers:
      - name: main
";

    fn component(name: &str, dependencies: &[&str]) -> Component {
        Component::deployment(name)
            .with_workload(DEPLOYMENT)
            .with_dependencies(dependencies.iter().copied())
            .build()
            .expect("valid component")
    }

    fn names(components: &[Component], order: &[usize]) -> Vec<String> {
        order.iter().map(|&i| components[i].name().to_string()).collect()
    }

    #[test]
    fn test_dependencies_come_first() {
        let components = vec![
            component("cluster-autoscaler", &["kube-apiserver"]),
            component("kube-apiserver", &["etcd"]),
            component("etcd", &[]),
        ];
        let order = resolve_order(&components).expect("acyclic");
        assert_eq!(
            names(&components, &order),
            vec!["etcd", "kube-apiserver", "cluster-autoscaler"]
        );
    }

    #[test]
    fn test_independent_components_keep_registration_order() {
        let components = vec![
            component("c", &[]),
            component("a", &[]),
            component("d", &["c"]),
            component("b", &[]),
        ];
        let order = resolve_order(&components).expect("acyclic");
        assert_eq!(names(&components, &order), vec!["c", "a", "d", "b"]);
    }

    #[test]
    fn test_diamond() {
        let components = vec![
            component("top", &["left", "right"]),
            component("left", &["base"]),
            component("right", &["base"]),
            component("base", &[]),
        ];
        let order = resolve_order(&components).expect("acyclic");
        assert_eq!(names(&components, &order), vec!["base", "left", "right", "top"]);
    }

    #[test]
    fn test_cycle_is_reported_as_path() {
        let components = vec![
            component("a", &["b"]),
            component("b", &["a"]),
            component("c", &[]),
        ];
        let err = resolve_order(&components).unwrap_err();
        let ConfigurationError::DependencyCycle { cycle } = err else {
            panic!("expected cycle, got {err:?}");
        };
        assert_eq!(cycle.first(), cycle.last());
        assert!(cycle.contains(&"a".to_string()));
        assert!(cycle.contains(&"b".to_string()));
        assert!(!cycle.contains(&"c".to_string()));
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        let components = vec![component("kube-apiserver", &["etcd"])];
        assert_eq!(
            resolve_order(&components).unwrap_err(),
            ConfigurationError::UnresolvedDependency {
                component: "kube-apiserver".into(),
                dependency: "etcd".into(),
            }
        );
    }

    #[test]
    fn test_blocked_until_dependency_available() {
        let kas = component("kube-apiserver", &["etcd"]);
        let mut statuses = BTreeMap::new();
        assert_eq!(
            check_dependencies(&kas, &statuses, false),
            Readiness::Blocked(vec![UnmetDependency {
                name: "etcd".into(),
                phase: None
            }])
        );

        let mut etcd = ComponentStatus::new("etcd");
        etcd.phase = ComponentPhase::Progressing;
        statuses.insert("etcd".to_string(), etcd.clone());
        assert!(matches!(check_dependencies(&kas, &statuses, false), Readiness::Blocked(_)));
        assert_eq!(check_dependencies(&kas, &statuses, true), Readiness::Ready);

        etcd.phase = ComponentPhase::Available;
        statuses.insert("etcd".to_string(), etcd);
        assert_eq!(check_dependencies(&kas, &statuses, false), Readiness::Ready);
    }

    #[test]
    fn test_blocked_message_names_dependency() {
        let readiness = Readiness::Blocked(vec![UnmetDependency {
            name: "etcd".into(),
            phase: Some(ComponentPhase::Degraded),
        }]);
        assert_eq!(
            readiness.message().as_deref(),
            Some("waiting for dependencies: etcd is Degraded")
        );
    }
}
