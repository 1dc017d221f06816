//! Cycle detection and topological ordering over `dependsOn` edges.
//!
//! An edge A → B means "A's `depends_on` includes B". Edges to paths that are
//! not in the list are ignored.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use cloneforge_shared::PageDependency;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Unvisited,
    Active,
    Done,
}

/// Outcome of [`detect_circular_dependency`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleDetection {
    pub has_circular: bool,
    /// The cycle as a path whose first and last elements are the same node.
    pub cycle: Option<Vec<String>>,
}

type Adjacency<'a> = HashMap<&'a str, &'a [String]>;

fn adjacency(deps: &[PageDependency]) -> Adjacency<'_> {
    let mut adj = HashMap::with_capacity(deps.len());
    for dep in deps {
        adj.entry(dep.path.as_str())
            .or_insert(dep.depends_on.as_slice());
    }
    adj
}

/// Find the first cycle reachable in list order, if any.
///
/// Depth-first with three-state marking; reaching an active node closes a
/// cycle, reported from that node to the current one plus the closing edge.
/// The walk keeps its own stack, so chain length is bounded by memory only.
pub fn detect_circular_dependency(deps: &[PageDependency]) -> CycleDetection {
    let adj = adjacency(deps);
    let mut state: HashMap<&str, Visit> = HashMap::with_capacity(adj.len());

    for dep in deps {
        let node = dep.path.as_str();
        if state.get(node).copied().unwrap_or(Visit::Unvisited) != Visit::Unvisited {
            continue;
        }
        if let Some(cycle) = visit(node, &adj, &mut state) {
            return CycleDetection {
                has_circular: true,
                cycle: Some(cycle),
            };
        }
    }

    CycleDetection {
        has_circular: false,
        cycle: None,
    }
}

/// Iterative DFS from `root`. Each frame is a node and the index of the next
/// edge to follow; the frames double as the current path.
fn visit<'a>(
    root: &'a str,
    adj: &Adjacency<'a>,
    state: &mut HashMap<&'a str, Visit>,
) -> Option<Vec<String>> {
    let mut stack: Vec<(&'a str, usize)> = vec![(root, 0)];
    state.insert(root, Visit::Active);

    while let Some(frame) = stack.last_mut() {
        let (node, next_edge) = *frame;
        let edges: &[String] = adj.get(node).copied().unwrap_or_default();

        let Some(next) = edges.get(next_edge) else {
            state.insert(node, Visit::Done);
            stack.pop();
            continue;
        };
        frame.1 += 1;

        let next = next.as_str();
        if !adj.contains_key(next) {
            continue;
        }
        match state.get(next).copied().unwrap_or(Visit::Unvisited) {
            Visit::Active => {
                let start = stack.iter().position(|(p, _)| *p == next).unwrap_or(0);
                let mut cycle: Vec<String> =
                    stack[start..].iter().map(|(p, _)| p.to_string()).collect();
                cycle.push(next.to_string());
                return Some(cycle);
            }
            Visit::Unvisited => {
                state.insert(next, Visit::Active);
                stack.push((next, 0));
            }
            Visit::Done => {}
        }
    }

    None
}

/// Order `deps` so every node comes after the nodes it depends on.
///
/// Post-order DFS over a visited set, driven by an explicit stack; on cyclic
/// input it still terminates, but the order inside a cycle is arbitrary.
pub fn topological_sort(deps: &[PageDependency]) -> Vec<PageDependency> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(deps.len());
    for (i, dep) in deps.iter().enumerate() {
        index.entry(dep.path.as_str()).or_insert(i);
    }

    let mut visited = HashSet::with_capacity(deps.len());
    let mut order = Vec::with_capacity(deps.len());
    for i in 0..deps.len() {
        post_order(i, deps, &index, &mut visited, &mut order);
    }

    order.into_iter().map(|i| deps[i].clone()).collect()
}

fn post_order(
    root: usize,
    deps: &[PageDependency],
    index: &HashMap<&str, usize>,
    visited: &mut HashSet<usize>,
    order: &mut Vec<usize>,
) {
    if !visited.insert(root) {
        return;
    }
    let mut stack: Vec<(usize, usize)> = vec![(root, 0)];

    while let Some(frame) = stack.last_mut() {
        let (i, next_edge) = *frame;
        let Some(dep_path) = deps[i].depends_on.get(next_edge) else {
            order.push(i);
            stack.pop();
            continue;
        };
        frame.1 += 1;

        if let Some(&j) = index.get(dep_path.as_str()) {
            if visited.insert(j) {
                stack.push((j, 0));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloneforge_shared::{DependencyKind, DependencyStatus};

    fn dep(path: &str, depends_on: &[&str]) -> PageDependency {
        PageDependency::new(DependencyKind::Component, path, DependencyStatus::NeedsCreation)
            .with_depends_on(depends_on.iter().copied())
    }

    fn assert_topological(sorted: &[PageDependency]) {
        let position: HashMap<&str, usize> = sorted
            .iter()
            .enumerate()
            .map(|(i, d)| (d.path.as_str(), i))
            .collect();
        for (i, d) in sorted.iter().enumerate() {
            for parent in &d.depends_on {
                if let Some(&j) = position.get(parent.as_str()) {
                    assert!(j < i, "{parent} must precede {}", d.path);
                }
            }
        }
    }

    #[test]
    fn two_node_cycle() {
        let deps = [dep("A", &["B"]), dep("B", &["A"])];
        let found = detect_circular_dependency(&deps);
        assert!(found.has_circular);
        assert_eq!(found.cycle.unwrap(), ["A", "B", "A"]);
    }

    #[test]
    fn cycle_reported_from_reentered_node() {
        let deps = [
            dep("page", &["x"]),
            dep("x", &["y"]),
            dep("y", &["z"]),
            dep("z", &["x"]),
        ];
        let cycle = detect_circular_dependency(&deps).cycle.unwrap();
        assert_eq!(cycle, ["x", "y", "z", "x"]);
        assert_eq!(cycle.first(), cycle.last());
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let cycle = detect_circular_dependency(&[dep("A", &["A"])]).cycle.unwrap();
        assert_eq!(cycle, ["A", "A"]);
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let deps = [
            dep("top", &["left", "right"]),
            dep("left", &["bottom"]),
            dep("right", &["bottom"]),
            dep("bottom", &[]),
        ];
        assert_eq!(
            detect_circular_dependency(&deps),
            CycleDetection {
                has_circular: false,
                cycle: None
            }
        );
    }

    #[test]
    fn unknown_targets_are_ignored() {
        let deps = [dep("A", &["external/lib"])];
        assert!(!detect_circular_dependency(&deps).has_circular);
        assert_eq!(topological_sort(&deps).len(), 1);
    }

    #[test]
    fn sort_puts_dependencies_first() {
        let deps = [
            dep("page", &["hero", "footer"]),
            dep("hero", &["service"]),
            dep("footer", &["data"]),
            dep("service", &["data"]),
            dep("data", &[]),
        ];
        let sorted = topological_sort(&deps);
        assert_eq!(sorted.len(), deps.len());
        assert_topological(&sorted);
        assert_eq!(sorted.last().unwrap().path, "page");
    }

    #[test]
    fn sort_handles_many_acyclic_shapes() {
        // Chains written in reverse, fan-outs and fan-ins.
        for width in 1..6 {
            let mut deps = Vec::new();
            for i in (0..width).rev() {
                let name = format!("n{i}");
                let targets: Vec<String> = (i + 1..width).map(|j| format!("n{j}")).collect();
                deps.push(
                    PageDependency::new(
                        DependencyKind::Data,
                        name,
                        DependencyStatus::NeedsCreation,
                    )
                    .with_depends_on(targets),
                );
            }
            let sorted = topological_sort(&deps);
            assert_eq!(sorted.len(), width);
            assert_topological(&sorted);
        }
    }

    #[test]
    fn long_chains_do_not_exhaust_the_stack() {
        const LEN: usize = 100_000;
        let mut deps: Vec<PageDependency> = (0..LEN)
            .map(|i| {
                let next = format!("n{}", i + 1);
                dep(&format!("n{i}"), &[next.as_str()])
            })
            .collect();

        assert!(!detect_circular_dependency(&deps).has_circular);
        let sorted = topological_sort(&deps);
        assert_eq!(sorted.len(), LEN);
        assert_eq!(sorted.first().unwrap().path, format!("n{}", LEN - 1));
        assert_eq!(sorted.last().unwrap().path, "n0");

        deps.last_mut().unwrap().depends_on = vec!["n0".into()];
        let cycle = detect_circular_dependency(&deps).cycle.unwrap();
        assert_eq!(cycle.len(), LEN + 1);
        assert_eq!(cycle.first(), cycle.last());
    }

    #[test]
    fn sort_terminates_on_cycles() {
        let deps = [dep("A", &["B"]), dep("B", &["A"])];
        assert_eq!(topological_sort(&deps).len(), 2);
    }
}
