//! Dependency graph sanitation and cycle detection.
//!
//! Declared dependencies come from an external board and may point at issues
//! that do not exist, encode ordering without any shared resource, or compose
//! into a cycle. Unsafe edges are pruned first, then Tarjan's strongly
//! connected components run over what survives. A cyclic graph is returned for
//! display but must not be treated as dispatch-safe.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::path::{any_overlap, is_doc_path};
use crate::core::refs::parse_issue_ref;

/// Input node: one issue and its raw dependency references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraphNode {
    pub number: u64,
    /// Raw references (`"#12"`, `"12"`); anything unparseable is a dead ref.
    pub depends_on: Vec<String>,
    pub owns_paths: Vec<String>,
    pub touch_paths: Vec<String>,
}

/// Output node with only the surviving edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizedNode {
    pub number: u64,
    pub depends_on: Vec<u64>,
    pub owns_paths: Vec<String>,
    pub touch_paths: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DropReason {
    /// Target is not an issue number or not a known node.
    DeadRef,
    /// Doc-only work would block non-doc work.
    DocBlocker,
    /// Both sides own paths and none of them overlap.
    NoOverlap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedEdge {
    pub from: u64,
    pub to: String,
    pub reason: DropReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizeReport {
    /// Dropped edges in evaluation order.
    pub dropped_edges: Vec<DroppedEdge>,
    /// Sorted member lists, ordered by smallest member.
    pub cycles: Vec<Vec<u64>>,
}

/// Raised when the sanitized graph still contains cycles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dependency cycle(s) detected: {}", format_cycles(.cycles))]
pub struct CycleError {
    pub cycles: Vec<Vec<u64>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedGraph {
    /// Nodes ascending by number.
    pub items: Vec<SanitizedNode>,
    pub report: SanitizeReport,
    pub error: Option<CycleError>,
}

/// Prune unsafe edges and detect cycles.
///
/// Edges are evaluated in declaration order; the first matching rule drops an
/// edge (`DEAD_REF`, then `DOC_BLOCKER`, then `NO_OVERLAP`). When a number
/// appears more than once, the first node wins.
pub fn sanitize_dependency_graph(nodes: &[DependencyGraphNode]) -> SanitizedGraph {
    let mut known: BTreeMap<u64, &DependencyGraphNode> = BTreeMap::new();
    let mut declared: Vec<&DependencyGraphNode> = Vec::with_capacity(nodes.len());
    for node in nodes {
        if !known.contains_key(&node.number) {
            known.insert(node.number, node);
            declared.push(node);
        }
    }
    let doc_only: BTreeMap<u64, bool> = known
        .iter()
        .map(|(number, node)| (*number, is_doc_only(node)))
        .collect();

    let mut report = SanitizeReport::default();
    let mut kept: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    for node in declared {
        let from = node.number;
        let from_doc_only = doc_only[&from];
        let edges = kept.entry(from).or_default();
        for raw in &node.depends_on {
            let target = parse_issue_ref(raw).and_then(|to| known.get(&to).map(|n| (to, *n)));
            let reason = match target {
                None => Some(DropReason::DeadRef),
                Some((to, _)) if doc_only[&to] && !from_doc_only => Some(DropReason::DocBlocker),
                Some((_, target)) if lacks_overlap(node, target) => Some(DropReason::NoOverlap),
                Some(_) => None,
            };
            match (reason, target) {
                (Some(reason), _) => report.dropped_edges.push(DroppedEdge {
                    from,
                    to: raw.trim().to_string(),
                    reason,
                }),
                (None, Some((to, _))) => {
                    if !edges.contains(&to) {
                        edges.push(to);
                    }
                }
                (None, None) => {}
            }
        }
    }

    let items: Vec<SanitizedNode> = known
        .iter()
        .map(|(number, node)| SanitizedNode {
            number: *number,
            depends_on: kept.remove(number).unwrap_or_default(),
            owns_paths: node.owns_paths.clone(),
            touch_paths: node.touch_paths.clone(),
        })
        .collect();
    report.cycles = find_cycles(&items);

    let error = (!report.cycles.is_empty()).then(|| CycleError {
        cycles: report.cycles.clone(),
    });
    SanitizedGraph {
        items,
        report,
        error,
    }
}

/// Cycles among already-sanitized nodes, as sorted member lists ordered by
/// smallest member. Edges to unknown numbers are ignored.
pub fn find_cycles(items: &[SanitizedNode]) -> Vec<Vec<u64>> {
    let mut numbers: Vec<u64> = items.iter().map(|item| item.number).collect();
    numbers.sort_unstable();
    numbers.dedup();
    let position: BTreeMap<u64, usize> = numbers
        .iter()
        .enumerate()
        .map(|(idx, number)| (*number, idx))
        .collect();
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); numbers.len()];
    for item in items {
        let from = position[&item.number];
        adjacency[from].extend(item.depends_on.iter().filter_map(|dep| position.get(dep)));
    }
    for targets in &mut adjacency {
        targets.sort_unstable();
        targets.dedup();
    }

    let mut cycles: Vec<Vec<u64>> = strongly_connected_components(&adjacency)
        .into_iter()
        .filter(|component| match component.as_slice() {
            [single] => adjacency[*single].contains(single),
            _ => true,
        })
        .map(|component| {
            let mut members: Vec<u64> = component.iter().map(|idx| numbers[*idx]).collect();
            members.sort_unstable();
            members
        })
        .collect();
    cycles.sort();
    cycles
}

/// Doc-only nodes have at least one touch path and every one is documentation.
fn is_doc_only(node: &DependencyGraphNode) -> bool {
    !node.touch_paths.is_empty() && node.touch_paths.iter().all(|path| is_doc_path(path))
}

fn lacks_overlap(from: &DependencyGraphNode, to: &DependencyGraphNode) -> bool {
    !from.owns_paths.is_empty()
        && !to.owns_paths.is_empty()
        && !any_overlap(&from.owns_paths, &to.owns_paths)
}

/// Tarjan's SCC over an index arena, with an explicit call stack.
///
/// Roots are visited in ascending index order so results are stable.
fn strongly_connected_components(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    const UNVISITED: usize = usize::MAX;

    let count = adjacency.len();
    let mut index = vec![UNVISITED; count];
    let mut lowlink = vec![0usize; count];
    let mut on_stack = vec![false; count];
    let mut stack: Vec<usize> = Vec::new();
    let mut frames: Vec<(usize, usize)> = Vec::new();
    let mut next_index = 0usize;
    let mut components = Vec::new();

    for root in 0..count {
        if index[root] != UNVISITED {
            continue;
        }
        index[root] = next_index;
        lowlink[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;
        frames.push((root, 0));

        while let Some(frame) = frames.last_mut() {
            let node = frame.0;
            if let Some(&next) = adjacency[node].get(frame.1) {
                frame.1 += 1;
                if index[next] == UNVISITED {
                    index[next] = next_index;
                    lowlink[next] = next_index;
                    next_index += 1;
                    stack.push(next);
                    on_stack[next] = true;
                    frames.push((next, 0));
                } else if on_stack[next] {
                    lowlink[node] = lowlink[node].min(index[next]);
                }
                continue;
            }

            frames.pop();
            if let Some(&(parent, _)) = frames.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[node]);
            }
            if lowlink[node] == index[node] {
                let mut component = Vec::new();
                while let Some(member) = stack.pop() {
                    on_stack[member] = false;
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                components.push(component);
            }
        }
    }

    components
}

fn format_cycles(cycles: &[Vec<u64>]) -> String {
    cycles
        .iter()
        .map(|cycle| {
            let members: Vec<String> = cycle.iter().map(|n| format!("#{n}")).collect();
            format!("[{}]", members.join(", "))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(number: u64, depends_on: &[&str], owns: &[&str], touch: &[&str]) -> DependencyGraphNode {
        DependencyGraphNode {
            number,
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            owns_paths: owns.iter().map(|s| s.to_string()).collect(),
            touch_paths: touch.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn mutual_dependency_with_overlap_is_a_cycle() {
        let graph = sanitize_dependency_graph(&[
            node(9, &["#4"], &["apps/api"], &["apps/api"]),
            node(4, &["#9"], &["apps/api/src"], &["apps/api"]),
        ]);
        let error = graph.error.expect("cycle error");
        assert_eq!(error.cycles, vec![vec![4, 9]]);
        assert_eq!(graph.report.cycles, vec![vec![4, 9]]);
        assert!(graph.report.dropped_edges.is_empty());
        assert_eq!(graph.items[0].number, 4);
        assert_eq!(graph.items[0].depends_on, vec![9]);
    }

    #[test]
    fn dead_refs_are_dropped_first() {
        let graph = sanitize_dependency_graph(&[
            node(1, &["#99", "abc", "#2"], &["apps/api"], &["docs/readme.md"]),
            node(2, &[], &["docs"], &["docs/guide.md"]),
        ]);
        let reasons: Vec<(String, DropReason)> = graph
            .report
            .dropped_edges
            .iter()
            .map(|edge| (edge.to.clone(), edge.reason))
            .collect();
        assert_eq!(
            reasons,
            vec![
                ("#99".to_string(), DropReason::DeadRef),
                ("abc".to_string(), DropReason::DeadRef),
                ("#2".to_string(), DropReason::NoOverlap),
            ]
        );
        assert!(graph.error.is_none());
    }

    #[test]
    fn doc_only_work_never_blocks_code() {
        let graph = sanitize_dependency_graph(&[
            node(1, &["#2"], &["apps/api"], &["apps/api/src/lib.rs"]),
            node(2, &[], &["apps/api"], &["docs/api.md", "CHANGELOG.md"]),
        ]);
        assert_eq!(graph.report.dropped_edges[0].reason, DropReason::DocBlocker);
        assert!(graph.items[0].depends_on.is_empty());
    }

    #[test]
    fn doc_only_may_depend_on_doc_only() {
        let graph = sanitize_dependency_graph(&[
            node(1, &["#2"], &[], &["docs/a.md"]),
            node(2, &[], &[], &["docs/b.md"]),
        ]);
        assert!(graph.report.dropped_edges.is_empty());
        assert_eq!(graph.items[0].depends_on, vec![2]);
    }

    #[test]
    fn empty_ownership_skips_overlap_rule() {
        let graph = sanitize_dependency_graph(&[
            node(1, &["#2"], &[], &["src/a.rs"]),
            node(2, &[], &["packages/ui"], &["packages/ui/x.ts"]),
        ]);
        assert!(graph.report.dropped_edges.is_empty());
        assert_eq!(graph.items[0].depends_on, vec![2]);
    }

    #[test]
    fn self_loop_counts_as_cycle() {
        let graph = sanitize_dependency_graph(&[node(5, &["#5"], &["apps"], &["apps/x"])]);
        assert_eq!(graph.report.cycles, vec![vec![5]]);
        assert!(graph.error.is_some());
    }

    #[test]
    fn cycles_sorted_by_smallest_member() {
        let graph = sanitize_dependency_graph(&[
            node(10, &["#11"], &[], &[]),
            node(11, &["#10"], &[], &[]),
            node(3, &["#7"], &[], &[]),
            node(7, &["#8"], &[], &[]),
            node(8, &["#3"], &[], &[]),
            node(20, &["#3"], &[], &[]),
        ]);
        assert_eq!(graph.report.cycles, vec![vec![3, 7, 8], vec![10, 11]]);
        let error = graph.error.expect("cycle error");
        assert_eq!(
            error.to_string(),
            "dependency cycle(s) detected: [#3, #7, #8]; [#10, #11]"
        );
    }

    #[test]
    fn long_chain_is_acyclic_without_recursion() {
        let nodes: Vec<DependencyGraphNode> = (1..=20_000u64)
            .map(|n| {
                let deps = if n < 20_000 {
                    vec![format!("#{}", n + 1)]
                } else {
                    Vec::new()
                };
                DependencyGraphNode {
                    number: n,
                    depends_on: deps,
                    owns_paths: Vec::new(),
                    touch_paths: Vec::new(),
                }
            })
            .collect();
        let graph = sanitize_dependency_graph(&nodes);
        assert!(graph.error.is_none());
        assert_eq!(graph.items.len(), 20_000);
    }

    #[test]
    fn find_cycles_checks_edges_added_after_pruning() {
        let sanitized = |number: u64, depends_on: Vec<u64>| SanitizedNode {
            number,
            depends_on,
            owns_paths: Vec::new(),
            touch_paths: Vec::new(),
        };
        let items = vec![
            sanitized(1, vec![3]),
            sanitized(2, vec![1, 99]),
            sanitized(3, vec![2]),
            sanitized(4, Vec::new()),
        ];
        assert_eq!(find_cycles(&items), vec![vec![1, 2, 3]]);
        assert!(find_cycles(&items[1..]).is_empty());
    }
}
