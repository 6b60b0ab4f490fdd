//! 任务树不变量的离线审计
//!
//! 输入为一棵树的全部存储行，输出所有被破坏的不变量。所有检查都只依赖
//! 节点自身与其直接子节点的存储值，因此即使树已损坏（例如存在环）也能终止。

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::aggregation::expected_aggregates;
use crate::entities::{TaskId, TaskNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    Parent,
    FirstChild,
    NextSibling,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKind::Parent => write!(f, "parent"),
            LinkKind::FirstChild => write!(f, "first_child"),
            LinkKind::NextSibling => write!(f, "next_sibling"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeInvariantViolation {
    RootCount {
        count: usize,
    },
    RootMismatch {
        found: TaskId,
    },
    DanglingLink {
        node: TaskId,
        link: LinkKind,
        target: TaskId,
    },
    AncestorCycle {
        node: TaskId,
    },
    SiblingRepeat {
        parent: TaskId,
        node: TaskId,
    },
    ForeignSibling {
        parent: TaskId,
        node: TaskId,
    },
    MissingFromChain {
        parent: TaskId,
        node: TaskId,
    },
    CountMismatch {
        node: TaskId,
        field: &'static str,
        stored: u64,
        expected: u64,
    },
}

impl fmt::Display for TreeInvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeInvariantViolation::RootCount { count } => {
                write!(f, "根任务数量应为 1，实际为 {count}")
            }
            TreeInvariantViolation::RootMismatch { found } => {
                write!(f, "根任务 {found} 的ID与项目ID不一致")
            }
            TreeInvariantViolation::DanglingLink { node, link, target } => {
                write!(f, "任务 {node} 的 {link} 指向不存在的任务 {target}")
            }
            TreeInvariantViolation::AncestorCycle { node } => {
                write!(f, "任务 {node} 是自身的祖先")
            }
            TreeInvariantViolation::SiblingRepeat { parent, node } => {
                write!(f, "任务 {parent} 的子链表中 {node} 重复出现")
            }
            TreeInvariantViolation::ForeignSibling { parent, node } => {
                write!(f, "任务 {node} 出现在 {parent} 的子链表中，但父任务不是 {parent}")
            }
            TreeInvariantViolation::MissingFromChain { parent, node } => {
                write!(f, "任务 {node} 的父任务是 {parent}，但不在其子链表中")
            }
            TreeInvariantViolation::CountMismatch {
                node,
                field,
                stored,
                expected,
            } => write!(f, "任务 {node} 的 {field} 为 {stored}，应为 {expected}"),
        }
    }
}

/// 检查一棵树的全部行，返回所有违反的不变量；空结果表示树是一致的
pub fn tree_invariant_violations(
    project: TaskId,
    nodes: &[TaskNode],
) -> Vec<TreeInvariantViolation> {
    let mut violations = Vec::new();
    let by_id: HashMap<TaskId, &TaskNode> = nodes.iter().map(|n| (n.id, n)).collect();
    let mut by_parent: HashMap<TaskId, Vec<&TaskNode>> = HashMap::new();
    for node in nodes {
        if let Some(parent) = node.parent {
            by_parent.entry(parent).or_default().push(node);
        }
    }

    let roots: Vec<&TaskNode> = nodes.iter().filter(|n| n.parent.is_none()).collect();
    if roots.len() != 1 {
        violations.push(TreeInvariantViolation::RootCount { count: roots.len() });
    } else if roots[0].id != project {
        violations.push(TreeInvariantViolation::RootMismatch { found: roots[0].id });
    }

    for node in nodes {
        let links = [
            (LinkKind::Parent, node.parent),
            (LinkKind::FirstChild, node.first_child),
            (LinkKind::NextSibling, node.next_sibling),
        ];
        for (link, target) in links {
            if let Some(target) = target {
                if !by_id.contains_key(&target) {
                    violations.push(TreeInvariantViolation::DanglingLink {
                        node: node.id,
                        link,
                        target,
                    });
                }
            }
        }
    }

    for node in nodes {
        if on_ancestor_cycle(node, &by_id) {
            violations.push(TreeInvariantViolation::AncestorCycle { node: node.id });
        }
    }

    for node in nodes {
        check_sibling_chain(node, &by_id, &by_parent, &mut violations);
    }

    let empty = Vec::new();
    for node in nodes {
        let children = by_parent.get(&node.id).unwrap_or(&empty);
        let (subtree, child_count, descendant_count) = expected_aggregates(node, children);
        let counters = [
            ("child_count", node.child_count, child_count),
            ("descendant_count", node.descendant_count, descendant_count),
            ("subtree_time_minimum", node.subtree.time_minimum, subtree.time_minimum),
            ("subtree_time_estimate", node.subtree.time_estimate, subtree.time_estimate),
            ("subtree_time_incurred", node.subtree.time_incurred, subtree.time_incurred),
            ("subtree_cost_estimate", node.subtree.cost_estimate, subtree.cost_estimate),
            ("subtree_cost_incurred", node.subtree.cost_incurred, subtree.cost_incurred),
            ("subtree_file_count", node.subtree.file_count, subtree.file_count),
            ("subtree_file_size", node.subtree.file_size, subtree.file_size),
        ];
        for (field, stored, expected) in counters {
            if stored != expected {
                violations.push(TreeInvariantViolation::CountMismatch {
                    node: node.id,
                    field,
                    stored,
                    expected,
                });
            }
        }
    }

    violations
}

fn on_ancestor_cycle(node: &TaskNode, by_id: &HashMap<TaskId, &TaskNode>) -> bool {
    let mut current = node.parent;
    // 祖先链长度不可能超过节点总数
    for _ in 0..=by_id.len() {
        match current {
            Some(id) if id == node.id => return true,
            Some(id) => current = by_id.get(&id).and_then(|n| n.parent),
            None => return false,
        }
    }
    false
}

fn check_sibling_chain(
    parent: &TaskNode,
    by_id: &HashMap<TaskId, &TaskNode>,
    by_parent: &HashMap<TaskId, Vec<&TaskNode>>,
    violations: &mut Vec<TreeInvariantViolation>,
) {
    let mut seen = HashSet::new();
    let mut current = parent.first_child;
    while let Some(id) = current {
        if !seen.insert(id) {
            violations.push(TreeInvariantViolation::SiblingRepeat {
                parent: parent.id,
                node: id,
            });
            break;
        }
        let Some(member) = by_id.get(&id) else {
            break;
        };
        if member.parent != Some(parent.id) {
            violations.push(TreeInvariantViolation::ForeignSibling {
                parent: parent.id,
                node: id,
            });
        }
        current = member.next_sibling;
    }

    if let Some(children) = by_parent.get(&parent.id) {
        for child in children {
            if !seen.contains(&child.id) {
                violations.push(TreeInvariantViolation::MissingFromChain {
                    parent: parent.id,
                    node: child.id,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{OwnMetrics, SubtreeMetrics, TenantId, UserId};
    use chrono::Utc;

    fn node(id: TaskId, project: TaskId, parent: Option<TaskId>, estimate: u64) -> TaskNode {
        TaskNode {
            id,
            tenant: TenantId(uuid::Uuid::nil()),
            project,
            parent,
            first_child: None,
            next_sibling: None,
            name: "t".to_string(),
            description: String::new(),
            created_by: UserId(uuid::Uuid::nil()),
            created_on: Utc::now(),
            assigned_user: None,
            is_parallel: false,
            own: OwnMetrics {
                time_estimate: estimate,
                ..Default::default()
            },
            subtree: SubtreeMetrics::default(),
            child_count: 0,
            descendant_count: 0,
        }
    }

    /// P -> [A, C], A -> [B]
    fn consistent_tree() -> (TaskId, Vec<TaskNode>) {
        let (p, a, b, c) = (TaskId::new(), TaskId::new(), TaskId::new(), TaskId::new());
        let mut root = node(p, p, None, 0);
        let mut na = node(a, p, Some(p), 100);
        let nb = node(b, p, Some(a), 50);
        let nc = node(c, p, Some(p), 20);

        na.first_child = Some(b);
        na.next_sibling = Some(c);
        na.child_count = 1;
        na.descendant_count = 1;
        na.subtree.time_estimate = 50;
        na.subtree.time_minimum = 50;

        root.first_child = Some(a);
        root.child_count = 2;
        root.descendant_count = 3;
        root.subtree.time_estimate = 170;
        root.subtree.time_minimum = 170;

        (p, vec![root, na, nb, nc])
    }

    #[test]
    fn test_consistent_tree_has_no_violations() {
        let (p, nodes) = consistent_tree();
        assert_eq!(tree_invariant_violations(p, &nodes), vec![]);
    }

    #[test]
    fn test_parallel_root_is_checked_with_max() {
        let (p, mut nodes) = consistent_tree();
        nodes[0].is_parallel = true;
        let violations = tree_invariant_violations(p, &nodes);
        assert_eq!(
            violations,
            vec![TreeInvariantViolation::CountMismatch {
                node: p,
                field: "subtree_time_minimum",
                stored: 170,
                expected: 150,
            }]
        );
    }

    #[test]
    fn test_detects_counter_drift() {
        let (p, mut nodes) = consistent_tree();
        nodes[1].descendant_count = 2;
        let violations = tree_invariant_violations(p, &nodes);
        assert!(violations.contains(&TreeInvariantViolation::CountMismatch {
            node: nodes[1].id,
            field: "descendant_count",
            stored: 2,
            expected: 1,
        }));
        // 父任务按子任务的存储值检查，同样会报告
        assert!(violations.iter().any(|v| matches!(
            v,
            TreeInvariantViolation::CountMismatch { node, field: "descendant_count", .. }
                if *node == p
        )));
    }

    #[test]
    fn test_detects_sibling_loop_and_missing_member() {
        let (p, mut nodes) = consistent_tree();
        let a = nodes[1].id;
        // C -> A 形成环
        nodes[3].next_sibling = Some(a);
        let violations = tree_invariant_violations(p, &nodes);
        assert!(violations.contains(&TreeInvariantViolation::SiblingRepeat { parent: p, node: a }));

        let (p, mut nodes) = consistent_tree();
        let c = nodes[3].id;
        nodes[1].next_sibling = None;
        assert_eq!(
            tree_invariant_violations(p, &nodes),
            vec![TreeInvariantViolation::MissingFromChain { parent: p, node: c }]
        );
    }

    #[test]
    fn test_detects_ancestor_cycle_and_root_problems() {
        let (p, mut nodes) = consistent_tree();
        let a = nodes[1].id;
        let b = nodes[2].id;
        nodes[1].parent = Some(b);
        let violations = tree_invariant_violations(p, &nodes);
        assert!(violations.contains(&TreeInvariantViolation::AncestorCycle { node: a }));
        assert!(violations.contains(&TreeInvariantViolation::AncestorCycle { node: b }));

        let (_, nodes) = consistent_tree();
        let other = TaskId::new();
        let violations = tree_invariant_violations(other, &nodes);
        assert_eq!(
            violations,
            vec![TreeInvariantViolation::RootMismatch { found: p }]
        );
    }

    #[test]
    fn test_detects_dangling_links() {
        let (p, mut nodes) = consistent_tree();
        let ghost = TaskId::new();
        nodes[3].next_sibling = Some(ghost);
        let violations = tree_invariant_violations(p, &nodes);
        assert!(violations.contains(&TreeInvariantViolation::DanglingLink {
            node: nodes[3].id,
            link: LinkKind::NextSibling,
            target: ghost,
        }));
    }
}
