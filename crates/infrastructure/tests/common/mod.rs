#![allow(dead_code)]

use chrono::Utc;
use tasktree_domain::{OwnMetrics, SubtreeMetrics, TaskId, TaskNode, TenantId, TreeScope, UserId};

pub fn node(scope: &TreeScope, id: TaskId, parent: Option<TaskId>, name: &str) -> TaskNode {
    TaskNode {
        id,
        tenant: scope.tenant,
        project: scope.project,
        parent,
        first_child: None,
        next_sibling: None,
        name: name.to_string(),
        description: String::new(),
        created_by: UserId::new(),
        created_on: Utc::now(),
        assigned_user: None,
        is_parallel: false,
        own: OwnMetrics::default(),
        subtree: SubtreeMetrics::default(),
        child_count: 0,
        descendant_count: 0,
    }
}

/// P -> [A, C], A -> [B]，只设置链接字段
pub struct Fixture {
    pub scope: TreeScope,
    pub root: TaskNode,
    pub a: TaskNode,
    pub b: TaskNode,
    pub c: TaskNode,
}

impl Fixture {
    pub fn new() -> Self {
        let scope = TreeScope::new(TenantId::new(), TaskId::new());
        let (a_id, b_id, c_id) = (TaskId::new(), TaskId::new(), TaskId::new());

        let mut root = node(&scope, scope.project, None, "项目");
        root.first_child = Some(a_id);
        root.child_count = 2;
        root.descendant_count = 3;

        let mut a = node(&scope, a_id, Some(scope.project), "A");
        a.first_child = Some(b_id);
        a.next_sibling = Some(c_id);
        a.child_count = 1;
        a.descendant_count = 1;

        let b = node(&scope, b_id, Some(a_id), "B");
        let c = node(&scope, c_id, Some(scope.project), "C");

        Self { scope, root, a, b, c }
    }

    pub fn descendants(&self) -> [&TaskNode; 3] {
        [&self.a, &self.b, &self.c]
    }
}
