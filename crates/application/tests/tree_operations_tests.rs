mod common;

use anyhow::Result;
use common::TestProject;
use tasktree_domain::{
    Contribution, ContributionKind, MoveTarget, NewTask, SiblingPosition, TaskId, TreeError,
};
use tracing_test::traced_test;

#[tokio::test]
#[traced_test]
async fn test_insert_rolls_up_to_ancestors() -> Result<()> {
    let project = TestProject::new(false).await?;
    let a = project.add(project.root(), "A", 100).await?;
    let b = project.add(a.id, "B", 50).await?;

    let root = project.task(project.root()).await?;
    assert_eq!(root.child_count, 1);
    assert_eq!(root.descendant_count, 2);
    assert_eq!(root.subtree.time_estimate, 150);
    // A 自身 100 加上串行组合的 B 50
    assert_eq!(root.subtree.time_minimum, 150);

    let a = project.task(a.id).await?;
    assert_eq!(a.subtree.time_estimate, 50);
    assert_eq!(a.subtree.time_minimum, 50);
    assert_eq!(a.first_child, Some(b.id));

    project.assert_consistent().await
}

#[tokio::test]
async fn test_insert_returns_refreshed_parent() -> Result<()> {
    let project = TestProject::new(false).await?;
    let created = project
        .service
        .insert(
            project.scope,
            project.root(),
            SiblingPosition::First,
            NewTask::new("  A  ", project.user).cost_estimate(40),
        )
        .await?;

    assert_eq!(created.task.name, "A");
    assert_eq!(created.parent.id, project.root());
    assert_eq!(created.parent.first_child, Some(created.task.id));
    assert_eq!(created.parent.subtree.cost_estimate, 40);
    Ok(())
}

#[tokio::test]
async fn test_insert_positions() -> Result<()> {
    let project = TestProject::new(false).await?;
    let root = project.root();
    let a = project.add(root, "A", 0).await?;
    let c = project.add(root, "C", 0).await?;

    let first = project
        .service
        .insert(project.scope, root, SiblingPosition::First, NewTask::new("F", project.user))
        .await?
        .task;
    let b = project
        .service
        .insert(project.scope, root, SiblingPosition::After(a.id), NewTask::new("B", project.user))
        .await?
        .task;

    assert_eq!(project.child_ids(root).await?, vec![first.id, a.id, b.id, c.id]);
    assert_eq!(project.task(c.id).await?.next_sibling, None);
    project.assert_consistent().await
}

#[tokio::test]
async fn test_insert_rejects_unknown_or_foreign_references() -> Result<()> {
    let project = TestProject::new(false).await?;
    let a = project.add(project.root(), "A", 0).await?;
    let b = project.add(a.id, "B", 0).await?;

    let unknown_parent = project
        .service
        .insert(
            project.scope,
            TaskId::new(),
            SiblingPosition::First,
            NewTask::new("X", project.user),
        )
        .await;
    assert!(matches!(unknown_parent, Err(TreeError::NotFound { .. })));

    // B 不是根任务的直接子任务
    let foreign_sibling = project
        .service
        .insert(
            project.scope,
            project.root(),
            SiblingPosition::After(b.id),
            NewTask::new("X", project.user),
        )
        .await;
    assert!(matches!(foreign_sibling, Err(TreeError::NotFound { .. })));

    let blank_name = project
        .service
        .insert(
            project.scope,
            project.root(),
            SiblingPosition::First,
            NewTask::new("   ", project.user),
        )
        .await;
    assert!(matches!(blank_name, Err(TreeError::Validation(_))));
    Ok(())
}

#[tokio::test]
#[traced_test]
async fn test_move_between_branches() -> Result<()> {
    let project = TestProject::new(false).await?;
    let root = project.root();
    let a = project.add(root, "A", 10).await?;
    let b = project.add(a.id, "B", 50).await?;
    let c = project.add(root, "C", 20).await?;
    project
        .service
        .contribute(project.scope, b.id, Contribution::created(ContributionKind::FileCount, 3)?)
        .await?;

    let before_root = project.task(root).await?;
    let moved = project
        .service
        .move_task(project.scope, b.id, MoveTarget::under(c.id, SiblingPosition::First))
        .await?;

    assert_eq!(moved.old_parent.id, a.id);
    assert_eq!(moved.new_parent.id, c.id);
    assert_eq!(moved.task.parent, Some(c.id));

    let a = project.task(a.id).await?;
    let c = project.task(c.id).await?;
    let after_root = project.task(root).await?;
    assert_eq!(a.descendant_count, 0);
    assert_eq!(a.child_count, 0);
    assert_eq!(a.first_child, None);
    assert_eq!(a.subtree.time_estimate, 0);
    assert_eq!(a.subtree.file_count, 0);
    assert_eq!(c.descendant_count, 1);
    assert_eq!(c.subtree.time_estimate, 50);
    assert_eq!(c.subtree.file_count, 3);
    assert_eq!(after_root.descendant_count, before_root.descendant_count);
    assert_eq!(after_root.subtree, before_root.subtree);

    project.assert_consistent().await
}

#[tokio::test]
async fn test_move_with_same_position_is_no_change() -> Result<()> {
    let project = TestProject::new(false).await?;
    let root = project.root();
    let a = project.add(root, "A", 0).await?;
    let b = project.add(root, "B", 0).await?;
    let revision = project.service.revision(project.scope).await?;

    let same = project
        .service
        .move_task(project.scope, b.id, MoveTarget::reorder(SiblingPosition::After(a.id)))
        .await;
    assert!(matches!(same, Err(TreeError::NoChange)));

    let explicit = project
        .service
        .move_task(project.scope, a.id, MoveTarget::under(root, SiblingPosition::First))
        .await;
    assert!(matches!(explicit, Err(TreeError::NoChange)));

    assert_eq!(project.service.revision(project.scope).await?, revision);
    Ok(())
}

#[tokio::test]
async fn test_move_rejects_root_and_self_sibling() -> Result<()> {
    let project = TestProject::new(false).await?;
    let root = project.root();
    let a = project.add(root, "A", 0).await?;
    let b = project.add(root, "B", 0).await?;

    let root_move = project
        .service
        .move_task(project.scope, root, MoveTarget::under(a.id, SiblingPosition::First))
        .await;
    assert!(matches!(root_move, Err(TreeError::InvalidMove(_))));

    let sibling_loop = project
        .service
        .move_task(project.scope, a.id, MoveTarget::reorder(SiblingPosition::After(a.id)))
        .await;
    assert!(matches!(sibling_loop, Err(TreeError::InvalidMove(_))));

    let missing_sibling = project
        .service
        .move_task(project.scope, b.id, MoveTarget::reorder(SiblingPosition::After(TaskId::new())))
        .await;
    assert!(matches!(missing_sibling, Err(TreeError::NotFound { .. })));
    Ok(())
}

#[tokio::test]
async fn test_move_adjacent_siblings_keeps_chain_terminated() -> Result<()> {
    let project = TestProject::new(false).await?;
    let root = project.root();
    let a = project.add(root, "A", 0).await?;
    let b = project.add(root, "B", 0).await?;

    project
        .service
        .move_task(project.scope, b.id, MoveTarget::reorder(SiblingPosition::First))
        .await?;
    assert_eq!(project.child_ids(root).await?, vec![b.id, a.id]);
    assert_eq!(project.task(a.id).await?.next_sibling, None);

    // A 移走后 B 成为唯一的子任务
    let other = project.add(root, "O", 0).await?;
    project
        .service
        .move_task(project.scope, a.id, MoveTarget::under(other.id, SiblingPosition::First))
        .await?;
    project
        .service
        .move_task(project.scope, other.id, MoveTarget::under(b.id, SiblingPosition::First))
        .await?;

    let root_node = project.task(root).await?;
    assert_eq!(root_node.first_child, Some(b.id));
    assert_eq!(project.task(b.id).await?.next_sibling, None);
    assert_eq!(project.child_ids(root).await?, vec![b.id]);
    project.assert_consistent().await
}

#[tokio::test]
#[traced_test]
async fn test_delete_leaf_returns_parent() -> Result<()> {
    let project = TestProject::new(false).await?;
    let root = project.root();
    let a = project.add(root, "A", 100).await?;
    let b = project.add(a.id, "B", 50).await?;
    project
        .service
        .contribute(project.scope, b.id, Contribution::created(ContributionKind::CostIncurred, 9)?)
        .await?;

    let parent = project.service.delete(project.scope, b.id).await?;
    assert_eq!(parent.id, a.id);
    assert_eq!(parent.child_count, 0);
    assert_eq!(parent.descendant_count, 0);
    assert_eq!(parent.first_child, None);
    assert_eq!(parent.subtree.time_estimate, 0);
    assert_eq!(parent.subtree.cost_incurred, 0);

    let root_node = project.task(root).await?;
    assert_eq!(root_node.descendant_count, 1);
    assert_eq!(root_node.subtree.time_estimate, 100);
    assert_eq!(root_node.subtree.cost_incurred, 0);

    let gone = project.service.get(project.scope, b.id).await;
    assert!(matches!(gone, Err(TreeError::NotFound { .. })));
    project.assert_consistent().await
}

#[tokio::test]
async fn test_delete_rejects_populated_and_root() -> Result<()> {
    let project = TestProject::new(false).await?;
    let a = project.add(project.root(), "A", 0).await?;
    project.add(a.id, "B", 0).await?;

    let populated = project.service.delete(project.scope, a.id).await;
    match populated {
        Err(TreeError::NotEmpty { child_count, .. }) => assert_eq!(child_count, 1),
        other => panic!("expected NotEmpty, got {other:?}"),
    }

    let root = project.service.delete(project.scope, project.root()).await;
    assert!(matches!(root, Err(TreeError::Validation(_))));
    project.assert_consistent().await
}

#[tokio::test]
async fn test_ancestors_and_pagination() -> Result<()> {
    let project = TestProject::new(false).await?;
    let root = project.root();
    let a = project.add(root, "A", 0).await?;
    let b = project.add(a.id, "B", 0).await?;
    let c = project.add(b.id, "C", 0).await?;

    let page = project.service.ancestors(project.scope, c.id, None).await?;
    let ids: Vec<TaskId> = page.items.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![b.id, a.id, root]);
    assert!(!page.more);

    let page = project.service.ancestors(project.scope, c.id, Some(2)).await?;
    assert_eq!(page.items.len(), 2);
    assert!(page.more);

    let page = project.service.ancestors(project.scope, root, None).await?;
    assert!(page.items.is_empty());

    let missing = project.service.ancestors(project.scope, TaskId::new(), None).await;
    assert!(matches!(missing, Err(TreeError::NotFound { .. })));
    Ok(())
}

#[tokio::test]
async fn test_children_cursor_pages() -> Result<()> {
    let project = TestProject::new(false).await?;
    let root = project.root();
    let mut expected = Vec::new();
    for i in 0..5 {
        expected.push(project.add(root, &format!("T{i}"), 0).await?.id);
    }

    let first = project.service.children(project.scope, root, None, Some(2)).await?;
    assert_eq!(first.items.iter().map(|n| n.id).collect::<Vec<_>>(), expected[..2]);
    assert!(first.more);

    let second = project
        .service
        .children(project.scope, root, Some(expected[1]), Some(3))
        .await?;
    assert_eq!(second.items.iter().map(|n| n.id).collect::<Vec<_>>(), expected[2..]);
    assert!(!second.more);

    let past_end = project
        .service
        .children(project.scope, root, Some(expected[4]), None)
        .await?;
    assert!(past_end.items.is_empty());
    assert!(!past_end.more);

    // 超出上限的页大小被截断到配置的最大值
    let clamped = project.service.children(project.scope, root, None, Some(10_000)).await?;
    assert_eq!(clamped.items.len(), 5);

    let leaf = project.service.children(project.scope, expected[0], None, None).await?;
    assert!(leaf.items.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_subtree_read_and_limit() -> Result<()> {
    let project = TestProject::new(false).await?;
    let a = project.add(project.root(), "A", 0).await?;
    let b = project.add(a.id, "B", 0).await?;
    project.add(project.root(), "C", 0).await?;

    let subtree = project.service.subtree(project.scope, a.id).await?;
    assert_eq!(subtree.root, a.id);
    assert_eq!(subtree.tasks.len(), 2);
    assert!(subtree.tasks.contains_key(&b.id));

    let whole = project.service.subtree(project.scope, project.root()).await?;
    assert_eq!(whole.tasks.len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_get_many_ignores_missing_ids() -> Result<()> {
    let project = TestProject::new(false).await?;
    let a = project.add(project.root(), "A", 0).await?;

    let found = project
        .service
        .get_many(project.scope, &[a.id, project.root(), TaskId::new()])
        .await?;
    assert_eq!(found.len(), 2);
    Ok(())
}
