//! Approval decisions and task listing through the engine.

mod support;

use solutioniq_api::{ApprovalDecision, StatusCode, TaskStatus};
use solutioniq_sync::{QueryKey, SyncConfig, SyncEngine};
use support::{MockApi, approval, offline_channel, task};

#[tokio::test]
async fn deciding_an_approval_invalidates_approvals_and_tasks() -> anyhow::Result<()> {
    let api = MockApi::new();
    api.set_approvals(vec![approval("a1", Some("t1")), approval("a2", None)]);
    let channel = offline_channel()?;
    let engine = SyncEngine::new(api.clone(), channel.handle(), SyncConfig::default());
    let mut invalidations = engine.subscribe_invalidations();

    let pending = engine.pending_approvals().await?;
    assert_eq!(pending.len(), 2);
    assert!(!engine.cache().is_stale(&QueryKey::Approvals));

    engine
        .decide_approval("a1", ApprovalDecision::Approve, Some("looks fine".to_string()))
        .await?;
    assert_eq!(invalidations.try_recv()?, QueryKey::Approvals);
    assert_eq!(invalidations.try_recv()?, QueryKey::Tasks);
    assert!(engine.cache().is_stale(&QueryKey::Approvals));

    let actions = api
        .approval_actions
        .lock()
        .map(|actions| actions.clone())
        .unwrap_or_default();
    assert_eq!(
        actions,
        vec![(
            "a1".to_string(),
            ApprovalDecision::Approve,
            Some("looks fine".to_string())
        )]
    );

    let pending = engine.pending_approvals().await?;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, "a2");
    assert!(!engine.cache().is_stale(&QueryKey::Approvals));
    Ok(())
}

#[tokio::test]
async fn rejected_decision_leaves_caches_untouched() -> anyhow::Result<()> {
    let api = MockApi::new();
    let channel = offline_channel()?;
    let engine = SyncEngine::new(api.clone(), channel.handle(), SyncConfig::default());
    let mut invalidations = engine.subscribe_invalidations();

    let error = engine
        .decide_approval("missing", ApprovalDecision::Reject, None)
        .await
        .err();
    assert_eq!(
        error.and_then(|error| error.status()),
        Some(StatusCode::NOT_FOUND)
    );
    assert!(invalidations.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn task_list_filters_by_status() -> anyhow::Result<()> {
    let api = MockApi::new();
    api.set_tasks(vec![
        task("t1", TaskStatus::Running, None),
        task("t2", TaskStatus::Completed, None),
        task("t3", TaskStatus::Running, None),
    ]);
    let channel = offline_channel()?;
    let engine = SyncEngine::new(api.clone(), channel.handle(), SyncConfig::default());

    let running = engine.list_tasks(Some(TaskStatus::Running)).await?;
    assert_eq!(running.total(), 2);
    let ids: Vec<String> = running.into_tasks().into_iter().map(|task| task.id).collect();
    assert_eq!(ids, vec!["t1".to_string(), "t3".to_string()]);

    assert_eq!(engine.list_tasks(None).await?.total(), 3);
    Ok(())
}
