use super::*;
use crate::mail::MoveResult;
use crate::testing::sample_email;

fn queue_config() -> AppConfig {
    let mut cfg = test_config();
    cfg.suggestion_queue.expire_after_days = 7;
    cfg.suggestion_queue.auto_approve_confidence = 0.90;
    cfg.suggestion_queue.auto_approve_delay_hours = 2;
    cfg
}

#[tokio::test]
async fn high_confidence_suggestion_is_auto_approved_after_delay() {
    let h = harness_with(queue_config()).await;
    h.store.save_email(sample_email("email-q1")).await.unwrap();
    let sid = seed_suggestion(&h.store, "email-q1", 0.95, "P2 - Important", "Projects/Test", 4).await;
    h.mail.set_folder_id("Projects/Test", "folder-id-456");

    let result = h.engine.run_cycle().await;

    assert_eq!(result.suggestions_auto_approved, 1);
    assert_eq!(
        h.mail.batch_calls(),
        vec![vec![("email-q1".to_string(), "folder-id-456".to_string())]]
    );

    let suggestion = h.store.get_suggestion(sid).await.unwrap().unwrap();
    assert_eq!(
        suggestion.status,
        entity::sea_orm_active_enums::SuggestionStatus::AutoApproved
    );
    assert_eq!(suggestion.approved_folder.as_deref(), Some("Projects/Test"));
    assert_eq!(suggestion.approved_priority.as_deref(), Some("P2 - Important"));
    assert_eq!(suggestion.approved_action_type.as_deref(), Some("Review"));
    assert!(suggestion.resolved_at.is_some());

    let actions = h.store.get_action_logs(10).await.unwrap();
    let auto_moves: Vec<_> = actions
        .iter()
        .filter(|a| a.triggered_by.as_deref() == Some("auto_approved"))
        .collect();
    assert_eq!(auto_moves.len(), 1);
    assert_eq!(auto_moves[0].action_type, "move");
    assert_eq!(auto_moves[0].email_id.as_deref(), Some("email-q1"));
}

#[tokio::test]
async fn p1_is_never_auto_approved() {
    let h = harness_with(queue_config()).await;
    h.store.save_email(sample_email("email-p1")).await.unwrap();
    let sid = seed_suggestion(
        &h.store,
        "email-p1",
        0.99,
        "P1 - Urgent Important",
        "Projects/Test",
        24,
    )
    .await;

    let result = h.engine.run_cycle().await;

    assert_eq!(result.suggestions_auto_approved, 0);
    assert!(h.mail.batch_calls().is_empty());
    let suggestion = h.store.get_suggestion(sid).await.unwrap().unwrap();
    assert_eq!(
        suggestion.status,
        entity::sea_orm_active_enums::SuggestionStatus::Pending
    );
}

#[tokio::test]
async fn delay_gate_is_respected() {
    let h = harness_with(queue_config()).await;
    h.store.save_email(sample_email("email-young")).await.unwrap();
    seed_suggestion(&h.store, "email-young", 0.95, "P2 - Important", "Projects/Test", 1).await;

    let approvable = h
        .store
        .get_auto_approvable_suggestions(0.90, 2)
        .await
        .unwrap();
    assert!(approvable.is_empty());
}

#[tokio::test]
async fn low_confidence_is_not_approved() {
    let h = harness_with(queue_config()).await;
    h.store.save_email(sample_email("email-low")).await.unwrap();
    seed_suggestion(&h.store, "email-low", 0.75, "P2 - Important", "Projects/Test", 4).await;

    let approvable = h
        .store
        .get_auto_approvable_suggestions(0.90, 2)
        .await
        .unwrap();
    assert!(approvable.is_empty());
}

#[tokio::test]
async fn batch_error_leaves_all_suggestions_pending() {
    let h = harness_with(queue_config()).await;
    h.store.save_email(sample_email("email-fail")).await.unwrap();
    let sid = seed_suggestion(&h.store, "email-fail", 0.95, "P2 - Important", "Projects/Test", 4).await;
    h.mail.fail_batch(500);

    let result = h.engine.run_cycle().await;

    assert_eq!(result.suggestions_auto_approved, 0);
    let suggestion = h.store.get_suggestion(sid).await.unwrap().unwrap();
    assert_eq!(
        suggestion.status,
        entity::sea_orm_active_enums::SuggestionStatus::Pending
    );
}

#[tokio::test]
async fn per_message_move_failure_leaves_that_suggestion_pending() {
    let h = harness_with(queue_config()).await;
    h.store.save_email(sample_email("email-ok")).await.unwrap();
    h.store.save_email(sample_email("email-bad")).await.unwrap();
    let sid_ok = seed_suggestion(&h.store, "email-ok", 0.95, "P2 - Important", "Projects/Test", 4).await;
    let sid_bad = seed_suggestion(&h.store, "email-bad", 0.95, "P2 - Important", "Projects/Test", 4).await;
    h.mail.set_move_result(
        "email-bad",
        MoveResult {
            id: "email-bad".to_string(),
            success: false,
            status: 404,
            new_id: None,
        },
    );

    let result = h.engine.run_cycle().await;

    assert_eq!(result.suggestions_auto_approved, 1);
    let ok = h.store.get_suggestion(sid_ok).await.unwrap().unwrap();
    let bad = h.store.get_suggestion(sid_bad).await.unwrap().unwrap();
    assert_eq!(
        ok.status,
        entity::sea_orm_active_enums::SuggestionStatus::AutoApproved
    );
    assert_eq!(
        bad.status,
        entity::sea_orm_active_enums::SuggestionStatus::Pending
    );
}

#[tokio::test]
async fn move_minted_id_cascades_into_store() {
    let h = harness_with(queue_config()).await;
    h.store.save_email(sample_email("old-move-id")).await.unwrap();
    seed_suggestion(&h.store, "old-move-id", 0.95, "P2 - Important", "Projects/Test", 4).await;
    h.mail.set_move_result(
        "old-move-id",
        MoveResult {
            id: "old-move-id".to_string(),
            success: true,
            status: 201,
            new_id: Some("new-move-id".to_string()),
        },
    );

    h.engine.run_cycle().await;

    assert!(h.store.get_email("old-move-id").await.unwrap().is_none());
    let moved = h.store.get_email("new-move-id").await.unwrap().unwrap();
    assert_eq!(moved.subject.as_deref(), Some("Test Email"));
}

#[tokio::test]
async fn old_pending_suggestions_expire() {
    let h = harness_with(queue_config()).await;
    h.store.save_email(sample_email("email-old")).await.unwrap();
    let sid = seed_suggestion(&h.store, "email-old", 0.50, "P3 - Routine", "Projects/Test", 200).await;

    let expired = h.store.expire_old_suggestions(7).await.unwrap();

    assert_eq!(expired, 1);
    let suggestion = h.store.get_suggestion(sid).await.unwrap().unwrap();
    assert_eq!(
        suggestion.status,
        entity::sea_orm_active_enums::SuggestionStatus::Expired
    );
    assert!(suggestion.resolved_at.is_some());
}

#[tokio::test]
async fn expiry_spares_recent_pending_suggestions() {
    let h = harness_with(queue_config()).await;
    h.store.save_email(sample_email("email-recent")).await.unwrap();
    let sid = seed_suggestion(&h.store, "email-recent", 0.50, "P3 - Routine", "Projects/Test", 24).await;

    let expired = h.store.expire_old_suggestions(7).await.unwrap();

    assert_eq!(expired, 0);
    let suggestion = h.store.get_suggestion(sid).await.unwrap().unwrap();
    assert_eq!(
        suggestion.status,
        entity::sea_orm_active_enums::SuggestionStatus::Pending
    );
}
