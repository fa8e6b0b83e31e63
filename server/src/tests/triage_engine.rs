use super::*;
use crate::conf::{AutoRuleConfig, RuleAction, RulePatterns};
use crate::engine::triage::DELTA_TOKEN_KEY;
use crate::testing::{sample_mail_message, tool_use_response};
use entity::sea_orm_active_enums::{ClassificationStatus, SuggestionStatus};
use serde_json::json;

fn config_with_rule() -> AppConfig {
    let mut cfg = test_config();
    cfg.auto_rules.push(AutoRuleConfig {
        name: "steelworks-ops".to_string(),
        matcher: RulePatterns {
            senders: vec!["*@steelworks.example".to_string()],
            subjects: vec![],
        },
        action: RuleAction {
            folder: "Projects/Steelworks".to_string(),
            priority: "P3 - Routine".to_string(),
            action_type: "File".to_string(),
        },
    });
    cfg
}

#[tokio::test]
async fn auto_rule_match_bypasses_the_llm() {
    let h = harness_with(config_with_rule()).await;
    h.mail.queue_delta(vec![sample_mail_message("m1")], Some("tok-1"));

    let result = h.engine.run_cycle().await;

    assert_eq!(result.auto_ruled, 1);
    assert_eq!(result.classified, 0);
    assert_eq!(h.llm.request_count(), 0);

    let suggestion = h
        .store
        .get_pending_suggestion_for_email("m1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        suggestion.suggested_folder.as_deref(),
        Some("Projects/Steelworks")
    );
    assert_eq!(suggestion.confidence, Some(1.0));

    let email = h.store.get_email("m1").await.unwrap().unwrap();
    assert_eq!(email.classification_status, ClassificationStatus::Classified);
    assert!(email.processed_at.is_some());

    let actions = h.store.get_action_logs(10).await.unwrap();
    assert!(actions.iter().any(|a| a.action_type == "auto_rule"));
}

#[tokio::test]
async fn llm_classification_creates_suggestion_and_logs_round_trip() {
    let h = harness().await;
    h.mail.queue_delta(vec![sample_mail_message("m2")], None);
    h.llm.push_response(tool_use_response(
        "classify_email",
        json!({
            "folder": "Projects/Steelworks",
            "priority": "P2 - Important",
            "action_type": "Review",
            "confidence": 0.88,
            "reasoning": "Tonnage update for the active project."
        }),
    ));

    let result = h.engine.run_cycle().await;

    assert_eq!(result.classified, 1);
    assert_eq!(result.failed, 0);
    assert_eq!(h.llm.request_count(), 1);

    let suggestion = h
        .store
        .get_pending_suggestion_for_email("m2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        suggestion.suggested_folder.as_deref(),
        Some("Projects/Steelworks")
    );
    assert_eq!(suggestion.status, SuggestionStatus::Pending);

    let email = h.store.get_email("m2").await.unwrap().unwrap();
    assert_eq!(email.classification_status, ClassificationStatus::Classified);

    // Round-trip recorded with the cycle correlation id
    let logs = entity::prelude::LlmRequestLog::find()
        .all(h.store.conn())
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].task_type, "triage");
    assert_eq!(logs[0].email_id.as_deref(), Some("m2"));
    assert_eq!(logs[0].triage_cycle_id.as_deref(), Some(result.cycle_id.as_str()));
}

#[tokio::test]
async fn terminal_classification_failure_marks_email_failed() {
    let mut cfg = test_config();
    cfg.triage.classification_attempts_max = 1;
    let h = harness_with(cfg).await;
    h.mail.queue_delta(vec![sample_mail_message("m3")], None);
    // Queue exhausted -> every LLM call errors

    let result = h.engine.run_cycle().await;

    assert_eq!(result.failed, 1);
    assert!(result.cycle_error.is_none(), "per-email failure must not fail the cycle");

    let email = h.store.get_email("m3").await.unwrap().unwrap();
    assert_eq!(email.classification_status, ClassificationStatus::Failed);
    assert_eq!(email.classification_attempts, 1);
    assert!(h
        .store
        .get_pending_suggestion_for_email("m3")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn thread_inheritance_skips_the_llm() {
    let h = harness().await;

    // Earlier message in the conversation, already approved into a folder
    let mut earlier = crate::testing::sample_email("m-prior");
    earlier.conversation_id = Some("conv-thread".to_string());
    earlier.received_at = Some(Utc::now() - Duration::hours(5));
    h.store.save_email(earlier).await.unwrap();
    let prior_sid = h
        .store
        .create_suggestion("m-prior", "Projects/Steelworks", "P2 - Important", "Review", 0.9, "r")
        .await
        .unwrap();
    assert!(h.store.approve_suggestion(prior_sid, None).await.unwrap());

    let mut newer = sample_mail_message("m-new");
    newer.conversation_id = Some("conv-thread".to_string());
    newer.sender_email = Some("other@elsewhere.example".to_string());
    h.mail.queue_delta(vec![newer], None);

    let result = h.engine.run_cycle().await;

    assert_eq!(result.inherited, 1);
    assert_eq!(h.llm.request_count(), 0);

    let suggestion = h
        .store
        .get_pending_suggestion_for_email("m-new")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        suggestion.suggested_folder.as_deref(),
        Some("Projects/Steelworks")
    );
    assert_eq!(suggestion.confidence, Some(0.85));

    let email = h.store.get_email("m-new").await.unwrap().unwrap();
    assert_eq!(
        email.inherited_folder.as_deref(),
        Some("Projects/Steelworks")
    );
}

#[tokio::test]
async fn delta_token_is_persisted_after_the_cycle() {
    let h = harness().await;
    h.mail.queue_delta(vec![], Some("delta-token-42"));

    h.engine.run_cycle().await;

    assert_eq!(
        h.store.get_state(DELTA_TOKEN_KEY).await.unwrap().as_deref(),
        Some("delta-token-42")
    );
}

#[tokio::test]
async fn already_classified_emails_are_skipped() {
    let h = harness_with(config_with_rule()).await;
    h.mail.queue_delta(vec![sample_mail_message("m4")], None);
    h.engine.run_cycle().await;

    // Same message delivered again (delta replay)
    h.mail.queue_delta(vec![sample_mail_message("m4")], None);
    let second = h.engine.run_cycle().await;

    assert_eq!(second.skipped_already_classified, 1);
    assert_eq!(second.auto_ruled, 0);

    // Still exactly one suggestion
    let suggestions = entity::prelude::Suggestion::find()
        .all(h.store.conn())
        .await
        .unwrap();
    assert_eq!(suggestions.len(), 1);
}

#[tokio::test]
async fn sender_profile_is_upserted_per_observation() {
    let h = harness_with(config_with_rule()).await;
    h.mail.queue_delta(vec![sample_mail_message("m5")], None);
    h.engine.run_cycle().await;

    let profile = h
        .store
        .get_sender_profile("ops@steelworks.example")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(profile.email_count, 1);
    assert_eq!(profile.domain.as_deref(), Some("steelworks.example"));
}
