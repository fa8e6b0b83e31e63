use super::*;
use crate::conf::DigestDelivery;
use crate::testing::{sample_email, tool_use_response};
use serde_json::json;

async fn digest_harness(llm: Arc<MockLlmClient>) -> (Arc<Store>, DigestGenerator) {
    let store = test_store().await;
    let generator = DigestGenerator::new(store.clone(), llm);
    (store, generator)
}

#[tokio::test]
async fn llm_sections_are_assembled_into_the_report() {
    let llm = Arc::new(MockLlmClient::new(vec![tool_use_response(
        "generate_digest",
        json!({
            "summary": "1 overdue reply needs attention.",
            "overdue_replies_section": "Quote request from client@example.com (critical)",
        }),
    )]));
    let (store, generator) = digest_harness(llm).await;

    store.save_email(sample_email("d1")).await.unwrap();
    let result = generator.generate(&test_config()).await.unwrap().unwrap();

    assert!(result.text.starts_with("DAILY DIGEST"));
    assert!(result.text.contains("1 overdue reply needs attention."));
    assert!(result.text.contains("OVERDUE REPLIES"));
}

#[tokio::test]
async fn llm_failure_falls_back_to_plain_text() {
    // Empty queue -> the LLM call errors
    let llm = Arc::new(MockLlmClient::new(vec![]));
    let (_store, generator) = digest_harness(llm).await;

    let result = generator.generate(&test_config()).await.unwrap().unwrap();

    assert!(result.text.starts_with("DAILY DIGEST"));
    assert!(result.text.contains("All clear"));
}

#[tokio::test]
async fn cooldown_suppresses_back_to_back_digests() {
    let llm = Arc::new(MockLlmClient::new(vec![]));
    let (store, generator) = digest_harness(llm).await;

    let first = generator.generate(&test_config()).await.unwrap();
    assert!(first.is_some());
    assert!(store.get_state("last_digest_run").await.unwrap().is_some());

    let second = generator.generate(&test_config()).await.unwrap();
    assert!(second.is_none());
}

#[tokio::test]
async fn digest_counts_overdue_items() {
    let llm = Arc::new(MockLlmClient::new(vec![]));
    let (store, generator) = digest_harness(llm).await;

    // An overdue 'Needs Reply' email from three days ago
    let mut email = sample_email("overdue-1");
    email.received_at = Some(Utc::now() - Duration::hours(72));
    store.save_email(email).await.unwrap();
    store
        .create_suggestion(
            "overdue-1",
            "Projects/X",
            "P2 - Important",
            "Needs Reply",
            0.9,
            "r",
        )
        .await
        .unwrap();

    // A waiting-for item past the nudge threshold
    let wf = store
        .create_waiting_for(None, Some("conv-w"), Some("them@example.com"), "contract", 48)
        .await
        .unwrap()
        .unwrap();
    backdate_waiting_for(&store, wf, Utc::now() - Duration::hours(60)).await;

    let result = generator.generate(&test_config()).await.unwrap().unwrap();

    assert_eq!(result.overdue_replies, 1);
    assert_eq!(result.overdue_waiting, 1);
    assert_eq!(result.pending_suggestions, 1);
    assert!(result.text.contains("[WARNING]") || result.text.contains("[CRITICAL]"));
}

#[tokio::test]
async fn file_delivery_writes_atomically() {
    let llm = Arc::new(MockLlmClient::new(vec![]));
    let (_store, generator) = digest_harness(llm).await;

    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config();
    cfg.digest.delivery = DigestDelivery::File;
    cfg.digest.output_dir = dir.path().to_string_lossy().into_owned();

    let digest = generator.generate(&cfg).await.unwrap().unwrap();
    let path = generator.deliver(&cfg, &digest).await.unwrap().unwrap();

    let written = std::fs::read_to_string(&path).unwrap();
    assert_eq!(written, digest.text);

    // No temp droppings left behind
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}
