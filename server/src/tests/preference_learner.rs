use super::*;
use crate::classifier::preference_learner::PREFERENCES_KEY;
use crate::testing::{sample_email, text_response};

async fn seed_correction(store: &Store, email_id: &str) {
    store.save_email(sample_email(email_id)).await.unwrap();
    let sid = store
        .create_suggestion(email_id, "Projects/X", "P2 - Important", "Review", 0.9, "r")
        .await
        .unwrap();
    store
        .approve_suggestion(
            sid,
            Some((
                "Areas/Finance".to_string(),
                "P2 - Important".to_string(),
                "Review".to_string(),
            )),
        )
        .await
        .unwrap();
}

fn learning_config() -> AppConfig {
    let mut cfg = test_config();
    cfg.learning.enabled = true;
    cfg.learning.min_corrections_to_update = 1;
    cfg.learning.max_preferences_words = 10;
    cfg
}

#[tokio::test]
async fn disabled_learning_never_runs() {
    let store = test_store().await;
    let llm = Arc::new(MockLlmClient::new(vec![]));
    let learner = PreferenceLearner::new(store.clone(), llm.clone());

    seed_correction(&store, "c1").await;
    let result = learner.check_and_update(&test_config()).await.unwrap();

    assert!(result.is_none());
    assert_eq!(llm.request_count(), 0);
}

#[tokio::test]
async fn corrections_below_threshold_skip_the_update() {
    let store = test_store().await;
    let llm = Arc::new(MockLlmClient::new(vec![]));
    let learner = PreferenceLearner::new(store.clone(), llm.clone());

    let mut cfg = learning_config();
    cfg.learning.min_corrections_to_update = 5;
    seed_correction(&store, "c1").await;

    let result = learner.check_and_update(&cfg).await.unwrap();
    assert!(result.is_none());
    assert_eq!(llm.request_count(), 0);
}

#[tokio::test]
async fn update_stores_new_preferences_and_arms_cooldown() {
    let store = test_store().await;
    let llm = Arc::new(MockLlmClient::new(vec![text_response(
        "Finance emails belong in Areas/Finance.",
    )]));
    let learner = PreferenceLearner::new(store.clone(), llm.clone());
    let cfg = learning_config();

    seed_correction(&store, "c1").await;
    let result = learner.check_and_update(&cfg).await.unwrap().unwrap();

    assert!(result.changed);
    assert_eq!(result.corrections_analyzed, 1);
    assert_eq!(
        store.get_state(PREFERENCES_KEY).await.unwrap().as_deref(),
        Some("Finance emails belong in Areas/Finance.")
    );

    // Immediate re-run hits the cooldown and leaves everything untouched
    let again = learner.check_and_update(&cfg).await.unwrap().unwrap();
    assert!(!again.changed);
    assert_eq!(llm.request_count(), 1);
}

#[tokio::test]
async fn llm_failure_preserves_existing_preferences() {
    let store = test_store().await;
    let llm = Arc::new(MockLlmClient::new(vec![]));
    let learner = PreferenceLearner::new(store.clone(), llm.clone());
    let cfg = learning_config();

    store
        .set_state(PREFERENCES_KEY, "Existing preferences.")
        .await
        .unwrap();
    seed_correction(&store, "c1").await;

    let result = learner.check_and_update(&cfg).await.unwrap().unwrap();

    assert!(!result.changed);
    assert_eq!(
        store.get_state(PREFERENCES_KEY).await.unwrap().as_deref(),
        Some("Existing preferences.")
    );
}

#[tokio::test]
async fn over_length_output_is_clamped_to_word_budget() {
    let store = test_store().await;
    let long_output = (1..=30)
        .map(|i| format!("word{i}"))
        .collect::<Vec<_>>()
        .join(" ");
    let llm = Arc::new(MockLlmClient::new(vec![text_response(&long_output)]));
    let learner = PreferenceLearner::new(store.clone(), llm);
    let cfg = learning_config();

    seed_correction(&store, "c1").await;
    let result = learner.check_and_update(&cfg).await.unwrap().unwrap();

    assert!(result.changed);
    let stored = store.get_state(PREFERENCES_KEY).await.unwrap().unwrap();
    assert_eq!(stored.split_whitespace().count(), 10);
    assert!(stored.starts_with("word1 "));
}
