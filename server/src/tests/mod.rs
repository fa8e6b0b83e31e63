mod digest_generator;
mod id_migration;
mod preference_learner;
mod suggestion_queue;
mod triage_engine;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::{entity::*, query::*, sea_query::Expr};

use crate::{
    classifier::{EmailClassifier, PreferenceLearner},
    conf::{AppConfig, ConfigStore},
    engine::{
        digest::DigestGenerator, queue::SuggestionQueue, thread::ThreadContextManager,
        triage::TriageEngine, waiting_for::WaitingForTracker,
    },
    mail::SentItemsCache,
    store::Store,
    testing::{test_config, test_store, MockLlmClient, MockMailClient},
};

pub(crate) struct TestHarness {
    pub store: Arc<Store>,
    pub mail: Arc<MockMailClient>,
    pub llm: Arc<MockLlmClient>,
    pub engine: TriageEngine,
}

/// Engine wired against mocks and an in-memory store. The digest cooldown
/// is pre-armed so cycles don't emit digests mid-test.
pub(crate) async fn harness_with(cfg: AppConfig) -> TestHarness {
    let store = test_store().await;
    store
        .set_state("last_digest_run", &Utc::now().to_rfc3339())
        .await
        .unwrap();

    let mail = Arc::new(MockMailClient::new());
    let llm = Arc::new(MockLlmClient::new(vec![]));
    let config = Arc::new(ConfigStore::for_tests(cfg));

    let classifier = Arc::new(EmailClassifier::new(llm.clone(), store.clone()));
    let sent_cache = Arc::new(SentItemsCache::new(mail.clone()));

    let engine = TriageEngine::new(
        store.clone(),
        mail.clone(),
        config,
        classifier,
        ThreadContextManager::new(store.clone()),
        SuggestionQueue::new(store.clone(), mail.clone()),
        WaitingForTracker::new(store.clone(), sent_cache),
        PreferenceLearner::new(store.clone(), llm.clone()),
        DigestGenerator::new(store.clone(), llm.clone()),
        false,
    );

    TestHarness {
        store,
        mail,
        llm,
        engine,
    }
}

pub(crate) async fn harness() -> TestHarness {
    harness_with(test_config()).await
}

/// Insert a pending suggestion and backdate its creation time.
pub(crate) async fn seed_suggestion(
    store: &Store,
    email_id: &str,
    confidence: f32,
    priority: &str,
    folder: &str,
    age_hours: i64,
) -> i32 {
    let id = store
        .create_suggestion(
            email_id,
            folder,
            priority,
            "Review",
            confidence,
            "Test classification",
        )
        .await
        .unwrap();
    backdate_suggestion(store, id, Utc::now() - Duration::hours(age_hours)).await;
    id
}

pub(crate) async fn backdate_suggestion(store: &Store, id: i32, created_at: DateTime<Utc>) {
    entity::prelude::Suggestion::update_many()
        .col_expr(
            entity::suggestion::Column::CreatedAt,
            Expr::value(created_at),
        )
        .filter(entity::suggestion::Column::Id.eq(id))
        .exec(store.conn())
        .await
        .unwrap();
}

pub(crate) async fn backdate_waiting_for(store: &Store, id: i32, waiting_since: DateTime<Utc>) {
    entity::prelude::WaitingFor::update_many()
        .col_expr(
            entity::waiting_for::Column::WaitingSince,
            Expr::value(waiting_since),
        )
        .filter(entity::waiting_for::Column::Id.eq(id))
        .exec(store.conn())
        .await
        .unwrap();
}
