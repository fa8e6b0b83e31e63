use super::*;
use crate::engine::id_migration::{migrate_to_immutable_ids, MIGRATED_FLAG};
use crate::testing::sample_email;

async fn migration_harness() -> (Arc<Store>, Arc<MockMailClient>) {
    (test_store().await, Arc::new(MockMailClient::new()))
}

#[tokio::test]
async fn skips_when_already_migrated() {
    let (store, mail) = migration_harness().await;
    store.set_state(MIGRATED_FLAG, "true").await.unwrap();
    store.save_email(sample_email("mutable-1")).await.unwrap();
    mail.set_immutable_id("mutable-1", Ok("immutable-1"));

    let outcome = migrate_to_immutable_ids(&store, mail.as_ref())
        .await
        .unwrap();

    assert_eq!(outcome.scanned, 0);
    assert!(store.get_email("mutable-1").await.unwrap().is_some());
}

#[tokio::test]
async fn sets_flag_when_no_emails_exist() {
    let (store, mail) = migration_harness().await;

    migrate_to_immutable_ids(&store, mail.as_ref()).await.unwrap();

    assert_eq!(
        store.get_state(MIGRATED_FLAG).await.unwrap().as_deref(),
        Some("true")
    );
}

#[tokio::test]
async fn migrates_changed_ids_and_cascades_foreign_keys() {
    let (store, mail) = migration_harness().await;

    let mut email = sample_email("old-id");
    email.subject = Some("Email 1".to_string());
    store.save_email(email).await.unwrap();
    store.save_email(sample_email("same-id")).await.unwrap();

    let sid = store
        .create_suggestion("old-id", "Projects/X", "P2 - Important", "Review", 0.9, "r")
        .await
        .unwrap();
    let tid = store.link_task("old-id", "task-1", None).await.unwrap();
    mail.set_immutable_id("old-id", Ok("new-id"));
    mail.set_immutable_id("same-id", Ok("same-id"));

    migrate_to_immutable_ids(&store, mail.as_ref()).await.unwrap();

    // Old key gone, new key preserves fields
    assert!(store.get_email("old-id").await.unwrap().is_none());
    let migrated = store.get_email("new-id").await.unwrap().unwrap();
    assert_eq!(migrated.subject.as_deref(), Some("Email 1"));

    // Dependents repointed
    let suggestion = store.get_suggestion(sid).await.unwrap().unwrap();
    assert_eq!(suggestion.email_id, "new-id");
    let task = store.get_active_task_for_email("new-id").await.unwrap().unwrap();
    assert_eq!(task.id, tid);

    // Untouched email survives under its own id
    assert!(store.get_email("same-id").await.unwrap().is_some());

    assert_eq!(
        store.get_state(MIGRATED_FLAG).await.unwrap().as_deref(),
        Some("true")
    );
}

#[tokio::test]
async fn second_invocation_is_a_no_op() {
    let (store, mail) = migration_harness().await;
    store.save_email(sample_email("old-id")).await.unwrap();
    mail.set_immutable_id("old-id", Ok("new-id"));

    let first = migrate_to_immutable_ids(&store, mail.as_ref()).await.unwrap();
    assert_eq!(first.migrated, 1);

    let second = migrate_to_immutable_ids(&store, mail.as_ref()).await.unwrap();
    assert_eq!(second.scanned, 0);
    assert_eq!(second.migrated, 0);
}

#[tokio::test]
async fn deleted_messages_are_skipped() {
    let (store, mail) = migration_harness().await;
    store.save_email(sample_email("exists-id")).await.unwrap();
    store.save_email(sample_email("deleted-id")).await.unwrap();
    mail.set_immutable_id("exists-id", Ok("exists-id"));
    mail.set_immutable_id("deleted-id", Err(404));

    let outcome = migrate_to_immutable_ids(&store, mail.as_ref()).await.unwrap();

    assert_eq!(outcome.deleted, 1);
    assert_eq!(outcome.errors, 0);
    assert!(store.get_email("exists-id").await.unwrap().is_some());
    assert!(store.get_email("deleted-id").await.unwrap().is_some());
    assert_eq!(
        store.get_state(MIGRATED_FLAG).await.unwrap().as_deref(),
        Some("true")
    );
}

#[tokio::test]
async fn non_404_errors_do_not_stop_the_sweep() {
    let (store, mail) = migration_harness().await;
    store.save_email(sample_email("error-id")).await.unwrap();
    store.save_email(sample_email("ok-id")).await.unwrap();
    mail.set_immutable_id("error-id", Err(500));
    mail.set_immutable_id("ok-id", Ok("ok-id"));

    let outcome = migrate_to_immutable_ids(&store, mail.as_ref()).await.unwrap();

    assert_eq!(outcome.errors, 1);
    assert!(store.get_email("error-id").await.unwrap().is_some());
    assert!(store.get_email("ok-id").await.unwrap().is_some());
    assert_eq!(
        store.get_state(MIGRATED_FLAG).await.unwrap().as_deref(),
        Some("true")
    );
}
