use crate::{error::AppResult, mail::MailClient, store::Store};

pub const MIGRATED_FLAG: &str = "immutable_ids_migrated";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationOutcome {
    pub scanned: usize,
    pub migrated: usize,
    pub deleted: usize,
    pub errors: usize,
}

/// One-shot startup task converting stored mutable message ids to their
/// immutable form. Re-running after completion is a no-op; 404s (messages
/// deleted upstream) are skipped silently, other provider errors are logged
/// and do not stop the sweep.
pub async fn migrate_to_immutable_ids(
    store: &Store,
    mail: &dyn MailClient,
) -> AppResult<MigrationOutcome> {
    if store.get_state(MIGRATED_FLAG).await?.as_deref() == Some("true") {
        tracing::debug!("immutable id migration already completed");
        return Ok(MigrationOutcome::default());
    }

    let ids = store.get_all_email_ids().await?;
    let mut outcome = MigrationOutcome::default();

    for id in ids {
        outcome.scanned += 1;
        match mail.get_message_immutable_id(&id).await {
            Ok(immutable_id) if immutable_id != id => {
                if store.update_email_id(&id, &immutable_id).await? {
                    outcome.migrated += 1;
                }
            }
            Ok(_) => {}
            Err(e) if e.provider_status() == Some(404) => {
                outcome.deleted += 1;
                tracing::debug!(email_id = %id, "message deleted upstream, skipping");
            }
            Err(e) => {
                outcome.errors += 1;
                tracing::warn!(email_id = %id, error = %e, "immutable id lookup failed, skipping");
            }
        }
    }

    store.set_state(MIGRATED_FLAG, "true").await?;
    tracing::info!(
        scanned = outcome.scanned,
        migrated = outcome.migrated,
        deleted = outcome.deleted,
        errors = outcome.errors,
        "immutable id migration complete"
    );

    Ok(outcome)
}
