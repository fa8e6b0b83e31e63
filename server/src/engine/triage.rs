use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::{
    classifier::{
        prompts::{ACTION_REVIEW, PRIORITY_P3},
        AutoRulesEngine, EmailClassifier, SnippetCleaner,
    },
    conf::{AppConfig, ConfigStore},
    error::AppResult,
    mail::{MailClient, MailMessage},
    store::Store,
};

use super::{
    digest::DigestGenerator,
    queue::SuggestionQueue,
    thread::ThreadContextManager,
    waiting_for::{WaitingForCheckResult, WaitingForTracker},
};
use crate::classifier::PreferenceLearner;

pub const DELTA_TOKEN_KEY: &str = "delta_token";
pub const LAST_PROCESSED_KEY: &str = "last_processed_timestamp";
const LAST_DIGEST_KEY: &str = "last_digest_run";

/// Bounds applied in dry-run mode only.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunLimits {
    pub lookback_hours: Option<u32>,
    pub max_messages: Option<usize>,
    pub sample: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct TriageCycleResult {
    pub cycle_id: String,
    pub fetched: usize,
    pub skipped_already_classified: usize,
    pub auto_ruled: usize,
    pub inherited: usize,
    pub classified: usize,
    pub failed: usize,
    pub suggestions_auto_approved: usize,
    pub suggestions_expired: u64,
    pub waiting: WaitingForCheckResult,
    pub digest_generated: bool,
    pub cycle_error: Option<String>,
}

/// Per-cycle orchestrator: fetch -> classify -> persist -> apply.
///
/// A cycle never propagates an error to the scheduler; a failure inside a
/// single email is logged and skipped, a failure of the cycle itself lands
/// in `cycle_error` on the result.
pub struct TriageEngine {
    store: Arc<Store>,
    mail: Arc<dyn MailClient>,
    config: Arc<ConfigStore>,
    classifier: Arc<EmailClassifier>,
    thread_manager: ThreadContextManager,
    auto_rules: AutoRulesEngine,
    queue: SuggestionQueue,
    tracker: WaitingForTracker,
    learner: PreferenceLearner,
    digest: DigestGenerator,
    dry_run: bool,
    limits: DryRunLimits,
}

impl TriageEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<Store>,
        mail: Arc<dyn MailClient>,
        config: Arc<ConfigStore>,
        classifier: Arc<EmailClassifier>,
        thread_manager: ThreadContextManager,
        queue: SuggestionQueue,
        tracker: WaitingForTracker,
        learner: PreferenceLearner,
        digest: DigestGenerator,
        dry_run: bool,
    ) -> Self {
        TriageEngine {
            store,
            mail,
            config,
            classifier,
            thread_manager,
            auto_rules: AutoRulesEngine,
            queue,
            tracker,
            learner,
            digest,
            dry_run,
            limits: DryRunLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: DryRunLimits) -> Self {
        self.limits = limits;
        self
    }

    pub async fn run_cycle(&self) -> TriageCycleResult {
        use tracing::Instrument;

        let cycle_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("triage_cycle", cycle_id = %cycle_id);

        let mut result = TriageCycleResult {
            cycle_id: cycle_id.clone(),
            ..Default::default()
        };

        async {
            if let Err(e) = self.run_cycle_inner(&cycle_id, &mut result).await {
                tracing::error!(error = %e, "triage cycle failed");
                result.cycle_error = Some(e.to_string());
            }

            tracing::info!(
                fetched = result.fetched,
                auto_ruled = result.auto_ruled,
                inherited = result.inherited,
                classified = result.classified,
                failed = result.failed,
                auto_approved = result.suggestions_auto_approved,
                expired = result.suggestions_expired,
                "triage cycle complete"
            );
        }
        .instrument(span)
        .await;

        result
    }

    async fn run_cycle_inner(
        &self,
        cycle_id: &str,
        result: &mut TriageCycleResult,
    ) -> AppResult<()> {
        self.config.reload_if_changed();
        let cfg = self.config.get();

        self.classifier.refresh_system_prompt(&cfg).await?;

        let since_token = self.store.get_state(DELTA_TOKEN_KEY).await?;
        let lookback_hours = self
            .limits
            .lookback_hours
            .unwrap_or(cfg.triage.lookback_hours);
        let delta = self
            .mail
            .get_delta(since_token.as_deref(), lookback_hours)
            .await?;
        result.fetched = delta.messages.len();

        // Ascending received order so thread inheritance sees already
        // classified predecessors
        let mut messages = delta.messages;
        messages.sort_by_key(|m| m.received_at);
        if let Some(max_messages) = self.limits.max_messages {
            messages.truncate(max_messages);
        }

        for message in messages {
            let message_id = message.id.clone();
            if let Err(e) = self
                .process_message(&cfg, message, cycle_id, result)
                .await
            {
                result.failed += 1;
                tracing::warn!(
                    email_id = %message_id,
                    cycle_id,
                    error = %e,
                    "message processing failed, continuing cycle"
                );
            }
        }

        if !self.dry_run {
            if let Some(next_token) = &delta.next_token {
                self.store.set_state(DELTA_TOKEN_KEY, next_token).await?;
            }
            self.store
                .set_state(LAST_PROCESSED_KEY, &Utc::now().to_rfc3339())
                .await?;
        }

        match self.queue.auto_apply(&cfg).await {
            Ok(outcome) => result.suggestions_auto_approved = outcome.approved,
            Err(e) => tracing::warn!(cycle_id, error = %e, "auto-apply pass failed"),
        }
        match self.queue.expire(&cfg).await {
            Ok(expired) => result.suggestions_expired = expired,
            Err(e) => tracing::warn!(cycle_id, error = %e, "expiry pass failed"),
        }

        result.waiting = self.tracker.check_all(&cfg, cycle_id).await;

        if let Err(e) = self.learner.check_and_update(&cfg).await {
            tracing::warn!(cycle_id, error = %e, "preference learning failed");
        }

        match self.maybe_run_digest(&cfg).await {
            Ok(generated) => result.digest_generated = generated,
            Err(e) => tracing::warn!(cycle_id, error = %e, "digest run failed"),
        }

        Ok(())
    }

    async fn process_message(
        &self,
        cfg: &AppConfig,
        message: MailMessage,
        cycle_id: &str,
        result: &mut TriageCycleResult,
    ) -> AppResult<()> {
        use entity::sea_orm_active_enums::ClassificationStatus;

        let existing = self.store.get_email(&message.id).await?;

        let snippet = message
            .body_html
            .as_deref()
            .or(message.body_text.as_deref())
            .map(|body| {
                let cleaner = SnippetCleaner::new(cfg.snippet.max_length);
                let cleaned = cleaner.clean(body, message.body_html.is_some());
                if let Some(step) = cleaned.timed_out_step {
                    tracing::warn!(email_id = %message.id, step, "snippet cleaning returned partial result");
                }
                cleaned.cleaned_text
            })
            .or_else(|| existing.as_ref().and_then(|e| e.snippet.clone()));

        let model = entity::email::Model {
            id: message.id.clone(),
            conversation_id: message.conversation_id.clone(),
            conversation_index: message.conversation_index.clone(),
            subject: message.subject.clone(),
            sender_email: message.sender_email.clone(),
            sender_name: message.sender_name.clone(),
            received_at: message.received_at,
            snippet,
            current_folder: message.current_folder.clone(),
            web_link: message.web_link.clone(),
            importance: message.importance.clone(),
            is_read: message.is_read,
            flag_status: message.flag_status.clone(),
            has_user_reply: existing.as_ref().is_some_and(|e| e.has_user_reply),
            inherited_folder: existing.as_ref().and_then(|e| e.inherited_folder.clone()),
            processed_at: existing.as_ref().and_then(|e| e.processed_at),
            classification_json: existing
                .as_ref()
                .and_then(|e| e.classification_json.clone()),
            classification_attempts: existing
                .as_ref()
                .map(|e| e.classification_attempts)
                .unwrap_or(0),
            classification_status: existing
                .as_ref()
                .map(|e| e.classification_status.clone())
                .unwrap_or(ClassificationStatus::Pending),
        };

        if !self.dry_run {
            self.store.save_email(model.clone()).await?;
        }

        if model.classification_status == ClassificationStatus::Classified {
            result.skipped_already_classified += 1;
            return Ok(());
        }

        // Failed emails retry on later cycles until the attempt cap
        if model.classification_status == ClassificationStatus::Failed
            && model.classification_attempts >= cfg.triage.classification_attempts_max
        {
            result.skipped_already_classified += 1;
            return Ok(());
        }

        if !self.dry_run {
            if let Some(sender) = &model.sender_email {
                self.store
                    .record_sender_observation(sender, model.sender_name.as_deref())
                    .await?;
            }
        }

        // Deterministic fast path first
        let sender = model.sender_email.as_deref().unwrap_or("");
        let subject = model.subject.as_deref().unwrap_or("");
        if let Some(matched) = self.auto_rules.match_rules(sender, subject, &cfg.auto_rules) {
            result.auto_ruled += 1;
            if self.dry_run {
                tracing::info!(
                    email_id = %model.id,
                    rule = %matched.rule.name,
                    folder = %matched.rule.action.folder,
                    "dry-run: auto rule match"
                );
                return Ok(());
            }

            if self
                .store
                .get_pending_suggestion_for_email(&model.id)
                .await?
                .is_none()
            {
                self.store
                    .create_suggestion(
                        &model.id,
                        &matched.rule.action.folder,
                        &matched.rule.action.priority,
                        &matched.rule.action.action_type,
                        1.0,
                        &matched.match_reason,
                    )
                    .await?;
            }
            self.store
                .mark_email_classified(
                    &model.id,
                    None,
                    Some(json!({ "source": "auto_rule", "rule": matched.rule.name }).to_string()),
                )
                .await?;
            self.store
                .log_action(
                    "auto_rule",
                    Some(&model.id),
                    Some(json!({ "rule": matched.rule.name, "folder": matched.rule.action.folder })),
                    Some("auto"),
                )
                .await?;
            return Ok(());
        }

        let ctx = self.thread_manager.build(&model, cfg).await?;

        if !self.dry_run {
            if let (Some(sender), Some(history)) = (&model.sender_email, &ctx.sender_history) {
                self.store
                    .set_sender_routing(
                        sender,
                        history.top_folder().map(|(folder, _)| folder),
                        history.is_auto_rule_candidate(),
                    )
                    .await?;
            }
        }

        if cfg.triage.inherit_folders {
            if let Some(folder) = ctx.inherited_folder.clone() {
                result.inherited += 1;
                if self.dry_run {
                    tracing::info!(email_id = %model.id, folder = %folder, "dry-run: inherited folder");
                    return Ok(());
                }

                if self
                    .store
                    .get_pending_suggestion_for_email(&model.id)
                    .await?
                    .is_none()
                {
                    self.store
                        .create_suggestion(
                            &model.id,
                            &folder,
                            PRIORITY_P3,
                            ACTION_REVIEW,
                            cfg.triage.inherited_confidence,
                            "Folder inherited from an earlier approved message in this conversation",
                        )
                        .await?;
                }
                self.store
                    .mark_email_classified(
                        &model.id,
                        Some(&folder),
                        Some(json!({ "source": "inherited", "folder": folder }).to_string()),
                    )
                    .await?;
                self.store
                    .log_action(
                        "classify",
                        Some(&model.id),
                        Some(json!({ "source": "inherited", "folder": folder })),
                        Some("auto"),
                    )
                    .await?;
                return Ok(());
            }
        }

        match self.classifier.classify(&model, &ctx, cfg, cycle_id).await {
            Ok(classification) => {
                result.classified += 1;
                if self.dry_run {
                    // Only the first `sample` classifications print at info
                    let within_sample = self
                        .limits
                        .sample
                        .map_or(true, |sample| result.classified <= sample);
                    if within_sample {
                        tracing::info!(
                            email_id = %model.id,
                            folder = %classification.folder,
                            priority = %classification.priority,
                            action = %classification.action_type,
                            confidence = classification.confidence,
                            "dry-run: classification"
                        );
                    } else {
                        tracing::debug!(
                            email_id = %model.id,
                            folder = %classification.folder,
                            "dry-run: classification"
                        );
                    }
                    return Ok(());
                }

                if self
                    .store
                    .get_pending_suggestion_for_email(&model.id)
                    .await?
                    .is_none()
                {
                    self.store
                        .create_suggestion(
                            &model.id,
                            &classification.folder,
                            &classification.priority,
                            &classification.action_type,
                            classification.confidence,
                            &classification.reasoning,
                        )
                        .await?;
                }
                self.store
                    .mark_email_classified(
                        &model.id,
                        None,
                        serde_json::to_string(&json!({
                            "folder": classification.folder,
                            "priority": classification.priority,
                            "action_type": classification.action_type,
                            "confidence": classification.confidence,
                            "reasoning": classification.reasoning,
                        }))
                        .ok(),
                    )
                    .await?;
                self.store
                    .log_action(
                        "classify",
                        Some(&model.id),
                        Some(json!({
                            "folder": classification.folder,
                            "confidence": classification.confidence,
                        })),
                        Some("auto"),
                    )
                    .await?;
            }
            Err(e) => {
                result.failed += 1;
                tracing::warn!(email_id = %model.id, cycle_id, error = %e, "classification failed");
                if !self.dry_run {
                    self.store.mark_classification_failed(&model.id).await?;
                }
            }
        }

        Ok(())
    }

    /// Daily gate: once the configured UTC hour has passed and no digest ran
    /// today, generate and deliver one.
    async fn maybe_run_digest(&self, cfg: &AppConfig) -> AppResult<bool> {
        use chrono::Timelike;

        if self.dry_run {
            return Ok(false);
        }

        let now = Utc::now();
        if now.hour() < cfg.digest.hour_utc {
            return Ok(false);
        }
        if let Some(last_run) = self.store.get_state_timestamp(LAST_DIGEST_KEY).await? {
            if last_run.date_naive() == now.date_naive() {
                return Ok(false);
            }
        }

        let Some(digest) = self.digest.generate(cfg).await? else {
            return Ok(false);
        };
        self.digest.deliver(cfg, &digest).await?;
        Ok(true)
    }
}
