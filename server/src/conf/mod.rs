mod store;

pub use store::ConfigStore;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";
pub const CONFIG_PATH_ENV: &str = "ASSISTANT_CONFIG_PATH";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub schema_version: u32,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub triage: TriageConfig,
    #[serde(default)]
    pub snippet: SnippetConfig,
    #[serde(default)]
    pub aging: AgingConfig,
    #[serde(default)]
    pub suggestion_queue: SuggestionQueueConfig,
    #[serde(default)]
    pub learning: LearningConfig,
    #[serde(default)]
    pub llm_logging: LlmLoggingConfig,
    #[serde(default)]
    pub digest: DigestConfig,
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
    #[serde(default)]
    pub areas: Vec<AreaConfig>,
    #[serde(default)]
    pub auto_rules: Vec<AutoRuleConfig>,
    #[serde(default)]
    pub key_contacts: Vec<KeyContactConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub token_cache_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelsConfig {
    #[serde(default = "default_triage_model")]
    pub triage: String,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default = "default_llm_rps")]
    pub requests_per_second: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriageConfig {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u32,
    #[serde(default = "default_true")]
    pub inherit_folders: bool,
    #[serde(default = "default_inherited_confidence")]
    pub inherited_confidence: f32,
    #[serde(default = "default_max_attempts")]
    pub classification_attempts_max: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnippetConfig {
    #[serde(default = "default_snippet_max")]
    pub max_length: usize,
    #[serde(default = "default_context_max")]
    pub context_max_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgingConfig {
    #[serde(default = "default_needs_reply_warning")]
    pub needs_reply_warning_hours: i64,
    #[serde(default = "default_needs_reply_critical")]
    pub needs_reply_critical_hours: i64,
    #[serde(default = "default_wf_nudge")]
    pub waiting_for_nudge_hours: i64,
    #[serde(default = "default_wf_escalate")]
    pub waiting_for_escalate_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuggestionQueueConfig {
    #[serde(default = "default_expire_days")]
    pub expire_after_days: i64,
    #[serde(default = "default_auto_approve_confidence")]
    pub auto_approve_confidence: f32,
    #[serde(default = "default_auto_approve_delay")]
    pub auto_approve_delay_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LearningConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_learning_lookback")]
    pub lookback_days: i64,
    #[serde(default = "default_min_corrections")]
    pub min_corrections_to_update: usize,
    #[serde(default = "default_max_pref_words")]
    pub max_preferences_words: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmLoggingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub log_prompts: bool,
    #[serde(default = "default_true")]
    pub log_responses: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DigestConfig {
    #[serde(default = "default_digest_delivery")]
    pub delivery: DigestDelivery,
    #[serde(default = "default_digest_dir")]
    pub output_dir: String,
    #[serde(default = "default_digest_hour")]
    pub hour_utc: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestDelivery {
    Stdout,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    pub name: String,
    pub folder: String,
    #[serde(default)]
    pub signals: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AreaConfig {
    pub name: String,
    pub folder: String,
    #[serde(default)]
    pub signals: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutoRuleConfig {
    pub name: String,
    #[serde(rename = "match")]
    pub matcher: RulePatterns,
    pub action: RuleAction,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RulePatterns {
    #[serde(default)]
    pub senders: Vec<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleAction {
    pub folder: String,
    pub priority: String,
    pub action_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyContactConfig {
    pub name: String,
    pub email: String,
}

fn default_triage_model() -> String {
    "claude-haiku-4-5".to_string()
}

fn default_llm_rps() -> f64 {
    2.0
}

fn default_db_path() -> String {
    "data/assistant.db".to_string()
}

fn default_interval_minutes() -> u32 {
    15
}

fn default_lookback_hours() -> u32 {
    24
}

fn default_inherited_confidence() -> f32 {
    0.85
}

fn default_max_attempts() -> i32 {
    3
}

fn default_snippet_max() -> usize {
    1000
}

fn default_context_max() -> usize {
    500
}

fn default_needs_reply_warning() -> i64 {
    24
}

fn default_needs_reply_critical() -> i64 {
    48
}

fn default_wf_nudge() -> i64 {
    48
}

fn default_wf_escalate() -> i64 {
    96
}

fn default_expire_days() -> i64 {
    7
}

fn default_auto_approve_confidence() -> f32 {
    0.90
}

fn default_auto_approve_delay() -> i64 {
    2
}

fn default_learning_lookback() -> i64 {
    7
}

fn default_min_corrections() -> usize {
    5
}

fn default_max_pref_words() -> usize {
    200
}

fn default_true() -> bool {
    true
}

fn default_digest_delivery() -> DigestDelivery {
    DigestDelivery::Stdout
}

fn default_digest_dir() -> String {
    "data".to_string()
}

fn default_digest_hour() -> u32 {
    7
}

impl Default for ModelsConfig {
    fn default() -> Self {
        ModelsConfig {
            triage: default_triage_model(),
            digest: None,
            requests_per_second: default_llm_rps(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: default_db_path(),
        }
    }
}

impl Default for TriageConfig {
    fn default() -> Self {
        TriageConfig {
            interval_minutes: default_interval_minutes(),
            lookback_hours: default_lookback_hours(),
            inherit_folders: true,
            inherited_confidence: default_inherited_confidence(),
            classification_attempts_max: default_max_attempts(),
        }
    }
}

impl Default for SnippetConfig {
    fn default() -> Self {
        SnippetConfig {
            max_length: default_snippet_max(),
            context_max_length: default_context_max(),
        }
    }
}

impl Default for AgingConfig {
    fn default() -> Self {
        AgingConfig {
            needs_reply_warning_hours: default_needs_reply_warning(),
            needs_reply_critical_hours: default_needs_reply_critical(),
            waiting_for_nudge_hours: default_wf_nudge(),
            waiting_for_escalate_hours: default_wf_escalate(),
        }
    }
}

impl Default for SuggestionQueueConfig {
    fn default() -> Self {
        SuggestionQueueConfig {
            expire_after_days: default_expire_days(),
            auto_approve_confidence: default_auto_approve_confidence(),
            auto_approve_delay_hours: default_auto_approve_delay(),
        }
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        LearningConfig {
            enabled: false,
            lookback_days: default_learning_lookback(),
            min_corrections_to_update: default_min_corrections(),
            max_preferences_words: default_max_pref_words(),
        }
    }
}

impl Default for LlmLoggingConfig {
    fn default() -> Self {
        LlmLoggingConfig {
            enabled: true,
            log_prompts: true,
            log_responses: true,
        }
    }
}

impl Default for DigestConfig {
    fn default() -> Self {
        DigestConfig {
            delivery: DigestDelivery::Stdout,
            output_dir: default_digest_dir(),
            hour_utc: default_digest_hour(),
        }
    }
}

impl AppConfig {
    /// Semantic checks that serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version > CURRENT_SCHEMA_VERSION {
            return Err(format!(
                "config schema version {} is newer than supported version {}",
                self.schema_version, CURRENT_SCHEMA_VERSION
            ));
        }
        if self.triage.interval_minutes == 0 {
            return Err("triage.interval_minutes must be at least 1".to_string());
        }
        if self.snippet.max_length == 0 {
            return Err("snippet.max_length must be at least 1".to_string());
        }
        let confidence = self.suggestion_queue.auto_approve_confidence;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(format!(
                "suggestion_queue.auto_approve_confidence must be within [0, 1], got {confidence}"
            ));
        }
        if !(0.0..=1.0).contains(&self.triage.inherited_confidence) {
            return Err("triage.inherited_confidence must be within [0, 1]".to_string());
        }
        for (i, project) in self.projects.iter().enumerate() {
            if project.folder.trim().is_empty() {
                return Err(format!("projects[{i}].folder must not be empty"));
            }
        }
        for (i, area) in self.areas.iter().enumerate() {
            if area.folder.trim().is_empty() {
                return Err(format!("areas[{i}].folder must not be empty"));
            }
        }
        for (i, rule) in self.auto_rules.iter().enumerate() {
            if rule.action.folder.trim().is_empty() {
                return Err(format!("auto_rules[{i}].action.folder must not be empty"));
            }
        }
        Ok(())
    }

    /// Every folder named in the taxonomy, projects before areas.
    pub fn taxonomy_folders(&self) -> Vec<&str> {
        self.projects
            .iter()
            .map(|p| p.folder.as_str())
            .chain(self.areas.iter().map(|a| a.folder.as_str()))
            .collect()
    }
}

pub fn config_path_from_env() -> PathBuf {
    match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_CONFIG_PATH),
    }
}

/// Load and validate a config file. Always reads fresh from disk; cached
/// access with hot-reload goes through [`ConfigStore`].
pub fn load_config(path: &Path) -> AppResult<AppConfig> {
    if !path.exists() {
        return Err(AppError::ConfigLoad(format!(
            "configuration file not found: {}",
            path.display()
        )));
    }

    // Explicit format so temp files from the atomic-rewrite path parse too
    let builder = config::Config::builder()
        .add_source(config::File::from(path).format(config::FileFormat::Yaml))
        .build()
        .map_err(|e| AppError::ConfigLoad(format!("failed to parse {}: {e}", path.display())))?;

    let cfg: AppConfig = builder
        .try_deserialize()
        .map_err(|e| AppError::ConfigValidation(format!("{}: {e}", path.display())))?;

    cfg.validate()
        .map_err(|msg| AppError::ConfigValidation(format!("{}: {msg}", path.display())))?;

    tracing::debug!(
        path = %path.display(),
        schema_version = cfg.schema_version,
        projects = cfg.projects.len(),
        areas = cfg.areas.len(),
        auto_rules = cfg.auto_rules.len(),
        "configuration loaded"
    );

    Ok(cfg)
}

/// Validate a config file without touching any cached snapshot. Used by the
/// `validate-config` CLI command.
pub fn validate_config_file(path: &Path) -> (bool, String) {
    match load_config(path) {
        Ok(cfg) => (
            true,
            format!(
                "Configuration valid (schema version {})\n  - {} projects\n  - {} areas\n  - {} auto-rules\n  - {} key contacts",
                cfg.schema_version,
                cfg.projects.len(),
                cfg.areas.len(),
                cfg.auto_rules.len(),
                cfg.key_contacts.len(),
            ),
        ),
        Err(e) => (false, e.to_string()),
    }
}
