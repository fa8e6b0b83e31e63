use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use chrono::Utc;

use crate::error::{AppError, AppResult};

use super::{load_config, AppConfig};

/// Cached configuration snapshot with mtime-gated hot reload and an atomic
/// rewrite path. Readers take an `Arc<AppConfig>` and keep it for the rest
/// of their cycle; the snapshot is swapped as a whole.
pub struct ConfigStore {
    inner: Mutex<Inner>,
}

struct Inner {
    path: PathBuf,
    snapshot: Arc<AppConfig>,
    mtime: Option<SystemTime>,
}

impl ConfigStore {
    pub fn load(path: PathBuf) -> AppResult<Self> {
        let cfg = load_config(&path)?;
        let mtime = fs::metadata(&path).and_then(|m| m.modified()).ok();
        Ok(ConfigStore {
            inner: Mutex::new(Inner {
                path,
                snapshot: Arc::new(cfg),
                mtime,
            }),
        })
    }

    /// Snapshot-only store for tests; there is no backing file.
    #[cfg(test)]
    pub fn for_tests(cfg: AppConfig) -> Self {
        ConfigStore {
            inner: Mutex::new(Inner {
                path: PathBuf::from("/nonexistent/config.yaml"),
                snapshot: Arc::new(cfg),
                mtime: None,
            }),
        }
    }

    pub fn get(&self) -> Arc<AppConfig> {
        self.inner.lock().unwrap().snapshot.clone()
    }

    pub fn path(&self) -> PathBuf {
        self.inner.lock().unwrap().path.clone()
    }

    /// Reload the file if its mtime moved past the cached value.
    ///
    /// An invalid rewrite keeps the previous snapshot and advances the cached
    /// mtime so the broken file is not re-parsed on every cycle.
    pub fn reload_if_changed(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();

        let current_mtime = match fs::metadata(&inner.path).and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            Err(e) => {
                tracing::warn!(path = %inner.path.display(), error = %e, "failed to stat config file");
                return false;
            }
        };

        if inner.mtime.is_some_and(|cached| current_mtime <= cached) {
            return false;
        }

        tracing::info!(path = %inner.path.display(), "configuration file changed, attempting reload");

        match load_config(&inner.path) {
            Ok(cfg) => {
                inner.snapshot = Arc::new(cfg);
                inner.mtime = Some(current_mtime);
                tracing::info!(path = %inner.path.display(), "configuration reloaded");
                true
            }
            Err(e) => {
                tracing::warn!(
                    path = %inner.path.display(),
                    error = %e,
                    "configuration reload failed, keeping previous config"
                );
                inner.mtime = Some(current_mtime);
                false
            }
        }
    }

    /// Atomically rewrite the config file.
    ///
    /// Serializes to a sibling temp file, round-trip validates the temp, backs
    /// up the prior file, then renames over the target. A round-trip failure
    /// leaves the original untouched.
    pub fn write_safely(&self, cfg: &AppConfig) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let path = inner.path.clone();

        let serialized = serde_yaml::to_string(cfg)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("config serialization failed: {e}")))?;

        let tmp_path = sibling_tmp_path(&path);
        fs::write(&tmp_path, &serialized).map_err(|e| {
            AppError::Internal(anyhow::anyhow!(
                "failed to write temp config {}: {e}",
                tmp_path.display()
            ))
        })?;

        // Round-trip check against the temp file before replacing anything
        if let Err(e) = load_config(&tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(AppError::ConfigValidation(format!(
                "rewritten config failed round-trip validation, original left intact: {e}"
            )));
        }

        if path.exists() {
            let backup = backup_path(&path);
            if let Err(e) = fs::copy(&path, &backup) {
                let _ = fs::remove_file(&tmp_path);
                return Err(AppError::Internal(anyhow::anyhow!(
                    "failed to back up config to {}: {e}",
                    backup.display()
                )));
            }
            tracing::info!(backup = %backup.display(), "config backup created");
        }

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            AppError::Internal(anyhow::anyhow!(
                "failed to replace config {}: {e}",
                path.display()
            ))
        })?;

        inner.snapshot = Arc::new(cfg.clone());
        inner.mtime = fs::metadata(&path).and_then(|m| m.modified()).ok();

        tracing::info!(path = %path.display(), "configuration rewritten");
        Ok(())
    }
}

fn sibling_tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config.yaml".to_string());
    name.push_str(".tmp");
    path.with_file_name(format!(".{name}"))
}

fn backup_path(path: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%d%H%M%S");
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config.yaml".to_string());
    path.with_file_name(format!("{name}.{stamp}.bak"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::{AutoRuleConfig, RuleAction, RulePatterns};

    fn minimal_yaml() -> &'static str {
        indoc::indoc! {r#"
            schema_version: 1
            projects:
              - name: Steelworks
                folder: Projects/Steelworks
                signals: ["steel", "tonnage"]
            areas:
              - name: Finance
                folder: Areas/Finance
            auto_rules:
              - name: newsletters
                match:
                  senders: ["*@news.example.com"]
                action:
                  folder: Reference/Newsletters
                  priority: "P4 - Low"
                  action_type: FYI
        "#}
    }

    fn write_store(dir: &Path) -> ConfigStore {
        let path = dir.join("config.yaml");
        fs::write(&path, minimal_yaml()).unwrap();
        ConfigStore::load(path).unwrap()
    }

    #[test]
    fn load_parses_sections_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = write_store(dir.path());
        let cfg = store.get();
        assert_eq!(cfg.schema_version, 1);
        assert_eq!(cfg.projects.len(), 1);
        assert_eq!(cfg.suggestion_queue.auto_approve_delay_hours, 2);
        assert_eq!(cfg.snippet.max_length, 1000);
    }

    #[test]
    fn newer_schema_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "schema_version: 99\n").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, AppError::ConfigValidation(_)));
    }

    #[test]
    fn unknown_fields_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "schema_version: 1\nnot_a_section: true\n").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, AppError::ConfigValidation(_)));
    }

    #[test]
    fn reload_keeps_previous_snapshot_on_invalid_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = write_store(dir.path());
        let path = store.path();

        // Overwrite with garbage, bump mtime past the cached value
        fs::write(&path, "{{{ not yaml").unwrap();
        let future = SystemTime::now() + std::time::Duration::from_secs(5);
        let _ = filetime_set(&path, future);

        assert!(!store.reload_if_changed());
        assert_eq!(store.get().projects.len(), 1);

        // Unchanged file is not re-parsed
        assert!(!store.reload_if_changed());
    }

    #[test]
    fn reload_picks_up_valid_change() {
        let dir = tempfile::tempdir().unwrap();
        let store = write_store(dir.path());
        let path = store.path();

        let updated = minimal_yaml().replace("Projects/Steelworks", "Projects/Renamed");
        fs::write(&path, updated).unwrap();
        let future = SystemTime::now() + std::time::Duration::from_secs(5);
        let _ = filetime_set(&path, future);

        assert!(store.reload_if_changed());
        assert_eq!(store.get().projects[0].folder, "Projects/Renamed");
    }

    #[test]
    fn write_safely_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = write_store(dir.path());

        let mut cfg = (*store.get()).clone();
        cfg.auto_rules.push(AutoRuleConfig {
            name: "invoices".to_string(),
            matcher: RulePatterns {
                senders: vec!["billing@vendor.example".to_string()],
                subjects: vec![],
            },
            action: RuleAction {
                folder: "Areas/Finance".to_string(),
                priority: "P3 - Routine".to_string(),
                action_type: "File".to_string(),
            },
        });
        store.write_safely(&cfg).unwrap();

        let reloaded = load_config(&store.path()).unwrap();
        assert_eq!(reloaded.auto_rules.len(), 2);
        assert_eq!(reloaded.auto_rules[1].name, "invoices");

        // A timestamped backup of the prior file exists
        let backups: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".bak"))
            .collect();
        assert_eq!(backups.len(), 1);
    }

    #[test]
    fn write_safely_rejects_invalid_config_and_preserves_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = write_store(dir.path());
        let before = fs::read(store.path()).unwrap();

        let mut cfg = (*store.get()).clone();
        cfg.suggestion_queue.auto_approve_confidence = 3.0;
        let err = store.write_safely(&cfg).unwrap_err();
        assert!(matches!(err, AppError::ConfigValidation(_)));

        let after = fs::read(store.path()).unwrap();
        assert_eq!(before, after);
    }

    fn filetime_set(path: &Path, to: SystemTime) -> std::io::Result<()> {
        let file = fs::OpenOptions::new().append(true).open(path)?;
        file.set_modified(to)
    }
}
