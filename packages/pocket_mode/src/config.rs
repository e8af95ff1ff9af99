use anyhow::{Context, Result};
use pocket_core::LockScreenConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

// =============================================================================
// Tunable config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
//   config.toml:     [delays]
//                    lock_screen_ms = 1500
//
//   env var:         POCKET_DELAYS__LOCK_SCREEN_MS=1500   (double underscore = nesting)

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub delays: DelaysFileConfig,
    #[serde(default)]
    pub engine: EngineFileConfig,
}

/// Timer lengths (lives under `[delays]` in config.toml).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelaysFileConfig {
    /// How long the sensor must stay covered before `OnLockScreen`.
    #[serde(default = "default_lock_screen_ms")]
    pub lock_screen_ms: u64,
    /// How long proximity stays relevant after the keyguard unlocks.
    #[serde(default = "default_unlock_grace_ms")]
    pub unlock_grace_ms: u64,
}

impl Default for DelaysFileConfig {
    fn default() -> Self {
        Self {
            lock_screen_ms: default_lock_screen_ms(),
            unlock_grace_ms: default_unlock_grace_ms(),
        }
    }
}

/// Engine plumbing (lives under `[engine]` in config.toml).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineFileConfig {
    /// Capacity of the outbound event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for EngineFileConfig {
    fn default() -> Self {
        Self {
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_lock_screen_ms() -> u64 {
    1000
}
fn default_unlock_grace_ms() -> u64 {
    2000
}
fn default_event_buffer() -> usize {
    32
}

/// Build a figment that layers: defaults → config.toml → POCKET_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `POCKET_DELAYS__UNLOCK_GRACE_MS=500`  →  `delays.unlock_grace_ms = 500`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("POCKET_").split("__"))
}

/// CLI flags that sit above every figment layer.
#[derive(Clone, Copy, Debug, Default)]
pub struct DelayOverrides {
    pub lock_screen_ms: Option<u64>,
    pub unlock_grace_ms: Option<u64>,
}

impl FileConfig {
    pub fn with_overrides(mut self, overrides: DelayOverrides) -> Self {
        if let Some(ms) = overrides.lock_screen_ms {
            self.delays.lock_screen_ms = ms;
        }
        if let Some(ms) = overrides.unlock_grace_ms {
            self.delays.unlock_grace_ms = ms;
        }
        self
    }

    pub fn lock_screen_config(&self) -> LockScreenConfig {
        LockScreenConfig::new(
            Duration::from_millis(self.delays.lock_screen_ms),
            Duration::from_millis(self.delays.unlock_grace_ms),
        )
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration as TOML")
    }
}

// =============================================================================
// Resolved runtime config
// =============================================================================

#[derive(Clone, Debug)]
pub struct PocketConfig {
    pub data_dir: PathBuf,
    pub file: FileConfig,
}

impl PocketConfig {
    /// Resolve the data directory (defaults to ~/.pocket) and load every layer.
    pub fn load(custom_dir: Option<PathBuf>, overrides: DelayOverrides) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".pocket"),
        };

        let file: FileConfig = load_config(&data_dir)
            .extract()
            .with_context(|| format!("Invalid configuration in {}", data_dir.display()))?;
        let file = file.with_overrides(overrides);

        debug!(
            data_dir = %data_dir.display(),
            lock_screen_ms = file.delays.lock_screen_ms,
            unlock_grace_ms = file.delays.unlock_grace_ms,
            "Configuration loaded"
        );

        Ok(Self { data_dir, file })
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ────────────────────────────────────────────────────────

    #[test]
    fn test_file_config_defaults() {
        let fc = FileConfig::default();
        assert_eq!(fc.delays.lock_screen_ms, 1000);
        assert_eq!(fc.delays.unlock_grace_ms, 2000);
        assert_eq!(fc.engine.event_buffer, 32);
    }

    #[test]
    fn test_lock_screen_config_conversion() {
        let config = FileConfig::default().lock_screen_config();
        assert_eq!(config.lock_screen_delay, Duration::from_millis(1000));
        assert_eq!(config.unlock_grace_delay, Duration::from_secs(2));
    }

    // ── load_config ─────────────────────────────────────────────────────

    #[test]
    fn test_load_config_without_file() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert_eq!(fc, FileConfig::default());
    }

    #[test]
    fn test_load_config_toml_sets_values() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[delays]\nlock_screen_ms = 1500\n\n[engine]\nevent_buffer = 8\n",
        )
        .unwrap();
        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert_eq!(fc.delays.lock_screen_ms, 1500);
        // Untouched keys keep their defaults
        assert_eq!(fc.delays.unlock_grace_ms, 2000);
        assert_eq!(fc.engine.event_buffer, 8);
    }

    #[test]
    fn test_load_config_rejects_bad_types() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[delays]\nlock_screen_ms = \"soon\"\n",
        )
        .unwrap();
        let result: Result<FileConfig, _> = load_config(tmp.path()).extract();
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_overrides_win() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[delays]\nlock_screen_ms = 1500\nunlock_grace_ms = 900\n",
        )
        .unwrap();
        let config = PocketConfig::load(
            Some(tmp.path().to_path_buf()),
            DelayOverrides {
                lock_screen_ms: Some(250),
                unlock_grace_ms: None,
            },
        )
        .unwrap();
        assert_eq!(config.file.delays.lock_screen_ms, 250);
        assert_eq!(config.file.delays.unlock_grace_ms, 900);
        assert_eq!(config.config_toml_path(), tmp.path().join("config.toml"));
    }

    #[test]
    fn test_to_toml_reloads_identically() {
        let tmp = tempfile::tempdir().unwrap();
        let fc = FileConfig::default().with_overrides(DelayOverrides {
            lock_screen_ms: Some(700),
            unlock_grace_ms: Some(300),
        });
        std::fs::write(tmp.path().join("config.toml"), fc.to_toml().unwrap()).unwrap();
        let reloaded: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert_eq!(reloaded, fc);
    }
}
