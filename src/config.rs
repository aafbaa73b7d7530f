//! Configuration types for episode-grab

use crate::error::{Error, Result};
use crate::token::TokenReplacer;
use crate::types::TaskKind;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf, time::Duration};

/// Token the command processor replaces with the export command
pub const CMD_TOKEN: &str = "#CMD#";

/// Main configuration for the episode pipeline
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Worker pool sizes
    #[serde(default)]
    pub pools: PoolConfig,

    /// Retrieve failures tolerated per episode before giving up (default: 5, None = never give up)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: Option<u32>,

    /// Download stage settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Export stage settings
    #[serde(default)]
    pub export: ExportConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Capacity of the event broadcast channel (default: 1000)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pools: PoolConfig::default(),
            max_attempts: default_max_attempts(),
            download: DownloadConfig::default(),
            export: ExportConfig::default(),
            persistence: PersistenceConfig::default(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Config {
    /// Check the configuration for values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        for (name, size) in &self.pools.sizes {
            if *size == 0 {
                return Err(Error::Config {
                    message: format!("pool size for '{name}' must be at least 1"),
                    key: Some(format!("pools.sizes.{name}")),
                });
            }
        }

        if self.max_attempts == Some(0) {
            return Err(Error::Config {
                message: "max_attempts must be at least 1".into(),
                key: Some("max_attempts".into()),
            });
        }

        if !self.export.cmd_processor.contains(CMD_TOKEN) {
            return Err(Error::Config {
                message: format!("command processor must contain {CMD_TOKEN}"),
                key: Some("export.cmd_processor".into()),
            });
        }

        if self.event_buffer == 0 {
            return Err(Error::Config {
                message: "event_buffer must be at least 1".into(),
                key: Some("event_buffer".into()),
            });
        }

        fn check_guards(defs: &[ExportDefinition]) -> Result<()> {
            for def in defs {
                if let Some(condition) = &def.condition {
                    condition.compile().map_err(|e| Error::Config {
                        message: format!("invalid guard pattern for export '{}': {e}", def.name),
                        key: Some("export.exporters".into()),
                    })?;
                }
                check_guards(&def.sub_exports)?;
            }
            Ok(())
        }
        check_guards(&self.export.exporters)
    }
}

/// Worker pool sizing
///
/// Sizes resolve by pool category name first, then by stage name
/// (`search`, `category`, `retrieve`, `download`, `export`), then the stage default.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Size overrides keyed by category or stage name
    #[serde(default)]
    pub sizes: HashMap<String, usize>,
}

impl PoolConfig {
    /// Worker count for a category of the given stage
    pub fn pool_size(&self, kind: TaskKind, category: &str) -> usize {
        self.sizes
            .get(category)
            .or_else(|| self.sizes.get(kind.as_str()))
            .copied()
            .unwrap_or_else(|| kind.default_pool_size())
    }

    /// Override the size of a category or stage
    pub fn with_size(mut self, name: impl Into<String>, size: usize) -> Self {
        self.sizes.insert(name.into(), size);
        self
    }
}

/// Download stage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Output path template (default: "./downloads/#CHANNEL#/#CATEGORY#/#FILE_NAME#.#EXTENSION#")
    #[serde(default = "default_output_template")]
    pub output_template: String,

    /// Maximum length of the `#FILE_NAME#` token (None = no cut)
    #[serde(default)]
    pub file_name_cut_size: Option<usize>,

    /// Downloader used when no other downloader accepts an episode
    #[serde(default)]
    pub default_downloader: Option<String>,

    /// Record episodes as downloaded instead of grabbing them on a category's first search (default: true)
    #[serde(default = "default_true")]
    pub index_on_first_search: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_template: default_output_template(),
            file_name_cut_size: None,
            default_downloader: None,
            index_on_first_search: true,
        }
    }
}

/// Export stage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Command processor wrapping every export command (default: "sh -c #CMD#")
    #[serde(default = "default_cmd_processor")]
    pub cmd_processor: String,

    /// Kill an external command that printed nothing for this long (None = never)
    #[serde(default, with = "optional_duration_serde")]
    pub hung_timeout: Option<Duration>,

    /// Export chain, ranked depth-first
    #[serde(default)]
    pub exporters: Vec<ExportDefinition>,

    /// Exporter plugin used when a definition names none
    #[serde(default)]
    pub default_exporter: Option<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            cmd_processor: default_cmd_processor(),
            hung_timeout: None,
            exporters: Vec::new(),
            default_exporter: None,
        }
    }
}

/// One step of the export chain
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportDefinition {
    /// Step name, used in events and logs
    pub name: String,

    /// Exporter plugin running the step (also its export pool category)
    #[serde(default)]
    pub exporter: Option<String>,

    /// Command template
    pub cmd: String,

    /// Guard deciding whether the step runs
    #[serde(default)]
    pub condition: Option<ExportCondition>,

    /// Steps run after this one succeeded
    #[serde(default)]
    pub sub_exports: Vec<ExportDefinition>,
}

impl ExportDefinition {
    /// Create an unguarded step
    pub fn new(name: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exporter: None,
            cmd: cmd.into(),
            condition: None,
            sub_exports: Vec::new(),
        }
    }

    /// Guard the step
    pub fn with_condition(mut self, reference: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.condition = Some(ExportCondition {
            reference: reference.into(),
            pattern: pattern.into(),
        });
        self
    }

    /// Run the step through a named exporter plugin
    pub fn with_exporter(mut self, exporter: impl Into<String>) -> Self {
        self.exporter = Some(exporter.into());
        self
    }

    /// Append a sub-step
    pub fn with_sub_export(mut self, sub: ExportDefinition) -> Self {
        self.sub_exports.push(sub);
        self
    }

    /// Number of steps in this subtree, itself included
    pub fn step_count(&self) -> u32 {
        1 + self
            .sub_exports
            .iter()
            .map(ExportDefinition::step_count)
            .sum::<u32>()
    }

    /// Whether the guard lets the step run for the given episode tokens
    ///
    /// No guard always passes.
    pub fn guard_passes(&self, tokens: &TokenReplacer) -> Result<bool> {
        match &self.condition {
            None => Ok(true),
            Some(condition) => {
                let reference = tokens.replace(&condition.reference);
                Ok(condition.compile()?.is_match(&reference))
            }
        }
    }
}

/// Guard of an export step: the token-replaced `reference` must fully match `pattern`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportCondition {
    /// Reference string, tokens allowed
    pub reference: String,
    /// Regular expression the whole reference must match
    pub pattern: String,
}

impl ExportCondition {
    fn compile(&self) -> std::result::Result<Regex, regex::Error> {
        Regex::new(&format!("^(?:{})$", self.pattern))
    }
}

/// Persistence configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./episode-grab.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_max_attempts() -> Option<u32> {
    Some(5)
}

fn default_event_buffer() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

fn default_output_template() -> String {
    "./downloads/#CHANNEL#/#CATEGORY#/#FILE_NAME#.#EXTENSION#".into()
}

fn default_cmd_processor() -> String {
    format!("sh -c {CMD_TOKEN}")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./episode-grab.db")
}

// Optional Duration serialization helper (seconds)
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{CategoryRef, Episode};

    fn episode() -> Episode {
        Episode::new(
            CategoryRef::new("arte", "42", "ShowX").with_extension("mp4"),
            "Ep1",
            "http://x/ep1",
        )
    }

    #[test]
    fn empty_json_yields_defaults() {
        let config: Config = serde_json::from_str("{}").expect("deserialize failed");
        assert_eq!(config.max_attempts, Some(5));
        assert_eq!(config.event_buffer, 1000);
        assert!(config.download.index_on_first_search);
        assert_eq!(config.export.cmd_processor, "sh -c #CMD#");
        assert!(config.export.hung_timeout.is_none());
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn pool_size_resolution_order() {
        let pools = PoolConfig::default()
            .with_size("download", 5)
            .with_size("slow-channel", 1);

        assert_eq!(pools.pool_size(TaskKind::Download, "slow-channel"), 1);
        assert_eq!(pools.pool_size(TaskKind::Download, "arte"), 5);
        assert_eq!(pools.pool_size(TaskKind::Export, "ffmpeg"), 1);
        assert_eq!(pools.pool_size(TaskKind::Retrieve, "retrieve"), 1);
    }

    #[test]
    fn hung_timeout_is_read_as_seconds() {
        let config: Config =
            serde_json::from_str(r#"{"export": {"hung_timeout": 30}}"#).expect("deserialize failed");
        assert_eq!(config.export.hung_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn validate_rejects_zero_pool_size() {
        let config = Config {
            pools: PoolConfig::default().with_size("download", 0),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config { key: Some(k), .. } if k == "pools.sizes.download"));
    }

    #[test]
    fn validate_rejects_processor_without_cmd_token() {
        let mut config = Config::default();
        config.export.cmd_processor = "sh -c".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_nested_guard() {
        let mut config = Config::default();
        config.export.exporters = vec![
            ExportDefinition::new("a", "echo a")
                .with_sub_export(ExportDefinition::new("b", "echo b").with_condition("#EPISODE#", "(")),
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn step_count_includes_sub_exports() {
        let def = ExportDefinition::new("a", "x")
            .with_sub_export(ExportDefinition::new("b", "x").with_sub_export(ExportDefinition::new("c", "x")))
            .with_sub_export(ExportDefinition::new("d", "x"));
        assert_eq!(def.step_count(), 4);
    }

    #[test]
    fn guard_requires_full_match_of_replaced_reference() {
        let tokens = TokenReplacer::for_episode(&episode());
        let guarded = |pattern: &str| {
            ExportDefinition::new("a", "x").with_condition("#EXTENSION#", pattern)
        };

        assert!(guarded("mp4").guard_passes(&tokens).unwrap());
        assert!(guarded("mp.").guard_passes(&tokens).unwrap());
        assert!(!guarded("mp").guard_passes(&tokens).unwrap());
        assert!(!guarded("flv").guard_passes(&tokens).unwrap());
        assert!(ExportDefinition::new("b", "x").guard_passes(&tokens).unwrap());
    }
}
