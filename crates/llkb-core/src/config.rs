use crate::error::{LlkbError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ExtractionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionConfig {
    /// Minimum confidence for a lesson/component to be suggested.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_true")]
    pub predictive_extraction: bool,
    #[serde(default = "default_max_per_journey")]
    pub max_predictive_per_journey: u32,
    #[serde(default = "default_max_per_day")]
    pub max_predictive_per_day: u32,
    /// Soft cap: exceeding it only produces a warning.
    #[serde(default = "default_max_total_components")]
    pub max_total_components: usize,
    #[serde(default = "default_min_lines")]
    pub min_lines_for_extraction: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_auto_extract_score")]
    pub auto_extract_score: u32,
    #[serde(default = "default_consider_score")]
    pub consider_score: u32,
}

fn default_confidence_threshold() -> f64 {
    0.7
}

fn default_true() -> bool {
    true
}

fn default_max_per_journey() -> u32 {
    3
}

fn default_max_per_day() -> u32 {
    10
}

fn default_max_total_components() -> usize {
    100
}

fn default_min_lines() -> usize {
    3
}

fn default_similarity_threshold() -> f64 {
    0.8
}

fn default_auto_extract_score() -> u32 {
    15
}

fn default_consider_score() -> u32 {
    10
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            predictive_extraction: default_true(),
            max_predictive_per_journey: default_max_per_journey(),
            max_predictive_per_day: default_max_per_day(),
            max_total_components: default_max_total_components(),
            min_lines_for_extraction: default_min_lines(),
            similarity_threshold: default_similarity_threshold(),
            auto_extract_score: default_auto_extract_score(),
            consider_score: default_consider_score(),
        }
    }
}

// ---------------------------------------------------------------------------
// RetentionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionConfig {
    /// Days without a success before a lesson is considered stale.
    #[serde(default = "default_max_lesson_age")]
    pub max_lesson_age: i64,
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,
    /// Days a component may stay under `min_uses_to_keep` before archiving.
    #[serde(default = "default_archive_unused")]
    pub archive_unused: i64,
    #[serde(default = "default_min_uses")]
    pub min_uses_to_keep: u32,
    #[serde(default = "default_history_retention")]
    pub history_retention_days: i64,
}

/// Upper bound for the day-count settings; about a century.
pub const MAX_RETENTION_DAYS: i64 = 36_500;

fn default_max_lesson_age() -> i64 {
    90
}

fn default_min_success_rate() -> f64 {
    0.6
}

fn default_archive_unused() -> i64 {
    30
}

fn default_min_uses() -> u32 {
    2
}

fn default_history_retention() -> i64 {
    365
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_lesson_age: default_max_lesson_age(),
            min_success_rate: default_min_success_rate(),
            archive_unused: default_archive_unused(),
            min_uses_to_keep: default_min_uses(),
            history_retention_days: default_history_retention(),
        }
    }
}

// ---------------------------------------------------------------------------
// ConfidenceConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceConfig {
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,
    /// Fractional drop below the trailing mean that counts as declining.
    #[serde(default = "default_declining_drop")]
    pub declining_drop: f64,
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

fn default_review_threshold() -> f64 {
    0.4
}

fn default_declining_drop() -> f64 {
    0.2
}

fn default_history_window() -> usize {
    30
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            review_threshold: default_review_threshold(),
            declining_drop: default_declining_drop(),
            history_window: default_history_window(),
        }
    }
}

// ---------------------------------------------------------------------------
// LearningConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningConfig {
    /// Mutations recorded before analytics are recomputed automatically.
    #[serde(default = "default_batch_size")]
    pub analytics_batch_size: usize,
    #[serde(default = "default_override_threshold")]
    pub override_review_threshold: u32,
}

fn default_batch_size() -> usize {
    5
}

fn default_override_threshold() -> u32 {
    3
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            analytics_batch_size: default_batch_size(),
            override_review_threshold: default_override_threshold(),
        }
    }
}

// ---------------------------------------------------------------------------
// LlkbConfig (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlkbConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub learning: LearningConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for LlkbConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            extraction: ExtractionConfig::default(),
            retention: RetentionConfig::default(),
            confidence: ConfidenceConfig::default(),
            learning: LearningConfig::default(),
        }
    }
}

impl LlkbConfig {
    /// Load `config.yml`. A missing file yields the defaults; a malformed one
    /// is a `ConfigInvalid` error.
    pub fn try_load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&data)
            .map_err(|e| LlkbError::ConfigInvalid(format!("{}: {e}", path.display())))
    }

    /// Load `config.yml`, falling back to the defaults when it can't be parsed
    /// or fails validation with an error.
    pub fn load(root: &Path) -> Self {
        let cfg = match Self::try_load(root) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(error = %e, "using default llkb config");
                return Self::default();
            }
        };
        let errors: Vec<String> = cfg
            .validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect();
        if errors.is_empty() {
            return cfg;
        }
        tracing::warn!(errors = %errors.join("; "), "invalid llkb config, using defaults");
        Self::default()
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut error = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message,
            })
        };

        for (name, value) in [
            (
                "extraction.confidenceThreshold",
                self.extraction.confidence_threshold,
            ),
            (
                "extraction.similarityThreshold",
                self.extraction.similarity_threshold,
            ),
            ("retention.minSuccessRate", self.retention.min_success_rate),
            ("confidence.reviewThreshold", self.confidence.review_threshold),
            ("confidence.decliningDrop", self.confidence.declining_drop),
        ] {
            if !(0.0..=1.0).contains(&value) {
                error(format!("{name} must be between 0 and 1, got {value}"));
            }
        }

        for (name, days) in [
            ("retention.maxLessonAge", self.retention.max_lesson_age),
            ("retention.archiveUnused", self.retention.archive_unused),
            (
                "retention.historyRetentionDays",
                self.retention.history_retention_days,
            ),
        ] {
            if !(1..=MAX_RETENTION_DAYS).contains(&days) {
                error(format!(
                    "{name} must be between 1 and {MAX_RETENTION_DAYS} days, got {days}"
                ));
            }
        }

        if self.extraction.consider_score > self.extraction.auto_extract_score {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "extraction.considerScore ({}) is above autoExtractScore ({})",
                    self.extraction.consider_score, self.extraction.auto_extract_score
                ),
            });
        }

        if self.extraction.predictive_extraction
            && (self.extraction.max_predictive_per_journey == 0
                || self.extraction.max_predictive_per_day == 0)
        {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "predictive extraction is enabled but a rate limit of 0 blocks it"
                    .to_string(),
            });
        }

        if self.confidence.history_window == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "confidence.historyWindow is 0; declining detection is disabled"
                    .to_string(),
            });
        }

        if self.learning.analytics_batch_size == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "learning.analyticsBatchSize is 0; analytics refresh after every mutation"
                    .to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = LlkbConfig::default();
        assert_eq!(cfg.extraction.confidence_threshold, 0.7);
        assert!(cfg.extraction.predictive_extraction);
        assert_eq!(cfg.extraction.max_predictive_per_journey, 3);
        assert_eq!(cfg.extraction.max_predictive_per_day, 10);
        assert_eq!(cfg.extraction.min_lines_for_extraction, 3);
        assert_eq!(cfg.extraction.similarity_threshold, 0.8);
        assert_eq!(cfg.retention.max_lesson_age, 90);
        assert_eq!(cfg.retention.min_success_rate, 0.6);
        assert_eq!(cfg.retention.archive_unused, 30);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = LlkbConfig::try_load(dir.path()).unwrap();
        assert_eq!(cfg.extraction.max_predictive_per_day, 10);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            paths::config_path(dir.path()),
            "extraction:\n  predictiveExtraction: false\n  maxPredictivePerDay: 4\n",
        )
        .unwrap();
        let cfg = LlkbConfig::try_load(dir.path()).unwrap();
        assert!(!cfg.extraction.predictive_extraction);
        assert_eq!(cfg.extraction.max_predictive_per_day, 4);
        assert_eq!(cfg.extraction.max_predictive_per_journey, 3);
        assert_eq!(cfg.retention.max_lesson_age, 90);
    }

    #[test]
    fn malformed_file_is_config_invalid() {
        let dir = TempDir::new().unwrap();
        std::fs::write(paths::config_path(dir.path()), "extraction: [not, a, map").unwrap();
        let err = LlkbConfig::try_load(dir.path()).unwrap_err();
        assert!(matches!(err, LlkbError::ConfigInvalid(_)));

        let cfg = LlkbConfig::load(dir.path());
        assert_eq!(cfg.extraction.similarity_threshold, 0.8);
    }

    #[test]
    fn save_and_reload() {
        let dir = TempDir::new().unwrap();
        let mut cfg = LlkbConfig::default();
        cfg.learning.override_review_threshold = 5;
        cfg.save(dir.path()).unwrap();
        let yaml = std::fs::read_to_string(paths::config_path(dir.path())).unwrap();
        assert!(yaml.contains("overrideReviewThreshold: 5"));
        let loaded = LlkbConfig::try_load(dir.path()).unwrap();
        assert_eq!(loaded.learning.override_review_threshold, 5);
    }

    #[test]
    fn validate_flags_out_of_range_thresholds() {
        let mut cfg = LlkbConfig::default();
        cfg.extraction.similarity_threshold = 1.5;
        cfg.extraction.consider_score = 20;
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("similarityThreshold")));
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Warning && w.message.contains("considerScore")));
    }

    #[test]
    fn validate_rejects_out_of_range_day_counts() {
        for yaml in [
            "retention:\n  historyRetentionDays: -1\n",
            "retention:\n  historyRetentionDays: 9000000000000\n",
            "retention:\n  archiveUnused: 0\n",
        ] {
            let cfg: LlkbConfig = serde_yaml::from_str(yaml).unwrap();
            let warnings = cfg.validate();
            assert!(
                warnings.iter().any(|w| w.level == WarnLevel::Error),
                "{yaml}: {warnings:?}"
            );
        }
    }

    #[test]
    fn load_falls_back_on_validation_errors() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            paths::config_path(dir.path()),
            "retention:\n  historyRetentionDays: -1\nlearning:\n  overrideReviewThreshold: 7\n",
        )
        .unwrap();
        assert_eq!(
            LlkbConfig::try_load(dir.path()).unwrap().retention.history_retention_days,
            -1
        );
        let cfg = LlkbConfig::load(dir.path());
        assert_eq!(cfg.retention.history_retention_days, 365);
        assert_eq!(cfg.learning.override_review_threshold, 3);
    }
}
