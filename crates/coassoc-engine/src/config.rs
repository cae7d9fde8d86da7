//! Engine configuration.
//!
//! Every field has a default, so a configuration file only needs to name
//! the values it changes.
//!
//! ```
//! use coassoc_engine::config::EngineConfig;
//!
//! let config: EngineConfig =
//!     serde_json::from_str(r#"{ "confidence": 0.95, "similarity": { "limit": 5 } }"#).unwrap();
//! assert_eq!(config.confidence, 0.95);
//! assert_eq!(config.similarity.limit, 5);
//! assert_eq!(config.similarity.threshold, 0.7);
//! assert_eq!(config.source_to_target.iterations, 1000);
//! config.validate().unwrap();
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    similarity::SimilarityParams, source_target::SourceToTargetParams,
    suppression::SuppressionPolicy,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Confidence level of every interval, e.g. `0.99` for 99%.
    pub confidence: f64,
    /// Non-finite results are clipped into `[-clip_limit, clip_limit]`.
    pub clip_limit: f64,
    /// Bonferroni-adjust chi-square p-values by the dataset's pair count.
    pub bonferroni: bool,
    pub suppression: SuppressionPolicy,
    pub similarity: SimilarityParams,
    pub source_to_target: SourceToTargetParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confidence: 0.99,
            clip_limit: 999.0,
            bonferroni: false,
            suppression: SuppressionPolicy::default(),
            similarity: SimilarityParams::default(),
            source_to_target: SourceToTargetParams::default(),
        }
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ConfigError {
    #[display("confidence must be in [0, 1), got {value}")]
    Confidence { value: f64 },
    #[display("clip limit must be positive, got {value}")]
    ClipLimit { value: f64 },
    #[display("{field} threshold must be in [0, 1], got {value}")]
    Threshold { field: &'static str, value: f64 },
    #[display("bootstrap iterations must be positive")]
    Iterations,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&self.confidence) {
            return Err(ConfigError::Confidence {
                value: self.confidence,
            });
        }
        if self.clip_limit.is_nan() || self.clip_limit <= 0.0 {
            return Err(ConfigError::ClipLimit {
                value: self.clip_limit,
            });
        }
        for (field, value) in [
            ("similarity", self.similarity.threshold),
            (
                "source-to-target similarity",
                self.source_to_target.similarity.threshold,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Threshold { field, value });
            }
        }
        if self.source_to_target.iterations == 0 {
            return Err(ConfigError::Iterations);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.suppression.estimate, 5);
        assert!(config.similarity.exclude_related);
        assert_eq!(config.similarity.same_day.threshold, 0.05);
        assert!(!config.source_to_target.similarity.exclude_related);
        assert_eq!(config.source_to_target.similarity.limit, 100);
        assert_eq!(config.source_to_target.min_comparisons, 5);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let config = EngineConfig {
            confidence: 1.0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Confidence { .. })));

        let mut config = EngineConfig::default();
        config.source_to_target.iterations = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Iterations)));

        let mut config = EngineConfig::default();
        config.similarity.threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Threshold {
                field: "similarity",
                ..
            })
        ));

        let config = EngineConfig {
            clip_limit: f64::NAN,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ClipLimit { .. })));
    }

    #[test]
    fn test_round_trips_through_json() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
        assert!(json.contains("\"mode\":\"relative_source\""));
    }
}
