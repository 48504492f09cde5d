//! Analysis configuration

use crate::metrics::{default_twitch_width_percents, MetricKind, MetricsSettings};
use crate::peaks::{
    Detector, NoiseBasedConfig, NoiseBasedDetector, PeakDetectorConfig, PeakValleyIndices, ProminenceDetector,
    WindowBounds,
};
use myo_core::{config_error, MyoResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which peak/valley detector to run, with its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum DetectorStrategy {
    Prominence(PeakDetectorConfig),
    NoiseBased(NoiseBasedConfig),
}

impl Default for DetectorStrategy {
    fn default() -> Self {
        DetectorStrategy::Prominence(PeakDetectorConfig::default())
    }
}

impl DetectorStrategy {
    pub fn validate(&self) -> MyoResult<()> {
        match self {
            DetectorStrategy::Prominence(config) => config.validate(),
            DetectorStrategy::NoiseBased(config) => config.validate(),
        }
    }

    pub fn build(&self) -> MyoResult<Box<dyn Detector>> {
        Ok(match self {
            DetectorStrategy::Prominence(config) => Box::new(ProminenceDetector::new(config.clone())?),
            DetectorStrategy::NoiseBased(config) => Box::new(NoiseBasedDetector::new(config.clone())?),
        })
    }

    /// Same strategy with the window and polarity replaced
    fn with_window(&self, window: WindowBounds, twitches_point_up: bool) -> Self {
        match self {
            DetectorStrategy::Prominence(config) => DetectorStrategy::Prominence(PeakDetectorConfig {
                window,
                twitches_point_up,
                ..config.clone()
            }),
            DetectorStrategy::NoiseBased(config) => DetectorStrategy::NoiseBased(NoiseBasedConfig {
                window,
                twitches_point_up,
                ..config.clone()
            }),
        }
    }
}

/// Everything a caller can tune about per-well analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub detector: DetectorStrategy,
    /// Takes precedence over any window inside `detector`
    pub window: WindowBounds,
    /// Takes precedence over the polarity inside `detector`
    pub twitches_point_up: bool,
    pub twitch_width_percents: Vec<u32>,
    /// (baseline-to-peak, peak-to-baseline) percent levels
    pub baseline_widths: (u32, u32),
    pub metrics_to_create: BTreeSet<MetricKind>,
    pub rounded: bool,
    /// User-chosen peaks and valleys; bypasses detection when set
    pub override_indices: Option<PeakValleyIndices>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            detector: DetectorStrategy::default(),
            window: WindowBounds::default(),
            twitches_point_up: true,
            twitch_width_percents: default_twitch_width_percents(),
            baseline_widths: (10, 90),
            metrics_to_create: MetricKind::ALL.iter().copied().collect(),
            rounded: false,
            override_indices: None,
        }
    }
}

impl AnalysisConfig {
    /// Defaults with the noise-adaptive detector
    pub fn noise_based() -> Self {
        AnalysisConfig {
            detector: DetectorStrategy::NoiseBased(NoiseBasedConfig::default()),
            ..AnalysisConfig::default()
        }
    }

    pub fn with_window(mut self, start_time: f64, end_time: Option<f64>) -> Self {
        self.window = WindowBounds::new(start_time, end_time);
        self
    }

    pub fn validate(&self) -> MyoResult<()> {
        self.window.validate()?;
        self.detector.validate()?;
        self.metrics_settings().validate()?;
        if self.metrics_to_create.is_empty() {
            return Err(config_error!("At least one metric must be requested"));
        }
        if let Some(indices) = &self.override_indices {
            for (name, list) in [("peak", &indices.peaks), ("valley", &indices.valleys)] {
                if list.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(config_error!("Override {} indices must be strictly increasing", name));
                }
            }
        }
        Ok(())
    }

    /// Detector for this configuration, carrying its window and polarity
    pub fn build_detector(&self) -> MyoResult<Box<dyn Detector>> {
        self.detector
            .with_window(self.window, self.twitches_point_up)
            .build()
    }

    pub fn metrics_settings(&self) -> MetricsSettings {
        MetricsSettings {
            metrics: self.metrics_to_create.clone(),
            twitch_width_percents: self.twitch_width_percents.clone(),
            baseline_widths: self.baseline_widths,
            rounded: self.rounded,
        }
    }

    /// Export configuration to JSON
    pub fn to_json(&self) -> MyoResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| config_error!("Failed to serialize configuration: {}", e))
    }

    /// Import configuration from JSON
    pub fn from_json(json: &str) -> MyoResult<Self> {
        serde_json::from_str(json).map_err(|e| config_error!("Failed to deserialize configuration: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use myo_core::MyoError;

    #[test]
    fn test_default_config_is_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.twitch_width_percents.len(), 17);
        assert_eq!(config.metrics_to_create.len(), 13);
        assert!(AnalysisConfig::noise_based().validate().is_ok());
    }

    #[test]
    fn test_window_validation() {
        assert!(AnalysisConfig::default().with_window(-1.0, None).validate().is_err());
        assert!(AnalysisConfig::default().with_window(5.0, Some(2.0)).validate().is_err());
        assert!(matches!(
            AnalysisConfig::default().with_window(2.0, Some(2.0)).validate(),
            Err(MyoError::InvalidConfiguration { .. })
        ));
        assert!(AnalysisConfig::default().with_window(1.0, Some(3.0)).validate().is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = AnalysisConfig {
            twitch_width_percents: vec![],
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AnalysisConfig {
            baseline_widths: (10, 100),
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AnalysisConfig {
            override_indices: Some(PeakValleyIndices::new(vec![5, 3, 9], vec![1, 4, 7])),
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let config = AnalysisConfig {
            rounded: true,
            override_indices: Some(PeakValleyIndices::new(vec![10, 30, 50], vec![0, 20, 40, 60])),
            ..AnalysisConfig::noise_based().with_window(1.0, Some(8.5))
        };
        let json = config.to_json().unwrap();
        assert!(json.contains("\"strategy\": \"noise_based\""));
        assert_eq!(AnalysisConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_bad_json_is_configuration_error() {
        assert!(matches!(
            AnalysisConfig::from_json("{ not json"),
            Err(MyoError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_detector_takes_window_and_polarity() {
        let config = AnalysisConfig {
            twitches_point_up: false,
            ..AnalysisConfig::default().with_window(2.0, None)
        };
        let detector = config.build_detector().unwrap();
        assert_eq!(detector.name(), "prominence");
        match config.detector.with_window(config.window, config.twitches_point_up) {
            DetectorStrategy::Prominence(c) => {
                assert!(!c.twitches_point_up);
                assert_eq!(c.window.start_time, 2.0);
            }
            other => panic!("unexpected strategy {:?}", other),
        }
    }
}
