use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::clip::{DEFAULT_TAPER_TIME, DEFAULT_VERIFY_LEAD_TIME, DEFAULT_VERIFY_SAMPLE_TIME};
use crate::error::{ClipError, Result};
use crate::marker::{DEFAULT_SEARCH_SECS, DEFAULT_THRESHOLD};
use crate::planner::DEFAULT_LEAD_TIME;

pub const DEFAULT_SUBDIRS: usize = 1;
pub const DEFAULT_ENCODER: &str = "lame -V4";
pub const DEFAULT_TAGGER: &str = "tagmotifs.py";

/// Configuration defaults that can be saved to a file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_time: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub taper: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub taper_time: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdirs: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub agc: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker_search_secs: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_lead_time: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_sample_time: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoder: Option<String>,

    /// Tagging command run by the encode script; empty disables the step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tagger: Option<String>,
}

impl Config {
    /// Create a new empty config
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the config file path (~/.state/clipmotifs/defaults.toml)
    pub fn get_config_path() -> std::result::Result<PathBuf, io::Error> {
        let home = std::env::var("HOME")
            .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME environment variable not set"))?;

        let config_dir = Path::new(&home).join(".state").join("clipmotifs");
        Ok(config_dir.join("defaults.toml"))
    }

    /// Load config from the default location; a missing file is an empty config
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        if !config_path.exists() {
            return Ok(Config::new());
        }
        Self::load_from(&config_path)
    }

    /// Load config from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string)?;
        Ok(())
    }

    /// Merge this config with another, preferring values from other
    pub fn merge(&mut self, other: &Config) {
        if other.threshold.is_some() {
            self.threshold = other.threshold;
        }
        if other.lead_time.is_some() {
            self.lead_time = other.lead_time;
        }
        if other.taper.is_some() {
            self.taper = other.taper;
        }
        if other.taper_time.is_some() {
            self.taper_time = other.taper_time;
        }
        if other.subdirs.is_some() {
            self.subdirs = other.subdirs;
        }
        if other.agc.is_some() {
            self.agc = other.agc;
        }
        if other.marker_search_secs.is_some() {
            self.marker_search_secs = other.marker_search_secs;
        }
        if other.verify_lead_time.is_some() {
            self.verify_lead_time = other.verify_lead_time;
        }
        if other.verify_sample_time.is_some() {
            self.verify_sample_time = other.verify_sample_time;
        }
        if other.encoder.is_some() {
            self.encoder = other.encoder.clone();
        }
        if other.tagger.is_some() {
            self.tagger = other.tagger.clone();
        }
    }

    /// Print the config in a human-readable format
    pub fn print(&self, title: &str) {
        println!("{}:", title);

        if let Some(threshold) = self.threshold {
            println!("  Marker threshold:   {}", threshold);
        }
        if let Some(lead_time) = self.lead_time {
            println!("  Lead time:          {} seconds", lead_time);
        }
        if let Some(taper) = self.taper {
            println!("  Taper:              {}", if taper { "enabled" } else { "disabled" });
        }
        if let Some(taper_time) = self.taper_time {
            println!("  Taper time:         {} seconds", taper_time);
        }
        if let Some(subdirs) = self.subdirs {
            println!("  Subdir depth:       {}", subdirs);
        }
        if let Some(agc) = self.agc {
            println!("  Gain normalization: {}", if agc { "enabled" } else { "disabled" });
        }
        if let Some(secs) = self.marker_search_secs {
            println!("  Marker search:      {} seconds", secs);
        }
        if let Some(lead) = self.verify_lead_time {
            println!("  Verify lead time:   {} seconds", lead);
        }
        if let Some(sample) = self.verify_sample_time {
            println!("  Verify window:      {} seconds", sample);
        }
        if let Some(encoder) = &self.encoder {
            println!("  Encoder:            {}", encoder);
        }
        if let Some(tagger) = &self.tagger {
            println!("  Tagger:             {}", tagger);
        }
    }
}

/// Fully resolved run settings
#[derive(Debug, Clone, PartialEq)]
pub struct ClipSettings {
    pub threshold: u32,
    pub lead_time: f64,
    pub taper: bool,
    pub taper_time: f64,
    pub subdirs: usize,
    pub agc: bool,
    pub marker_search_secs: f64,
    pub verify_lead_time: f64,
    pub verify_sample_time: f64,
    pub encoder: String,
    pub tagger: String,
}

impl Default for ClipSettings {
    fn default() -> Self {
        ClipSettings {
            threshold: DEFAULT_THRESHOLD,
            lead_time: DEFAULT_LEAD_TIME,
            taper: true,
            taper_time: DEFAULT_TAPER_TIME,
            subdirs: DEFAULT_SUBDIRS,
            agc: true,
            marker_search_secs: DEFAULT_SEARCH_SECS,
            verify_lead_time: DEFAULT_VERIFY_LEAD_TIME,
            verify_sample_time: DEFAULT_VERIFY_SAMPLE_TIME,
            encoder: DEFAULT_ENCODER.to_string(),
            tagger: DEFAULT_TAGGER.to_string(),
        }
    }
}

impl ClipSettings {
    /// Fill unset config values with defaults and check ranges.
    pub fn from_config(config: &Config) -> Result<Self> {
        let defaults = ClipSettings::default();
        let settings = ClipSettings {
            threshold: config.threshold.unwrap_or(defaults.threshold),
            lead_time: config.lead_time.unwrap_or(defaults.lead_time),
            taper: config.taper.unwrap_or(defaults.taper),
            taper_time: config.taper_time.unwrap_or(defaults.taper_time),
            subdirs: config.subdirs.unwrap_or(defaults.subdirs),
            agc: config.agc.unwrap_or(defaults.agc),
            marker_search_secs: config.marker_search_secs.unwrap_or(defaults.marker_search_secs),
            verify_lead_time: config.verify_lead_time.unwrap_or(defaults.verify_lead_time),
            verify_sample_time: config.verify_sample_time.unwrap_or(defaults.verify_sample_time),
            encoder: config.encoder.clone().unwrap_or(defaults.encoder),
            tagger: config.tagger.clone().unwrap_or(defaults.tagger),
        };

        let non_negative = [
            ("lead_time", settings.lead_time),
            ("taper_time", settings.taper_time),
            ("verify_lead_time", settings.verify_lead_time),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ClipError::Config(format!("{} must be >= 0, got {}", name, value)));
            }
        }
        let positive = [
            ("marker_search_secs", settings.marker_search_secs),
            ("verify_sample_time", settings.verify_sample_time),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(ClipError::Config(format!("{} must be > 0, got {}", name, value)));
            }
        }
        if settings.encoder.trim().is_empty() {
            return Err(ClipError::Config("encoder command is empty".to_string()));
        }
        Ok(settings)
    }

    /// Taper length in frames, 0 when tapering is off
    pub fn taper_frames(&self, sample_rate: u32) -> usize {
        if self.taper {
            (self.taper_time * sample_rate as f64) as usize
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ClipSettings::from_config(&Config::new()).unwrap();
        assert_eq!(settings, ClipSettings::default());
        assert_eq!(settings.threshold, 150);
        assert_eq!(settings.lead_time, 0.25);
        assert_eq!(settings.taper_frames(44100), 11025);
        assert_eq!(settings.encoder, "lame -V4");
        assert_eq!(settings.tagger, "tagmotifs.py");
    }

    #[test]
    fn test_merge_prefers_other() {
        let mut base = Config {
            threshold: Some(100),
            subdirs: Some(2),
            ..Config::default()
        };
        let cmdline = Config {
            threshold: Some(300),
            agc: Some(false),
            ..Config::default()
        };
        base.merge(&cmdline);
        assert_eq!(base.threshold, Some(300));
        assert_eq!(base.subdirs, Some(2));
        assert_eq!(base.agc, Some(false));
        assert_eq!(base.taper, None);
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("defaults.toml");
        let config = Config {
            threshold: Some(200),
            taper: Some(false),
            encoder: Some("lame -V3".to_string()),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("threshold = 200"));
        assert!(!text.contains("lead_time"));

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("defaults.toml");
        fs::write(&path, "threshold = \"loud\"").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ClipError::TomlDe(_))));
    }

    #[test]
    fn test_range_checks() {
        let bad_lead = Config {
            lead_time: Some(-0.1),
            ..Config::default()
        };
        assert!(matches!(ClipSettings::from_config(&bad_lead), Err(ClipError::Config(_))));

        let bad_window = Config {
            verify_sample_time: Some(0.0),
            ..Config::default()
        };
        assert!(ClipSettings::from_config(&bad_window).is_err());

        let empty_encoder = Config {
            encoder: Some("  ".to_string()),
            ..Config::default()
        };
        assert!(ClipSettings::from_config(&empty_encoder).is_err());
    }

    #[test]
    fn test_tagger_can_be_disabled() {
        let settings = ClipSettings::from_config(&Config {
            tagger: Some(String::new()),
            ..Config::default()
        })
        .unwrap();
        assert_eq!(settings.tagger, "");
    }

    #[test]
    fn test_taper_disabled() {
        let settings = ClipSettings::from_config(&Config {
            taper: Some(false),
            ..Config::default()
        })
        .unwrap();
        assert_eq!(settings.taper_frames(44100), 0);
    }
}
