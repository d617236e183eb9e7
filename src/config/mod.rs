//! Session Configuration
//!
//! Operator settings stored in TOML format. Every numeric option is
//! clamped to a sane range on load, so a hand-edited file can degrade the
//! session but never wedge it.

use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Full session settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HuntConfig {
    pub movement: MovementConfig,
    pub response: ResponseConfig,
    pub recovery: RecoveryConfig,
    pub detection: DetectionConfig,
    /// Lowercase labels considered ordinary at the current location.
    pub roster: Vec<String>,
}

/// Movement phase settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementConfig {
    /// Substring of the target window title.
    pub window_title: String,
    /// The two opposite direction keys to alternate between.
    pub direction_keys: [char; 2],
    /// How long each direction key is held, seconds.
    pub key_hold_duration: f64,
    /// Pause between movements, seconds.
    pub move_pause: f64,
    /// Moves between encounter checks.
    pub check_batch_size: u32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            window_title: "pokemmo".to_string(),
            direction_keys: ['a', 'd'],
            key_hold_duration: 0.25,
            move_pause: 0.3,
            check_batch_size: 10,
        }
    }
}

/// Battle-response settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseConfig {
    /// Action key for an ordinary encounter.
    pub action_key: char,
    /// How many times the action key is tapped.
    pub action_repeats: u32,
    /// Interval between taps, seconds.
    pub action_interval: f64,
    /// Settle delay after an ordinary response, seconds.
    pub settle_delay: f64,
    /// The alternate key sequence for a duplicated encounter.
    pub duplicated_keys: [char; 3],
    /// Settle delay after a duplicated response, seconds.
    pub duplicated_settle_delay: f64,
    /// Extra settle when the pre-transition marker is seen, seconds.
    pub pre_transition_settle: f64,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            action_key: '1',
            action_repeats: 4,
            action_interval: 0.3,
            settle_delay: 1.0,
            duplicated_keys: ['2', '1', '1'],
            duplicated_settle_delay: 3.0,
            pre_transition_settle: 2.0,
        }
    }
}

/// Healing, repositioning and stuck-dialog recovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Encounters per cycle before healing.
    pub encounters_per_cycle: u32,
    /// Key that triggers the resource restore.
    pub heal_key: char,
    /// Wait after the heal key, seconds.
    pub heal_delay: f64,
    /// Name of the repositioning macro, if repositioning is wanted.
    pub reposition_macro: Option<String>,
    /// Playback speed factor for the repositioning macro.
    pub macro_speed: f64,
    /// Overall macro playback timeout, seconds.
    pub macro_timeout: f64,
    /// Whether the periodic stuck-dialog check runs at all.
    pub stuck_check_enabled: bool,
    /// Seconds between stuck-dialog checks.
    pub stuck_check_interval: f64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            encounters_per_cycle: 10,
            heal_key: '7',
            heal_delay: 5.0,
            reposition_macro: None,
            macro_speed: 1.0,
            macro_timeout: 90.0,
            stuck_check_enabled: true,
            stuck_check_interval: 30.0,
        }
    }
}

/// Perception settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// OCR retry attempts when the name band reads empty.
    pub ocr_max_retries: u32,
    /// Name-band region override as fractions [x, y, w, h].
    pub read_region: Option<[f32; 4]>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self { ocr_max_retries: 2, read_region: None }
    }
}

impl HuntConfig {
    /// Force every numeric option into its documented range.
    pub fn clamp(&mut self) {
        self.movement.key_hold_duration = self.movement.key_hold_duration.clamp(0.1, 10.0);
        self.movement.move_pause = self.movement.move_pause.clamp(0.05, 5.0);
        self.movement.check_batch_size = self.movement.check_batch_size.clamp(1, 100);

        self.response.action_repeats = self.response.action_repeats.clamp(1, 20);
        self.response.action_interval = self.response.action_interval.clamp(0.05, 5.0);
        self.response.settle_delay = self.response.settle_delay.clamp(0.1, 10.0);
        self.response.duplicated_settle_delay =
            self.response.duplicated_settle_delay.clamp(0.1, 30.0);
        self.response.pre_transition_settle = self.response.pre_transition_settle.clamp(0.0, 10.0);

        self.recovery.encounters_per_cycle = self.recovery.encounters_per_cycle.clamp(1, 100);
        self.recovery.heal_delay = self.recovery.heal_delay.clamp(0.5, 60.0);
        self.recovery.macro_speed = self.recovery.macro_speed.clamp(0.1, 10.0);
        self.recovery.macro_timeout = self.recovery.macro_timeout.clamp(10.0, 600.0);
        self.recovery.stuck_check_interval = self.recovery.stuck_check_interval.clamp(5.0, 300.0);

        self.detection.ocr_max_retries = self.detection.ocr_max_retries.min(10);
        if let Some(region) = &mut self.detection.read_region {
            for v in region.iter_mut() {
                *v = v.clamp(0.0, 1.0);
            }
        }

        for label in &mut self.roster {
            *label = label.trim().to_lowercase();
        }
        self.roster.retain(|l| !l.is_empty());
    }
}

/// Default config path under the platform config directory.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "autohunt").map(|d| d.config_dir().join("config.toml"))
}

/// Load configuration from file; values are clamped after parse.
pub fn load_config(path: &Path) -> Result<HuntConfig> {
    let content = std::fs::read_to_string(path)?;
    let mut config: HuntConfig = toml::from_str(&content)?;
    config.clamp();
    Ok(config)
}

/// Load configuration, falling back to defaults when the file is absent.
pub fn load_or_default(path: &Path) -> HuntConfig {
    match load_config(path) {
        Ok(config) => config,
        Err(e) => {
            warn!("using default configuration ({e:#})");
            HuntConfig::default()
        }
    }
}

/// Save configuration to file.
pub fn save_config(config: &HuntConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
