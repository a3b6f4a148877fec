use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::{
    error::{Error, Result},
    output::{PacerConfig, SerialConfig},
    timing::{LoaderConfig, SchedulerConfig},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub loader: LoaderConfig,
    pub pacer: PacerConfig,
    pub scheduler: SchedulerConfig,
    pub serial: SerialConfig,
    pub status_interval_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            loader: LoaderConfig::default(),
            pacer: PacerConfig::default(),
            scheduler: SchedulerConfig::default(),
            serial: SerialConfig::default(),
            status_interval_ms: 500,
        }
    }
}

impl PlayerConfig {
    pub fn from_ron_str(text: &str) -> Result<Self> {
        let config: PlayerConfig =
            ron::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms.max(1))
    }

    pub fn validate(&self) -> Result<()> {
        for (&from, &to) in &self.loader.channel_map {
            if from > 15 || to > 15 {
                return Err(Error::Config(format!(
                    "channel mapping {from} -> {to} is outside 0..=15"
                )));
            }
        }
        if let Some(controller) = self.loader.allowed_controllers.iter().find(|&&c| c > 127) {
            return Err(Error::Config(format!(
                "controller number {controller} is outside 0..=127"
            )));
        }
        if self.pacer.max_per_ms == 0 {
            return Err(Error::Config("pacer.max_per_ms must be at least 1".into()));
        }
        if self.serial.baud_rate == 0 {
            return Err(Error::Config("serial.baud_rate must be at least 1".into()));
        }
        if self.scheduler.wait_increment_ms == 0 {
            return Err(Error::Config(
                "scheduler.wait_increment_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MessageKind;

    #[test]
    fn defaults_match_three_manual_setup() {
        let config = PlayerConfig::default();
        assert_eq!(config.loader.channel_map.len(), 3);
        assert!(config.loader.allowed_types.contains(&MessageKind::NoteOn));
        assert!(!config.loader.include_program_change);
        assert_eq!(config.status_interval(), Duration::from_millis(500));
        config.validate().unwrap();
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config = PlayerConfig::from_ron_str(
            "(loader: (chord_spread_us: 500, channel_map: {0: 4}), pacer: (min_gap_us: 0))",
        )
        .unwrap();
        assert_eq!(config.loader.chord_spread_us, 500);
        assert_eq!(config.loader.channel_map.get(&0), Some(&4));
        assert_eq!(config.pacer.min_gap_us, 0);
        assert_eq!(config.pacer.max_per_ms, PacerConfig::default().max_per_ms);
    }

    #[test]
    fn rejects_out_of_range_channel() {
        let err = PlayerConfig::from_ron_str("(loader: (channel_map: {0: 16}))").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_zero_rate() {
        let err = PlayerConfig::from_ron_str("(pacer: (max_per_ms: 0))").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn serial_line_settings_are_configurable() {
        let config = PlayerConfig::from_ron_str(
            "(serial: (device: \"/dev/ttyAMA0\", baud_rate: 38400))",
        )
        .unwrap();
        assert_eq!(config.serial.device, std::path::PathBuf::from("/dev/ttyAMA0"));
        assert_eq!(config.serial.baud_rate, 38_400);
        assert_eq!(config.serial.write_timeout_ms, 10);

        let err = PlayerConfig::from_ron_str("(serial: (baud_rate: 0))").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.ron");
        let mut config = PlayerConfig::default();
        config.loader.include_program_change = true;
        config.pacer.max_retries = 7;
        config.save(&path).unwrap();
        assert_eq!(PlayerConfig::load(&path).unwrap(), config);
    }
}
