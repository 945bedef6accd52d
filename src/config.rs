/**
 * Settings for both ends of the link, read from a TOML file. Everything has a
 * default, so an empty file is a valid config.
 */
use std::fs;
use std::path::Path;

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::dispatcher::DispatchConfig;
use crate::engine::ActuatorConfig;
use crate::error::{Error, Result};
use crate::navigation::NavigationConfig;
use crate::transport::MqttConfig;
use crate::vision::VisionConfig;


#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub navigation: NavigationConfig,
    pub dispatch: DispatchConfig,
    pub mqtt: MqttConfig,
    pub vision: VisionConfig,
    pub control: ControlConfig,
    pub actuator: ActuatorConfig,
    pub logging: LoggingConfig,
}


#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlConfig {
    pub max_reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    /// Minimum time between frames; 0 plays frames as fast as they load
    pub frame_interval_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames_dir: Option<String>,
}


impl Default for ControlConfig {
    fn default() -> ControlConfig {
        ControlConfig {
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 500,
            frame_interval_ms: 0,
            frames_dir: None,
        }
    }
}


#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of off, error, warn, info, debug, trace
    pub level: String,
    /// Also log to a timestamped file in this directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,
}


impl Default for LoggingConfig {
    fn default() -> LoggingConfig {
        LoggingConfig {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}


impl LoggingConfig {
    pub fn level_filter(&self) -> Result<LevelFilter> {
        self.level.parse::<LevelFilter>()
            .map_err(|_| Error::InvalidConfig(format!("logging.level '{}' is not a log level", self.level)))
    }
}


impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
        let contents = fs::read_to_string(path)?;
        Config::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Config> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.navigation.validate()?;
        self.logging.level_filter()?;
        if self.control.max_reconnect_attempts == 0 {
            return Err(Error::InvalidConfig("control.max_reconnect_attempts must be at least 1".to_string()));
        }
        if self.actuator.action_duration_ms == 0 {
            return Err(Error::InvalidConfig("actuator.action_duration_ms must be positive".to_string()));
        }
        if self.actuator.tick_interval_ms == 0 {
            return Err(Error::InvalidConfig("actuator.tick_interval_ms must be positive".to_string()));
        }
        if self.mqtt.topic.is_empty() {
            return Err(Error::InvalidConfig("mqtt.topic must not be empty".to_string()));
        }
        Ok(())
    }
}
