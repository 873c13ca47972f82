use crate::{enums::media::CodecChoice, globals::statics::APP_NAME};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// screen capture parameters for the ffmpeg producer
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScreenConfig {
    pub input_format: String,
    pub display: String,
    pub framerate: u32,
    pub audio_format: String,
    pub audio_device: Option<String>,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        ScreenConfig {
            input_format: "x11grab".to_string(),
            display: ":0.0".to_string(),
            framerate: 30,
            audio_format: "pulse".to_string(),
            audio_device: Some("default".to_string()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Configuration {
    #[serde(skip)]
    pub config_id: Option<String>,
    pub log_level: LevelFilter,
    pub server_port: u16,
    pub last_renderer: String,
    pub last_network: Option<String>,
    pub transcode_codec: CodecChoice,
    pub force_transcode: bool,
    pub seek_step_secs: u32,
    pub discovery_timeout_secs: u64,
    pub soap_timeout_secs: u64,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub screen: ScreenConfig,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

impl Configuration {
    #[must_use]
    pub fn new() -> Configuration {
        Configuration {
            config_id: None,
            log_level: LevelFilter::Info,
            server_port: 0,
            last_renderer: String::new(),
            last_network: None,
            transcode_codec: CodecChoice::Auto,
            force_transcode: false,
            seek_step_secs: 30,
            discovery_timeout_secs: 3,
            soap_timeout_secs: 10,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            screen: ScreenConfig::default(),
        }
    }

    /// the configuration directory, also used for the log file
    #[must_use]
    pub fn config_dir() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_default();
        base.join(APP_NAME)
    }

    fn config_file(config_id: Option<&str>) -> PathBuf {
        let name = match config_id {
            Some(id) if !id.is_empty() => format!("config_{id}.toml"),
            _ => "config.toml".to_string(),
        };
        Self::config_dir().join(name)
    }

    /// the log file for this configuration
    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        let id = self.config_id.as_deref().unwrap_or_default();
        Self::config_dir().join(format!("send2tv{id}.log"))
    }

    /// read the configuration, creating it with default values when it does not exist
    #[must_use]
    pub fn read_config(config_id: Option<&str>) -> Configuration {
        let configfile = Self::config_file(config_id);
        let mut config = if configfile.exists() {
            match Self::load(&configfile) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Ignoring unreadable config {}: {e}", configfile.display());
                    Configuration::new()
                }
            }
        } else {
            eprintln!("Creating default config {}", configfile.display());
            let config = Configuration::new();
            if let Err(e) = config.write(&configfile) {
                eprintln!("Could not create {}: {e}", configfile.display());
            }
            config
        };
        config.config_id = config_id.map(str::to_string);
        config
    }

    fn load(path: &Path) -> io::Result<Configuration> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text).map_err(io::Error::other)
    }

    /// parse a configuration document, missing keys take their default value
    pub fn from_toml(text: &str) -> Result<Configuration, toml::de::Error> {
        toml::from_str(text)
    }

    /// what is saved after a session: the configuration as loaded, plus the renderer used.
    /// Command line overrides only last for their run.
    #[must_use]
    pub fn with_last_renderer(&self, renderer: &str) -> Configuration {
        let mut saved = self.clone();
        saved.last_renderer = renderer.to_string();
        saved
    }

    pub fn update_config(&self) -> io::Result<()> {
        self.write(&Self::config_file(self.config_id.as_deref()))
    }

    fn write(&self, path: &Path) -> io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let text = toml::to_string(self).map_err(io::Error::other)?;
        fs::write(path, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_uses_defaults() {
        let text = r#"
last_renderer = "192.168.1.20"
transcode_codec = "hevc"

[screen]
display = ":1.0"
"#;
        let config = Configuration::from_toml(text).unwrap();
        assert_eq!(config.last_renderer, "192.168.1.20");
        assert_eq!(config.transcode_codec, CodecChoice::Hevc);
        assert_eq!(config.screen.display, ":1.0");
        assert_eq!(config.screen.input_format, "x11grab");
        assert_eq!(config.seek_step_secs, 30);
        assert_eq!(config.log_level, LevelFilter::Info);
    }

    #[test]
    fn written_config_reads_back() {
        let mut config = Configuration::new();
        config.server_port = 8200;
        config.last_network = Some("10.0.0.5".to_string());
        let text = toml::to_string(&config).unwrap();
        assert_eq!(Configuration::from_toml(&text).unwrap(), config);
    }
}
