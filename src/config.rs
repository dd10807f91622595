use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::fetch::default_download_dir;
use crate::pipeline::DetectionSettings;
use crate::preprocess::DEFAULT_INPUT_SIDE;

pub const ENV_PREFIX: &str = "EGGCOUNT";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceConfig {
    pub model_path: PathBuf,
    pub threshold: f32,
    pub input_side: u32,
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub download_dir: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models").join("rtdetr_eggs.onnx"),
            threshold: 0.3,
            input_side: DEFAULT_INPUT_SIDE,
            host: "0.0.0.0".to_string(),
            port: 5000,
            debug: false,
            download_dir: default_download_dir(),
        }
    }
}

impl fmt::Display for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "model {}, threshold {}, input {}x{}, listening on {}:{}",
            self.model_path.display(),
            self.threshold,
            self.input_side,
            self.input_side,
            self.host,
            self.port
        )
    }
}

impl ServiceConfig {
    /// Defaults, then the optional file, then `EGGCOUNT_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("model_path", defaults.model_path.to_string_lossy().into_owned())?
            .set_default("threshold", f64::from(defaults.threshold))?
            .set_default("input_side", i64::from(defaults.input_side))?
            .set_default("host", defaults.host)?
            .set_default("port", i64::from(defaults.port))?
            .set_default("debug", defaults.debug)?
            .set_default("download_dir", defaults.download_dir.to_string_lossy().into_owned())?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config: Self = builder.add_source(env).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_side == 0 {
            return Err(ConfigError::Message("input_side must be positive".into()));
        }
        if !self.threshold.is_finite() {
            return Err(ConfigError::Message("threshold must be a finite number".into()));
        }
        Ok(())
    }

    pub fn detection_settings(&self) -> DetectionSettings {
        DetectionSettings {
            threshold: self.threshold,
            input_side: self.input_side,
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}
