use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::pipeline::PipelineOptions;

pub const CONFIG_PATH_ENV: &str = "PNEUMO_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/app.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub pipeline: PipelineOptions,
    pub sessions: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
            static_dir: None,
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub backend: ModelBackend,
    pub input_name: String,
    pub output_name: String,
    pub intra_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/pneumonia.onnx"),
            backend: ModelBackend::Onnx,
            input_name: "input".to_string(),
            output_name: "output".to_string(),
            intra_threads: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackend {
    Onnx,
    Torch,
}

impl ModelBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelBackend::Onnx => "onnx",
            ModelBackend::Torch => "torch",
        }
    }
}

impl FromStr for ModelBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "onnx" => Ok(ModelBackend::Onnx),
            "torch" => Ok(ModelBackend::Torch),
            _ => Err(ConfigError::InvalidValue {
                key: "model.backend",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_secs: 900 }
    }
}

impl AppConfig {
    /// Reads the YAML file named by `PNEUMO_CONFIG` (or `config/app.yaml`
    /// when unset), then applies environment overrides. A missing default
    /// file means built-in defaults; a missing explicit file is an error.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var(CONFIG_PATH_ENV).ok();
        let path = explicit
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = if explicit.is_none() && !path.exists() {
            log::info!("No config file at {}, using defaults", path.display());
            AppConfig::default()
        } else {
            log::info!("Loading config from {}", path.display());
            Self::from_file(&path)?
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(AppConfig::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "PORT",
                value: port.clone(),
            })?;
        }
        if let Some(dir) = lookup("STATIC_DIR") {
            self.server.static_dir = Some(PathBuf::from(dir));
        }
        if let Some(path) = lookup("MODEL_PATH") {
            self.model.path = PathBuf::from(path);
        }
        if let Some(backend) = lookup("MODEL_BACKEND") {
            self.model.backend = backend.parse()?;
        }
        if let Some(flag) = lookup("PLAUSIBILITY_CHECK") {
            self.pipeline.plausibility_check = parse_flag("PLAUSIBILITY_CHECK", &flag)?;
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:8081");
        assert_eq!(config.model.backend, ModelBackend::Onnx);
        assert!(config.pipeline.plausibility_check);
        assert_eq!(config.sessions.ttl_secs, 900);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = AppConfig::from_yaml_str(
            "model:\n  path: weights/inception.onnx\npipeline:\n  plausibility_check: false\n",
        )
        .unwrap();
        assert_eq!(config.model.path, PathBuf::from("weights/inception.onnx"));
        assert_eq!(config.model.input_name, "input");
        assert!(!config.pipeline.plausibility_check);
        assert_eq!(config.server.port, 8081);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = AppConfig::from_yaml_str("  \n").unwrap();
        assert_eq!(config.server.port, 8081);
    }

    #[test]
    fn test_rejects_unknown_backend_in_yaml() {
        let result = AppConfig::from_yaml_str("model:\n  backend: keras\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_env_overrides(env(&[
                ("PORT", "9000"),
                ("MODEL_PATH", "/models/x.pt"),
                ("MODEL_BACKEND", "Torch"),
                ("PLAUSIBILITY_CHECK", "0"),
                ("STATIC_DIR", "public"),
            ]))
            .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.model.path, PathBuf::from("/models/x.pt"));
        assert_eq!(config.model.backend, ModelBackend::Torch);
        assert!(!config.pipeline.plausibility_check);
        assert_eq!(config.server.static_dir, Some(PathBuf::from("public")));
    }

    #[test]
    fn test_invalid_env_values() {
        let mut config = AppConfig::default();
        assert!(matches!(
            config.apply_env_overrides(env(&[("PORT", "eighty")])),
            Err(ConfigError::InvalidValue { key: "PORT", .. })
        ));
        assert!(matches!(
            config.apply_env_overrides(env(&[("PLAUSIBILITY_CHECK", "maybe")])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            config.apply_env_overrides(env(&[("MODEL_BACKEND", "tflite")])),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = AppConfig::from_file(Path::new("/nonexistent/pneumo.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
