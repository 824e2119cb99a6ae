use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::constants;
use crate::domain::AttributeSpec;
use crate::error::{PipelineError, Result};

/// Process-wide configuration, built once at startup and passed by reference
/// into every component that needs it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Crop identifiers to integrate. Empty means "discover from the yield header".
    pub crops: Vec<String>,
    /// Skip live services entirely and synthesize every attribute.
    pub offline: bool,
    pub paths: PathsConfig,
    pub matching: MatchingConfig,
    pub retry: RetryConfig,
    pub services: Vec<ServiceConfig>,
    pub versioning: VersioningConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub yield_csv: PathBuf,
    pub coordinates_csv: PathBuf,
    pub soil_csv: Option<PathBuf>,
    pub output_csv: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Fuzzy matches must score strictly above this value (0-100)
    pub threshold: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub base_url: String,
    pub endpoint: String,
    /// Name of the environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Resolved from `api_key_env` at load time, never read from the file
    #[serde(skip)]
    pub api_key: Option<String>,
    pub attributes: Vec<AttributeSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VersioningConfig {
    pub enabled: bool,
    /// Repository working directory; defaults to the output file's directory
    pub repo_dir: Option<PathBuf>,
    pub remote: String,
    pub branch: String,
    pub author_name: String,
    pub author_email: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crops: constants::DEFAULT_CROPS.iter().map(|c| c.to_string()).collect(),
            offline: false,
            paths: PathsConfig::default(),
            matching: MatchingConfig::default(),
            retry: RetryConfig::default(),
            services: default_services(),
            versioning: VersioningConfig::default(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            yield_csv: PathBuf::from(constants::DEFAULT_YIELD_CSV),
            coordinates_csv: PathBuf::from(constants::DEFAULT_COORDINATE_CSV),
            soil_csv: None,
            output_csv: PathBuf::from(constants::DEFAULT_OUTPUT_CSV),
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: constants::DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: constants::DEFAULT_MAX_RETRIES,
            timeout_secs: constants::DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            repo_dir: None,
            remote: constants::DEFAULT_REMOTE.to_string(),
            branch: constants::DEFAULT_BRANCH.to_string(),
            author_name: constants::DEFAULT_AUTHOR_NAME.to_string(),
            author_email: constants::DEFAULT_AUTHOR_EMAIL.to_string(),
        }
    }
}

/// The Bhuvan agronomic and VEDAS climate services
pub fn default_services() -> Vec<ServiceConfig> {
    vec![
        ServiceConfig {
            name: constants::BHUVAN_SERVICE.to_string(),
            base_url: constants::BHUVAN_BASE_URL.to_string(),
            endpoint: constants::BHUVAN_ENDPOINT.to_string(),
            api_key_env: Some(constants::BHUVAN_API_KEY_ENV.to_string()),
            api_key: None,
            attributes: vec![
                AttributeSpec::new("vegetation_index", 0.0, 1.0, 3).with_remote_field("ndvi"),
                AttributeSpec::new("soil_ph", 5.5, 6.5, 1).location_only(),
                AttributeSpec::new("organic_carbon", 0.5, 0.6, 2),
            ],
        },
        ServiceConfig {
            name: constants::VEDAS_SERVICE.to_string(),
            base_url: constants::VEDAS_BASE_URL.to_string(),
            endpoint: constants::VEDAS_ENDPOINT.to_string(),
            api_key_env: Some(constants::VEDAS_API_KEY_ENV.to_string()),
            api_key: None,
            attributes: vec![
                AttributeSpec::new("rainfall", 800.0, 1800.0, 0),
                AttributeSpec::new("temperature_anomaly", -1.0, 1.0, 2)
                    .with_remote_field("temp_anomaly"),
            ],
        },
    ]
}

impl Config {
    /// Load configuration from defaults, an optional TOML file, `.env` and the
    /// process environment.
    ///
    /// An explicitly named file must exist; the default `config.toml` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Path::new(constants::DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    debug!("No {} found, using built-in defaults", constants::DEFAULT_CONFIG_FILE);
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Resolve API keys and environment overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(output) = lookup(constants::OUTPUT_CSV_ENV).filter(|v| !v.trim().is_empty()) {
            self.paths.output_csv = PathBuf::from(output.trim());
        }

        for service in &mut self.services {
            service.api_key = service
                .api_key_env
                .as_deref()
                .and_then(|var| lookup(var))
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty());
        }
    }

    /// Services that would call a live endpoint but have no API key. Empty
    /// when running offline, where no service is called.
    pub fn missing_api_keys(&self) -> Vec<&ServiceConfig> {
        if self.offline {
            return Vec::new();
        }
        self.services.iter().filter(|s| s.api_key.is_none()).collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.matching.threshold > 100 {
            return Err(PipelineError::Config(format!(
                "matching.threshold must be within 0..=100, got {}",
                self.matching.threshold
            )));
        }
        if self.retry.max_retries == 0 {
            return Err(PipelineError::Config("retry.max_retries must be at least 1".to_string()));
        }
        if self.retry.timeout_secs == 0 {
            return Err(PipelineError::Config("retry.timeout_secs must be at least 1".to_string()));
        }

        let mut service_names = HashSet::new();
        let mut attribute_names = HashSet::new();
        for service in &self.services {
            if !service_names.insert(service.name.as_str()) {
                return Err(PipelineError::Config(format!("Duplicate service name '{}'", service.name)));
            }
            if service.attributes.is_empty() {
                return Err(PipelineError::Config(format!(
                    "Service '{}' declares no attributes",
                    service.name
                )));
            }
            for attribute in &service.attributes {
                attribute.validate().map_err(PipelineError::Config)?;
                if !attribute_names.insert(attribute.name.as_str()) {
                    return Err(PipelineError::Config(format!(
                        "Attribute '{}' is provided by more than one service",
                        attribute.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Directory of the repository used to version the output
    pub fn versioning_repo_dir(&self) -> PathBuf {
        self.versioning.repo_dir.clone().unwrap_or_else(|| {
            self.paths
                .output_csv
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        })
    }
}
