use crate::models::OrchestratorConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use std::fs;

const CONFIG_FILE: &str = "updatejobs.yaml";
const ENV_PREFIX: &str = "UPDATEJOBS";

/// Configuration manager for the orchestrator's YAML configuration.
///
/// Settings are layered: built-in defaults, then `updatejobs.yaml` in the
/// configuration directory, then `UPDATEJOBS__SECTION__KEY` environment
/// variables.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory holding `updatejobs.yaml`; created if missing
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE),
            config_dir,
        })
    }

    /// Load the layered configuration using the process environment.
    pub fn load(&self) -> Result<OrchestratorConfig> {
        self.load_layered(Environment::with_prefix(ENV_PREFIX))
    }

    /// Load the layered configuration with an explicit set of environment
    /// variables instead of the process environment.
    ///
    /// # Arguments
    /// * `vars` - Variables such as `UPDATEJOBS__ORCHESTRATION__FORCE=true`
    pub fn load_with_environment(
        &self,
        vars: config::Map<String, String>,
    ) -> Result<OrchestratorConfig> {
        self.load_layered(Environment::with_prefix(ENV_PREFIX).source(Some(vars)))
    }

    fn load_layered(&self, environment: Environment) -> Result<OrchestratorConfig> {
        if !self.config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                self.config_path
            );
        }

        let settings = Config::builder()
            .add_source(
                File::from(self.config_path.as_std_path())
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                environment
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        let config: OrchestratorConfig = settings
            .try_deserialize()
            .with_context(|| format!("Failed to parse config: {}", self.config_path))?;

        tracing::info!("Loaded config from {}", self.config_dir);
        Ok(config)
    }

    /// Save the configuration file.
    ///
    /// # Arguments
    /// * `config` - The configuration to save
    pub fn save(&self, config: &OrchestratorConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }
}
