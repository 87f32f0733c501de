use serde::Deserialize;
use std::path::PathBuf;

pub const ENV_PREFIX: &str = "TASK_CLI";

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_file")]
    pub file: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            file: default_file(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Loads configuration from `TASK_CLI_*` environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_source(config::Environment::with_prefix(ENV_PREFIX))
    }

    fn from_source(source: config::Environment) -> anyhow::Result<Self> {
        let settings = config::Config::builder().add_source(source).build()?;

        let config: Config = settings.try_deserialize()?;
        Ok(config)
    }
}

fn default_file() -> PathBuf {
    PathBuf::from("tasks.json")
}

fn default_log_level() -> String {
    "warn".to_string()
}
