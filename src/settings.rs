use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://api.mintgarden.io";
const DEFAULT_TIMEOUT_SECS: i64 = 30;

/// Runtime settings: defaults, then `mintgarden.{toml,json,yaml}`, then `MINTGARDEN_*` env.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::build(Environment::with_prefix("MINTGARDEN"))
    }

    fn build(env: Environment) -> Result<Self, ConfigError> {
        let settings: Self = Config::builder()
            .set_default("base_url", DEFAULT_BASE_URL)?
            .set_default("timeout_secs", DEFAULT_TIMEOUT_SECS)?
            .add_source(File::with_name("mintgarden").required(false))
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()?;

        // A zero timeout makes every request fail immediately.
        if settings.timeout_secs == 0 {
            return Err(ConfigError::Message("timeout_secs must be at least 1".into()));
        }
        Ok(settings)
    }
}
