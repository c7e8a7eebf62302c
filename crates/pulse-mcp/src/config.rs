use config::{Config, Environment, File};

use pulse_core::EngineConfig;

use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            // Load from config files if they exist
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables
            // PULSE__FLOW__SESSION_GAP_MINUTES, PULSE__EXPOSURE__CONCENTRATION_DANGER, etc.
            .add_source(
                Environment::with_prefix("PULSE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        // Threshold sections sit at the top level of the file
        let engine: EngineConfig = config.try_deserialize()?;
        engine.validate()?;

        Ok(Self { engine })
    }
}
