use serde::{Deserialize, Serialize};

use crate::logging::{LogFormat, LogLevel};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn level(&self) -> anyhow::Result<LogLevel> {
        Ok(self.log_level.parse::<LogLevel>()?)
    }

    pub fn format(&self) -> anyhow::Result<LogFormat> {
        Ok(self.log_format.parse::<LogFormat>()?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.level()?;
        self.format()?;
        Ok(())
    }
}
