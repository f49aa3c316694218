//! Runtime configuration.
//!
//! Configuration is plain serde data so that a host can embed it next to the
//! server state (JSON) or ship it over a binary channel (MessagePack).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Element ids checked, in order, for embedded server data.
pub const DEFAULT_SERVER_DATA_IDS: [&str; 2] = [
    "wp-script-module-data-@wordpress/interactivity",
    "wp-interactivity-data",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Attribute prefix marking directives, including the trailing dash.
    pub directive_prefix: String,

    /// Emit author-facing diagnostics.
    pub debug: bool,

    /// Ids of the elements holding server data, tried in order.
    pub server_data_ids: Vec<String>,

    /// Yield to the host scheduler between islands during `init`.
    pub yield_between_islands: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            directive_prefix: "data-wp-".to_string(),
            debug: cfg!(debug_assertions),
            server_data_ids: DEFAULT_SERVER_DATA_IDS.iter().map(|id| id.to_string()).collect(),
            yield_between_islands: true,
        }
    }
}

impl RuntimeConfig {
    /// Default configuration with a different directive prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            directive_prefix: prefix.into(),
            ..Self::default()
        }
    }

    pub fn from_json_str(input: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        let config: Self = rmp_serde::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let prefix = &self.directive_prefix;
        if prefix.is_empty() {
            return Err(Error::Config {
                message: "directivePrefix must not be empty".into(),
            });
        }
        if !prefix.ends_with('-') {
            return Err(Error::Config {
                message: format!("directivePrefix '{prefix}' must end with '-'"),
            });
        }
        if prefix
            .bytes()
            .any(|b| !(b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-'))
        {
            return Err(Error::Config {
                message: format!("directivePrefix '{prefix}' must be lowercase ASCII"),
            });
        }
        Ok(())
    }

    /// Full attribute name of a directive.
    pub fn attribute(&self, directive: &str) -> String {
        format!("{}{directive}", self.directive_prefix)
    }

    /// Attribute marking an island root.
    pub fn interactive_attribute(&self) -> String {
        self.attribute("interactive")
    }

    pub fn ignore_attribute(&self) -> String {
        self.attribute("ignore")
    }
}
