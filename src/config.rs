use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConvertError;
use crate::ontology::ParameterFilter;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub keep_unknown: Option<bool>,
    #[serde(default)]
    pub drop_parameters: Vec<String>,
    /// BIDS sidecar key → ISA-Tab parameter name.
    #[serde(default)]
    pub parameter_names: BTreeMap<String, String>,
}

/// Command-line values layered over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub keep_unknown: bool,
    pub drop_parameters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub filter: ParameterFilter,
    pub parameter_names: BTreeMap<String, String>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            filter: ParameterFilter::default(),
            parameter_names: BTreeMap::new(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path` when given; without a path the defaults apply.
    pub fn resolve(
        path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, ConvertError> {
        let config = match path {
            Some(path) => {
                let config_path = PathBuf::from(path);
                let content = fs::read_to_string(&config_path)
                    .map_err(|_| ConvertError::ConfigRead(config_path.clone()))?;
                serde_json::from_str(&content)
                    .map_err(|err| ConvertError::ConfigParse(err.to_string()))?
            }
            None => Config::default(),
        };

        Self::resolve_config(config, overrides)
    }

    pub fn resolve_config(
        config: Config,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, ConvertError> {
        let schema_version = config.schema_version.unwrap_or(SCHEMA_VERSION);
        if schema_version != SCHEMA_VERSION {
            return Err(ConvertError::ConfigParse(format!(
                "unsupported schema_version {schema_version} (expected {SCHEMA_VERSION})"
            )));
        }

        let drop = config
            .drop_parameters
            .into_iter()
            .chain(overrides.drop_parameters)
            .flat_map(|value| split_list(&value))
            .collect::<BTreeSet<_>>();

        let mut parameter_names = BTreeMap::new();
        for (key, name) in config.parameter_names {
            let name = name.trim();
            if name.is_empty() {
                return Err(ConvertError::ConfigParse(format!(
                    "empty parameter name for key '{key}'"
                )));
            }
            parameter_names.insert(key.to_lowercase(), name.to_string());
        }

        Ok(ResolvedConfig {
            schema_version,
            filter: ParameterFilter {
                keep_unknown: overrides.keep_unknown || config.keep_unknown.unwrap_or(false),
                drop,
            },
            parameter_names,
        })
    }
}

/// `a,b` and `a` alike.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
