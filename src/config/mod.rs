use crate::bean::BeanDeclaration;
use crate::error::{CdiError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

pub const ENV_EXCLUDE_TYPES: &str = "MESHESTRA_CDI_EXCLUDE_TYPES";
pub const ENV_SELECTED_ALTERNATIVES: &str = "MESHESTRA_CDI_SELECTED_ALTERNATIVES";
pub const ENV_SHUTDOWN_TIMEOUT_MS: &str = "MESHESTRA_CDI_SHUTDOWN_TIMEOUT_MS";
pub const ENV_REMOVE_UNUSED_BEANS: &str = "MESHESTRA_CDI_REMOVE_UNUSED_BEANS";
pub const ENV_UNREMOVABLE_TYPES: &str = "MESHESTRA_CDI_UNREMOVABLE_TYPES";

/// Deployment configuration of a container
///
/// With `remove_unused_beans` set, beans that no injection point resolves to
/// are dropped after resolution unless they are named or match
/// `unremovable_types`. Programmatic lookups of such beans then fail.
///
/// Patterns in `exclude_types`, `selected_alternatives` and
/// `unremovable_types` match a bean id,
/// the implementation type name, a bean type name or its simple name. A
/// trailing `*` matches by prefix, so `app::legacy::*` covers a whole module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ContainerConfig {
    pub exclude_types: Vec<String>,
    pub selected_alternatives: Vec<String>,
    pub shutdown_timeout_ms: Option<u64>,
    pub remove_unused_beans: bool,
    pub unremovable_types: Vec<String>,
}

impl ContainerConfig {
    /// Load from the `MESHESTRA_CDI_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_vars(env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in vars {
            let value = value.as_ref();
            match key.as_ref() {
                ENV_EXCLUDE_TYPES => config.exclude_types = split_list(value),
                ENV_SELECTED_ALTERNATIVES => config.selected_alternatives = split_list(value),
                ENV_SHUTDOWN_TIMEOUT_MS => {
                    let millis = value.trim().parse::<u64>().map_err(|e| CdiError::Configuration {
                        message: format!("{ENV_SHUTDOWN_TIMEOUT_MS}={value}: {e}"),
                    })?;
                    config.shutdown_timeout_ms = Some(millis);
                }
                ENV_REMOVE_UNUSED_BEANS => {
                    config.remove_unused_beans =
                        value.trim().parse::<bool>().map_err(|e| CdiError::Configuration {
                            message: format!("{ENV_REMOVE_UNUSED_BEANS}={value}: {e}"),
                        })?;
                }
                ENV_UNREMOVABLE_TYPES => config.unremovable_types = split_list(value),
                _ => {}
            }
        }
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CdiError::Configuration {
            message: e.to_string(),
        })
    }

    pub fn shutdown_timeout(&self) -> Option<Duration> {
        self.shutdown_timeout_ms.map(Duration::from_millis)
    }

    /// The first exclusion pattern matching the bean, if any.
    pub fn exclusion_pattern(&self, bean: &BeanDeclaration) -> Option<&str> {
        self.exclude_types
            .iter()
            .find(|pattern| matches_bean(pattern, bean))
            .map(String::as_str)
    }

    pub fn is_excluded(&self, bean: &BeanDeclaration) -> bool {
        self.exclusion_pattern(bean).is_some()
    }

    pub fn is_unremovable(&self, bean: &BeanDeclaration) -> bool {
        self.unremovable_types
            .iter()
            .any(|pattern| matches_bean(pattern, bean))
    }

    /// Position of the first matching entry in `selected_alternatives`.
    pub fn selected_alternative_position(&self, bean: &BeanDeclaration) -> Option<usize> {
        self.selected_alternatives
            .iter()
            .position(|pattern| matches_bean(pattern, bean))
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(String::from)
        .collect()
}

fn matches_bean(pattern: &str, bean: &BeanDeclaration) -> bool {
    let pattern = pattern.trim();
    if matches_name(pattern, bean.id()) || matches_name(pattern, bean.implementation()) {
        return true;
    }
    bean.declared_types().iter().any(|ty| {
        matches_name(pattern, ty.name()) || (!pattern.contains("::") && pattern == ty.simple_name())
    })
}

fn matches_name(pattern: &str, name: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix.trim_end_matches('*')),
        None => pattern == name,
    }
}
