//! Device selection settings.
//!
//! Which adapter runs the kernels is environment-specific, so it is
//! described by a [`DeviceConfig`] supplied by the caller instead of being
//! decided inside the crate.  [`DeviceConfig::from_env`] builds one from
//! `DCONV_*` environment variables for the demos and benches.

use wgpu::{Backends, PowerPreference};

use crate::error::{KernelError, Result};

/// Environment variable holding a comma separated backend list.
pub const ENV_BACKENDS: &str = "DCONV_BACKENDS";
/// Environment variable holding `low`, `high` or `none`.
pub const ENV_POWER: &str = "DCONV_POWER";
/// Environment variable holding an adapter name substring.
pub const ENV_ADAPTER: &str = "DCONV_ADAPTER";
/// Environment variable enabling the software fallback adapter.
pub const ENV_FALLBACK: &str = "DCONV_FALLBACK";

/// How to pick the adapter a [`crate::GpuContext`] runs on.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    /// Backends the instance is allowed to enumerate.
    pub backends: Backends,
    /// Preference used when no adapter name is given.
    pub power_preference: PowerPreference,
    /// Case-insensitive substring the adapter name must contain.
    pub adapter_name: Option<String>,
    /// Request the software fallback adapter.
    pub force_fallback: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            backends: Backends::all(),
            power_preference: PowerPreference::HighPerformance,
            adapter_name: None,
            force_fallback: false,
        }
    }
}

impl DeviceConfig {
    /// Default configuration overlaid with any `DCONV_*` variables that are set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = lookup(ENV_BACKENDS) {
            config.backends = parse_backends(&v)?;
        }
        if let Some(v) = lookup(ENV_POWER) {
            config.power_preference = parse_power(&v)?;
        }
        if let Some(v) = lookup(ENV_ADAPTER) {
            let v = v.trim();
            if !v.is_empty() {
                config.adapter_name = Some(v.to_string());
            }
        }
        if let Some(v) = lookup(ENV_FALLBACK) {
            config.force_fallback = parse_flag(&v)?;
        }
        Ok(config)
    }

    /// Restrict adapter selection to names containing `name`.
    pub fn with_adapter_name(mut self, name: impl Into<String>) -> Self {
        self.adapter_name = Some(name.into());
        self
    }

    /// Whether an adapter called `name` satisfies the name filter.
    pub fn matches_adapter(&self, name: &str) -> bool {
        match &self.adapter_name {
            Some(wanted) => name.to_lowercase().contains(&wanted.to_lowercase()),
            None => true,
        }
    }
}

fn parse_backends(value: &str) -> Result<Backends> {
    let mut backends = Backends::empty();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        backends |= match part.to_ascii_lowercase().as_str() {
            "vulkan" | "vk" => Backends::VULKAN,
            "metal" | "mtl" => Backends::METAL,
            "dx12" | "d3d12" => Backends::DX12,
            "gl" | "opengl" | "gles" => Backends::GL,
            "all" => Backends::all(),
            other => {
                return Err(KernelError::invalid(format!(
                    "{ENV_BACKENDS}: unknown backend `{other}`"
                )))
            }
        };
    }
    if backends.is_empty() {
        return Err(KernelError::invalid(format!("{ENV_BACKENDS} names no backend")));
    }
    Ok(backends)
}

fn parse_power(value: &str) -> Result<PowerPreference> {
    match value.trim().to_ascii_lowercase().as_str() {
        "low" | "low-power" => Ok(PowerPreference::LowPower),
        "high" | "high-performance" => Ok(PowerPreference::HighPerformance),
        "none" => Ok(PowerPreference::None),
        other => Err(KernelError::invalid(format!(
            "{ENV_POWER}: expected low, high or none, got `{other}`"
        ))),
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(KernelError::invalid(format!(
            "{ENV_FALLBACK}: expected a boolean, got `{other}`"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_default() {
        let config = DeviceConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, DeviceConfig::default());
    }

    #[test]
    fn parses_all_variables() {
        let config = DeviceConfig::from_lookup(lookup(&[
            (ENV_BACKENDS, "vulkan, metal"),
            (ENV_POWER, "low"),
            (ENV_ADAPTER, " GeForce "),
            (ENV_FALLBACK, "true"),
        ]))
        .unwrap();
        assert_eq!(config.backends, Backends::VULKAN | Backends::METAL);
        assert_eq!(config.power_preference, PowerPreference::LowPower);
        assert_eq!(config.adapter_name.as_deref(), Some("GeForce"));
        assert!(config.force_fallback);
    }

    #[test]
    fn rejects_unknown_backend() {
        let err = DeviceConfig::from_lookup(lookup(&[(ENV_BACKENDS, "cuda")])).unwrap_err();
        assert!(matches!(err, KernelError::InvalidArgument(_)));
    }

    #[test]
    fn rejects_bad_power_and_flag() {
        assert!(DeviceConfig::from_lookup(lookup(&[(ENV_POWER, "max")])).is_err());
        assert!(DeviceConfig::from_lookup(lookup(&[(ENV_FALLBACK, "maybe")])).is_err());
    }

    #[test]
    fn adapter_name_match_is_case_insensitive() {
        let config = DeviceConfig::default().with_adapter_name("nvidia");
        assert!(config.matches_adapter("NVIDIA GeForce RTX 4090"));
        assert!(!config.matches_adapter("Apple M2 Pro"));
        assert!(DeviceConfig::default().matches_adapter("anything"));
    }
}
