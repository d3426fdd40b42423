//! Configuration loading for vrouter.
//!
//! Layers compiled-in defaults, an optional TOML file and `VROUTER_`
//! environment variables into a `vrouter_core::RouterConfig`. The core
//! never reads configuration itself; the binary builds one here and
//! passes it in.

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::Deserialize;
use thiserror::Error;

use vrouter_core::RouterConfig;

/// Config file used when neither `--config` nor `VROUTER_CONFIG` is set.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/vrouter/config.toml";

/// Prefix of recognized environment variables. `__` separates nesting,
/// e.g. `VROUTER_SERVICES__DHCP=dhcpd`.
pub const ENV_PREFIX: &str = "VROUTER_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config file {} does not exist", path.display())]
    Missing { path: PathBuf },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file: explicit path, then `VROUTER_CONFIG`, then
/// the system default.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    std::env::var_os(format!("{ENV_PREFIX}CONFIG"))
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

// ── Config loading ──────────────────────────────────────────────────

/// Keys read before the main extraction because they change the defaults.
#[derive(Debug, Default, Deserialize)]
struct Layout {
    /// Relocates every path under one directory.
    root: Option<PathBuf>,
}

fn sources(path: &Path) -> Figment {
    Figment::new().merge(Toml::file(path)).merge(
        Env::prefixed(ENV_PREFIX)
            .split("__")
            .ignore(&["config"]),
    )
}

/// Load the router configuration from file + environment.
///
/// A missing default file is fine (defaults apply); a missing file that
/// was asked for explicitly is an error.
pub fn load_config(explicit: Option<&Path>) -> Result<RouterConfig, ConfigError> {
    let path = config_path(explicit);
    if explicit.is_some() && !path.exists() {
        return Err(ConfigError::Missing { path });
    }

    let layout: Layout = sources(&path).extract()?;
    let base = layout
        .root
        .map_or_else(RouterConfig::default, RouterConfig::rooted_at);

    let config: RouterConfig = Figment::from(Serialized::defaults(base))
        .merge(sources(&path))
        .extract()?;
    validate(&config)?;
    Ok(config)
}

/// Reject values the core cannot operate with.
pub fn validate(config: &RouterConfig) -> Result<(), ConfigError> {
    let invalid = |field: &str, reason: &str| ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    };

    if config.command_timeout_secs == 0 {
        return Err(invalid("command_timeout_secs", "must be at least 1"));
    }
    if config.lock_timeout_secs == 0 {
        return Err(invalid("lock_timeout_secs", "must be at least 1"));
    }
    if config.vrrp_signature.iter().all(|word| word.trim().is_empty()) {
        return Err(invalid("vrrp_signature", "must name the VRRP daemon"));
    }
    for (field, name) in [
        ("services.dhcp", &config.services.dhcp),
        ("services.load_balancer", &config.services.load_balancer),
        ("services.vrrp", &config.services.vrrp),
    ] {
        if name.trim().is_empty() {
            return Err(invalid(field, "service name is empty"));
        }
    }
    if config.data_dir == config.lock_dir {
        return Err(invalid("lock_dir", "must differ from data_dir"));
    }
    Ok(())
}

/// The effective configuration as TOML.
pub fn to_toml(config: &RouterConfig) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(config)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vrouter_core::ServiceManager;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("config.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"
command_timeout_secs = 5
service_manager = "sysv"

[services]
dhcp = "dhcpd"
"#,
        );
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.command_timeout_secs, 5);
        assert_eq!(config.service_manager, ServiceManager::Sysv);
        assert_eq!(config.services.dhcp, "dhcpd");
        assert_eq!(config.services.vrrp, "keepalived");
        assert_eq!(config.data_dir, RouterConfig::default().data_dir);
    }

    #[test]
    fn root_relocates_every_default_path() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("sandbox");
        let path = write_config(
            dir.path(),
            &format!(
                "root = {:?}\n\n[artifacts]\nhosts = \"/srv/hosts\"\n",
                root.display().to_string()
            ),
        );
        let config = load_config(Some(&path)).unwrap();
        let expected = RouterConfig::rooted_at(&root);
        assert_eq!(config.data_dir, expected.data_dir);
        assert_eq!(config.artifacts.rt_tables, expected.artifacts.rt_tables);
        assert_eq!(config.artifacts.hosts, PathBuf::from("/srv/hosts"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { .. }));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "lock_timeout_secs = 0\n");
        let err = load_config(Some(&path)).unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation { ref field, .. } if field == "lock_timeout_secs")
        );
    }

    #[test]
    fn effective_config_round_trips_through_toml() {
        let config = RouterConfig::rooted_at("/tmp/vr");
        let text = to_toml(&config).unwrap();
        assert!(text.contains("[artifacts]"));
        let back: RouterConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
