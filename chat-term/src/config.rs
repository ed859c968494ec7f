//! Load config from file and environment.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use chat_core::{DiscoveredDevice, SERVICE_PORT};
use serde::Deserialize;

/// Client configuration. File: ~/.config/linechat/config.toml or /etc/linechat/config.toml.
/// Env overrides: LINECHAT_NAME, LINECHAT_PORT, LINECHAT_BIND, LINECHAT_LOG.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Display name; prompted for when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Listener bind address (default 0.0.0.0).
    #[serde(default = "default_bind_host")]
    pub bind_host: IpAddr,
    /// Listener port, also the default port when dialing (default 47100).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Approve every inbound peer without asking.
    #[serde(default)]
    pub auto_accept: bool,
    /// Log filter when RUST_LOG is unset (default "warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Devices returned by a scan.
    #[serde(default)]
    pub devices: Vec<DiscoveredDevice>,
}

fn default_bind_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}
fn default_port() -> u16 {
    SERVICE_PORT
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: None,
            bind_host: default_bind_host(),
            port: default_port(),
            auto_accept: false,
            log_level: default_log_level(),
            devices: Vec::new(),
        }
    }
}

impl Config {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.port)
    }
}

/// Load config: default, then config file (explicit path or first existing default path), then env vars.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut c = match path {
        Some(p) => read_file(p)?,
        None => match config_paths().into_iter().find(|p| p.exists()) {
            Some(p) => read_file(&p)?,
            None => Config::default(),
        },
    };
    apply_env(&mut c, |key| std::env::var(key).ok());
    Ok(c)
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("LINECHAT_NAME") {
        c.name = Some(s);
    }
    if let Some(s) = var("LINECHAT_PORT") {
        if let Ok(p) = s.parse::<u16>() {
            c.port = p;
        }
    }
    if let Some(s) = var("LINECHAT_BIND") {
        if let Ok(ip) = s.parse::<IpAddr>() {
            c.bind_host = ip;
        }
    }
    if let Some(s) = var("LINECHAT_LOG") {
        c.log_level = s;
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/linechat/config.toml"));
    }
    out.push(PathBuf::from("/etc/linechat/config.toml"));
    out
}

fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&s).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_defaults() {
        assert_eq!(parse("").unwrap(), Config::default());
        assert_eq!(Config::default().bind_addr().port(), SERVICE_PORT);
    }

    #[test]
    fn full_file() {
        let c = parse(
            r#"
name = "alice"
bind_host = "127.0.0.1"
port = 9000
auto_accept = true
log_level = "debug"

[[devices]]
address = "10.0.0.2:9000"
name = "Bob-Laptop"
"#,
        )
        .unwrap();
        assert_eq!(c.name.as_deref(), Some("alice"));
        assert_eq!(c.bind_addr(), "127.0.0.1:9000".parse().unwrap());
        assert!(c.auto_accept);
        assert_eq!(c.devices, vec![DiscoveredDevice::new("10.0.0.2:9000", "Bob-Laptop")]);
    }

    #[test]
    fn unknown_field_rejected() {
        assert!(parse("colour = \"blue\"").is_err());
    }

    #[test]
    fn env_overrides_file() {
        let mut c = Config::default();
        apply_env(&mut c, |key| match key {
            "LINECHAT_NAME" => Some("carol".to_string()),
            "LINECHAT_PORT" => Some("4000".to_string()),
            "LINECHAT_BIND" => Some("not-an-ip".to_string()),
            _ => None,
        });
        assert_eq!(c.name.as_deref(), Some("carol"));
        assert_eq!(c.port, 4000);
        assert_eq!(c.bind_host, default_bind_host());
        assert_eq!(c.log_level, "warn");
    }

    #[test]
    fn missing_explicit_file_is_error() {
        let err = load(Some(Path::new("/nonexistent/linechat.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
