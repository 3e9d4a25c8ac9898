//! Line configuration.
//!
//! Parameters are set either through builder methods or through the
//! `KEY=value` strings understood by the engine tooling:
//!
//! | Key        | Field            | Default     |
//! |------------|------------------|-------------|
//! | `NODE`     | engine host      | `localhost` |
//! | `PORT`     | engine UDP port  | 20000       |
//! | `HOSTPORT` | local bind port  | 0 (any)     |
//! | `PACKLEN`  | packet size      | 1024        |
//! | `TIMEOUT`  | poll seconds     | 5           |

use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default engine host.
pub const DEFAULT_NODE: &str = "localhost";

/// Default engine port.
pub const DEFAULT_PORT: u16 = 20000;

/// Default requested packet size.
pub const DEFAULT_PACKLEN: usize = 1024;

/// Default receive poll timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Configuration of one line to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineConfig {
    /// Host name or dotted IPv4 address of the engine.
    pub node: String,

    /// UDP port the engine listens on.
    pub port: u16,

    /// Local port to bind, 0 lets the OS choose.
    pub host_port: u16,

    /// Requested packet size including the 4-byte header.
    pub packet_len: usize,

    /// Time to wait for each datagram while receiving.
    pub timeout: Duration,
}

impl LineConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            node: DEFAULT_NODE.to_string(),
            port: DEFAULT_PORT,
            host_port: 0,
            packet_len: DEFAULT_PACKLEN,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Sets the engine host.
    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = node.into();
        self
    }

    /// Sets the engine port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the local bind port.
    pub fn with_host_port(mut self, port: u16) -> Self {
        self.host_port = port;
        self
    }

    /// Sets the requested packet size.
    pub fn with_packet_len(mut self, len: usize) -> Self {
        self.packet_len = len;
        self
    }

    /// Sets the receive poll timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Applies one `KEY=value` setting.
    pub fn apply(&mut self, setting: &str) -> Result<()> {
        let (key, value) = setting
            .split_once('=')
            .ok_or_else(|| Error::Config(format!("expected KEY=value, got \"{setting}\"")))?;

        match key {
            "NODE" => {
                if value.is_empty() {
                    return Err(Error::Config("NODE must not be empty".to_string()));
                }
                self.node = value.to_string();
            }
            "PORT" => self.port = parse_decimal(key, value)?,
            "HOSTPORT" => self.host_port = parse_decimal(key, value)?,
            "PACKLEN" => self.packet_len = parse_decimal(key, value)?,
            "TIMEOUT" => self.timeout = Duration::from_secs(parse_decimal(key, value)?),
            _ => return Err(Error::Config(format!("unknown key \"{key}\""))),
        }
        Ok(())
    }
}

impl Default for LineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a list of settings separated by whitespace or commas.
impl FromStr for LineConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut config = Self::new();
        for setting in s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
        {
            config.apply(setting)?;
        }
        Ok(config)
    }
}

/// Plain decimal digits only; no sign, no whitespace.
fn parse_decimal<T: FromStr>(key: &str, value: &str) -> Result<T> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::Config(format!("{key} expects a decimal number, got \"{value}\"")));
    }
    value
        .parse()
        .map_err(|_| Error::Config(format!("{key} value {value} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LineConfig::default();
        assert_eq!(config.node, "localhost");
        assert_eq!(config.port, 20000);
        assert_eq!(config.host_port, 0);
        assert_eq!(config.packet_len, 1024);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_apply_keys() {
        let mut config = LineConfig::new();
        config.apply("NODE=192.168.0.10").unwrap();
        config.apply("PORT=20010").unwrap();
        config.apply("HOSTPORT=30000").unwrap();
        config.apply("PACKLEN=512").unwrap();
        config.apply("TIMEOUT=2").unwrap();

        assert_eq!(config.node, "192.168.0.10");
        assert_eq!(config.port, 20010);
        assert_eq!(config.host_port, 30000);
        assert_eq!(config.packet_len, 512);
        assert_eq!(config.timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_rejects_bad_settings() {
        let mut config = LineConfig::new();
        assert!(matches!(config.apply("SPEED=3"), Err(Error::Config(_))));
        assert!(matches!(config.apply("PORT"), Err(Error::Config(_))));
        assert!(matches!(config.apply("PORT=20x"), Err(Error::Config(_))));
        assert!(matches!(config.apply("PORT=-1"), Err(Error::Config(_))));
        assert!(matches!(config.apply("PORT=70000"), Err(Error::Config(_))));
        assert!(matches!(config.apply("TIMEOUT="), Err(Error::Config(_))));

        // Failed settings leave the configuration untouched.
        assert_eq!(config, LineConfig::new());
    }

    #[test]
    fn test_from_str_list() {
        let config: LineConfig = "NODE=engine, PORT=20002\nPACKLEN=1400".parse().unwrap();
        assert_eq!(config.node, "engine");
        assert_eq!(config.port, 20002);
        assert_eq!(config.packet_len, 1400);

        assert!("NODE=engine BOGUS=1".parse::<LineConfig>().is_err());
    }
}
