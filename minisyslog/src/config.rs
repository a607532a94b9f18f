//! Receiver configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

pub use minisyslog_common::LoggingConfig;

/// Complete minisyslog configuration.
///
/// Every section is optional; an empty file yields the same settings as no
/// file at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MiniSyslogConfig {
    /// Where and how to listen.
    #[serde(default)]
    pub listener: ListenerConfig,

    /// How received messages are printed.
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Transport: "udp", "tcp", or "dgram".
    #[serde(default)]
    pub protocol: ListenerProtocol,

    /// Bind address.
    /// - For UDP/TCP: "0.0.0.0:514" (":514" binds all interfaces)
    /// - For dgram: "/var/run/syslog.sock"
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Maximum message size in bytes (datagram buffer, TCP frame limit).
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// TCP: maximum concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// TCP: idle timeout in seconds. No timeout when unset.
    #[serde(default)]
    pub connection_timeout_secs: Option<u64>,

    /// Unix socket: file permissions (octal, e.g., 0o666 = 438).
    #[serde(default = "default_socket_mode")]
    pub socket_mode: u32,

    /// Unix socket: remove existing socket file before binding.
    #[serde(default = "default_true")]
    pub remove_existing_socket: bool,
}

fn default_bind() -> String {
    ":1514".to_string()
}

fn default_max_message_size() -> usize {
    65535
}

fn default_max_connections() -> usize {
    1024
}

fn default_socket_mode() -> u32 {
    0o666
}

fn default_true() -> bool {
    true
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            protocol: ListenerProtocol::default(),
            bind: default_bind(),
            max_message_size: default_max_message_size(),
            max_connections: default_max_connections(),
            connection_timeout_secs: None,
            socket_mode: default_socket_mode(),
            remove_existing_socket: default_true(),
        }
    }
}

impl ListenerConfig {
    /// Bind address as the OS expects it.
    ///
    /// An empty host (":1514") means all interfaces.
    pub fn bind_address(&self) -> String {
        match self.protocol {
            ListenerProtocol::Udp | ListenerProtocol::Tcp if self.bind.starts_with(':') => {
                format!("0.0.0.0{}", self.bind)
            }
            _ => self.bind.clone(),
        }
    }
}

/// Listener protocol type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ListenerProtocol {
    /// Connectionless datagrams, one message per packet.
    #[default]
    Udp,
    /// Stream connections, octet-counted or newline-delimited.
    Tcp,
    /// Unix domain datagram socket, one message per packet.
    Dgram,
}

impl std::fmt::Display for ListenerProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Udp => write!(f, "udp"),
            Self::Tcp => write!(f, "tcp"),
            Self::Dgram => write!(f, "dgram"),
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Emit ANSI colors.
    #[serde(default = "default_true")]
    pub color: bool,

    /// Template override; the built-in template is used when unset.
    #[serde(default)]
    pub template: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            color: true,
            template: None,
        }
    }
}

impl MiniSyslogConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let config: Self = minisyslog_common::load_config(path)?;
        config.validate_config()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate_config(&self) -> anyhow::Result<()> {
        let listener = &self.listener;

        if listener.bind.is_empty() {
            anyhow::bail!("Listener has empty bind address");
        }

        match listener.protocol {
            ListenerProtocol::Udp | ListenerProtocol::Tcp => {
                // Validate bind address format for network protocols
                if !listener.bind.contains(':') {
                    anyhow::bail!(
                        "{} bind address must include port (e.g., '0.0.0.0:514' or ':1514')",
                        listener.protocol
                    );
                }
            }
            ListenerProtocol::Dgram => {}
        }

        if listener.max_message_size == 0 {
            anyhow::bail!("max_message_size must be greater than zero");
        }

        if listener.protocol == ListenerProtocol::Tcp && listener.max_connections == 0 {
            anyhow::bail!("max_connections must be greater than zero");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_config() {
        let config: MiniSyslogConfig = minisyslog_common::parse_config("{}").unwrap();
        assert_eq!(config.listener.protocol, ListenerProtocol::Udp);
        assert_eq!(config.listener.bind, ":1514");
        assert!(config.output.color);
        assert!(config.output.template.is_none());
        assert_eq!(config.logging.level, "info");
        assert!(config.validate_config().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            listener: {
                protocol: "tcp",
                bind: "127.0.0.1:6514",
                max_message_size: 8192,
                max_connections: 500,
                connection_timeout_secs: 30
            },
            output: {
                color: false,
                template: "{{ .hostname }}: {{ .message }}"
            },
            logging: {
                level: "debug"
            }
        }"#;

        let config: MiniSyslogConfig = minisyslog_common::parse_config(json).unwrap();
        assert_eq!(config.listener.protocol, ListenerProtocol::Tcp);
        assert_eq!(config.listener.bind, "127.0.0.1:6514");
        assert_eq!(config.listener.max_message_size, 8192);
        assert_eq!(config.listener.max_connections, 500);
        assert_eq!(config.listener.connection_timeout_secs, Some(30));
        assert!(!config.output.color);
        assert_eq!(
            config.output.template.as_deref(),
            Some("{{ .hostname }}: {{ .message }}")
        );
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate_config().is_ok());
    }

    #[test]
    fn test_parse_dgram_config() {
        let json = r#"{
            listener: {
                protocol: "dgram",
                bind: "/var/run/syslog.sock",
                socket_mode: 384,
                remove_existing_socket: false
            }
        }"#;

        let config: MiniSyslogConfig = minisyslog_common::parse_config(json).unwrap();
        assert_eq!(config.listener.protocol, ListenerProtocol::Dgram);
        assert_eq!(config.listener.bind_address(), "/var/run/syslog.sock");
        assert_eq!(config.listener.socket_mode, 0o600);
        assert!(!config.listener.remove_existing_socket);
        assert!(config.validate_config().is_ok());
    }

    #[test]
    fn test_unknown_protocol_rejected() {
        let json = r#"{ listener: { protocol: "unix" } }"#;
        assert!(minisyslog_common::parse_config::<MiniSyslogConfig>(json).is_err());
    }

    #[test]
    fn test_bind_address_normalization() {
        let mut listener = ListenerConfig::default();
        assert_eq!(listener.bind_address(), "0.0.0.0:1514");

        listener.bind = "127.0.0.1:514".to_string();
        assert_eq!(listener.bind_address(), "127.0.0.1:514");

        listener.protocol = ListenerProtocol::Dgram;
        listener.bind = ":odd-but-valid-path".to_string();
        assert_eq!(listener.bind_address(), ":odd-but-valid-path");
    }

    #[test]
    fn test_validate_missing_port() {
        let mut config = MiniSyslogConfig::default();
        config.listener.bind = "0.0.0.0".to_string();
        assert!(config.validate_config().is_err());

        config.listener.protocol = ListenerProtocol::Dgram;
        assert!(config.validate_config().is_ok());
    }

    #[test]
    fn test_validate_empty_bind() {
        let mut config = MiniSyslogConfig::default();
        config.listener.bind = String::new();
        assert!(config.validate_config().is_err());
    }

    #[test]
    fn test_validate_limits() {
        let mut config = MiniSyslogConfig::default();
        config.listener.max_message_size = 0;
        assert!(config.validate_config().is_err());

        let mut config = MiniSyslogConfig::default();
        config.listener.protocol = ListenerProtocol::Tcp;
        config.listener.max_connections = 0;
        assert!(config.validate_config().is_err());
    }
}
