//! CLI argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{ListenerProtocol, MiniSyslogConfig};

/// Command line arguments. Every flag overrides the config file.
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "minisyslog",
    version,
    about = "Mini syslog receiver with papertrail-like output"
)]
pub struct Args {
    /// Path to an optional JSON5 configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// What IP:Port (or socket path for dgram) to bind to [default: :1514].
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Which protocol to use [default: udp].
    #[arg(short, long, value_enum)]
    pub protocol: Option<ListenerProtocol>,

    /// Disable colors.
    #[arg(long)]
    pub no_color: bool,

    /// Override output template.
    #[arg(short, long)]
    pub template: Option<String>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Args {
    /// Parse CLI arguments from the process command line.
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Load the config file (if any) and apply CLI overrides on top.
    pub fn into_config(self) -> anyhow::Result<MiniSyslogConfig> {
        let mut config = match &self.config {
            Some(path) => MiniSyslogConfig::load_from_file(path)?,
            None => MiniSyslogConfig::default(),
        };
        self.apply(&mut config);
        config.validate_config()?;
        Ok(config)
    }

    /// Apply CLI overrides to `config`.
    pub fn apply(self, config: &mut MiniSyslogConfig) {
        if let Some(bind) = self.bind {
            config.listener.bind = bind;
        }
        if let Some(protocol) = self.protocol {
            config.listener.protocol = protocol;
        }
        if self.no_color {
            config.output.color = false;
        }
        if let Some(template) = self.template.filter(|t| !t.is_empty()) {
            config.output.template = Some(template);
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["minisyslog"]).unwrap();
        let config = args.into_config().unwrap();
        assert_eq!(config.listener.bind, ":1514");
        assert_eq!(config.listener.protocol, ListenerProtocol::Udp);
        assert!(config.output.color);
        assert!(config.output.template.is_none());
    }

    #[test]
    fn test_overrides() {
        let args = Args::try_parse_from([
            "minisyslog",
            "-b",
            "127.0.0.1:6514",
            "-p",
            "tcp",
            "--no-color",
            "-t",
            "{{ .message }}",
            "--log-level",
            "debug",
        ])
        .unwrap();

        let config = args.into_config().unwrap();
        assert_eq!(config.listener.bind, "127.0.0.1:6514");
        assert_eq!(config.listener.protocol, ListenerProtocol::Tcp);
        assert!(!config.output.color);
        assert_eq!(config.output.template.as_deref(), Some("{{ .message }}"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_empty_template_keeps_default() {
        let args = Args::try_parse_from(["minisyslog", "--template", ""]).unwrap();
        let config = args.into_config().unwrap();
        assert!(config.output.template.is_none());
    }

    #[test]
    fn test_rejects_unknown_protocol() {
        assert!(Args::try_parse_from(["minisyslog", "-p", "sctp"]).is_err());
    }

    #[test]
    fn test_invalid_bind_fails_validation() {
        let args = Args::try_parse_from(["minisyslog", "-b", "localhost"]).unwrap();
        assert!(args.into_config().is_err());
    }

    #[test]
    fn test_config_file_with_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("minisyslog.json5");
        std::fs::write(
            &path,
            r#"{ listener: { protocol: "tcp", bind: "127.0.0.1:7000" }, output: { color: false } }"#,
        )
        .unwrap();

        let args = Args::try_parse_from([
            "minisyslog",
            "--config",
            path.to_str().unwrap(),
            "-b",
            "127.0.0.1:7001",
        ])
        .unwrap();

        let config = args.into_config().unwrap();
        assert_eq!(config.listener.protocol, ListenerProtocol::Tcp);
        assert_eq!(config.listener.bind, "127.0.0.1:7001");
        assert!(!config.output.color);
    }
}
