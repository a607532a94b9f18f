//! Mini syslog receiver.
//!
//! Receives syslog messages over UDP, TCP or a Unix datagram socket, decodes
//! them and prints one line per message through a user-supplied template.
//!
//! # Supported Formats
//!
//! - RFC 5424 (structured syslog)
//! - RFC 3164 (BSD syslog)
//! - Bare `<PRI>text`
//!
//! TCP connections may use either RFC 6587 octet counting or newline
//! delimited framing.
//!
//! # Pipeline
//!
//! ```text
//! listener ──(decode)──▶ dispatch channel ──▶ render loop ──▶ stdout
//! ```
//!
//! The default output template is
//! ```text
//! {{ .timestamp }} [{{ severity .severity }}] {{ yellow .hostname }} {{ or .app_name .tag | blue }}: {{ or .message .content }}
//! ```

pub mod args;
pub mod config;
pub mod dispatch;
pub mod framing;
pub mod parser;
pub mod receiver;
pub mod render;
pub mod runner;
pub mod style;
pub mod template;

pub use args::Args;
pub use config::{ListenerConfig, ListenerProtocol, MiniSyslogConfig, OutputConfig};
pub use receiver::Listener;
pub use runner::Runner;
pub use style::Style;
pub use template::{DEFAULT_TEMPLATE, TemplateProgram};
