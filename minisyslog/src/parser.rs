//! Syslog message decoder supporting RFC 5424 and RFC 3164 (BSD) formats.
//!
//! Every decoded message is flattened into a [`StructuredRecord`] using the
//! field names the templates refer to: RFC 5424 messages produce
//! `app_name`/`message`, RFC 3164 messages produce `tag`/`content`.

use chrono::{DateTime, Datelike, NaiveDateTime, SecondsFormat, Utc};
use minisyslog_common::{Facility, Severity, StructuredRecord};
use once_cell::sync::Lazy;
use regex::Regex;

/// Highest valid PRI value (facility 23, severity 7).
const MAX_PRI: u8 = 191;

/// Parsed syslog message.
#[derive(Debug, Clone)]
pub struct SyslogMessage {
    /// Raw PRI value.
    pub priority: u8,
    /// Facility code.
    pub facility: Facility,
    /// Severity level.
    pub severity: Severity,
    /// Timestamp (if available).
    pub timestamp: Option<DateTime<Utc>>,
    /// Hostname or IP address.
    pub hostname: Option<String>,
    /// Application name (RFC 5424) or tag (RFC 3164).
    pub app_name: Option<String>,
    /// Process ID.
    pub proc_id: Option<String>,
    /// Message ID (RFC 5424).
    pub msg_id: Option<String>,
    /// Raw structured data section (RFC 5424).
    pub structured_data: Option<String>,
    /// Message content.
    pub message: String,
    /// Wire format the message was decoded from.
    pub format: SyslogFormat,
    /// Protocol version (RFC 5424 only).
    pub version: Option<u8>,
}

/// Syslog wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyslogFormat {
    /// RFC 3164 (BSD syslog).
    Rfc3164,
    /// RFC 5424.
    Rfc5424,
    /// Just `<PRI>` followed by free text.
    Bare,
}

// RFC 5424 pattern: <PRI>VERSION TIMESTAMP HOSTNAME APP-NAME PROCID MSGID STRUCTURED-DATA [MSG]
// STRUCTURED-DATA is NILVALUE or one or more SD-ELEMENTs; "]" and '"' inside
// quoted param values may be escaped.
static RFC5424_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?s)^<(\d{1,3})>(\d{1,2}) (\S+) (\S+) (\S+) (\S+) (\S+) ((?:\[(?:[^\]"\\]|\\.|"(?:[^"\\]|\\.)*")*\])+|-)(?: (.*))?$"#,
    )
    .expect("valid RFC 5424 regex")
});

// RFC 3164 pattern: <PRI>TIMESTAMP HOSTNAME TAG[PID]: MSG
// Timestamp formats: "Mmm dd hh:mm:ss" or "Mmm  d hh:mm:ss"
static RFC3164_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)^<(\d{1,3})>([A-Za-z]{3}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2})\s+(\S+)\s+(\S+?)(?:\[(\d+)\])?:\s*(.*)$",
    )
    .expect("valid RFC 3164 regex")
});

// Fallback pattern for messages with just PRI
static BARE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^<(\d{1,3})>(.*)$").expect("valid bare syslog regex"));

/// Decode one framed message into a record.
///
/// `client` is the sender address, when the transport knows it. Returns
/// `None` for bytes that are not a syslog message.
pub fn decode(data: &[u8], client: Option<String>) -> Option<StructuredRecord> {
    let text = String::from_utf8_lossy(data);
    let message = parse(&text)?;
    let mut record = message.into_record();
    record.insert_opt("client", client);
    Some(record)
}

/// Parse a syslog message.
pub fn parse(input: &str) -> Option<SyslogMessage> {
    // Some senders put a BOM before the whole frame
    let input = input.strip_prefix('\u{FEFF}').unwrap_or(input);
    let input = input.trim_matches(|c: char| c.is_whitespace() || c == '\0');

    parse_rfc5424(input)
        .or_else(|| parse_rfc3164(input))
        .or_else(|| parse_bare(input))
}

impl SyslogMessage {
    /// Flatten into a record keyed by the fields of the source format.
    pub fn into_record(self) -> StructuredRecord {
        let mut record = StructuredRecord::new()
            .with_field("priority", self.priority)
            .with_field("facility", self.facility as u8)
            .with_field("severity", self.severity as u8);

        record.insert_opt(
            "timestamp",
            self.timestamp
                .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        record.insert_opt("hostname", self.hostname);
        record.insert_opt("proc_id", self.proc_id);

        let body = (!self.message.is_empty()).then_some(self.message);

        match self.format {
            SyslogFormat::Rfc5424 => {
                record.insert_opt("version", self.version);
                record.insert_opt("app_name", self.app_name);
                record.insert_opt("msg_id", self.msg_id);
                record.insert_opt("structured_data", self.structured_data);
                record.insert_opt("message", body);
            }
            SyslogFormat::Rfc3164 | SyslogFormat::Bare => {
                record.insert_opt("tag", self.app_name);
                record.insert_opt("content", body);
            }
        }

        record
    }
}

/// Split a PRI value into facility and severity.
fn split_priority(pri: u8) -> Option<(Facility, Severity)> {
    if pri > MAX_PRI {
        return None;
    }
    let facility = Facility::from_code(i64::from(pri >> 3))?;
    let severity = Severity::from_code(i64::from(pri & 0x07))?;
    Some((facility, severity))
}

/// Parse RFC 5424 format.
fn parse_rfc5424(input: &str) -> Option<SyslogMessage> {
    let caps = RFC5424_REGEX.captures(input)?;

    let priority: u8 = caps.get(1)?.as_str().parse().ok()?;
    let (facility, severity) = split_priority(priority)?;

    let version: u8 = caps.get(2)?.as_str().parse().ok()?;
    if version == 0 {
        return None;
    }

    let timestamp = parse_rfc5424_timestamp(caps.get(3)?.as_str());

    let hostname = nilvalue_to_option(caps.get(4)?.as_str());
    let app_name = nilvalue_to_option(caps.get(5)?.as_str());
    let proc_id = nilvalue_to_option(caps.get(6)?.as_str());
    let msg_id = nilvalue_to_option(caps.get(7)?.as_str());
    let structured_data = nilvalue_to_option(caps.get(8)?.as_str());

    // MSG may start with a UTF-8 BOM
    let message = caps
        .get(9)
        .map(|m| {
            let msg = m.as_str();
            msg.strip_prefix('\u{FEFF}').unwrap_or(msg).to_string()
        })
        .unwrap_or_default();

    Some(SyslogMessage {
        priority,
        facility,
        severity,
        timestamp,
        hostname,
        app_name,
        proc_id,
        msg_id,
        structured_data,
        message,
        format: SyslogFormat::Rfc5424,
        version: Some(version),
    })
}

/// Parse RFC 3164 format.
fn parse_rfc3164(input: &str) -> Option<SyslogMessage> {
    let caps = RFC3164_REGEX.captures(input)?;

    let priority: u8 = caps.get(1)?.as_str().parse().ok()?;
    let (facility, severity) = split_priority(priority)?;

    let timestamp = parse_rfc3164_timestamp(caps.get(2)?.as_str(), Utc::now().year());

    let hostname = Some(caps.get(3)?.as_str().to_string());
    let app_name = Some(caps.get(4)?.as_str().to_string());
    let proc_id = caps.get(5).map(|m| m.as_str().to_string());
    let message = caps
        .get(6)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    Some(SyslogMessage {
        priority,
        facility,
        severity,
        timestamp,
        hostname,
        app_name,
        proc_id,
        msg_id: None,
        structured_data: None,
        message,
        format: SyslogFormat::Rfc3164,
        version: None,
    })
}

/// Parse bare format (just priority + message).
fn parse_bare(input: &str) -> Option<SyslogMessage> {
    let caps = BARE_REGEX.captures(input)?;

    let priority: u8 = caps.get(1)?.as_str().parse().ok()?;
    let (facility, severity) = split_priority(priority)?;
    let message = caps
        .get(2)
        .map(|m| m.as_str().trim_start().to_string())
        .unwrap_or_default();

    Some(SyslogMessage {
        priority,
        facility,
        severity,
        timestamp: None,
        hostname: None,
        app_name: None,
        proc_id: None,
        msg_id: None,
        structured_data: None,
        message,
        format: SyslogFormat::Bare,
        version: None,
    })
}

/// Parse RFC 5424 timestamp (RFC 3339 format).
fn parse_rfc5424_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if s == "-" {
        return None;
    }

    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Parse RFC 3164 timestamp (e.g., "Jan  5 14:30:00").
///
/// RFC 3164 doesn't include the year, so the caller supplies it.
fn parse_rfc3164_timestamp(s: &str, year: i32) -> Option<DateTime<Utc>> {
    let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
    let with_year = format!("{} {}", normalized, year);

    NaiveDateTime::parse_from_str(&with_year, "%b %d %H:%M:%S %Y")
        .map(|ndt| ndt.and_utc())
        .ok()
}

/// Convert NILVALUE ("-") to None.
fn nilvalue_to_option(s: &str) -> Option<String> {
    if s == "-" { None } else { Some(s.to_string()) }
}
