//! Terminal emphasis for rendered lines.

use minisyslog_common::Severity;

/// ANSI SGR codes for the emphasis functions templates can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Bold,
    Red,
    Green,
    Yellow,
    Blue,
    Gray,
}

impl Color {
    fn code(self) -> &'static str {
        match self {
            Color::Bold => "1",
            Color::Red => "91",
            Color::Green => "92",
            Color::Yellow => "93",
            Color::Blue => "94",
            Color::Gray => "90",
        }
    }

    /// Look up an emphasis function by its template name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "bold" => Some(Color::Bold),
            "red" => Some(Color::Red),
            "green" => Some(Color::Green),
            "yellow" => Some(Color::Yellow),
            "blue" => Some(Color::Blue),
            "gray" => Some(Color::Gray),
            _ => None,
        }
    }
}

/// Presentation settings handed to the renderer at construction.
///
/// With colors disabled every emphasis function returns its input unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Style {
    enabled: bool,
}

impl Style {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Style that emits ANSI escape sequences.
    pub fn colored() -> Self {
        Self::new(true)
    }

    /// Style that never emits escape sequences.
    pub fn plain() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Wrap `text` in the escape sequence for `color`.
    pub fn paint(&self, color: Color, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{}m{}\x1b[0m", color.code(), text)
        } else {
            text.to_string()
        }
    }

    /// Severity label with the emphasis conventionally used for it.
    pub fn severity(&self, severity: Severity) -> String {
        let label = severity.as_str();
        match severity {
            Severity::Debug => self.paint(Color::Gray, label),
            Severity::Informational | Severity::Notice => self.paint(Color::Blue, label),
            Severity::Warning => self.paint(Color::Yellow, label),
            Severity::Error => self.paint(Color::Red, label),
            Severity::Critical | Severity::Alert | Severity::Emergency => {
                self.paint(Color::Bold, &self.paint(Color::Red, label))
            }
        }
    }
}

impl Default for Style {
    fn default() -> Self {
        Self::colored()
    }
}
