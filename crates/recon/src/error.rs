use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (tolerance bound, empty window, overlapping channels, etc.).
    ConfigValidation(String),
    /// Timezone identifier that is neither an IANA name nor a fixed offset.
    UnknownTimezone(String),
    /// No accepted name for a required column is present in the table.
    ColumnNotFound {
        table: String,
        column: String,
        attempted: Vec<String>,
        available: Vec<String>,
    },
    /// `key_pattern` that does not compile or lacks a capture group.
    InvalidPattern { channel: String, message: String },
    /// IO error (file read, etc.).
    Io(String),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::UnknownTimezone(tz) => write!(f, "unknown timezone: '{tz}'"),
            Self::ColumnNotFound { table, column, attempted, available } => {
                write!(
                    f,
                    "table '{table}': column '{column}' not found (tried {}; available: {})",
                    quote_list(attempted),
                    quote_list(available),
                )
            }
            Self::InvalidPattern { channel, message } => {
                write!(f, "channel '{channel}': invalid key_pattern: {message}")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}

fn quote_list(names: &[String]) -> String {
    if names.is_empty() {
        return "none".into();
    }
    names
        .iter()
        .map(|n| format!("'{n}'"))
        .collect::<Vec<_>>()
        .join(", ")
}
