pub mod token_counter;

use tracing_subscriber::EnvFilter;

pub use token_counter::{log_session_usage, SessionUsage};

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (TRACE, DEBUG, INFO, ERROR)
///
/// Logs go to stderr so streamed tokens on stdout stay clean.
pub fn init_tracing(log_level: &str) {
    let Some(directive) = filter_directive(log_level) else {
        return;
    };

    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("INFO"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn filter_directive(log_level: &str) -> Option<String> {
    let level = log_level.to_uppercase();
    match level.as_str() {
        "DISABLED" => None,
        "WARNING" => Some("WARN".to_string()),
        "CRITICAL" => Some("ERROR".to_string()),
        _ => Some(level),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_mapping() {
        assert_eq!(filter_directive("disabled"), None);
        assert_eq!(filter_directive("Warning").as_deref(), Some("WARN"));
        assert_eq!(filter_directive("CRITICAL").as_deref(), Some("ERROR"));
        assert_eq!(filter_directive("debug").as_deref(), Some("DEBUG"));
    }
}
