//! Shared utilities: logging, names.

use tracing::Level;

/// Initialize tracing with env filter. Safe to call once at startup.
pub fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Normalize a case name for lookup (lowercase, trim).
pub fn normalize_name(s: &str) -> String {
    s.trim().to_lowercase()
}

/// File-name-safe slug for a case stem.
pub fn slug(s: &str) -> String {
    normalize_name(s)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}
