// ABOUTME: Runtime configuration for the two database endpoints
// ABOUTME: Loads .env, then validates the source and destination URLs once at startup

use crate::error::MigrationError;
use crate::utils;

/// Environment variable holding the source database URL.
pub const SOURCE_DB_URL: &str = "SOURCE_DB_URL";
/// Environment variable holding the destination database URL.
pub const DEST_DB_URL: &str = "DEST_DB_URL";

/// Load variables from a `.env` file in the working directory, if one exists.
///
/// Variables already present in the process environment win. A missing file
/// is not an error since both URLs may be exported directly.
pub fn load_dotenv() {
    match dotenv::dotenv() {
        Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => tracing::debug!("No .env file found"),
        Err(e) => tracing::warn!("Ignoring unreadable .env file: {}", e),
    }
}

/// Source and destination connection URLs.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub source_url: String,
    pub dest_url: String,
}

impl ConnectionSettings {
    /// Build settings from already-resolved URLs, rejecting malformed ones.
    pub fn new(source_url: String, dest_url: String) -> Result<Self, MigrationError> {
        check("source", &source_url)?;
        check("destination", &dest_url)?;
        Ok(Self {
            source_url,
            dest_url,
        })
    }
}

fn check(side: &'static str, url: &str) -> Result<(), MigrationError> {
    utils::validate_connection_string(url).map_err(|e| MigrationError::InvalidConnectionString {
        side,
        reason: e.to_string(),
    })
}
