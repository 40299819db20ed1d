//! Settings error type.

use thiserror::Error;

/// Errors raised while loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file existed but could not be read or parsed.
    #[error("failed to load settings: {0}")]
    Load(#[from] Box<figment::Error>),
}

impl From<figment::Error> for SettingsError {
    fn from(e: figment::Error) -> Self {
        Self::Load(Box::new(e))
    }
}

/// Convenience result alias for this crate.
pub type Result<T> = std::result::Result<T, SettingsError>;
