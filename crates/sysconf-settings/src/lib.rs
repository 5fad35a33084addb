//! ---
//! scs_section: "04-configuration-orchestration"
//! scs_subsection: "module"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "General settings validation and update pipeline."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
//! General system settings: the persisted singleton record, the choice lists
//! its fields are checked against, and the validate → merge → persist update
//! path.

pub mod certificates;
pub mod choices;
pub mod languages;
pub mod model;
pub mod service;
pub mod validation;

use sysconf_persistence::PersistenceError;

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Failure modes of settings reads and updates.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("datastore error: {0}")]
    Datastore(#[from] PersistenceError),
    #[error("stored settings record is corrupt: {0}")]
    CorruptRecord(#[from] serde_json::Error),
}

impl SettingsError {
    /// The field errors when this is a validation failure.
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            SettingsError::Validation(verrors) => Some(verrors),
            _ => None,
        }
    }
}

pub use certificates::{fingerprint, CertificateRecord, NotACertificate, CERTIFICATE_TABLE};
pub use choices::{Choice, ChoiceCache, ChoiceSource, FilesystemChoiceSource};
pub use languages::{is_supported_language, language_choices};
pub use model::{GeneralSettings, GeneralSettingsPatch, GuiProtocol, SyslogLevel};
pub use service::{GeneralSettingsService, SETTINGS_PREFIX, SETTINGS_TABLE, SETTINGS_TOPIC};
pub use validation::{SettingsValidator, ValidationError, ValidationErrors, SCHEMA};
