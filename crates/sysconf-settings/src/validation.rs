//! ---
//! scs_section: "04-configuration-orchestration"
//! scs_subsection: "module"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "Business-rule validation for general settings patches."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
//! Rule-based validation of [`GeneralSettingsPatch`] values.
//!
//! Rules run in a fixed order and accumulate errors into a
//! [`ValidationErrors`] set. The one exception is an unknown certificate id:
//! that error is returned on its own turn and no later rule runs.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sysconf_persistence::{Datastore, Result as PersistenceResult};
use tracing::{debug, warn};

use crate::certificates::{fingerprint, lookup_certificate, CertificateRecord};
use crate::choices::ChoiceCache;
use crate::languages::is_supported_language;
use crate::model::{GeneralSettings, GeneralSettingsPatch, GuiProtocol};

/// Root of every qualified attribute path.
pub const SCHEMA: &str = "general_settings";

pub const MSG_REQUIRED: &str = "This field is required";
pub const MSG_SYSLOG_FORMAT: &str = "Invalid syslog server format";
pub const MSG_CERTIFICATE_REQUIRED: &str =
    "Protocol has been selected as HTTPS, certificate is required";
pub const MSG_CERTIFICATE_NOT_FOUND: &str =
    "No matching certificate found in database records, kindly check again";
pub const MSG_INVALID_CHOICE: &str = "Invalid choice";
pub const MSG_PORT_RANGE: &str = "Value must be between 1 and 65535";

static SYSLOG_SERVER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.\-]+(:\d+)?$").expect("valid syslog server regex"));

/// Whether `value` is `host` or `host:port` without a scheme.
pub fn is_valid_syslog_server(value: &str) -> bool {
    SYSLOG_SERVER.is_match(value)
}

/// One field level failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub attribute: String,
    pub message: String,
}

/// Ordered set of field level failures. Empty means the patch passed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, attribute: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            attribute: attribute.into(),
            message: message.into(),
        });
    }

    /// Add an error under `general_settings.<field>`.
    pub fn add_field(&mut self, field: &str, message: impl Into<String>) {
        self.add(format!("{SCHEMA}.{field}"), message);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.errors.iter()
    }

    /// Message recorded for an exact attribute path, if any.
    pub fn message_for(&self, attribute: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|error| error.attribute == attribute)
            .map(|error| error.message.as_str())
    }

    pub fn into_vec(self) -> Vec<ValidationError> {
        self.errors
    }
}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, error) in self.errors.iter().enumerate() {
            if idx > 0 {
                f.write_str("; ")?;
            }
            write!(f, "[{}] {}", error.attribute, error.message)?;
        }
        Ok(())
    }
}

/// Checks a patch against syslog, protocol/certificate, choice and port rules.
pub struct SettingsValidator {
    choices: Arc<ChoiceCache>,
    datastore: Arc<dyn Datastore>,
}

impl SettingsValidator {
    pub fn new(choices: Arc<ChoiceCache>, datastore: Arc<dyn Datastore>) -> Self {
        Self { choices, datastore }
    }

    /// Run every rule. Only a failing certificate lookup surfaces as `Err`.
    pub fn validate(
        &self,
        patch: &GeneralSettingsPatch,
        current: &GeneralSettings,
    ) -> PersistenceResult<ValidationErrors> {
        let mut verrors = ValidationErrors::new();

        check_syslog_server(patch, &mut verrors);
        if self
            .check_gui_protocol(patch, current, &mut verrors)?
            .is_break()
        {
            return Ok(verrors);
        }
        self.check_choices(patch, &mut verrors);
        check_ports(patch, &mut verrors);

        Ok(verrors)
    }

    fn check_gui_protocol(
        &self,
        patch: &GeneralSettingsPatch,
        current: &GeneralSettings,
        verrors: &mut ValidationErrors,
    ) -> PersistenceResult<ControlFlow<()>> {
        let Some(protocol) = patch.guiprotocol else {
            verrors.add_field("guiprotocol", MSG_REQUIRED);
            return Ok(ControlFlow::Continue(()));
        };
        if protocol == GuiProtocol::Http {
            return Ok(ControlFlow::Continue(()));
        }
        debug!(from = ?current.guiprotocol, to = ?protocol, "GUI protocol requires a certificate");

        let Some(certificate_id) = patch.certificate_id() else {
            verrors.add_field("guicertificate", MSG_CERTIFICATE_REQUIRED);
            return Ok(ControlFlow::Continue(()));
        };

        let rows = lookup_certificate(self.datastore.as_ref(), certificate_id)?;
        let Some(row) = rows.into_iter().next() else {
            verrors.add_field("guicertificate", MSG_CERTIFICATE_NOT_FOUND);
            // Unknown certificate ends validation with what has accumulated so far.
            return Ok(ControlFlow::Break(()));
        };

        let pem = CertificateRecord::from_record(row)
            .map(|cert| cert.cert_certificate)
            .unwrap_or_default();
        match fingerprint(pem.as_bytes()) {
            Ok(fp) => debug!(
                certificate = certificate_id,
                fingerprint = %fp,
                "fingerprint of the certificate used in the GUI"
            ),
            Err(err) => warn!(certificate = certificate_id, error = %err, "cannot fingerprint GUI certificate"),
        }
        Ok(ControlFlow::Continue(()))
    }

    fn check_choices(&self, patch: &GeneralSettingsPatch, verrors: &mut ValidationErrors) {
        if let Some(kbdmap) = patch.kbdmap.as_deref().filter(|v| !v.is_empty()) {
            if !self.choices.has_keyboard_map(kbdmap) {
                verrors.add_field("kbdmap", MSG_INVALID_CHOICE);
            }
        }
        if let Some(timezone) = patch.timezone.as_deref().filter(|v| !v.is_empty()) {
            if !self.choices.has_timezone(timezone) {
                verrors.add_field("timezone", MSG_INVALID_CHOICE);
            }
        }
        if let Some(language) = patch.language.as_deref().filter(|v| !v.is_empty()) {
            if !is_supported_language(language) {
                verrors.add_field("language", MSG_INVALID_CHOICE);
            }
        }
    }
}

fn check_syslog_server(patch: &GeneralSettingsPatch, verrors: &mut ValidationErrors) {
    match patch.syslogserver.as_deref() {
        // Reported under the bare field name, unlike every other rule.
        None | Some("") => verrors.add("syslogserver", MSG_REQUIRED),
        Some(server) if !is_valid_syslog_server(server) => {
            verrors.add_field("syslogserver", MSG_SYSLOG_FORMAT)
        }
        Some(_) => {}
    }
}

fn check_ports(patch: &GeneralSettingsPatch, verrors: &mut ValidationErrors) {
    for (field, port) in [("guiport", patch.guiport), ("guihttpsport", patch.guihttpsport)] {
        if port == Some(0) {
            verrors.add_field(field, MSG_PORT_RANGE);
        }
    }
}
