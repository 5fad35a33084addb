//! ---
//! scs_section: "04-configuration-orchestration"
//! scs_subsection: "module"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "Load, validate, merge and persist the general settings singleton."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use sysconf_msg::{EventBus, EventKind};
use sysconf_persistence::{strip_prefix, Datastore, WriteOptions};
use tracing::{debug, info, warn};

use crate::choices::{Choice, ChoiceCache};
use crate::languages::language_choices;
use crate::model::{GeneralSettings, GeneralSettingsPatch};
use crate::validation::{SettingsValidator, ValidationErrors};
use crate::{Result, SettingsError};

/// Table holding the settings singleton.
pub const SETTINGS_TABLE: &str = "system.settings";
/// Column prefix for [`SETTINGS_TABLE`].
pub const SETTINGS_PREFIX: &str = "stg_";
/// Topic announcing settings changes.
pub const SETTINGS_TOPIC: &str = "system.general";

/// Orchestrates reads and updates of the general settings record.
///
/// Updates are not serialized: two concurrent `update` calls each load,
/// validate and persist independently, and whichever writes last wins.
pub struct GeneralSettingsService {
    datastore: Arc<dyn Datastore>,
    choices: Arc<ChoiceCache>,
    validator: SettingsValidator,
    events: Option<Arc<dyn EventBus>>,
    seed_lock: Mutex<()>,
}

impl GeneralSettingsService {
    pub fn new(datastore: Arc<dyn Datastore>, choices: Arc<ChoiceCache>) -> Self {
        let validator = SettingsValidator::new(Arc::clone(&choices), Arc::clone(&datastore));
        Self {
            datastore,
            choices,
            validator,
            events: None,
            seed_lock: Mutex::new(()),
        }
    }

    /// Publish a change event after every successful update.
    pub fn with_events(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn choices(&self) -> &Arc<ChoiceCache> {
        &self.choices
    }

    /// The effective settings, seeding defaults on first access.
    pub fn current(&self) -> Result<GeneralSettings> {
        if let Some(settings) = self.load()? {
            return Ok(settings);
        }

        let _guard = self.seed_lock.lock();
        if let Some(settings) = self.load()? {
            return Ok(settings);
        }
        let mut settings = GeneralSettings::default();
        settings.id = self.datastore.insert(
            SETTINGS_TABLE,
            settings.to_record()?,
            &WriteOptions::with_prefix(SETTINGS_PREFIX),
        )?;
        info!(id = settings.id, "seeded default general settings");
        Ok(settings)
    }

    fn load(&self) -> Result<Option<GeneralSettings>> {
        let Some(record) = self.datastore.query(SETTINGS_TABLE, &[])?.into_iter().next() else {
            return Ok(None);
        };
        let settings = GeneralSettings::from_record(strip_prefix(record, SETTINGS_PREFIX))?;
        Ok(Some(settings))
    }

    /// Validate a patch against the current settings without applying it.
    pub fn check(&self, patch: &GeneralSettingsPatch) -> Result<ValidationErrors> {
        let current = self.current()?;
        Ok(self.validator.validate(patch, &current)?)
    }

    /// Validate, merge and persist a patch, returning the new effective settings.
    ///
    /// A patch with no fields is a no-op and returns the current settings.
    pub fn update(&self, patch: &GeneralSettingsPatch) -> Result<GeneralSettings> {
        if patch.is_empty() {
            debug!("empty settings patch, nothing to apply");
            return self.current();
        }

        let current = self.current()?;
        let verrors = self.validator.validate(patch, &current)?;
        if !verrors.is_empty() {
            warn!(errors = %verrors, "general settings rejected");
            return Err(SettingsError::Validation(verrors));
        }

        let merged = current.merged(patch);
        self.datastore.update(
            SETTINGS_TABLE,
            current.id,
            merged.to_record()?,
            &WriteOptions::with_prefix(SETTINGS_PREFIX),
        )?;

        let fields = patch.present_fields();
        info!(id = merged.id, ?fields, "general settings updated");
        self.announce(&fields);
        Ok(merged)
    }

    fn announce(&self, fields: &[&str]) {
        let Some(bus) = &self.events else {
            return;
        };
        let mut payload = Map::new();
        payload.insert(
            "fields".to_owned(),
            Value::from(fields.iter().map(|f| Value::from(*f)).collect::<Vec<_>>()),
        );
        if let Err(err) = bus.send_event(SETTINGS_TOPIC, EventKind::Changed, "general", payload) {
            warn!(error = %err, "failed to publish settings change");
        }
    }

    pub fn timezone_choices(&self) -> Arc<Vec<String>> {
        self.choices.timezones()
    }

    pub fn keyboard_map_choices(&self) -> Arc<Vec<Choice>> {
        self.choices.keyboard_maps()
    }

    pub fn language_choices(&self) -> Vec<Choice> {
        language_choices()
    }
}

impl std::fmt::Debug for GeneralSettingsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneralSettingsService")
            .field("choices", &self.choices)
            .field("events", &self.events.is_some())
            .finish_non_exhaustive()
    }
}
