//! ---
//! scs_section: "04-configuration-orchestration"
//! scs_subsection: "module"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "General settings record, patch, and merge semantics."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sysconf_persistence::Record;

/// Protocols the web GUI may be served with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GuiProtocol {
    #[default]
    Http,
    Https,
    /// Serve both plain HTTP and HTTPS.
    Httphttps,
}

impl GuiProtocol {
    /// Anything other than plain `http` needs a certificate.
    pub fn requires_certificate(self) -> bool {
        !matches!(self, GuiProtocol::Http)
    }
}

/// Minimum severity forwarded to syslog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyslogLevel {
    FEmerg,
    FAlert,
    FCrit,
    FErr,
    FWarning,
    FNotice,
    #[default]
    FInfo,
    FDebug,
    FIsDebug,
}

/// The singleton general settings record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Row id assigned by the datastore when the record was first seeded.
    pub id: u64,
    pub guiaddress: Ipv4Addr,
    pub guiv6address: Ipv6Addr,
    pub guiport: u16,
    pub guihttpsport: u16,
    pub guiprotocol: GuiProtocol,
    pub guihttpsredirect: bool,
    pub guicertificate: Option<u64>,
    pub kbdmap: String,
    pub language: String,
    pub sysloglevel: SyslogLevel,
    pub syslogserver: String,
    pub timezone: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            id: 0,
            guiaddress: Ipv4Addr::UNSPECIFIED,
            guiv6address: Ipv6Addr::UNSPECIFIED,
            guiport: 80,
            guihttpsport: 443,
            guiprotocol: GuiProtocol::Http,
            guihttpsredirect: false,
            guicertificate: None,
            kbdmap: String::new(),
            language: "en".to_owned(),
            sysloglevel: SyslogLevel::FInfo,
            syslogserver: String::new(),
            timezone: "America/Los_Angeles".to_owned(),
        }
    }
}

impl GeneralSettings {
    /// Shallow merge: fields present in the patch win, all others are kept.
    pub fn merged(&self, patch: &GeneralSettingsPatch) -> GeneralSettings {
        let mut next = self.clone();
        if let Some(v) = patch.guiaddress {
            next.guiaddress = v;
        }
        if let Some(v) = patch.guiv6address {
            next.guiv6address = v;
        }
        if let Some(v) = patch.guiport {
            next.guiport = v;
        }
        if let Some(v) = patch.guihttpsport {
            next.guihttpsport = v;
        }
        if let Some(v) = patch.guiprotocol {
            next.guiprotocol = v;
        }
        if let Some(v) = patch.guihttpsredirect {
            next.guihttpsredirect = v;
        }
        if let Some(v) = patch.guicertificate {
            next.guicertificate = v;
        }
        if let Some(v) = &patch.kbdmap {
            next.kbdmap = v.clone();
        }
        if let Some(v) = &patch.language {
            next.language = v.clone();
        }
        if let Some(v) = patch.sysloglevel {
            next.sysloglevel = v;
        }
        if let Some(v) = &patch.syslogserver {
            next.syslogserver = v.clone();
        }
        if let Some(v) = &patch.timezone {
            next.timezone = v.clone();
        }
        next
    }

    /// Datastore columns for this record, without the id.
    pub fn to_record(&self) -> serde_json::Result<Record> {
        let mut record = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => Record::new(),
        };
        record.remove("id");
        Ok(record)
    }

    /// Parse a record whose column prefix has already been stripped.
    pub fn from_record(record: Record) -> serde_json::Result<Self> {
        serde_json::from_value(Value::Object(record))
    }
}

/// Partial update of [`GeneralSettings`]. Only present fields are applied.
///
/// `guicertificate` distinguishes an absent key (`None`) from an explicit
/// `null` (`Some(None)`), which clears the certificate reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralSettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guiaddress: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guiv6address: Option<Ipv6Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guiport: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guihttpsport: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guiprotocol: Option<GuiProtocol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guihttpsredirect: Option<bool>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub guicertificate: Option<Option<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kbdmap: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sysloglevel: Option<SyslogLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syslogserver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl GeneralSettingsPatch {
    /// Names of the fields carried by this patch, in declaration order.
    pub fn present_fields(&self) -> Vec<&'static str> {
        let flags = [
            ("guiaddress", self.guiaddress.is_some()),
            ("guiv6address", self.guiv6address.is_some()),
            ("guiport", self.guiport.is_some()),
            ("guihttpsport", self.guihttpsport.is_some()),
            ("guiprotocol", self.guiprotocol.is_some()),
            ("guihttpsredirect", self.guihttpsredirect.is_some()),
            ("guicertificate", self.guicertificate.is_some()),
            ("kbdmap", self.kbdmap.is_some()),
            ("language", self.language.is_some()),
            ("sysloglevel", self.sysloglevel.is_some()),
            ("syslogserver", self.syslogserver.is_some()),
            ("timezone", self.timezone.is_some()),
        ];
        flags
            .into_iter()
            .filter_map(|(name, present)| present.then_some(name))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.present_fields().is_empty()
    }

    /// The certificate id requested by the patch. Explicit null and `0` count as absent.
    pub fn certificate_id(&self) -> Option<u64> {
        self.guicertificate.flatten().filter(|id| *id != 0)
    }
}
