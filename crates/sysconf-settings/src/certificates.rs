//! ---
//! scs_section: "04-configuration-orchestration"
//! scs_subsection: "module"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "Certificate record lookup and SHA-1 fingerprinting."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use sysconf_persistence::{Datastore, Filter, Record, Result as PersistenceResult};

/// Table owned by the certificate store.
pub const CERTIFICATE_TABLE: &str = "system.certificate";

/// The input was not a PEM encoded X.509 certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("input is not a PEM encoded X.509 certificate")]
pub struct NotACertificate;

/// Lowercase hex SHA-1 over the DER body of a PEM certificate.
pub fn fingerprint(pem: &[u8]) -> Result<String, NotACertificate> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(pem).map_err(|_| NotACertificate)?;
    if pem.label != "CERTIFICATE" {
        return Err(NotACertificate);
    }
    pem.parse_x509().map_err(|_| NotACertificate)?;
    Ok(hex::encode(Sha1::digest(&pem.contents)))
}

/// Row of [`CERTIFICATE_TABLE`] as far as settings validation cares.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateRecord {
    pub id: u64,
    pub cert_name: String,
    pub cert_certificate: String,
}

impl CertificateRecord {
    pub fn from_record(record: Record) -> serde_json::Result<Self> {
        serde_json::from_value(serde_json::Value::Object(record))
    }
}

/// All certificate rows whose id equals `id`.
pub fn lookup_certificate(store: &dyn Datastore, id: u64) -> PersistenceResult<Vec<Record>> {
    store.query(CERTIFICATE_TABLE, &[Filter::eq("id", id)])
}
