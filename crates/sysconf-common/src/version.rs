//! ---
//! scs_section: "01-core-functionality"
//! scs_subsection: "module"
//! scs_type: "source"
//! scs_scope: "code"
//! scs_description: "Shared primitives and utilities for the core runtime."
//! scs_version: "v0.0.0-prealpha"
//! scs_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

/// Product name prefixed to the software version string.
pub const PRODUCT_NAME: &str = "Sysconf";

/// Build metadata reported by the `version` operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionInfo {
    pub product: String,
    pub semver: String,
}

impl VersionInfo {
    pub fn current() -> Self {
        Self {
            product: PRODUCT_NAME.to_owned(),
            semver: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }

    /// Software version string, e.g. `Sysconf-0.1.0`.
    pub fn sw_version(&self) -> String {
        format!("{}-{}", self.product, self.semver)
    }
}
