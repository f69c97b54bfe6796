//! Distinguished-name assembly shared by CA and CSR building.

use openssl::nid::Nid;
use openssl::x509::{X509Name, X509NameBuilder};

use crate::error::{PkiError, Result};

/// The subject fields of a certificate or signing request.
///
/// Empty fields are skipped entirely rather than emitted as empty RDNs.
#[derive(Debug, Clone, Default)]
pub struct Subject {
    pub organizational_unit: String,
    pub organization: String,
    pub country: String,
    pub province: String,
    pub locality: String,
    pub common_name: String,
}

impl Subject {
    /// A subject with just a common name, the minimum most deployments use.
    pub fn with_common_name(common_name: &str) -> Self {
        Subject {
            common_name: common_name.to_string(),
            ..Default::default()
        }
    }

    pub(crate) fn to_x509_name(&self) -> Result<X509Name> {
        let mut builder = X509NameBuilder::new()
            .map_err(|e| PkiError::Crypto(format!("Failed to create name builder: {}", e)))?;
        let fields = [
            (Nid::COUNTRYNAME, &self.country),
            (Nid::STATEORPROVINCENAME, &self.province),
            (Nid::LOCALITYNAME, &self.locality),
            (Nid::ORGANIZATIONNAME, &self.organization),
            (Nid::ORGANIZATIONALUNITNAME, &self.organizational_unit),
            (Nid::COMMONNAME, &self.common_name),
        ];
        for (nid, value) in fields {
            if !value.is_empty() {
                builder
                    .append_entry_by_nid(nid, value)
                    .map_err(|e| PkiError::Crypto(format!("Failed to set subject field: {}", e)))?;
            }
        }
        Ok(builder.build())
    }
}
