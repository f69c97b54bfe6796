//! Helpers for X.509v3 extensions that rust-openssl has no typed builder
//! for. The extension body is assembled as DER with the RustCrypto ASN.1
//! types and handed to openssl by OID.

use der::asn1::{Ia5String, OctetString};
use der::Encode;
use openssl::asn1::{Asn1Object, Asn1OctetString};
use openssl::x509::X509Extension;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{AuthorityKeyIdentifier, NameConstraints};
use x509_cert::ext::pkix::constraints::name::GeneralSubtree;

use crate::error::{PkiError, Result};

pub(crate) const SUBJECT_KEY_ID_OID: &str = "2.5.29.14";
pub(crate) const SUBJECT_ALT_NAME_OID: &str = "2.5.29.17";
pub(crate) const NAME_CONSTRAINTS_OID: &str = "2.5.29.30";
pub(crate) const EXTENDED_KEY_USAGE_OID: &str = "2.5.29.37";
pub(crate) const AUTHORITY_KEY_ID_OID: &str = "2.5.29.35";

/// Wrap pre-encoded extension content into an openssl extension object.
pub(crate) fn extension_from_der(
    oid: &str,
    critical: bool,
    value_der: &[u8],
) -> Result<X509Extension> {
    let obj = Asn1Object::from_str(oid)
        .map_err(|e| PkiError::Parse(format!("Failed to parse extension OID {}: {}", oid, e)))?;
    let contents = Asn1OctetString::new_from_bytes(value_der)?;
    Ok(X509Extension::new_from_der(&obj, critical, &contents)?)
}

/// Subject key identifier: an OCTET STRING holding the key digest.
pub(crate) fn subject_key_id_extension(key_id: &[u8]) -> Result<X509Extension> {
    let der = OctetString::new(key_id)?.to_der()?;
    extension_from_der(SUBJECT_KEY_ID_OID, false, &der)
}

/// Authority key identifier referencing the issuer's subject key id.
pub(crate) fn authority_key_id_extension(issuer_key_id: &[u8]) -> Result<X509Extension> {
    let akid = AuthorityKeyIdentifier {
        key_identifier: Some(OctetString::new(issuer_key_id)?),
        authority_cert_issuer: None,
        authority_cert_serial_number: None,
    };
    extension_from_der(AUTHORITY_KEY_ID_OID, false, &akid.to_der()?)
}

/// Critical name-constraints extension permitting the given DNS domains.
pub(crate) fn name_constraints_extension(domains: &[String]) -> Result<X509Extension> {
    let mut subtrees = Vec::with_capacity(domains.len());
    for domain in domains {
        let name = Ia5String::new(domain)
            .map_err(|e| PkiError::Parse(format!("invalid constraint domain {:?}: {}", domain, e)))?;
        subtrees.push(GeneralSubtree {
            base: GeneralName::DnsName(name),
            minimum: 0,
            maximum: None,
        });
    }
    let constraints = NameConstraints {
        permitted_subtrees: Some(subtrees),
        excluded_subtrees: None,
    };
    extension_from_der(NAME_CONSTRAINTS_OID, true, &constraints.to_der()?)
}
