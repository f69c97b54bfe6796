//! The certificate type: parsing, export, and issuer-capability checks.
//!
//! A [`Certificate`] wraps a parsed X.509 structure together with the PEM
//! bytes it was loaded from, so exporting a certificate that came out of the
//! depot reproduces the stored bytes exactly. Certificates built fresh by the
//! template engine export canonical PEM.

use const_oid::AssociatedOid;
use der::{Decode, Encode};
use openssl::asn1::Asn1TimeRef;
use openssl::x509::X509;
use x509_cert::ext::pkix::{BasicConstraints, SubjectKeyIdentifier};

use crate::error::{PkiError, Result};

/// How strictly an issuer certificate is vetted before it is allowed to sign.
///
/// The normal requirement is a CA basic-constraints extension. Very old
/// (X.509 v1) self-signed certificates predate basic constraints entirely;
/// some deployments still use them as roots, so accepting them is available
/// as an explicit, named carve-out rather than an implicit fallback.
#[derive(Debug, Clone, Copy)]
pub struct IssuerPolicy {
    /// Accept a certificate with no basic-constraints extension as
    /// signing-capable, provided it is self-signed.
    pub allow_v1_self_signed: bool,
}

impl Default for IssuerPolicy {
    fn default() -> Self {
        IssuerPolicy {
            allow_v1_self_signed: true,
        }
    }
}

impl IssuerPolicy {
    /// Require a genuine CA basic-constraints extension, no carve-outs.
    pub fn strict() -> Self {
        IssuerPolicy {
            allow_v1_self_signed: false,
        }
    }
}

/// A parsed X.509 certificate, round-trippable to its original PEM bytes.
#[derive(Debug, Clone)]
pub struct Certificate {
    x509: X509,
    pem: Option<Vec<u8>>,
}

impl Certificate {
    /// Parse a PEM-encoded certificate, retaining the original bytes.
    pub fn from_pem(data: &[u8]) -> Result<Self> {
        let x509 = X509::from_pem(data)
            .map_err(|e| PkiError::Parse(format!("Failed to parse certificate: {}", e)))?;
        Ok(Certificate {
            x509,
            pem: Some(data.to_vec()),
        })
    }

    /// Parse a DER-encoded certificate.
    pub fn from_der(data: &[u8]) -> Result<Self> {
        let x509 = X509::from_der(data)
            .map_err(|e| PkiError::Parse(format!("Failed to parse certificate: {}", e)))?;
        Ok(Certificate { x509, pem: None })
    }

    pub(crate) fn from_x509(x509: X509) -> Self {
        Certificate { x509, pem: None }
    }

    /// Export as PEM. A certificate loaded from PEM reproduces the original
    /// bytes; a freshly built one is serialized canonically.
    pub fn export(&self) -> Result<Vec<u8>> {
        match &self.pem {
            Some(pem) => Ok(pem.clone()),
            None => Ok(self.x509.to_pem()?),
        }
    }

    /// Export as DER.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.x509.to_der()?)
    }

    /// The underlying openssl certificate.
    pub fn x509(&self) -> &X509 {
        &self.x509
    }

    /// The certificate serial number as big-endian bytes.
    pub fn serial_bytes(&self) -> Result<Vec<u8>> {
        let bn = self.x509.serial_number().to_bn()?;
        Ok(bn.to_vec())
    }

    /// The notAfter bound of the validity window.
    pub fn not_after(&self) -> &Asn1TimeRef {
        self.x509.not_after()
    }

    /// The DER encoding of the subject name, byte-for-byte as issued.
    pub fn raw_subject_der(&self) -> Result<Vec<u8>> {
        let parsed = self.decode()?;
        Ok(parsed.tbs_certificate.subject.to_der()?)
    }

    /// Whether the certificate carries a CA basic-constraints extension.
    pub fn is_ca(&self) -> Result<bool> {
        Ok(self.basic_constraints()?.map(|bc| bc.ca).unwrap_or(false))
    }

    /// Whether subject and issuer are byte-identical.
    pub fn is_self_signed(&self) -> Result<bool> {
        let parsed = self.decode()?;
        Ok(parsed.tbs_certificate.subject == parsed.tbs_certificate.issuer)
    }

    /// The subject-key-identifier extension value, if present.
    pub fn subject_key_id(&self) -> Result<Option<Vec<u8>>> {
        let parsed = self.decode()?;
        let Some(extensions) = &parsed.tbs_certificate.extensions else {
            return Ok(None);
        };
        for ext in extensions {
            if ext.extn_id == SubjectKeyIdentifier::OID {
                let skid = SubjectKeyIdentifier::from_der(ext.extn_value.as_bytes())?;
                return Ok(Some(skid.0.as_bytes().to_vec()));
            }
        }
        Ok(None)
    }

    /// Verify that this certificate may act as an issuer under the given
    /// policy: it carries CA basic constraints, or (when the carve-out is
    /// enabled) it predates basic constraints and is self-signed.
    pub fn ensure_signing_capable(&self, policy: IssuerPolicy) -> Result<()> {
        match self.basic_constraints()? {
            Some(bc) if bc.ca => Ok(()),
            Some(_) => Err(PkiError::Policy(
                "issuer certificate is not allowed to sign certificates".to_string(),
            )),
            None => {
                if policy.allow_v1_self_signed && self.is_self_signed()? {
                    Ok(())
                } else {
                    Err(PkiError::Policy(
                        "issuer certificate is not allowed to sign certificates".to_string(),
                    ))
                }
            }
        }
    }

    fn basic_constraints(&self) -> Result<Option<BasicConstraints>> {
        let parsed = self.decode()?;
        let Some(extensions) = &parsed.tbs_certificate.extensions else {
            return Ok(None);
        };
        for ext in extensions {
            if ext.extn_id == BasicConstraints::OID {
                return Ok(Some(BasicConstraints::from_der(ext.extn_value.as_bytes())?));
            }
        }
        Ok(None)
    }

    fn decode(&self) -> Result<x509_cert::Certificate> {
        let der = self.x509.to_der()?;
        x509_cert::Certificate::from_der(&der)
            .map_err(|e| PkiError::Parse(format!("Failed to decode certificate: {}", e)))
    }
}
