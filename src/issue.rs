//! Certificate issuance from signing requests.
//!
//! Two issuance paths share the same skeleton: the CSR's self-signature
//! is verified, the issuer is checked for signing capability, and the
//! subject name, public key, and subject-alternative-name extension are
//! carried over from the request byte-for-byte. The issued certificate
//! never outlives its issuer.
//!
//! [`create_intermediate`] produces a depth-zero subordinate CA.
//! [`HostBuilder`] produces an end-entity certificate for servers and
//! clients, with configurable extended key usage and room for arbitrary
//! extra extensions.

use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::x509::extension::{BasicConstraints, ExtendedKeyUsage, KeyUsage};
use openssl::x509::{X509Builder, X509Extension};
use time::OffsetDateTime;

use crate::authority::{check_validity_year, random_serial, NOT_BEFORE_SKEW};
use crate::cert::{Certificate, IssuerPolicy};
use crate::error::{PkiError, Result};
use crate::ext;
use crate::key::{public_key_id, Key};
use crate::request::CertificateSigningRequest;

const ANY_EXTENDED_KEY_USAGE_OID: &str = "2.5.29.37.0";

/// An extended key usage purpose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtendedUsage {
    ServerAuth,
    ClientAuth,
    /// The anyExtendedKeyUsage marker. Its presence downgrades the
    /// extension to non-critical.
    Any,
    /// Any other purpose, as a dotted-decimal OID.
    Other(String),
}

/// An arbitrary extension carried by OID with a pre-encoded DER value.
#[derive(Debug, Clone)]
pub struct ExtensionSpec {
    pub oid: String,
    pub critical: bool,
    pub der_value: Vec<u8>,
}

/// Encode an EKU list. The extension is critical unless the list
/// contains [`ExtendedUsage::Any`].
pub(crate) fn extended_key_usage_extension(usages: &[ExtendedUsage]) -> Result<X509Extension> {
    let mut eku = ExtendedKeyUsage::new();
    let mut has_any = false;
    for usage in usages {
        match usage {
            ExtendedUsage::ServerAuth => {
                eku.server_auth();
            }
            ExtendedUsage::ClientAuth => {
                eku.client_auth();
            }
            ExtendedUsage::Any => {
                eku.other(ANY_EXTENDED_KEY_USAGE_OID);
                has_any = true;
            }
            ExtendedUsage::Other(oid) => {
                eku.other(oid);
            }
        }
    }
    if !has_any {
        eku.critical();
    }
    Ok(eku.build()?)
}

/// Shared issuance skeleton: signature and capability checks, then a
/// builder primed with serial, names, capped validity, and the CSR's
/// public key.
fn start_issued(
    issuer: &Certificate,
    csr: &CertificateSigningRequest,
    not_after: OffsetDateTime,
    policy: IssuerPolicy,
) -> Result<X509Builder> {
    csr.check_signature()?;
    issuer.ensure_signing_capable(policy)?;
    check_validity_year(not_after)?;

    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    let serial = random_serial()?;
    builder.set_serial_number(Asn1Integer::from_bn(&serial)?.as_ref())?;

    builder.set_subject_name(csr.x509_req().subject_name())?;
    builder.set_issuer_name(issuer.x509().subject_name())?;

    let not_before = OffsetDateTime::now_utc() - NOT_BEFORE_SKEW;
    builder.set_not_before(Asn1Time::from_unix(not_before.unix_timestamp())?.as_ref())?;
    let expiry = Asn1Time::from_unix(not_after.unix_timestamp())?;
    if expiry.compare(issuer.not_after())?.is_gt() {
        builder.set_not_after(issuer.not_after())?;
    } else {
        builder.set_not_after(expiry.as_ref())?;
    }

    let public_key = csr.x509_req().public_key()?;
    builder.set_pubkey(&public_key)?;
    builder.append_extension(ext::subject_key_id_extension(&public_key_id(&public_key)?)?)?;
    if let Some(issuer_key_id) = issuer.subject_key_id()? {
        builder.append_extension(ext::authority_key_id_extension(&issuer_key_id)?)?;
    }
    if let Some((critical, san_der)) = csr.san_extension()? {
        builder.append_extension(ext::extension_from_der(
            ext::SUBJECT_ALT_NAME_OID,
            critical,
            &san_der,
        )?)?;
    }
    Ok(builder)
}

/// Sign `csr` as a subordinate certificate authority of `issuer`.
///
/// The subordinate cannot sign further CAs: its basic constraints pin
/// the chain depth to zero.
pub fn create_intermediate(
    issuer: &Certificate,
    issuer_key: &Key,
    csr: &CertificateSigningRequest,
    not_after: OffsetDateTime,
    policy: IssuerPolicy,
) -> Result<Certificate> {
    let mut builder = start_issued(issuer, csr, not_after, policy)?;
    builder.append_extension(
        BasicConstraints::new().critical().ca().pathlen(0).build()?,
    )?;
    builder.append_extension(
        KeyUsage::new().critical().key_cert_sign().crl_sign().build()?,
    )?;
    builder.sign(issuer_key.pkey(), issuer_key.signing_digest())?;
    Ok(Certificate::from_x509(builder.build()))
}

/// Builder for end-entity certificates issued from a CSR.
pub struct HostBuilder<'a> {
    issuer: &'a Certificate,
    issuer_key: &'a Key,
    csr: &'a CertificateSigningRequest,
    not_after: Option<OffsetDateTime>,
    extended_key_usage: Vec<ExtendedUsage>,
    extra_extensions: Vec<ExtensionSpec>,
    policy: IssuerPolicy,
}

impl<'a> HostBuilder<'a> {
    pub fn new(
        issuer: &'a Certificate,
        issuer_key: &'a Key,
        csr: &'a CertificateSigningRequest,
    ) -> Self {
        HostBuilder {
            issuer,
            issuer_key,
            csr,
            not_after: None,
            extended_key_usage: Vec::new(),
            extra_extensions: Vec::new(),
            policy: IssuerPolicy::default(),
        }
    }

    /// Expiration instant. Required; capped to the issuer's own.
    pub fn not_after(mut self, at: OffsetDateTime) -> Self {
        self.not_after = Some(at);
        self
    }

    /// Override the usage set. Left unset, the CSR's requested usages
    /// are granted verbatim, or serverAuth+clientAuth when the request
    /// carries none.
    pub fn extended_key_usage(mut self, usages: Vec<ExtendedUsage>) -> Self {
        self.extended_key_usage = usages;
        self
    }

    pub fn extra_extension(mut self, extension: ExtensionSpec) -> Self {
        self.extra_extensions.push(extension);
        self
    }

    pub fn policy(mut self, policy: IssuerPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> Result<Certificate> {
        let not_after = self.not_after.ok_or_else(|| {
            PkiError::Policy("an expiration time is required for a host certificate".into())
        })?;
        let mut builder = start_issued(self.issuer, self.csr, not_after, self.policy)?;

        builder.append_extension(
            KeyUsage::new()
                .critical()
                .digital_signature()
                .key_encipherment()
                .build()?,
        )?;
        if !self.extended_key_usage.is_empty() {
            builder.append_extension(extended_key_usage_extension(&self.extended_key_usage)?)?;
        } else if let Some((critical, eku_der)) = self.csr.eku_extension()? {
            // The request asked for specific purposes; grant them as-is.
            builder.append_extension(ext::extension_from_der(
                ext::EXTENDED_KEY_USAGE_OID,
                critical,
                &eku_der,
            )?)?;
        } else {
            // Default purposes stay non-critical so unaware validators
            // keep accepting the certificate.
            builder.append_extension(
                ExtendedKeyUsage::new().server_auth().client_auth().build()?,
            )?;
        }
        for spec in &self.extra_extensions {
            builder.append_extension(ext::extension_from_der(
                &spec.oid,
                spec.critical,
                &spec.der_value,
            )?)?;
        }

        builder.sign(self.issuer_key.pkey(), self.issuer_key.signing_digest())?;
        Ok(Certificate::from_x509(builder.build()))
    }
}
