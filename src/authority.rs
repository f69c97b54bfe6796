//! Certificate authority creation.
//!
//! Builds self-signed root CAs and parent-signed subordinate CAs. Every
//! authority certificate carries critical basic constraints with the CA
//! flag set, critical key usage limited to certificate and CRL signing,
//! and a subject key identifier derived from the public key. Optional
//! name constraints restrict the DNS namespace the authority may sign
//! for.
//!
//! # Example
//!
//! ```no_run
//! use certforge::{AuthorityBuilder, Key, KeyAlgorithm, Subject};
//! use time::{Duration, OffsetDateTime};
//!
//! # fn main() -> certforge::Result<()> {
//! let key = Key::generate(KeyAlgorithm::Ed25519)?;
//! let ca = AuthorityBuilder::new(Subject::with_common_name("Acme Root CA"))
//!     .not_after(OffsetDateTime::now_utc() + Duration::days(548))
//!     .build(&key)?;
//! # Ok(())
//! # }
//! ```

use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::x509::extension::{BasicConstraints, KeyUsage};
use openssl::x509::X509Builder;
use time::{Duration, OffsetDateTime};

use crate::cert::Certificate;
use crate::error::{PkiError, Result};
use crate::ext;
use crate::key::Key;
use crate::subject::Subject;

/// Validity starts slightly in the past to absorb clock skew between the
/// issuing machine and verifiers.
pub(crate) const NOT_BEFORE_SKEW: Duration = Duration::minutes(10);

/// Structural options for a new certificate authority.
#[derive(Debug, Clone, Default)]
pub struct AuthorityOptions {
    /// Maximum number of subordinate CAs allowed below this one. When
    /// neither this nor `exclude_path_length` is set, the chain depth is
    /// pinned to zero.
    pub path_length: Option<u32>,
    /// Omit the path length constraint entirely, allowing unbounded
    /// chain depth.
    pub exclude_path_length: bool,
    /// DNS domains this authority is permitted to sign for. Empty means
    /// unconstrained.
    pub permitted_domains: Vec<String>,
}

impl AuthorityOptions {
    fn validate(&self) -> Result<()> {
        if self.path_length.is_some() && self.exclude_path_length {
            return Err(PkiError::Policy(
                "a path length cannot be set when the path length constraint is excluded".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for root and subordinate certificate authorities.
pub struct AuthorityBuilder<'a> {
    subject: Subject,
    not_after: Option<OffsetDateTime>,
    options: AuthorityOptions,
    parent: Option<(&'a Certificate, &'a Key)>,
}

impl<'a> AuthorityBuilder<'a> {
    pub fn new(subject: Subject) -> Self {
        AuthorityBuilder {
            subject,
            not_after: None,
            options: AuthorityOptions::default(),
            parent: None,
        }
    }

    /// Expiration instant of the authority certificate. Required.
    pub fn not_after(mut self, at: OffsetDateTime) -> Self {
        self.not_after = Some(at);
        self
    }

    pub fn options(mut self, options: AuthorityOptions) -> Self {
        self.options = options;
        self
    }

    /// Sign the new authority with an existing one instead of
    /// self-signing. The parent must itself be a CA certificate.
    pub fn parent(mut self, certificate: &'a Certificate, key: &'a Key) -> Self {
        self.parent = Some((certificate, key));
        self
    }

    /// Create the authority certificate for `key`.
    pub fn build(self, key: &Key) -> Result<Certificate> {
        self.options.validate()?;
        let not_after = self.not_after.ok_or_else(|| {
            PkiError::Policy("an expiration time is required for a certificate authority".into())
        })?;
        check_validity_year(not_after)?;

        if let Some((parent_cert, _)) = self.parent {
            if !parent_cert.is_ca()? {
                return Err(PkiError::Policy(
                    "the signing certificate is not a certificate authority".into(),
                ));
            }
        }

        let mut builder = X509Builder::new()?;
        builder.set_version(2)?;

        let serial = match self.parent {
            // Self-signed roots are conventionally serial 1.
            None => BigNum::from_u32(1)?,
            Some(_) => random_serial()?,
        };
        builder.set_serial_number(Asn1Integer::from_bn(&serial)?.as_ref())?;

        let subject_name = self.subject.to_x509_name()?;
        builder.set_subject_name(&subject_name)?;
        match self.parent {
            Some((parent_cert, _)) => builder.set_issuer_name(parent_cert.x509().subject_name())?,
            None => builder.set_issuer_name(&subject_name)?,
        }

        let not_before = OffsetDateTime::now_utc() - NOT_BEFORE_SKEW;
        builder.set_not_before(Asn1Time::from_unix(not_before.unix_timestamp())?.as_ref())?;
        let expiry = Asn1Time::from_unix(not_after.unix_timestamp())?;
        match self.parent {
            // Never outlive the issuer.
            Some((parent_cert, _)) if expiry.compare(parent_cert.not_after())?.is_gt() => {
                builder.set_not_after(parent_cert.not_after())?;
            }
            _ => builder.set_not_after(expiry.as_ref())?,
        }

        builder.set_pubkey(key.pkey())?;

        let mut basic = BasicConstraints::new();
        basic.critical().ca();
        match (self.options.exclude_path_length, self.options.path_length) {
            (true, _) => {}
            (false, Some(depth)) => {
                basic.pathlen(depth);
            }
            (false, None) => {
                basic.pathlen(0);
            }
        }
        builder.append_extension(basic.build()?)?;
        builder.append_extension(
            KeyUsage::new().critical().key_cert_sign().crl_sign().build()?,
        )?;
        builder.append_extension(ext::subject_key_id_extension(&key.subject_key_id()?)?)?;
        if let Some((parent_cert, _)) = self.parent {
            if let Some(issuer_key_id) = parent_cert.subject_key_id()? {
                builder.append_extension(ext::authority_key_id_extension(&issuer_key_id)?)?;
            }
        }
        if !self.options.permitted_domains.is_empty() {
            builder.append_extension(ext::name_constraints_extension(
                &self.options.permitted_domains,
            )?)?;
        }

        let signing_key = match self.parent {
            Some((_, parent_key)) => parent_key,
            None => key,
        };
        builder.sign(signing_key.pkey(), signing_key.signing_digest())?;

        Ok(Certificate::from_x509(builder.build()))
    }
}

/// Serial numbers under a parent are 128 random bits, matching the common
/// CA practice of unpredictable serials.
pub(crate) fn random_serial() -> Result<BigNum> {
    let mut serial = BigNum::new()?;
    serial.rand(128, MsbOption::MAYBE_ZERO, false)?;
    Ok(serial)
}

/// ASN.1 time encodings cannot represent years outside 0..=9999.
pub(crate) fn check_validity_year(at: OffsetDateTime) -> Result<()> {
    if at.year() < 0 || at.year() > 9999 {
        return Err(PkiError::Policy(format!(
            "expiration year {} is outside the representable range",
            at.year()
        )));
    }
    Ok(())
}
