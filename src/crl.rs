//! Certificate revocation lists.
//!
//! openssl exposes no safe CRL construction API, so the list body is
//! assembled as DER with the `x509-cert` types and the resulting
//! `tbsCertList` is signed with the CA key through an openssl signer.
//! The output is a standard v2 CRL that openssl itself verifies.
//!
//! Revocation is idempotent: revoking a serial that is already on the
//! list keeps the existing entry and its original revocation time.

use const_oid::db::rfc5912::{ECDSA_WITH_SHA_256, SHA_256_WITH_RSA_ENCRYPTION};
use const_oid::db::rfc8410::ID_ED_25519;
use const_oid::AssociatedOid;
use der::asn1::{BitString, GeneralizedTime, OctetString, UtcTime};
use der::{Any, Decode, Encode};
use openssl::hash::MessageDigest;
use openssl::sign::Signer;
use spki::AlgorithmIdentifierOwned;
use time::OffsetDateTime;
use x509_cert::crl::{CertificateList, RevokedCert, TbsCertList};
use x509_cert::ext::pkix::AuthorityKeyIdentifier;
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::Time;
use x509_cert::Version;

use crate::cert::Certificate;
use crate::error::{PkiError, Result};
use crate::key::{Key, KeyAlgorithm};

const CRL_PEM_LABEL: &str = "X509 CRL";

/// One revoked serial and the time it was revoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrlEntry {
    pub serial: Vec<u8>,
    pub revoked_at: OffsetDateTime,
}

/// A signed certificate revocation list, held as DER.
#[derive(Clone)]
pub struct CertificateRevocationList {
    der: Vec<u8>,
}

impl CertificateRevocationList {
    /// Build and sign an empty list for `ca_cert`, valid until
    /// `next_update`.
    pub fn create(
        ca_key: &Key,
        ca_cert: &Certificate,
        next_update: OffsetDateTime,
    ) -> Result<Self> {
        sign_list(ca_key, ca_cert, Vec::new(), next_update)
    }

    /// Return a list that additionally revokes `serial` as of now.
    ///
    /// A serial already on the list is left untouched.
    pub fn revoke(
        &self,
        ca_key: &Key,
        ca_cert: &Certificate,
        serial: &[u8],
    ) -> Result<Self> {
        let list = self.decode()?;
        let mut revoked = list.tbs_cert_list.revoked_certificates.unwrap_or_default();
        if revoked
            .iter()
            .any(|entry| trim_serial(entry.serial_number.as_bytes()) == trim_serial(serial))
        {
            return Ok(self.clone());
        }
        revoked.push(RevokedCert {
            serial_number: SerialNumber::new(serial)
                .map_err(|e| PkiError::Parse(format!("invalid serial number: {}", e)))?,
            revocation_date: asn1_time(OffsetDateTime::now_utc())?,
            crl_entry_extensions: None,
        });
        let next_update = match list.tbs_cert_list.next_update {
            Some(at) => OffsetDateTime::from_unix_timestamp(
                at.to_unix_duration().as_secs() as i64,
            )
            .map_err(|e| PkiError::Parse(format!("next update out of range: {}", e)))?,
            None => OffsetDateTime::now_utc(),
        };
        sign_list(ca_key, ca_cert, revoked, next_update)
    }

    pub fn from_pem(data: &[u8]) -> Result<Self> {
        let block = pem::parse(data)
            .map_err(|e| PkiError::Parse(format!("Failed to parse PEM block: {}", e)))?;
        if block.tag() != CRL_PEM_LABEL {
            return Err(PkiError::Parse(format!(
                "unexpected PEM label {:?} for a revocation list",
                block.tag()
            )));
        }
        let crl = CertificateRevocationList {
            der: block.contents().to_vec(),
        };
        crl.decode()?;
        Ok(crl)
    }

    pub fn from_der(data: &[u8]) -> Result<Self> {
        let crl = CertificateRevocationList { der: data.to_vec() };
        crl.decode()?;
        Ok(crl)
    }

    pub fn export(&self) -> Result<Vec<u8>> {
        Ok(pem::encode(&pem::Pem::new(CRL_PEM_LABEL, self.der.clone())).into_bytes())
    }

    pub fn to_der(&self) -> Vec<u8> {
        self.der.clone()
    }

    /// The revoked serials and their revocation times, in list order.
    pub fn entries(&self) -> Result<Vec<CrlEntry>> {
        let list = self.decode()?;
        let mut entries = Vec::new();
        for revoked in list.tbs_cert_list.revoked_certificates.unwrap_or_default() {
            let at = OffsetDateTime::from_unix_timestamp(
                revoked.revocation_date.to_unix_duration().as_secs() as i64,
            )
            .map_err(|e| PkiError::Parse(format!("revocation time out of range: {}", e)))?;
            entries.push(CrlEntry {
                serial: trim_serial(revoked.serial_number.as_bytes()).to_vec(),
                revoked_at: at,
            });
        }
        Ok(entries)
    }

    /// Whether this list names `issuer`'s subject as its issuer.
    pub fn issuer_bound_to(&self, issuer: &Certificate) -> Result<bool> {
        let list = self.decode()?;
        Ok(list.tbs_cert_list.issuer.to_der()? == issuer.raw_subject_der()?)
    }

    fn decode(&self) -> Result<CertificateList> {
        CertificateList::from_der(&self.der)
            .map_err(|e| PkiError::Parse(format!("Failed to parse revocation list: {}", e)))
    }
}

/// Serials compare without sign-padding zeros.
fn trim_serial(bytes: &[u8]) -> &[u8] {
    let mut bytes = bytes;
    while bytes.len() > 1 && bytes[0] == 0 {
        bytes = &bytes[1..];
    }
    bytes
}

/// UTCTime covers dates before 2050, GeneralizedTime the rest.
fn asn1_time(at: OffsetDateTime) -> Result<Time> {
    let timestamp = at.unix_timestamp();
    if timestamp < 0 {
        return Err(PkiError::Policy(format!(
            "time {} predates the epoch",
            at
        )));
    }
    let duration = std::time::Duration::from_secs(timestamp as u64);
    let time = if at.year() < 2050 {
        Time::UtcTime(
            UtcTime::from_unix_duration(duration)
                .map_err(|e| PkiError::Parse(format!("time out of UTCTime range: {}", e)))?,
        )
    } else {
        Time::GeneralTime(
            GeneralizedTime::from_unix_duration(duration)
                .map_err(|e| PkiError::Parse(format!("time out of range: {}", e)))?,
        )
    };
    Ok(time)
}

fn signature_algorithm(ca_key: &Key) -> Result<AlgorithmIdentifierOwned> {
    let algorithm = match ca_key.algorithm() {
        KeyAlgorithm::Rsa(_) => AlgorithmIdentifierOwned {
            oid: SHA_256_WITH_RSA_ENCRYPTION,
            parameters: Some(Any::from_der(&[0x05, 0x00])?),
        },
        KeyAlgorithm::Ecdsa(_) => AlgorithmIdentifierOwned {
            oid: ECDSA_WITH_SHA_256,
            parameters: None,
        },
        KeyAlgorithm::Ed25519 => AlgorithmIdentifierOwned {
            oid: ID_ED_25519,
            parameters: None,
        },
    };
    Ok(algorithm)
}

fn issuer_name(ca_cert: &Certificate) -> Result<Name> {
    let cert = x509_cert::Certificate::from_der(&ca_cert.to_der()?)
        .map_err(|e| PkiError::Parse(format!("Failed to parse issuer certificate: {}", e)))?;
    Ok(cert.tbs_certificate.subject)
}

fn sign_list(
    ca_key: &Key,
    ca_cert: &Certificate,
    revoked: Vec<RevokedCert>,
    next_update: OffsetDateTime,
) -> Result<CertificateRevocationList> {
    let algorithm = signature_algorithm(ca_key)?;
    let mut crl_extensions = None;
    if let Some(key_id) = ca_cert.subject_key_id()? {
        let akid = AuthorityKeyIdentifier {
            key_identifier: Some(
                OctetString::new(key_id)
                    .map_err(|e| PkiError::Parse(format!("invalid key identifier: {}", e)))?,
            ),
            authority_cert_issuer: None,
            authority_cert_serial_number: None,
        };
        crl_extensions = Some(vec![Extension {
            extn_id: AuthorityKeyIdentifier::OID,
            critical: false,
            extn_value: OctetString::new(akid.to_der()?)?,
        }]);
    }

    let tbs = TbsCertList {
        version: Version::V2,
        signature: algorithm.clone(),
        issuer: issuer_name(ca_cert)?,
        this_update: asn1_time(OffsetDateTime::now_utc())?,
        next_update: Some(asn1_time(next_update)?),
        revoked_certificates: if revoked.is_empty() {
            None
        } else {
            Some(revoked)
        },
        crl_extensions,
    };

    let tbs_der = tbs.to_der()?;
    let signature = match ca_key.algorithm() {
        KeyAlgorithm::Ed25519 => {
            let mut signer = Signer::new_without_digest(ca_key.pkey())?;
            signer.sign_oneshot_to_vec(&tbs_der)?
        }
        _ => {
            let mut signer = Signer::new(MessageDigest::sha256(), ca_key.pkey())?;
            signer.sign_oneshot_to_vec(&tbs_der)?
        }
    };

    let list = CertificateList {
        tbs_cert_list: tbs,
        signature_algorithm: algorithm,
        signature: BitString::from_bytes(&signature)
            .map_err(|e| PkiError::Crypto(format!("Failed to encode signature: {}", e)))?,
    };
    Ok(CertificateRevocationList {
        der: list.to_der()?,
    })
}
