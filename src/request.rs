//! PKCS#10 certificate signing requests.
//!
//! A requester builds a CSR carrying its subject, its public key, and a
//! subject-alternative-name set (DNS names, IP addresses, URIs) tucked
//! into the PKCS#9 extension-request attribute. The CSR is self-signed
//! with the requester's key; an authority later verifies that signature
//! and copies the requested SAN verbatim into the issued certificate.
//!
//! Alternative names are validated up front: IP addresses must parse,
//! URIs must be absolute. The first offending token is named in the
//! error so callers can surface it directly.

use std::net::IpAddr;

use const_oid::{AssociatedOid, ObjectIdentifier};
use der::{Decode, Encode};
use openssl::stack::Stack;
use openssl::x509::extension::SubjectAlternativeName;
use openssl::x509::{X509Extension, X509Req, X509ReqBuilder};
use url::Url;
use x509_cert::ext::pkix::{ExtendedKeyUsage as ExtendedKeyUsageExt, SubjectAltName};
use x509_cert::request::{CertReq, ExtensionReq};

use crate::error::{PkiError, Result};
use crate::ext;
use crate::issue::{extended_key_usage_extension, ExtendedUsage, ExtensionSpec};
use crate::key::Key;
use crate::subject::Subject;

const CSR_PEM_LABEL: &str = "CERTIFICATE REQUEST";
const CSR_PEM_LABEL_LEGACY: &str = "NEW CERTIFICATE REQUEST";

/// Builder for a new certificate signing request.
pub struct RequestBuilder {
    subject: Subject,
    dns_domains: Vec<String>,
    ip_addresses: Vec<String>,
    uris: Vec<String>,
    extended_key_usage: Vec<ExtendedUsage>,
    extra_extensions: Vec<ExtensionSpec>,
}

impl RequestBuilder {
    pub fn new(subject: Subject) -> Self {
        RequestBuilder {
            subject,
            dns_domains: Vec::new(),
            ip_addresses: Vec::new(),
            uris: Vec::new(),
            extended_key_usage: Vec::new(),
            extra_extensions: Vec::new(),
        }
    }

    pub fn dns_domains(mut self, domains: Vec<String>) -> Self {
        self.dns_domains = domains;
        self
    }

    pub fn ip_addresses(mut self, addresses: Vec<String>) -> Self {
        self.ip_addresses = addresses;
        self
    }

    pub fn uris(mut self, uris: Vec<String>) -> Self {
        self.uris = uris;
        self
    }

    /// Extended key usage purposes to request. Left empty, the request
    /// carries no EKU and the signer applies its defaults.
    pub fn extended_key_usage(mut self, usages: Vec<ExtendedUsage>) -> Self {
        self.extended_key_usage = usages;
        self
    }

    /// Attach an arbitrary pre-encoded extension to the request.
    pub fn extra_extension(mut self, extension: ExtensionSpec) -> Self {
        self.extra_extensions.push(extension);
        self
    }

    fn validate(&self) -> Result<()> {
        for address in &self.ip_addresses {
            if address.parse::<IpAddr>().is_err() {
                return Err(PkiError::Parse(format!(
                    "{:?} is not a valid IP address",
                    address
                )));
            }
        }
        for uri in &self.uris {
            if Url::parse(uri).is_err() {
                return Err(PkiError::Parse(format!("{:?} is not a valid URI", uri)));
            }
        }
        Ok(())
    }

    /// Build and self-sign the request with `key`.
    pub fn build(self, key: &Key) -> Result<CertificateSigningRequest> {
        self.validate()?;

        let mut builder = X509ReqBuilder::new()?;
        builder.set_version(0)?;
        let subject_name = self.subject.to_x509_name()?;
        builder.set_subject_name(&subject_name)?;
        builder.set_pubkey(key.pkey())?;

        let mut extensions: Stack<X509Extension> = Stack::new()?;
        if !self.dns_domains.is_empty() || !self.ip_addresses.is_empty() || !self.uris.is_empty() {
            let mut san = SubjectAlternativeName::new();
            for domain in &self.dns_domains {
                san.dns(domain);
            }
            for address in &self.ip_addresses {
                san.ip(address);
            }
            for uri in &self.uris {
                san.uri(uri);
            }
            extensions.push(san.build(&builder.x509v3_context(None))?)?;
        }
        if !self.extended_key_usage.is_empty() {
            extensions.push(extended_key_usage_extension(&self.extended_key_usage)?)?;
        }
        for spec in &self.extra_extensions {
            extensions.push(ext::extension_from_der(
                &spec.oid,
                spec.critical,
                &spec.der_value,
            )?)?;
        }
        if extensions.len() > 0 {
            builder.add_extensions(&extensions)?;
        }

        builder.sign(key.pkey(), key.signing_digest())?;
        Ok(CertificateSigningRequest {
            req: builder.build(),
        })
    }
}

/// A parsed certificate signing request.
pub struct CertificateSigningRequest {
    req: X509Req,
}

impl std::fmt::Debug for CertificateSigningRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateSigningRequest")
            .finish_non_exhaustive()
    }
}

impl CertificateSigningRequest {
    /// Parse a PEM-encoded request. Both the standard label and the
    /// legacy `NEW CERTIFICATE REQUEST` label are accepted.
    pub fn from_pem(data: &[u8]) -> Result<Self> {
        let block = pem::parse(data)
            .map_err(|e| PkiError::Parse(format!("Failed to parse PEM block: {}", e)))?;
        match block.tag() {
            CSR_PEM_LABEL | CSR_PEM_LABEL_LEGACY => {}
            other => {
                return Err(PkiError::Parse(format!(
                    "unexpected PEM label {:?} for a certificate signing request",
                    other
                )))
            }
        }
        let req = X509Req::from_der(block.contents())
            .map_err(|e| PkiError::Parse(format!("Failed to parse request body: {}", e)))?;
        Ok(CertificateSigningRequest { req })
    }

    /// PEM encoding, always under the standard label.
    pub fn export(&self) -> Result<Vec<u8>> {
        Ok(self.req.to_pem()?)
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.req.to_der()?)
    }

    pub fn x509_req(&self) -> &X509Req {
        &self.req
    }

    /// Verify the embedded self-signature against the embedded public
    /// key. This proves possession of the private key, nothing more.
    pub fn check_signature(&self) -> Result<()> {
        let public_key = self.req.public_key()?;
        if !self.req.verify(&public_key)? {
            return Err(PkiError::Crypto(
                "the request signature does not match its public key".into(),
            ));
        }
        Ok(())
    }

    /// Raw subject-alternative-name extension from the extension-request
    /// attribute, as `(critical, DER value)`. `None` when the request
    /// carries no SAN.
    pub fn san_extension(&self) -> Result<Option<(bool, Vec<u8>)>> {
        self.requested_extension(SubjectAltName::OID)
    }

    /// Raw extended-key-usage extension from the extension-request
    /// attribute, for signers that honor the requested purposes.
    pub fn eku_extension(&self) -> Result<Option<(bool, Vec<u8>)>> {
        self.requested_extension(ExtendedKeyUsageExt::OID)
    }

    fn requested_extension(&self, oid: ObjectIdentifier) -> Result<Option<(bool, Vec<u8>)>> {
        let raw = CertReq::from_der(&self.to_der()?)?;
        for attribute in raw.info.attributes.iter() {
            if attribute.oid != ExtensionReq::OID {
                continue;
            }
            for value in attribute.values.iter() {
                let requested = ExtensionReq::from_der(&value.to_der()?)?;
                for extension in &requested.0 {
                    if extension.extn_id == oid {
                        return Ok(Some((
                            extension.critical,
                            extension.extn_value.as_bytes().to_vec(),
                        )));
                    }
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyAlgorithm;
    use x509_cert::ext::pkix::name::GeneralName;

    fn key() -> Key {
        Key::generate(KeyAlgorithm::Ecdsa(crate::key::EcdsaCurve::P256)).unwrap()
    }

    #[test]
    fn builds_with_alternative_names() {
        let csr = RequestBuilder::new(Subject::with_common_name("host1.example.com"))
            .dns_domains(vec!["host1.example.com".into(), "alt.example.com".into()])
            .ip_addresses(vec!["10.0.0.4".into(), "2001:db8::1".into()])
            .uris(vec!["spiffe://cluster/ns/default".into()])
            .build(&key())
            .unwrap();
        csr.check_signature().unwrap();

        let (_, san_der) = csr.san_extension().unwrap().expect("SAN present");
        let san = SubjectAltName::from_der(&san_der).unwrap();
        let dns: Vec<String> = san
            .0
            .iter()
            .filter_map(|name| match name {
                GeneralName::DnsName(n) => Some(n.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(dns, vec!["host1.example.com", "alt.example.com"]);
    }

    #[test]
    fn invalid_ip_is_named() {
        let err = RequestBuilder::new(Subject::with_common_name("x"))
            .ip_addresses(vec!["10.0.0.4".into(), "not-an-ip".into()])
            .build(&key())
            .unwrap_err();
        match err {
            PkiError::Parse(msg) => assert!(msg.contains("not-an-ip")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn relative_uri_is_rejected() {
        let err = RequestBuilder::new(Subject::with_common_name("x"))
            .uris(vec!["/just/a/path".into()])
            .build(&key())
            .unwrap_err();
        assert!(matches!(err, PkiError::Parse(_)));
    }

    #[test]
    fn legacy_label_imports_and_normalizes() {
        let csr = RequestBuilder::new(Subject::with_common_name("legacy"))
            .build(&key())
            .unwrap();
        let block = pem::parse(&csr.export().unwrap()).unwrap();
        let legacy = pem::encode(&pem::Pem::new(
            "NEW CERTIFICATE REQUEST",
            block.contents().to_vec(),
        ));

        let reparsed = CertificateSigningRequest::from_pem(legacy.as_bytes()).unwrap();
        reparsed.check_signature().unwrap();
        let exported = String::from_utf8(reparsed.export().unwrap()).unwrap();
        assert!(exported.starts_with("-----BEGIN CERTIFICATE REQUEST-----"));
    }

    #[test]
    fn foreign_label_is_rejected() {
        let err = CertificateSigningRequest::from_pem(
            pem::encode(&pem::Pem::new("CERTIFICATE", vec![0u8; 8])).as_bytes(),
        )
        .unwrap_err();
        assert!(matches!(err, PkiError::Parse(_)));
    }

    #[test]
    fn requested_usage_is_recoverable() {
        let csr = RequestBuilder::new(Subject::with_common_name("agent"))
            .extended_key_usage(vec![ExtendedUsage::ClientAuth])
            .build(&key())
            .unwrap();
        let (critical, _) = csr.eku_extension().unwrap().expect("EKU present");
        assert!(critical);
        assert!(csr.san_extension().unwrap().is_none());
    }

    #[test]
    fn request_without_names_has_no_san() {
        let csr = RequestBuilder::new(Subject::with_common_name("plain"))
            .build(&key())
            .unwrap();
        assert!(csr.san_extension().unwrap().is_none());
    }
}
