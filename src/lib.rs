//! certforge - Certificate Authority Toolkit Library
//!
//! A library for bootstrapping and operating a small certificate authority:
//! keypair generation, self-signed and chained CA certificates, PKCS#10
//! signing requests, host certificate issuance, certificate revocation
//! lists, and PKCS#12 bundles, backed by a permission-enforcing on-disk
//! artifact store.
//!
//! # Overview
//!
//! certforge implements the classic two- or three-tier hierarchy:
//!
//! ```text
//! Root CA (self-signed, serial 1)
//!   └── Intermediate CA (signed from a CSR, pathlen=0)
//!       └── Host Certificate (signed from a CSR, CA=false)
//! ```
//!
//! Every artifact round-trips through PEM, and everything an operator
//! touches lands in a depot directory where private keys are written
//! owner-read-only and re-checked on every read.
//!
//! # Features
//!
//! - 🔐 **Three key families**: RSA, ECDSA (P-224 through P-521), Ed25519
//! - 🔗 **Chained authorities**: root, subordinate CA, and host issuance
//! - 📜 **Revocation**: v2 CRLs with idempotent revoke-and-resign
//! - 📦 **PKCS#12 export**: single-file bundles for importing consumers
//! - 🔒 **Fail-closed storage**: artifacts with loosened modes are refused
//!
//! # Quick Start
//!
//! ```no_run
//! use certforge::{
//!     AuthorityBuilder, Depot, HostBuilder, Key, KeyAlgorithm, RequestBuilder, Subject,
//! };
//! use time::{Duration, OffsetDateTime};
//!
//! fn main() -> certforge::Result<()> {
//!     let depot = Depot::new("out");
//!
//!     // Trust anchor.
//!     let ca_key = Key::generate(KeyAlgorithm::Ed25519)?;
//!     let ca = AuthorityBuilder::new(Subject::with_common_name("ACME Root CA"))
//!         .not_after(OffsetDateTime::now_utc() + Duration::days(548))
//!         .build(&ca_key)?;
//!     depot.put_certificate("ACME_Root_CA", &ca)?;
//!     depot.put_encrypted_private_key("ACME_Root_CA", &ca_key, b"hunter2")?;
//!
//!     // A host asks for a certificate.
//!     let host_key = Key::generate(KeyAlgorithm::Ed25519)?;
//!     let csr = RequestBuilder::new(Subject::with_common_name("host1.acme.test"))
//!         .dns_domains(vec!["host1.acme.test".into()])
//!         .build(&host_key)?;
//!
//!     // The authority signs it.
//!     let cert = HostBuilder::new(&ca, &ca_key, &csr)
//!         .not_after(OffsetDateTime::now_utc() + Duration::days(365))
//!         .build()?;
//!     depot.put_certificate("host1.acme.test", &cert)?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! ## [`key`]
//!
//! Keypair generation, strict-label PEM import, plaintext and
//! passphrase-encrypted export, and subject key identifiers.
//!
//! ## [`authority`]
//!
//! Root and subordinate CA creation with path length and DNS name
//! constraints.
//!
//! ## [`request`] and [`issue`]
//!
//! PKCS#10 requests with validated alternative names, and the two
//! issuance paths that consume them: depth-zero intermediate CAs and
//! end-entity host certificates.
//!
//! ## [`crl`]
//!
//! Certificate revocation lists, built as DER and signed with the CA
//! key. Revocation appends an entry and re-signs the whole list.
//!
//! ## [`pfx`]
//!
//! PKCS#12 bundle export of a leaf, its key, and its chain.
//!
//! ## [`depot`]
//!
//! The on-disk artifact store. Create-exclusive writes, per-class
//! permission modes, and fail-closed reads.
//!
//! # Security Considerations
//!
//! - Private keys exist in memory only for the duration of an operation;
//!   persistence happens solely through the explicit export calls.
//! - Key artifacts are stored mode `0400`; a depot whose permissions
//!   have been loosened by outside tooling stops serving those
//!   artifacts instead of leaking them.
//! - Issued certificates never outlive their issuer, and issuance
//!   refuses issuers that lack CA basic constraints (a legacy v1
//!   self-signed carve-out is available behind [`IssuerPolicy`]).

pub mod authority;
pub mod cert;
pub mod crl;
pub mod depot;
pub mod error;
mod ext;
pub mod issue;
pub mod key;
pub mod pfx;
pub mod request;
pub mod subject;

pub use authority::{AuthorityBuilder, AuthorityOptions};
pub use cert::{Certificate, IssuerPolicy};
pub use crl::{CertificateRevocationList, CrlEntry};
pub use depot::{Depot, Tag};
pub use error::{PkiError, Result};
pub use issue::{create_intermediate, ExtendedUsage, ExtensionSpec, HostBuilder};
pub use key::{EcdsaCurve, Key, KeyAlgorithm};
pub use pfx::export_pfx;
pub use request::{CertificateSigningRequest, RequestBuilder};
pub use subject::Subject;
