//! Key material generation, import, and export.
//!
//! Supports three key families behind one closed algorithm enum:
//!
//! - **RSA** with a caller-chosen modulus size
//! - **ECDSA** on the NIST curves P-224, P-256, P-384, and P-521
//! - **Ed25519**
//!
//! # Serialization rules
//!
//! - Plaintext export: RSA keys are written as PKCS#1 (`RSA PRIVATE KEY`),
//!   ECDSA and Ed25519 keys as PKCS#8 (`PRIVATE KEY`).
//! - Encrypted export: RSA keys keep the legacy 3DES-CBC PEM-header format
//!   for compatibility with older tooling; ECDSA and Ed25519 keys use
//!   AES-256 encrypted PKCS#8.
//! - Import accepts exactly the block types listed above; any other PEM
//!   label is rejected rather than guessed at.
//!
//! Private material lives in memory only for the duration of an operation
//! and is persisted solely through the explicit export calls.
//!
//! # Example
//!
//! ```no_run
//! use certforge::key::{Key, KeyAlgorithm, EcdsaCurve};
//!
//! # fn example() -> certforge::error::Result<()> {
//! let key = Key::generate(KeyAlgorithm::Ecdsa(EcdsaCurve::P256))?;
//! let pem = key.export_private()?;
//! let restored = Key::from_private_pem(&pem)?;
//! assert_eq!(key.subject_key_id()?, restored.subject_key_id()?);
//! # Ok(())
//! # }
//! ```

use der::asn1::UintRef;
use der::{Encode, Sequence};
use openssl::bn::BigNumContext;
use openssl::ec::{EcGroup, EcKey, PointConversionForm};
use openssl::hash::{hash, MessageDigest};
use openssl::nid::Nid;
use openssl::pkey::{HasPublic, Id, PKey, PKeyRef, Private};
use openssl::rsa::Rsa;
use openssl::symm::Cipher;

use crate::error::{PkiError, Result};

const RSA_PRIVATE_KEY_BLOCK: &str = "RSA PRIVATE KEY";
const PKCS8_PRIVATE_KEY_BLOCK: &str = "PRIVATE KEY";
const ENCRYPTED_PKCS8_PRIVATE_KEY_BLOCK: &str = "ENCRYPTED PRIVATE KEY";

/// Supported ECDSA curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcdsaCurve {
    P224,
    P256,
    P384,
    P521,
}

impl EcdsaCurve {
    fn nid(self) -> Nid {
        match self {
            EcdsaCurve::P224 => Nid::SECP224R1,
            EcdsaCurve::P256 => Nid::X9_62_PRIME256V1,
            EcdsaCurve::P384 => Nid::SECP384R1,
            EcdsaCurve::P521 => Nid::SECP521R1,
        }
    }
}

/// The closed set of key algorithms this crate produces and understands.
///
/// Every serialization and signing site matches exhaustively on this enum,
/// so adding an algorithm is a compile-time-checked change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    /// RSA with the given modulus size in bits.
    Rsa(u32),
    Ecdsa(EcdsaCurve),
    Ed25519,
}

/// A public/private keypair tagged with its algorithm.
pub struct Key {
    pkey: PKey<Private>,
    algorithm: KeyAlgorithm,
}

/// Shows the algorithm only. Private material never reaches debug output.
impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Key")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// The ASN.1 structure of a PKCS#1 RSA public key, digested for the
/// RSA subject key identifier.
#[derive(Sequence)]
struct RsaPublicKeyDer<'a> {
    modulus: UintRef<'a>,
    public_exponent: UintRef<'a>,
}

impl Key {
    /// Generate a fresh keypair for the given algorithm.
    pub fn generate(algorithm: KeyAlgorithm) -> Result<Self> {
        let pkey = match algorithm {
            KeyAlgorithm::Rsa(bits) => {
                let rsa = Rsa::generate(bits)
                    .map_err(|e| PkiError::Crypto(format!("Failed to generate RSA keypair: {}", e)))?;
                PKey::from_rsa(rsa)?
            }
            KeyAlgorithm::Ecdsa(curve) => {
                let group = EcGroup::from_curve_name(curve.nid())?;
                let ec = EcKey::generate(&group).map_err(|e| {
                    PkiError::Crypto(format!("Failed to generate ECDSA keypair: {}", e))
                })?;
                PKey::from_ec_key(ec)?
            }
            KeyAlgorithm::Ed25519 => PKey::generate_ed25519()
                .map_err(|e| PkiError::Crypto(format!("Failed to generate Ed25519 keypair: {}", e)))?,
        };
        Ok(Key { pkey, algorithm })
    }

    /// Wrap an already-constructed private key, deriving its algorithm tag.
    pub fn from_pkey(pkey: PKey<Private>) -> Result<Self> {
        let algorithm = algorithm_of(&pkey)?;
        Ok(Key { pkey, algorithm })
    }

    /// Import a plaintext PEM private key.
    ///
    /// Accepts exactly the `RSA PRIVATE KEY` (PKCS#1) and `PRIVATE KEY`
    /// (PKCS#8) block types; anything else fails with a parse error.
    pub fn from_private_pem(data: &[u8]) -> Result<Self> {
        let block = pem::parse(data)
            .map_err(|e| PkiError::Parse(format!("Failed to decode PEM block: {}", e)))?;
        match block.tag() {
            RSA_PRIVATE_KEY_BLOCK | PKCS8_PRIVATE_KEY_BLOCK => {}
            other => {
                return Err(PkiError::Parse(format!("unknown PEM block type {:?}", other)));
            }
        }
        let pkey = PKey::private_key_from_pem(data)
            .map_err(|e| PkiError::Parse(format!("Failed to parse private key: {}", e)))?;
        Self::from_pkey(pkey)
    }

    /// Import a passphrase-encrypted PEM private key.
    ///
    /// Accepts legacy PEM-header encrypted `RSA PRIVATE KEY` blocks and
    /// PKCS#8 `ENCRYPTED PRIVATE KEY` blocks. A wrong passphrase fails with
    /// a crypto error and never partially succeeds.
    pub fn from_encrypted_private_pem(data: &[u8], passphrase: &[u8]) -> Result<Self> {
        let block = pem::parse(data)
            .map_err(|e| PkiError::Parse(format!("Failed to decode PEM block: {}", e)))?;
        match block.tag() {
            RSA_PRIVATE_KEY_BLOCK | ENCRYPTED_PKCS8_PRIVATE_KEY_BLOCK => {}
            other => {
                return Err(PkiError::Parse(format!(
                    "unsupported PEM block type {:?}",
                    other
                )));
            }
        }
        let pkey = PKey::private_key_from_pem_passphrase(data, passphrase)
            .map_err(|e| PkiError::Crypto(format!("Failed to decrypt private key: {}", e)))?;
        Self::from_pkey(pkey)
    }

    /// Export the private key as plaintext PEM.
    ///
    /// RSA keys are exported as PKCS#1, ECDSA and Ed25519 keys as PKCS#8.
    pub fn export_private(&self) -> Result<Vec<u8>> {
        match self.algorithm {
            KeyAlgorithm::Rsa(_) => {
                let rsa = self.pkey.rsa()?;
                Ok(rsa.private_key_to_pem()?)
            }
            KeyAlgorithm::Ecdsa(_) | KeyAlgorithm::Ed25519 => {
                Ok(self.pkey.private_key_to_pem_pkcs8()?)
            }
        }
    }

    /// Export the private key as passphrase-encrypted PEM.
    ///
    /// RSA keys keep the legacy 3DES-CBC PEM-header format; ECDSA and
    /// Ed25519 keys are written as AES-256 encrypted PKCS#8.
    pub fn export_encrypted_private(&self, passphrase: &[u8]) -> Result<Vec<u8>> {
        match self.algorithm {
            KeyAlgorithm::Rsa(_) => {
                let rsa = self.pkey.rsa()?;
                rsa.private_key_to_pem_passphrase(Cipher::des_ede3_cbc(), passphrase)
                    .map_err(|e| PkiError::Crypto(format!("Failed to encrypt private key: {}", e)))
            }
            KeyAlgorithm::Ecdsa(_) | KeyAlgorithm::Ed25519 => self
                .pkey
                .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), passphrase)
                .map_err(|e| PkiError::Crypto(format!("Failed to encrypt private key: {}", e))),
        }
    }

    /// Compute the RFC5280 subject key identifier for this key's public half:
    /// a 160-bit SHA-1 digest of the algorithm-specific public key encoding.
    ///
    /// - RSA: DER `SEQUENCE { modulus, publicExponent }` (PKCS#1)
    /// - ECDSA: the uncompressed curve point
    /// - Ed25519: the raw 32-byte public key
    pub fn subject_key_id(&self) -> Result<Vec<u8>> {
        public_key_id(&self.pkey)
    }

    /// The algorithm this key was generated or imported with.
    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    /// The underlying openssl key.
    pub fn pkey(&self) -> &PKeyRef<Private> {
        &self.pkey
    }

    /// The message digest used when signing with this key: SHA-256 for RSA
    /// and ECDSA, none for Ed25519 (a pure signature scheme).
    pub(crate) fn signing_digest(&self) -> MessageDigest {
        match self.algorithm {
            KeyAlgorithm::Ed25519 => MessageDigest::null(),
            _ => MessageDigest::sha256(),
        }
    }
}

/// The subject key identifier digest for any public key, by family.
pub(crate) fn public_key_id<T: HasPublic>(pkey: &PKeyRef<T>) -> Result<Vec<u8>> {
    let pub_bytes = match pkey.id() {
        Id::RSA => {
            let rsa = pkey.rsa()?;
            let n = rsa.n().to_vec();
            let e = rsa.e().to_vec();
            RsaPublicKeyDer {
                modulus: UintRef::new(&n)?,
                public_exponent: UintRef::new(&e)?,
            }
            .to_der()?
        }
        Id::EC => {
            let ec = pkey.ec_key()?;
            let mut ctx = BigNumContext::new()?;
            ec.public_key()
                .to_bytes(ec.group(), PointConversionForm::UNCOMPRESSED, &mut ctx)?
        }
        Id::ED25519 => pkey.raw_public_key()?,
        other => {
            return Err(PkiError::Crypto(format!(
                "unsupported key type: {:?}",
                other
            )));
        }
    };
    let digest = hash(MessageDigest::sha1(), &pub_bytes)?;
    Ok(digest.to_vec())
}

fn algorithm_of(pkey: &PKey<Private>) -> Result<KeyAlgorithm> {
    match pkey.id() {
        Id::RSA => Ok(KeyAlgorithm::Rsa(pkey.bits())),
        Id::EC => {
            let ec = pkey.ec_key()?;
            let curve = match ec.group().curve_name() {
                Some(Nid::SECP224R1) => EcdsaCurve::P224,
                Some(Nid::X9_62_PRIME256V1) => EcdsaCurve::P256,
                Some(Nid::SECP384R1) => EcdsaCurve::P384,
                Some(Nid::SECP521R1) => EcdsaCurve::P521,
                other => {
                    return Err(PkiError::Crypto(format!(
                        "unsupported ECDSA curve: {:?}",
                        other
                    )));
                }
            };
            Ok(KeyAlgorithm::Ecdsa(curve))
        }
        Id::ED25519 => Ok(KeyAlgorithm::Ed25519),
        other => Err(PkiError::Crypto(format!(
            "unsupported key type: {:?}",
            other
        ))),
    }
}
