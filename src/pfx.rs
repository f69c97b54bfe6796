//! PKCS#12 bundle export.
//!
//! Packs a leaf certificate, its private key, and an optional issuer
//! chain into a passphrase-protected PKCS#12 archive for consumers
//! that want a single importable artifact. An empty passphrase is
//! allowed for tooling that cannot prompt.

use openssl::pkcs12::Pkcs12;
use openssl::stack::Stack;

use crate::cert::Certificate;
use crate::error::Result;
use crate::key::Key;

/// Serialize `cert`, `key`, and the issuer `chain` as PKCS#12 DER.
pub fn export_pfx(
    cert: &Certificate,
    key: &Key,
    chain: &[Certificate],
    friendly_name: &str,
    passphrase: &str,
) -> Result<Vec<u8>> {
    let mut builder = Pkcs12::builder();
    builder.name(friendly_name);
    builder.pkey(key.pkey());
    builder.cert(cert.x509());
    if !chain.is_empty() {
        let mut stack = Stack::new()?;
        for issuer in chain {
            stack.push(issuer.x509().to_owned())?;
        }
        builder.ca(stack);
    }
    let bundle = builder.build2(passphrase)?;
    Ok(bundle.to_der()?)
}
