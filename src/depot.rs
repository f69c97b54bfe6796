//! File-backed artifact storage.
//!
//! A depot is a flat directory of PKI artifacts, each stored under a
//! conventional suffix and a permission class. Private material (keys,
//! PKCS#12 bundles) is written owner-read-only; public artifacts
//! (certificates, requests, revocation lists) are world-readable.
//!
//! Reads re-check the permission bits on disk: an artifact whose mode
//! grants anything beyond its class is refused rather than returned,
//! so a depot loosened by outside tooling fails closed.
//!
//! Writes are create-exclusive. An existing artifact is never silently
//! overwritten; the one sanctioned replacement is
//! [`Depot::replace_certificate_revocation_list`], which deletes the
//! old list first.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;

use crate::cert::Certificate;
use crate::crl::CertificateRevocationList;
use crate::error::{PkiError, Result};
use crate::key::Key;
use crate::request::CertificateSigningRequest;

/// Owner-read-only, for artifacts containing private material.
#[cfg(unix)]
pub const BRANCH_PERM: u32 = 0o400;
/// World-readable, for public artifacts.
#[cfg(unix)]
pub const LEAF_PERM: u32 = 0o444;

#[cfg(not(unix))]
pub const BRANCH_PERM: u32 = 0o666;
#[cfg(not(unix))]
pub const LEAF_PERM: u32 = 0o666;

const CRT_SUFFIX: &str = ".crt";
const KEY_SUFFIX: &str = ".key";
const CSR_SUFFIX: &str = ".csr";
const CRL_SUFFIX: &str = ".crl";
const PFX_SUFFIX: &str = ".pfx";

/// An artifact name plus the permission class it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub perm: u32,
}

impl Tag {
    pub fn certificate(name: &str) -> Tag {
        Tag {
            name: format!("{}{}", name, CRT_SUFFIX),
            perm: LEAF_PERM,
        }
    }

    pub fn private_key(name: &str) -> Tag {
        Tag {
            name: format!("{}{}", name, KEY_SUFFIX),
            perm: BRANCH_PERM,
        }
    }

    pub fn certificate_signing_request(name: &str) -> Tag {
        Tag {
            name: format!("{}{}", name, CSR_SUFFIX),
            perm: LEAF_PERM,
        }
    }

    pub fn certificate_revocation_list(name: &str) -> Tag {
        Tag {
            name: format!("{}{}", name, CRL_SUFFIX),
            perm: LEAF_PERM,
        }
    }

    pub fn personal_information_exchange(name: &str) -> Tag {
        Tag {
            name: format!("{}{}", name, PFX_SUFFIX),
            perm: BRANCH_PERM,
        }
    }

    /// The artifact name with its conventional suffix stripped, when it
    /// carries one.
    pub fn base_name(&self) -> Option<&str> {
        for suffix in [CRT_SUFFIX, KEY_SUFFIX, CSR_SUFFIX, CRL_SUFFIX, PFX_SUFFIX] {
            if let Some(base) = self.name.strip_suffix(suffix) {
                return Some(base);
            }
        }
        None
    }
}

/// A handle on one depot directory.
pub struct Depot {
    root: PathBuf,
}

impl Depot {
    /// Address a depot at `root`. The directory is created lazily on
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Depot {
        Depot { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    fn artifact_path(&self, tag: &Tag) -> PathBuf {
        self.root.join(&tag.name)
    }

    /// Store `data` under `tag`, create-exclusive, with the tag's mode.
    pub fn put(&self, tag: &Tag, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(PkiError::Storage(format!(
                "refusing to store empty artifact {:?}",
                tag.name
            )));
        }
        create_root(&self.root)?;
        let path = self.artifact_path(tag);
        let mut file = open_exclusive(&path, tag.perm)?;
        if let Err(e) = file.write_all(data) {
            // Never leave a truncated artifact behind.
            let _ = fs::remove_file(&path);
            return Err(PkiError::Storage(format!(
                "Failed to write {}: {}",
                path.display(),
                e
            )));
        }
        debug!("stored {} ({} bytes)", path.display(), data.len());
        Ok(())
    }

    /// Verify that `tag` exists with permissions no wider than its
    /// class allows.
    pub fn check(&self, tag: &Tag) -> Result<()> {
        let path = self.artifact_path(tag);
        let metadata = fs::metadata(&path).map_err(|e| {
            PkiError::Storage(format!("Failed to stat {}: {}", path.display(), e))
        })?;
        check_mode(&path, &metadata, tag.perm)
    }

    /// Read the artifact stored under `tag` after a permission check.
    pub fn get(&self, tag: &Tag) -> Result<Vec<u8>> {
        self.check(tag)?;
        let path = self.artifact_path(tag);
        fs::read(&path)
            .map_err(|e| PkiError::Storage(format!("Failed to read {}: {}", path.display(), e)))
    }

    /// Remove the artifact stored under `tag`. Fails when absent.
    pub fn delete(&self, tag: &Tag) -> Result<()> {
        let path = self.artifact_path(tag);
        fs::remove_file(&path)
            .map_err(|e| PkiError::Storage(format!("Failed to delete {}: {}", path.display(), e)))?;
        debug!("deleted {}", path.display());
        Ok(())
    }

    /// The depot's direct children, sorted by name, with their modes.
    pub fn list(&self) -> Result<Vec<Tag>> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            PkiError::Storage(format!("Failed to list {}: {}", self.root.display(), e))
        })?;
        let mut tags = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                PkiError::Storage(format!("Failed to list {}: {}", self.root.display(), e))
            })?;
            let metadata = entry.metadata().map_err(|e| {
                PkiError::Storage(format!("Failed to stat {:?}: {}", entry.path(), e))
            })?;
            if !metadata.is_file() {
                continue;
            }
            tags.push(Tag {
                name: entry.file_name().to_string_lossy().into_owned(),
                perm: file_mode(&metadata),
            });
        }
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    pub fn put_certificate(&self, name: &str, cert: &Certificate) -> Result<()> {
        self.put(&Tag::certificate(name), &cert.export()?)
    }

    pub fn get_certificate(&self, name: &str) -> Result<Certificate> {
        Certificate::from_pem(&self.get(&Tag::certificate(name))?)
    }

    pub fn check_certificate(&self, name: &str) -> bool {
        self.check(&Tag::certificate(name)).is_ok()
    }

    pub fn delete_certificate(&self, name: &str) -> Result<()> {
        self.delete(&Tag::certificate(name))
    }

    pub fn put_private_key(&self, name: &str, key: &Key) -> Result<()> {
        self.put(&Tag::private_key(name), &key.export_private()?)
    }

    pub fn get_private_key(&self, name: &str) -> Result<Key> {
        Key::from_private_pem(&self.get(&Tag::private_key(name))?)
    }

    pub fn put_encrypted_private_key(
        &self,
        name: &str,
        key: &Key,
        passphrase: &[u8],
    ) -> Result<()> {
        self.put(
            &Tag::private_key(name),
            &key.export_encrypted_private(passphrase)?,
        )
    }

    pub fn get_encrypted_private_key(&self, name: &str, passphrase: &[u8]) -> Result<Key> {
        Key::from_encrypted_private_pem(&self.get(&Tag::private_key(name))?, passphrase)
    }

    pub fn check_private_key(&self, name: &str) -> bool {
        self.check(&Tag::private_key(name)).is_ok()
    }

    pub fn put_certificate_signing_request(
        &self,
        name: &str,
        csr: &CertificateSigningRequest,
    ) -> Result<()> {
        self.put(&Tag::certificate_signing_request(name), &csr.export()?)
    }

    pub fn get_certificate_signing_request(
        &self,
        name: &str,
    ) -> Result<CertificateSigningRequest> {
        CertificateSigningRequest::from_pem(&self.get(&Tag::certificate_signing_request(name))?)
    }

    pub fn put_certificate_revocation_list(
        &self,
        name: &str,
        crl: &CertificateRevocationList,
    ) -> Result<()> {
        self.put(&Tag::certificate_revocation_list(name), &crl.export()?)
    }

    pub fn get_certificate_revocation_list(
        &self,
        name: &str,
    ) -> Result<CertificateRevocationList> {
        CertificateRevocationList::from_pem(&self.get(&Tag::certificate_revocation_list(name))?)
    }

    /// Swap in a new revocation list, deleting any existing one first.
    pub fn replace_certificate_revocation_list(
        &self,
        name: &str,
        crl: &CertificateRevocationList,
    ) -> Result<()> {
        let tag = Tag::certificate_revocation_list(name);
        if self.artifact_path(&tag).exists() {
            self.delete(&tag)?;
        }
        self.put(&tag, &crl.export()?)
    }

    pub fn put_personal_information_exchange(&self, name: &str, pfx_der: &[u8]) -> Result<()> {
        self.put(&Tag::personal_information_exchange(name), pfx_der)
    }

    pub fn get_personal_information_exchange(&self, name: &str) -> Result<Vec<u8>> {
        self.get(&Tag::personal_information_exchange(name))
    }
}

#[cfg(unix)]
fn create_root(root: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(root)
        .map_err(|e| PkiError::Storage(format!("Failed to create {}: {}", root.display(), e)))
}

#[cfg(not(unix))]
fn create_root(root: &Path) -> Result<()> {
    fs::create_dir_all(root)
        .map_err(|e| PkiError::Storage(format!("Failed to create {}: {}", root.display(), e)))
}

#[cfg(unix)]
fn open_exclusive(path: &Path, perm: u32) -> Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(perm)
        .open(path)
        .map_err(|e| PkiError::Storage(format!("Failed to create {}: {}", path.display(), e)))
}

#[cfg(not(unix))]
fn open_exclusive(path: &Path, _perm: u32) -> Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| PkiError::Storage(format!("Failed to create {}: {}", path.display(), e)))
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn file_mode(_metadata: &fs::Metadata) -> u32 {
    LEAF_PERM
}

#[cfg(unix)]
fn check_mode(path: &Path, metadata: &fs::Metadata, allowed: u32) -> Result<()> {
    let actual = file_mode(metadata);
    if actual & !allowed != 0 {
        return Err(PkiError::Storage(format!(
            "permissions on {} are too lax: have {:o}, want at most {:o}",
            path.display(),
            actual,
            allowed
        )));
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_mode(_path: &Path, _metadata: &fs::Metadata, _allowed: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyAlgorithm;
    use tempfile::tempdir;

    fn depot() -> (tempfile::TempDir, Depot) {
        let dir = tempdir().unwrap();
        let depot = Depot::new(dir.path().join("depot"));
        (dir, depot)
    }

    #[test]
    fn put_get_roundtrip() {
        let (_dir, depot) = depot();
        let tag = Tag::certificate("ca");
        depot.put(&tag, b"hello").unwrap();
        assert_eq!(depot.get(&tag).unwrap(), b"hello");
    }

    #[test]
    fn empty_payload_is_rejected() {
        let (_dir, depot) = depot();
        let err = depot.put(&Tag::certificate("ca"), b"").unwrap_err();
        assert!(matches!(err, PkiError::Storage(_)));
    }

    #[test]
    fn existing_artifact_is_never_overwritten() {
        let (_dir, depot) = depot();
        let tag = Tag::certificate("ca");
        depot.put(&tag, b"first").unwrap();
        let err = depot.put(&tag, b"second").unwrap_err();
        assert!(matches!(err, PkiError::Storage(_)));
        assert_eq!(depot.get(&tag).unwrap(), b"first");
    }

    #[cfg(unix)]
    #[test]
    fn key_artifacts_are_owner_read_only() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, depot) = depot();
        let key = Key::generate(KeyAlgorithm::Ed25519).unwrap();
        depot.put_private_key("ca", &key).unwrap();

        let path = depot.path().join("ca.key");
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, BRANCH_PERM);
    }

    #[cfg(unix)]
    #[test]
    fn loosened_permissions_fail_closed() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, depot) = depot();
        let key = Key::generate(KeyAlgorithm::Ed25519).unwrap();
        depot.put_private_key("ca", &key).unwrap();

        let path = depot.path().join("ca.key");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        let err = depot.get_private_key("ca").unwrap_err();
        match err {
            PkiError::Storage(msg) => assert!(msg.contains("too lax")),
            other => panic!("unexpected error: {}", other),
        }
        assert!(!depot.check_private_key("ca"));
    }

    #[test]
    fn delete_of_absent_artifact_fails() {
        let (_dir, depot) = depot();
        depot.put(&Tag::certificate("present"), b"x").unwrap();
        assert!(depot.delete(&Tag::certificate("absent")).is_err());
        depot.delete(&Tag::certificate("present")).unwrap();
        assert!(depot.get(&Tag::certificate("present")).is_err());
    }

    #[test]
    fn list_is_sorted_and_files_only() {
        let (_dir, depot) = depot();
        depot.put(&Tag::certificate("beta"), b"b").unwrap();
        depot.put(&Tag::certificate("alpha"), b"a").unwrap();
        fs::create_dir(depot.path().join("subdir")).unwrap();

        let names: Vec<String> = depot.list().unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["alpha.crt", "beta.crt"]);
    }

    #[test]
    fn tag_base_names() {
        assert_eq!(Tag::certificate("ca").base_name(), Some("ca"));
        assert_eq!(Tag::private_key("ca").base_name(), Some("ca"));
        assert_eq!(
            Tag {
                name: "notes.txt".into(),
                perm: LEAF_PERM
            }
            .base_name(),
            None
        );
    }

    #[test]
    fn encrypted_key_roundtrip_through_depot() {
        let (_dir, depot) = depot();
        let key = Key::generate(KeyAlgorithm::Ecdsa(crate::key::EcdsaCurve::P256)).unwrap();
        depot
            .put_encrypted_private_key("ca", &key, b"hunter2")
            .unwrap();
        let restored = depot.get_encrypted_private_key("ca", b"hunter2").unwrap();
        assert_eq!(
            key.subject_key_id().unwrap(),
            restored.subject_key_id().unwrap()
        );
        assert!(depot
            .get_encrypted_private_key("ca", b"wrong")
            .is_err());
    }
}
