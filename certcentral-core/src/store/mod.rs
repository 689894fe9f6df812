//! Certificate store: atomic on-disk layout.
//!
//! ```text
//! <base>/live/<name>/privkey.pem
//! <base>/live/<name>/cert.pem
//! <base>/live/<name>/chain.pem
//! <base>/live/<name>/fullchain.pem
//! <base>/live/<name>/meta.json
//! <base>/new/<name>/...
//! <base>/archive/<name>/<serial>/
//! ```
//!
//! No single file in ferron implements this layout — it
//! keeps certificates behind an in-memory `CertifiedKey` lock plus an
//! opaque cache blob — so this module is new code grounded on the general
//! rename-based atomic-publish discipline for durable local state, and on
//! the PEM/x509 validation pattern in
//! `ShabbirHasan1-sentinel/crates/config/src/validate/certs.rs`.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::error::StoreIoError;

/// The four material files plus metadata that make up one published
/// certificate generation.
#[derive(Debug, Clone)]
pub struct CertMaterial {
    pub private_key_pem: String,
    pub cert_pem: String,
    pub chain_pem: String,
    pub meta: CertMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertMeta {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub serial: String,
    pub fingerprint: String,
    pub san: Vec<String>,
    #[serde(default)]
    pub self_signed: bool,
}

pub struct CertStore {
    base_path: PathBuf,
    archive_keep: usize,
}

impl CertStore {
    pub fn new(base_path: impl Into<PathBuf>, archive_keep: usize) -> Self {
        Self {
            base_path: base_path.into(),
            archive_keep,
        }
    }

    fn live_dir(&self, name: &str) -> PathBuf {
        self.base_path.join("live").join(name)
    }

    fn new_dir(&self, name: &str) -> PathBuf {
        self.base_path.join("new").join(name)
    }

    fn archive_dir(&self, name: &str, serial: &str) -> PathBuf {
        self.base_path.join("archive").join(name).join(serial)
    }

    /// Writes `material` into `new/<name>/`, fsyncs every file and the
    /// directory, then performs the two-rename atomic publish: the
    /// existing `live/<name>` (if any) moves to
    /// `archive/<name>/<old-serial>/`, and `new/<name>` moves to
    /// `live/<name>`. On a POSIX filesystem these two renames are not one
    /// atomic operation; [`read`] implements the meta-first validation
    /// protocol that lets readers tolerate landing between them.
    pub async fn publish(&self, name: &str, material: &CertMaterial) -> Result<(), StoreIoError> {
        let new_dir = self.new_dir(name);
        self.stage(&new_dir, material).await?;

        let live_dir = self.live_dir(name);
        if tokio::fs::try_exists(&live_dir).await.unwrap_or(false) {
            let old_meta = self.read_meta(&live_dir).await.ok();
            let old_serial = old_meta.map(|m| m.serial).unwrap_or_else(|| "unknown".to_string());
            let archive_dir = self.archive_dir(name, &old_serial);
            if let Some(parent) = archive_dir.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|source| StoreIoError::Write {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
            tokio::fs::rename(&live_dir, &archive_dir).await.map_err(|source| StoreIoError::Rename {
                from: live_dir.display().to_string(),
                to: archive_dir.display().to_string(),
                source,
            })?;
        }

        tokio::fs::rename(&new_dir, &live_dir).await.map_err(|source| StoreIoError::Rename {
            from: new_dir.display().to_string(),
            to: live_dir.display().to_string(),
            source,
        })?;

        self.enforce_retention(name).await?;
        Ok(())
    }

    async fn stage(&self, new_dir: &Path, material: &CertMaterial) -> Result<(), StoreIoError> {
        if tokio::fs::try_exists(new_dir).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(new_dir).await.ok();
        }
        tokio::fs::create_dir_all(new_dir).await.map_err(|source| StoreIoError::Write {
            path: new_dir.display().to_string(),
            source,
        })?;

        let fullchain_pem = format!("{}{}", material.cert_pem, material.chain_pem);
        let files: [(&str, &str); 5] = [
            ("privkey.pem", material.private_key_pem.as_str()),
            ("cert.pem", material.cert_pem.as_str()),
            ("chain.pem", material.chain_pem.as_str()),
            ("fullchain.pem", fullchain_pem.as_str()),
            ("meta.json", &serde_json::to_string_pretty(&material.meta).expect("CertMeta always serializes")),
        ];

        for (filename, contents) in files {
            let path = new_dir.join(filename);
            write_with_mode(&path, contents.as_bytes(), if filename == "privkey.pem" { 0o600 } else { 0o640 }).await?;
        }

        fsync_dir(new_dir).await?;
        Ok(())
    }

    async fn enforce_retention(&self, name: &str) -> Result<(), StoreIoError> {
        let archive_root = self.base_path.join("archive").join(name);
        let Ok(mut entries) = tokio::fs::read_dir(&archive_root).await else {
            return Ok(());
        };
        let mut generations = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Ok(metadata) = entry.metadata().await {
                generations.push((entry.path(), metadata.modified().ok()));
            }
        }
        generations.sort_by_key(|(_, modified)| *modified);
        while generations.len() > self.archive_keep {
            let (oldest, _) = generations.remove(0);
            tokio::fs::remove_dir_all(&oldest).await.ok();
        }
        Ok(())
    }

    async fn read_meta(&self, dir: &Path) -> Result<CertMeta, StoreIoError> {
        let path = dir.join("meta.json");
        let raw = tokio::fs::read_to_string(&path).await.map_err(|source| StoreIoError::Write {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| StoreIoError::MetaParse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Reads `live/<name>` applying the meta-first validation protocol:
    /// `meta.json` is read first, then `privkey.pem`/`cert.pem` are
    /// cross-checked against its fingerprint/serial. A mismatch (the two
    /// renames of [`publish`] having been observed mid-flight) is reported
    /// so the caller can retry against a consistent view.
    pub async fn read(&self, name: &str) -> Result<CertMaterial, StoreIoError> {
        let live_dir = self.live_dir(name);
        let meta = self.read_meta(&live_dir).await?;

        let private_key_pem = tokio::fs::read_to_string(live_dir.join("privkey.pem")).await.map_err(|source| StoreIoError::Write {
            path: live_dir.join("privkey.pem").display().to_string(),
            source,
        })?;
        let cert_pem = tokio::fs::read_to_string(live_dir.join("cert.pem")).await.map_err(|source| StoreIoError::Write {
            path: live_dir.join("cert.pem").display().to_string(),
            source,
        })?;
        let chain_pem = tokio::fs::read_to_string(live_dir.join("chain.pem")).await.map_err(|source| StoreIoError::Write {
            path: live_dir.join("chain.pem").display().to_string(),
            source,
        })?;

        validate_consistency(&meta, &private_key_pem, &cert_pem).map_err(|detail| StoreIoError::InconsistentMeta {
            path: live_dir.join("meta.json").display().to_string(),
            detail,
        })?;

        Ok(CertMaterial {
            private_key_pem,
            cert_pem,
            chain_pem,
            meta,
        })
    }

    /// Recovers from a crash between the two renames of [`publish`]
    /// (scenario S5): if `live/<name>` is absent but `new/<name>` exists
    /// and its `meta.json` is internally consistent, completes the publish
    /// by performing the remaining rename.
    pub async fn recover_incomplete_publish(&self, name: &str) -> Result<bool, StoreIoError> {
        let live_dir = self.live_dir(name);
        let new_dir = self.new_dir(name);
        if tokio::fs::try_exists(&live_dir).await.unwrap_or(false) || !tokio::fs::try_exists(&new_dir).await.unwrap_or(false) {
            return Ok(false);
        }

        let meta = self.read_meta(&new_dir).await?;
        let private_key_pem = tokio::fs::read_to_string(new_dir.join("privkey.pem")).await.map_err(|source| StoreIoError::Write {
            path: new_dir.join("privkey.pem").display().to_string(),
            source,
        })?;
        let cert_pem = tokio::fs::read_to_string(new_dir.join("cert.pem")).await.map_err(|source| StoreIoError::Write {
            path: new_dir.join("cert.pem").display().to_string(),
            source,
        })?;
        validate_consistency(&meta, &private_key_pem, &cert_pem).map_err(|detail| StoreIoError::InconsistentMeta {
            path: new_dir.join("meta.json").display().to_string(),
            detail,
        })?;

        tokio::fs::rename(&new_dir, &live_dir).await.map_err(|source| StoreIoError::Rename {
            from: new_dir.display().to_string(),
            to: live_dir.display().to_string(),
            source,
        })?;
        Ok(true)
    }
}

/// Computes a certificate's serial (hex) and the SHA-256 fingerprint of its
/// public key directly from DER, so [`validate_consistency`] never trusts
/// `meta.json` without re-deriving both values from the PEM files
/// themselves.
fn validate_consistency(meta: &CertMeta, private_key_pem: &str, cert_pem: &str) -> Result<(), String> {
    let cert_der = rustls_pemfile::certs(&mut std::io::Cursor::new(cert_pem.as_bytes()))
        .next()
        .ok_or("cert.pem contains no certificate")?
        .map_err(|e| e.to_string())?;
    let (_, x509) = X509Certificate::from_der(&cert_der).map_err(|e| e.to_string())?;
    let actual_serial = x509.raw_serial_as_string();
    if actual_serial != meta.serial {
        return Err(format!("meta.serial {} != cert.pem serial {actual_serial}", meta.serial));
    }

    let actual_fingerprint = fingerprint_of_private_key_pem(private_key_pem)?;
    if actual_fingerprint != meta.fingerprint {
        return Err(format!("meta.fingerprint {} != privkey.pem public-component fingerprint {actual_fingerprint}", meta.fingerprint));
    }
    Ok(())
}

/// Re-derives the public key from `private_key_pem` and hashes its SPKI
/// DER, exactly as [`crate::crypto::public_key_fingerprint`] does at
/// generation time, so a reader never trusts `meta.json` without
/// recomputing the same quantity the writer committed to disk (invariant
/// 1: `meta.fingerprint == SHA256(public-of(privkey.pem))`).
fn fingerprint_of_private_key_pem(private_key_pem: &str) -> Result<String, String> {
    let key_pair = rcgen::KeyPair::from_pem(private_key_pem).map_err(|e| e.to_string())?;
    Ok(hex::encode(Sha256::digest(key_pair.public_key_der())))
}

async fn write_with_mode(path: &Path, contents: &[u8], mode: u32) -> Result<(), StoreIoError> {
    tokio::fs::write(path, contents).await.map_err(|source| StoreIoError::Write {
        path: path.display().to_string(),
        source,
    })?;
    let permissions = std::fs::Permissions::from_mode(mode);
    tokio::fs::set_permissions(path, permissions).await.map_err(|source| StoreIoError::Write {
        path: path.display().to_string(),
        source,
    })?;
    let file = tokio::fs::File::open(path).await.map_err(|source| StoreIoError::Fsync {
        path: path.display().to_string(),
        source,
    })?;
    file.sync_all().await.map_err(|source| StoreIoError::Fsync {
        path: path.display().to_string(),
        source,
    })
}

async fn fsync_dir(dir: &Path) -> Result<(), StoreIoError> {
    let file = tokio::fs::File::open(dir).await.map_err(|source| StoreIoError::Fsync {
        path: dir.display().to_string(),
        source,
    })?;
    file.sync_all().await.map_err(|source| StoreIoError::Fsync {
        path: dir.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn sample_meta(serial: &str, fingerprint: &str) -> CertMeta {
        CertMeta {
            not_before: Utc::now(),
            not_after: Utc::now() + ChronoDuration::days(90),
            serial: serial.to_string(),
            fingerprint: fingerprint.to_string(),
            san: vec!["www.example.org".to_string()],
            self_signed: false,
        }
    }

    #[tokio::test]
    async fn publish_then_read_round_trips_material() {
        let dir = tempfile::tempdir().unwrap();
        let store = CertStore::new(dir.path(), 5);

        let (key_pem, cert_pem, fingerprint, serial) = self_signed_test_cert("www.example.org");
        let material = CertMaterial {
            private_key_pem: key_pem,
            cert_pem,
            chain_pem: String::new(),
            meta: sample_meta(&serial, &fingerprint),
        };

        store.publish("www.example.org", &material).await.unwrap();
        let read_back = store.read("www.example.org").await.unwrap();
        assert_eq!(read_back.meta.serial, serial);
    }

    #[tokio::test]
    async fn republish_archives_previous_generation() {
        let dir = tempfile::tempdir().unwrap();
        let store = CertStore::new(dir.path(), 5);

        let (key1, cert1, fp1, serial1) = self_signed_test_cert("www.example.org");
        store
            .publish("www.example.org", &CertMaterial { private_key_pem: key1, cert_pem: cert1, chain_pem: String::new(), meta: sample_meta(&serial1, &fp1) })
            .await
            .unwrap();

        let (key2, cert2, fp2, serial2) = self_signed_test_cert("www.example.org");
        store
            .publish("www.example.org", &CertMaterial { private_key_pem: key2, cert_pem: cert2, chain_pem: String::new(), meta: sample_meta(&serial2, &fp2) })
            .await
            .unwrap();

        let archive_root = dir.path().join("archive").join("www.example.org");
        let mut entries = tokio::fs::read_dir(&archive_root).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn incomplete_publish_is_recovered_on_restart() {
        let dir = tempfile::tempdir().unwrap();
        let store = CertStore::new(dir.path(), 5);

        let (key_pem, cert_pem, fingerprint, serial) = self_signed_test_cert("crash.example.org");
        let material = CertMaterial {
            private_key_pem: key_pem,
            cert_pem,
            chain_pem: String::new(),
            meta: sample_meta(&serial, &fingerprint),
        };
        // Simulate the crash window: stage into new/ but never rename.
        store.stage(&store.new_dir("crash.example.org"), &material).await.unwrap();

        let recovered = store.recover_incomplete_publish("crash.example.org").await.unwrap();
        assert!(recovered);
        assert!(store.read("crash.example.org").await.is_ok());
    }

    /// Builds a minimal self-signed certificate/key pair for store tests,
    /// returning (key PEM, cert PEM, SHA-256 fingerprint of the public key,
    /// hex serial) consistent with how the store itself computes those
    /// values.
    fn self_signed_test_cert(san: &str) -> (String, String, String, String) {
        use rcgen::{CertificateParams, KeyPair};
        let key_pair = KeyPair::generate().unwrap();
        let params = CertificateParams::new(vec![san.to_string()]).unwrap();
        let cert = params.self_signed(&key_pair).unwrap();
        let key_pem = key_pair.serialize_pem();
        let cert_pem = cert.pem();

        let fingerprint = fingerprint_of_private_key_pem(&key_pem).unwrap();

        let cert_der = rustls_pemfile::certs(&mut std::io::Cursor::new(cert_pem.as_bytes())).next().unwrap().unwrap();
        let (_, x509) = X509Certificate::from_der(&cert_der).unwrap();
        let serial = x509.raw_serial_as_string();

        (key_pem, cert_pem, fingerprint, serial)
    }
}
