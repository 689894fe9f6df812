//! http-01 challenge fulfiller.
//!
//! The fleet this engine serves shares no filesystem with the engine
//! process, so unlike ferron's in-memory
//! `Http01DataLock`, provisioning here writes to a real directory on disk
//! that deployment is responsible for mirroring or routing
//! `/.well-known/acme-challenge/` to — an operational
//! contract, not something this fulfiller can enforce.

use std::path::{Path, PathBuf};

use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;

use crate::error::ChallengeProvisionError;

use super::PendingChallenge;

pub struct Http01Fulfiller {
    challenges_dir: PathBuf,
    self_check_urls: Vec<String>,
    http_client: HyperClient<HttpConnector, http_body_util::Empty<bytes::Bytes>>,
}

impl Http01Fulfiller {
    pub fn new(challenges_dir: impl Into<PathBuf>, self_check_urls: Vec<String>) -> Self {
        Self {
            challenges_dir: challenges_dir.into(),
            self_check_urls,
            http_client: HyperClient::builder(TokioExecutor::new()).build(HttpConnector::new()),
        }
    }

    fn token_path(&self, token: &str) -> PathBuf {
        self.challenges_dir.join(".well-known").join("acme-challenge").join(token)
    }

    /// Writes the key authorization under
    /// `<challenges_dir>/.well-known/acme-challenge/<token>` and, if any
    /// self-check URLs are configured, confirms at least one of them
    /// serves the expected content before returning.
    pub async fn provision(&self, challenge: &PendingChallenge) -> Result<(), ChallengeProvisionError> {
        let well_known = self.challenges_dir.join(".well-known").join("acme-challenge");
        tokio::fs::create_dir_all(&well_known).await.map_err(|source| ChallengeProvisionError::Http01Write {
            path: well_known.display().to_string(),
            source,
        })?;

        let path = well_known.join(&challenge.token);
        tokio::fs::write(&path, challenge.key_authorization.as_bytes())
            .await
            .map_err(|source| ChallengeProvisionError::Http01Write {
                path: path.display().to_string(),
                source,
            })?;

        if !self.self_check_urls.is_empty() {
            self.self_check(&challenge.token, &challenge.key_authorization).await?;
        }
        Ok(())
    }

    /// Removes the challenge file. Best-effort: logged, never surfaced to
    /// the scheduler as a record-failing error.
    pub async fn cleanup(&self, challenge: &PendingChallenge) -> Result<(), ChallengeProvisionError> {
        let path = self.token_path(&challenge.token);
        match tokio::fs::remove_file(&path).await {
            Ok(()) | Err(_) => Ok(()),
        }
    }

    async fn self_check(&self, token: &str, expected: &str) -> Result<(), ChallengeProvisionError> {
        for base_url in &self.self_check_urls {
            let url = format!("{}/.well-known/acme-challenge/{token}", base_url.trim_end_matches('/'));
            if self.fetch_matches(&url, expected).await {
                return Ok(());
            }
        }
        Err(ChallengeProvisionError::Http01SelfCheckFailed {
            url: self.self_check_urls.join(", "),
        })
    }

    async fn fetch_matches(&self, url: &str, expected: &str) -> bool {
        let Ok(uri) = url.parse() else { return false };
        let Ok(response) = self.http_client.get(uri).await else { return false };
        let Ok(body) = http_body_util::BodyExt::collect(response.into_body()).await else {
            return false;
        };
        body.to_bytes() == expected.as_bytes()
    }
}

/// Ensures `challenges_dir` exists and is writable at startup, surfaced as
/// exit code 69 if not.
pub async fn ensure_challenges_dir_writable(path: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(path).await?;
    let probe = path.join(".certcentral-write-probe");
    tokio::fs::write(&probe, b"").await?;
    tokio::fs::remove_file(&probe).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_challenge() -> PendingChallenge {
        PendingChallenge {
            identifier: "www.example.org".to_string(),
            token: "the-token".to_string(),
            key_authorization: "the-token.thumbprint".to_string(),
        }
    }

    #[tokio::test]
    async fn provision_writes_key_authorization_under_well_known_path() {
        let dir = tempfile::tempdir().unwrap();
        let fulfiller = Http01Fulfiller::new(dir.path(), Vec::new());
        let challenge = sample_challenge();

        fulfiller.provision(&challenge).await.unwrap();

        let written = tokio::fs::read_to_string(dir.path().join(".well-known").join("acme-challenge").join("the-token"))
            .await
            .unwrap();
        assert_eq!(written, challenge.key_authorization);
    }

    #[tokio::test]
    async fn cleanup_removes_the_file_provision_wrote() {
        let dir = tempfile::tempdir().unwrap();
        let fulfiller = Http01Fulfiller::new(dir.path(), Vec::new());
        let challenge = sample_challenge();

        fulfiller.provision(&challenge).await.unwrap();
        fulfiller.cleanup(&challenge).await.unwrap();

        let path = dir.path().join(".well-known").join("acme-challenge").join("the-token");
        assert!(tokio::fs::metadata(&path).await.is_err());
    }

    #[tokio::test]
    async fn cleanup_on_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let fulfiller = Http01Fulfiller::new(dir.path(), Vec::new());
        fulfiller.cleanup(&sample_challenge()).await.unwrap();
    }

    #[tokio::test]
    async fn ensure_challenges_dir_writable_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested").join("challenges");
        ensure_challenges_dir_writable(&nested).await.unwrap();
        assert!(tokio::fs::metadata(&nested).await.unwrap().is_dir());
    }
}
