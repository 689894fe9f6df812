//! Declarative configuration schema and loader.
//!
//! Configuration is YAML, loaded once at startup and again on `SIGHUP`
//! reload. Every recognized key is enumerated here; an unrecognized key at
//! any level fails the load rather than being silently ignored, via serde's
//! `deny_unknown_fields` rather than the manual used-key tracking ferron
//! uses for its dynamic per-module directives (our schema is fixed and
//! fully typed, so the native serde mechanism applies directly).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::KeyKind;
use crate::error::ConfigError;

/// Environment variable naming the configuration file path.
pub const ENV_CONFIG_PATH: &str = "CERTCENTRAL_CONFIG";
/// Environment variable overriding `store.base_path`.
pub const ENV_STATE_DIR: &str = "CERTCENTRAL_STATE_DIR";

/// The default configuration path consulted when neither `--config` nor
/// `CERTCENTRAL_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/certcentral/config.yaml";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub accounts: HashMap<String, AccountConfig>,
    pub challenges: ChallengesConfig,
    pub certificates: HashMap<String, CertificateConfig>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    pub directory: String,
    #[serde(default)]
    pub contact: Vec<String>,
    pub key_path: PathBuf,
    /// Marks this account as a staging (non-production) CA endpoint.
    /// A certificate's `name` may not appear under both a staging and a
    /// production account at once (enforced in `validate`).
    #[serde(default)]
    pub staging: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChallengesConfig {
    #[serde(default)]
    pub http01: Option<Http01Config>,
    #[serde(default)]
    pub dns01: Option<Dns01Config>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Http01Config {
    pub challenges_dir: PathBuf,
    #[serde(default)]
    pub self_check_urls: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Dns01Config {
    pub providers: HashMap<String, DnsProviderConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DnsProviderConfig {
    pub driver: DnsDriverKind,
    #[serde(default)]
    pub credentials: DnsProviderCredentials,
    /// SAN suffixes routed to this provider by longest-suffix match.
    pub zones: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DnsDriverKind {
    Cloudflare,
    Rfc2136,
    Desec,
    Porkbun,
    Route53,
}

/// Opaque, driver-specific credential bag. Every field is optional at the
/// schema level; each driver validates the subset it needs at construction
/// time and reports `ConfigError` for anything missing.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DnsProviderCredentials {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub tsig_key_name: Option<String>,
    #[serde(default)]
    pub tsig_key_secret: Option<String>,
    #[serde(default)]
    pub tsig_algorithm: Option<String>,
    #[serde(default)]
    pub server_addr: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub profile_name: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub hosted_zone_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChallengeKind {
    Http01,
    Dns01,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CertificateConfig {
    /// Subject Alternative Names; first entry is also used as the CN.
    pub san: Vec<String>,
    #[serde(default = "default_key_type")]
    pub key_type: KeyKind,
    pub challenge: ChallengeKind,
    pub account: String,
}

fn default_key_type() -> KeyKind {
    KeyKind::EcdsaP256
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_renewal_ratio")]
    pub renewal_ratio: f64,
    #[serde(default = "default_backoff_base", with = "humantime_serde")]
    pub backoff_base: Duration,
    #[serde(default = "default_backoff_cap", with = "humantime_serde")]
    pub backoff_cap: Duration,
    #[serde(default = "default_concurrent_orders")]
    pub concurrent_orders: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            workers: default_workers(),
            renewal_ratio: default_renewal_ratio(),
            backoff_base: default_backoff_base(),
            backoff_cap: default_backoff_cap(),
            concurrent_orders: default_concurrent_orders(),
        }
    }
}

fn default_workers() -> usize {
    4
}
fn default_renewal_ratio() -> f64 {
    2.0 / 3.0
}
fn default_backoff_base() -> Duration {
    Duration::from_secs(30)
}
fn default_backoff_cap() -> Duration {
    Duration::from_secs(3600)
}
fn default_concurrent_orders() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    pub base_path: PathBuf,
    #[serde(default = "default_archive_keep")]
    pub archive_keep: usize,
}

fn default_archive_keep() -> usize {
    5
}

/// Loads and validates configuration from `path`, honoring
/// `CERTCENTRAL_STATE_DIR` as an override for `store.base_path` if set.
pub fn load_from_file(path: &Path, state_dir_override: Option<&Path>) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    load_from_str(&raw, state_dir_override)
}

/// Parses and validates configuration already read into memory. Split out
/// from [`load_from_file`] so tests can exercise validation without
/// touching the filesystem.
pub fn load_from_str(raw: &str, state_dir_override: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config: Config = serde_yaml::from_str(raw)?;
    if let Some(state_dir) = state_dir_override {
        config.store.base_path = state_dir.to_path_buf();
    }
    validate(&config)?;
    Ok(config)
}

/// Cross-field validation that serde's structural typing cannot express:
/// dangling references between certificates/accounts/providers, empty SAN
/// lists, and the staging/production name-sharing rule.
fn validate(config: &Config) -> Result<(), ConfigError> {
    for (name, cert) in &config.certificates {
        if cert.san.is_empty() {
            return Err(ConfigError::EmptySanList { name: name.clone() });
        }
        let account = config.accounts.get(&cert.account).ok_or_else(|| ConfigError::UnknownAccount {
            name: name.clone(),
            account: cert.account.clone(),
        })?;

        if cert.challenge == ChallengeKind::Dns01 {
            let providers = config
                .challenges
                .dns01
                .as_ref()
                .map(|d| &d.providers)
                .ok_or_else(|| ConfigError::UnknownDnsProvider {
                    name: name.clone(),
                    provider: "<none configured>".to_string(),
                })?;
            if !cert.san.iter().any(|san| providers.values().any(|p| zone_matches(san, &p.zones))) {
                return Err(ConfigError::UnknownDnsProvider {
                    name: name.clone(),
                    provider: "<no zone match>".to_string(),
                });
            }
        }

        let _ = account; // presence already checked above; staging flag read below
    }

    // The same certificate `name` must not be requested
    // against accounts that disagree on staging-ness (not detectable as a
    // rename, so rejected outright rather than guessed at).
    let mut staging_by_name: HashMap<&str, bool> = HashMap::new();
    for (name, cert) in &config.certificates {
        if let Some(account) = config.accounts.get(&cert.account) {
            if let Some(&seen_staging) = staging_by_name.get(name.as_str()) {
                if seen_staging != account.staging {
                    return Err(ConfigError::AmbiguousStagingName { name: name.clone() });
                }
            } else {
                staging_by_name.insert(name.as_str(), account.staging);
            }
        }
    }

    Ok(())
}

/// Longest-suffix zone match used both here (for validation) and by the
/// dns-01 fulfiller (for provider selection).
pub fn zone_matches(name: &str, zones: &[String]) -> bool {
    zones.iter().any(|zone| name == zone || name.ends_with(&format!(".{zone}")))
}

/// Selects the best-matching zone (longest suffix) for `name` among
/// `zones`, if any matches.
pub fn best_zone_match<'a>(name: &str, zones: &'a [String]) -> Option<&'a str> {
    zones
        .iter()
        .filter(|zone| name == zone.as_str() || name.ends_with(&format!(".{zone}")))
        .max_by_key(|zone| zone.len())
        .map(|z| z.as_str())
}
