//! Typed error kinds for the certificate lifecycle engine.
//!
//! Every fallible operation in `certcentral-core` returns one of these kinds
//! (or a type convertible into one) rather than an opaque `anyhow::Error`,
//! so the scheduler can pattern-match on the propagation policy: some kinds
//! are retried transparently, some carry a `Retry-After`-derived deadline,
//! some are fatal for the record but never fatal for the daemon.

use std::time::Duration;

use thiserror::Error;

/// Top-level error type returned by `certcentral-core` operations.
#[derive(Debug, Error)]
pub enum CertcentralError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    AcmeProtocol(#[from] AcmeProtocolError),

    #[error("ACME operation timed out waiting for a terminal status")]
    AcmeTimeout,

    #[error(transparent)]
    ChallengeProvision(ChallengeProvisionError),

    #[error("DNS-01 record did not propagate to all authoritative nameservers before the deadline")]
    DnsPropagationTimeout,

    #[error(transparent)]
    StoreIo(#[from] StoreIoError),
}

/// Configuration loading and validation failures. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration as YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("unrecognized configuration key(s): {0:?}")]
    UnknownKeys(Vec<String>),

    #[error("certificate {name:?} references unknown account {account:?}")]
    UnknownAccount { name: String, account: String },

    #[error("certificate {name:?} references unknown challenge provider {provider:?}")]
    UnknownDnsProvider { name: String, provider: String },

    #[error("certificate {name:?} has an empty SAN list")]
    EmptySanList { name: String },

    #[error(
        "certificate name {name:?} is shared by a staging and a production account; \
         this engine requires distinct names for staging and production certificates"
    )]
    AmbiguousStagingName { name: String },

    #[error("store.base_path {path:?} is not writable: {source}")]
    StoreUnwritable {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Cryptographic primitive failures. `KeyKind` is a closed, exhaustively
/// matched enum, so the only reachable `CryptoParamError` case (§4.1) is an
/// empty SAN list; there is no "unknown key kind" to represent.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("empty SAN list given to CSR builder")]
    EmptySanList,

    #[error("underlying cryptographic library error: {0}")]
    Internal(String),

    #[error("failed to decode PEM: {0}")]
    PemDecode(String),
}

/// ACME v2 protocol-level errors (RFC 8555 problem documents and related
/// wire failures).
#[derive(Debug, Error)]
pub enum AcmeProtocolError {
    /// `urn:ietf:params:acme:error:badNonce`. Never observed by callers:
    /// the client retries exactly once with a fresh nonce internally.
    #[error("ACME server rejected the anti-replay nonce")]
    BadNonce,

    /// HTTP 429 or an ACME `rateLimited` problem. Carries the
    /// `Retry-After` duration, if the server sent one.
    #[error("ACME server rate-limited this account/IP, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("ACME server rejected the request as unauthorized: {detail}")]
    Unauthorized { detail: String },

    #[error("ACME server rejected the request as malformed: {detail}")]
    Malformed { detail: String },

    #[error("ACME server returned an internal error (type {problem_type:?}): {detail}")]
    ServerInternal { problem_type: String, detail: String },
}

/// Failure while placing or confirming a challenge.
#[derive(Debug, Error)]
pub enum ChallengeProvisionError {
    #[error("no DNS provider zone matches identifier {identifier:?}")]
    NoMatchingDnsProvider { identifier: String },

    #[error("DNS provider {provider:?} rejected the TXT record update: {detail}")]
    DnsProviderRejected { provider: String, detail: String },

    #[error("failed to write http-01 challenge file at {path:?}: {source}")]
    Http01Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("self-check GET to {url:?} did not observe the expected key authorization")]
    Http01SelfCheckFailed { url: String },

    /// Distinguished from [`ChallengeProvisionError::DnsProviderRejected`]
    /// so it converts into the dedicated top-level
    /// [`CertcentralError::DnsPropagationTimeout`] kind rather than the
    /// generic challenge-provision one, since the two call for different
    /// retry policies upstream.
    #[error("TXT record at {rrname:?} did not propagate to all of {nameservers:?} before the deadline")]
    DnsPropagationTimeout { rrname: String, nameservers: Vec<String> },
}

impl From<ChallengeProvisionError> for CertcentralError {
    fn from(err: ChallengeProvisionError) -> Self {
        match err {
            ChallengeProvisionError::DnsPropagationTimeout { .. } => CertcentralError::DnsPropagationTimeout,
            other => CertcentralError::ChallengeProvision(other),
        }
    }
}

/// Certificate store I/O failures.
#[derive(Debug, Error)]
pub enum StoreIoError {
    #[error("failed to write {path:?}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fsync {path:?}: {source}")]
    Fsync {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to rename {from:?} to {to:?}: {source}")]
    Rename {
        from: String,
        to: String,
        #[source]
        source: std::io::Error,
    },

    #[error("meta.json at {path:?} is inconsistent with its companion PEM files: {detail}")]
    InconsistentMeta { path: String, detail: String },

    #[error("malformed meta.json at {path:?}: {source}")]
    MetaParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
