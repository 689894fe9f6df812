//! ACME v2 client, wrapping `instant-acme`.
//!
//! Wire-level concerns RFC 8555 requires on every request — JWS envelope
//! construction, nonce caching, the account-key signature — are owned by
//! `instant_acme::Account` and are not reimplemented here; duplicating a
//! JWS/nonce layer on top of a crate that already implements one
//! correctly would be pure risk for no benefit. What this module adds on
//! top of `instant-acme` is the stable, engine-visible operation set the
//! scheduler drives: deadline-bounded polling with a fixed backoff
//! schedule (1s doubling to a 30s cap), and an explicit-CSR finalize path
//! so the CSR is a pure function of an engine-held key rather than a key
//! `instant-acme` generates for us.

pub mod account;
pub mod client;

pub use account::AccountRegistry;
pub use client::AcmeClient;
