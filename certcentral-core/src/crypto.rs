//! Key generation, CSR construction, and JWK thumbprinting.
//!
//! Per-certificate keys never sign JWS; only the ACME account key does, and
//! that signing is owned by `instant-acme` inside [`crate::acme::client`].
//! This module is pure with respect to its inputs: [`build_csr`] in
//! particular must be a deterministic function of (key, sorted SAN list)
//! so that two builds of the same certificate spec are byte-identical.

use base64::Engine as _;
use rcgen::{CertificateParams, CertificateSigningRequestParams, KeyPair, PKCS_ECDSA_P256_SHA256, PKCS_ECDSA_P384_SHA384, PKCS_RSA_SHA256};
use rsa::pkcs8::EncodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CryptoError;

const B64URL: base64::engine::GeneralPurpose = base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// The key algorithm/size a certificate is configured to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyKind {
    Rsa2048,
    Rsa3072,
    Rsa4096,
    EcdsaP256,
    EcdsaP384,
}

impl KeyKind {
    fn rsa_bits(self) -> Option<usize> {
        match self {
            KeyKind::Rsa2048 => Some(2048),
            KeyKind::Rsa3072 => Some(3072),
            KeyKind::Rsa4096 => Some(4096),
            KeyKind::EcdsaP256 | KeyKind::EcdsaP384 => None,
        }
    }
}

/// The public components needed for an RFC 7638 JWK thumbprint, captured
/// at generation time so we never need to re-derive them from DER later.
enum PublicComponents {
    Rsa { n: Vec<u8>, e: Vec<u8> },
    Ec { crv: &'static str, x: Vec<u8>, y: Vec<u8> },
}

/// A generated private key, held in memory for the lifetime of a single
/// order; never logged, never `Debug`-formatted with its material.
pub struct GeneratedKey {
    pub kind: KeyKind,
    key_pair: KeyPair,
    public: PublicComponents,
}

impl std::fmt::Debug for GeneratedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedKey").field("kind", &self.kind).finish_non_exhaustive()
    }
}

impl GeneratedKey {
    pub fn pem(&self) -> String {
        self.key_pair.serialize_pem()
    }

    pub fn der(&self) -> Vec<u8> {
        self.key_pair.serialize_der()
    }
}

/// Generates a fresh private key of the requested kind.
///
/// RSA key generation is CPU-bound; callers on an async hot path should run
/// this inside `tokio::task::spawn_blocking`. The function itself performs
/// no I/O and makes no assumption about its caller's executor.
pub fn generate_key(kind: KeyKind) -> Result<GeneratedKey, CryptoError> {
    match kind {
        KeyKind::Rsa2048 | KeyKind::Rsa3072 | KeyKind::Rsa4096 => {
            let bits = kind.rsa_bits().expect("rsa variant always has a bit size");
            generate_rsa(kind, bits)
        }
        KeyKind::EcdsaP256 => generate_ecdsa(kind, &PKCS_ECDSA_P256_SHA256, "P-256", 32),
        KeyKind::EcdsaP384 => generate_ecdsa(kind, &PKCS_ECDSA_P384_SHA384, "P-384", 48),
    }
}

fn generate_rsa(kind: KeyKind, bits: usize) -> Result<GeneratedKey, CryptoError> {
    let mut rng = rand_core::OsRng;
    let private_key = RsaPrivateKey::new(&mut rng, bits).map_err(|e| CryptoError::Internal(e.to_string()))?;
    let pkcs8_pem = private_key
        .to_pkcs8_pem(Default::default())
        .map_err(|e| CryptoError::Internal(e.to_string()))?;
    let key_pair =
        KeyPair::from_pem_and_sign_algo(&pkcs8_pem, &PKCS_RSA_SHA256).map_err(|e| CryptoError::Internal(e.to_string()))?;

    let public = private_key.to_public_key();
    Ok(GeneratedKey {
        kind,
        key_pair,
        public: PublicComponents::Rsa {
            n: public.n().to_bytes_be(),
            e: public.e().to_bytes_be(),
        },
    })
}

fn generate_ecdsa(
    kind: KeyKind,
    alg: &'static rcgen::SignatureAlgorithm,
    crv: &'static str,
    coord_len: usize,
) -> Result<GeneratedKey, CryptoError> {
    let key_pair = KeyPair::generate_for(alg).map_err(|e| CryptoError::Internal(e.to_string()))?;
    // SPKI DER for an EC key ends in the uncompressed point 0x04 || X || Y,
    // which is fixed-length for the curves this engine supports.
    let spki = key_pair.public_key_der();
    let point = &spki[spki.len() - (2 * coord_len + 1)..];
    let x = point[1..1 + coord_len].to_vec();
    let y = point[1 + coord_len..1 + 2 * coord_len].to_vec();
    Ok(GeneratedKey {
        kind,
        key_pair,
        public: PublicComponents::Ec { crv, x, y },
    })
}

/// Builds a PKCS#10 CSR for `key` over `sans`, lexicographically sorting
/// the SAN list first so that repeated calls with the same logical input
/// are byte-identical regardless of the caller's SAN ordering.
pub fn build_csr(key: &GeneratedKey, sans: &[String]) -> Result<Vec<u8>, CryptoError> {
    if sans.is_empty() {
        return Err(CryptoError::EmptySanList);
    }
    let mut sorted_sans = sans.to_vec();
    sorted_sans.sort();
    sorted_sans.dedup();

    let params = CertificateParams::new(sorted_sans).map_err(|e| CryptoError::Internal(e.to_string()))?;
    let csr: CertificateSigningRequestParams = params
        .serialize_request(&key.key_pair)
        .map_err(|e| CryptoError::Internal(e.to_string()))?;
    Ok(csr.der().to_vec())
}

/// Computes the RFC 7638 JWK thumbprint of a key's public components,
/// base64url-encoded without padding, over the canonical
/// (lexicographically-keyed, whitespace-free) JWK JSON representation.
pub fn jwk_thumbprint(key: &GeneratedKey) -> Result<String, CryptoError> {
    let jwk_json = match &key.public {
        PublicComponents::Rsa { n, e } => {
            format!(r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#, B64URL.encode(e), B64URL.encode(n))
        }
        PublicComponents::Ec { crv, x, y } => {
            format!(r#"{{"crv":"{crv}","kty":"EC","x":"{}","y":"{}"}}"#, B64URL.encode(x), B64URL.encode(y))
        }
    };
    let digest = Sha256::digest(jwk_json.as_bytes());
    Ok(B64URL.encode(digest))
}

/// PEM-encodes a CSR (DER) as a `CERTIFICATE REQUEST` block.
pub fn csr_to_pem(csr_der: &[u8]) -> String {
    pem_encode("CERTIFICATE REQUEST", csr_der)
}

fn pem_encode(label: &str, der: &[u8]) -> String {
    let b64 = base64::engine::general_purpose::STANDARD.encode(der);
    let mut out = format!("-----BEGIN {label}-----\n");
    for chunk in b64.as_bytes().chunks(64) {
        out.push_str(std::str::from_utf8(chunk).expect("base64 alphabet is ascii"));
        out.push('\n');
    }
    out.push_str(&format!("-----END {label}-----\n"));
    out
}

/// Computes the SHA-256 fingerprint of a public key (hex-encoded), used to
/// cross-check `meta.json` against `privkey.pem` on read.
pub fn public_key_fingerprint(key: &GeneratedKey) -> String {
    let digest = Sha256::digest(key.key_pair.public_key_der());
    hex::encode(digest)
}

/// Decodes a PEM-encoded private key previously written by this module,
/// re-deriving its [`KeyKind`] from the PEM label and key size.
pub fn key_from_pem(pem: &str) -> Result<KeyPair, CryptoError> {
    KeyPair::from_pem(pem).map_err(|e| CryptoError::PemDecode(e.to_string()))
}
