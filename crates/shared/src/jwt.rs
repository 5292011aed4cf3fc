//! Client-assertion JWT signing over JWK-encoded private keys.
//!
//! Key material arrives as base64url big-endian integers (JWK convention).
//! EC keys are bound to their curve (P-256/ES256, P-384/ES384, P-521/ES512).
//! RSA keys must carry the full CRT parameter set and may be used with any of
//! RS256/RS384/RS512/PS256/PS384/PS512.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use p256::ecdsa::signature::{RandomizedSigner, SignatureEncoding, Signer};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha384, Sha512};
use thiserror::Error;
use uuid::Uuid;

/// Lifetime of a signed client assertion in seconds (5 minutes).
pub const CLIENT_ASSERTION_LIFETIME_SECS: i64 = 300;

/// Smallest RSA modulus accepted for RS*/PS* signing.
pub const MIN_RSA_MODULUS_BITS: usize = 2048;

/// Error type for JWT operations.
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Key does not match algorithm: {0}")]
    KeyMismatch(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Incomplete key material: missing '{0}'")]
    MissingComponent(&'static str),

    #[error("Failed to encode token: {0}")]
    EncodingError(String),

    #[error("Failed to decode token: {0}")]
    DecodingError(String),

    #[error("Invalid token signature")]
    InvalidSignature,

}

/// Asymmetric JWS algorithms accepted for client assertions.
///
/// Symmetric (HS*) and `none` are deliberately absent: parsing them fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    ES256,
    ES384,
    ES512,
    RS256,
    RS384,
    RS512,
    PS256,
    PS384,
    PS512,
}

impl Algorithm {
    /// All supported algorithms.
    pub const ALL: [Algorithm; 9] = [
        Algorithm::ES256,
        Algorithm::ES384,
        Algorithm::ES512,
        Algorithm::RS256,
        Algorithm::RS384,
        Algorithm::RS512,
        Algorithm::PS256,
        Algorithm::PS384,
        Algorithm::PS512,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::ES256 => "ES256",
            Algorithm::ES384 => "ES384",
            Algorithm::ES512 => "ES512",
            Algorithm::RS256 => "RS256",
            Algorithm::RS384 => "RS384",
            Algorithm::RS512 => "RS512",
            Algorithm::PS256 => "PS256",
            Algorithm::PS384 => "PS384",
            Algorithm::PS512 => "PS512",
        }
    }

    /// The JWK curve name an EC algorithm is bound to.
    pub fn curve(&self) -> Option<&'static str> {
        match self {
            Algorithm::ES256 => Some("P-256"),
            Algorithm::ES384 => Some("P-384"),
            Algorithm::ES512 => Some("P-521"),
            _ => None,
        }
    }

    /// The JWK `kty` this algorithm requires.
    pub fn key_type(&self) -> &'static str {
        if self.curve().is_some() {
            "EC"
        } else {
            "RSA"
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = JwtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Algorithm::ALL
            .into_iter()
            .find(|alg| alg.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| JwtError::UnsupportedAlgorithm(s.to_string()))
    }
}

/// A JSON Web Key carrying private material.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dq: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qi: Option<String>,
}

impl fmt::Debug for Jwk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jwk")
            .field("kty", &self.kty)
            .field("kid", &self.kid)
            .field("crv", &self.crv)
            .field("x", &self.x)
            .field("y", &self.y)
            .field("n", &self.n)
            .field("e", &self.e)
            .field("private", &"[REDACTED]")
            .finish()
    }
}

/// Claims of an OAuth2 client assertion (RFC 7523).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    /// Unique per assertion so the authorization server can reject replays.
    pub jti: String,
}

impl AssertionClaims {
    /// Claims for a fresh assertion valid for [`CLIENT_ASSERTION_LIFETIME_SECS`].
    pub fn new(issuer: &str, subject: &str, audience: &str) -> Self {
        let now = Utc::now();
        Self {
            iss: issuer.to_string(),
            sub: subject.to_string(),
            aud: audience.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(CLIENT_ASSERTION_LIFETIME_SECS)).timestamp(),
            jti: Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct JwsHeader {
    alg: String,
    typ: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
}

enum KeyMaterial {
    P256(p256::ecdsa::SigningKey),
    P384(p384::ecdsa::SigningKey),
    P521(p521::ecdsa::SigningKey),
    Rsa(RsaPrivateKey),
}

/// A validated signing key bound to one algorithm.
pub struct AssertionSigner {
    algorithm: Algorithm,
    kid: Option<String>,
    key: KeyMaterial,
}

impl fmt::Debug for AssertionSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssertionSigner")
            .field("algorithm", &self.algorithm)
            .field("kid", &self.kid)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl AssertionSigner {
    /// Validates `jwk` against `algorithm` and builds a signer.
    ///
    /// Fails when the key type or curve does not match the algorithm, when
    /// the EC public point is off-curve or unrelated to `d`, or when RSA CRT
    /// parameters are absent or inconsistent.
    pub fn from_jwk(jwk: &Jwk, algorithm: Algorithm) -> Result<Self, JwtError> {
        if !jwk.kty.eq_ignore_ascii_case(algorithm.key_type()) {
            return Err(JwtError::KeyMismatch(format!(
                "algorithm {} requires key type {}, got '{}'",
                algorithm,
                algorithm.key_type(),
                jwk.kty
            )));
        }

        let key = match algorithm {
            Algorithm::ES256 | Algorithm::ES384 | Algorithm::ES512 => load_ec(jwk, algorithm)?,
            _ => KeyMaterial::Rsa(load_rsa(jwk)?),
        };

        Ok(Self {
            algorithm,
            kid: jwk.kid.clone(),
            key,
        })
    }

    /// Parses `algorithm` and validates `jwk` in one step.
    pub fn from_jwk_str(jwk: &Jwk, algorithm: &str) -> Result<Self, JwtError> {
        Self::from_jwk(jwk, algorithm.parse()?)
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Signs a client assertion for the given issuer, subject and token URL.
    pub fn sign_assertion(
        &self,
        issuer: &str,
        subject: &str,
        audience: &str,
    ) -> Result<(String, AssertionClaims), JwtError> {
        let claims = AssertionClaims::new(issuer, subject, audience);
        let token = self.sign(&claims)?;
        Ok((token, claims))
    }

    /// Produces a compact JWS over arbitrary claims.
    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, JwtError> {
        let header = JwsHeader {
            alg: self.algorithm.as_str().to_string(),
            typ: "JWT".to_string(),
            kid: self.kid.clone(),
        };
        let header = serde_json::to_vec(&header)
            .map_err(|e| JwtError::EncodingError(e.to_string()))?;
        let claims =
            serde_json::to_vec(claims).map_err(|e| JwtError::EncodingError(e.to_string()))?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(claims)
        );
        let signature = self.sign_bytes(signing_input.as_bytes())?;

        Ok(format!(
            "{}.{}",
            signing_input,
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    fn sign_bytes(&self, message: &[u8]) -> Result<Vec<u8>, JwtError> {
        let encoding = |e: p256::ecdsa::signature::Error| JwtError::EncodingError(e.to_string());
        match &self.key {
            KeyMaterial::P256(key) => {
                let signature: p256::ecdsa::Signature = key.try_sign(message).map_err(encoding)?;
                Ok(signature.to_bytes().to_vec())
            }
            KeyMaterial::P384(key) => {
                let signature: p384::ecdsa::Signature = key.try_sign(message).map_err(encoding)?;
                Ok(signature.to_bytes().to_vec())
            }
            KeyMaterial::P521(key) => {
                let signature: p521::ecdsa::Signature = key.try_sign(message).map_err(encoding)?;
                Ok(signature.to_bytes().to_vec())
            }
            KeyMaterial::Rsa(key) => rsa_sign(key, self.algorithm, message),
        }
    }

}

/// Decodes a required base64url JWK member.
fn decode_component(value: Option<&String>, name: &'static str) -> Result<Vec<u8>, JwtError> {
    let value = value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or(JwtError::MissingComponent(name))?;

    URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|e| JwtError::InvalidKey(format!("'{}' is not valid base64url: {}", name, e)))
}

/// Left-pads a big-endian integer to the curve's field width.
fn fixed_width(bytes: Vec<u8>, width: usize, name: &'static str) -> Result<Vec<u8>, JwtError> {
    let first_nonzero = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    let significant = &bytes[first_nonzero..];
    if significant.len() > width {
        return Err(JwtError::InvalidKey(format!(
            "'{}' is longer than {} bytes",
            name, width
        )));
    }

    let mut out = vec![0u8; width - significant.len()];
    out.extend_from_slice(significant);
    Ok(out)
}

/// Uncompressed SEC1 encoding of an affine point.
fn sec1_point(x: &[u8], y: &[u8]) -> Vec<u8> {
    let mut point = Vec::with_capacity(1 + x.len() + y.len());
    point.push(0x04);
    point.extend_from_slice(x);
    point.extend_from_slice(y);
    point
}

fn load_ec(jwk: &Jwk, algorithm: Algorithm) -> Result<KeyMaterial, JwtError> {
    let expected = algorithm
        .curve()
        .ok_or_else(|| JwtError::UnsupportedAlgorithm(algorithm.to_string()))?;
    let curve = jwk.crv.as_deref().ok_or(JwtError::MissingComponent("crv"))?;
    if curve != expected {
        return Err(JwtError::KeyMismatch(format!(
            "algorithm {} requires curve {}, key is on {}",
            algorithm, expected, curve
        )));
    }

    let width = match algorithm {
        Algorithm::ES256 => 32,
        Algorithm::ES384 => 48,
        _ => 66,
    };
    let d = fixed_width(decode_component(jwk.d.as_ref(), "d")?, width, "d")?;
    let x = fixed_width(decode_component(jwk.x.as_ref(), "x")?, width, "x")?;
    let y = fixed_width(decode_component(jwk.y.as_ref(), "y")?, width, "y")?;
    let point = sec1_point(&x, &y);

    let off_curve = || JwtError::InvalidKey(format!("public point is not on curve {}", curve));
    let bad_scalar = || JwtError::InvalidKey(format!("'d' is not a valid {} scalar", curve));
    let mismatch = || JwtError::KeyMismatch("public point does not match private key".into());

    match algorithm {
        Algorithm::ES256 => {
            let secret = p256::SecretKey::from_slice(&d).map_err(|_| bad_scalar())?;
            let public = p256::PublicKey::from_sec1_bytes(&point).map_err(|_| off_curve())?;
            if secret.public_key() != public {
                return Err(mismatch());
            }
            Ok(KeyMaterial::P256(p256::ecdsa::SigningKey::from(secret)))
        }
        Algorithm::ES384 => {
            let secret = p384::SecretKey::from_slice(&d).map_err(|_| bad_scalar())?;
            let public = p384::PublicKey::from_sec1_bytes(&point).map_err(|_| off_curve())?;
            if secret.public_key() != public {
                return Err(mismatch());
            }
            Ok(KeyMaterial::P384(p384::ecdsa::SigningKey::from(secret)))
        }
        _ => {
            let secret = p521::SecretKey::from_slice(&d).map_err(|_| bad_scalar())?;
            let public = p521::PublicKey::from_sec1_bytes(&point).map_err(|_| off_curve())?;
            if secret.public_key() != public {
                return Err(mismatch());
            }
            let key = p521::ecdsa::SigningKey::from_slice(&d).map_err(|_| bad_scalar())?;
            Ok(KeyMaterial::P521(key))
        }
    }
}

fn load_rsa(jwk: &Jwk) -> Result<RsaPrivateKey, JwtError> {
    let integer = |value: Option<&String>, name: &'static str| {
        decode_component(value, name).map(|bytes| BigUint::from_bytes_be(&bytes))
    };

    let n = integer(jwk.n.as_ref(), "n")?;
    let e = integer(jwk.e.as_ref(), "e")?;
    let d = integer(jwk.d.as_ref(), "d")?;
    // CRT members are mandatory; deriving them from n/d is not supported.
    let p = integer(jwk.p.as_ref(), "p")?;
    let q = integer(jwk.q.as_ref(), "q")?;
    let dp = integer(jwk.dp.as_ref(), "dp")?;
    let dq = integer(jwk.dq.as_ref(), "dq")?;
    let qi = integer(jwk.qi.as_ref(), "qi")?;

    let mut key = RsaPrivateKey::from_components(n, e, d, vec![p, q])
        .map_err(|e| JwtError::InvalidKey(format!("RSA components rejected: {}", e)))?;
    key.validate()
        .map_err(|e| JwtError::InvalidKey(format!("RSA key failed validation: {}", e)))?;

    if key.size() * 8 < MIN_RSA_MODULUS_BITS {
        return Err(JwtError::InvalidKey(format!(
            "RSA modulus must be at least {} bits",
            MIN_RSA_MODULUS_BITS
        )));
    }

    key.precompute()
        .map_err(|e| JwtError::InvalidKey(format!("RSA precomputation failed: {}", e)))?;
    if key.dp() != Some(&dp) || key.dq() != Some(&dq) || key.crt_coefficient() != Some(qi) {
        return Err(JwtError::KeyMismatch(
            "CRT parameters do not belong to this RSA key".into(),
        ));
    }

    Ok(key)
}

fn rsa_sign(key: &RsaPrivateKey, algorithm: Algorithm, message: &[u8]) -> Result<Vec<u8>, JwtError> {
    use rsa::{pkcs1v15, pss};

    let mut rng = rand::thread_rng();
    let key = key.clone();
    let signature = match algorithm {
        Algorithm::RS256 => pkcs1v15::SigningKey::<Sha256>::new(key)
            .try_sign(message)
            .map(|s| s.to_vec()),
        Algorithm::RS384 => pkcs1v15::SigningKey::<Sha384>::new(key)
            .try_sign(message)
            .map(|s| s.to_vec()),
        Algorithm::RS512 => pkcs1v15::SigningKey::<Sha512>::new(key)
            .try_sign(message)
            .map(|s| s.to_vec()),
        Algorithm::PS256 => pss::BlindedSigningKey::<Sha256>::new(key)
            .try_sign_with_rng(&mut rng, message)
            .map(|s| s.to_vec()),
        Algorithm::PS384 => pss::BlindedSigningKey::<Sha384>::new(key)
            .try_sign_with_rng(&mut rng, message)
            .map(|s| s.to_vec()),
        Algorithm::PS512 => pss::BlindedSigningKey::<Sha512>::new(key)
            .try_sign_with_rng(&mut rng, message)
            .map(|s| s.to_vec()),
        other => return Err(JwtError::KeyMismatch(format!("{} cannot use an RSA key", other))),
    };

    signature.map_err(|e| JwtError::EncodingError(e.to_string()))
}
