//! HMAC signature verification shared by the webhook parsers.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;

use crate::IngestError;

/// Digest algorithms accepted in `<algo>=<hex>` signature headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HmacAlg {
    Sha1,
    Sha256,
    Sha512,
}

impl HmacAlg {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }
}

/// Split a `<algo>=<hex>` header value into algorithm and signature bytes.
pub(crate) fn parse_header(value: &str) -> Result<(HmacAlg, Vec<u8>), IngestError> {
    let (name, hex_digest) = value
        .split_once('=')
        .ok_or_else(|| IngestError::InvalidSignature("expected <algo>=<hex>".to_string()))?;
    let alg = HmacAlg::from_name(name).ok_or_else(|| {
        IngestError::InvalidSignature(format!("unsupported digest algorithm {name:?}"))
    })?;
    let digest = hex::decode(hex_digest)
        .map_err(|_| IngestError::InvalidSignature("signature is not valid hex".to_string()))?;
    Ok((alg, digest))
}

/// Recompute the HMAC over `body` and compare it to `signature` in constant
/// time.
pub(crate) fn verify(
    alg: HmacAlg,
    token: &str,
    body: &[u8],
    signature: &[u8],
) -> Result<(), IngestError> {
    let matches: bool = compute(alg, token, body).ct_eq(signature).into();
    if matches {
        Ok(())
    } else {
        Err(IngestError::InvalidSignature(
            "signature does not match body".to_string(),
        ))
    }
}

pub(crate) fn compute(alg: HmacAlg, token: &str, body: &[u8]) -> Vec<u8> {
    // An HMAC key of any length is valid, so new_from_slice cannot fail.
    match alg {
        HmacAlg::Sha1 => {
            let mut mac = Hmac::<Sha1>::new_from_slice(token.as_bytes())
                .expect("HMAC accepts keys of any length");
            mac.update(body);
            mac.finalize().into_bytes().to_vec()
        }
        HmacAlg::Sha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(token.as_bytes())
                .expect("HMAC accepts keys of any length");
            mac.update(body);
            mac.finalize().into_bytes().to_vec()
        }
        HmacAlg::Sha512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(token.as_bytes())
                .expect("HMAC accepts keys of any length");
            mac.update(body);
            mac.finalize().into_bytes().to_vec()
        }
    }
}

/// Constant-time equality for shared-secret header checks.
pub(crate) fn tokens_match(expected: &str, presented: &str) -> bool {
    expected.as_bytes().ct_eq(presented.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign_sha256(token: &str, body: &[u8]) -> String {
        format!("sha256={}", hex::encode(compute(HmacAlg::Sha256, token, body)))
    }

    #[test]
    fn round_trip_all_algorithms() {
        let body = b"payload";
        for (name, alg) in [
            ("sha1", HmacAlg::Sha1),
            ("sha256", HmacAlg::Sha256),
            ("sha512", HmacAlg::Sha512),
        ] {
            let digest = compute(alg, "tok", body);
            let header = format!("{name}={}", hex::encode(&digest));
            let (parsed_alg, parsed_digest) = parse_header(&header).unwrap();
            assert_eq!(parsed_alg, alg);
            assert!(verify(parsed_alg, "tok", body, &parsed_digest).is_ok());
        }
    }

    #[test]
    fn single_byte_mutation_rejects() {
        let body = b"payload";
        let (alg, digest) = parse_header(&sign_sha256("tok", body)).unwrap();
        assert!(verify(alg, "tok", b"paylo4d", &digest).is_err());
        assert!(verify(alg, "t0k", body, &digest).is_err());
    }

    #[test]
    fn malformed_headers_rejected() {
        assert!(parse_header("sha256").is_err());
        assert!(parse_header("md5=abcd").is_err());
        assert!(parse_header("sha256=zz").is_err());
    }

    #[test]
    fn token_comparison() {
        assert!(tokens_match("secret", "secret"));
        assert!(!tokens_match("secret", "Secret"));
        assert!(!tokens_match("secret", "secret "));
    }
}
