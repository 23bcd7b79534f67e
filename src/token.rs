use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};

use crate::claims::IdentityClaims;
use crate::error::Error;

/// Verifies an ID token and extracts its claims.
///
/// HMAC-signed tokens are checked against the client secret; asymmetric ones
/// against the JWKS entry named by the header's `kid`. `iss`, `aud` and `exp`
/// are validated.
///
/// # Errors
///
/// Returns [`Error::IdToken`] if the header is malformed, no key matches, the
/// signature is invalid, or a registered claim fails validation.
pub fn verify_id_token(
    id_token: &str,
    keys: &JwkSet,
    client_secret: &str,
    expected_issuer: &str,
    expected_audience: &str,
) -> Result<IdentityClaims, Error> {
    let header =
        jsonwebtoken::decode_header(id_token).map_err(|e| Error::IdToken(e.to_string()))?;

    let key = match header.alg {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            DecodingKey::from_secret(client_secret.as_bytes())
        }
        _ => {
            let kid = header
                .kid
                .as_deref()
                .ok_or_else(|| Error::IdToken("missing header: kid".into()))?;
            let jwk = keys
                .find(kid)
                .ok_or_else(|| Error::IdToken(format!("unknown signing key: {kid}")))?;
            DecodingKey::from_jwk(jwk).map_err(|e| Error::IdToken(e.to_string()))?
        }
    };

    let mut validation = Validation::new(header.alg);
    validation.set_issuer(&[expected_issuer]);
    validation.set_audience(&[expected_audience]);

    jsonwebtoken::decode::<IdentityClaims>(id_token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| Error::IdToken(e.to_string()))
}
