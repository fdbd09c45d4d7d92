//! Bearer-token validation for SSE and WebSocket handshakes.
//!
//! Browsers cannot set headers on EventSource or WebSocket connections, so
//! the token rides in the `token` query parameter. It is an HS256 JWT issued
//! by the surrounding system; the fabric validates it once at handshake time
//! and discards it.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use mh_protocol::Claims;

/// Validate a handshake token. Returns the claims when the signature checks
/// out and the token has not expired.
pub fn verify_token(token: &str, secret: &str) -> Option<Claims> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    decode::<Claims>(token, &key, &Validation::new(Algorithm::HS256))
        .map(|data| data.claims)
        .ok()
}

/// Issue a token for `user_id`/`username`, valid for `ttl_secs` from now.
///
/// The fabric itself never issues tokens in production; this exists for the
/// CLI tooling and the test suites.
pub fn issue_token(user_id: &str, username: &str, ttl_secs: i64, secret: &str) -> String {
    let claims = Claims {
        sub: user_id.to_owned(),
        username: username.to_owned(),
        exp: usize::try_from(chrono::Utc::now().timestamp() + ttl_secs).unwrap_or(0),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("HS256 encoding cannot fail for serializable claims")
}
