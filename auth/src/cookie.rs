//! HMAC-signed session cookie: `base64(username|issued_at_unix_secs)` plus a
//! detached tag, accepted in lieu of Basic auth for the cookie's lifetime
//! (spec §4.1).

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &[u8], payload: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

pub fn sign(secret: &[u8], username: &str, issued_at: DateTime<Utc>) -> String {
    let payload = format!("{username}|{}", issued_at.timestamp());
    let tag = mac_for(secret, &payload);
    format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(payload.as_bytes()),
        URL_SAFE_NO_PAD.encode(tag)
    )
}

/// Verifies the signature and the age against `max_age_secs`, returning the
/// bound username on success.
pub fn verify(secret: &[u8], cookie: &str, now: DateTime<Utc>, max_age_secs: i64) -> Option<String> {
    let (payload_b64, tag_b64) = cookie.split_once('.')?;
    let payload_bytes = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
    let payload = String::from_utf8(payload_bytes).ok()?;
    let given_tag = URL_SAFE_NO_PAD.decode(tag_b64).ok()?;

    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    mac.verify_slice(&given_tag).ok()?;

    let (username, issued_at_str) = payload.rsplit_once('|')?;
    let issued_at: i64 = issued_at_str.parse().ok()?;
    if now.timestamp() - issued_at > max_age_secs {
        return None;
    }
    Some(username.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_within_ttl() {
        let secret = b"a-process-wide-signing-key";
        let now = Utc::now();
        let cookie = sign(secret, "alice", now);
        assert_eq!(verify(secret, &cookie, now, 900), Some("alice".to_string()));
    }

    #[test]
    fn rejects_expired_cookie() {
        let secret = b"a-process-wide-signing-key";
        let issued = Utc::now() - chrono::Duration::seconds(1000);
        let cookie = sign(secret, "alice", issued);
        assert_eq!(verify(secret, &cookie, Utc::now(), 900), None);
    }

    #[test]
    fn rejects_tampered_cookie() {
        let secret = b"a-process-wide-signing-key";
        let now = Utc::now();
        let mut cookie = sign(secret, "alice", now);
        cookie.push('x');
        assert_eq!(verify(secret, &cookie, now, 900), None);
    }

    #[test]
    fn rejects_wrong_secret() {
        let now = Utc::now();
        let cookie = sign(b"secret-one", "alice", now);
        assert_eq!(verify(b"secret-two", &cookie, now, 900), None);
    }
}
