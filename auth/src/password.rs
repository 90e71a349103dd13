//! Salted PBKDF2-HMAC-SHA256 password verification. The original verified
//! passwords via bcrypt inside a Flask-JWT extension; this keeps the same
//! salted-digest-plus-constant-time-compare shape with crates native to
//! this stack.

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

const ROUNDS: u32 = 200_000;
const KEY_LEN: usize = 32;
const SALT_LEN: usize = 16;

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

pub fn generate_salt() -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    hex_encode(&salt)
}

fn digest(password: &str, salt_hex: &str) -> Option<[u8; KEY_LEN]> {
    let salt = hex_decode(salt_hex)?;
    let mut out = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, ROUNDS, &mut out);
    Some(out)
}

pub fn derive_verifier(password: &str, salt_hex: &str) -> String {
    let out = digest(password, salt_hex).expect("salt produced by generate_salt is always valid hex");
    hex_encode(&out)
}

pub fn verify_password(password: &str, salt_hex: &str, expected_verifier_hex: &str) -> bool {
    let Some(computed) = digest(password, salt_hex) else {
        return false;
    };
    let Some(expected) = hex_decode(expected_verifier_hex) else {
        return false;
    };
    if expected.len() != computed.len() {
        return false;
    }
    computed.ct_eq(&expected).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let salt = generate_salt();
        let verifier = derive_verifier("hunter2", &salt);
        assert!(verify_password("hunter2", &salt, &verifier));
        assert!(!verify_password("wrong", &salt, &verifier));
    }

    #[test]
    fn distinct_salts_yield_distinct_verifiers() {
        let a = generate_salt();
        let b = generate_salt();
        assert_ne!(derive_verifier("same", &a), derive_verifier("same", &b));
    }
}
