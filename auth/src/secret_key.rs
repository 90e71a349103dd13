//! Session-signing-key resolution, grounded on
//! `original_source/cc-agency/cc_agency/broker/jwt_token.py::get_jwt_secret_key`:
//! prefer a configured key, else reuse one persisted on disk, else generate
//! and persist a fresh one. Unlike the original's unconditional
//! `/tmp/cc_jwt_secret`, the path is configurable and the file is written
//! `0640` before any key material touches it.

use std::fs;
use std::io;
use std::path::Path;

use rand::RngCore;

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o640))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

fn generate_key() -> Vec<u8> {
    let mut key = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

/// Resolves the session-signing key: a configured value always wins; absent
/// that, an existing key file is reused so restarts don't invalidate live
/// sessions; absent that, a fresh key is generated and persisted.
pub fn resolve_session_secret(configured: Option<&str>, key_path: &Path) -> io::Result<Vec<u8>> {
    if let Some(k) = configured {
        return Ok(k.as_bytes().to_vec());
    }

    match fs::read(key_path) {
        Ok(bytes) if !bytes.is_empty() => Ok(bytes),
        _ => {
            let key = generate_key();
            fs::write(key_path, &key)?;
            restrict_permissions(key_path)?;
            Ok(key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("agency-auth-test-{}-{name}", std::process::id()));
        p
    }

    #[test]
    fn configured_secret_wins() {
        let path = scratch_path("configured");
        let key = resolve_session_secret(Some("explicit-secret"), &path).unwrap();
        assert_eq!(key, b"explicit-secret");
        assert!(!path.exists());
    }

    #[test]
    fn generates_and_reuses_on_restart() {
        let path = scratch_path("reuse");
        let _ = std::fs::remove_file(&path);
        let first = resolve_session_secret(None, &path).unwrap();
        let second = resolve_session_secret(None, &path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(first, second);
    }
}
