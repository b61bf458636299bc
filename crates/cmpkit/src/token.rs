//! On-disk cache of session credentials.
//!
//! Each environment owns two files under the token directory:
//! `<env>.token` and `<env>.seckey`. Both are replaced atomically
//! (temp file + rename) and are readable by the owner only.

use crate::error::{Error, Result};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Session credentials for one environment.
///
/// An empty or absent token means "no session; issue one on next call".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub token: Option<String>,
    pub seckey: Option<String>,
}

impl Session {
    /// Create a session from a token and an optional signing key.
    pub fn new(token: impl Into<String>, seckey: Option<String>) -> Self {
        let token = token.into();
        Self {
            token: (!token.is_empty()).then_some(token),
            seckey: seckey.filter(|s| !s.is_empty()),
        }
    }

    /// A session with no credentials.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether there is no token.
    pub fn is_empty(&self) -> bool {
        self.token.is_none()
    }
}

/// Token cache rooted at a directory.
#[derive(Debug, Clone)]
pub struct TokenCache {
    dir: PathBuf,
}

impl TokenCache {
    /// Create a cache over a token directory (created on first write).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Token directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn token_path(&self, env: &str) -> PathBuf {
        self.dir.join(format!("{env}.token"))
    }

    fn seckey_path(&self, env: &str) -> PathBuf {
        self.dir.join(format!("{env}.seckey"))
    }

    /// Read the cached session. Missing files yield an empty session.
    pub fn read(&self, env: &str) -> Result<Session> {
        let token = read_optional(&self.token_path(env))?;
        let seckey = read_optional(&self.seckey_path(env))?;
        Ok(Session {
            token,
            seckey,
        })
    }

    /// Persist both files. An absent value is written as an empty file.
    pub fn write(&self, env: &str, token: Option<&str>, seckey: Option<&str>) -> Result<()> {
        self.ensure_dir()?;
        write_atomic(&self.dir, &self.token_path(env), token.unwrap_or(""))?;
        write_atomic(&self.dir, &self.seckey_path(env), seckey.unwrap_or(""))?;
        log::debug!("Saved session for {} in {}", env, self.dir.display());
        Ok(())
    }

    /// Persist a [`Session`].
    pub fn write_session(&self, env: &str, session: &Session) -> Result<()> {
        self.write(env, session.token.as_deref(), session.seckey.as_deref())
    }

    /// Remove the cached session.
    pub fn clear(&self, env: &str) -> Result<()> {
        for path in [self.token_path(env), self.seckey_path(env)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::io(&path, e)),
            }
        }
        log::debug!("Cleared session for {}", env);
        Ok(())
    }

    fn ensure_dir(&self) -> Result<()> {
        if self.dir.exists() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).map_err(|e| Error::io(&self.dir, e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.dir, fs::Permissions::from_mode(0o700))
                .map_err(|e| Error::io(&self.dir, e))?;
        }
        Ok(())
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let value = content.trim().to_string();
            Ok((!value.is_empty()).then_some(value))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(path, e)),
    }
}

fn write_atomic(dir: &Path, path: &Path, content: &str) -> Result<()> {
    // NamedTempFile is created with mode 0600 on unix
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| Error::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let cache = TokenCache::new(dir.path().join("tokens"));

        cache.write("dev", Some("tok-1"), Some("sec-1")).unwrap();
        let session = cache.read("dev").unwrap();
        assert_eq!(session, Session::new("tok-1", Some("sec-1".into())));
    }

    #[test]
    fn test_clear_then_read() {
        let dir = TempDir::new().unwrap();
        let cache = TokenCache::new(dir.path());

        cache.write("dev", Some("tok"), Some("sec")).unwrap();
        cache.clear("dev").unwrap();
        let session = cache.read("dev").unwrap();
        assert!(session.token.is_none());
        assert!(session.seckey.is_none());
    }

    #[test]
    fn test_missing_files_yield_empty_session() {
        let dir = TempDir::new().unwrap();
        let cache = TokenCache::new(dir.path().join("never-created"));
        assert!(cache.read("dev").unwrap().is_empty());
        cache.clear("dev").unwrap();
    }

    #[test]
    fn test_seckey_always_rewritten() {
        let dir = TempDir::new().unwrap();
        let cache = TokenCache::new(dir.path());

        cache.write("dev", Some("tok"), Some("old-key")).unwrap();
        cache.write("dev", Some("tok2"), None).unwrap();
        let session = cache.read("dev").unwrap();
        assert_eq!(session.token.as_deref(), Some("tok2"));
        assert!(session.seckey.is_none());
    }

    #[test]
    fn test_environments_are_isolated() {
        let dir = TempDir::new().unwrap();
        let cache = TokenCache::new(dir.path());
        cache.write("dev", Some("a"), None).unwrap();
        cache.write("prod", Some("b"), None).unwrap();
        assert_eq!(cache.read("dev").unwrap().token.as_deref(), Some("a"));
        assert_eq!(cache.read("prod").unwrap().token.as_deref(), Some("b"));
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let token_dir = dir.path().join("tokens");
        let cache = TokenCache::new(&token_dir);
        cache.write("dev", Some("t"), Some("s")).unwrap();

        let dir_mode = fs::metadata(&token_dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
        let file_mode = fs::metadata(token_dir.join("dev.token"))
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(file_mode, 0o600);
    }
}
