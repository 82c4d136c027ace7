use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{SessionToken, VaultError};

/// Token files are named `token.<host identity>`.
const TOKEN_FILE_PREFIX: &str = "token.";

/// Plain-text cache of Vault tokens, one file per remote host.
///
/// There is no locking: two processes saving at once may clobber each
/// other's token.
#[derive(Debug, Clone)]
pub struct TokenStore {
    dir: PathBuf,
}

impl TokenStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted in the bub configuration directory.
    pub fn default_location() -> anyhow::Result<Self> {
        Ok(Self::new(crate::config::Config::config_dir()?))
    }

    pub fn token_path(&self, host_identity: &str) -> PathBuf {
        // Host names never contain separators, but keep the file inside `dir` regardless.
        let name: String = host_identity
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.dir.join(format!("{}{}", TOKEN_FILE_PREFIX, name))
    }

    /// Load the cached token for a host. A missing or blank file is `None`.
    pub fn load(&self, host_identity: &str) -> io::Result<Option<SessionToken>> {
        let path = self.token_path(host_identity);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let value = contents.trim_end_matches(['\n', '\r']);
        if value.is_empty() {
            return Ok(None);
        }
        debug!(path = %path.display(), "Loaded cached Vault token");
        Ok(Some(SessionToken::new(value, host_identity)))
    }

    /// Save a token, replacing whatever was cached for its host.
    pub fn save(&self, token: &SessionToken) -> Result<(), VaultError> {
        let path = self.token_path(&token.owner_host_identity);
        let persistence = |source| VaultError::Persistence {
            path: path.clone(),
            source,
        };

        if token.value.is_empty() {
            return Err(persistence(io::Error::new(
                io::ErrorKind::InvalidInput,
                "refusing to cache an empty token",
            )));
        }

        create_private_dir(&self.dir).map_err(persistence)?;
        write_private_file(&path, token.value.as_bytes()).map_err(persistence)?;
        debug!(path = %path.display(), "Saved Vault token");
        Ok(())
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn write_private_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies on creation; tighten files left by older versions.
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(contents)
}
