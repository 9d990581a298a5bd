use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::info;
use thiserror::Error;

use super::crypto::{CryptoError, KeyPair};
use crate::blockchain::StorageError;

pub const PUBLIC_KEY_FILE: &str = "publicKey.pem";
pub const PRIVATE_KEY_FILE: &str = "privateKey.pem";

/// Errors that can occur while persisting or loading key files
#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Locations of one party's key files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredKeyPaths {
    pub public_key: PathBuf,
    pub private_key: PathBuf,
}

/// Writes each party's key pair under `<root>/<party>/`
#[derive(Debug, Clone)]
pub struct KeyStore {
    root: PathBuf,
}

impl KeyStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        KeyStore { root: root.into() }
    }

    /// Directory holding `party`'s key files
    pub fn party_dir(&self, party: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(normalize_party_name(party)?))
    }

    /// Persists both halves of `pair` as PEM text
    ///
    /// The party directory may already exist; existing key files are
    /// replaced and the private key is left readable by its owner only.
    ///
    /// # Arguments
    ///
    /// * `party` - Party name, normalized into the directory name
    /// * `pair` - Key pair to write
    ///
    /// # Returns
    ///
    /// Where the two PEM files were written
    pub fn save_key_pair(&self, party: &str, pair: &KeyPair) -> Result<StoredKeyPaths, KeyStoreError> {
        let dir = self.party_dir(party)?;
        fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;

        let paths = StoredKeyPaths {
            public_key: dir.join(PUBLIC_KEY_FILE),
            private_key: dir.join(PRIVATE_KEY_FILE),
        };

        write_key_file(&paths.public_key, &pair.public_key_pem()?, false)?;
        info!("Key saved to: {}", paths.public_key.display());
        write_key_file(&paths.private_key, &pair.private_key_pem()?, true)?;
        info!("Key saved to: {}", paths.private_key.display());

        Ok(paths)
    }

}

/// Lower-cases a party name and rejects anything that is not a plain
/// directory name
pub fn normalize_party_name(party: &str) -> Result<String, StorageError> {
    let name = party.trim().to_lowercase();

    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(|c: char| c == '/' || c == '\\' || c == '\0')
    {
        return Err(StorageError::InvalidPartyName(party.to_string()));
    }

    Ok(name)
}

fn write_key_file(path: &Path, contents: &str, private: bool) -> Result<(), StorageError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    if private {
        owner_only_on_create(&mut options);
    }

    options
        .open(path)
        .and_then(|mut file| file.write_all(contents.as_bytes()))
        .map_err(|e| StorageError::io(path, e))?;

    // the creation mode is ignored when the file already existed
    if private {
        restrict_to_owner(path).map_err(|e| StorageError::io(path, e))?;
    }
    Ok(())
}

#[cfg(unix)]
fn owner_only_on_create(options: &mut OpenOptions) {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(0o600);
}

#[cfg(not(unix))]
fn owner_only_on_create(_options: &mut OpenOptions) {}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) -> io::Result<()> {
    Ok(())
}
