//! sr25519 test accounts.
//!
//! Every test works with freshly derived users (`//testUser_<uuid>`) so that
//! only the sudo account is shared between concurrently running tests.

use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use subxt::utils::AccountId32;
use subxt_signer::{sr25519::Keypair, SecretUri};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Clone)]
pub struct TestAccount {
    name: String,
    uri: String,
    keypair: Keypair,
}

impl TestAccount {
    /// Derive an account from a secret URI such as `//Alice` or a mnemonic
    /// with a derivation path.
    pub fn from_uri(name: impl Into<String>, uri: &str) -> Result<Self> {
        let secret = SecretUri::from_str(uri)
            .map_err(|e| Error::Config(format!("invalid secret uri for account: {e}")))?;
        let keypair = Keypair::from_uri(&secret)
            .map_err(|e| Error::Config(format!("cannot derive key pair: {e}")))?;
        Ok(Self {
            name: name.into(),
            uri: uri.to_string(),
            keypair,
        })
    }

    /// A new account nobody else uses.
    pub fn random() -> Result<Self> {
        let id = Uuid::new_v4();
        Self::from_uri(format!("testUser_{id}"), &format!("//testUser_{id}"))
    }

    pub fn alice() -> Self {
        Self::dev("Alice", subxt_signer::sr25519::dev::alice())
    }

    pub fn bob() -> Self {
        Self::dev("Bob", subxt_signer::sr25519::dev::bob())
    }

    pub fn charlie() -> Self {
        Self::dev("Charlie", subxt_signer::sr25519::dev::charlie())
    }

    pub fn dave() -> Self {
        Self::dev("Dave", subxt_signer::sr25519::dev::dave())
    }

    pub fn eve() -> Self {
        Self::dev("Eve", subxt_signer::sr25519::dev::eve())
    }

    pub fn ferdie() -> Self {
        Self::dev("Ferdie", subxt_signer::sr25519::dev::ferdie())
    }

    fn dev(name: &str, keypair: Keypair) -> Self {
        Self {
            name: name.to_string(),
            uri: format!("//{name}"),
            keypair,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn account_id(&self) -> AccountId32 {
        self.keypair.public_key().to_account_id()
    }

    /// SS58 address.
    pub fn address(&self) -> String {
        self.account_id().to_string()
    }

    /// Write `{name, uri, address}` to `<dir>/<name>.json` and return the path.
    pub fn export_json(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", self.name));
        let file = KeyFile {
            name: self.name.clone(),
            uri: self.uri.clone(),
            address: self.address(),
            public_key: format!("0x{}", hex::encode(self.keypair.public_key().0)),
        };
        fs::write(&path, serde_json::to_vec_pretty(&file)?)?;
        debug!(name = %self.name, path = %path.display(), "exported key pair");
        Ok(path)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let file: KeyFile = serde_json::from_slice(&fs::read(path.as_ref())?)?;
        let account = Self::from_uri(file.name, &file.uri)?;
        if account.address() != file.address {
            return Err(Error::Config(format!(
                "key file {} address {} does not match its uri",
                path.as_ref().display(),
                file.address
            )));
        }
        Ok(account)
    }
}

impl std::fmt::Debug for TestAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestAccount")
            .field("name", &self.name)
            .field("address", &self.address())
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct KeyFile {
    name: String,
    uri: String,
    address: String,
    public_key: String,
}
