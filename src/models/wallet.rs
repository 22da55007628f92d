use serde::{Deserialize, Serialize};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletRole {
    Main,
    Bundler,
}

/// An ephemeral signing identity. The keypair is shared, never copied out.
#[derive(Clone)]
pub struct Wallet {
    pub name: String,
    pub role: WalletRole,
    keypair: Arc<Keypair>,
}

impl Wallet {
    pub fn new(name: impl Into<String>, role: WalletRole, keypair: Keypair) -> Self {
        Self {
            name: name.into(),
            role,
            keypair: Arc::new(keypair),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub(crate) fn to_entry(&self) -> WalletInfo {
        WalletInfo {
            name: Some(self.name.clone()),
            public_key: self.pubkey().to_string(),
            private_key: bs58::encode(self.keypair.to_bytes()).into_string(),
        }
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("pubkey", &self.pubkey())
            .finish_non_exhaustive()
    }
}

/// On-disk wallet file: `{ "wallets": [ { name, public_key, private_key } ] }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletKeys {
    pub wallets: Vec<WalletInfo>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct WalletInfo {
    #[serde(default)]
    pub name: Option<String>,
    pub public_key: String,
    pub private_key: String,
}

impl fmt::Debug for WalletInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletInfo")
            .field("name", &self.name)
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}
