use thiserror::Error;
use solana_client::client_error::ClientError;
use solana_sdk::message::CompileError;
use solana_sdk::pubkey::ParsePubkeyError;
use solana_sdk::signature::SignerError;

#[derive(Error, Debug)]
pub enum BundlerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Network-level failure talking to the chain. Callers treat it as retryable.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Solana client error: {0}")]
    SolanaClient(#[from] ClientError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("BS58 decode error: {0}")]
    Bs58(#[from] bs58::decode::Error),

    #[error("Pubkey parse error: {0}")]
    PubkeyParse(#[from] ParsePubkeyError),

    #[error("Bonding curve state unavailable for {0}")]
    CurveStateUnavailable(String),

    #[error("Bonding curve for {0} is complete, trading moved off the curve")]
    CurveComplete(String),

    #[error("Calculation error: {0}")]
    Calculation(String),

    #[error("No active address lookup table, call create() first")]
    NoActiveTable,

    #[error("All relay endpoints exhausted: {0}")]
    AllRelaysExhausted(String),

    #[error("Relay error: {0}")]
    Relay(String),

    #[error("Transaction build error: {0}")]
    Build(String),

    #[error("Message compile error: {0}")]
    MessageCompile(#[from] CompileError),

    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),

    #[error("Metadata upload error: {0}")]
    Upload(String),

    #[error("Workflow aborted by kill switch before {0}")]
    Aborted(String),
}

pub type Result<T> = std::result::Result<T, BundlerError>;

impl From<std::io::Error> for BundlerError {
    fn from(err: std::io::Error) -> Self {
        BundlerError::Io(err.to_string())
    }
}

impl From<bincode::Error> for BundlerError {
    fn from(err: bincode::Error) -> Self {
        BundlerError::Serialization(err.to_string())
    }
}

impl BundlerError {
    /// Transient failures worth another attempt on a different endpoint.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BundlerError::Transport(_)
                | BundlerError::SolanaClient(_)
                | BundlerError::Http(_)
                | BundlerError::Relay(_)
        )
    }
}
