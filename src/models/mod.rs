pub mod api;
pub mod result;
pub mod strategy;
pub mod token;
pub mod wallet;

pub use result::{BundleResult, Confirmation, SellResult, SubmissionPath, TransactionResult};
pub use strategy::{Allocation, DistributionStrategy, LaunchMode, SellMode, StealthMode};
pub use token::TokenMetadata;
pub use wallet::{Wallet, WalletRole};

/// Launch progress, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LaunchState {
    Created,
    Funded,
    LutReady,
    BuysBuilt,
    Submitted,
    Reconciled,
}
