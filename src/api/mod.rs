pub mod jito;
pub mod pumpfun;

pub use jito::{BundleRelay, BundleStatus, JitoRelayClient};
pub use pumpfun::{MetadataUploader, PumpIpfsUploader};
