pub mod alt;
pub mod launch;
pub mod sell;
pub mod wallets;

pub use alt::{alt_command, AltArgs};
pub use launch::{launch_command, LaunchArgs};
pub use sell::{sell_command, SellArgs};
pub use wallets::{wallets_command, WalletsArgs};

use crate::bundler::confirmation_label;
use crate::chain::RpcChainConnection;
use crate::config::Settings;
use crate::errors::Result;
use crate::models::result::{SubmissionPath, TransactionResult};
use console::Style;
use log::warn;
use prettytable::{row, Table};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub(crate) fn connect(settings: &Settings) -> Result<Arc<RpcChainConnection>> {
    Ok(Arc::new(RpcChainConnection::new(
        &settings.rpc_urls,
        settings.commitment_config()?,
        Duration::from_secs(settings.rpc_timeout_secs),
        settings.rpc_max_attempts,
    )?))
}

/// Kill switch flipped by Ctrl-C. Steps check it before doing more work.
pub(crate) fn install_kill_switch() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handle = flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping after the current step");
            handle.store(true, Ordering::SeqCst);
        }
    });
    flag
}

pub(crate) fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn path_label(path: &SubmissionPath) -> String {
    match path {
        SubmissionPath::AtomicBundle { bundle_id } => format!("bundle {}", bundle_id),
        SubmissionPath::Individual => "individual".to_string(),
        SubmissionPath::SequentialFallback => "sequential (degraded)".to_string(),
        SubmissionPath::NotSubmitted => "not submitted".to_string(),
    }
}

pub(crate) fn print_results(results: &[TransactionResult]) {
    let ok = Style::new().green();
    let bad = Style::new().red();
    let mut table = Table::new();
    table.add_row(row!["Wallet", "Status", "Path", "Confirmation", "ms", "Signature / Error"]);
    for r in results {
        let status = if r.success {
            ok.apply_to("OK").to_string()
        } else {
            bad.apply_to("FAILED").to_string()
        };
        let detail = if r.success {
            r.signature.clone().unwrap_or_default()
        } else {
            r.error.clone().unwrap_or_default()
        };
        table.add_row(row![
            r.wallet.clone().unwrap_or_else(|| "-".to_string()),
            status,
            path_label(&r.path),
            confirmation_label(r.confirmation),
            r.confirmation_ms.map(|ms| ms.to_string()).unwrap_or_else(|| "-".to_string()),
            detail
        ]);
    }
    table.printstd();
}
