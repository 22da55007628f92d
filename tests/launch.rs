mod common;

use common::{config, global_state, policy, MockChain, MockPortfolio, MockRelay, MockUploader, RELAYS};
use rand::rngs::StdRng;
use rand::SeedableRng;
use solana_pumpfun_bundler::bundler::{BundleOrchestrator, LaunchRequest};
use solana_pumpfun_bundler::errors::BundlerError;
use solana_pumpfun_bundler::models::result::SubmissionPath;
use solana_pumpfun_bundler::models::strategy::{DistributionStrategy, StealthMode};
use solana_pumpfun_bundler::models::token::TokenMetadata;
use solana_pumpfun_bundler::models::wallet::{Wallet, WalletRole};
use solana_pumpfun_bundler::models::LaunchState;
use solana_pumpfun_bundler::pump_instruction_builders::BondingCurveAccount;
use solana_pumpfun_bundler::wallet::KeypairPool;
use solana_sdk::native_token::LAMPORTS_PER_SOL;
use solana_sdk::signature::Keypair;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

struct Harness {
    chain: Arc<MockChain>,
    relay: Arc<MockRelay>,
    portfolio: Arc<MockPortfolio>,
    kill_switch: Arc<AtomicBool>,
    orchestrator: BundleOrchestrator,
}

fn harness(chain: MockChain, relay: MockRelay, sequential: bool) -> Harness {
    let chain = Arc::new(chain);
    let relay = Arc::new(relay);
    let portfolio = Arc::new(MockPortfolio::default());
    let kill_switch = Arc::new(AtomicBool::new(false));
    let main = Wallet::new("main", WalletRole::Main, Keypair::new());
    chain.fund(main.pubkey(), 1_000 * LAMPORTS_PER_SOL);
    let orchestrator = BundleOrchestrator::new(
        chain.clone(),
        relay.clone(),
        Arc::new(MockUploader::default()),
        portfolio.clone(),
        main,
        policy(sequential),
        config(),
        kill_switch.clone(),
    );
    Harness {
        chain,
        relay,
        portfolio,
        kill_switch,
        orchestrator,
    }
}

fn request(dir: &Path, wallets: usize, stealth: StealthMode) -> LaunchRequest {
    LaunchRequest {
        metadata: TokenMetadata::new("Test Token", "TEST", "integration launch"),
        wallet_count: wallets,
        total_buy_lamports: wallets as u64 * LAMPORTS_PER_SOL,
        dev_buy_lamports: LAMPORTS_PER_SOL / 2,
        strategy: DistributionStrategy {
            stealth,
            ..DistributionStrategy::default()
        },
        wallet_file: dir.join("wallets.json"),
    }
}

#[tokio::test]
async fn atomic_launch_reports_one_result_per_wallet() {
    let h = harness(MockChain::with_global_state(), MockRelay::accepting(), true);
    let dir = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(1);

    let result = h
        .orchestrator
        .launch(request(dir.path(), 7, StealthMode::None), &mut rng)
        .await
        .unwrap();

    assert!(result.creation.success);
    assert_eq!(result.transactions.len(), 7);
    for tx in &result.transactions {
        assert!(tx.success, "{:?}", tx.error);
        assert!(matches!(tx.path, SubmissionPath::AtomicBundle { .. }));
        assert_eq!(tx.lamports, LAMPORTS_PER_SOL);
        assert!(tx.token_amount > 0);
    }
    assert_eq!(result.success_rate, 1.0);
    assert!(!result.degraded);
    assert!(result.lookup_table.is_some());
    assert_eq!(h.orchestrator.state(), Some(LaunchState::Reconciled));

    // Results follow the wallet file order.
    let wallets = KeypairPool::open(result.wallet_file.clone().unwrap()).unwrap().load().unwrap();
    let listed: Vec<String> = wallets.iter().map(|w| w.pubkey().to_string()).collect();
    let reported: Vec<String> = result.transactions.iter().map(|t| t.wallet.clone().unwrap()).collect();
    assert_eq!(listed, reported);

    assert!(h.relay.bundle_sizes().iter().all(|n| *n <= 5));
    // Every wallet buy plus the dev buy.
    assert_eq!(h.portfolio.buys.lock().unwrap().len(), 8);
}

#[tokio::test]
async fn relays_down_fall_back_to_sequential_sends() {
    let h = harness(MockChain::with_global_state(), MockRelay::failing(&RELAYS), true);
    let dir = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(2);

    let result = h
        .orchestrator
        .launch(request(dir.path(), 5, StealthMode::None), &mut rng)
        .await
        .unwrap();

    assert!(result.degraded);
    assert_eq!(result.creation.path, SubmissionPath::SequentialFallback);
    assert_eq!(result.transactions.len(), 5);
    assert!(result
        .transactions
        .iter()
        .all(|t| t.success && t.path == SubmissionPath::SequentialFallback));
    // Every relay was tried, in order, for the single bundle.
    let urls: Vec<String> = h.relay.calls.lock().unwrap().iter().map(|c| c.0.clone()).collect();
    assert_eq!(urls, RELAYS.to_vec());
}

#[tokio::test]
async fn relays_down_without_sequential_fallback_fail_every_buy() {
    let h = harness(MockChain::with_global_state(), MockRelay::failing(&RELAYS), false);
    let dir = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(3);

    let result = h
        .orchestrator
        .launch(request(dir.path(), 4, StealthMode::None), &mut rng)
        .await
        .unwrap();

    assert!(!result.creation.success);
    assert_eq!(result.transactions.len(), 4);
    assert!(result.transactions.iter().all(|t| !t.success));
    assert_eq!(result.success_rate, 0.0);
    assert!(h.portfolio.buys.lock().unwrap().is_empty());
}

#[tokio::test]
async fn kill_switch_aborts_before_anything_is_sent() {
    let h = harness(MockChain::with_global_state(), MockRelay::accepting(), true);
    h.kill_switch.store(true, std::sync::atomic::Ordering::SeqCst);
    let dir = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(4);

    let result = h
        .orchestrator
        .launch(request(dir.path(), 3, StealthMode::None), &mut rng)
        .await;

    assert!(matches!(result, Err(BundlerError::Aborted(_))));
    assert_eq!(h.relay.call_count(), 0);
    assert_eq!(h.chain.sent_count(), 0);
    assert!(!dir.path().join("wallets.json").exists());
}

#[tokio::test]
async fn underfunded_main_wallet_is_a_config_error() {
    let chain = MockChain::with_global_state();
    let h = harness(chain, MockRelay::accepting(), true);
    let dir = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(5);
    let mut req = request(dir.path(), 3, StealthMode::None);
    req.total_buy_lamports = 2_000 * LAMPORTS_PER_SOL;

    let result = h.orchestrator.launch(req, &mut rng).await;
    assert!(matches!(result, Err(BundlerError::Config(_))));
    assert_eq!(h.chain.sent_count(), 0);
    assert!(h.orchestrator.state().is_none());
}

#[tokio::test]
async fn stealth_launch_spreads_buys_and_reports_every_wallet() {
    let curve = BondingCurveAccount::initial(&global_state(), solana_sdk::pubkey::Pubkey::new_unique());
    let h = harness(MockChain::with_global_state().with_curve(&curve), MockRelay::accepting(), true);
    let dir = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(6);

    let result = h
        .orchestrator
        .launch(request(dir.path(), 6, StealthMode::Medium), &mut rng)
        .await
        .unwrap();

    assert!(result.creation.success);
    assert_eq!(result.creation.path, SubmissionPath::Individual);
    assert_eq!(result.transactions.len(), 6);
    for tx in &result.transactions {
        assert!(tx.success, "{:?}", tx.error);
        assert!(matches!(
            tx.path,
            SubmissionPath::AtomicBundle { .. } | SubmissionPath::Individual
        ));
    }
    assert!(!result.degraded);
}

#[tokio::test]
async fn existing_wallet_file_is_never_overwritten() {
    let h = harness(MockChain::with_global_state(), MockRelay::accepting(), true);
    let dir = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(7);

    let first = h
        .orchestrator
        .launch(request(dir.path(), 3, StealthMode::None), &mut rng)
        .await
        .unwrap();
    let path = first.wallet_file.clone().unwrap();
    let before: Vec<String> = KeypairPool::open(&path)
        .unwrap()
        .load()
        .unwrap()
        .iter()
        .map(|w| w.pubkey().to_string())
        .collect();
    let sent = h.chain.sent_count();
    let bundles = h.relay.call_count();

    let second = h
        .orchestrator
        .launch(request(dir.path(), 2, StealthMode::None), &mut rng)
        .await;
    assert!(matches!(second, Err(BundlerError::Config(_))));
    assert_eq!(h.chain.sent_count(), sent);
    assert_eq!(h.relay.call_count(), bundles);

    let after: Vec<String> = KeypairPool::open(&path)
        .unwrap()
        .load()
        .unwrap()
        .iter()
        .map(|w| w.pubkey().to_string())
        .collect();
    assert_eq!(before.len(), 3);
    assert_eq!(before, after);
}

#[tokio::test]
async fn failure_after_funding_still_reports_every_wallet() {
    // No global state account: the launch cannot build creation once wallets are funded.
    let h = harness(MockChain::default(), MockRelay::accepting(), true);
    let dir = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(8);

    let result = h
        .orchestrator
        .launch(request(dir.path(), 4, StealthMode::None), &mut rng)
        .await
        .unwrap();

    assert!(!result.creation.success);
    assert_eq!(result.creation.path, SubmissionPath::NotSubmitted);
    assert_eq!(result.transactions.len(), 4);
    for tx in &result.transactions {
        assert!(!tx.success);
        assert_eq!(tx.path, SubmissionPath::NotSubmitted);
        assert!(tx.error.as_deref().unwrap().contains("after funding"));
    }
    assert_eq!(result.success_rate, 0.0);
    assert_eq!(h.relay.call_count(), 0);
    assert!(h.portfolio.buys.lock().unwrap().is_empty());

    // The funded wallets stay recoverable.
    let wallets = KeypairPool::open(result.wallet_file.unwrap()).unwrap().load().unwrap();
    assert_eq!(wallets.len(), 4);
}

#[tokio::test]
async fn partially_funded_launch_reports_mixed_outcomes() {
    // Second funding transaction (wallets 9 and 10) is rejected.
    let chain = MockChain::with_global_state().rejecting_sends(&[1]);
    let h = harness(chain, MockRelay::accepting(), true);
    let dir = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(9);

    let result = h
        .orchestrator
        .launch(request(dir.path(), 10, StealthMode::None), &mut rng)
        .await
        .unwrap();

    assert!(result.creation.success);
    assert_eq!(result.transactions.len(), 10);
    assert!(result.transactions[..8].iter().all(|t| t.success));
    for tx in &result.transactions[8..] {
        assert!(!tx.success);
        assert_eq!(tx.path, SubmissionPath::NotSubmitted);
        assert!(tx.error.as_deref().unwrap().contains("funding failed"));
    }
    assert!(result.success_rate > 0.0 && result.success_rate < 1.0);
    assert!((result.success_rate - 0.8).abs() < 1e-9);

    // Only landed buys are recorded, plus the dev buy.
    let buys = h.portfolio.buys.lock().unwrap();
    assert_eq!(buys.len(), 9);
    let landed: Vec<String> = result.transactions[..8].iter().map(|t| t.wallet.clone().unwrap()).collect();
    for failed in &result.transactions[8..] {
        let wallet = failed.wallet.clone().unwrap();
        assert!(!buys.iter().any(|b| b.wallet == wallet));
    }
    for wallet in landed {
        assert!(buys.iter().any(|b| b.wallet == wallet));
    }
}

#[tokio::test]
async fn kill_switch_after_submission_returns_result_without_recording() {
    let h = harness(MockChain::with_global_state(), MockRelay::accepting(), true);
    // The relay flips the switch as soon as it accepts the first bundle.
    *h.relay.trips.lock().unwrap() = Some(h.kill_switch.clone());
    let dir = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(10);

    let result = h
        .orchestrator
        .launch(request(dir.path(), 3, StealthMode::None), &mut rng)
        .await
        .unwrap();

    assert!(result.creation.success);
    assert_eq!(result.transactions.len(), 3);
    assert!(result.transactions.iter().all(|t| t.success));
    assert!(h.portfolio.buys.lock().unwrap().is_empty());
    assert_eq!(h.orchestrator.state(), Some(LaunchState::Reconciled));
}
