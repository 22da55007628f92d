mod common;

use common::{config, global_state, policy, MockChain, MockPortfolio, MockRelay, RELAYS};
use rand::rngs::StdRng;
use rand::SeedableRng;
use solana_pumpfun_bundler::bundler::{SellRequest, Seller};
use solana_pumpfun_bundler::errors::BundlerError;
use solana_pumpfun_bundler::models::result::SubmissionPath;
use solana_pumpfun_bundler::models::strategy::{LaunchMode, SellMode};
use solana_pumpfun_bundler::models::wallet::{Wallet, WalletRole};
use solana_pumpfun_bundler::pump_instruction_builders::BondingCurveAccount;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use spl_associated_token_account::get_associated_token_address;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct Harness {
    chain: Arc<MockChain>,
    relay: Arc<MockRelay>,
    portfolio: Arc<MockPortfolio>,
    kill_switch: Arc<AtomicBool>,
    seller: Seller,
    wallets: Vec<Wallet>,
    mint: Pubkey,
}

/// Wallet `i` holds `balances[i]` tokens of a fresh mint on a live curve.
fn harness(relay: MockRelay, balances: &[u64]) -> Harness {
    let mint = Pubkey::new_unique();
    let mut curve = BondingCurveAccount::initial(&global_state(), Pubkey::new_unique());
    curve.apply_buy(5_000_000_000, 150_000_000_000_000);
    let chain = Arc::new(MockChain::with_global_state().with_curve(&curve));

    let wallets: Vec<Wallet> = (0..balances.len())
        .map(|i| Wallet::new(format!("bundler-{}", i + 1), WalletRole::Bundler, Keypair::new()))
        .collect();
    for (wallet, balance) in wallets.iter().zip(balances) {
        chain
            .token_balances
            .lock()
            .unwrap()
            .insert(get_associated_token_address(&wallet.pubkey(), &mint), *balance);
    }

    let relay = Arc::new(relay);
    let portfolio = Arc::new(MockPortfolio::default());
    let kill_switch = Arc::new(AtomicBool::new(false));
    let seller = Seller::new(
        chain.clone(),
        relay.clone(),
        portfolio.clone(),
        policy(true),
        config(),
        kill_switch.clone(),
    );
    Harness {
        chain,
        relay,
        portfolio,
        kill_switch,
        seller,
        wallets,
        mint,
    }
}

fn request(mint: Pubkey, percent: u8, mode: SellMode) -> SellRequest {
    SellRequest {
        mint,
        percent,
        mode,
        slippage_bps: 500,
        launch_mode: LaunchMode::Classic,
    }
}

#[tokio::test]
async fn regular_sell_reports_every_wallet_and_skips_empty_ones() {
    let h = harness(MockRelay::accepting(), &[1_000_000_000, 0, 2_000_000_000]);
    let mut rng = StdRng::seed_from_u64(1);

    let result = h
        .seller
        .sell(&request(h.mint, 50, SellMode::Regular), &h.wallets, &mut rng)
        .await
        .unwrap();

    assert_eq!(result.transactions.len(), 3);
    assert!(result.transactions[0].success);
    assert_eq!(result.transactions[0].token_amount, 500_000_000);
    assert_eq!(result.transactions[0].path, SubmissionPath::Individual);
    assert!(!result.transactions[1].success);
    assert_eq!(result.transactions[1].path, SubmissionPath::NotSubmitted);
    assert_eq!(result.transactions[2].token_amount, 1_000_000_000);
    assert!((result.success_rate - 2.0 / 3.0).abs() < 1e-9);

    assert_eq!(h.relay.call_count(), 0);
    assert_eq!(h.chain.sent_count(), 2);
    assert_eq!(h.portfolio.sells.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn jito_batch_sells_go_out_as_bundles() {
    let h = harness(MockRelay::accepting(), &[1_000_000; 6]);
    let mut rng = StdRng::seed_from_u64(2);

    let result = h
        .seller
        .sell(&request(h.mint, 100, SellMode::JitoBatch), &h.wallets, &mut rng)
        .await
        .unwrap();

    assert_eq!(result.transactions.len(), 6);
    assert!(result
        .transactions
        .iter()
        .all(|t| t.success && matches!(t.path, SubmissionPath::AtomicBundle { .. })));
    // Groups of four plus a tip each.
    assert_eq!(h.relay.bundle_sizes(), vec![5, 3]);
}

#[tokio::test]
async fn refused_sell_bundles_fall_back_to_individual_sends() {
    let h = harness(MockRelay::failing(&RELAYS), &[1_000_000; 3]);
    let mut rng = StdRng::seed_from_u64(3);

    let result = h
        .seller
        .sell(&request(h.mint, 100, SellMode::JitoBatch), &h.wallets, &mut rng)
        .await
        .unwrap();

    assert_eq!(result.transactions.len(), 3);
    assert!(result
        .transactions
        .iter()
        .all(|t| t.success && t.path == SubmissionPath::Individual));
}

#[tokio::test]
async fn small_batch_sells_every_wallet() {
    let h = harness(MockRelay::accepting(), &[1_000_000_000; 5]);
    let mut rng = StdRng::seed_from_u64(4);

    let result = h
        .seller
        .sell(&request(h.mint, 100, SellMode::SmallBatch), &h.wallets, &mut rng)
        .await
        .unwrap();

    assert_eq!(result.transactions.len(), 5);
    assert_eq!(result.success_rate, 1.0);
    assert_eq!(h.chain.sent_count(), 5);
}

#[tokio::test]
async fn kill_switch_stops_sells_before_submission() {
    let h = harness(MockRelay::accepting(), &[1_000; 2]);
    h.kill_switch.store(true, Ordering::SeqCst);
    let mut rng = StdRng::seed_from_u64(5);

    let result = h
        .seller
        .sell(&request(h.mint, 100, SellMode::JitoBatch), &h.wallets, &mut rng)
        .await;

    assert!(matches!(result, Err(BundlerError::Aborted(_))));
    assert_eq!(h.relay.call_count(), 0);
    assert_eq!(h.chain.sent_count(), 0);
}

#[tokio::test]
async fn out_of_range_percentage_is_rejected() {
    let h = harness(MockRelay::accepting(), &[1_000]);
    let mut rng = StdRng::seed_from_u64(6);
    for percent in [0, 101] {
        let result = h
            .seller
            .sell(&request(h.mint, percent, SellMode::Regular), &h.wallets, &mut rng)
            .await;
        assert!(matches!(result, Err(BundlerError::Config(_))));
    }
}
