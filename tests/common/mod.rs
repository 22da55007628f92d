#![allow(dead_code)]

pub use solana_pumpfun_bundler::test_support::{
    global_state, MockChain, MockPortfolio, MockRelay, MockUploader,
};

use solana_pumpfun_bundler::bundler::relay::{FallbackPolicy, SubmissionStrategy};
use solana_pumpfun_bundler::bundler::stealth::StealthTiming;
use solana_pumpfun_bundler::bundler::OrchestratorConfig;
use solana_pumpfun_bundler::chain::ConfirmTiming;
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;

pub const RELAYS: [&str; 3] = ["https://relay-a.test", "https://relay-b.test", "https://relay-c.test"];

pub fn policy(sequential: bool) -> FallbackPolicy {
    let mut strategies: Vec<SubmissionStrategy> = RELAYS
        .iter()
        .map(|url| SubmissionStrategy::Relay {
            url: url.to_string(),
            timeout: Duration::from_millis(200),
        })
        .collect();
    if sequential {
        strategies.push(SubmissionStrategy::Sequential { stagger: Duration::ZERO });
    }
    FallbackPolicy::new(strategies)
}

pub fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        tip_lamports: 1_000_000,
        tip_accounts: vec![Pubkey::new_unique(), Pubkey::new_unique()],
        funding_buffer_lamports: 3_000_000,
        max_trades_per_tx: 3,
        priority_fee_micro_lamports: 1_000,
        confirm: ConfirmTiming {
            window: Duration::from_millis(100),
            poll: Duration::from_millis(5),
        },
        stealth_timing: StealthTiming::immediate(),
        individual_retries: 0,
    }
}
