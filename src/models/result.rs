use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SubmissionPath {
    AtomicBundle { bundle_id: String },
    Individual,
    /// Relays exhausted; sent one by one outside any bundle.
    SequentialFallback,
    /// Never sent (build or funding failure).
    NotSubmitted,
}

/// How a success was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    /// Observed through a status query.
    Confirmed,
    /// Assumed after the bounded wait because no status query was possible.
    Probabilistic,
    Unconfirmed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionResult {
    pub wallet: Option<String>,
    pub success: bool,
    pub signature: Option<String>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub confirmation_ms: Option<u64>,
    pub path: SubmissionPath,
    pub confirmation: Confirmation,
    /// SOL side of the trade in lamports (spent on buys, minimum received on sells).
    pub lamports: u64,
    /// Token side of the trade in base units.
    pub token_amount: u64,
}

impl TransactionResult {
    pub fn failure(wallet: Option<String>, path: SubmissionPath, error: impl Into<String>) -> Self {
        Self {
            wallet,
            success: false,
            signature: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
            confirmation_ms: None,
            path,
            confirmation: Confirmation::Unconfirmed,
            lamports: 0,
            token_amount: 0,
        }
    }

    pub fn with_amounts(mut self, lamports: u64, token_amount: u64) -> Self {
        self.lamports = lamports;
        self.token_amount = token_amount;
        self
    }
}

fn success_stats(results: &[TransactionResult]) -> (f64, Option<f64>) {
    if results.is_empty() {
        return (0.0, None);
    }
    let successes = results.iter().filter(|r| r.success).count();
    let latencies: Vec<u64> = results
        .iter()
        .filter(|r| r.success)
        .filter_map(|r| r.confirmation_ms)
        .collect();
    let average = if latencies.is_empty() {
        None
    } else {
        Some(latencies.iter().sum::<u64>() as f64 / latencies.len() as f64)
    };
    (successes as f64 / results.len() as f64, average)
}

/// Aggregate of one launch. `transactions` holds exactly one entry per wallet
/// that was assigned a buy; the creation transaction is reported separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleResult {
    pub mint: String,
    pub creation: TransactionResult,
    pub transactions: Vec<TransactionResult>,
    pub success_rate: f64,
    pub average_confirmation_ms: Option<f64>,
    pub degraded: bool,
    pub recording_errors: Vec<String>,
    pub wallet_file: Option<PathBuf>,
    pub lookup_table: Option<String>,
}

impl BundleResult {
    pub fn reconcile(mint: String, creation: TransactionResult, transactions: Vec<TransactionResult>) -> Self {
        let (success_rate, average_confirmation_ms) = success_stats(&transactions);
        let degraded = transactions
            .iter()
            .any(|t| t.path == SubmissionPath::SequentialFallback);
        Self {
            mint,
            creation,
            transactions,
            success_rate,
            average_confirmation_ms,
            degraded,
            recording_errors: Vec::new(),
            wallet_file: None,
            lookup_table: None,
        }
    }

    pub fn successes(&self) -> usize {
        self.transactions.iter().filter(|t| t.success).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellResult {
    pub mint: String,
    pub transactions: Vec<TransactionResult>,
    pub success_rate: f64,
    pub average_confirmation_ms: Option<f64>,
    pub recording_errors: Vec<String>,
}

impl SellResult {
    pub fn reconcile(mint: String, transactions: Vec<TransactionResult>) -> Self {
        let (success_rate, average_confirmation_ms) = success_stats(&transactions);
        Self {
            mint,
            transactions,
            success_rate,
            average_confirmation_ms,
            recording_errors: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(ms: u64) -> TransactionResult {
        TransactionResult {
            success: true,
            signature: Some("sig".into()),
            error: None,
            confirmation_ms: Some(ms),
            confirmation: Confirmation::Confirmed,
            ..TransactionResult::failure(Some("w".into()), SubmissionPath::Individual, "")
        }
    }

    #[test]
    fn success_rate_counts_every_entry() {
        let creation = ok(10);
        let txs = vec![
            ok(100),
            ok(300),
            TransactionResult::failure(Some("x".into()), SubmissionPath::SequentialFallback, "dropped"),
            TransactionResult::failure(Some("y".into()), SubmissionPath::NotSubmitted, "no funds"),
        ];
        let result = BundleResult::reconcile("mint".into(), creation, txs);
        assert_eq!(result.transactions.len(), 4);
        assert_eq!(result.successes(), 2);
        assert!((result.success_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(result.average_confirmation_ms, Some(200.0));
        assert!(result.degraded);
    }

    #[test]
    fn empty_run_has_zero_rate() {
        let result = SellResult::reconcile("mint".into(), Vec::new());
        assert_eq!(result.success_rate, 0.0);
        assert_eq!(result.average_confirmation_ms, None);
    }
}
