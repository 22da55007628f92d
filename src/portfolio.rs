use crate::errors::{BundlerError, Result};
use crate::pump_instruction_builders::TOKEN_DECIMALS;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub wallet: String,
    pub mint: String,
    pub side: TradeSide,
    pub token_amount: u64,
    pub lamports: u64,
    pub signature: Option<String>,
    /// Lamports per whole token, from the executed amounts.
    pub price_lamports_per_token: f64,
    pub timestamp: DateTime<Utc>,
}

impl TradeRecord {
    pub fn new(
        wallet: impl Into<String>,
        mint: impl Into<String>,
        side: TradeSide,
        token_amount: u64,
        lamports: u64,
        signature: Option<String>,
    ) -> Self {
        Self {
            wallet: wallet.into(),
            mint: mint.into(),
            side,
            token_amount,
            lamports,
            signature,
            price_lamports_per_token: execution_price(lamports, token_amount),
            timestamp: Utc::now(),
        }
    }
}

/// Lamports per whole token; 0 when no tokens moved.
pub fn execution_price(lamports: u64, token_amount: u64) -> f64 {
    if token_amount == 0 {
        return 0.0;
    }
    lamports as f64 * 10f64.powi(TOKEN_DECIMALS as i32) / token_amount as f64
}

#[async_trait]
pub trait PortfolioRecorder: Send + Sync {
    async fn record_buy(&self, record: TradeRecord) -> Result<()>;
    async fn record_sell(&self, record: TradeRecord) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PortfolioFile {
    trades: Vec<TradeRecord>,
}

/// Appends trades to a JSON file.
pub struct JsonPortfolio {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonPortfolio {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn trades(&self) -> Result<Vec<TradeRecord>> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.trades)
    }

    async fn read(&self) -> Result<PortfolioFile> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(PortfolioFile::default()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                BundlerError::Serialization(format!("Portfolio file {} is corrupt: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PortfolioFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn append(&self, record: TradeRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = self.read().await?;
        debug!(
            "Recording {:?} of {} tokens for {} at {:.4} lamports/token",
            record.side, record.token_amount, record.wallet, record.price_lamports_per_token
        );
        file.trades.push(record);
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, serde_json::to_vec_pretty(&file)?).await?;
        Ok(())
    }
}

#[async_trait]
impl PortfolioRecorder for JsonPortfolio {
    async fn record_buy(&self, record: TradeRecord) -> Result<()> {
        self.append(record).await
    }

    async fn record_sell(&self, record: TradeRecord) -> Result<()> {
        self.append(record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_is_derived_from_amounts() {
        assert_eq!(execution_price(1_000_000_000, 32_258_064), 1_000_000_000f64 * 1e6 / 32_258_064f64);
        assert_ne!(execution_price(1, 2), execution_price(1, 3));
        assert_eq!(execution_price(5, 0), 0.0);
    }

    #[tokio::test]
    async fn json_portfolio_appends() {
        let dir = tempfile::tempdir().unwrap();
        let portfolio = JsonPortfolio::new(dir.path().join("p.json"));
        portfolio
            .record_buy(TradeRecord::new("w1", "m", TradeSide::Buy, 100, 10, Some("s1".into())))
            .await
            .unwrap();
        portfolio
            .record_sell(TradeRecord::new("w1", "m", TradeSide::Sell, 50, 6, None))
            .await
            .unwrap();
        let trades = portfolio.trades().await.unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[1].side, TradeSide::Sell);
        assert_eq!(trades[0].price_lamports_per_token, 100_000.0);
    }
}
