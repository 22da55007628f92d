use crate::chain::ChainConnection;
use crate::errors::{BundlerError, Result};
use crate::models::strategy::{LaunchMode, BPS_DENOMINATOR};
use crate::models::token::TokenMetadata;
use crate::models::wallet::Wallet;
use crate::portfolio::TradeSide;
use crate::pump_instruction_builders::{
    apply_slippage_floor, build_pump_buy_instruction, build_pump_create_instruction,
    build_pump_extend_account_instruction, build_pump_sell_instruction, calculate_sol_out, calculate_tokens_out,
    find_bonding_curve_pda, BondingCurveAccount, GlobalState, GLOBAL_STATE_PUBKEY,
};
use log::{debug, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use solana_sdk::{
    address_lookup_table::AddressLookupTableAccount,
    compute_budget::ComputeBudgetInstruction,
    hash::Hash,
    instruction::Instruction,
    message::{v0, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    system_instruction,
    transaction::VersionedTransaction,
};
use spl_associated_token_account::instruction::create_associated_token_account_idempotent;
use std::sync::Arc;

/// Wire limit for a serialized transaction.
pub const MAX_TRANSACTION_SIZE: usize = 1232;
pub const COMPUTE_UNITS_PER_TRADE: u32 = 120_000;
const CREATE_COMPUTE_UNITS: u32 = 400_000;
const TRANSFER_COMPUTE_UNITS: u32 = 5_000;
const MAX_COMPUTE_UNITS: u32 = 1_400_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub amount_in: u64,
    pub expected_out: u64,
    pub min_out: u64,
}

/// Buy quote. `amount_in` is scaled by the launch mode before it meets the curve.
pub fn quote_buy(state: &BondingCurveAccount, amount_in: u64, mode: LaunchMode, slippage_bps: u64) -> Result<Quote> {
    let adjusted = (amount_in as u128 * mode.speed_multiplier_bps() as u128 / BPS_DENOMINATOR as u128) as u64;
    let expected_out = calculate_tokens_out(adjusted, state.virtual_sol_reserves, state.virtual_token_reserves)?;
    Ok(Quote {
        amount_in,
        expected_out,
        min_out: apply_slippage_floor(expected_out, slippage_bps),
    })
}

pub fn quote_sell(
    state: &BondingCurveAccount,
    token_amount: u64,
    mode: LaunchMode,
    slippage_bps: u64,
) -> Result<Quote> {
    let raw = calculate_sol_out(token_amount, state.virtual_sol_reserves, state.virtual_token_reserves)?;
    let expected_out = (raw as u128 * BPS_DENOMINATOR as u128 / mode.speed_multiplier_bps() as u128) as u64;
    Ok(Quote {
        amount_in: token_amount,
        expected_out,
        min_out: apply_slippage_floor(expected_out, slippage_bps),
    })
}

/// A single wallet's trade, ready to be packed or signed alone.
#[derive(Debug, Clone)]
pub struct PreparedTrade {
    pub wallet: Wallet,
    pub side: TradeSide,
    pub instructions: Vec<Instruction>,
    /// Buys: lamports in. Sells: minimum lamports out.
    pub lamports: u64,
    /// Buys: minimum tokens out. Sells: tokens in.
    pub token_amount: u64,
}

/// One packed transaction and the indices of the trades it carries.
#[derive(Debug, Clone)]
pub struct PackedTransaction {
    pub transaction: VersionedTransaction,
    pub members: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct BuilderConfig {
    pub priority_fee_micro_lamports: u64,
    pub max_trades_per_tx: usize,
    pub launch_mode: LaunchMode,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            priority_fee_micro_lamports: 0,
            max_trades_per_tx: 6,
            launch_mode: LaunchMode::Classic,
        }
    }
}

pub struct TransactionBuilder {
    chain: Arc<dyn ChainConnection>,
    config: BuilderConfig,
}

fn compute_budget(units: u32, priority_fee_micro_lamports: u64) -> Vec<Instruction> {
    let mut ixs = vec![ComputeBudgetInstruction::set_compute_unit_limit(units.min(MAX_COMPUTE_UNITS))];
    if priority_fee_micro_lamports > 0 {
        ixs.push(ComputeBudgetInstruction::set_compute_unit_price(priority_fee_micro_lamports));
    }
    ixs
}

/// Compiles and signs a V0 transaction; `signers[0]` pays the fee.
pub fn sign_v0(
    signers: &[&Keypair],
    instructions: &[Instruction],
    tables: &[AddressLookupTableAccount],
    blockhash: Hash,
) -> Result<VersionedTransaction> {
    let payer = signers
        .first()
        .ok_or_else(|| BundlerError::Build("transaction needs at least one signer".to_string()))?;
    let message = v0::Message::try_compile(&payer.pubkey(), instructions, tables, blockhash)?;
    Ok(VersionedTransaction::try_new(VersionedMessage::V0(message), signers)?)
}

/// Serialized size of the compiled message once every required signature is attached.
fn compiled_size(
    payer: &Pubkey,
    instructions: &[Instruction],
    tables: &[AddressLookupTableAccount],
    blockhash: Hash,
) -> Result<usize> {
    let message = v0::Message::try_compile(payer, instructions, tables, blockhash)?;
    let unsigned = VersionedTransaction {
        signatures: vec![Signature::default(); message.header.num_required_signatures as usize],
        message: VersionedMessage::V0(message),
    };
    Ok(bincode::serialized_size(&unsigned)? as usize)
}

pub fn transaction_size(transaction: &VersionedTransaction) -> Result<usize> {
    Ok(bincode::serialized_size(transaction)? as usize)
}

impl TransactionBuilder {
    pub fn new(chain: Arc<dyn ChainConnection>, config: BuilderConfig) -> Self {
        Self { chain, config }
    }

    pub async fn fetch_global_state(&self) -> Result<GlobalState> {
        let data = self
            .chain
            .get_account_data(&GLOBAL_STATE_PUBKEY)
            .await?
            .ok_or_else(|| BundlerError::CurveStateUnavailable("global state account missing".to_string()))?;
        GlobalState::decode(&data)
    }

    /// Live curve of `mint`. Unreadable and completed curves are errors.
    pub async fn fetch_curve(&self, mint: &Pubkey) -> Result<BondingCurveAccount> {
        let curve_pk = find_bonding_curve_pda(mint);
        let data = match self.chain.get_account_data(&curve_pk).await {
            Ok(Some(data)) => data,
            Ok(None) => return Err(BundlerError::CurveStateUnavailable(mint.to_string())),
            Err(e) => {
                warn!("Failed to read bonding curve {} for {}: {}", curve_pk, mint, e);
                return Err(BundlerError::CurveStateUnavailable(mint.to_string()));
            }
        };
        let curve = BondingCurveAccount::decode(&data)
            .map_err(|_| BundlerError::CurveStateUnavailable(mint.to_string()))?;
        if curve.complete {
            return Err(BundlerError::CurveComplete(mint.to_string()));
        }
        Ok(curve)
    }

    fn buy_trade(
        &self,
        curve: &BondingCurveAccount,
        mint: &Pubkey,
        amount_in: u64,
        slippage_bps: u64,
        wallet: &Wallet,
    ) -> Result<(PreparedTrade, Quote)> {
        if amount_in == 0 {
            return Err(BundlerError::Build(format!("zero buy amount for {}", wallet.name)));
        }
        let quote = quote_buy(curve, amount_in, self.config.launch_mode, slippage_bps)?;
        let buyer = wallet.pubkey();
        let instructions = vec![
            create_associated_token_account_idempotent(&buyer, &buyer, mint, &spl_token::ID),
            build_pump_buy_instruction(&buyer, mint, &curve.creator, quote.min_out, amount_in)?,
        ];
        debug!(
            "{} buys {} lamports -> min {} tokens (expected {})",
            wallet.name, amount_in, quote.min_out, quote.expected_out
        );
        Ok((
            PreparedTrade {
                wallet: wallet.clone(),
                side: TradeSide::Buy,
                instructions,
                lamports: amount_in,
                token_amount: quote.min_out,
            },
            quote,
        ))
    }

    /// Buy against the live curve.
    pub async fn build_buy(
        &self,
        mint: &Pubkey,
        amount_in: u64,
        slippage_bps: u64,
        wallet: &Wallet,
    ) -> Result<PreparedTrade> {
        let curve = self.fetch_curve(mint).await?;
        Ok(self.buy_trade(&curve, mint, amount_in, slippage_bps, wallet)?.0)
    }

    /// Buy against a projected curve that is advanced by this buy.
    pub fn build_buy_projected(
        &self,
        projection: &mut BondingCurveAccount,
        mint: &Pubkey,
        amount_in: u64,
        slippage_bps: u64,
        wallet: &Wallet,
    ) -> Result<PreparedTrade> {
        let (trade, quote) = self.buy_trade(projection, mint, amount_in, slippage_bps, wallet)?;
        projection.apply_buy(amount_in, quote.expected_out);
        Ok(trade)
    }

    pub async fn build_sell(
        &self,
        mint: &Pubkey,
        token_amount: u64,
        slippage_bps: u64,
        wallet: &Wallet,
    ) -> Result<PreparedTrade> {
        if token_amount == 0 {
            return Err(BundlerError::Build(format!("{} has no tokens to sell", wallet.name)));
        }
        let curve = self.fetch_curve(mint).await?;
        let quote = quote_sell(&curve, token_amount, self.config.launch_mode, slippage_bps)?;
        let seller = wallet.pubkey();
        let instruction = build_pump_sell_instruction(&seller, mint, &curve.creator, token_amount, quote.min_out)?;
        Ok(PreparedTrade {
            wallet: wallet.clone(),
            side: TradeSide::Sell,
            instructions: vec![instruction],
            lamports: quote.min_out,
            token_amount,
        })
    }

    /// Create transaction: create + extend, plus an optional dev buy by the creator.
    /// The dev buy advances `projection`.
    #[allow(clippy::too_many_arguments)]
    pub fn build_create(
        &self,
        creator: &Wallet,
        mint: &Keypair,
        metadata: &TokenMetadata,
        metadata_uri: &str,
        projection: &mut BondingCurveAccount,
        dev_buy_lamports: u64,
        slippage_bps: u64,
        blockhash: Hash,
    ) -> Result<VersionedTransaction> {
        let creator_pk = creator.pubkey();
        let mint_pk = mint.pubkey();
        let mut instructions = compute_budget(CREATE_COMPUTE_UNITS, self.config.priority_fee_micro_lamports);
        instructions.push(build_pump_create_instruction(
            &creator_pk,
            &mint_pk,
            metadata_uri,
            &metadata.name,
            &metadata.symbol,
        )?);
        instructions.push(build_pump_extend_account_instruction(&find_bonding_curve_pda(&mint_pk), &creator_pk));

        if dev_buy_lamports > 0 {
            let dev = self.build_buy_projected(projection, &mint_pk, dev_buy_lamports, slippage_bps, creator)?;
            instructions.extend(dev.instructions);
        }

        let tx = sign_v0(&[creator.keypair(), mint], &instructions, &[], blockhash)?;
        let size = transaction_size(&tx)?;
        if size > MAX_TRANSACTION_SIZE {
            return Err(BundlerError::Build(format!("create transaction is {} bytes", size)));
        }
        Ok(tx)
    }

    /// Single transfer to a randomly chosen tip account.
    pub fn build_tip<R: Rng + ?Sized>(
        &self,
        payer: &Wallet,
        lamports: u64,
        tip_accounts: &[Pubkey],
        rng: &mut R,
        blockhash: Hash,
    ) -> Result<VersionedTransaction> {
        let tip_account = tip_accounts
            .choose(rng)
            .ok_or_else(|| BundlerError::Config("no tip accounts configured".to_string()))?;
        let ix = system_instruction::transfer(&payer.pubkey(), tip_account, lamports);
        sign_v0(&[payer.keypair()], &[ix], &[], blockhash)
    }

    /// Lamport transfers from one payer, all in one transaction.
    pub fn build_transfers(&self, payer: &Wallet, transfers: &[(Pubkey, u64)], blockhash: Hash) -> Result<VersionedTransaction> {
        let mut instructions = compute_budget(
            TRANSFER_COMPUTE_UNITS * transfers.len() as u32,
            self.config.priority_fee_micro_lamports,
        );
        instructions.extend(
            transfers
                .iter()
                .map(|(to, lamports)| system_instruction::transfer(&payer.pubkey(), to, *lamports)),
        );
        sign_v0(&[payer.keypair()], &instructions, &[], blockhash)
    }

    fn trade_instructions(&self, trades: &[&PreparedTrade]) -> Vec<Instruction> {
        let mut instructions = compute_budget(
            COMPUTE_UNITS_PER_TRADE * trades.len() as u32,
            self.config.priority_fee_micro_lamports,
        );
        for trade in trades {
            instructions.extend(trade.instructions.iter().cloned());
        }
        instructions
    }

    fn fits(&self, trades: &[&PreparedTrade], tables: &[AddressLookupTableAccount], blockhash: Hash) -> bool {
        let payer = trades[0].wallet.pubkey();
        match compiled_size(&payer, &self.trade_instructions(trades), tables, blockhash) {
            Ok(size) => size <= MAX_TRANSACTION_SIZE,
            Err(e) => {
                debug!("Candidate packing of {} trades does not compile: {}", trades.len(), e);
                false
            }
        }
    }

    fn sign_group(
        &self,
        trades: &[&PreparedTrade],
        tables: &[AddressLookupTableAccount],
        blockhash: Hash,
    ) -> Result<VersionedTransaction> {
        let signers: Vec<&Keypair> = trades.iter().map(|t| t.wallet.keypair()).collect();
        sign_v0(&signers, &self.trade_instructions(trades), tables, blockhash)
    }

    /// Greedy packing. Trades stay in order; a transaction is closed when the next
    /// trade would push it past the wire limit or past `max_trades_per_tx`. The
    /// first wallet of each transaction pays its fee.
    pub fn pack(
        &self,
        trades: &[PreparedTrade],
        table: Option<&AddressLookupTableAccount>,
        blockhash: Hash,
    ) -> Result<Vec<PackedTransaction>> {
        let tables: Vec<AddressLookupTableAccount> = table.into_iter().cloned().collect();
        let cap = self.config.max_trades_per_tx.max(1);
        let mut packed = Vec::new();
        let mut group: Vec<usize> = Vec::new();

        for idx in 0..trades.len() {
            if !group.is_empty() && group.len() < cap {
                let candidate: Vec<&PreparedTrade> =
                    group.iter().chain(std::iter::once(&idx)).map(|i| &trades[*i]).collect();
                if self.fits(&candidate, &tables, blockhash) {
                    group.push(idx);
                    continue;
                }
            }
            if !group.is_empty() {
                packed.push(self.close_group(trades, std::mem::take(&mut group), &tables, blockhash)?);
            }
            group.push(idx);
        }
        if !group.is_empty() {
            packed.push(self.close_group(trades, group, &tables, blockhash)?);
        }

        debug!("Packed {} trades into {} transactions", trades.len(), packed.len());
        Ok(packed)
    }

    fn close_group(
        &self,
        trades: &[PreparedTrade],
        members: Vec<usize>,
        tables: &[AddressLookupTableAccount],
        blockhash: Hash,
    ) -> Result<PackedTransaction> {
        let group: Vec<&PreparedTrade> = members.iter().map(|i| &trades[*i]).collect();
        let transaction = self.sign_group(&group, tables, blockhash)?;
        let size = transaction_size(&transaction)?;
        if size > MAX_TRANSACTION_SIZE {
            return Err(BundlerError::Build(format!(
                "trade for {} alone is {} bytes",
                group[0].wallet.name, size
            )));
        }
        Ok(PackedTransaction { transaction, members })
    }

    /// One trade per transaction, paid by the trading wallet.
    pub fn sign_single(
        &self,
        trade: &PreparedTrade,
        table: Option<&AddressLookupTableAccount>,
        blockhash: Hash,
    ) -> Result<VersionedTransaction> {
        let tables: Vec<AddressLookupTableAccount> = table.into_iter().cloned().collect();
        self.sign_group(&[trade], &tables, blockhash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::wallet::WalletRole;
    use crate::pump_instruction_builders::launch_table_addresses;
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct NoChain;

    #[async_trait]
    impl ChainConnection for NoChain {
        async fn get_latest_blockhash(&self) -> Result<Hash> {
            Ok(Hash::default())
        }
        async fn get_account_data(&self, _address: &Pubkey) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }
        async fn get_balance(&self, _address: &Pubkey) -> Result<u64> {
            Ok(0)
        }
        async fn get_slot(&self) -> Result<u64> {
            Ok(0)
        }
        async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature> {
            Ok(tx.signatures[0])
        }
        async fn confirm_transaction(&self, _signature: &Signature) -> Result<bool> {
            Ok(true)
        }
    }

    fn curve() -> BondingCurveAccount {
        BondingCurveAccount {
            virtual_token_reserves: 1_000_000_000,
            virtual_sol_reserves: 30_000_000_000,
            real_token_reserves: 800_000_000,
            real_sol_reserves: 0,
            token_total_supply: 1_000_000_000,
            complete: false,
            creator: Pubkey::new_unique(),
        }
    }

    fn wallets(n: usize) -> Vec<Wallet> {
        (0..n)
            .map(|i| Wallet::new(format!("w{}", i), WalletRole::Bundler, Keypair::new()))
            .collect()
    }

    #[test]
    fn buy_quote_matches_reference_numbers() {
        let q = quote_buy(&curve(), 1_000_000_000, LaunchMode::Classic, 500).unwrap();
        assert_eq!(q.expected_out, 32_258_064);
        assert_eq!(q.min_out, 30_645_160);

        let mayhem = quote_buy(&curve(), 1_000_000_000, LaunchMode::Mayhem, 500).unwrap();
        assert!(mayhem.expected_out > q.expected_out);
    }

    #[test]
    fn sell_quote_divides_out_the_multiplier() {
        let classic = quote_sell(&curve(), 32_258_064, LaunchMode::Classic, 0).unwrap();
        let mayhem = quote_sell(&curve(), 32_258_064, LaunchMode::Mayhem, 0).unwrap();
        assert_eq!(classic.expected_out, 937_499_985);
        assert_eq!(mayhem.expected_out, 937_499_985u64 * 10_000 / 15_000);
    }

    #[tokio::test]
    async fn missing_curve_is_unavailable() {
        let builder = TransactionBuilder::new(Arc::new(NoChain), BuilderConfig::default());
        let w = &wallets(1)[0];
        let result = builder.build_buy(&Pubkey::new_unique(), 1_000, 500, w).await;
        assert!(matches!(result, Err(BundlerError::CurveStateUnavailable(_))));
    }

    #[test]
    fn projection_advances_per_buy() {
        let builder = TransactionBuilder::new(Arc::new(NoChain), BuilderConfig::default());
        let mint = Pubkey::new_unique();
        let mut projection = curve();
        let ws = wallets(2);
        let first = builder.build_buy_projected(&mut projection, &mint, 1_000_000_000, 500, &ws[0]).unwrap();
        let second = builder.build_buy_projected(&mut projection, &mint, 1_000_000_000, 500, &ws[1]).unwrap();
        assert!(second.token_amount < first.token_amount);
        assert_eq!(projection.virtual_sol_reserves, 32_000_000_000);
    }

    #[test]
    fn packing_respects_cap_size_and_fee_payer() {
        let config = BuilderConfig {
            max_trades_per_tx: 3,
            ..BuilderConfig::default()
        };
        let builder = TransactionBuilder::new(Arc::new(NoChain), config);
        let mint = Pubkey::new_unique();
        let ws = wallets(7);
        let mut projection = curve();
        let trades: Vec<PreparedTrade> = ws
            .iter()
            .map(|w| builder.build_buy_projected(&mut projection, &mint, 10_000_000, 500, w).unwrap())
            .collect();

        let pubkeys: Vec<Pubkey> = ws.iter().map(|w| w.pubkey()).collect();
        let table = AddressLookupTableAccount {
            key: Pubkey::new_unique(),
            addresses: launch_table_addresses(&mint, &projection.creator, &pubkeys),
        };

        let packed = builder.pack(&trades, Some(&table), Hash::default()).unwrap();
        let members: Vec<usize> = packed.iter().flat_map(|p| p.members.clone()).collect();
        assert_eq!(members, (0..7).collect::<Vec<_>>());
        for p in &packed {
            assert!(p.members.len() <= 3);
            assert!(transaction_size(&p.transaction).unwrap() <= MAX_TRANSACTION_SIZE);
            let payer = p.transaction.message.static_account_keys()[0];
            assert_eq!(payer, ws[p.members[0]].pubkey());
            assert_eq!(p.transaction.signatures.len(), p.members.len());
        }
    }

    #[test]
    fn tip_goes_to_a_configured_account() {
        let builder = TransactionBuilder::new(Arc::new(NoChain), BuilderConfig::default());
        let payer = &wallets(1)[0];
        let tips = vec![Pubkey::new_unique(), Pubkey::new_unique()];
        let mut rng = StdRng::seed_from_u64(3);
        let tx = builder.build_tip(payer, 1_000, &tips, &mut rng, Hash::default()).unwrap();
        let keys = tx.message.static_account_keys();
        assert!(keys.iter().any(|k| tips.contains(k)));
        assert!(builder.build_tip(payer, 1_000, &[], &mut rng, Hash::default()).is_err());
    }
}
