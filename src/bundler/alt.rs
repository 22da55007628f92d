use crate::chain::{send_and_confirm, ChainConnection, ConfirmTiming};
use crate::errors::{BundlerError, Result};
use crate::models::wallet::Wallet;
use log::{debug, info};
use solana_sdk::{
    address_lookup_table::{
        instruction::{create_lookup_table, extend_lookup_table},
        AddressLookupTableAccount,
    },
    compute_budget::ComputeBudgetInstruction,
    instruction::Instruction,
    pubkey::Pubkey,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

pub const MAX_ADDRESSES_PER_EXTEND: usize = 20;
const TABLE_COMPUTE_UNITS: u32 = 200_000;

/// The table owned by one launch and the addresses committed to it so far.
#[derive(Debug, Clone)]
pub struct AddressTableHandle {
    pub address: Pubkey,
    pub addresses: Vec<Pubkey>,
    last_extended_slot: u64,
}

/// Drops duplicates and already committed addresses, then chunks the rest.
pub fn extension_batches(committed: &[Pubkey], addresses: &[Pubkey]) -> Vec<Vec<Pubkey>> {
    let mut seen: HashSet<Pubkey> = committed.iter().copied().collect();
    let fresh: Vec<Pubkey> = addresses.iter().copied().filter(|a| seen.insert(*a)).collect();
    fresh
        .chunks(MAX_ADDRESSES_PER_EXTEND)
        .map(|chunk| chunk.to_vec())
        .collect()
}

pub struct AddressTableManager {
    chain: Arc<dyn ChainConnection>,
    authority: Wallet,
    priority_fee_micro_lamports: u64,
    timing: ConfirmTiming,
    table: Option<AddressTableHandle>,
}

impl AddressTableManager {
    pub fn new(
        chain: Arc<dyn ChainConnection>,
        authority: Wallet,
        priority_fee_micro_lamports: u64,
        timing: ConfirmTiming,
    ) -> Self {
        Self {
            chain,
            authority,
            priority_fee_micro_lamports,
            timing,
            table: None,
        }
    }

    async fn send_ix(&self, instruction: Instruction, label: &str) -> Result<()> {
        let mut instructions = vec![ComputeBudgetInstruction::set_compute_unit_limit(TABLE_COMPUTE_UNITS)];
        if self.priority_fee_micro_lamports > 0 {
            instructions.push(ComputeBudgetInstruction::set_compute_unit_price(
                self.priority_fee_micro_lamports,
            ));
        }
        instructions.push(instruction);
        let blockhash = self.chain.get_latest_blockhash().await?;
        let tx = crate::bundler::builder::sign_v0(&[self.authority.keypair()], &instructions, &[], blockhash)?;
        send_and_confirm(self.chain.as_ref(), &tx, label, self.timing).await?;
        Ok(())
    }

    /// Creates a fresh table owned and paid by the authority wallet.
    pub async fn create(&mut self) -> Result<Pubkey> {
        let recent_slot = self.chain.get_slot().await?;
        let authority = self.authority.pubkey();
        let (ix, address) = create_lookup_table(authority, authority, recent_slot);
        self.send_ix(ix, "create lookup table").await?;
        info!("Lookup table created: {}", address);
        self.table = Some(AddressTableHandle {
            address,
            addresses: Vec::new(),
            last_extended_slot: recent_slot,
        });
        Ok(address)
    }

    /// Reuses an existing table, reading its current addresses from chain.
    pub async fn attach(&mut self, address: Pubkey) -> Result<()> {
        let account = self
            .chain
            .get_address_lookup_table(&address)
            .await?
            .ok_or_else(|| BundlerError::Config(format!("lookup table {} not found", address)))?;
        let slot = self.chain.get_slot().await?;
        self.table = Some(AddressTableHandle {
            address,
            addresses: account.addresses,
            last_extended_slot: slot,
        });
        Ok(())
    }

    /// Commits new addresses in batches of at most 20, each confirmed before the
    /// next is sent. Returns the batch sizes.
    pub async fn extend(&mut self, addresses: &[Pubkey]) -> Result<Vec<usize>> {
        let handle = self.table.as_ref().ok_or(BundlerError::NoActiveTable)?;
        let table_address = handle.address;
        let batches = extension_batches(&handle.addresses, addresses);
        let authority = self.authority.pubkey();

        let mut sizes = Vec::with_capacity(batches.len());
        for (i, batch) in batches.into_iter().enumerate() {
            let ix = extend_lookup_table(table_address, authority, Some(authority), batch.clone());
            self.send_ix(ix, &format!("extend lookup table batch {}", i + 1)).await?;
            let slot = self.chain.get_slot().await?;
            sizes.push(batch.len());
            if let Some(handle) = self.table.as_mut() {
                handle.addresses.extend(batch);
                handle.last_extended_slot = slot;
            }
        }
        debug!("Extended lookup table {} with batches {:?}", table_address, sizes);
        Ok(sizes)
    }

    /// New entries are usable one slot after the extension that added them.
    pub async fn wait_until_active(&self) -> Result<()> {
        let handle = self.table.as_ref().ok_or(BundlerError::NoActiveTable)?;
        let deadline = tokio::time::Instant::now() + self.timing.window;
        loop {
            if self.chain.get_slot().await? > handle.last_extended_slot {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(BundlerError::Transport(format!(
                    "lookup table {} not active within {:?}",
                    handle.address, self.timing.window
                )));
            }
            tokio::time::sleep(self.timing.poll.min(Duration::from_millis(400))).await;
        }
    }

    pub fn lookup_account(&self) -> Result<AddressLookupTableAccount> {
        let handle = self.table.as_ref().ok_or(BundlerError::NoActiveTable)?;
        Ok(AddressLookupTableAccount {
            key: handle.address,
            addresses: handle.addresses.clone(),
        })
    }
}
