use crate::errors::{BundlerError, Result};
use borsh::{BorshDeserialize, BorshSerialize};
use log::debug;
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey,
    pubkey::Pubkey,
    system_program, sysvar,
};
use spl_associated_token_account::{get_associated_token_address, ID as ASSOCIATED_TOKEN_PROGRAM_ID};
use spl_token::ID as TOKEN_PROGRAM_ID;

// --- Constants ---
pub const PUMPFUN_PROGRAM_ID: Pubkey = pubkey!("6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P");
pub const GLOBAL_STATE_PUBKEY: Pubkey = pubkey!("4wTV1YmiEkRvAtNtsSGPtUrqRYQMe5SKy2uB4Jjaxnjf");
pub const FEE_RECIPIENT_PUBKEY: Pubkey = pubkey!("CebN5WGQ4jvEPvsVU4EoHEpgzq1VV7AbicfhtW4xC9iM");
pub const EVENT_AUTHORITY_PUBKEY: Pubkey = pubkey!("Ce6TQqeHC9p8KetsN6JsjHK7UTZk7nasjjnr7XxXp9F1");
pub const METADATA_PROGRAM_ID: Pubkey = pubkey!("metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s");
pub const PUMPFUN_MINT_AUTHORITY: Pubkey = pubkey!("TSLvdd1pWpHVjahSpsvCXUbgwsL3JAcvokwaKt1eokM");
pub use system_program::ID as SYSTEM_PROGRAM_ID;
pub use sysvar::rent::ID as RENT_SYSVAR_ID;

/// pump.fun mints use 6 decimals.
pub const TOKEN_DECIMALS: u32 = 6;

const CREATE_DISCRIMINATOR: [u8; 8] = [0x18, 0x1e, 0xc8, 0x28, 0x05, 0x1c, 0x07, 0x77];
const EXTEND_ACCOUNT_DISCRIMINATOR: [u8; 8] = [0xea, 0x66, 0xc2, 0xcb, 0x96, 0x48, 0x3e, 0xe5];
const BUY_DISCRIMINATOR: [u8; 8] = [0x66, 0x06, 0x3d, 0x12, 0x01, 0xda, 0xeb, 0xea];
const SELL_DISCRIMINATOR: [u8; 8] = [0x33, 0xe6, 0x85, 0xa4, 0x01, 0x7f, 0x83, 0xad];

/// Anchor accounts carry an 8-byte discriminator before the borsh body.
const ACCOUNT_DISCRIMINATOR_LEN: usize = 8;

// --- Account Structs ---

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone)]
pub struct GlobalState {
    pub initialized: u8,
    pub authority: Pubkey,
    pub fee_recipient: Pubkey,
    pub initial_virtual_token_reserves: u64,
    pub initial_virtual_sol_reserves: u64,
    pub initial_real_token_reserves: u64,
    pub token_total_supply: u64,
    pub fee_basis_points: u64,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct BondingCurveAccount {
    pub virtual_token_reserves: u64,
    pub virtual_sol_reserves: u64,
    pub real_token_reserves: u64,
    pub real_sol_reserves: u64,
    pub token_total_supply: u64,
    pub complete: bool,
    pub creator: Pubkey,
}

fn decode_anchor_account<T: BorshDeserialize>(data: &[u8], what: &str) -> Result<T> {
    if data.len() < ACCOUNT_DISCRIMINATOR_LEN {
        return Err(BundlerError::Serialization(format!(
            "{} account data too short: {} bytes",
            what,
            data.len()
        )));
    }
    let mut body = &data[ACCOUNT_DISCRIMINATOR_LEN..];
    T::deserialize(&mut body)
        .map_err(|e| BundlerError::Serialization(format!("Failed to decode {} account: {}", what, e)))
}

impl GlobalState {
    pub fn decode(data: &[u8]) -> Result<Self> {
        decode_anchor_account(data, "global state")
    }
}

impl BondingCurveAccount {
    pub fn decode(data: &[u8]) -> Result<Self> {
        decode_anchor_account(data, "bonding curve")
    }

    /// The curve a fresh create leaves behind, before any buy lands.
    pub fn initial(global: &GlobalState, creator: Pubkey) -> Self {
        Self {
            virtual_token_reserves: global.initial_virtual_token_reserves,
            virtual_sol_reserves: global.initial_virtual_sol_reserves,
            real_token_reserves: global.initial_real_token_reserves,
            real_sol_reserves: 0,
            token_total_supply: global.token_total_supply,
            complete: false,
            creator,
        }
    }

    /// Moves the reserves by an executed buy.
    pub fn apply_buy(&mut self, sol_in: u64, tokens_out: u64) {
        self.virtual_sol_reserves = self.virtual_sol_reserves.saturating_add(sol_in);
        self.real_sol_reserves = self.real_sol_reserves.saturating_add(sol_in);
        self.virtual_token_reserves = self.virtual_token_reserves.saturating_sub(tokens_out);
        self.real_token_reserves = self.real_token_reserves.saturating_sub(tokens_out);
    }

    /// Serialized form with the account discriminator, as the program stores it.
    pub fn to_account_data(&self) -> Result<Vec<u8>> {
        let mut data = vec![0u8; ACCOUNT_DISCRIMINATOR_LEN];
        self.serialize(&mut data)
            .map_err(|e| BundlerError::Serialization(format!("Failed to encode bonding curve: {}", e)))?;
        Ok(data)
    }
}

// --- PDA Calculation Functions ---

pub fn find_bonding_curve_pda(mint_pk: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[b"bonding-curve", mint_pk.as_ref()], &PUMPFUN_PROGRAM_ID).0
}

pub fn find_metadata_pda(mint_pk: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[b"metadata", METADATA_PROGRAM_ID.as_ref(), mint_pk.as_ref()],
        &METADATA_PROGRAM_ID,
    )
    .0
}

pub fn find_creator_vault_pda(creator_pk: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[b"creator-vault", creator_pk.as_ref()], &PUMPFUN_PROGRAM_ID).0
}

// --- Curve Math ---

fn to_u64(value: BigUint, what: &str) -> Result<u64> {
    value
        .to_u64()
        .ok_or_else(|| BundlerError::Calculation(format!("{} exceeds u64::MAX", what)))
}

/// Constant-product output for `sol_in` lamports: `sol_in * vtok / (vsol + sol_in)`.
pub fn calculate_tokens_out(sol_in: u64, virtual_sol: u64, virtual_token: u64) -> Result<u64> {
    if virtual_sol == 0 || virtual_token == 0 {
        return Err(BundlerError::Calculation("Bonding curve reserves cannot be zero".to_string()));
    }
    let numerator = BigUint::from(sol_in) * BigUint::from(virtual_token);
    let denominator = BigUint::from(virtual_sol) + BigUint::from(sol_in);
    to_u64(numerator / denominator, "Tokens out")
}

/// Constant-product lamports for selling `tokens_in`: `tokens_in * vsol / (vtok + tokens_in)`.
pub fn calculate_sol_out(tokens_in: u64, virtual_sol: u64, virtual_token: u64) -> Result<u64> {
    if virtual_sol == 0 || virtual_token == 0 {
        return Err(BundlerError::Calculation("Bonding curve reserves cannot be zero".to_string()));
    }
    if tokens_in == 0 {
        return Ok(0);
    }
    let numerator = BigUint::from(tokens_in) * BigUint::from(virtual_sol);
    let denominator = BigUint::from(virtual_token) + BigUint::from(tokens_in);
    if denominator.is_zero() {
        return Err(BundlerError::Calculation("Sell denominator is zero".to_string()));
    }
    to_u64(numerator / denominator, "SOL out")
}

/// Floors `amount` by the slippage tolerance.
pub fn apply_slippage_floor(amount: u64, slippage_bps: u64) -> u64 {
    let numerator = 10_000u128.saturating_sub(slippage_bps as u128);
    ((amount as u128 * numerator) / 10_000u128) as u64
}

// --- Instruction Builders ---

pub fn build_pump_create_instruction(
    creator_pk: &Pubkey,
    mint_pk: &Pubkey,
    metadata_uri: &str,
    token_name: &str,
    token_symbol: &str,
) -> Result<Instruction> {
    let bonding_curve_pk = find_bonding_curve_pda(mint_pk);
    let bonding_curve_vault = get_associated_token_address(&bonding_curve_pk, mint_pk);
    let metadata_pk = find_metadata_pda(mint_pk);

    #[derive(BorshSerialize)]
    struct CreateArgs {
        name: String,
        symbol: String,
        uri: String,
        creator: Pubkey,
    }
    let args = CreateArgs {
        name: token_name.to_string(),
        symbol: token_symbol.to_string(),
        uri: metadata_uri.to_string(),
        creator: *creator_pk,
    };

    let mut data = CREATE_DISCRIMINATOR.to_vec();
    args.serialize(&mut data)
        .map_err(|e| BundlerError::Serialization(format!("Failed to serialize create args: {}", e)))?;
    debug!("Create instruction data: {}", hex::encode(&data));

    let accounts = vec![
        AccountMeta::new(*mint_pk, true),
        AccountMeta::new_readonly(PUMPFUN_MINT_AUTHORITY, false),
        AccountMeta::new(bonding_curve_pk, false),
        AccountMeta::new(bonding_curve_vault, false),
        AccountMeta::new_readonly(GLOBAL_STATE_PUBKEY, false),
        AccountMeta::new_readonly(METADATA_PROGRAM_ID, false),
        AccountMeta::new(metadata_pk, false),
        AccountMeta::new(*creator_pk, true),
        AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
        AccountMeta::new_readonly(ASSOCIATED_TOKEN_PROGRAM_ID, false),
        AccountMeta::new_readonly(RENT_SYSVAR_ID, false),
        AccountMeta::new_readonly(EVENT_AUTHORITY_PUBKEY, false),
        AccountMeta::new_readonly(PUMPFUN_PROGRAM_ID, false),
    ];

    Ok(Instruction {
        program_id: PUMPFUN_PROGRAM_ID,
        accounts,
        data,
    })
}

/// Grows the bonding curve account; paid by the creator right after create.
pub fn build_pump_extend_account_instruction(bonding_curve_pk: &Pubkey, payer_pk: &Pubkey) -> Instruction {
    Instruction {
        program_id: PUMPFUN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*bonding_curve_pk, false),
            AccountMeta::new(*payer_pk, true),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            AccountMeta::new_readonly(EVENT_AUTHORITY_PUBKEY, false),
            AccountMeta::new_readonly(PUMPFUN_PROGRAM_ID, false),
        ],
        data: EXTEND_ACCOUNT_DISCRIMINATOR.to_vec(),
    }
}

#[derive(BorshSerialize)]
struct TradeArgs {
    amount: u64,
    sol_limit: u64,
}

fn trade_data(discriminator: [u8; 8], amount: u64, sol_limit: u64) -> Result<Vec<u8>> {
    let mut data = discriminator.to_vec();
    TradeArgs { amount, sol_limit }
        .serialize(&mut data)
        .map_err(|e| BundlerError::Serialization(format!("Failed to serialize trade args: {}", e)))?;
    Ok(data)
}

/// `token_amount` is the minimum accepted output, `max_sol_cost` the lamports put in.
pub fn build_pump_buy_instruction(
    buyer_pk: &Pubkey,
    mint_pk: &Pubkey,
    creator_pk: &Pubkey,
    token_amount: u64,
    max_sol_cost: u64,
) -> Result<Instruction> {
    let bonding_curve_pk = find_bonding_curve_pda(mint_pk);
    let accounts = vec![
        AccountMeta::new_readonly(GLOBAL_STATE_PUBKEY, false),
        AccountMeta::new(FEE_RECIPIENT_PUBKEY, false),
        AccountMeta::new_readonly(*mint_pk, false),
        AccountMeta::new(bonding_curve_pk, false),
        AccountMeta::new(get_associated_token_address(&bonding_curve_pk, mint_pk), false),
        AccountMeta::new(get_associated_token_address(buyer_pk, mint_pk), false),
        AccountMeta::new(*buyer_pk, true),
        AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
        AccountMeta::new(find_creator_vault_pda(creator_pk), false),
        AccountMeta::new_readonly(EVENT_AUTHORITY_PUBKEY, false),
        AccountMeta::new_readonly(PUMPFUN_PROGRAM_ID, false),
    ];

    Ok(Instruction {
        program_id: PUMPFUN_PROGRAM_ID,
        accounts,
        data: trade_data(BUY_DISCRIMINATOR, token_amount, max_sol_cost)?,
    })
}

pub fn build_pump_sell_instruction(
    seller_pk: &Pubkey,
    mint_pk: &Pubkey,
    creator_pk: &Pubkey,
    token_amount_in: u64,
    min_sol_output: u64,
) -> Result<Instruction> {
    let bonding_curve_pk = find_bonding_curve_pda(mint_pk);
    let accounts = vec![
        AccountMeta::new_readonly(GLOBAL_STATE_PUBKEY, false),
        AccountMeta::new(FEE_RECIPIENT_PUBKEY, false),
        AccountMeta::new_readonly(*mint_pk, false),
        AccountMeta::new(bonding_curve_pk, false),
        AccountMeta::new(get_associated_token_address(&bonding_curve_pk, mint_pk), false),
        AccountMeta::new(get_associated_token_address(seller_pk, mint_pk), false),
        AccountMeta::new(*seller_pk, true),
        AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        AccountMeta::new(find_creator_vault_pda(creator_pk), false),
        AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
        AccountMeta::new_readonly(EVENT_AUTHORITY_PUBKEY, false),
        AccountMeta::new_readonly(PUMPFUN_PROGRAM_ID, false),
    ];

    Ok(Instruction {
        program_id: PUMPFUN_PROGRAM_ID,
        accounts,
        data: trade_data(SELL_DISCRIMINATOR, token_amount_in, min_sol_output)?,
    })
}

/// Accounts every trade of a launch touches; candidates for the lookup table.
pub fn launch_table_addresses(mint_pk: &Pubkey, creator_pk: &Pubkey, traders: &[Pubkey]) -> Vec<Pubkey> {
    let bonding_curve_pk = find_bonding_curve_pda(mint_pk);
    let mut addresses = vec![
        *mint_pk,
        *creator_pk,
        bonding_curve_pk,
        get_associated_token_address(&bonding_curve_pk, mint_pk),
        find_creator_vault_pda(creator_pk),
        GLOBAL_STATE_PUBKEY,
        FEE_RECIPIENT_PUBKEY,
        EVENT_AUTHORITY_PUBKEY,
        PUMPFUN_PROGRAM_ID,
        SYSTEM_PROGRAM_ID,
        TOKEN_PROGRAM_ID,
        ASSOCIATED_TOKEN_PROGRAM_ID,
    ];
    for trader in traders {
        addresses.push(*trader);
        addresses.push(get_associated_token_address(trader, mint_pk));
    }
    addresses
}
