//! Outgoing transfers
//!
//! Native transfers go through the system program, stable-token transfers
//! through the token program between two existing token accounts.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};
use crate::domain::wire::{decode_pubkey, AccountMeta, CompiledInstruction, Instruction, Message, Pubkey};
use crate::domain::{AssetType, Network};

pub const SYSTEM_PROGRAM_ID: &str = "11111111111111111111111111111111";
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

const SYSTEM_TRANSFER: u32 = 2;
const TOKEN_TRANSFER: u8 = 3;

/// Decimals of the native coin
pub const NATIVE_DECIMALS: u32 = 9;

/// A user-initiated send from the active account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub recipient: String,
    pub amount: Decimal,
    pub asset_type: AssetType,
}

/// A transfer the ledger accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub signature: String,
    pub from: String,
    pub recipient: String,
    pub amount: Decimal,
    pub asset_type: AssetType,
    pub network: Network,
}

/// Token account holding one owner's balance of one mint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccount {
    pub address: String,
    /// Raw integer amount
    pub amount: u64,
    pub decimals: u32,
}

/// Whole units to the asset's smallest unit
///
/// Rejects non-positive amounts and amounts finer than `decimals`.
pub fn to_base_units(amount: Decimal, decimals: u32) -> Result<u64> {
    if amount <= Decimal::ZERO {
        return Err(Error::validation("Amount must be positive"));
    }
    let scale = 10u64
        .checked_pow(decimals)
        .map(Decimal::from)
        .ok_or_else(|| Error::validation("Unsupported token decimals"))?;
    let units = amount
        .checked_mul(scale)
        .ok_or_else(|| Error::validation("Amount is too large"))?;
    if !units.fract().is_zero() {
        return Err(Error::validation(format!(
            "Amount has more than {} decimal places",
            decimals
        )));
    }
    units
        .to_u64()
        .ok_or_else(|| Error::validation("Amount is too large"))
}

pub fn native_transfer(from: &Pubkey, to: &Pubkey, lamports: u64) -> Instruction {
    let mut data = SYSTEM_TRANSFER.to_le_bytes().to_vec();
    data.extend_from_slice(&lamports.to_le_bytes());
    Instruction {
        program_id: [0; 32],
        accounts: vec![AccountMeta::writable(*from, true), AccountMeta::writable(*to, false)],
        data,
    }
}

pub fn token_transfer(source: &Pubkey, destination: &Pubkey, owner: &Pubkey, amount: u64) -> Result<Instruction> {
    let mut data = vec![TOKEN_TRANSFER];
    data.extend_from_slice(&amount.to_le_bytes());
    Ok(Instruction {
        program_id: decode_pubkey(TOKEN_PROGRAM_ID)?,
        accounts: vec![
            AccountMeta::writable(*source, false),
            AccountMeta::writable(*destination, false),
            AccountMeta::readonly(*owner, true),
        ],
        data,
    })
}

/// A transfer instruction read back out of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedTransfer {
    Native {
        from: Pubkey,
        to: Pubkey,
        lamports: u64,
    },
    Token {
        source: Pubkey,
        destination: Pubkey,
        owner: Pubkey,
        amount: u64,
    },
}

fn amount_after(data: &[u8], tag_len: usize) -> Option<u64> {
    let bytes: [u8; 8] = data.get(tag_len..tag_len + 8)?.try_into().ok()?;
    (data.len() == tag_len + 8).then(|| u64::from_le_bytes(bytes))
}

/// `None` for anything other than a system or token transfer
pub fn decode_transfer(message: &Message, instruction: &CompiledInstruction) -> Option<DecodedTransfer> {
    let key = |i: usize| -> Option<Pubkey> {
        let index = *instruction.accounts.get(i)?;
        message.account_keys.get(usize::from(index)).copied()
    };
    let program = message
        .account_keys
        .get(usize::from(instruction.program_id_index))?;

    if *program == [0; 32] {
        let tag: [u8; 4] = instruction.data.get(..4)?.try_into().ok()?;
        if u32::from_le_bytes(tag) != SYSTEM_TRANSFER {
            return None;
        }
        return Some(DecodedTransfer::Native {
            from: key(0)?,
            to: key(1)?,
            lamports: amount_after(&instruction.data, 4)?,
        });
    }

    if *program == decode_pubkey(TOKEN_PROGRAM_ID).ok()? && instruction.data.first() == Some(&TOKEN_TRANSFER) {
        return Some(DecodedTransfer::Token {
            source: key(0)?,
            destination: key(1)?,
            owner: key(2)?,
            amount: amount_after(&instruction.data, 1)?,
        });
    }
    None
}
