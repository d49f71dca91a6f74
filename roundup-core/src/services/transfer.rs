//! Transfer service - user-initiated sends from the active account
//!
//! Builds a single-instruction transaction, signs it with the caller's keypair
//! and hands it to the network's ledger client. Balance and token-account
//! checks happen up front so the common mistakes fail before anything is
//! signed. Network errors reach the caller unchanged.

use crate::domain::chain::lamports_to_coin;
use crate::domain::result::{Error, Result};
use crate::domain::transfer::{native_transfer, to_base_units, token_transfer, NATIVE_DECIMALS};
use crate::domain::wire::{decode_pubkey, Instruction, Message, Transaction};
use crate::domain::{AssetType, Network, TransferReceipt, TransferRequest};
use crate::ports::LedgerClient;
use crate::services::keys::Keypair;
use crate::services::scanner::ChainScanner;

/// Fee for one signature
pub const SIGNATURE_FEE_LAMPORTS: u64 = 5_000;

pub struct TransferService {
    scanner: ChainScanner,
}

impl TransferService {
    pub fn new(scanner: ChainScanner) -> Self {
        Self { scanner }
    }

    /// Sign `request` with `keypair` and submit it on `network`
    pub async fn send(
        &self,
        keypair: &Keypair,
        network: Network,
        request: &TransferRequest,
    ) -> Result<TransferReceipt> {
        let client = self.scanner.client(network)?;
        let from = keypair.verifying_key().to_bytes();
        let owner = keypair.public_key();

        let to = decode_pubkey(&request.recipient)
            .map_err(|_| Error::validation("Recipient is not a valid address"))?;
        if to == from {
            return Err(Error::validation("Recipient is the sending account"));
        }

        let instruction = match request.asset_type {
            AssetType::Native => {
                let lamports = to_base_units(request.amount, NATIVE_DECIMALS)?;
                let balance = client.get_balance(&owner).await?;
                if request.amount + lamports_to_coin(SIGNATURE_FEE_LAMPORTS) > balance {
                    return Err(Error::validation("Insufficient balance for amount and fee"));
                }
                native_transfer(&from, &to, lamports)
            }
            AssetType::Stable => {
                self.stable_instruction(client.as_ref(), network, &owner, request)
                    .await?
            }
        };

        let blockhash = client.latest_blockhash().await?;
        let blockhash = decode_pubkey(&blockhash)
            .map_err(|_| Error::network("Ledger returned a malformed blockhash"))?;
        let message = Message::compile(&from, &[instruction], blockhash)?;
        let signature = keypair.sign(&message.serialize()).to_bytes();
        let transaction = Transaction {
            signatures: vec![signature],
            message,
        };

        let signature = client.submit_transaction(&transaction.serialize()).await?;
        Ok(TransferReceipt {
            signature,
            from: owner,
            recipient: request.recipient.trim().to_string(),
            amount: request.amount,
            asset_type: request.asset_type,
            network,
        })
    }

    /// Token transfer between the two parties' existing token accounts
    async fn stable_instruction(
        &self,
        client: &dyn LedgerClient,
        network: Network,
        owner: &str,
        request: &TransferRequest,
    ) -> Result<Instruction> {
        let mint = network.stable_mint();
        let source = client
            .find_token_account(owner, mint)
            .await?
            .ok_or_else(|| Error::validation("No stable-token account to send from"))?;
        let amount = to_base_units(request.amount, source.decimals)?;
        if amount > source.amount {
            return Err(Error::validation("Insufficient stable-token balance"));
        }

        if client.get_balance(owner).await? < lamports_to_coin(SIGNATURE_FEE_LAMPORTS) {
            return Err(Error::validation("Insufficient balance for the fee"));
        }

        // Token accounts are never created on the recipient's behalf
        let destination = client
            .find_token_account(request.recipient.trim(), mint)
            .await?
            .ok_or_else(|| Error::validation("Recipient has no stable-token account"))?;

        token_transfer(
            &decode_pubkey(&source.address)?,
            &decode_pubkey(&destination.address)?,
            &decode_pubkey(owner)?,
            amount,
        )
    }
}
