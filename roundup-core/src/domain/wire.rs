//! Legacy transaction wire format
//!
//! Enough of the ledger's binary layout to build, sign and read back
//! single-payer transfers. Every list is prefixed with a compact-u16 length.

use crate::domain::result::{Error, Result};

pub const PUBKEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;

pub type Pubkey = [u8; PUBKEY_LEN];
pub type SignatureBytes = [u8; SIGNATURE_LEN];

/// Decode a base58 address or blockhash
pub fn decode_pubkey(address: &str) -> Result<Pubkey> {
    let bytes = bs58::decode(address.trim())
        .into_vec()
        .map_err(|_| Error::validation("Address is not valid base58"))?;
    bytes
        .try_into()
        .map_err(|_| Error::validation(format!("Address must be {} bytes", PUBKEY_LEN)))
}

pub fn encode_pubkey(key: &Pubkey) -> String {
    bs58::encode(key).into_string()
}

/// Account reference of one instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn writable(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    pub fn readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }

    /// Account table group: signed writable, signed readonly, writable, readonly
    fn rank(&self) -> u8 {
        match (self.is_signer, self.is_writable) {
            (true, true) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

/// Instruction with accounts replaced by indexes into the message's table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed: u8,
    pub num_readonly_unsigned: u8,
}

/// The signed part of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub account_keys: Vec<Pubkey>,
    pub recent_blockhash: Pubkey,
    pub instructions: Vec<CompiledInstruction>,
}

fn merge(metas: &mut Vec<AccountMeta>, meta: &AccountMeta) {
    match metas.iter_mut().find(|m| m.pubkey == meta.pubkey) {
        Some(existing) => {
            existing.is_signer |= meta.is_signer;
            existing.is_writable |= meta.is_writable;
        }
        None => metas.push(meta.clone()),
    }
}

fn table_index(keys: &[Pubkey], key: &Pubkey) -> Result<u8> {
    keys.iter()
        .position(|k| k == key)
        .and_then(|i| u8::try_from(i).ok())
        .ok_or_else(|| Error::validation("Account missing from message table"))
}

impl Message {
    /// Lay out accounts and compile `instructions`; `payer` always comes first
    pub fn compile(payer: &Pubkey, instructions: &[Instruction], recent_blockhash: Pubkey) -> Result<Self> {
        let mut metas = vec![AccountMeta::writable(*payer, true)];
        for instruction in instructions {
            for meta in &instruction.accounts {
                merge(&mut metas, meta);
            }
            merge(&mut metas, &AccountMeta::readonly(instruction.program_id, false));
        }
        if metas.len() > usize::from(u8::MAX) {
            return Err(Error::validation("Too many accounts in one transaction"));
        }
        metas[1..].sort_by_key(AccountMeta::rank);

        let count = |f: fn(&AccountMeta) -> bool| metas.iter().filter(|m| f(m)).count() as u8;
        let header = MessageHeader {
            num_required_signatures: count(|m| m.is_signer),
            num_readonly_signed: count(|m| m.is_signer && !m.is_writable),
            num_readonly_unsigned: count(|m| !m.is_signer && !m.is_writable),
        };
        let account_keys: Vec<Pubkey> = metas.iter().map(|m| m.pubkey).collect();

        let compiled: Vec<CompiledInstruction> = instructions
            .iter()
            .map(|instruction| -> Result<CompiledInstruction> {
                Ok(CompiledInstruction {
                    program_id_index: table_index(&account_keys, &instruction.program_id)?,
                    accounts: instruction
                        .accounts
                        .iter()
                        .map(|m| table_index(&account_keys, &m.pubkey))
                        .collect::<Result<Vec<u8>>>()?,
                    data: instruction.data.clone(),
                })
            })
            .collect::<Result<_>>()?;

        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions: compiled,
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = vec![
            self.header.num_required_signatures,
            self.header.num_readonly_signed,
            self.header.num_readonly_unsigned,
        ];
        write_len(&mut out, self.account_keys.len());
        for key in &self.account_keys {
            out.extend_from_slice(key);
        }
        out.extend_from_slice(&self.recent_blockhash);
        write_len(&mut out, self.instructions.len());
        for instruction in &self.instructions {
            out.push(instruction.program_id_index);
            write_len(&mut out, instruction.accounts.len());
            out.extend_from_slice(&instruction.accounts);
            write_len(&mut out, instruction.data.len());
            out.extend_from_slice(&instruction.data);
        }
        out
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self> {
        let header = MessageHeader {
            num_required_signatures: reader.byte()?,
            num_readonly_signed: reader.byte()?,
            num_readonly_unsigned: reader.byte()?,
        };
        let key_count = reader.compact_len()?;
        let account_keys = (0..key_count)
            .map(|_| reader.array::<PUBKEY_LEN>())
            .collect::<Result<Vec<_>>>()?;
        let recent_blockhash = reader.array::<PUBKEY_LEN>()?;

        let instruction_count = reader.compact_len()?;
        let mut instructions = Vec::with_capacity(instruction_count);
        for _ in 0..instruction_count {
            let program_id_index = reader.byte()?;
            let accounts = reader.bytes()?.to_vec();
            let data = reader.bytes()?.to_vec();
            let in_table = |i: &u8| usize::from(*i) < account_keys.len();
            if !in_table(&program_id_index) || !accounts.iter().all(in_table) {
                return Err(malformed("instruction references a missing account"));
            }
            instructions.push(CompiledInstruction {
                program_id_index,
                accounts,
                data,
            });
        }

        if usize::from(header.num_required_signatures) > account_keys.len() {
            return Err(malformed("more signers than accounts"));
        }
        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions,
        })
    }

    /// Keys that must sign, in signature order
    pub fn signer_keys(&self) -> &[Pubkey] {
        &self.account_keys[..usize::from(self.header.num_required_signatures)]
    }

    pub fn is_writable(&self, index: usize) -> bool {
        let signers = usize::from(self.header.num_required_signatures);
        if index < signers {
            index < signers.saturating_sub(usize::from(self.header.num_readonly_signed))
        } else {
            index < self
                .account_keys
                .len()
                .saturating_sub(usize::from(self.header.num_readonly_unsigned))
        }
    }
}

/// Signatures followed by the message they cover
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub signatures: Vec<SignatureBytes>,
    pub message: Message,
}

impl Transaction {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_len(&mut out, self.signatures.len());
        for signature in &self.signatures {
            out.extend_from_slice(signature);
        }
        out.extend_from_slice(&self.message.serialize());
        out
    }

    /// Parse a serialized transaction; trailing bytes are an error
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let count = reader.compact_len()?;
        let signatures = (0..count)
            .map(|_| reader.array::<SIGNATURE_LEN>())
            .collect::<Result<Vec<_>>>()?;
        let message = Message::read(&mut reader)?;
        if !reader.is_empty() {
            return Err(malformed("trailing bytes"));
        }
        if signatures.len() != usize::from(message.header.num_required_signatures) {
            return Err(malformed("signature count does not match header"));
        }
        Ok(Self { signatures, message })
    }

    /// Base58 of the first signature, which names the transaction
    pub fn id(&self) -> Option<String> {
        self.signatures
            .first()
            .map(|signature| bs58::encode(signature).into_string())
    }
}

fn malformed(reason: &str) -> Error {
    Error::validation(format!("Malformed transaction: {}", reason))
}

/// Compact-u16: seven bits per byte, high bit set on all but the last
fn write_len(out: &mut Vec<u8>, len: usize) {
    let mut rest = len;
    loop {
        let byte = (rest & 0x7f) as u8;
        rest >>= 7;
        if rest == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| malformed("unexpected end"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    fn compact_len(&mut self) -> Result<usize> {
        let mut value = 0usize;
        for shift in [0, 7, 14] {
            let byte = self.byte()?;
            value |= usize::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(malformed("length prefix too long"))
    }

    fn bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.compact_len()?;
        self.take(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> Pubkey {
        [byte; PUBKEY_LEN]
    }

    fn transfer(from: Pubkey, to: Pubkey) -> Instruction {
        Instruction {
            program_id: [0; PUBKEY_LEN],
            accounts: vec![AccountMeta::writable(from, true), AccountMeta::writable(to, false)],
            data: vec![2, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0],
        }
    }

    #[test]
    fn test_compact_length() {
        let encode = |len| {
            let mut out = Vec::new();
            write_len(&mut out, len);
            out
        };
        assert_eq!(encode(0), vec![0x00]);
        assert_eq!(encode(127), vec![0x7f]);
        assert_eq!(encode(128), vec![0x80, 0x01]);
        assert_eq!(encode(16_383), vec![0xff, 0x7f]);
        assert_eq!(encode(16_384), vec![0x80, 0x80, 0x01]);

        for len in [0, 5, 127, 128, 300, 16_384] {
            let bytes = encode(len);
            assert_eq!(Reader::new(&bytes).compact_len().unwrap(), len);
        }
    }

    #[test]
    fn test_compile_orders_accounts() {
        let payer = key(7);
        let to = key(9);
        let message = Message::compile(&payer, &[transfer(payer, to)], key(1)).unwrap();

        assert_eq!(message.account_keys, vec![payer, to, [0; PUBKEY_LEN]]);
        assert_eq!(
            message.header,
            MessageHeader {
                num_required_signatures: 1,
                num_readonly_signed: 0,
                num_readonly_unsigned: 1,
            }
        );
        assert_eq!(message.instructions[0].program_id_index, 2);
        assert_eq!(message.instructions[0].accounts, vec![0, 1]);
        assert!(message.is_writable(0));
        assert!(message.is_writable(1));
        assert!(!message.is_writable(2));
        assert_eq!(message.signer_keys(), &[payer]);
    }

    #[test]
    fn test_serialized_layout() {
        let payer = key(7);
        let message = Message::compile(&payer, &[transfer(payer, key(9))], key(1)).unwrap();
        let bytes = message.serialize();

        // header, 3 keys, blockhash, one instruction with 2 accounts and 12 data bytes
        assert_eq!(bytes.len(), 3 + 1 + 3 * 32 + 32 + 1 + (1 + 1 + 2 + 1 + 12));
        assert_eq!(&bytes[..4], &[1, 0, 1, 3]);
        assert_eq!(&bytes[4..36], &payer);
    }

    #[test]
    fn test_transaction_parses_back() {
        let payer = key(7);
        let message = Message::compile(&payer, &[transfer(payer, key(9))], key(1)).unwrap();
        let tx = Transaction {
            signatures: vec![[5; SIGNATURE_LEN]],
            message,
        };
        let parsed = Transaction::parse(&tx.serialize()).unwrap();
        assert_eq!(parsed, tx);
        assert_eq!(parsed.id().unwrap(), bs58::encode([5u8; SIGNATURE_LEN]).into_string());
    }

    #[test]
    fn test_parse_rejects_damage() {
        let payer = key(7);
        let message = Message::compile(&payer, &[transfer(payer, key(9))], key(1)).unwrap();
        let tx = Transaction {
            signatures: vec![[5; SIGNATURE_LEN]],
            message,
        };
        let bytes = tx.serialize();

        assert!(Transaction::parse(&bytes[..bytes.len() - 1]).is_err());

        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(Transaction::parse(&trailing).is_err());

        let unsigned = Transaction {
            signatures: Vec::new(),
            ..tx
        };
        assert!(Transaction::parse(&unsigned.serialize()).is_err());
    }

    #[test]
    fn test_decode_pubkey() {
        assert_eq!(decode_pubkey("11111111111111111111111111111111").unwrap(), [0; 32]);
        let address = encode_pubkey(&key(3));
        assert_eq!(decode_pubkey(&address).unwrap(), key(3));
        assert!(decode_pubkey("0OIl").is_err());
        assert!(decode_pubkey("abc").is_err());
    }
}
