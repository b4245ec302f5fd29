//! Native multi-output transfer transactions
//!
//! One System Program transfer per output, all paid and signed by the round
//! wallet, compiled into a legacy message and serialized in wire format.

use lottery_core::{Address, LedgerError, LedgerResult, RoundKeypair, TransferOutput};
use serde::ser::{SerializeTuple, Serializer};
use serde::Serialize;
use solana_program::hash::Hash;
use solana_program::message::Message;
use solana_program::pubkey::Pubkey;
use solana_program::short_vec;
use solana_program::system_instruction;
use std::str::FromStr;

fn malformed(what: impl std::fmt::Display) -> LedgerError {
    LedgerError::Malformed(what.to_string())
}

fn pubkey(address: &Address) -> LedgerResult<Pubkey> {
    Ok(Pubkey::new_from_array(address.to_bytes()?))
}

/// Ed25519 signature in its fixed-width wire form.
struct RawSignature([u8; 64]);

impl Serialize for RawSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(self.0.len())?;
        for byte in &self.0 {
            tuple.serialize_element(byte)?;
        }
        tuple.end()
    }
}

/// Signatures followed by the message they cover.
#[derive(Serialize)]
struct WireTransaction<'a> {
    #[serde(with = "short_vec")]
    signatures: Vec<RawSignature>,
    message: &'a Message,
}

/// A signed transfer ready for `sendTransaction`.
#[derive(Clone, Debug)]
pub struct SignedTransfer {
    /// Transaction id, the base58 payer signature
    pub signature: String,
    /// Wire bytes: signatures followed by the message
    pub wire: Vec<u8>,
}

impl SignedTransfer {
    pub fn to_base58(&self) -> String {
        bs58::encode(&self.wire).into_string()
    }
}

/// Compile the message paying every output from `payer`.
pub fn compile_message(
    payer: &Address,
    outputs: &[TransferOutput],
    recent_blockhash: &str,
) -> LedgerResult<Message> {
    if outputs.is_empty() {
        return Err(malformed("transfer without outputs"));
    }

    let payer = pubkey(payer)?;
    let instructions = outputs
        .iter()
        .map(|output| {
            Ok(system_instruction::transfer(
                &payer,
                &pubkey(&output.recipient)?,
                output.lamports,
            ))
        })
        .collect::<LedgerResult<Vec<_>>>()?;

    let mut message = Message::new(&instructions, Some(&payer));
    message.recent_blockhash = Hash::from_str(recent_blockhash)
        .map_err(|e| malformed(format!("blockhash {recent_blockhash}: {e}")))?;
    Ok(message)
}

/// Build and sign a transfer of every output from the round wallet.
pub fn build_transfer(
    signer: &RoundKeypair,
    outputs: &[TransferOutput],
    recent_blockhash: &str,
) -> LedgerResult<SignedTransfer> {
    let message = compile_message(&signer.address(), outputs, recent_blockhash)?;
    let message_bytes = bincode::serialize(&message).map_err(malformed)?;
    let signature = signer.sign(&message_bytes);

    let wire = bincode::serialize(&WireTransaction {
        signatures: vec![RawSignature(signature)],
        message: &message,
    })
    .map_err(malformed)?;

    Ok(SignedTransfer {
        signature: bs58::encode(signature).into_string(),
        wire,
    })
}
