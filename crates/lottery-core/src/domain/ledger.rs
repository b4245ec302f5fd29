//! Ledger value objects
//!
//! Decoded views of what the external ledger returns for a transaction, plus
//! the two instruction encodings a record can arrive in.

use super::wallet::Address;
use serde::{Deserialize, Serialize};

/// Native value-transfer program.
pub const SYSTEM_PROGRAM_ID: &str = "11111111111111111111111111111111";

/// Commitment levels, strongest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Finalized,
    Confirmed,
    Processed,
}

impl Commitment {
    /// Order in which lookups weaken their consistency requirement.
    pub const ESCALATION: [Commitment; 3] = [
        Commitment::Finalized,
        Commitment::Confirmed,
        Commitment::Processed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Finalized => "finalized",
            Commitment::Confirmed => "confirmed",
            Commitment::Processed => "processed",
        }
    }
}

/// A fetched transaction with its balance metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct TransactionRecord {
    /// Execution error reported by the ledger, if the transaction failed
    pub execution_error: Option<String>,
    pub message: MessageEncoding,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
}

impl TransactionRecord {
    /// Lamport change of the account at `index`.
    pub fn balance_delta(&self, index: usize) -> Option<i128> {
        let pre = *self.pre_balances.get(index)?;
        let post = *self.post_balances.get(index)?;
        Some(post as i128 - pre as i128)
    }
}

/// Wire encoding of a transaction message, resolved once per record.
#[derive(Clone, Debug, PartialEq)]
pub enum MessageEncoding {
    /// Instructions name their program and accounts directly
    Legacy(LegacyMessage),
    /// Instructions index into the shared account-key table
    Compiled(CompiledMessage),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LegacyMessage {
    pub account_keys: Vec<String>,
    pub instructions: Vec<LegacyInstruction>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LegacyInstruction {
    pub program_id: String,
    pub accounts: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompiledMessage {
    pub account_keys: Vec<String>,
    pub instructions: Vec<CompiledInstruction>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompiledInstruction {
    pub program_id_index: usize,
    pub accounts: Vec<usize>,
}

/// The first native transfer found in a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeTransfer {
    pub sender: String,
    pub receiver: String,
    /// Position of the receiver in the account-key table (balance index)
    pub receiver_index: usize,
}

impl MessageEncoding {
    /// Locate the first instruction targeting `program_id`.
    ///
    /// Returns `None` when no such instruction exists or when its account
    /// references cannot be resolved.
    pub fn find_native_transfer(&self, program_id: &str) -> Option<NativeTransfer> {
        match self {
            MessageEncoding::Legacy(message) => decode_legacy(message, program_id),
            MessageEncoding::Compiled(message) => decode_compiled(message, program_id),
        }
    }

    pub fn instruction_count(&self) -> usize {
        match self {
            MessageEncoding::Legacy(m) => m.instructions.len(),
            MessageEncoding::Compiled(m) => m.instructions.len(),
        }
    }
}

fn decode_legacy(message: &LegacyMessage, program_id: &str) -> Option<NativeTransfer> {
    let instruction = message
        .instructions
        .iter()
        .find(|ix| ix.program_id == program_id)?;
    let sender = instruction.accounts.first()?.clone();
    let receiver = instruction.accounts.get(1)?.clone();
    let receiver_index = message.account_keys.iter().position(|k| *k == receiver)?;
    Some(NativeTransfer {
        sender,
        receiver,
        receiver_index,
    })
}

fn decode_compiled(message: &CompiledMessage, program_id: &str) -> Option<NativeTransfer> {
    let keys = &message.account_keys;
    let instruction = message.instructions.iter().find(|ix| {
        keys.get(ix.program_id_index)
            .is_some_and(|key| key == program_id)
    })?;
    let sender_index = *instruction.accounts.first()?;
    let receiver_index = *instruction.accounts.get(1)?;
    Some(NativeTransfer {
        sender: keys.get(sender_index)?.clone(),
        receiver: keys.get(receiver_index)?.clone(),
        receiver_index,
    })
}

/// Lightweight status of a signature, without financial detail.
#[derive(Clone, Debug, PartialEq)]
pub struct SignatureStatus {
    pub error: Option<String>,
    pub confirmation: Option<Commitment>,
}

impl SignatureStatus {
    /// Landed without error at some confirmation level.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.confirmation.is_some()
    }
}

/// One leg of a multi-output transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferOutput {
    pub recipient: Address,
    pub lamports: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "AliceAddress";
    const POT: &str = "PotAddress";

    fn compiled(program_index: usize, accounts: Vec<usize>) -> MessageEncoding {
        MessageEncoding::Compiled(CompiledMessage {
            account_keys: vec![ALICE.into(), POT.into(), SYSTEM_PROGRAM_ID.into()],
            instructions: vec![CompiledInstruction {
                program_id_index: program_index,
                accounts,
            }],
        })
    }

    #[test]
    fn test_compiled_transfer_resolves_indices() {
        let transfer = compiled(2, vec![0, 1])
            .find_native_transfer(SYSTEM_PROGRAM_ID)
            .unwrap();
        assert_eq!(transfer.sender, ALICE);
        assert_eq!(transfer.receiver, POT);
        assert_eq!(transfer.receiver_index, 1);
    }

    #[test]
    fn test_compiled_non_system_program_is_ignored() {
        assert!(compiled(1, vec![0, 1])
            .find_native_transfer(SYSTEM_PROGRAM_ID)
            .is_none());
    }

    #[test]
    fn test_compiled_out_of_range_account_fails() {
        assert!(compiled(2, vec![0, 9])
            .find_native_transfer(SYSTEM_PROGRAM_ID)
            .is_none());
    }

    #[test]
    fn test_legacy_transfer_skips_other_programs() {
        let message = MessageEncoding::Legacy(LegacyMessage {
            account_keys: vec![ALICE.into(), "Memo".into(), POT.into()],
            instructions: vec![
                LegacyInstruction {
                    program_id: "MemoProgram".into(),
                    accounts: vec![ALICE.into()],
                },
                LegacyInstruction {
                    program_id: SYSTEM_PROGRAM_ID.into(),
                    accounts: vec![ALICE.into(), POT.into()],
                },
            ],
        });
        let transfer = message.find_native_transfer(SYSTEM_PROGRAM_ID).unwrap();
        assert_eq!(transfer.receiver_index, 2);
        assert_eq!(message.instruction_count(), 2);
    }

    #[test]
    fn test_empty_legacy_message_has_no_transfer() {
        let message = MessageEncoding::Legacy(LegacyMessage::default());
        assert!(message.find_native_transfer(SYSTEM_PROGRAM_ID).is_none());
    }

    #[test]
    fn test_balance_delta() {
        let record = TransactionRecord {
            execution_error: None,
            message: MessageEncoding::Compiled(CompiledMessage::default()),
            pre_balances: vec![5_000_000_000, 0],
            post_balances: vec![3_999_995_000, 1_000_000_000],
        };
        assert_eq!(record.balance_delta(1), Some(1_000_000_000));
        assert_eq!(record.balance_delta(0), Some(-1_000_005_000));
        assert_eq!(record.balance_delta(5), None);
    }

    #[test]
    fn test_signature_status_success() {
        let landed = SignatureStatus {
            error: None,
            confirmation: Some(Commitment::Confirmed),
        };
        let failed = SignatureStatus {
            error: Some("InstructionError".into()),
            confirmation: Some(Commitment::Finalized),
        };
        let pending = SignatureStatus {
            error: None,
            confirmation: None,
        };
        assert!(landed.is_success());
        assert!(!failed.is_success());
        assert!(!pending.is_success());
    }
}
