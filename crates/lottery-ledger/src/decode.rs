//! Decoding of `getTransaction` results into ledger records
//!
//! A message arrives either compiled (instructions index into the account-key
//! table) or legacy/parsed (instructions name their program and accounts).
//! The encoding is probed once per message and decoded by its own path.

use crate::rpc::RpcTransaction;
use lottery_core::{
    CompiledInstruction, CompiledMessage, LedgerError, LedgerResult, LegacyInstruction,
    LegacyMessage, MessageEncoding, TransactionRecord,
};
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCompiledInstruction {
    program_id_index: usize,
    #[serde(default)]
    accounts: Vec<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLegacyInstruction {
    program_id: String,
    #[serde(default)]
    accounts: Vec<String>,
    #[serde(default)]
    parsed: Option<Value>,
}

enum Probe {
    Compiled,
    Legacy,
}

fn malformed(what: impl Into<String>) -> LedgerError {
    LedgerError::Malformed(what.into())
}

/// Turn a raw `getTransaction` result into a [`TransactionRecord`].
pub fn decode_transaction(tx: RpcTransaction) -> LedgerResult<TransactionRecord> {
    let meta = tx.meta.ok_or_else(|| malformed("transaction has no meta"))?;
    let message = decode_message(&tx.transaction.message)?;

    Ok(TransactionRecord {
        execution_error: meta.err.map(|err| err.to_string()),
        message,
        pre_balances: meta.pre_balances,
        post_balances: meta.post_balances,
    })
}

pub fn decode_message(message: &Value) -> LedgerResult<MessageEncoding> {
    let account_keys = message
        .get("accountKeys")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("message has no accountKeys"))?
        .iter()
        .map(decode_account_key)
        .collect::<LedgerResult<Vec<_>>>()?;

    let instructions = message
        .get("instructions")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("message has no instructions"))?;

    match probe(instructions) {
        Probe::Compiled => {
            let instructions = instructions
                .iter()
                .map(|ix| {
                    let raw: RawCompiledInstruction = serde_json::from_value(ix.clone())
                        .map_err(|e| malformed(format!("compiled instruction: {e}")))?;
                    Ok(CompiledInstruction {
                        program_id_index: raw.program_id_index,
                        accounts: raw.accounts,
                    })
                })
                .collect::<LedgerResult<Vec<_>>>()?;
            Ok(MessageEncoding::Compiled(CompiledMessage {
                account_keys,
                instructions,
            }))
        }
        Probe::Legacy => {
            let instructions = instructions
                .iter()
                .map(|ix| {
                    let raw: RawLegacyInstruction = serde_json::from_value(ix.clone())
                        .map_err(|e| malformed(format!("legacy instruction: {e}")))?;
                    Ok(legacy_instruction(raw))
                })
                .collect::<LedgerResult<Vec<_>>>()?;
            Ok(MessageEncoding::Legacy(LegacyMessage {
                account_keys,
                instructions,
            }))
        }
    }
}

fn probe(instructions: &[Value]) -> Probe {
    match instructions.first() {
        Some(ix) if ix.get("programIdIndex").is_none() && ix.get("programId").is_some() => {
            Probe::Legacy
        }
        _ => Probe::Compiled,
    }
}

/// Parsed system instructions carry their accounts under `parsed.info`.
fn legacy_instruction(raw: RawLegacyInstruction) -> LegacyInstruction {
    let mut accounts = raw.accounts;
    if accounts.is_empty() {
        if let Some(info) = raw.parsed.as_ref().and_then(|p| p.get("info")) {
            accounts = ["source", "destination"]
                .iter()
                .filter_map(|field| info.get(*field).and_then(Value::as_str))
                .map(str::to_string)
                .collect();
        }
    }
    LegacyInstruction {
        program_id: raw.program_id,
        accounts,
    }
}

fn decode_account_key(key: &Value) -> LedgerResult<String> {
    match key {
        Value::String(key) => Ok(key.clone()),
        Value::Object(entry) => entry
            .get("pubkey")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| malformed("account key object without pubkey")),
        other => Err(malformed(format!("unexpected account key {other}"))),
    }
}
