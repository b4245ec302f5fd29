//! Deposit verification against the external ledger
//!
//! The ledger is eventually consistent: a deposit that was just sent may not
//! be visible at the strongest commitment yet. Lookups therefore wait a
//! settling delay first and then weaken the commitment level one step at a
//! time before giving up on the full record.

use crate::config::LotteryConfig;
use crate::domain::errors::LedgerError;
use crate::domain::ledger::{Commitment, SignatureStatus, TransactionRecord};
use crate::domain::payout::lamports_to_sol;
use crate::domain::wallet::Address;
use crate::ports::outbound::{LedgerClient, Sleeper};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What the verifier is asked to confirm.
#[derive(Clone, Copy, Debug)]
pub struct VerificationRequest<'a> {
    pub transfer_id: &'a str,
    pub expected_amount: f64,
    pub sender: &'a str,
    /// Receiving address of the round the deposit is meant for
    pub receiving_address: Option<&'a Address>,
}

/// Reason a fetched record did not prove the deposit.
#[derive(Clone, Debug, PartialEq)]
pub enum Rejection {
    ExecutionFailed(String),
    NoNativeTransfer,
    SenderMismatch { found: String },
    ReceiverMismatch { found: String },
    MissingBalances,
    AmountMismatch { observed: f64 },
}

enum Lookup {
    Record(TransactionRecord),
    StatusOnly(SignatureStatus),
    /// The ledger returned a record that does not decode
    Unparseable(String),
    Missing,
}

pub struct PaymentVerifier {
    ledger: Option<Arc<dyn LedgerClient>>,
    sleeper: Arc<dyn Sleeper>,
    settling_delay: Duration,
    tolerance: f64,
    system_program_id: String,
}

impl PaymentVerifier {
    pub fn new(
        ledger: Option<Arc<dyn LedgerClient>>,
        sleeper: Arc<dyn Sleeper>,
        config: &LotteryConfig,
    ) -> Self {
        Self {
            ledger,
            sleeper,
            settling_delay: config.settling_delay,
            tolerance: config.amount_tolerance,
            system_program_id: config.system_program_id.clone(),
        }
    }

    pub fn has_ledger(&self) -> bool {
        self.ledger.is_some()
    }

    /// Whether the ledger proves a matching, successful deposit.
    ///
    /// Never fails: every error path is a `false`.
    pub async fn verify(&self, request: VerificationRequest<'_>) -> bool {
        let Some(ledger) = self.ledger.as_ref() else {
            debug!(transfer_id = request.transfer_id, "No ledger connection, rejecting");
            return false;
        };
        let Some(receiving_address) = request.receiving_address else {
            debug!(transfer_id = request.transfer_id, "Round has no receiving address");
            return false;
        };

        self.sleeper.sleep(self.settling_delay).await;

        match self.lookup(ledger.as_ref(), request.transfer_id).await {
            Lookup::Record(record) => match self.check_record(&record, &request, receiving_address) {
                Ok(()) => {
                    info!(
                        transfer_id = request.transfer_id,
                        sender = request.sender,
                        amount = request.expected_amount,
                        "Deposit verified"
                    );
                    true
                }
                Err(rejection) => {
                    warn!(
                        transfer_id = request.transfer_id,
                        rejection = ?rejection,
                        "Deposit rejected"
                    );
                    false
                }
            },
            Lookup::StatusOnly(status) => {
                // amount and receiver are not checked on this path
                let accepted = status.is_success();
                warn!(
                    transfer_id = request.transfer_id,
                    accepted,
                    confirmation = ?status.confirmation,
                    "Record unavailable, decided on signature status only"
                );
                accepted
            }
            Lookup::Unparseable(reason) => {
                warn!(
                    transfer_id = request.transfer_id,
                    reason = %reason,
                    "Deposit rejected, ledger record could not be decoded"
                );
                false
            }
            Lookup::Missing => {
                debug!(transfer_id = request.transfer_id, "Transfer not found on ledger");
                false
            }
        }
    }

    /// Only an absent record or a failed request moves on to the next
    /// commitment level and the status fallback. A record that exists but
    /// does not decode ends the lookup.
    async fn lookup(&self, ledger: &dyn LedgerClient, transfer_id: &str) -> Lookup {
        for commitment in Commitment::ESCALATION {
            match ledger.fetch_transaction(transfer_id, commitment).await {
                Ok(Some(record)) => {
                    debug!(
                        transfer_id,
                        commitment = commitment.as_str(),
                        instructions = record.message.instruction_count(),
                        "Fetched transfer record"
                    );
                    return Lookup::Record(record);
                }
                Ok(None) => {
                    debug!(transfer_id, commitment = commitment.as_str(), "Transfer not visible yet");
                }
                Err(LedgerError::Malformed(reason)) => return Lookup::Unparseable(reason),
                Err(e) => {
                    debug!(transfer_id, commitment = commitment.as_str(), error = %e, "Transfer lookup failed");
                }
            }
        }

        match ledger.fetch_signature_status(transfer_id).await {
            Ok(Some(status)) => Lookup::StatusOnly(status),
            Ok(None) => Lookup::Missing,
            Err(e) => {
                debug!(transfer_id, error = %e, "Signature status lookup failed");
                Lookup::Missing
            }
        }
    }

    /// Check a fetched record against the claimed deposit.
    pub fn check_record(
        &self,
        record: &TransactionRecord,
        request: &VerificationRequest<'_>,
        receiving_address: &Address,
    ) -> Result<(), Rejection> {
        if let Some(error) = &record.execution_error {
            return Err(Rejection::ExecutionFailed(error.clone()));
        }

        let transfer = record
            .message
            .find_native_transfer(&self.system_program_id)
            .ok_or(Rejection::NoNativeTransfer)?;

        if transfer.sender != request.sender {
            return Err(Rejection::SenderMismatch {
                found: transfer.sender,
            });
        }
        if *receiving_address != *transfer.receiver {
            return Err(Rejection::ReceiverMismatch {
                found: transfer.receiver,
            });
        }

        let delta = record
            .balance_delta(transfer.receiver_index)
            .ok_or(Rejection::MissingBalances)?;
        let observed = lamports_to_sol(delta);
        if (observed - request.expected_amount).abs() > self.tolerance {
            return Err(Rejection::AmountMismatch { observed });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::{
        CompiledInstruction, CompiledMessage, LegacyInstruction, LegacyMessage, MessageEncoding,
        SYSTEM_PROGRAM_ID,
    };
    use crate::domain::wallet::RoundKeypair;
    use crate::ports::outbound::mocks::MockLedger;
    use crate::ports::outbound::NoDelay;

    const SENDER: &str = "SenderAddress1111111111111111111111111111111";

    fn verifier(ledger: Option<MockLedger>) -> PaymentVerifier {
        let ledger = ledger.map(|l| Arc::new(l) as Arc<dyn LedgerClient>);
        PaymentVerifier::new(ledger, Arc::new(NoDelay), &LotteryConfig::default())
    }

    fn compiled_record(receiver: &str, lamports: u64) -> TransactionRecord {
        TransactionRecord {
            execution_error: None,
            message: MessageEncoding::Compiled(CompiledMessage {
                account_keys: vec![SENDER.into(), receiver.into(), SYSTEM_PROGRAM_ID.into()],
                instructions: vec![CompiledInstruction {
                    program_id_index: 2,
                    accounts: vec![0, 1],
                }],
            }),
            pre_balances: vec![10_000_000_000, 0, 1],
            post_balances: vec![10_000_000_000 - lamports - 5_000, lamports, 1],
        }
    }

    fn request<'a>(transfer_id: &'a str, amount: f64, pot: &'a Address) -> VerificationRequest<'a> {
        VerificationRequest {
            transfer_id,
            expected_amount: amount,
            sender: SENDER,
            receiving_address: Some(pot),
        }
    }

    #[tokio::test]
    async fn test_verifies_confirmed_compiled_transfer() {
        let pot = RoundKeypair::generate().address();
        let ledger = MockLedger::default().with_record(
            "tx",
            Commitment::Confirmed,
            compiled_record(pot.as_str(), 1_500_000_000),
        );
        let verifier = verifier(Some(ledger));

        assert!(verifier.verify(request("tx", 1.5, &pot)).await);
    }

    #[tokio::test]
    async fn test_verifies_legacy_transfer() {
        let pot = RoundKeypair::generate().address();
        let record = TransactionRecord {
            execution_error: None,
            message: MessageEncoding::Legacy(LegacyMessage {
                account_keys: vec![SENDER.into(), pot.to_string(), SYSTEM_PROGRAM_ID.into()],
                instructions: vec![LegacyInstruction {
                    program_id: SYSTEM_PROGRAM_ID.into(),
                    accounts: vec![SENDER.into(), pot.to_string()],
                }],
            }),
            pre_balances: vec![5_000_000_000, 0, 1],
            post_balances: vec![3_999_995_000, 1_000_000_000, 1],
        };
        let ledger = MockLedger::default().with_record("tx", Commitment::Finalized, record);

        assert!(verifier(Some(ledger)).verify(request("tx", 1.0, &pot)).await);
    }

    #[tokio::test]
    async fn test_receiver_mismatch_fails_even_with_matching_amount() {
        let pot = RoundKeypair::generate().address();
        let elsewhere = RoundKeypair::generate().address();
        let ledger = MockLedger::default().with_record(
            "tx",
            Commitment::Finalized,
            compiled_record(elsewhere.as_str(), 1_000_000_000),
        );
        let verifier = verifier(Some(ledger));

        assert!(!verifier.verify(request("tx", 1.0, &pot)).await);
        assert_eq!(
            verifier.check_record(
                &compiled_record(elsewhere.as_str(), 1_000_000_000),
                &request("tx", 1.0, &pot),
                &pot
            ),
            Err(Rejection::ReceiverMismatch {
                found: elsewhere.to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_sender_mismatch_fails() {
        let pot = RoundKeypair::generate().address();
        let record = compiled_record(pot.as_str(), 1_000_000_000);
        let verifier = verifier(None);
        let req = VerificationRequest {
            sender: "SomebodyElse",
            ..request("tx", 1.0, &pot)
        };
        assert!(matches!(
            verifier.check_record(&record, &req, &pot),
            Err(Rejection::SenderMismatch { .. })
        ));
    }

    #[test]
    fn test_amount_tolerance() {
        let pot = RoundKeypair::generate().address();
        let verifier = verifier(None);
        let record = compiled_record(pot.as_str(), 1_000_500_000);

        assert!(verifier.check_record(&record, &request("tx", 1.0, &pot), &pot).is_ok());
        assert!(matches!(
            verifier.check_record(&record, &request("tx", 1.002, &pot), &pot),
            Err(Rejection::AmountMismatch { .. })
        ));
    }

    #[test]
    fn test_execution_error_rejected() {
        let pot = RoundKeypair::generate().address();
        let mut record = compiled_record(pot.as_str(), 1_000_000_000);
        record.execution_error = Some("InsufficientFundsForRent".into());

        assert_eq!(
            verifier(None).check_record(&record, &request("tx", 1.0, &pot), &pot),
            Err(Rejection::ExecutionFailed("InsufficientFundsForRent".into()))
        );
    }

    #[test]
    fn test_empty_instruction_list_rejected() {
        let pot = RoundKeypair::generate().address();
        let record = TransactionRecord {
            execution_error: None,
            message: MessageEncoding::Compiled(CompiledMessage::default()),
            pre_balances: vec![],
            post_balances: vec![],
        };
        assert_eq!(
            verifier(None).check_record(&record, &request("tx", 1.0, &pot), &pot),
            Err(Rejection::NoNativeTransfer)
        );
    }

    #[tokio::test]
    async fn test_escalates_commitment_levels() {
        let pot = RoundKeypair::generate().address();
        let ledger = Arc::new(MockLedger::default().with_record(
            "tx",
            Commitment::Processed,
            compiled_record(pot.as_str(), 2_000_000_000),
        ));
        let verifier = PaymentVerifier::new(
            Some(ledger.clone() as Arc<dyn LedgerClient>),
            Arc::new(NoDelay),
            &LotteryConfig::default(),
        );

        assert!(verifier.verify(request("tx", 2.0, &pot)).await);
        assert_eq!(*ledger.fetch_calls.lock(), 3);
    }

    #[tokio::test]
    async fn test_signature_status_fallback() {
        let pot = RoundKeypair::generate().address();
        let ledger = MockLedger::default()
            .with_status(
                "landed",
                SignatureStatus {
                    error: None,
                    confirmation: Some(Commitment::Confirmed),
                },
            )
            .with_status(
                "failed",
                SignatureStatus {
                    error: Some("InstructionError".into()),
                    confirmation: Some(Commitment::Confirmed),
                },
            );
        let verifier = verifier(Some(ledger));

        assert!(verifier.verify(request("landed", 1.0, &pot)).await);
        assert!(!verifier.verify(request("failed", 1.0, &pot)).await);
        assert!(!verifier.verify(request("unknown", 1.0, &pot)).await);
    }

    fn landed() -> SignatureStatus {
        SignatureStatus {
            error: None,
            confirmation: Some(Commitment::Finalized),
        }
    }

    #[tokio::test]
    async fn test_failed_lookup_moves_to_next_level() {
        let pot = RoundKeypair::generate().address();
        let ledger = Arc::new(
            MockLedger::default()
                .with_failure("tx", Commitment::Finalized, LedgerError::Transport("timed out".into()))
                .with_record("tx", Commitment::Confirmed, compiled_record(pot.as_str(), 1_000_000_000)),
        );
        let verifier = PaymentVerifier::new(
            Some(ledger.clone() as Arc<dyn LedgerClient>),
            Arc::new(NoDelay),
            &LotteryConfig::default(),
        );

        assert!(verifier.verify(request("tx", 1.0, &pot)).await);
        assert_eq!(*ledger.fetch_calls.lock(), 2);
    }

    #[tokio::test]
    async fn test_rpc_errors_everywhere_fall_back_to_status() {
        let pot = RoundKeypair::generate().address();
        let mut ledger = MockLedger::default().with_status("tx", landed());
        for commitment in Commitment::ESCALATION {
            ledger = ledger.with_failure(
                "tx",
                commitment,
                LedgerError::Rpc {
                    code: -32005,
                    message: "Node is behind".into(),
                },
            );
        }

        assert!(verifier(Some(ledger)).verify(request("tx", 1.0, &pot)).await);
    }

    #[tokio::test]
    async fn test_undecodable_record_rejected_despite_successful_status() {
        let pot = RoundKeypair::generate().address();
        let ledger = Arc::new(
            MockLedger::default()
                .with_failure(
                    "tx",
                    Commitment::Finalized,
                    LedgerError::Malformed("instructions is not an array".into()),
                )
                .with_status("tx", landed()),
        );
        let verifier = PaymentVerifier::new(
            Some(ledger.clone() as Arc<dyn LedgerClient>),
            Arc::new(NoDelay),
            &LotteryConfig::default(),
        );

        assert!(!verifier.verify(request("tx", 5.0, &pot)).await);
        // no weaker level is consulted once a record was seen
        assert_eq!(*ledger.fetch_calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_status_lookup_error_rejects() {
        let pot = RoundKeypair::generate().address();
        let ledger = MockLedger::default();
        *ledger.status_failure.lock() = Some(LedgerError::Transport("reset by peer".into()));

        assert!(!verifier(Some(ledger)).verify(request("tx", 1.0, &pot)).await);
    }

    #[tokio::test]
    async fn test_no_ledger_or_address_rejects() {
        let pot = RoundKeypair::generate().address();
        assert!(!verifier(None).verify(request("tx", 1.0, &pot)).await);

        let no_address = VerificationRequest {
            receiving_address: None,
            ..request("tx", 1.0, &pot)
        };
        assert!(!verifier(Some(MockLedger::default())).verify(no_address).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settling_delay_precedes_lookup() {
        let pot = RoundKeypair::generate().address();
        let ledger = Arc::new(MockLedger::default());
        let verifier = PaymentVerifier::new(
            Some(ledger.clone() as Arc<dyn LedgerClient>),
            Arc::new(crate::ports::outbound::TokioSleeper),
            &LotteryConfig::default(),
        );

        let started = tokio::time::Instant::now();
        assert!(!verifier.verify(request("tx", 1.0, &pot)).await);
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(*ledger.fetch_calls.lock(), 3);
    }
}
