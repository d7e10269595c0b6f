use crux_core::capability::{CapabilityContext, Operation};
use crux_core::macros::Capability;
use serde::{Deserialize, Serialize};

use crate::{
    model::{Amount, Payload, SubmissionId},
    payment::SettlementError,
};

/// Ledger round trips. Submission internals and the wire protocol live in the
/// shell; the core only sequences them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum LedgerOperation {
    SubmitPayment {
        submission: SubmissionId,
        payload: Payload,
        amount: Amount,
    },
    ReceiveCash {
        submission: SubmissionId,
        payload: Payload,
    },
    RemoteSend {
        submission: SubmissionId,
        payload: Payload,
        amount: Amount,
    },
    Cancel {
        submission: SubmissionId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum LedgerOutput {
    Settled,
    Received { amount: Amount },
    Failed(SettlementError),
    Cancelled,
}

impl LedgerOutput {
    pub fn into_settlement(self) -> Result<(), SettlementError> {
        match self {
            Self::Settled => Ok(()),
            Self::Received { .. } => Err(SettlementError::Rejected {
                reason: "unexpected receive response".into(),
            }),
            Self::Failed(error) => Err(error),
            Self::Cancelled => Err(SettlementError::Cancelled),
        }
    }

    pub fn into_received(self) -> Result<Amount, SettlementError> {
        match self {
            Self::Received { amount } => Ok(amount),
            Self::Settled => Err(SettlementError::Rejected {
                reason: "receive settled without an amount".into(),
            }),
            Self::Failed(error) => Err(error),
            Self::Cancelled => Err(SettlementError::Cancelled),
        }
    }
}

impl Operation for LedgerOperation {
    type Output = LedgerOutput;
}

#[derive(Capability)]
pub struct Ledger<Ev> {
    context: CapabilityContext<LedgerOperation, Ev>,
}

impl<Ev> Ledger<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<LedgerOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn submit_payment<F>(
        &self,
        submission: SubmissionId,
        payload: Payload,
        amount: Amount,
        callback: F,
    ) where
        F: FnOnce(Result<(), SettlementError>) -> Ev + Send + 'static,
    {
        self.request(
            LedgerOperation::SubmitPayment {
                submission,
                payload,
                amount,
            },
            move |output| callback(output.into_settlement()),
        );
    }

    pub fn receive_cash<F>(&self, submission: SubmissionId, payload: Payload, callback: F)
    where
        F: FnOnce(Result<Amount, SettlementError>) -> Ev + Send + 'static,
    {
        self.request(
            LedgerOperation::ReceiveCash {
                submission,
                payload,
            },
            move |output| callback(output.into_received()),
        );
    }

    pub fn remote_send<F>(
        &self,
        submission: SubmissionId,
        payload: Payload,
        amount: Amount,
        callback: F,
    ) where
        F: FnOnce(Result<(), SettlementError>) -> Ev + Send + 'static,
    {
        self.request(
            LedgerOperation::RemoteSend {
                submission,
                payload,
                amount,
            },
            move |output| callback(output.into_settlement()),
        );
    }

    /// Asks the shell to abandon `submission`. The shell answers the original
    /// request with `Cancelled`, which the core discards as stale.
    pub fn cancel(&self, submission: SubmissionId) {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            ctx.notify_shell(LedgerOperation::Cancel { submission }).await;
        });
    }

    fn request<F>(&self, operation: LedgerOperation, callback: F)
    where
        F: FnOnce(LedgerOutput) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let output = ctx.request_from_shell(operation).await;
            ctx.update_app(callback(output));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_mapping() {
        assert_eq!(LedgerOutput::Settled.into_settlement(), Ok(()));
        assert_eq!(
            LedgerOutput::Cancelled.into_settlement(),
            Err(SettlementError::Cancelled)
        );
        assert_eq!(
            LedgerOutput::Received {
                amount: Amount::kin(5)
            }
            .into_received(),
            Ok(Amount::kin(5))
        );
        assert!(LedgerOutput::Settled.into_received().is_err());
        assert_eq!(
            LedgerOutput::Failed(SettlementError::Network).into_received(),
            Err(SettlementError::Network)
        );
    }

    #[test]
    fn test_ledger_output_serialization() {
        let output = LedgerOutput::Failed(SettlementError::Rejected {
            reason: "expired".into(),
        });
        let json = serde_json::to_string(&output).unwrap();
        assert_eq!(serde_json::from_str::<LedgerOutput>(&json).unwrap(), output);
    }
}
