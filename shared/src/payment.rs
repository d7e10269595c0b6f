//! Payment confirmation for a requested-payment bill.
//!
//! ```text
//! AwaitingConfirmation --confirm--> Sending --settled--> Sent --settle delay--> cleared
//!          |                           |
//!          +--reject/cancel--> cleared +--failed--> AwaitingConfirmation (or cleared when exhausted)
//! ```
//!
//! The confirmation itself lives in [`BillStore`]; this module owns the rules
//! for moving it and asks the store to dismiss when it terminates.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    analytics::AnalyticsEvent,
    bill_store::BillStore,
    command::Command,
    model::{DismissReason, PaymentState, SubmissionId},
    timer::{TimerKey, TimerService},
    TransitionError, UnixTimeMs,
};

/// Why the ledger did not settle an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SettlementError {
    #[error("rejected by ledger: {reason}")]
    Rejected { reason: String },
    #[error("network failure")]
    Network,
    #[error("settlement timed out")]
    Timeout,
    #[error("operation cancelled")]
    Cancelled,
}

impl SettlementError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Timeout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back to `AwaitingConfirmation`; the user may confirm again.
    Retry { remaining: u32 },
    /// Attempts used up; the bill was dismissed as cancelled.
    Exhausted,
}

#[derive(Debug, Clone, Copy)]
pub struct PaymentFlow {
    max_attempts: u32,
    settle_delay: Duration,
}

impl Default for PaymentFlow {
    fn default() -> Self {
        Self::new(crate::MAX_PAYMENT_ATTEMPTS, crate::PAYMENT_SETTLE_DELAY)
    }
}

fn current_state(bills: &BillStore) -> Result<PaymentState, TransitionError> {
    match (bills.bill(), bills.confirmation()) {
        (None, _) => Err(TransitionError::NoActiveBill),
        (Some(_), None) => Err(TransitionError::WrongBillKind {
            expected: "payment",
        }),
        (Some(_), Some(confirmation)) => Ok(confirmation.state),
    }
}

impl PaymentFlow {
    #[must_use]
    pub fn new(max_attempts: u32, settle_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            settle_delay,
        }
    }

    /// Submits the payment. Only valid from `AwaitingConfirmation`, so a
    /// duplicated tap cannot double-submit.
    pub fn confirm(&self, bills: &mut BillStore) -> Result<Vec<Command>, TransitionError> {
        let state = current_state(bills)?;
        if state != PaymentState::AwaitingConfirmation {
            return Err(TransitionError::InvalidPaymentState {
                from: state,
                action: "confirm",
            });
        }

        let submission = bills.mint_submission();
        bills.set_can_swipe(false);
        let confirmation = bills
            .confirmation_mut()
            .ok_or(TransitionError::NoActiveBill)?;
        confirmation.state = PaymentState::Sending;
        confirmation.attempts += 1;
        confirmation.in_flight = Some(submission);
        info!(bill = %confirmation.bill_id, %submission, attempt = confirmation.attempts, "payment sending");

        Ok(vec![Command::SubmitPayment {
            submission,
            payload: confirmation.payload.clone(),
            amount: confirmation.requested_amount.clone(),
        }])
    }

    /// Declines the request before anything was sent.
    pub fn reject(
        &self,
        bills: &mut BillStore,
        timers: &mut TimerService,
    ) -> Result<Vec<Command>, TransitionError> {
        let state = current_state(bills)?;
        if state != PaymentState::AwaitingConfirmation {
            return Err(TransitionError::InvalidPaymentState {
                from: state,
                action: "reject",
            });
        }
        bills.dismiss(DismissReason::Cancelled, timers)
    }

    /// Abandons the payment, interrupting a send in flight.
    pub fn cancel(
        &self,
        bills: &mut BillStore,
        timers: &mut TimerService,
    ) -> Result<Vec<Command>, TransitionError> {
        let state = current_state(bills)?;
        if state == PaymentState::Sent {
            return Err(TransitionError::InvalidPaymentState {
                from: state,
                action: "cancel",
            });
        }
        bills.dismiss(DismissReason::Cancelled, timers)
    }

    pub fn settlement_succeeded(
        &self,
        submission: SubmissionId,
        bills: &mut BillStore,
        timers: &mut TimerService,
        now: UnixTimeMs,
    ) -> Result<Vec<Command>, TransitionError> {
        let confirmation = bills
            .confirmation_mut()
            .filter(|c| c.state == PaymentState::Sending && c.in_flight == Some(submission))
            .ok_or(TransitionError::Stale)?;
        confirmation.state = PaymentState::Sent;
        confirmation.in_flight = None;
        info!(bill = %confirmation.bill_id, %submission, "payment sent");

        Ok(vec![
            Command::Track(AnalyticsEvent::transfer(&confirmation.requested_amount, true)),
            timers.start(TimerKey::PaymentSettle, self.settle_delay, now),
        ])
    }

    pub fn settlement_failed(
        &self,
        submission: SubmissionId,
        error: &SettlementError,
        bills: &mut BillStore,
        timers: &mut TimerService,
    ) -> Result<(FailureOutcome, Vec<Command>), TransitionError> {
        let confirmation = bills
            .confirmation_mut()
            .filter(|c| c.state == PaymentState::Sending && c.in_flight == Some(submission))
            .ok_or(TransitionError::Stale)?;
        confirmation.in_flight = None;
        let attempts = confirmation.attempts;
        let mut commands = vec![Command::Track(AnalyticsEvent::transfer(
            &confirmation.requested_amount,
            false,
        ))];
        warn!(bill = %confirmation.bill_id, %submission, %error, attempts, "payment failed");

        if attempts >= self.max_attempts {
            commands.extend(bills.dismiss(DismissReason::Cancelled, timers)?);
            return Ok((FailureOutcome::Exhausted, commands));
        }

        confirmation.state = PaymentState::AwaitingConfirmation;
        bills.set_can_swipe(true);
        Ok((
            FailureOutcome::Retry {
                remaining: self.max_attempts - attempts,
            },
            commands,
        ))
    }

    /// The settle delay after `Sent` ran out: release the bill.
    pub fn settle_elapsed(
        &self,
        bills: &mut BillStore,
        timers: &mut TimerService,
    ) -> Result<Vec<Command>, TransitionError> {
        if current_state(bills)? != PaymentState::Sent {
            return Err(TransitionError::Stale);
        }
        bills.set_can_swipe(true);
        bills.dismiss(DismissReason::SendCompleted, timers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::*;

    const NOW: UnixTimeMs = UnixTimeMs(5_000);

    struct Harness {
        flow: PaymentFlow,
        bills: BillStore,
        timers: TimerService,
    }

    impl Harness {
        fn with_payment() -> Self {
            let mut harness = Self {
                flow: PaymentFlow::default(),
                bills: BillStore::default(),
                timers: TimerService::new(),
            };
            harness
                .bills
                .present(payment_bill(25), &mut harness.timers, NOW)
                .unwrap();
            harness
        }

        fn state(&self) -> Option<PaymentState> {
            self.bills.confirmation().map(|c| c.state)
        }

        fn confirm(&mut self) -> SubmissionId {
            let commands = self.flow.confirm(&mut self.bills).unwrap();
            commands[0].submission().unwrap()
        }
    }

    #[test]
    fn test_confirm_moves_to_sending_and_locks_swipe() {
        let mut h = Harness::with_payment();
        let commands = h.flow.confirm(&mut h.bills).unwrap();

        assert!(matches!(commands.as_slice(), [Command::SubmitPayment { .. }]));
        assert_eq!(h.state(), Some(PaymentState::Sending));
        assert!(!h.bills.state().can_swipe_to_dismiss);
    }

    #[test]
    fn test_confirm_is_noop_outside_awaiting() {
        let mut h = Harness::with_payment();
        h.confirm();
        assert_eq!(
            h.flow.confirm(&mut h.bills),
            Err(TransitionError::InvalidPaymentState {
                from: PaymentState::Sending,
                action: "confirm"
            })
        );
        assert_eq!(h.bills.confirmation().unwrap().attempts, 1);
    }

    #[test]
    fn test_confirm_without_payment_bill() {
        let mut bills = BillStore::default();
        let flow = PaymentFlow::default();
        assert_eq!(flow.confirm(&mut bills), Err(TransitionError::NoActiveBill));

        let mut timers = TimerService::new();
        bills.present(cash_bill(10), &mut timers, NOW).unwrap();
        assert!(matches!(
            flow.confirm(&mut bills),
            Err(TransitionError::WrongBillKind { .. })
        ));
    }

    #[test]
    fn test_success_then_settle_dismisses() {
        let mut h = Harness::with_payment();
        let submission = h.confirm();

        let commands = h
            .flow
            .settlement_succeeded(submission, &mut h.bills, &mut h.timers, NOW)
            .unwrap();
        assert_eq!(h.state(), Some(PaymentState::Sent));
        assert!(h.timers.is_running(TimerKey::PaymentSettle));
        assert!(commands
            .iter()
            .any(|c| matches!(c, Command::Track(AnalyticsEvent::Transfer { successful: true, .. }))));

        h.flow.settle_elapsed(&mut h.bills, &mut h.timers).unwrap();
        assert!(!h.bills.has_bill());
        assert!(h.bills.confirmation().is_none());
        assert_eq!(h.bills.last_dismissal(), Some(DismissReason::SendCompleted));
    }

    #[test]
    fn test_failure_returns_to_awaiting_until_exhausted() {
        let mut h = Harness::with_payment();

        for remaining in [2, 1] {
            let submission = h.confirm();
            let (outcome, _) = h
                .flow
                .settlement_failed(submission, &SettlementError::Network, &mut h.bills, &mut h.timers)
                .unwrap();
            assert_eq!(outcome, FailureOutcome::Retry { remaining });
            assert_eq!(h.state(), Some(PaymentState::AwaitingConfirmation));
            assert!(h.bills.state().can_swipe_to_dismiss);
        }

        let submission = h.confirm();
        let (outcome, _) = h
            .flow
            .settlement_failed(submission, &SettlementError::Network, &mut h.bills, &mut h.timers)
            .unwrap();
        assert_eq!(outcome, FailureOutcome::Exhausted);
        assert!(!h.bills.has_bill());
        assert_eq!(h.bills.last_dismissal(), Some(DismissReason::Cancelled));
    }

    #[test]
    fn test_cancel_while_sending_clears_and_cancels_submission() {
        let mut h = Harness::with_payment();
        let submission = h.confirm();

        let commands = h.flow.cancel(&mut h.bills, &mut h.timers).unwrap();
        assert!(commands.contains(&Command::CancelSubmission { submission }));
        assert!(!h.bills.has_bill());
        assert_eq!(h.bills.last_dismissal(), Some(DismissReason::Cancelled));

        // A late settlement for the cancelled submission is stale.
        assert_eq!(
            h.flow
                .settlement_succeeded(submission, &mut h.bills, &mut h.timers, NOW),
            Err(TransitionError::Stale)
        );
    }

    #[test]
    fn test_reject_only_from_awaiting() {
        let mut h = Harness::with_payment();
        h.confirm();
        assert!(h.flow.reject(&mut h.bills, &mut h.timers).is_err());
        assert_eq!(h.state(), Some(PaymentState::Sending));

        let mut h = Harness::with_payment();
        h.flow.reject(&mut h.bills, &mut h.timers).unwrap();
        assert!(!h.bills.has_bill());
    }

    #[test]
    fn test_mismatched_submission_is_stale() {
        let mut h = Harness::with_payment();
        let submission = h.confirm();
        assert_eq!(
            h.flow.settlement_failed(
                SubmissionId(submission.0 + 100),
                &SettlementError::Timeout,
                &mut h.bills,
                &mut h.timers
            ),
            Err(TransitionError::Stale)
        );
        assert_eq!(h.state(), Some(PaymentState::Sending));
    }

    #[test]
    fn test_settlement_error_retryability() {
        assert!(SettlementError::Network.is_retryable());
        assert!(SettlementError::Timeout.is_retryable());
        assert!(!SettlementError::Cancelled.is_retryable());
        assert!(!SettlementError::Rejected { reason: "nope".into() }.is_retryable());
    }
}
