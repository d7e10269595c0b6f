//! The single active bill and its UI-facing state.
//!
//! Every way a bill leaves the screen runs through [`BillStore::clear`]: the bill
//! and its confirmation go together, the screen timer for it is cancelled, and
//! any ledger operation still in flight for it is cancelled.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    analytics::{AnalyticsEvent, BillAnalyticsState},
    command::Command,
    model::{
        Bill, BillState, CashOrigin, DismissReason, PaymentConfirmation, SubmissionId,
    },
    payment::SettlementError,
    timer::{TimerKey, TimerService},
    TransitionError, UnixTimeMs,
};

#[derive(Debug)]
pub struct BillStore {
    state: BillState,
    remote_send: Option<SubmissionId>,
    receiving: Option<SubmissionId>,
    last_dismissal: Option<DismissReason>,
    next_submission: u64,
    screen_timeout: Duration,
}

impl Default for BillStore {
    fn default() -> Self {
        Self::new(crate::BILL_SCREEN_TIMEOUT)
    }
}

impl BillStore {
    #[must_use]
    pub fn new(screen_timeout: Duration) -> Self {
        Self {
            state: BillState::default(),
            remote_send: None,
            receiving: None,
            last_dismissal: None,
            next_submission: 0,
            screen_timeout,
        }
    }

    #[must_use]
    pub fn state(&self) -> &BillState {
        &self.state
    }

    #[must_use]
    pub fn bill(&self) -> Option<&Bill> {
        self.state.bill.as_ref()
    }

    #[must_use]
    pub fn has_bill(&self) -> bool {
        self.state.bill.is_some()
    }

    #[must_use]
    pub fn confirmation(&self) -> Option<&PaymentConfirmation> {
        self.state.payment_confirmation.as_ref()
    }

    #[must_use]
    pub const fn is_remote_send_loading(&self) -> bool {
        self.remote_send.is_some()
    }

    /// Why the most recent bill left the screen.
    #[must_use]
    pub const fn last_dismissal(&self) -> Option<DismissReason> {
        self.last_dismissal
    }

    /// Installs `bill`. A dismissible active bill is first cleared with reason
    /// `Replaced`; an active bill that cannot be dismissed stays and the
    /// request fails.
    pub fn present(
        &mut self,
        bill: Bill,
        timers: &mut TimerService,
        now: UnixTimeMs,
    ) -> Result<Vec<Command>, TransitionError> {
        if let Some(active) = &self.state.bill {
            if !self.state.can_swipe_to_dismiss {
                warn!(active = %active.id(), incoming = %bill.id(), "present refused, active bill is not dismissible");
                return Err(TransitionError::NotDismissible);
            }
        }

        let mut commands = self.clear(DismissReason::Replaced, timers);

        info!(bill = %bill.id(), kind = bill.kind_name(), fingerprint = %bill.payload().fingerprint(), "bill presented");
        commands.push(Command::Track(AnalyticsEvent::bill(BillAnalyticsState::Shown, &bill)));
        if let Bill::Payment { id, payload, request } = &bill {
            commands.push(Command::Track(AnalyticsEvent::request_payment(&request.amount)));
            self.state.payment_confirmation = Some(PaymentConfirmation::awaiting(
                *id,
                payload.clone(),
                request.amount.clone(),
            ));
            self.state.hide_bill_buttons = true;
        }
        self.state.bill = Some(bill);
        self.state.can_swipe_to_dismiss = true;
        commands.push(timers.start(TimerKey::ScreenTimeout, self.screen_timeout, now));
        Ok(commands)
    }

    /// Flags the active cash bill as accepted by its recipient. The bill stays.
    pub fn mark_received(&mut self) -> Result<(), TransitionError> {
        match &mut self.state.bill {
            Some(Bill::Cash { id, received, .. }) => {
                info!(bill = %id, "bill received");
                *received = true;
                self.state.hide_bill_buttons = true;
                Ok(())
            }
            Some(Bill::Payment { .. }) => Err(TransitionError::WrongBillKind { expected: "cash" }),
            None => Err(TransitionError::NoActiveBill),
        }
    }

    /// Clears the active bill. A user swipe is refused while the bill is not
    /// dismissible; every other reason is forced.
    pub fn dismiss(
        &mut self,
        reason: DismissReason,
        timers: &mut TimerService,
    ) -> Result<Vec<Command>, TransitionError> {
        if self.state.bill.is_none() {
            return Err(TransitionError::NoActiveBill);
        }
        if reason == DismissReason::UserSwipe && !self.state.can_swipe_to_dismiss {
            return Err(TransitionError::NotDismissible);
        }
        Ok(self.clear(reason, timers))
    }

    /// Stops a remote send in flight and dismisses the bill as cancelled.
    pub fn cancel_send(&mut self, timers: &mut TimerService) -> Result<Vec<Command>, TransitionError> {
        if self.state.bill.is_none() {
            return Err(TransitionError::NoActiveBill);
        }
        if self.remote_send.is_none() {
            return Err(TransitionError::NotSendable("no send in progress"));
        }
        Ok(self.clear(DismissReason::Cancelled, timers))
    }

    /// Offers our own unreceived cash bill as a link.
    pub fn begin_remote_send(&mut self) -> Result<Vec<Command>, TransitionError> {
        let (payload, amount) = match &self.state.bill {
            None => return Err(TransitionError::NoActiveBill),
            Some(Bill::Payment { .. }) => {
                return Err(TransitionError::WrongBillKind { expected: "cash" })
            }
            Some(Bill::Cash { origin, .. }) if *origin != CashOrigin::Given => {
                return Err(TransitionError::NotSendable("bill was not created by us"))
            }
            Some(Bill::Cash { received: true, .. }) => {
                return Err(TransitionError::NotSendable("bill was already received"))
            }
            Some(Bill::Cash { .. }) if self.remote_send.is_some() => {
                return Err(TransitionError::NotSendable("send already in progress"))
            }
            Some(Bill::Cash {
                payload, amount, ..
            }) => (payload.clone(), amount.clone()),
        };

        let submission = self.mint_submission();
        info!(%submission, "remote send started");
        self.remote_send = Some(submission);
        self.state.can_swipe_to_dismiss = false;
        Ok(vec![Command::RemoteSend {
            submission,
            payload,
            amount,
        }])
    }

    pub fn remote_send_resolved(
        &mut self,
        submission: SubmissionId,
        result: Result<(), SettlementError>,
        timers: &mut TimerService,
    ) -> Result<Vec<Command>, TransitionError> {
        if self.remote_send != Some(submission) {
            return Err(TransitionError::Stale);
        }
        self.remote_send = None;
        let amount = self
            .state
            .bill
            .as_ref()
            .map(|bill| bill.amount().clone())
            .ok_or(TransitionError::NoActiveBill)?;

        match result {
            Ok(()) => {
                let mut commands = vec![Command::Track(AnalyticsEvent::transfer(&amount, true))];
                commands.extend(self.clear(DismissReason::SendCompleted, timers));
                Ok(commands)
            }
            Err(error) => {
                warn!(%submission, %error, "remote send failed");
                self.state.can_swipe_to_dismiss = true;
                Ok(vec![Command::Track(AnalyticsEvent::transfer(&amount, false))])
            }
        }
    }

    /// Asks the ledger to collect the active scanned cash bill.
    pub fn begin_receive(&mut self) -> Result<Vec<Command>, TransitionError> {
        let payload = match &self.state.bill {
            Some(Bill::Cash {
                payload,
                received: false,
                origin: CashOrigin::Scanned | CashOrigin::CashLink,
                ..
            }) => payload.clone(),
            Some(Bill::Cash { .. }) => {
                return Err(TransitionError::NotSendable("bill cannot be received"))
            }
            Some(Bill::Payment { .. }) => {
                return Err(TransitionError::WrongBillKind { expected: "cash" })
            }
            None => return Err(TransitionError::NoActiveBill),
        };
        let submission = self.mint_submission();
        debug!(%submission, "receive started");
        self.receiving = Some(submission);
        Ok(vec![Command::ReceiveCash {
            submission,
            payload,
        }])
    }

    /// Outcome of [`BillStore::begin_receive`]. Failure takes the bill down.
    pub fn finish_receive(
        &mut self,
        submission: SubmissionId,
        result: Result<(), SettlementError>,
        timers: &mut TimerService,
    ) -> Result<Vec<Command>, TransitionError> {
        if self.receiving != Some(submission) {
            return Err(TransitionError::Stale);
        }
        self.receiving = None;
        match result {
            Ok(()) => {
                self.mark_received()?;
                Ok(Vec::new())
            }
            Err(error) => {
                warn!(%submission, %error, "receive failed");
                Ok(self.clear(DismissReason::Cancelled, timers))
            }
        }
    }

    /// The one clearing path. No-op without a bill.
    pub(crate) fn clear(&mut self, reason: DismissReason, timers: &mut TimerService) -> Vec<Command> {
        let Some(bill) = self.state.bill.take() else {
            return Vec::new();
        };

        let mut commands: Vec<Command> = [TimerKey::ScreenTimeout, TimerKey::PaymentSettle]
            .into_iter()
            .filter_map(|key| timers.cancel(key))
            .collect();

        let in_flight = self
            .state
            .payment_confirmation
            .as_ref()
            .and_then(|c| c.in_flight)
            .into_iter()
            .chain(self.remote_send.take())
            .chain(self.receiving.take());
        for submission in in_flight {
            debug!(%submission, "cancelling in-flight submission");
            commands.push(Command::CancelSubmission { submission });
        }

        let analytics_state = if reason == DismissReason::Timeout {
            BillAnalyticsState::TimedOut
        } else {
            BillAnalyticsState::Hidden
        };
        commands.push(Command::Track(AnalyticsEvent::bill(analytics_state, &bill)));
        info!(bill = %bill.id(), reason = reason.as_str(), "bill dismissed");

        self.state = BillState::default();
        self.last_dismissal = Some(reason);
        commands
    }

    pub(crate) fn confirmation_mut(&mut self) -> Option<&mut PaymentConfirmation> {
        self.state.payment_confirmation.as_mut()
    }

    pub(crate) fn set_can_swipe(&mut self, can_swipe: bool) {
        self.state.can_swipe_to_dismiss = can_swipe;
    }

    pub(crate) fn mint_submission(&mut self) -> SubmissionId {
        self.next_submission += 1;
        SubmissionId(self.next_submission)
    }
}
