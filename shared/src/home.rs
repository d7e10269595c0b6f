//! The serial coordinator behind the scan screen.
//!
//! [`Home::handle`] is the only way state changes. Shell input, capability
//! responses and timer expiries all arrive as [`Event`]s and are applied one at
//! a time; the returned [`Command`]s are for the shell to execute.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{
    analytics::{AnalyticsEvent, GrabKind, GrabTracker},
    bill_store::BillStore,
    command::Command,
    config::Config,
    deep_link::DeepLinkError,
    event::{Event, RawCode, MAX_URI_LEN},
    lifecycle::{network_caption, LifecycleCoordinator},
    model::{
        Amount, Bill, BillState, CashOrigin, DismissReason, NetworkState, Payload, PayloadKind,
        PaymentState, PresentationStyle, RateTable, ScannedCode, SubmissionId,
    },
    payment::{FailureOutcome, PaymentFlow, SettlementError},
    scan::{ScanError, ScanSession},
    timer::{TimerHandle, TimerKey, TimerService},
    AppError, ErrorKind, TransitionError, UnixTimeMs,
};

// --- View model ---

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BillKindView {
    Cash,
    Payment,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BillView {
    pub id: String,
    pub kind: BillKindView,
    pub amount_text: String,
    pub currency: String,
    pub style: PresentationStyle,
    pub received: bool,
    pub code: RawCode,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConfirmationView {
    pub state: PaymentState,
    pub amount_text: String,
    pub show_cancel: bool,
    pub is_sending: bool,
    pub is_sent: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AlertView {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ViewModel {
    pub bill: Option<BillView>,
    pub confirmation: Option<ConfirmationView>,
    pub can_swipe_to_dismiss: bool,
    pub hide_bill_buttons: bool,
    pub is_remote_send_loading: bool,
    pub show_received: bool,
    pub is_scanning: bool,
    pub camera_blocked: bool,
    pub network_caption: Option<String>,
    pub alert: Option<AlertView>,
    /// Reason code for the most recent dismissal, until the next one.
    pub last_dismissal: Option<DismissReason>,
}

// --- Coordinator ---

#[derive(Debug)]
pub struct Home {
    config: Config,
    bills: BillStore,
    payments: PaymentFlow,
    scan: ScanSession,
    timers: TimerService,
    lifecycle: LifecycleCoordinator,
    grabs: GrabTracker,
    network: NetworkState,
    rates: RateTable,
    pending_cash_link: Option<(SubmissionId, Payload)>,
    alert: Option<AppError>,
}

impl Default for Home {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Home {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            bills: BillStore::new(config.bill_screen_timeout()),
            payments: PaymentFlow::new(config.max_payment_attempts, config.payment_settle_delay()),
            scan: ScanSession::new(config.recent_scan_capacity, config.rescan_suppression()),
            timers: TimerService::new(),
            lifecycle: LifecycleCoordinator::new(
                config.sheet_dismiss_timeout(),
                config.cash_link_host.clone(),
            ),
            grabs: GrabTracker::new(config.grab_timeout()),
            network: NetworkState::default(),
            rates: RateTable::default(),
            pending_cash_link: None,
            alert: None,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn bill_state(&self) -> &BillState {
        self.bills.state()
    }

    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.scan.is_scanning()
    }

    #[must_use]
    pub fn alert(&self) -> Option<&AppError> {
        self.alert.as_ref()
    }

    #[must_use]
    pub fn is_grab_pending(&self, kind: GrabKind) -> bool {
        self.grabs.is_pending(kind, &self.timers)
    }

    #[instrument(skip(self, event), fields(event = event.name(), user = event.is_user_initiated()))]
    pub fn handle(&mut self, event: Event, now: UnixTimeMs) -> Vec<Command> {
        match event {
            Event::Lifecycle(lifecycle) => {
                self.lifecycle
                    .on_lifecycle(lifecycle, &mut self.scan, &mut self.timers, now)
            }
            Event::SurfaceAttached { surface } => {
                self.lifecycle.attach_surface(surface, &mut self.scan)
            }
            Event::SurfaceDetached => self.lifecycle.detach_surface(&mut self.scan),
            Event::CameraPermissionChanged { granted } => {
                self.lifecycle.on_permission(granted, &mut self.scan)
            }
            Event::NetworkChanged(network) => {
                debug!(connected = network.connected, kind = ?network.kind, "network changed");
                self.network = network;
                Vec::new()
            }
            Event::RatesUpdated { rates } => {
                let count = self.rates.update(rates);
                debug!(count, "exchange rates updated");
                Vec::new()
            }
            Event::CodeScanned { kind, data } => self.on_code_scanned(kind, &data, now),
            Event::ScanFailed { error } => self.on_scan_failed(error),
            Event::GiveBillCreated { data } => self.on_give_bill(&data, now),
            Event::DeepLinkOpened { uri } => self.on_deep_link(&uri, now),

            Event::BillSwiped => {
                let result = self.bills.dismiss(DismissReason::UserSwipe, &mut self.timers);
                Self::or_log(result, "swipe")
            }
            Event::RemoteSendRequested => {
                let result = self.bills.begin_remote_send();
                Self::or_log(result, "remote send")
            }
            Event::CancelSend => {
                let result = self.bills.cancel_send(&mut self.timers);
                Self::or_log(result, "cancel send")
            }
            Event::ConfirmPayment => {
                let result = self.payments.confirm(&mut self.bills);
                Self::or_log(result, "confirm payment")
            }
            Event::RejectPayment => {
                let result = self.payments.reject(&mut self.bills, &mut self.timers);
                Self::or_log(result, "reject payment")
            }
            Event::CancelPayment => {
                let result = self.payments.cancel(&mut self.bills, &mut self.timers);
                Self::or_log(result, "cancel payment")
            }
            Event::SheetRequested(sheet) => vec![Command::ShowSheet(sheet)],
            Event::AlertDismissed => {
                self.alert = None;
                Vec::new()
            }

            Event::TimerFired(handle) => self.on_timer(handle),
            Event::PaymentSettled { submission, result } => {
                self.on_payment_settled(submission, result, now)
            }
            Event::CashReceived { submission, result } => {
                self.on_cash_received(submission, result, now)
            }
            Event::RemoteSendResolved { submission, result } => {
                let failure = result.as_ref().err().map(ToString::to_string);
                let result = self
                    .bills
                    .remote_send_resolved(submission, result, &mut self.timers);
                if let (Ok(_), Some(message)) = (&result, failure) {
                    self.raise(AppError::new(ErrorKind::SendFailed, message));
                }
                Self::or_log(result, "remote send result")
            }
            Event::PrivacyUpgraded {
                successful,
                intent_id,
                action_count,
            } => vec![Command::Track(AnalyticsEvent::UpgradePrivacy {
                successful,
                intent_id,
                action_count,
            })],
        }
    }

    fn on_code_scanned(&mut self, kind: PayloadKind, data: &RawCode, now: UnixTimeMs) -> Vec<Command> {
        let code = match self.scan.accept(kind, data.as_bytes(), now) {
            Ok(Some(code)) => code,
            Ok(None) => return Vec::new(),
            Err(error) => {
                warn!(%error, ?kind, "scanned code rejected");
                return Vec::new();
            }
        };
        let fingerprint = code.payload.fingerprint();
        if self.is_in_use(&fingerprint) {
            debug!(%fingerprint, "code already on screen, rescan dropped");
            return Vec::new();
        }
        let bill = match Bill::from_scanned(code, CashOrigin::Scanned, &self.rates) {
            Ok(bill) => bill,
            Err(error) => {
                warn!(%error, ?kind, "scanned code rejected");
                return Vec::new();
            }
        };

        let is_cash = bill.is_cash();
        let mut commands = match self.bills.present(bill, &mut self.timers, now) {
            Ok(commands) => commands,
            Err(error) => return Self::or_log(Err(error), "present scanned bill"),
        };
        self.scan.mark_handled(fingerprint);
        if is_cash {
            commands.push(self.grabs.start(GrabKind::Scan, &mut self.timers, now));
            commands.extend(Self::or_log(self.bills.begin_receive(), "receive"));
        }
        commands
    }

    /// True when the payload is the active bill, the pending cash link, or a
    /// code that already became a bill this session.
    fn is_in_use(&self, fingerprint: &str) -> bool {
        let active = self
            .bills
            .bill()
            .is_some_and(|bill| bill.payload().fingerprint() == fingerprint);
        let pending = self
            .pending_cash_link
            .as_ref()
            .is_some_and(|(_, payload)| payload.fingerprint() == fingerprint);
        active || pending || self.scan.is_handled(fingerprint)
    }

    fn on_scan_failed(&mut self, error: ScanError) -> Vec<Command> {
        self.scan.mark_failed(&error);
        if error == ScanError::PermissionDenied {
            return self.lifecycle.on_permission(false, &mut self.scan);
        }
        self.raise(error.into());
        Vec::new()
    }

    fn on_give_bill(&mut self, data: &RawCode, now: UnixTimeMs) -> Vec<Command> {
        let bill = ScannedCode::decode(PayloadKind::Cash, data.as_bytes())
            .and_then(|code| Bill::from_scanned(code, CashOrigin::Given, &self.rates));
        match bill {
            Ok(bill) => {
                let result = self.bills.present(bill, &mut self.timers, now);
                Self::or_log(result, "present given bill")
            }
            Err(error) => {
                self.raise(error.into());
                Vec::new()
            }
        }
    }

    fn on_deep_link(&mut self, uri: &str, now: UnixTimeMs) -> Vec<Command> {
        if uri.len() > MAX_URI_LEN {
            self.raise(DeepLinkError::InvalidUrl(format!("longer than {MAX_URI_LEN} bytes")).into());
            return Vec::new();
        }
        let busy = self.bills.has_bill() || self.pending_cash_link.is_some();
        let link = match self.lifecycle.accept_deep_link(uri, busy) {
            Ok(Some(link)) => link,
            Ok(None) => return Vec::new(),
            Err(error) => {
                warn!(%error, "deep link dropped");
                self.raise(error.into());
                return Vec::new();
            }
        };

        let submission = self.bills.mint_submission();
        let payload = Payload::new(PayloadKind::GiftCard, link.entropy().to_vec());
        info!(%submission, fingerprint = %payload.fingerprint(), "collecting cash link");
        self.pending_cash_link = Some((submission, payload.clone()));
        vec![
            self.grabs.start(GrabKind::CashLink, &mut self.timers, now),
            Command::ReceiveCash {
                submission,
                payload,
            },
        ]
    }

    fn on_timer(&mut self, handle: TimerHandle) -> Vec<Command> {
        if !self.timers.fire(handle) {
            return Vec::new();
        }
        info!(timer = handle.key.name(), "timer fired");
        match handle.key {
            TimerKey::Grab(GrabKind::CashLink) => {
                let mut commands = vec![self.grabs.timed_out(GrabKind::CashLink)];
                if let Some((submission, _)) = self.pending_cash_link.take() {
                    info!(%submission, "cash link collection abandoned");
                    commands.push(Command::CancelSubmission { submission });
                }
                commands
            }
            TimerKey::Grab(kind) => vec![self.grabs.timed_out(kind)],
            TimerKey::ScreenTimeout => {
                let result = self.bills.dismiss(DismissReason::Timeout, &mut self.timers);
                Self::or_log(result, "screen timeout")
            }
            TimerKey::SheetDismiss => vec![self.lifecycle.sheet_dismiss_elapsed()],
            TimerKey::PaymentSettle => {
                let result = self.payments.settle_elapsed(&mut self.bills, &mut self.timers);
                Self::or_log(result, "settle")
            }
        }
    }

    fn on_payment_settled(
        &mut self,
        submission: SubmissionId,
        result: Result<(), SettlementError>,
        now: UnixTimeMs,
    ) -> Vec<Command> {
        match result {
            Ok(()) => {
                let result = self.payments.settlement_succeeded(
                    submission,
                    &mut self.bills,
                    &mut self.timers,
                    now,
                );
                Self::or_log(result, "settlement")
            }
            Err(error) => {
                match self
                    .payments
                    .settlement_failed(submission, &error, &mut self.bills, &mut self.timers)
                {
                    Ok((FailureOutcome::Retry { remaining }, commands)) => {
                        let kind = if error.is_retryable() && !self.network.connected {
                            ErrorKind::Network
                        } else {
                            ErrorKind::SendFailed
                        };
                        self.raise(AppError::new(
                            kind,
                            format!("{error} ({remaining} attempts left)"),
                        ));
                        commands
                    }
                    Ok((FailureOutcome::Exhausted, commands)) => {
                        self.raise(AppError::new(ErrorKind::SendRetriesExhausted, error.to_string()));
                        commands
                    }
                    Err(rejected) => Self::or_log(Err(rejected), "settlement"),
                }
            }
        }
    }

    fn on_cash_received(
        &mut self,
        submission: SubmissionId,
        result: Result<Amount, SettlementError>,
        now: UnixTimeMs,
    ) -> Vec<Command> {
        let failure = match &result {
            Err(SettlementError::Cancelled) | Ok(_) => None,
            Err(error) => Some(AppError::new(ErrorKind::ReceiveFailed, error.to_string())),
        };

        let pending = match &self.pending_cash_link {
            Some((pending, _)) if *pending == submission => self.pending_cash_link.take(),
            _ => None,
        };
        if let Some((_, payload)) = pending {
            let Ok(amount) = result else {
                if let Some(alert) = failure {
                    self.raise(alert);
                }
                return Vec::new();
            };
            let bill = Bill::cash(payload, amount.clone(), CashOrigin::CashLink);
            let mut commands = match self.bills.present(bill, &mut self.timers, now) {
                Ok(commands) => commands,
                Err(error) => return Self::or_log(Err(error), "present cash link bill"),
            };
            if let Err(error) = self.bills.mark_received() {
                warn!(%error, "cash link bill could not be marked received");
            }
            commands.extend(
                self.grabs
                    .grab(GrabKind::CashLink, &amount, &mut self.timers, now),
            );
            return commands;
        }

        let received = result.is_ok();
        let result = self
            .bills
            .finish_receive(submission, result.map(|_| ()), &mut self.timers);
        if let (Ok(_), Some(alert)) = (&result, failure) {
            self.raise(alert);
        }
        let mut commands = Self::or_log(result, "receive");
        if received {
            if let Some(amount) = self.bills.bill().map(|bill| bill.amount().clone()) {
                commands.extend(self.grabs.grab(GrabKind::Scan, &amount, &mut self.timers, now));
            }
        }
        commands
    }

    fn raise(&mut self, error: AppError) {
        warn!(code = error.code(), message = %error.message, "surfacing error");
        self.alert = Some(error);
    }

    /// Rejected transitions are logged and dropped; nothing propagates.
    fn or_log(result: Result<Vec<Command>, TransitionError>, action: &'static str) -> Vec<Command> {
        match result {
            Ok(commands) => commands,
            Err(error @ (TransitionError::Stale | TransitionError::NoActiveBill)) => {
                debug!(%error, action, "stale event ignored");
                Vec::new()
            }
            Err(error) => {
                warn!(%error, action, "transition rejected");
                Vec::new()
            }
        }
    }

    #[must_use]
    pub fn view(&self) -> ViewModel {
        let state = self.bills.state();
        let bill = state.bill.as_ref().map(|bill| BillView {
            id: bill.id().to_string(),
            kind: if bill.is_cash() {
                BillKindView::Cash
            } else {
                BillKindView::Payment
            },
            amount_text: bill.amount().formatted(),
            currency: bill.amount().currency().to_string(),
            style: bill.style(),
            received: matches!(bill, Bill::Cash { received: true, .. }),
            code: RawCode::new(bill.payload().as_bytes().to_vec()),
        });
        let confirmation = state
            .payment_confirmation
            .as_ref()
            .map(|confirmation| ConfirmationView {
                state: confirmation.state,
                amount_text: confirmation.requested_amount.formatted(),
                show_cancel: confirmation.state != PaymentState::Sent,
                is_sending: confirmation.state == PaymentState::Sending,
                is_sent: confirmation.state == PaymentState::Sent,
            });

        ViewModel {
            show_received: bill.as_ref().is_some_and(|b| b.received),
            bill,
            confirmation,
            can_swipe_to_dismiss: state.can_swipe_to_dismiss,
            hide_bill_buttons: state.hide_bill_buttons,
            is_remote_send_loading: self.bills.is_remote_send_loading(),
            is_scanning: self.scan.is_scanning(),
            camera_blocked: self.lifecycle.camera_blocked(&self.scan),
            network_caption: network_caption(&self.network).map(str::to_string),
            alert: self.alert.as_ref().map(|alert| AlertView {
                code: alert.code().to_string(),
                message: alert.user_facing_message(),
                retryable: alert.is_retryable(),
            }),
            last_dismissal: self.bills.last_dismissal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        lifecycle::LifecycleEvent,
        model::{fixtures::*, NetworkKind, Sheet},
        scan::SurfaceId,
    };

    const T0: UnixTimeMs = UnixTimeMs(1_000_000);
    const SURFACE: SurfaceId = SurfaceId(1);

    fn scanning_home() -> Home {
        let mut home = Home::default();
        home.handle(Event::CameraPermissionChanged { granted: true }, T0);
        home.handle(Event::SurfaceAttached { surface: SURFACE }, T0);
        home.handle(
            Event::RatesUpdated {
                rates: vec![("USD".into(), usd_rate().fx)],
            },
            T0,
        );
        home
    }

    fn scan(kind: PayloadKind, data: Vec<u8>) -> Event {
        Event::CodeScanned {
            kind,
            data: RawCode::new(data),
        }
    }

    fn submission_of(commands: &[Command]) -> SubmissionId {
        commands
            .iter()
            .find_map(Command::submission)
            .expect("no submission in commands")
    }

    fn handle_of(commands: &[Command], key: TimerKey) -> TimerHandle {
        commands
            .iter()
            .find_map(|c| match c {
                Command::StartTimer { handle, .. } if handle.key == key => Some(*handle),
                _ => None,
            })
            .expect("timer not started")
    }

    #[test]
    fn test_scanned_cash_is_presented_and_received() {
        let mut home = scanning_home();
        let commands = home.handle(scan(PayloadKind::Cash, cash_code(1_000_000)), T0);

        assert!(home.bill_state().bill.is_some());
        assert!(home.is_grab_pending(GrabKind::Scan));
        let submission = submission_of(&commands);
        assert!(matches!(
            commands.iter().find(|c| c.submission().is_some()),
            Some(Command::ReceiveCash { .. })
        ));

        let commands = home.handle(
            Event::CashReceived {
                submission,
                result: Ok(Amount::kin(1_000_000)),
            },
            UnixTimeMs(T0.0 + 2_000),
        );
        assert!(home.view().show_received);
        assert!(home.view().hide_bill_buttons);
        assert!(!home.is_grab_pending(GrabKind::Scan));
        assert!(commands.iter().any(|c| matches!(
            c,
            Command::Track(AnalyticsEvent::Grab { kind: GrabKind::Scan, .. })
        )));
    }

    #[test]
    fn test_decode_failure_changes_nothing() {
        let mut home = scanning_home();
        let commands = home.handle(scan(PayloadKind::Cash, vec![1, 2, 3]), T0);
        assert!(commands.is_empty());
        assert!(home.bill_state().bill.is_none());
        assert!(home.is_scanning());
        assert!(home.alert().is_none());
    }

    #[test]
    fn test_scan_continues_under_bill() {
        let mut home = scanning_home();
        home.handle(scan(PayloadKind::Cash, cash_code(10)), T0);
        assert!(home.is_scanning());
    }

    #[test]
    fn test_payment_request_without_rate_is_rejected() {
        let mut home = Home::default();
        home.handle(Event::SurfaceAttached { surface: SURFACE }, T0);
        home.handle(scan(PayloadKind::RequestPayment, request_code("EUR", 500)), T0);
        assert!(home.bill_state().bill.is_none());
    }

    #[test]
    fn test_confirm_twice_submits_once() {
        let mut home = scanning_home();
        home.handle(scan(PayloadKind::RequestPayment, request_code("USD", 25)), T0);

        let first = home.handle(Event::ConfirmPayment, T0);
        let second = home.handle(Event::ConfirmPayment, T0);
        assert_eq!(first.iter().filter(|c| c.submission().is_some()).count(), 1);
        assert!(second.is_empty());
    }

    #[test]
    fn test_send_failure_surfaces_alert_and_allows_retry() {
        let mut home = scanning_home();
        home.handle(scan(PayloadKind::RequestPayment, request_code("USD", 25)), T0);
        let submission = submission_of(&home.handle(Event::ConfirmPayment, T0));

        home.handle(
            Event::PaymentSettled {
                submission,
                result: Err(SettlementError::Network),
            },
            T0,
        );
        let view = home.view();
        assert_eq!(
            view.confirmation.map(|c| c.state),
            Some(PaymentState::AwaitingConfirmation)
        );
        assert_eq!(view.alert.map(|a| a.code), Some("SEND_FAILED".to_string()));
        assert!(view.can_swipe_to_dismiss);
    }

    #[test]
    fn test_retries_exhausted_dismisses() {
        let mut home = scanning_home();
        home.handle(scan(PayloadKind::RequestPayment, request_code("USD", 25)), T0);
        for _ in 0..crate::MAX_PAYMENT_ATTEMPTS {
            let submission = submission_of(&home.handle(Event::ConfirmPayment, T0));
            home.handle(
                Event::PaymentSettled {
                    submission,
                    result: Err(SettlementError::Rejected {
                        reason: "insufficient funds".into(),
                    }),
                },
                T0,
            );
        }
        assert!(home.bill_state().bill.is_none());
        assert_eq!(
            home.alert().map(|a| a.kind),
            Some(ErrorKind::SendRetriesExhausted)
        );
    }

    #[test]
    fn test_screen_timeout_dismisses_and_stale_fire_is_noop() {
        let mut home = scanning_home();
        let commands = home.handle(scan(PayloadKind::Cash, cash_code(10)), T0);
        let handle = handle_of(&commands, TimerKey::ScreenTimeout);

        let commands = home.handle(Event::TimerFired(handle), T0);
        assert!(home.bill_state().bill.is_none());
        assert_eq!(home.view().last_dismissal, Some(DismissReason::Timeout));
        assert!(commands.iter().any(|c| matches!(
            c,
            Command::Track(AnalyticsEvent::Bill {
                state: crate::analytics::BillAnalyticsState::TimedOut,
                ..
            })
        )));
        assert!(home.handle(Event::TimerFired(handle), T0).is_empty());
    }

    #[test]
    fn test_timer_from_dismissed_bill_is_stale() {
        let mut home = scanning_home();
        let commands = home.handle(scan(PayloadKind::Cash, cash_code(10)), T0);
        let old = handle_of(&commands, TimerKey::ScreenTimeout);
        home.handle(Event::BillSwiped, T0);

        home.handle(scan(PayloadKind::Cash, cash_code(20)), T0);
        home.handle(Event::TimerFired(old), T0);
        assert!(home.bill_state().bill.is_some());
    }

    #[test]
    fn test_grab_timeout_has_no_bill_side_effect() {
        let mut home = scanning_home();
        let commands = home.handle(scan(PayloadKind::Cash, cash_code(10)), T0);
        let grab = handle_of(&commands, TimerKey::Grab(GrabKind::Scan));

        let commands = home.handle(Event::TimerFired(grab), T0);
        assert_eq!(commands.len(), 1);
        assert!(matches!(
            commands[0],
            Command::Track(AnalyticsEvent::GrabTimedOut { .. })
        ));
        assert!(home.bill_state().bill.is_some());
        assert!(!home.is_grab_pending(GrabKind::Scan));
    }

    #[test]
    fn test_cash_link_receives_before_presenting() {
        let mut home = Home::default();
        let link = "https://cash.getcode.com/c#/e=0f1e2d3c4b5a69788796a5b4c3d2e1f0";
        let commands = home.handle(Event::DeepLinkOpened { uri: link.into() }, T0);
        let submission = submission_of(&commands);
        assert!(home.bill_state().bill.is_none());
        assert!(home.is_grab_pending(GrabKind::CashLink));

        // A second open of the same link while pending is dropped.
        assert!(home
            .handle(Event::DeepLinkOpened { uri: link.into() }, T0)
            .is_empty());

        let commands = home.handle(
            Event::CashReceived {
                submission,
                result: Ok(Amount::kin(500_000)),
            },
            T0,
        );
        let view = home.view();
        assert!(view.show_received);
        assert_eq!(view.bill.map(|b| b.style), Some(PresentationStyle::Pop));
        assert!(commands.iter().any(|c| matches!(
            c,
            Command::Track(AnalyticsEvent::Grab {
                kind: GrabKind::CashLink,
                ..
            })
        )));
    }

    #[test]
    fn test_bad_deep_link_surfaces_error() {
        let mut home = Home::default();
        home.handle(
            Event::DeepLinkOpened {
                uri: "https://cash.getcode.com/c#/e=xyz".into(),
            },
            T0,
        );
        assert_eq!(home.alert().map(|a| a.kind), Some(ErrorKind::DeepLink));
    }

    #[test]
    fn test_network_disconnect_keeps_bill_and_sets_caption() {
        let mut home = scanning_home();
        home.handle(scan(PayloadKind::Cash, cash_code(10)), T0);
        home.handle(
            Event::NetworkChanged(NetworkState {
                connected: false,
                kind: NetworkKind::None,
            }),
            T0,
        );
        let view = home.view();
        assert!(view.bill.is_some());
        assert_eq!(view.network_caption.as_deref(), Some("No network connection"));
    }

    #[test]
    fn test_background_then_sheet_timer_hides_sheet() {
        let mut home = scanning_home();
        home.handle(Event::SheetRequested(Sheet::Balance), T0);
        let commands = home.handle(Event::Lifecycle(LifecycleEvent::Background), T0);
        assert!(!home.is_scanning());
        let handle = handle_of(&commands, TimerKey::SheetDismiss);

        assert_eq!(
            home.handle(Event::TimerFired(handle), T0),
            vec![Command::HideSheet]
        );
    }

    #[test]
    fn test_permission_denied_from_scanner_blocks_camera() {
        let mut home = scanning_home();
        home.handle(
            Event::ScanFailed {
                error: ScanError::PermissionDenied,
            },
            T0,
        );
        let view = home.view();
        assert!(view.camera_blocked);
        assert!(!view.is_scanning);
        assert!(view.alert.is_none());
    }

    #[test]
    fn test_give_bill_slides_in_and_can_be_sent() {
        let mut home = Home::default();
        home.handle(
            Event::GiveBillCreated {
                data: RawCode::new(cash_code(2_500_000)),
            },
            T0,
        );
        assert_eq!(
            home.view().bill.map(|b| b.style),
            Some(PresentationStyle::Slide)
        );

        let submission = submission_of(&home.handle(Event::RemoteSendRequested, T0));
        let view = home.view();
        assert!(view.is_remote_send_loading);
        assert!(!view.can_swipe_to_dismiss);

        home.handle(
            Event::RemoteSendResolved {
                submission,
                result: Ok(()),
            },
            T0,
        );
        assert!(home.view().bill.is_none());
    }

    #[test]
    fn test_alert_dismissed() {
        let mut home = Home::default();
        home.handle(
            Event::GiveBillCreated {
                data: RawCode::new(vec![0; 3]),
            },
            T0,
        );
        assert!(home.view().alert.is_some());
        home.handle(Event::AlertDismissed, T0);
        assert!(home.view().alert.is_none());
    }

    #[test]
    fn test_rescan_of_received_cash_keeps_bill() {
        let mut home = scanning_home();
        let code = cash_code(1_000_000);
        let submission = submission_of(&home.handle(scan(PayloadKind::Cash, code.clone()), T0));
        let bill_id = home.view().bill.map(|b| b.id);
        home.handle(
            Event::CashReceived {
                submission,
                result: Ok(Amount::kin(1_000_000)),
            },
            T0,
        );

        // Camera still pointed at the same code after the suppression window.
        let commands = home.handle(scan(PayloadKind::Cash, code), UnixTimeMs(T0.0 + 4_000));
        assert!(commands.is_empty());
        let view = home.view();
        assert_eq!(view.bill.map(|b| b.id), bill_id);
        assert!(view.show_received);
        assert!(view.last_dismissal.is_none());
    }

    #[test]
    fn test_handled_code_stays_handled_after_dismiss() {
        let mut home = scanning_home();
        let code = cash_code(1_000_000);
        home.handle(scan(PayloadKind::Cash, code.clone()), T0);
        home.handle(Event::BillSwiped, T0);

        home.handle(scan(PayloadKind::Cash, code), UnixTimeMs(T0.0 + 10_000));
        assert!(home.bill_state().bill.is_none());
    }

    #[test]
    fn test_rescan_does_not_reset_payment_attempts() {
        let mut home = scanning_home();
        let code = request_code("USD", 25);
        home.handle(scan(PayloadKind::RequestPayment, code.clone()), T0);
        for _ in 0..2 {
            let submission = submission_of(&home.handle(Event::ConfirmPayment, T0));
            home.handle(
                Event::PaymentSettled {
                    submission,
                    result: Err(SettlementError::Network),
                },
                T0,
            );
        }

        home.handle(scan(PayloadKind::RequestPayment, code), UnixTimeMs(T0.0 + 4_000));
        let attempts = home
            .bill_state()
            .payment_confirmation
            .as_ref()
            .map(|c| c.attempts);
        assert_eq!(attempts, Some(2));

        // One attempt left: the next failure exhausts and dismisses.
        let submission = submission_of(&home.handle(Event::ConfirmPayment, T0));
        home.handle(
            Event::PaymentSettled {
                submission,
                result: Err(SettlementError::Network),
            },
            T0,
        );
        assert!(home.bill_state().bill.is_none());
        assert_eq!(home.view().last_dismissal, Some(DismissReason::Cancelled));
    }

    #[test]
    fn test_cash_link_grab_timeout_frees_deep_links() {
        let mut home = Home::default();
        let first = "https://cash.getcode.com/c#/e=0f1e2d3c4b5a69788796a5b4c3d2e1f0";
        let second = "https://cash.getcode.com/c#/e=00112233445566778899aabbccddeeff";
        let commands = home.handle(Event::DeepLinkOpened { uri: first.into() }, T0);
        let submission = submission_of(&commands);
        let grab = handle_of(&commands, TimerKey::Grab(GrabKind::CashLink));

        let commands = home.handle(Event::TimerFired(grab), T0);
        assert!(commands.contains(&Command::CancelSubmission { submission }));

        let commands = home.handle(
            Event::DeepLinkOpened { uri: second.into() },
            UnixTimeMs(T0.0 + 60_000),
        );
        assert!(matches!(
            commands.iter().find(|c| c.submission().is_some()),
            Some(Command::ReceiveCash { .. })
        ));

        // The abandoned collection answering late changes nothing.
        home.handle(
            Event::CashReceived {
                submission,
                result: Ok(Amount::kin(500_000)),
            },
            UnixTimeMs(T0.0 + 61_000),
        );
        assert!(home.bill_state().bill.is_none());
    }

    #[test]
    fn test_send_failure_while_offline_surfaces_network_alert() {
        let mut home = scanning_home();
        home.handle(scan(PayloadKind::RequestPayment, request_code("USD", 25)), T0);
        let submission = submission_of(&home.handle(Event::ConfirmPayment, T0));
        home.handle(
            Event::NetworkChanged(NetworkState {
                connected: false,
                kind: NetworkKind::None,
            }),
            T0,
        );

        home.handle(
            Event::PaymentSettled {
                submission,
                result: Err(SettlementError::Network),
            },
            T0,
        );
        assert_eq!(home.alert().map(|a| a.kind), Some(ErrorKind::Network));
        assert_eq!(
            home.view().confirmation.map(|c| c.state),
            Some(PaymentState::AwaitingConfirmation)
        );
    }
}
