//! Fire-and-forget analytics vocabulary plus grab timing.
//!
//! Events are only ever emitted as [`Command::Track`]; a failing or slow sink
//! cannot block or fail a transition.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::{
    command::Command,
    model::{Amount, Bill},
    timer::{TimerKey, TimerService},
    UnixTimeMs,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrabKind {
    Scan,
    CashLink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillAnalyticsState {
    Shown,
    Hidden,
    TimedOut,
}

impl BillAnalyticsState {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Shown => "Shown",
            Self::Hidden => "Hidden",
            Self::TimedOut => "Timed Out",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnalyticsEvent {
    Bill {
        state: BillAnalyticsState,
        kin: u64,
        currency: String,
        animation: String,
    },
    Transfer {
        successful: bool,
        kin: u64,
        fiat: f64,
        fx: f64,
        currency: String,
    },
    RequestPayment {
        kin: u64,
        currency: String,
    },
    Grab {
        kind: GrabKind,
        kin: u64,
        currency: String,
        grab_time_secs: f64,
    },
    GrabTimedOut {
        kind: GrabKind,
        elapsed_ms: u64,
    },
    UpgradePrivacy {
        successful: bool,
        intent_id: String,
        action_count: u32,
    },
}

fn success_str(successful: bool) -> String {
    let state = if successful { "Success" } else { "Failure" };
    state.to_string()
}

impl AnalyticsEvent {
    #[must_use]
    pub fn bill(state: BillAnalyticsState, bill: &Bill) -> Self {
        Self::Bill {
            state,
            kin: bill.amount().whole_kin(),
            currency: bill.amount().currency().to_string(),
            animation: bill.style().as_str().to_string(),
        }
    }

    #[must_use]
    pub fn transfer(amount: &Amount, successful: bool) -> Self {
        Self::Transfer {
            successful,
            kin: amount.whole_kin(),
            fiat: amount.major(),
            fx: amount.rate().fx,
            currency: amount.rate().currency.to_string(),
        }
    }

    #[must_use]
    pub fn request_payment(amount: &Amount) -> Self {
        Self::RequestPayment {
            kin: amount.whole_kin(),
            currency: amount.currency().to_string(),
        }
    }

    /// Sink-facing event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Bill { .. } => "Bill",
            Self::Transfer { .. } => "Transfer",
            Self::RequestPayment { .. } => "Request Payment",
            Self::Grab {
                kind: GrabKind::Scan,
                ..
            } => "Grab",
            Self::Grab {
                kind: GrabKind::CashLink,
                ..
            } => "CashLinkGrab",
            Self::GrabTimedOut { .. } => "Grab Timed Out",
            Self::UpgradePrivacy { .. } => "Upgrade Privacy",
        }
    }

    /// Sink-facing properties, stringly typed the way analytics backends want.
    #[must_use]
    pub fn properties(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Bill {
                state,
                kin,
                currency,
                animation,
            } => vec![
                ("State", state.as_str().to_string()),
                ("Amount", kin.to_string()),
                ("Currency", currency.clone()),
                ("Animation", animation.clone()),
            ],
            Self::Transfer {
                successful,
                kin,
                fiat,
                fx,
                currency,
            } => vec![
                ("State", success_str(*successful)),
                ("Amount", kin.to_string()),
                ("Fiat", fiat.to_string()),
                ("Exchange Rate", fx.to_string()),
                ("Currency", currency.clone()),
            ],
            Self::RequestPayment { kin, currency } => vec![
                ("Amount", kin.to_string()),
                ("Currency", currency.clone()),
            ],
            Self::Grab {
                kin,
                currency,
                grab_time_secs,
                ..
            } => vec![
                ("Amount", kin.to_string()),
                ("Currency", currency.clone()),
                ("Grab Time", format!("{grab_time_secs:.2}")),
            ],
            Self::GrabTimedOut { kind, elapsed_ms } => vec![
                (
                    "Type",
                    match kind {
                        GrabKind::Scan => "Scan",
                        GrabKind::CashLink => "Cash Link",
                    }
                    .to_string(),
                ),
                ("Milliseconds", elapsed_ms.to_string()),
            ],
            Self::UpgradePrivacy {
                successful,
                intent_id,
                action_count,
            } => vec![
                ("State", success_str(*successful)),
                ("Intent ID", intent_id.clone()),
                ("Action Count", action_count.to_string()),
            ],
        }
    }
}

/// Measures time from "scan started" to "bill accepted" on top of the grab timers.
#[derive(Debug, Clone, Copy)]
pub struct GrabTracker {
    timeout: Duration,
}

impl GrabTracker {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn start(&self, kind: GrabKind, timers: &mut TimerService, now: UnixTimeMs) -> Command {
        timers.start(TimerKey::Grab(kind), self.timeout, now)
    }

    #[must_use]
    pub fn is_pending(&self, kind: GrabKind, timers: &TimerService) -> bool {
        timers.is_running(TimerKey::Grab(kind))
    }

    /// Records the grab. Without a running grab timer this does nothing.
    pub fn grab(
        &self,
        kind: GrabKind,
        amount: &Amount,
        timers: &mut TimerService,
        now: UnixTimeMs,
    ) -> Vec<Command> {
        let key = TimerKey::Grab(kind);
        let Some(started_at) = timers.started_at(key) else {
            debug!(?kind, "grab without a started grab timer ignored");
            return Vec::new();
        };
        #[allow(clippy::cast_precision_loss)]
        let grab_time_secs = now.elapsed_since(started_at) as f64 / 1000.0;

        let mut commands: Vec<Command> = timers.cancel(key).into_iter().collect();
        commands.push(Command::Track(AnalyticsEvent::Grab {
            kind,
            kin: amount.whole_kin(),
            currency: amount.currency().to_string(),
            grab_time_secs,
        }));
        commands
    }

    /// Expiry of a grab timer: record it and forget the pending grab. Never
    /// touches the bill.
    #[must_use]
    pub fn timed_out(&self, kind: GrabKind) -> Command {
        debug!(?kind, "grab timed out");
        Command::Track(AnalyticsEvent::GrabTimedOut {
            kind,
            elapsed_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::*;

    const T0: UnixTimeMs = UnixTimeMs(10_000);

    #[test]
    fn test_grab_without_start_is_silent() {
        let tracker = GrabTracker::new(Duration::from_secs(15));
        let mut timers = TimerService::new();
        assert!(tracker
            .grab(GrabKind::Scan, &Amount::kin(100_000), &mut timers, T0)
            .is_empty());
    }

    #[test]
    fn test_grab_reports_elapsed_and_stops_timer() {
        let tracker = GrabTracker::new(Duration::from_secs(15));
        let mut timers = TimerService::new();
        tracker.start(GrabKind::Scan, &mut timers, T0);

        let commands = tracker.grab(
            GrabKind::Scan,
            &Amount::kin(500_000),
            &mut timers,
            UnixTimeMs(11_250),
        );

        assert_eq!(
            commands[0],
            Command::CancelTimer {
                key: TimerKey::Grab(GrabKind::Scan)
            }
        );
        let Command::Track(event) = &commands[1] else {
            panic!("expected track, got {:?}", commands[1]);
        };
        assert_eq!(event.name(), "Grab");
        assert!(event.properties().contains(&("Grab Time", "1.25".to_string())));
        assert!(event.properties().contains(&("Amount", "5".to_string())));
        assert!(!tracker.is_pending(GrabKind::Scan, &timers));

        // Second grab is a no-op.
        assert!(tracker
            .grab(GrabKind::Scan, &Amount::kin(500_000), &mut timers, UnixTimeMs(12_000))
            .is_empty());
    }

    #[test]
    fn test_cash_link_grab_name() {
        let event = AnalyticsEvent::Grab {
            kind: GrabKind::CashLink,
            kin: 1,
            currency: "KIN".into(),
            grab_time_secs: 0.5,
        };
        assert_eq!(event.name(), "CashLinkGrab");
    }

    #[test]
    fn test_bill_event_properties() {
        let bill = cash_bill(1_576_000_000);
        let event = AnalyticsEvent::bill(BillAnalyticsState::Shown, &bill);
        assert_eq!(
            event.properties(),
            vec![
                ("State", "Shown".to_string()),
                ("Amount", "15760".to_string()),
                ("Currency", "KIN".to_string()),
                ("Animation", "Pop".to_string()),
            ]
        );
    }

    #[test]
    fn test_transfer_event_uses_rate() {
        let amount = Amount::fiat(25, usd_rate());
        let event = AnalyticsEvent::transfer(&amount, false);
        let properties = event.properties();
        assert!(properties.contains(&("State", "Failure".to_string())));
        assert!(properties.contains(&("Currency", "USD".to_string())));
        assert!(properties.contains(&("Fiat", "0.25".to_string())));
    }

    #[test]
    fn test_upgrade_privacy_properties() {
        let event = AnalyticsEvent::UpgradePrivacy {
            successful: true,
            intent_id: "9xQeWvG8".into(),
            action_count: 4,
        };
        assert_eq!(event.name(), "Upgrade Privacy");
        assert!(event.properties().contains(&("Action Count", "4".to_string())));
    }
}
