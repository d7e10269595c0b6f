use serde::{Deserialize, Serialize};

use crate::{
    analytics::AnalyticsEvent,
    model::{Amount, Payload, Sheet, SubmissionId},
    scan::SurfaceId,
    timer::{TimerHandle, TimerKey},
};

/// Side effects requested by a transition. Components never perform I/O; the
/// shell executes these and reports results back as events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    StartScan {
        surface: SurfaceId,
    },
    StopScan,
    StartTimer {
        handle: TimerHandle,
        duration_ms: u64,
    },
    CancelTimer {
        key: TimerKey,
    },
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
    CancelSubmission {
        submission: SubmissionId,
    },
    Track(AnalyticsEvent),
    ShowSheet(Sheet),
    HideSheet,
}

impl Command {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StartScan { .. } => "start_scan",
            Self::StopScan => "stop_scan",
            Self::StartTimer { .. } => "start_timer",
            Self::CancelTimer { .. } => "cancel_timer",
            Self::SubmitPayment { .. } => "submit_payment",
            Self::ReceiveCash { .. } => "receive_cash",
            Self::RemoteSend { .. } => "remote_send",
            Self::CancelSubmission { .. } => "cancel_submission",
            Self::Track(_) => "track",
            Self::ShowSheet(_) => "show_sheet",
            Self::HideSheet => "hide_sheet",
        }
    }

    /// Commands that start an outbound ledger operation.
    #[must_use]
    pub const fn submission(&self) -> Option<SubmissionId> {
        match self {
            Self::SubmitPayment { submission, .. }
            | Self::ReceiveCash { submission, .. }
            | Self::RemoteSend { submission, .. } => Some(*submission),
            _ => None,
        }
    }
}
