use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

use crate::{
    lifecycle::LifecycleEvent,
    model::{Amount, NetworkState, PayloadKind, Sheet, SubmissionId},
    payment::SettlementError,
    scan::{ScanError, SurfaceId},
    timer::TimerHandle,
};

/// Longest deep link we will look at.
pub const MAX_URI_LEN: usize = 2048;

// --- Raw code bytes: redacts Debug, zeroizes on Drop ---

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawCode(#[serde(with = "serde_bytes")] Vec<u8>);

impl RawCode {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for RawCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawCode([REDACTED; {}])", self.0.len())
    }
}

impl Drop for RawCode {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

// --- Event enum: shell input and capability responses ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Event {
    // Platform
    Lifecycle(LifecycleEvent),
    SurfaceAttached {
        surface: SurfaceId,
    },
    SurfaceDetached,
    CameraPermissionChanged {
        granted: bool,
    },
    NetworkChanged(NetworkState),
    RatesUpdated {
        rates: Vec<(String, f64)>,
    },

    // Intake
    CodeScanned {
        kind: PayloadKind,
        data: RawCode,
    },
    ScanFailed {
        error: ScanError,
    },
    GiveBillCreated {
        data: RawCode,
    },
    DeepLinkOpened {
        uri: String,
    },

    // User actions
    BillSwiped,
    RemoteSendRequested,
    CancelSend,
    ConfirmPayment,
    RejectPayment,
    CancelPayment,
    SheetRequested(Sheet),
    AlertDismissed,

    // Capability responses
    TimerFired(TimerHandle),
    PaymentSettled {
        submission: SubmissionId,
        result: Result<(), SettlementError>,
    },
    CashReceived {
        submission: SubmissionId,
        result: Result<Amount, SettlementError>,
    },
    RemoteSendResolved {
        submission: SubmissionId,
        result: Result<(), SettlementError>,
    },
    PrivacyUpgraded {
        successful: bool,
        intent_id: String,
        action_count: u32,
    },
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Lifecycle(_) => "lifecycle",
            Self::SurfaceAttached { .. } => "surface_attached",
            Self::SurfaceDetached => "surface_detached",
            Self::CameraPermissionChanged { .. } => "camera_permission_changed",
            Self::NetworkChanged(_) => "network_changed",
            Self::RatesUpdated { .. } => "rates_updated",
            Self::CodeScanned { .. } => "code_scanned",
            Self::ScanFailed { .. } => "scan_failed",
            Self::GiveBillCreated { .. } => "give_bill_created",
            Self::DeepLinkOpened { .. } => "deep_link_opened",
            Self::BillSwiped => "bill_swiped",
            Self::RemoteSendRequested => "remote_send_requested",
            Self::CancelSend => "cancel_send",
            Self::ConfirmPayment => "confirm_payment",
            Self::RejectPayment => "reject_payment",
            Self::CancelPayment => "cancel_payment",
            Self::SheetRequested(_) => "sheet_requested",
            Self::AlertDismissed => "alert_dismissed",
            Self::TimerFired(_) => "timer_fired",
            Self::PaymentSettled { .. } => "payment_settled",
            Self::CashReceived { .. } => "cash_received",
            Self::RemoteSendResolved { .. } => "remote_send_resolved",
            Self::PrivacyUpgraded { .. } => "privacy_upgraded",
        }
    }

    #[must_use]
    pub const fn is_user_initiated(&self) -> bool {
        matches!(
            self,
            Self::GiveBillCreated { .. }
                | Self::BillSwiped
                | Self::RemoteSendRequested
                | Self::CancelSend
                | Self::ConfirmPayment
                | Self::RejectPayment
                | Self::CancelPayment
                | Self::SheetRequested(_)
                | Self::AlertDismissed
        )
    }
}
