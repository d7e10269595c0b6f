// lib.rs - Bill lifecycle & payment confirmation core

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]

pub mod analytics;
pub mod app;
pub mod bill_store;
pub mod capabilities;
pub mod command;
pub mod config;
pub mod deep_link;
pub mod event;
pub mod home;
pub mod lifecycle;
pub mod model;
pub mod payment;
pub mod runtime;
pub mod scan;
pub mod timer;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use command::Command;
pub use config::Config;
pub use event::Event;
pub use home::{Home, ViewModel};

/// The Crux model is the serial coordinator itself.
pub type Model = Home;

pub const GRAB_TIMEOUT: Duration = Duration::from_secs(15);
pub const BILL_SCREEN_TIMEOUT: Duration = Duration::from_secs(60);
pub const SHEET_DISMISS_TIMEOUT: Duration = Duration::from_secs(60);
pub const PAYMENT_SETTLE_DELAY: Duration = Duration::from_millis(500);
pub const SETTLEMENT_TIMEOUT: Duration = Duration::from_secs(30);
pub const RESCAN_SUPPRESSION: Duration = Duration::from_secs(3);
pub const MAX_PAYMENT_ATTEMPTS: u32 = 3;
pub const RECENT_SCAN_CAPACITY: usize = 16;
pub const CASH_LINK_HOST: &str = "cash.getcode.com";
pub const QUARKS_PER_KIN: u64 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Decode,
    DeepLink,
    Camera,
    CameraPermissionDenied,
    Network,
    SendFailed,
    SendRetriesExhausted,
    ReceiveFailed,
    InvalidState,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Decode => "DECODE_ERROR",
            Self::DeepLink => "DEEP_LINK_ERROR",
            Self::Camera => "CAMERA_ERROR",
            Self::CameraPermissionDenied => "CAMERA_PERMISSION_DENIED",
            Self::Network => "NETWORK_ERROR",
            Self::SendFailed => "SEND_FAILED",
            Self::SendRetriesExhausted => "SEND_RETRIES_EXHAUSTED",
            Self::ReceiveFailed => "RECEIVE_FAILED",
            Self::InvalidState => "INVALID_STATE",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::Camera | Self::Network | Self::SendFailed | Self::ReceiveFailed => {
                ErrorSeverity::Transient
            }
            Self::Decode
            | Self::DeepLink
            | Self::CameraPermissionDenied
            | Self::SendRetriesExhausted
            | Self::InvalidState => ErrorSeverity::Permanent,
        }
    }
}

/// A failure surfaced to the presentation layer. Never propagated as a fault.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.severity, ErrorSeverity::Transient)
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Decode => "That code couldn't be read. Please try again.".into(),
            ErrorKind::DeepLink => "This link is invalid or has already been used.".into(),
            ErrorKind::Camera => "Camera error. Please close and reopen the app.".into(),
            ErrorKind::CameraPermissionDenied => {
                "Camera access is required to scan codes. Please enable it in Settings.".into()
            }
            ErrorKind::Network => {
                "Unable to connect. Please check your internet connection and try again.".into()
            }
            ErrorKind::SendFailed => "The payment didn't go through. Please try again.".into(),
            ErrorKind::SendRetriesExhausted => {
                "The payment couldn't be completed and was cancelled.".into()
            }
            ErrorKind::ReceiveFailed => "The cash couldn't be collected.".into(),
            ErrorKind::InvalidState => self.message.clone(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)
    }
}

impl std::error::Error for AppError {}

/// Rejected bill or payment transition. Callers log and drop these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("no bill is active")]
    NoActiveBill,
    #[error("active bill cannot be dismissed right now")]
    NotDismissible,
    #[error("operation requires a {expected} bill")]
    WrongBillKind { expected: &'static str },
    #[error("bill cannot be sent: {0}")]
    NotSendable(&'static str),
    #[error("cannot {action} while payment is {from}")]
    InvalidPaymentState {
        from: model::PaymentState,
        action: &'static str,
    },
    #[error("event refers to a bill or submission that is no longer active")]
    Stale,
}

impl From<TransitionError> for AppError {
    fn from(e: TransitionError) -> Self {
        AppError::new(ErrorKind::InvalidState, e.to_string())
    }
}

impl From<model::DecodeError> for AppError {
    fn from(e: model::DecodeError) -> Self {
        AppError::new(ErrorKind::Decode, e.to_string())
    }
}

impl From<deep_link::DeepLinkError> for AppError {
    fn from(e: deep_link::DeepLinkError) -> Self {
        AppError::new(ErrorKind::DeepLink, e.to_string())
    }
}

impl From<scan::ScanError> for AppError {
    fn from(e: scan::ScanError) -> Self {
        let kind = match e {
            scan::ScanError::PermissionDenied => ErrorKind::CameraPermissionDenied,
            scan::ScanError::NoSurface | scan::ScanError::Hardware(_) => ErrorKind::Camera,
        };
        AppError::new(kind, e.to_string())
    }
}

/// Explicit timestamp unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnixTimeMs(pub u64);

impl UnixTimeMs {
    #[must_use]
    pub fn now() -> Self {
        let ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self(ms)
    }

    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn elapsed_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    #[must_use]
    pub fn add(self, duration: Duration) -> Self {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(ms))
    }

    #[must_use]
    pub const fn is_before(self, other: Self) -> bool {
        self.0 < other.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_severity() {
        assert_eq!(ErrorKind::SendFailed.default_severity(), ErrorSeverity::Transient);
        assert_eq!(
            ErrorKind::SendRetriesExhausted.default_severity(),
            ErrorSeverity::Permanent
        );
        assert!(AppError::new(ErrorKind::Network, "offline").is_retryable());
        assert!(!AppError::new(ErrorKind::Decode, "bad").is_retryable());
    }

    #[test]
    fn test_app_error_display() {
        let error = AppError::new(ErrorKind::SendFailed, "ledger said no");
        assert_eq!(error.to_string(), "[SEND_FAILED] ledger said no");
    }

    #[test]
    fn test_transition_error_converts_to_invalid_state() {
        let error: AppError = TransitionError::NotDismissible.into();
        assert_eq!(error.kind, ErrorKind::InvalidState);
        assert_eq!(error.user_facing_message(), error.message);
    }

    #[test]
    fn test_scan_permission_error_maps_to_permission_kind() {
        let error: AppError = scan::ScanError::PermissionDenied.into();
        assert_eq!(error.kind, ErrorKind::CameraPermissionDenied);
        assert!(error.user_facing_message().contains("Settings"));
    }

    #[test]
    fn test_unix_time_operations() {
        let time = UnixTimeMs(1_000);
        assert_eq!(time.add(Duration::from_millis(500)), UnixTimeMs(1_500));
        assert_eq!(UnixTimeMs(2_000).elapsed_since(time), 1_000);
        assert_eq!(time.elapsed_since(UnixTimeMs(2_000)), 0);
        assert!(time.is_before(UnixTimeMs(1_001)));
    }
}
