//! Camera scan session: owns start/stop of the decoder and the surface binding.
//!
//! Scanning is independent of bill visibility. Pausing on background is an
//! explicit `stop_scan`, and nothing is remembered; the lifecycle coordinator
//! reissues `start_scan` on foreground.

use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt, num::NonZeroUsize, time::Duration};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    command::Command,
    model::{DecodeError, PayloadKind, ScannedCode},
    UnixTimeMs,
};

/// Opaque reference to a platform camera surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ScanError {
    #[error("camera permission has not been granted")]
    PermissionDenied,
    #[error("no camera surface is attached")]
    NoSurface,
    #[error("camera hardware error: {0}")]
    Hardware(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PermissionState {
    #[default]
    Unknown,
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScanState {
    #[default]
    Idle,
    Scanning {
        surface: SurfaceId,
    },
}

pub struct ScanSession {
    state: ScanState,
    permission: PermissionState,
    recent: LruCache<String, UnixTimeMs>,
    suppression: Duration,
    handled: HashSet<String>,
}

impl fmt::Debug for ScanSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanSession")
            .field("state", &self.state)
            .field("permission", &self.permission)
            .field("recent", &self.recent.len())
            .field("handled", &self.handled.len())
            .finish_non_exhaustive()
    }
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new(crate::RECENT_SCAN_CAPACITY, crate::RESCAN_SUPPRESSION)
    }
}

impl ScanSession {
    #[must_use]
    pub fn new(capacity: usize, suppression: Duration) -> Self {
        Self {
            state: ScanState::Idle,
            permission: PermissionState::Unknown,
            recent: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            suppression,
            handled: HashSet::new(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> ScanState {
        self.state
    }

    #[must_use]
    pub const fn is_scanning(&self) -> bool {
        matches!(self.state, ScanState::Scanning { .. })
    }

    #[must_use]
    pub const fn permission(&self) -> PermissionState {
        self.permission
    }

    /// Begins decoding from `surface`. Idempotent for the same surface; a new
    /// surface rebinds. Permission is checked elsewhere, but a known denial
    /// refuses to start.
    pub fn start_scan(&mut self, surface: SurfaceId) -> Result<Vec<Command>, ScanError> {
        if self.permission == PermissionState::Denied {
            return Err(ScanError::PermissionDenied);
        }
        match self.state {
            ScanState::Scanning { surface: current } if current == surface => Ok(Vec::new()),
            ScanState::Scanning { .. } | ScanState::Idle => {
                info!(surface = surface.0, "scan session started");
                self.state = ScanState::Scanning { surface };
                Ok(vec![Command::StartScan { surface }])
            }
        }
    }

    /// Halts decoding and releases the surface. Safe when idle.
    pub fn stop_scan(&mut self) -> Vec<Command> {
        match self.state {
            ScanState::Idle => Vec::new(),
            ScanState::Scanning { surface } => {
                info!(surface = surface.0, "scan session stopped");
                self.state = ScanState::Idle;
                vec![Command::StopScan]
            }
        }
    }

    pub fn set_permission(&mut self, permission: PermissionState) -> Vec<Command> {
        self.permission = permission;
        if permission == PermissionState::Denied {
            return self.stop_scan();
        }
        Vec::new()
    }

    /// The platform scanner died underneath us; we are no longer running.
    pub fn mark_failed(&mut self, error: &ScanError) {
        warn!(%error, "scan session failed");
        self.state = ScanState::Idle;
    }

    /// Records a payload that became a bill. It is never accepted again this
    /// session, however long the camera stays on it.
    pub fn mark_handled(&mut self, fingerprint: String) {
        self.handled.insert(fingerprint);
    }

    #[must_use]
    pub fn is_handled(&self, fingerprint: &str) -> bool {
        self.handled.contains(fingerprint)
    }

    /// Structural intake of one decoded frame. `Ok(None)` means the frame was
    /// ignored: not scanning, already handled, or a repeat of a code seen
    /// moments ago.
    pub fn accept(
        &mut self,
        kind: PayloadKind,
        data: &[u8],
        now: UnixTimeMs,
    ) -> Result<Option<ScannedCode>, DecodeError> {
        if !self.is_scanning() {
            debug!("frame arrived while idle, dropped");
            return Ok(None);
        }

        let code = ScannedCode::decode(kind, data)?;
        let fingerprint = code.payload.fingerprint();
        if self.handled.contains(&fingerprint) {
            debug!(%fingerprint, "handled code scanned again, dropped");
            return Ok(None);
        }
        let window = u64::try_from(self.suppression.as_millis()).unwrap_or(u64::MAX);
        if let Some(seen) = self.recent.get(&fingerprint) {
            if now.elapsed_since(*seen) < window {
                debug!(%fingerprint, "duplicate scan suppressed");
                return Ok(None);
            }
        }
        self.recent.put(fingerprint, now);
        Ok(Some(code))
    }
}
