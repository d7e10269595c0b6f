//! Bridges OS lifecycle, camera permission and deep links to the scan session
//! and timers. Holds no bill state; network state is only read.

use serde::{Deserialize, Serialize};
use std::{collections::HashSet, time::Duration};
use tracing::{debug, info, warn};

use crate::{
    command::Command,
    deep_link::{parse_cash_link, CashLink, DeepLinkError},
    model::NetworkState,
    scan::{PermissionState, ScanSession, SurfaceId},
    timer::{TimerKey, TimerService},
    UnixTimeMs,
};

pub const DISCONNECTED_CAPTION: &str = "No network connection";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    Foreground,
    Background,
}

#[derive(Debug)]
pub struct LifecycleCoordinator {
    foreground: bool,
    surface: Option<SurfaceId>,
    handled_links: HashSet<String>,
    sheet_dismiss_timeout: Duration,
    cash_link_host: String,
}

impl Default for LifecycleCoordinator {
    fn default() -> Self {
        Self::new(crate::SHEET_DISMISS_TIMEOUT, crate::CASH_LINK_HOST)
    }
}

impl LifecycleCoordinator {
    #[must_use]
    pub fn new(sheet_dismiss_timeout: Duration, cash_link_host: impl Into<String>) -> Self {
        Self {
            foreground: true,
            surface: None,
            handled_links: HashSet::new(),
            sheet_dismiss_timeout,
            cash_link_host: cash_link_host.into(),
        }
    }

    pub fn on_lifecycle(
        &mut self,
        event: LifecycleEvent,
        scan: &mut ScanSession,
        timers: &mut TimerService,
        now: UnixTimeMs,
    ) -> Vec<Command> {
        info!(?event, "lifecycle transition");
        match event {
            LifecycleEvent::Foreground => {
                self.foreground = true;
                let mut commands: Vec<Command> =
                    timers.cancel(TimerKey::SheetDismiss).into_iter().collect();
                commands.extend(self.resume_scan(scan));
                commands
            }
            LifecycleEvent::Background => {
                self.foreground = false;
                let mut commands = scan.stop_scan();
                commands.push(timers.start(TimerKey::SheetDismiss, self.sheet_dismiss_timeout, now));
                commands
            }
        }
    }

    pub fn attach_surface(&mut self, surface: SurfaceId, scan: &mut ScanSession) -> Vec<Command> {
        self.surface = Some(surface);
        self.resume_scan(scan)
    }

    pub fn detach_surface(&mut self, scan: &mut ScanSession) -> Vec<Command> {
        self.surface = None;
        scan.stop_scan()
    }

    pub fn on_permission(&mut self, granted: bool, scan: &mut ScanSession) -> Vec<Command> {
        let permission = if granted {
            PermissionState::Granted
        } else {
            PermissionState::Denied
        };
        let mut commands = scan.set_permission(permission);
        if granted {
            commands.extend(self.resume_scan(scan));
        }
        commands
    }

    /// Surfaces a blocking state when the camera cannot be used; the bill
    /// store is not affected.
    #[must_use]
    pub fn camera_blocked(&self, scan: &ScanSession) -> bool {
        scan.permission() == PermissionState::Denied
    }

    #[must_use]
    pub fn sheet_dismiss_elapsed(&self) -> Command {
        debug!("auto-dismissing sheets after background timeout");
        Command::HideSheet
    }

    /// Accepts a cash link only while no bill is shown, and each link once.
    pub fn accept_deep_link(
        &mut self,
        uri: &str,
        bill_active: bool,
    ) -> Result<Option<CashLink>, DeepLinkError> {
        if bill_active {
            debug!("deep link dropped while a bill is active");
            return Ok(None);
        }
        let link = parse_cash_link(uri, &self.cash_link_host)?;
        if !self.handled_links.insert(link.fingerprint()) {
            debug!(fingerprint = %link.fingerprint(), "deep link already handled");
            return Ok(None);
        }
        Ok(Some(link))
    }

    fn resume_scan(&self, scan: &mut ScanSession) -> Vec<Command> {
        let Some(surface) = self.surface.filter(|_| self.foreground) else {
            return Vec::new();
        };
        scan.start_scan(surface).unwrap_or_else(|error| {
            warn!(%error, "scan session could not start");
            Vec::new()
        })
    }
}

/// Caption for the bill view. Never dismisses anything.
#[must_use]
pub fn network_caption(network: &NetworkState) -> Option<&'static str> {
    (!network.connected).then_some(DISCONNECTED_CAPTION)
}
