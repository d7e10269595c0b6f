//! Cancellable, restartable countdowns keyed by purpose.
//!
//! The service never sleeps itself. `start` hands the shell a [`TimerHandle`]
//! to schedule; the shell reports expiry with that handle and [`TimerService::fire`]
//! decides whether it still counts. Each start bumps a generation counter, so a
//! restarted or cancelled timer can never fire through an old handle.

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};
use tracing::debug;

use crate::{analytics::GrabKind, command::Command, UnixTimeMs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerKey {
    Grab(GrabKind),
    ScreenTimeout,
    SheetDismiss,
    PaymentSettle,
}

impl TimerKey {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Grab(GrabKind::Scan) => "grab",
            Self::Grab(GrabKind::CashLink) => "cash_link_grab",
            Self::ScreenTimeout => "screen_timeout",
            Self::SheetDismiss => "sheet_dismiss",
            Self::PaymentSettle => "payment_settle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerHandle {
    pub key: TimerKey,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Running {
    generation: u64,
    started_at: UnixTimeMs,
    deadline: UnixTimeMs,
}

#[derive(Debug, Default)]
pub struct TimerService {
    running: HashMap<TimerKey, Running>,
    next_generation: u64,
}

impl TimerService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `key`, replacing any running instance (last start wins).
    pub fn start(&mut self, key: TimerKey, duration: Duration, now: UnixTimeMs) -> Command {
        self.next_generation += 1;
        let generation = self.next_generation;
        let restarted = self
            .running
            .insert(
                key,
                Running {
                    generation,
                    started_at: now,
                    deadline: now.add(duration),
                },
            )
            .is_some();
        debug!(timer = key.name(), generation, restarted, "timer started");

        Command::StartTimer {
            handle: TimerHandle { key, generation },
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Stops `key`. Returns the shell command only if something was running.
    pub fn cancel(&mut self, key: TimerKey) -> Option<Command> {
        self.running.remove(&key).map(|running| {
            debug!(timer = key.name(), generation = running.generation, "timer cancelled");
            Command::CancelTimer { key }
        })
    }

    #[must_use]
    pub fn is_running(&self, key: TimerKey) -> bool {
        self.running.contains_key(&key)
    }

    #[must_use]
    pub fn deadline(&self, key: TimerKey) -> Option<UnixTimeMs> {
        self.running.get(&key).map(|r| r.deadline)
    }

    #[must_use]
    pub fn started_at(&self, key: TimerKey) -> Option<UnixTimeMs> {
        self.running.get(&key).map(|r| r.started_at)
    }

    /// Consumes an expiry report. True exactly once per start, and only for the
    /// current generation; everything else is stale.
    pub fn fire(&mut self, handle: TimerHandle) -> bool {
        match self.running.get(&handle.key) {
            Some(running) if running.generation == handle.generation => {
                self.running.remove(&handle.key);
                true
            }
            _ => {
                debug!(
                    timer = handle.key.name(),
                    generation = handle.generation,
                    "stale timer fire dropped"
                );
                false
            }
        }
    }
}
