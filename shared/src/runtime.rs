//! A tokio host for [`Home`], for shells that embed the core natively instead
//! of through Crux effects.
//!
//! Ledger calls and timers run as tasks off the control path. Their results
//! come back through one unbounded mpsc queue with a single consumer, so every
//! state change still happens serially inside [`Home::handle`]. Cancelling a
//! submission aborts its task; every ledger call is also bounded by the
//! settlement timeout, so nothing can leave a payment `Sending` forever.

use async_trait::async_trait;
use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{timeout, Instant},
};
use tracing::{debug, instrument, warn};

use crate::{
    command::Command,
    config::Config,
    event::Event,
    home::{Home, ViewModel},
    model::{Amount, Payload, Sheet, SubmissionId},
    payment::SettlementError,
    scan::{ScanError, SurfaceId},
    timer::TimerKey,
    UnixTimeMs,
};

// ============================================================================
// Collaborator Traits
// ============================================================================

#[async_trait]
pub trait Ledger: Send + Sync + 'static {
    async fn submit_payment(&self, payload: &Payload, amount: &Amount)
        -> Result<(), SettlementError>;
    async fn receive_cash(&self, payload: &Payload) -> Result<Amount, SettlementError>;
    async fn remote_send(&self, payload: &Payload, amount: &Amount)
        -> Result<(), SettlementError>;
}

pub trait ScannerDevice: Send + Sync {
    fn start(&self, surface: SurfaceId) -> Result<(), ScanError>;
    fn stop(&self);
}

/// Must not block; delivery is best-effort.
pub trait AnalyticsSink: Send + Sync {
    fn track(&self, name: &str, properties: &[(&'static str, String)]);
}

pub trait Navigator: Send + Sync {
    fn show_sheet(&self, sheet: Sheet);
    fn hide_sheet(&self);
}

pub struct Collaborators {
    pub ledger: Arc<dyn Ledger>,
    pub scanner: Arc<dyn ScannerDevice>,
    pub analytics: Arc<dyn AnalyticsSink>,
    pub navigator: Arc<dyn Navigator>,
}

// ============================================================================
// Runtime
// ============================================================================

pub struct Runtime {
    home: Home,
    collaborators: Collaborators,
    tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
    timers: HashMap<TimerKey, JoinHandle<()>>,
    submissions: HashMap<SubmissionId, JoinHandle<()>>,
    epoch: UnixTimeMs,
    started: Instant,
}

impl Runtime {
    #[must_use]
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            home: Home::new(config),
            collaborators,
            tx,
            rx,
            timers: HashMap::new(),
            submissions: HashMap::new(),
            epoch: UnixTimeMs::now(),
            started: Instant::now(),
        }
    }

    /// Queue handle for shell callbacks (camera frames, lifecycle, network).
    #[must_use]
    pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
        self.tx.clone()
    }

    #[must_use]
    pub fn home(&self) -> &Home {
        &self.home
    }

    #[must_use]
    pub fn view(&self) -> ViewModel {
        self.home.view()
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.submissions.values().filter(|h| !h.is_finished()).count()
    }

    /// Core time follows the tokio clock so paused-time tests stay exact.
    fn now(&self) -> UnixTimeMs {
        self.epoch.add(self.started.elapsed())
    }

    /// Applies one event immediately and executes what it produces.
    pub fn dispatch(&mut self, event: Event) {
        let now = self.now();
        for command in self.home.handle(event, now) {
            self.execute(command);
        }
    }

    /// Drains queued events as they arrive for `duration` of (tokio) time.
    pub async fn run_for(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            let next = tokio::select! {
                event = self.rx.recv() => event,
                () = tokio::time::sleep_until(deadline) => None,
            };
            match next {
                Some(event) => self.dispatch(event),
                None => break,
            }
        }
    }

    #[instrument(skip(self, command), fields(command = command.name()))]
    fn execute(&mut self, command: Command) {
        match command {
            Command::StartScan { surface } => {
                if let Err(error) = self.collaborators.scanner.start(surface) {
                    self.send(Event::ScanFailed { error });
                }
            }
            Command::StopScan => self.collaborators.scanner.stop(),
            Command::StartTimer {
                handle,
                duration_ms,
            } => {
                let tx = self.tx.clone();
                let task = tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(duration_ms)).await;
                    if tx.send(Event::TimerFired(handle)).is_err() {
                        debug!("runtime gone before timer fired");
                    }
                });
                if let Some(previous) = self.timers.insert(handle.key, task) {
                    previous.abort();
                }
            }
            Command::CancelTimer { key } => {
                if let Some(task) = self.timers.remove(&key) {
                    task.abort();
                }
            }
            Command::SubmitPayment {
                submission,
                payload,
                amount,
            } => {
                let ledger = Arc::clone(&self.collaborators.ledger);
                self.spawn_submission(
                    submission,
                    async move { ledger.submit_payment(&payload, &amount).await },
                    move |result| Event::PaymentSettled { submission, result },
                );
            }
            Command::ReceiveCash {
                submission,
                payload,
            } => {
                let ledger = Arc::clone(&self.collaborators.ledger);
                self.spawn_submission(
                    submission,
                    async move { ledger.receive_cash(&payload).await },
                    move |result| Event::CashReceived { submission, result },
                );
            }
            Command::RemoteSend {
                submission,
                payload,
                amount,
            } => {
                let ledger = Arc::clone(&self.collaborators.ledger);
                self.spawn_submission(
                    submission,
                    async move { ledger.remote_send(&payload, &amount).await },
                    move |result| Event::RemoteSendResolved { submission, result },
                );
            }
            Command::CancelSubmission { submission } => {
                if let Some(task) = self.submissions.remove(&submission) {
                    debug!(%submission, "aborting ledger call");
                    task.abort();
                }
            }
            Command::Track(event) => self
                .collaborators
                .analytics
                .track(event.name(), &event.properties()),
            Command::ShowSheet(sheet) => self.collaborators.navigator.show_sheet(sheet),
            Command::HideSheet => self.collaborators.navigator.hide_sheet(),
        }
    }

    fn spawn_submission<T, Fut, F>(&mut self, submission: SubmissionId, call: Fut, to_event: F)
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, SettlementError>> + Send + 'static,
        F: FnOnce(Result<T, SettlementError>) -> Event + Send + 'static,
    {
        self.submissions.retain(|_, task| !task.is_finished());

        let tx = self.tx.clone();
        let limit = self.home.config().settlement_timeout();
        let task = tokio::spawn(async move {
            let result = timeout(limit, call)
                .await
                .unwrap_or(Err(SettlementError::Timeout));
            if tx.send(to_event(result)).is_err() {
                debug!(%submission, "runtime gone before ledger answered");
            }
        });
        self.submissions.insert(submission, task);
    }

    fn send(&self, event: Event) {
        if self.tx.send(event).is_err() {
            warn!("event queue closed");
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        for task in self.timers.values().chain(self.submissions.values()) {
            task.abort();
        }
    }
}
