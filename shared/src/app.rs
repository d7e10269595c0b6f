use tracing::debug;

use crate::{
    capabilities::Capabilities, command::Command, event::Event, home::Home, home::ViewModel,
    UnixTimeMs,
};

#[derive(Default)]
pub struct App;

impl crux_core::App for App {
    type Event = Event;
    type Model = Home;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    fn update(&self, event: Event, model: &mut Home, caps: &Capabilities) {
        let commands = model.handle(event, UnixTimeMs::now());
        for command in commands {
            execute(command, caps);
        }
        caps.render.render();
    }

    fn view(&self, model: &Home) -> ViewModel {
        model.view()
    }
}

/// Maps a core command onto the capability that carries it to the shell.
fn execute(command: Command, caps: &Capabilities) {
    debug!(command = command.name(), "executing command");
    match command {
        Command::StartScan { surface } => caps.scanner.start(surface),
        Command::StopScan => caps.scanner.stop(),
        Command::StartTimer {
            handle,
            duration_ms,
        } => caps.timer.start(handle, duration_ms, Event::TimerFired),
        Command::CancelTimer { key } => caps.timer.cancel(key),
        Command::SubmitPayment {
            submission,
            payload,
            amount,
        } => caps
            .ledger
            .submit_payment(submission, payload, amount, move |result| {
                Event::PaymentSettled { submission, result }
            }),
        Command::ReceiveCash {
            submission,
            payload,
        } => caps.ledger.receive_cash(submission, payload, move |result| {
            Event::CashReceived { submission, result }
        }),
        Command::RemoteSend {
            submission,
            payload,
            amount,
        } => caps
            .ledger
            .remote_send(submission, payload, amount, move |result| {
                Event::RemoteSendResolved { submission, result }
            }),
        Command::CancelSubmission { submission } => caps.ledger.cancel(submission),
        Command::Track(event) => caps.analytics.track(&event),
        Command::ShowSheet(sheet) => caps.navigator.show_sheet(sheet),
        Command::HideSheet => caps.navigator.hide_sheet(),
    }
}
