use crux_core::capability::{CapabilityContext, Operation};
use crux_core::macros::Capability;
use serde::{Deserialize, Serialize};

use crate::scan::SurfaceId;

/// Start/stop of the platform code scanner. Decoded frames come back as
/// `Event::CodeScanned` from the shell's frame callback, not as a response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScannerOperation {
    Start { surface: SurfaceId },
    Stop,
}

impl Operation for ScannerOperation {
    type Output = ();
}

#[derive(Capability)]
pub struct Scanner<Ev> {
    context: CapabilityContext<ScannerOperation, Ev>,
}

impl<Ev> Scanner<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<ScannerOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn start(&self, surface: SurfaceId) {
        self.notify(ScannerOperation::Start { surface });
    }

    pub fn stop(&self) {
        self.notify(ScannerOperation::Stop);
    }

    fn notify(&self, operation: ScannerOperation) {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            ctx.notify_shell(operation).await;
        });
    }
}
