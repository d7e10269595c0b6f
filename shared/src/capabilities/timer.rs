use crux_core::capability::{CapabilityContext, Operation};
use crux_core::macros::Capability;
use serde::{Deserialize, Serialize};

use crate::timer::{TimerHandle, TimerKey};

/// Shell-side countdowns. The shell resolves a `Start` request once, with
/// `Fired` on expiry or `Cancelled` when a `Cancel` for the same key arrives
/// first. The core still checks the generation, so a late `Fired` is harmless.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TimerOperation {
    Start { handle: TimerHandle, duration_ms: u64 },
    Cancel { key: TimerKey },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TimerOutput {
    Fired { handle: TimerHandle },
    Cancelled,
}

impl Operation for TimerOperation {
    type Output = TimerOutput;
}

#[derive(Capability)]
pub struct Timer<Ev> {
    context: CapabilityContext<TimerOperation, Ev>,
}

impl<Ev> Timer<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<TimerOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn start<F>(&self, handle: TimerHandle, duration_ms: u64, on_fire: F)
    where
        F: FnOnce(TimerHandle) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let output = ctx
                .request_from_shell(TimerOperation::Start {
                    handle,
                    duration_ms,
                })
                .await;
            if let TimerOutput::Fired { handle } = output {
                ctx.update_app(on_fire(handle));
            }
        });
    }

    pub fn cancel(&self, key: TimerKey) {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            ctx.notify_shell(TimerOperation::Cancel { key }).await;
        });
    }
}
