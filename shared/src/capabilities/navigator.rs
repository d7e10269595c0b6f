use crux_core::capability::{CapabilityContext, Operation};
use crux_core::macros::Capability;
use serde::{Deserialize, Serialize};

use crate::model::Sheet;

/// Named modal sheets over the scan view. The core never knows what they render.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum NavigatorOperation {
    ShowSheet(Sheet),
    HideSheet,
}

impl Operation for NavigatorOperation {
    type Output = ();
}

#[derive(Capability)]
pub struct Navigator<Ev> {
    context: CapabilityContext<NavigatorOperation, Ev>,
}

impl<Ev> Navigator<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<NavigatorOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn show_sheet(&self, sheet: Sheet) {
        self.notify(NavigatorOperation::ShowSheet(sheet));
    }

    pub fn hide_sheet(&self) {
        self.notify(NavigatorOperation::HideSheet);
    }

    fn notify(&self, operation: NavigatorOperation) {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            ctx.notify_shell(operation).await;
        });
    }
}
