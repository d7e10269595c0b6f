use crux_core::capability::{CapabilityContext, Operation};
use crux_core::macros::Capability;
use serde::{Deserialize, Serialize};

use crate::analytics::AnalyticsEvent;

/// Best-effort analytics delivery. Nothing waits on the shell's answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalyticsOperation {
    pub name: String,
    pub properties: Vec<(String, String)>,
}

impl From<&AnalyticsEvent> for AnalyticsOperation {
    fn from(event: &AnalyticsEvent) -> Self {
        Self {
            name: event.name().to_string(),
            properties: event
                .properties()
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
        }
    }
}

impl Operation for AnalyticsOperation {
    type Output = ();
}

#[derive(Capability)]
pub struct Analytics<Ev> {
    context: CapabilityContext<AnalyticsOperation, Ev>,
}

impl<Ev> Analytics<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<AnalyticsOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn track(&self, event: &AnalyticsEvent) {
        let operation = AnalyticsOperation::from(event);
        let ctx = self.context.clone();
        self.context.spawn(async move {
            ctx.notify_shell(operation).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::GrabKind;

    #[test]
    fn test_operation_from_event() {
        let op = AnalyticsOperation::from(&AnalyticsEvent::GrabTimedOut {
            kind: GrabKind::Scan,
            elapsed_ms: 15_000,
        });
        assert_eq!(op.name, "Grab Timed Out");
        assert_eq!(
            op.properties,
            vec![
                ("Type".to_string(), "Scan".to_string()),
                ("Milliseconds".to_string(), "15000".to_string()),
            ]
        );
    }
}
