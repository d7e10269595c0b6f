mod analytics;
mod ledger;
mod navigator;
mod scanner;
mod timer;

pub use self::analytics::{Analytics, AnalyticsOperation};
pub use self::ledger::{Ledger, LedgerOperation, LedgerOutput};
pub use self::navigator::{Navigator, NavigatorOperation};
pub use self::scanner::{Scanner, ScannerOperation};
pub use self::timer::{Timer, TimerOperation, TimerOutput};

// Crux's built-in Render capability is all the view needs.
pub use crux_core::render::Render;

use crate::{app::App, event::Event};

#[derive(crux_core::macros::Effect)]
#[effect(app = "App")]
pub struct Capabilities {
    pub render: Render<Event>,
    pub scanner: Scanner<Event>,
    pub timer: Timer<Event>,
    pub ledger: Ledger<Event>,
    pub analytics: Analytics<Event>,
    pub navigator: Navigator<Event>,
}
