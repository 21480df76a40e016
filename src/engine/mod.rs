mod availability;
mod cycle;
mod ledger;
pub mod window;

pub use availability::{BookedIndex, Snapshots, resolve_available};
pub use cycle::format_slot_message;
pub use ledger::NotificationLedger;

use std::sync::Arc;
use std::time::Duration;

use crate::fetch::SlotFetcher;
use crate::model::*;
use crate::notify::DeliverySink;
use crate::page::PageCheck;
use crate::status::StatusReporter;
use crate::store::AlertStore;
use window::StandingWatch;

/// Everything the availability check needs besides the alerts themselves.
pub struct AvailabilityCheck {
    pub fetcher: Arc<dyn SlotFetcher>,
    pub facility_id: String,
    pub booking_url: String,
    /// Applies to each date's fetch separately.
    pub fetch_timeout: Duration,
    pub standing: Option<StandingWatch>,
}

/// Owns the notification ledger and runs check cycles against it.
///
/// A watcher is driven by exactly one task; the ledger is only ever touched
/// through `&mut self`.
pub struct Watcher {
    store: Arc<dyn AlertStore>,
    sink: Arc<dyn DeliverySink>,
    reporter: Arc<dyn StatusReporter>,
    availability: Option<AvailabilityCheck>,
    page: Option<PageCheck>,
    ledger: NotificationLedger,
    interval: Duration,
    phase: CyclePhase,
}

impl Watcher {
    pub fn new(
        store: Arc<dyn AlertStore>,
        sink: Arc<dyn DeliverySink>,
        reporter: Arc<dyn StatusReporter>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            sink,
            reporter,
            availability: None,
            page: None,
            ledger: NotificationLedger::new(),
            interval,
            phase: CyclePhase::Idle,
        }
    }

    pub fn with_availability(mut self, check: AvailabilityCheck) -> Self {
        self.availability = Some(check);
        self
    }

    pub fn with_page(mut self, check: PageCheck) -> Self {
        self.page = Some(check);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn ledger(&self) -> &NotificationLedger {
        &self.ledger
    }

    /// Mutable access for re-arming slots by hand.
    pub fn ledger_mut(&mut self) -> &mut NotificationLedger {
        &mut self.ledger
    }

    /// Best-effort startup message.
    pub async fn announce_start(&self) {
        if let Err(e) = self.sink.deliver("🚀 Courtwatch started and monitoring...", false).await {
            tracing::warn!("startup message not delivered: {e}");
        }
    }

    /// Record the stop in the status file and send a best-effort goodbye.
    pub async fn stop(&mut self) {
        enter(&mut self.phase, CyclePhase::Idle);
        self.reporter.mark_stopped().await;
        if let Err(e) = self.sink.deliver("🛑 Courtwatch stopped", false).await {
            tracing::warn!("shutdown message not delivered: {e}");
        }
    }
}

/// Phase transition, logged at debug.
fn enter(phase: &mut CyclePhase, next: CyclePhase) {
    if *phase != next {
        tracing::debug!(from = phase.as_str(), to = next.as_str(), "cycle phase");
        *phase = next;
    }
}
