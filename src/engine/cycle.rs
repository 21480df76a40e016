use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;

use super::availability::{BookedIndex, Snapshots, resolve_available};
use super::{Watcher, enter, window};
use crate::fetch::FetchError;
use crate::model::*;
use crate::notify::MESSAGE_SEPARATOR;
use crate::observability;
use crate::store::StoreError;

/// Markdown block announcing one free slot.
pub fn format_slot_message(watched: &WatchedSlot, booking_url: &str) -> String {
    format!(
        "🎾 *Court Available!*\n\n📋 Alert: {}\n📅 Date: {}\n🕐 Time: {}\n🏟️ Court: {}\n\n[Book Now]({})",
        watched.source,
        watched.slot.date.format("%Y-%m-%d"),
        watched.slot.time.clock(),
        watched.slot.resource,
        booking_url,
    )
}

fn page_message(url: &str, message: &str) -> String {
    format!("✅ *Condition Met!*\n\n{message}\n\nURL: {url}")
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned());
    match detail {
        Some(detail) => format!("check panicked: {detail}"),
        None => "check panicked".to_string(),
    }
}

fn no_new_slots(active: usize) -> String {
    format!("Checking {active} active alert(s) - no new available slots found")
}

fn availability_failed(error: impl Into<String>) -> CheckOutcome {
    CheckOutcome::Availability {
        result: CheckResult::failed(error),
        slots_found: 0,
        failed_dates: Vec::new(),
    }
}

impl Watcher {
    /// Run one full cycle: load alerts, run every enabled check, deliver what
    /// fired and hand the report to the status reporter.
    ///
    /// Never fails. Each problem is scoped to the check (or the date) it hit
    /// and shows up in the returned report.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let clock = Instant::now();
        let started_at = Utc::now();

        let (total, active) = match self.load_alerts().await {
            Ok((total, active)) => (total, Ok(active)),
            Err(e) => {
                tracing::warn!("could not load alerts: {e}");
                (0, Err(e.to_string()))
            }
        };
        let active_count = active.as_ref().map_or(0, Vec::len);
        metrics::gauge!(observability::ALERTS_ACTIVE).set(active_count as f64);
        self.reporter
            .record_cycle_start(self.interval, total, active_count)
            .await;

        enter(&mut self.phase, CyclePhase::Fetching);
        let website = match &self.page {
            Some(page) => {
                let result = AssertUnwindSafe(page.run())
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| CheckResult::failed(panic_message(&*panic)));
                Some(CheckOutcome::Website {
                    url: page.url.clone(),
                    result,
                })
            }
            None => None,
        };

        let availability = if self.availability.is_none() {
            None
        } else {
            Some(match active {
                Ok(alerts) => AssertUnwindSafe(self.check_availability(&alerts))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| availability_failed(panic_message(&*panic))),
                Err(store_error) => availability_failed(store_error),
            })
        };

        enter(&mut self.phase, CyclePhase::Emitting);
        let outcomes: Vec<CheckOutcome> = website.into_iter().chain(availability).collect();
        for outcome in &outcomes {
            self.emit(outcome).await;
        }

        enter(&mut self.phase, CyclePhase::Reporting);
        let report = CycleReport {
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };
        self.reporter.record_cycle_result(&report).await;

        let status = if report.outcomes.iter().all(|o| o.result().is_success()) {
            "ok"
        } else {
            "error"
        };
        metrics::counter!(observability::CYCLES_TOTAL, "status" => status).increment(1);
        metrics::histogram!(observability::CYCLE_DURATION_SECONDS)
            .record(clock.elapsed().as_secs_f64());

        enter(&mut self.phase, CyclePhase::Idle);
        report
    }

    /// Total alert count plus the active alerts.
    async fn load_alerts(&self) -> Result<(usize, Vec<Alert>), StoreError> {
        let total = self.store.list_all().await?.len();
        let active = self.store.list_active().await?;
        Ok((total, active))
    }

    async fn check_availability(&mut self, active: &[Alert]) -> CheckOutcome {
        let Some(check) = &self.availability else {
            return availability_failed("availability check is not configured");
        };

        let today = Utc::now().date_naive();
        let desired = window::desired_slots(active, check.standing.as_ref(), today);
        if desired.is_empty() {
            let message = if active.is_empty() {
                "No active alerts configured".to_string()
            } else {
                no_new_slots(active.len())
            };
            return CheckOutcome::Availability {
                result: CheckResult::not_met(message),
                slots_found: 0,
                failed_dates: Vec::new(),
            };
        }

        // Fetching: one request per distinct date, each with its own deadline.
        let plan = window::fetch_plan(&desired);
        let mut snapshots = Snapshots::new();
        let mut failed_dates = Vec::new();
        for (date, courts) in &plan {
            let clock = Instant::now();
            let fetch = check
                .fetcher
                .fetch_booked_slots(&check.facility_id, courts, *date);
            let result = match tokio::time::timeout(check.fetch_timeout, fetch).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(check.fetch_timeout)),
            };
            metrics::histogram!(observability::FETCH_DURATION_SECONDS)
                .record(clock.elapsed().as_secs_f64());

            match result {
                Ok(booked) => {
                    metrics::counter!(observability::FETCH_TOTAL, "status" => "ok").increment(1);
                    let index = BookedIndex::from_snapshot(*date, &booked);
                    if index.discarded() > 0 {
                        tracing::debug!(%date, discarded = index.discarded(), "dropped records for other dates");
                    }
                    tracing::debug!(%date, booked = index.booked_count(), "snapshot indexed");
                    snapshots.insert(*date, index);
                }
                Err(e) => {
                    metrics::counter!(observability::FETCH_TOTAL, "status" => e.label()).increment(1);
                    tracing::warn!(%date, "slot fetch failed: {e}");
                    failed_dates.push(DateFailure {
                        date: *date,
                        reason: e.to_string(),
                    });
                }
            }
        }

        enter(&mut self.phase, CyclePhase::Resolving);
        let available = resolve_available(&desired, &snapshots);

        enter(&mut self.phase, CyclePhase::Filtering);
        let fresh: Vec<&WatchedSlot> = available
            .into_iter()
            .filter(|w| self.ledger.claim(w.slot))
            .collect();
        metrics::counter!(observability::SLOTS_NOTIFIED_TOTAL).increment(fresh.len() as u64);
        metrics::gauge!(observability::LEDGER_SIZE).set(self.ledger.len() as f64);

        let result = if snapshots.is_empty() {
            CheckResult::failed(format!(
                "all {} date(s) failed, first: {}",
                plan.len(),
                failed_dates
                    .first()
                    .map_or("unknown", |f: &DateFailure| f.reason.as_str())
            ))
        } else if fresh.is_empty() {
            CheckResult::not_met(no_new_slots(active.len()))
        } else {
            let blocks: Vec<String> = fresh
                .iter()
                .map(|w| format_slot_message(w, &check.booking_url))
                .collect();
            CheckResult::met(blocks.join(MESSAGE_SEPARATOR))
        };

        tracing::info!(
            dates = plan.len(),
            failed = failed_dates.len(),
            new_slots = fresh.len(),
            "availability checked"
        );
        CheckOutcome::Availability {
            result,
            slots_found: fresh.len(),
            failed_dates,
        }
    }

    /// Deliver a fired outcome. Delivery failures are logged; ledger marks stay.
    async fn emit(&self, outcome: &CheckOutcome) {
        let result = outcome.result();
        if !result.condition_met {
            return;
        }
        let Some(message) = result.message.as_deref() else {
            return;
        };
        let text = match outcome {
            CheckOutcome::Website { url, .. } => page_message(url, message),
            CheckOutcome::Availability { .. } => message.to_string(),
        };
        let delivered = self.sink.deliver(&text, true).await;
        metrics::counter!(
            observability::DELIVERIES_TOTAL,
            "status" => observability::status_label(&delivered)
        )
        .increment(1);
        if let Err(e) = delivered {
            tracing::warn!(check = outcome.name(), "notification not delivered: {e}");
        }
    }
}
