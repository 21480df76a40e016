//! One pass over the standing watch, printed to stdout. Nothing is delivered
//! and no notification state is kept.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};

use courtwatch::config::Config;
use courtwatch::engine::window::{desired_slots, fetch_plan};
use courtwatch::engine::{BookedIndex, Snapshots, resolve_available};
use courtwatch::fetch::{self, HttpSlotFetcher, SlotFetcher};
use courtwatch::model::{ResourceId, Slot, SlotTime};

const RULE_WIDTH: usize = 80;

type ByDate = BTreeMap<NaiveDate, BTreeMap<SlotTime, Vec<ResourceId>>>;

fn group(slots: &[Slot]) -> ByDate {
    let mut by_date = ByDate::new();
    for slot in slots {
        let courts = by_date.entry(slot.date).or_default().entry(slot.time).or_default();
        if !courts.contains(&slot.resource) {
            courts.push(slot.resource);
        }
    }
    for times in by_date.values_mut() {
        for courts in times.values_mut() {
            courts.sort_unstable();
        }
    }
    by_date
}

fn per_time(slots: &[Slot], times: &[SlotTime]) -> Vec<(SlotTime, usize)> {
    let mut sorted = times.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted
        .into_iter()
        .map(|t| (t, slots.iter().filter(|s| s.time == t).count()))
        .collect()
}

fn print_report(slots: &[Slot], times: &[SlotTime], today: NaiveDate) {
    let heavy = "═".repeat(RULE_WIDTH);
    let light = "─".repeat(RULE_WIDTH);

    if slots.is_empty() {
        println!("❌ No available slots found at target times\n");
        return;
    }

    let by_date = group(slots);
    println!("✅ Found {} available slots:\n", slots.len());
    for (date, times) in &by_date {
        let weekday = date.format("%A");
        if *date == today {
            println!("📅 {date} ({weekday}) - TODAY");
        } else {
            println!("📅 {date} ({weekday})");
        }
        println!("{light}");
        for (time, courts) in times {
            let plural = if courts.len() > 1 { "s" } else { "" };
            let list: Vec<String> = courts.iter().map(ToString::to_string).collect();
            println!("   🕐 {} - {} court{plural} available", time.clock(), courts.len());
            println!("      Courts: {}", list.join(", "));
        }
        println!();
    }

    println!("{heavy}");
    println!("\n📊 SUMMARY BY TIME SLOT\n");
    for (time, count) in per_time(slots, times) {
        println!("   {}: {} {count} slots", time.clock(), "█".repeat(count.min(50)));
    }
    println!("\n{heavy}");
    println!(
        "\n✨ Total: {} available slots across {} days\n",
        slots.len(),
        by_date.len()
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let Some(avail) = config.availability else {
        eprintln!("❌ API monitoring not enabled: set API_ENABLED=true and FACILITY_ID");
        std::process::exit(1);
    };
    let Some(watch) = avail.standing.clone() else {
        eprintln!("❌ TARGET_TIMES is not set: nothing to look for");
        std::process::exit(1);
    };

    let heavy = "═".repeat(RULE_WIDTH);
    println!("\n🎾 COURTWATCH - DRY RUN\n\n{heavy}\n");
    println!("Configuration:");
    println!("  Facility ID: {}", avail.facility_id);
    let courts: Vec<String> = watch.courts.iter().map(ToString::to_string).collect();
    println!("  Courts: {}", courts.join(", "));
    let times: Vec<String> = watch.times.iter().map(SlotTime::clock).collect();
    println!("  Target Times: {}", times.join(", "));
    println!("  Days to Check: {}\n", watch.days);

    let fetcher = HttpSlotFetcher::new(fetch::http_client()?, &avail.slot_api_url, avail.fetch_timeout);
    let today = Utc::now().date_naive();
    let desired = desired_slots(&[], Some(&watch), today);

    println!("🔍 Fetching availability data...");
    let mut snapshots = Snapshots::new();
    for (date, courts) in fetch_plan(&desired) {
        match fetcher.fetch_booked_slots(&avail.facility_id, &courts, date).await {
            Ok(booked) => {
                snapshots.insert(date, BookedIndex::from_snapshot(date, &booked));
            }
            Err(e) => eprintln!("   ⚠️  Failed to fetch data for {date}: {e}"),
        }
    }
    println!(" Done!\n\n{heavy}\n");

    let available: Vec<Slot> = resolve_available(&desired, &snapshots)
        .into_iter()
        .map(|w| w.slot)
        .collect();
    print_report(&available, &watch.times, today);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn slot(d: u32, time: SlotTime, court: ResourceId) -> Slot {
        Slot::new(NaiveDate::from_ymd_opt(2025, 3, d).unwrap(), time, court)
    }

    #[test]
    fn groups_by_date_then_time_with_sorted_courts() {
        let evening = SlotTime::new(18, 30);
        let late = SlotTime::new(20, 0);
        let grouped = group(&[
            slot(11, late, 3),
            slot(10, evening, 4),
            slot(10, evening, 1),
            slot(10, evening, 1),
        ]);
        let dates: Vec<_> = grouped.keys().map(|d| d.day()).collect();
        assert_eq!(dates, vec![10, 11]);
        assert_eq!(grouped.values().next().unwrap()[&evening], vec![1, 4]);
    }

    #[test]
    fn per_time_counts_every_target_time() {
        let evening = SlotTime::new(18, 30);
        let late = SlotTime::new(20, 0);
        let counts = per_time(&[slot(10, evening, 1), slot(11, evening, 2)], &[late, evening]);
        assert_eq!(counts, vec![(evening, 2), (late, 0)]);
    }
}
