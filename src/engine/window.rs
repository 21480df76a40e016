use chrono::{Days, NaiveDate};

use crate::model::*;

/// Every bookable slot start, 45 minutes apart from 06:30 to 21:30.
pub const SLOT_TIMES: [SlotTime; 21] = [
    SlotTime::new(6, 30),
    SlotTime::new(7, 15),
    SlotTime::new(8, 0),
    SlotTime::new(8, 45),
    SlotTime::new(9, 30),
    SlotTime::new(10, 15),
    SlotTime::new(11, 0),
    SlotTime::new(11, 45),
    SlotTime::new(12, 30),
    SlotTime::new(13, 15),
    SlotTime::new(14, 0),
    SlotTime::new(14, 45),
    SlotTime::new(15, 30),
    SlotTime::new(16, 15),
    SlotTime::new(17, 0),
    SlotTime::new(17, 45),
    SlotTime::new(18, 30),
    SlotTime::new(19, 15),
    SlotTime::new(20, 0),
    SlotTime::new(20, 45),
    SlotTime::new(21, 30),
];

pub fn is_slot_time(time: SlotTime) -> bool {
    SLOT_TIMES.contains(&time)
}

/// Canonical slot labels from `start` to `end`, both inclusive.
///
/// Empty when either bound is not a canonical label or `start` comes after `end`.
pub fn time_window(start: SlotTime, end: SlotTime) -> &'static [SlotTime] {
    let start_idx = SLOT_TIMES.iter().position(|t| *t == start);
    let end_idx = SLOT_TIMES.iter().position(|t| *t == end);
    match (start_idx, end_idx) {
        (Some(s), Some(e)) if s <= e => &SLOT_TIMES[s..=e],
        _ => &[],
    }
}

/// Config-driven watch over the next few days, independent of stored alerts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandingWatch {
    pub times: Vec<SlotTime>,
    pub courts: Vec<ResourceId>,
    pub days: u32,
}

pub const STANDING_WATCH_NAME: &str = "Standing watch";

/// `days` consecutive calendar days starting at `first`. Weekends included.
pub fn upcoming_dates(first: NaiveDate, days: u32) -> Vec<NaiveDate> {
    (0..days)
        .filter_map(|offset| first.checked_add_days(Days::new(u64::from(offset))))
        .collect()
}

/// Expand alerts (in the given order) and the standing watch into watched slots.
///
/// Order is alert order, then time, then court. Inactive alerts contribute nothing.
pub fn desired_slots(
    alerts: &[Alert],
    standing: Option<&StandingWatch>,
    today: NaiveDate,
) -> Vec<WatchedSlot> {
    let mut out = Vec::new();

    for alert in alerts.iter().filter(|a| a.active) {
        let window = time_window(alert.start_time, alert.end_time);
        if window.is_empty() {
            tracing::debug!(
                alert = %alert.id,
                start = %alert.start_time,
                end = %alert.end_time,
                "alert window is empty"
            );
        }
        for &time in window {
            for &court in &alert.courts {
                out.push(WatchedSlot {
                    slot: Slot::new(alert.date, time, court),
                    source: alert.name.clone(),
                });
            }
        }
    }

    if let Some(watch) = standing {
        // Only canonical starts are ever reported booked.
        let times: Vec<SlotTime> = watch
            .times
            .iter()
            .copied()
            .filter(|&time| {
                let bookable = is_slot_time(time);
                if !bookable {
                    tracing::warn!(%time, "standing watch time is not a slot start, skipping");
                }
                bookable
            })
            .collect();
        for date in upcoming_dates(today, watch.days) {
            for &time in &times {
                for &court in &watch.courts {
                    out.push(WatchedSlot {
                        slot: Slot::new(date, time, court),
                        source: STANDING_WATCH_NAME.to_string(),
                    });
                }
            }
        }
    }

    out
}

/// One fetch per distinct date, in first-seen order, carrying the union of
/// courts wanted on that date.
pub fn fetch_plan(desired: &[WatchedSlot]) -> Vec<(NaiveDate, Vec<ResourceId>)> {
    let mut plan: Vec<(NaiveDate, Vec<ResourceId>)> = Vec::new();
    for w in desired {
        let idx = match plan.iter().position(|(d, _)| *d == w.slot.date) {
            Some(pos) => pos,
            None => {
                plan.push((w.slot.date, Vec::new()));
                plan.len() - 1
            }
        };
        let courts = &mut plan[idx].1;
        if !courts.contains(&w.slot.resource) {
            courts.push(w.slot.resource);
        }
    }
    for (_, courts) in &mut plan {
        courts.sort_unstable();
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ulid::Ulid;

    fn t(label: &str) -> SlotTime {
        label.parse().unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn alert(name: &str, date: NaiveDate, start: &str, end: &str, courts: Vec<ResourceId>) -> Alert {
        Alert {
            id: Ulid::new(),
            name: name.into(),
            date,
            start_time: t(start),
            end_time: t(end),
            courts,
            active: true,
            created: Utc::now(),
        }
    }

    #[test]
    fn slot_times_are_45_minutes_apart() {
        for pair in SLOT_TIMES.windows(2) {
            let a = u32::from(pair[0].hour()) * 60 + u32::from(pair[0].minute());
            let b = u32::from(pair[1].hour()) * 60 + u32::from(pair[1].minute());
            assert_eq!(b - a, 45);
        }
        assert_eq!(SLOT_TIMES[0], t("0630"));
        assert_eq!(SLOT_TIMES[20], t("2130"));
    }

    #[test]
    fn window_is_inclusive() {
        assert_eq!(time_window(t("1830"), t("2000")), &[t("1830"), t("1915"), t("2000")]);
        assert_eq!(time_window(t("0630"), t("0630")), &[t("0630")]);
    }

    #[test]
    fn window_unknown_bound_is_empty() {
        assert!(time_window(t("1800"), t("2000")).is_empty());
        assert!(time_window(t("1830"), t("2100")).is_empty());
    }

    #[test]
    fn window_reversed_is_empty() {
        assert!(time_window(t("2000"), t("1830")).is_empty());
    }

    #[test]
    fn desired_slots_cross_product_in_order() {
        let a = alert("evening", day(2025, 3, 10), "1830", "1915", vec![1, 2]);
        let slots = desired_slots(&[a], None, day(2025, 3, 1));
        let got: Vec<_> = slots.iter().map(|w| (w.slot.time, w.slot.resource)).collect();
        assert_eq!(
            got,
            vec![(t("1830"), 1), (t("1830"), 2), (t("1915"), 1), (t("1915"), 2)]
        );
        assert!(slots.iter().all(|w| w.source == "evening"));
    }

    #[test]
    fn desired_slots_skip_inactive() {
        let mut a = alert("off", day(2025, 3, 10), "1830", "2000", vec![1]);
        a.active = false;
        assert!(desired_slots(&[a], None, day(2025, 3, 1)).is_empty());
    }

    #[test]
    fn standing_watch_spans_consecutive_days() {
        let watch = StandingWatch {
            times: vec![t("1830")],
            courts: vec![1],
            days: 3,
        };
        // 2025-03-08 is a Saturday; weekends are not skipped.
        let slots = desired_slots(&[], Some(&watch), day(2025, 3, 8));
        let dates: Vec<_> = slots.iter().map(|w| w.slot.date).collect();
        assert_eq!(dates, vec![day(2025, 3, 8), day(2025, 3, 9), day(2025, 3, 10)]);
        assert!(slots.iter().all(|w| w.source == STANDING_WATCH_NAME));
    }

    #[test]
    fn standing_watch_skips_non_slot_times() {
        let watch = StandingWatch {
            times: vec![t("1800"), t("1830")],
            courts: vec![1, 2],
            days: 2,
        };
        let slots = desired_slots(&[], Some(&watch), day(2025, 3, 10));
        assert_eq!(slots.len(), 4);
        assert!(slots.iter().all(|w| w.slot.time == t("1830")));
    }

    #[test]
    fn upcoming_dates_crosses_month_end() {
        let dates = upcoming_dates(day(2025, 2, 27), 3);
        assert_eq!(dates, vec![day(2025, 2, 27), day(2025, 2, 28), day(2025, 3, 1)]);
        assert!(upcoming_dates(day(2025, 2, 27), 0).is_empty());
    }

    #[test]
    fn fetch_plan_one_entry_per_date_first_seen_order() {
        let alerts = vec![
            alert("a", day(2025, 3, 11), "1830", "1830", vec![3, 1]),
            alert("b", day(2025, 3, 10), "1830", "1830", vec![2]),
            alert("c", day(2025, 3, 11), "1915", "1915", vec![1, 4]),
        ];
        let desired = desired_slots(&alerts, None, day(2025, 3, 1));
        let plan = fetch_plan(&desired);
        assert_eq!(
            plan,
            vec![(day(2025, 3, 11), vec![1, 3, 4]), (day(2025, 3, 10), vec![2])]
        );
    }
}
