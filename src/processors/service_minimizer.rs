use chrono::{Datelike, Duration, NaiveDate};
use gtfs_feed::{Feed, Service};
use rayon::prelude::*;
use std::collections::BTreeMap;

use super::Processor;

/// Finds, per service, the weekday bitmap and date range that need the
/// fewest exception rows to express the service's active-day set, by
/// exhaustive search over week-aligned ranges and all 127 bitmaps with a
/// counting lower bound as prune
pub struct ServiceMinimizer {}

impl Processor for ServiceMinimizer {
    fn run(&self, feed: &mut Feed) {
        print!("Minimizing services... ");
        let (cal_before, dates_before) = count_entries(feed);

        feed.services
            .par_iter_mut()
            .for_each(|(_, service)| perfect_minimize(service));

        let (cal_after, dates_after) = count_entries(feed);

        println!(
            "done. ({}{} calendar_dates.txt entries [{}{:.2}%], {}{} calendar.txt entries [{}{:.2}%])",
            sign(dates_before, dates_after),
            dates_after as i64 - dates_before as i64,
            sign(dates_before, dates_after),
            100.0 * (dates_after as f64 - dates_before as f64) / (dates_before as f64 + 0.001),
            sign(cal_before, cal_after),
            cal_after as i64 - cal_before as i64,
            sign(cal_before, cal_after),
            100.0 * (cal_after as f64 - cal_before as f64) / (cal_before as f64 + 0.001),
        );
    }
}

fn sign(before: usize, after: usize) -> &'static str {
    if after >= before {
        "+"
    } else {
        ""
    }
}

fn count_entries(feed: &Feed) -> (usize, usize) {
    let cals = feed.services.values().filter(|s| s.weekdays > 0).count();
    let dates = feed.services.values().map(|s| s.exceptions.len()).sum();
    (cals, dates)
}

fn has_bit(map: u32, pos: u32) -> bool {
    map & (1 << pos) != 0
}

fn weekday_of(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_monday()
}

/// Searches the (start, end, bitmap) encoding with the fewest exceptions
/// that preserves the active-day set exactly.
///
/// The search could well be NP-hard in general (it smells like set cover),
/// but the aligned-week iteration with the lower-bound prune is fast on
/// real calendars.
pub(crate) fn perfect_minimize(service: &mut Service) {
    if service.exceptions.is_empty() {
        // already minimal
        return;
    }

    let (Some(start), Some(end)) = (service.first_active_date(), service.last_active_date())
    else {
        // no active day at all; an empty bitmap without exceptions says
        // exactly that
        service.exceptions.clear();
        service.weekdays = 0;
        return;
    };

    // expand to full Monday-aligned weeks for the scan
    let start_am = start - Duration::days(weekday_of(start) as i64);
    let end_am = end + Duration::days(6 - weekday_of(end) as i64);

    let len = (end_am - start_am).num_days() as i64 + 1;
    let active: Vec<bool> = (0..len)
        .map(|d| service.is_active_on(start_am + Duration::days(d)))
        .collect();

    let start_idx = (start - start_am).num_days();
    let end_idx = (end - start_am).num_days();

    // per candidate bitmap, how many weekdays of the original bitmap it
    // misses; the lower bound below builds on this
    let mut days_not_matched = [0i64; 128];
    for (d, missed) in days_not_matched.iter_mut().enumerate() {
        for i in 0..7u32 {
            if service.weekday(i as u8) && !has_bit(d as u32, i) {
                *missed += 1;
            }
        }
    }

    let n_exceptions = service.exceptions.len() as i64;

    let mut best_exceptions = u64::MAX;
    let mut best_map = 0u32;
    let mut best_a = 0i64;
    let mut best_b = 0i64;

    'outer: for a in (0..len).step_by(7) {
        let mut b = len - 1;
        while b > a {
            let full_weeks = ((b - a) - 7) / 7;
            for map in 1u32..128 {
                let min_exc = full_weeks * days_not_matched[map as usize] - n_exceptions;
                if min_exc > -1 && min_exc as u64 > best_exceptions {
                    continue;
                }

                let c = count_exceptions(&active, map, start_idx, end_idx, a, b, best_exceptions);
                if c < best_exceptions {
                    best_exceptions = c;
                    best_map = map;
                    best_a = a;
                    best_b = b;

                    if c == 0 {
                        break 'outer;
                    }
                }
            }
            if b < 7 + a + 1 {
                break;
            }
            b -= 7;
        }
    }

    update_service(service, best_map, best_a, best_b, start_am, start, end);
}

/// Exceptions needed when encoding the activity as bitmap `map` over the
/// index range [a, b]; gives up at `max`
fn count_exceptions(
    active: &[bool],
    map: u32,
    start_idx: i64,
    end_idx: i64,
    a: i64,
    b: i64,
    max: u64,
) -> u64 {
    let mut ret = 0u64;
    let upper = (active.len() as i64).min(end_idx + 1);

    for d in start_idx..upper {
        if ret >= max {
            return max;
        }

        if d < a || d > b {
            // outside the bitmap span every active day costs one exception
            if active[d as usize] {
                ret += 1;
            }
        } else if has_bit(map, (d % 7) as u32) {
            if !active[d as usize] {
                ret += 1;
            }
        } else if active[d as usize] {
            ret += 1;
        }
    }

    ret
}

fn update_service(
    service: &mut Service,
    map: u32,
    a: i64,
    b: i64,
    start_am: NaiveDate,
    start: NaiveDate,
    end: NaiveDate,
) {
    let mut new_begin = start_am + Duration::days(a);
    let mut new_end = start_am + Duration::days(b);
    let mut map = map;

    // crop the range to actual active days
    while new_end > new_begin && !service.is_active_on(new_begin) {
        new_begin += Duration::days(1);
    }
    while new_begin < new_end && !service.is_active_on(new_end) {
        new_end -= Duration::days(1);
    }

    if new_begin == new_end {
        // a one-day calendar row is worse than a plain exception
        map = 0;
    }

    let mut new_exceptions: BTreeMap<NaiveDate, bool> = BTreeMap::new();
    let mut d = start;
    while d <= end {
        let active = service.is_active_on(d);
        if d < new_begin || d > new_end {
            if active {
                new_exceptions.insert(d, true);
            }
        } else if has_bit(map, weekday_of(d)) {
            if !active {
                new_exceptions.insert(d, false);
            }
        } else if active {
            new_exceptions.insert(d, true);
        }
        d += Duration::days(1);
    }

    service.exceptions = new_exceptions;
    service.start_date = Some(new_begin);
    service.end_date = Some(new_end);
    service.weekdays = map as u8 & 0x7f;
}

#[cfg(test)]
mod tests {
    use super::super::testutil::date;
    use super::*;

    fn active_set(s: &Service) -> Vec<NaiveDate> {
        s.active_dates()
    }

    #[test]
    fn redundant_added_exceptions_disappear() {
        let mut s = Service::new("a".to_string());
        s.weekdays = 0b1111111;
        s.start_date = Some(date(2017, 1, 1));
        s.end_date = Some(date(2017, 2, 1));
        s.exceptions.insert(date(2017, 1, 1), true);
        s.exceptions.insert(date(2017, 1, 2), true);

        let before = active_set(&s);
        perfect_minimize(&mut s);
        assert!(s.exceptions.is_empty());
        assert_eq!(active_set(&s), before);
    }

    #[test]
    fn pure_exception_weeks_become_one_calendar_row() {
        // only calendar_dates entries for a consecutive run of days
        let mut s = Service::new("a".to_string());
        s.start_date = Some(date(2013, 1, 2));
        s.end_date = Some(date(2017, 1, 8));
        for day in 2..=7 {
            s.exceptions.insert(date(2017, 1, day), true);
        }

        let before = active_set(&s);
        perfect_minimize(&mut s);

        assert!(s.exceptions.is_empty());
        assert_eq!(s.start_date, Some(date(2017, 1, 2)));
        assert_eq!(s.end_date, Some(date(2017, 1, 7)));
        assert_eq!(active_set(&s), before);
    }

    #[test]
    fn weekday_pattern_with_stray_extras_keeps_minimal_exceptions() {
        // Mon, Tue, Thu over four weeks, plus four stray extra days; the
        // first two extras extend the range, the other two stay exceptions
        let mut s = Service::new("a".to_string());
        s.set_weekday(0, true);
        s.set_weekday(1, true);
        s.set_weekday(3, true);
        s.start_date = Some(date(2017, 1, 2));
        s.end_date = Some(date(2017, 1, 29));
        s.exceptions.insert(date(2017, 1, 30), true);
        s.exceptions.insert(date(2017, 1, 31), true);
        s.exceptions.insert(date(2017, 2, 7), true);
        s.exceptions.insert(date(2017, 2, 14), true);

        let before = active_set(&s);
        perfect_minimize(&mut s);

        assert_eq!(s.start_date, Some(date(2017, 1, 2)));
        assert_eq!(s.end_date, Some(date(2017, 1, 31)));
        assert_eq!(s.exceptions.len(), 2);
        assert_eq!(active_set(&s), before);
    }

    #[test]
    fn removed_exception_on_full_week_service_is_reencoded() {
        let mut s = Service::new("a".to_string());
        s.weekdays = 0b1111111;
        s.start_date = Some(date(2017, 1, 2));
        s.end_date = Some(date(2017, 1, 8));
        s.exceptions.insert(date(2017, 1, 3), false);

        let before = active_set(&s);
        perfect_minimize(&mut s);

        assert!(s.exceptions.is_empty());
        assert_eq!(active_set(&s), before);
        // the Tuesday bit is simply dropped from the map instead
        assert!(!s.weekday(1));
    }

    #[test]
    fn week_of_exceptions_with_one_hole() {
        // the distilled scenario: only calendar_dates entries for
        // 2016-08-14..20 except the 15th
        let mut s = Service::new("FULLW".to_string());
        for day in [14u32, 16, 17, 18, 19, 20] {
            s.exceptions.insert(date(2016, 8, day), true);
        }

        let before = active_set(&s);
        perfect_minimize(&mut s);

        assert!(s.exceptions.is_empty());
        assert_eq!(s.start_date, Some(date(2016, 8, 14)));
        assert_eq!(s.end_date, Some(date(2016, 8, 20)));
        // Monday off, everything else on
        assert!(!s.weekday(0));
        for i in 1..7 {
            assert!(s.weekday(i));
        }
        assert_eq!(active_set(&s), before);
    }

    #[test]
    fn single_day_services_become_pure_exceptions() {
        let mut s = Service::new("one".to_string());
        s.weekdays = 0b1111111;
        s.start_date = Some(date(2017, 5, 1));
        s.end_date = Some(date(2017, 5, 1));
        s.exceptions.insert(date(2017, 5, 2), false);

        perfect_minimize(&mut s);
        assert_eq!(s.weekdays, 0);
        assert_eq!(s.active_dates(), vec![date(2017, 5, 1)]);
        assert_eq!(s.exceptions.len(), 1);
    }

    #[test]
    fn minimizing_twice_changes_nothing_more() {
        let mut s = Service::new("a".to_string());
        s.set_weekday(0, true);
        s.set_weekday(3, true);
        s.start_date = Some(date(2017, 3, 6));
        s.end_date = Some(date(2017, 4, 27));
        s.exceptions.insert(date(2017, 3, 13), false);
        s.exceptions.insert(date(2017, 3, 18), true);

        perfect_minimize(&mut s);
        let (w, sd, ed, exc) = (s.weekdays, s.start_date, s.end_date, s.exceptions.clone());
        // idempotence needs another exception to trigger the search again
        if !s.exceptions.is_empty() {
            perfect_minimize(&mut s);
            assert_eq!((s.weekdays, s.start_date, s.end_date, &s.exceptions), (w, sd, ed, &exc));
        }
    }
}
