use chrono::{Datelike, NaiveDate};
use gtfs_feed::{Feed, Service};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use std::hash::{Hash, Hasher};

use super::{pct, Processor};

/// Merges services that are active on exactly the same set of calendar
/// dates, regardless of how range, bitmap and exceptions encode that set
pub struct ServiceDuplicateRemover {}

/// A service reduced to its activity: first and last active date plus the
/// day-by-day activity between them
struct CompressedService {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    active: Vec<bool>,
    hash: u64,
}

impl Processor for ServiceDuplicateRemover {
    fn run(&self, feed: &mut Feed) {
        print!("Removing service duplicates... ");
        let before = feed.services.len();

        let mut trips_by_service: FxHashMap<String, Vec<String>> = FxHashMap::default();
        for (id, trip) in &feed.trips {
            trips_by_service
                .entry(trip.service_id.clone())
                .or_default()
                .push(id.clone());
        }

        let compressed: FxHashMap<String, CompressedService> = feed
            .services
            .par_iter()
            .map(|(id, s)| (id.clone(), compress(s)))
            .collect();

        let mut buckets: FxHashMap<u64, Vec<String>> = FxHashMap::default();
        for (id, c) in &compressed {
            buckets.entry(c.hash).or_default().push(id.clone());
        }

        let mut processed: FxHashSet<String> = FxHashSet::default();
        let service_ids: Vec<String> = feed.services.keys().cloned().collect();

        for id in &service_ids {
            if processed.contains(id) {
                continue;
            }
            let c = &compressed[id];

            let mut eq: Vec<String> = buckets[&c.hash]
                .par_iter()
                .filter(|other| {
                    *other != id && !processed.contains(*other) && services_equal(c, &compressed[*other])
                })
                .cloned()
                .collect();

            if eq.is_empty() {
                continue;
            }
            eq.push(id.clone());
            for e in &eq {
                processed.insert(e.clone());
            }
            combine_services(feed, eq, &mut trips_by_service);
        }

        println!(
            "done. (-{} services [-{:.2}%])",
            before - feed.services.len(),
            pct(before, feed.services.len())
        );
    }
}

fn compress(service: &Service) -> CompressedService {
    let start = service.first_active_date();
    let end = service.last_active_date();

    let active = match (start, end) {
        (Some(start), Some(end)) => {
            let days = (end - start).num_days() as usize + 1;
            (0..days)
                .map(|d| service.is_active_on(start + chrono::Duration::days(d as i64)))
                .collect()
        }
        _ => Vec::new(),
    };

    let mut h = FxHasher::default();
    active.hash(&mut h);
    start.map(|d| (d.year(), d.month(), d.day())).hash(&mut h);
    end.map(|d| (d.year(), d.month(), d.day())).hash(&mut h);

    CompressedService {
        start,
        end,
        active,
        hash: h.finish(),
    }
}

fn services_equal(a: &CompressedService, b: &CompressedService) -> bool {
    a.start == b.start && a.end == b.end && a.active == b.active
}

fn combine_services(
    feed: &mut Feed,
    services: Vec<String>,
    trips_by_service: &mut FxHashMap<String, Vec<String>>,
) {
    // the simplest representation, fewest exceptions, becomes the reference
    let ref_id = services
        .iter()
        .min_by_key(|id| feed.services[id.as_str()].exceptions.len())
        .unwrap()
        .clone();

    for id in &services {
        if *id == ref_id {
            continue;
        }

        for trip_id in trips_by_service.remove(id).unwrap_or_default() {
            if let Some(trip) = feed.trips.get_mut(&trip_id) {
                if trip.service_id == *id {
                    trip.service_id = ref_id.clone();
                }
                trips_by_service
                    .entry(ref_id.clone())
                    .or_default()
                    .push(trip_id);
            }
        }

        feed.services.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;

    #[test]
    fn range_and_exception_encodings_of_the_same_days_merge() {
        let mut feed = Feed::new();

        // Mon-Sun for one week as a calendar range
        let a = daily_service("a", date(2017, 1, 2), date(2017, 1, 8));
        feed.services.insert("a".into(), a);

        // the same week written as seven added exceptions
        let mut b = Service::new("b".to_string());
        for day in 2..=8 {
            b.exceptions.insert(date(2017, 1, day), true);
        }
        feed.services.insert("b".into(), b);

        // a different week
        let c = daily_service("c", date(2017, 1, 9), date(2017, 1, 15));
        feed.services.insert("c".into(), c);

        feed.stops.insert("S".into(), stop("S", 1.0, 1.0));
        feed.routes.insert("R".into(), route("R"));
        for (t, sv) in [("t1", "a"), ("t2", "b"), ("t3", "c")] {
            feed.trips
                .insert(t.into(), trip(t, "R", sv, vec![stop_time("S", 0, 0, 0)]));
        }

        ServiceDuplicateRemover {}.run(&mut feed);

        assert_eq!(feed.services.len(), 2);
        // the calendar-range representation has no exceptions and wins
        assert!(feed.services.contains_key("a"));
        assert!(!feed.services.contains_key("b"));
        assert_eq!(feed.trips["t2"].service_id, "a");
        assert_eq!(feed.trips["t3"].service_id, "c");
        feed.check_references().unwrap();
    }

    #[test]
    fn activity_equivalence_holds_over_the_joint_range() {
        let mut feed = Feed::new();
        let a = daily_service("a", date(2017, 1, 2), date(2017, 1, 8));
        let mut b = Service::new("b".to_string());
        for day in 2..=8 {
            b.exceptions.insert(date(2017, 1, day), true);
        }
        let a_clone = a.clone();
        let b_clone = b.clone();
        feed.services.insert("a".into(), a);
        feed.services.insert("b".into(), b);

        ServiceDuplicateRemover {}.run(&mut feed);
        let survivor = feed.services.values().next().unwrap();

        let mut d = date(2016, 12, 25);
        while d <= date(2017, 1, 15) {
            assert_eq!(survivor.is_active_on(d), a_clone.is_active_on(d));
            assert_eq!(survivor.is_active_on(d), b_clone.is_active_on(d));
            d += chrono::Duration::days(1);
        }
    }
}
