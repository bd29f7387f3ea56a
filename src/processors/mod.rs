//! The transformation pipeline: every processor mutates the [Feed] in place
//! while keeping the passenger-observable schedule unchanged.

use gtfs_feed::Feed;

mod agency_duplicate_remover;
#[cfg(test)]
mod scenarios;
mod frequency_minimizer;
mod id_minimizer;
mod orphan_remover;
mod route_duplicate_remover;
mod service_duplicate_remover;
mod service_minimizer;
mod shape_duplicate_remover;
mod shape_minimizer;
mod shape_remeasurer;
mod stop_duplicate_remover;
mod stop_reclusterer;
mod stop_time_remeasurer;
mod trip_duplicate_remover;

pub use agency_duplicate_remover::AgencyDuplicateRemover;
pub use frequency_minimizer::FrequencyMinimizer;
pub use id_minimizer::{IdMinimizer, KeepIds};
pub use orphan_remover::OrphanRemover;
pub use route_duplicate_remover::RouteDuplicateRemover;
pub use service_duplicate_remover::ServiceDuplicateRemover;
pub use service_minimizer::ServiceMinimizer;
pub use shape_duplicate_remover::ShapeDuplicateRemover;
pub use shape_minimizer::ShapeMinimizer;
pub use shape_remeasurer::ShapeRemeasurer;
pub use stop_duplicate_remover::StopDuplicateRemover;
pub use stop_reclusterer::StopReclusterer;
pub use stop_time_remeasurer::StopTimeRemeasurer;
pub use trip_duplicate_remover::TripDuplicateRemover;

/// A processor modifies an existing feed in place
pub trait Processor {
    fn run(&self, feed: &mut Feed);
}

/// Relative shrink in percent; guarded against empty tables
pub(crate) fn pct(before: usize, after: usize) -> f64 {
    100.0 * (before as f64 - after as f64) / (before as f64 + 0.001)
}

/// True if the difference of two floats is smaller than epsilon
pub(crate) fn float_eq(a: f32, b: f32, e: f32) -> bool {
    (a - b) < e && (b - a) < e
}

pub(crate) fn num_colons(s: &str) -> usize {
    s.chars().filter(|&c| c == ':').count()
}

/// Reference-id heuristic shared by the dedupers: prefer ids with the most
/// colons (structured ids like `de:54564:345:3` carry more information than
/// `5542`), then the shorter id, then the lexicographically smaller one
pub(crate) fn prefer_reference_id<'a>(a: &'a str, b: &'a str) -> &'a str {
    let (ca, cb) = (num_colons(a), num_colons(b));
    if cb > ca
        || (cb == ca && b.len() < a.len())
        || (cb == ca && b.len() == a.len() && b < a)
    {
        b
    } else {
        a
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use chrono::NaiveDate;
    use gtfs_feed::*;

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub fn stop(id: &str, lat: f64, lon: f64) -> Stop {
        Stop {
            id: id.to_string(),
            name: format!("Stop {}", id),
            latitude: Some(lat),
            longitude: Some(lon),
            ..Default::default()
        }
    }

    pub fn station(id: &str, lat: f64, lon: f64) -> Stop {
        Stop {
            location_type: LocationType::Station,
            ..stop(id, lat, lon)
        }
    }

    pub fn route(id: &str) -> Route {
        Route {
            id: id.to_string(),
            short_name: "10".to_string(),
            route_type: 3,
            ..Default::default()
        }
    }

    pub fn daily_service(id: &str, from: NaiveDate, to: NaiveDate) -> Service {
        let mut s = Service::new(id.to_string());
        s.weekdays = 0b1111111;
        s.start_date = Some(from);
        s.end_date = Some(to);
        s
    }

    pub fn stop_time(stop_id: &str, seq: u32, arr: u32, dep: u32) -> StopTime {
        StopTime {
            stop_id: stop_id.to_string(),
            sequence: seq,
            arrival_time: Some(arr),
            departure_time: Some(dep),
            ..Default::default()
        }
    }

    pub fn trip(id: &str, route_id: &str, service_id: &str, stop_times: Vec<StopTime>) -> Trip {
        Trip {
            id: id.to_string(),
            route_id: route_id.to_string(),
            service_id: service_id.to_string(),
            stop_times,
            ..Default::default()
        }
    }
}
