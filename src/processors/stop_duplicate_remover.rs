use gtfs_feed::{extra_fields_equal, Feed, LocationType, Stop, Transfer, TransferKey};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use std::hash::{Hash, Hasher};

use crate::geo;

use super::{pct, prefer_reference_id, Processor};

/// Merges stops that match in every non-positional attribute and lie
/// within a distance threshold of each other. Levels are deduplicated
/// first. Three passes, because merging a parent station can make its
/// children equal only afterwards
pub struct StopDuplicateRemover {
    /// Meters two stops may lie apart and still merge
    pub stop_threshold: f64,
    /// Meters two stations may lie apart and still merge
    pub station_threshold: f64,
    /// Relax code/name/platform/url/level matching for stops that share
    /// the same parent and are very close
    pub fuzzy: bool,
}

impl Default for StopDuplicateRemover {
    fn default() -> Self {
        StopDuplicateRemover {
            stop_threshold: 2.0,
            station_threshold: 50.0,
            fuzzy: false,
        }
    }
}

impl StopDuplicateRemover {
    pub fn fuzzy() -> Self {
        StopDuplicateRemover {
            stop_threshold: 5.0,
            station_threshold: 50.0,
            fuzzy: true,
        }
    }
}

const PASSES: usize = 3;

impl Processor for StopDuplicateRemover {
    fn run(&self, feed: &mut Feed) {
        print!("Removing redundant stops... ");
        let before = feed.stops.len();

        self.remove_level_duplicates(feed);

        for _ in 0..PASSES {
            let mut buckets: FxHashMap<u64, Vec<String>> = FxHashMap::default();
            for stop in feed.stops.values() {
                buckets
                    .entry(self.stop_hash(stop))
                    .or_default()
                    .push(stop.id.clone());
            }

            let mut processed: FxHashSet<String> = FxHashSet::default();
            // merges of this pass, applied in one sweep at the end
            let mut replace: FxHashMap<String, String> = FxHashMap::default();

            let stop_ids: Vec<String> = feed.stops.keys().cloned().collect();
            for id in &stop_ids {
                if processed.contains(id) {
                    continue;
                }
                let stop = &feed.stops[id];
                let bucket = &buckets[&self.stop_hash(stop)];

                let mut eq: Vec<String> = bucket
                    .par_iter()
                    .filter(|other| {
                        *other != id
                            && !processed.contains(*other)
                            && self.stops_equal(feed, stop, &feed.stops[*other])
                    })
                    .cloned()
                    .collect();

                if eq.is_empty() {
                    continue;
                }
                eq.push(id.clone());

                let mut ref_id = eq[0].as_str();
                for e in &eq {
                    ref_id = prefer_reference_id(ref_id, e);
                }
                let ref_id = ref_id.to_string();

                for e in &eq {
                    processed.insert(e.clone());
                    if *e != ref_id {
                        replace.insert(e.clone(), ref_id.clone());
                    }
                }
            }

            if replace.is_empty() {
                break;
            }
            apply_stop_merges(feed, &replace);
        }

        println!(
            "done. (-{} stops [-{:.2}%])",
            before - feed.stops.len(),
            pct(before, feed.stops.len())
        );
    }
}

impl StopDuplicateRemover {
    fn remove_level_duplicates(&self, feed: &mut Feed) {
        let mut processed: FxHashSet<String> = FxHashSet::default();
        let mut replace: FxHashMap<String, String> = FxHashMap::default();

        let level_ids: Vec<String> = feed.levels.keys().cloned().collect();
        for id in &level_ids {
            if processed.contains(id) {
                continue;
            }
            let level = &feed.levels[id];

            let mut eq: Vec<String> = feed
                .levels
                .values()
                .filter(|other| {
                    other.id != *id
                        && !processed.contains(&other.id)
                        && other.index == level.index
                        && other.name == level.name
                        && (self.fuzzy
                            || extra_fields_equal(&feed.extra.levels, id, &other.id))
                })
                .map(|l| l.id.clone())
                .collect();

            if eq.is_empty() {
                continue;
            }
            eq.push(id.clone());

            let ref_id = eq.iter().min_by_key(|l| (l.len(), l.as_str())).unwrap().clone();
            for e in eq {
                processed.insert(e.clone());
                if e != ref_id {
                    replace.insert(e, ref_id.clone());
                }
            }
        }

        for stop in feed.stops.values_mut() {
            if let Some(level) = &stop.level_id {
                if let Some(new) = replace.get(level) {
                    stop.level_id = Some(new.clone());
                }
            }
        }
        for old in replace.keys() {
            feed.levels.remove(old);
        }
    }

    fn stop_hash(&self, s: &Stop) -> u64 {
        let mut h = FxHasher::default();
        s.parent_station.hash(&mut h);
        if !self.fuzzy {
            s.level_id.hash(&mut h);
            s.code.hash(&mut h);
            s.name.hash(&mut h);
            s.platform_code.hash(&mut h);
        }
        s.location_type.value().hash(&mut h);
        s.wheelchair_boarding.value().hash(&mut h);
        s.description.hash(&mut h);
        s.zone_id.hash(&mut h);
        s.timezone.hash(&mut h);
        h.finish()
    }

    fn stops_equal(&self, feed: &Feed, a: &Stop, b: &Stop) -> bool {
        let d = stop_dist(a, b);
        let parents_equal = a.parent_station.is_some() && a.parent_station == b.parent_station;

        if self.fuzzy {
            let near_siblings = d <= self.stop_threshold / 2.0 && parents_equal;
            return (near_siblings
                || a.code == b.code
                || a.code.as_deref().map_or(true, str::is_empty)
                || b.code.as_deref().map_or(true, str::is_empty))
                && (near_siblings || a.name == b.name)
                && a.description == b.description
                && a.zone_id == b.zone_id
                && (a.url == b.url || a.url.is_none() || b.url.is_none())
                && a.location_type == b.location_type
                && a.parent_station == b.parent_station
                && a.timezone == b.timezone
                && a.wheelchair_boarding == b.wheelchair_boarding
                && (a.level_id == b.level_id || a.level_id.is_none() || b.level_id.is_none())
                && ((near_siblings
                    && (a.platform_code.as_deref().map_or(true, str::is_empty)
                        || b.platform_code.as_deref().map_or(true, str::is_empty)))
                    || a.platform_code == b.platform_code)
                && (d <= self.stop_threshold
                    || (a.location_type == LocationType::Station && d <= self.station_threshold));
        }

        extra_fields_equal(&feed.extra.stops, &a.id, &b.id)
            && a.code == b.code
            && a.name == b.name
            && a.description == b.description
            && a.zone_id == b.zone_id
            && a.url == b.url
            && a.location_type == b.location_type
            && a.parent_station == b.parent_station
            && a.timezone == b.timezone
            && a.wheelchair_boarding == b.wheelchair_boarding
            && a.level_id == b.level_id
            && a.platform_code == b.platform_code
            && (d <= self.stop_threshold
                || (a.location_type == LocationType::Station && d <= self.station_threshold))
    }
}

/// Approximate ground distance between two stops; unknown coordinates never
/// merge by distance
fn stop_dist(a: &Stop, b: &Stop) -> f64 {
    match (a.latitude, a.longitude, b.latitude, b.longitude) {
        (Some(alat), Some(alon), Some(blat), Some(blon)) => {
            geo::haversine_approx(alat, alon, blat, blon)
        }
        _ => f64::INFINITY,
    }
}

/// Rewrites every stop reference according to `replace` and drops the
/// merged stops. A rewritten transfer key that collides with an existing
/// one keeps the existing value
fn apply_stop_merges(feed: &mut Feed, replace: &FxHashMap<String, String>) {
    for trip in feed.trips.values_mut() {
        for st in &mut trip.stop_times {
            if let Some(new) = replace.get(&st.stop_id) {
                st.stop_id = new.clone();
            }
        }
    }

    for stop in feed.stops.values_mut() {
        if let Some(parent) = &stop.parent_station {
            if let Some(new) = replace.get(parent) {
                stop.parent_station = Some(new.clone());
            }
        }
    }

    let transfers = std::mem::take(&mut feed.transfers);
    let mut rewritten: std::collections::HashMap<TransferKey, Transfer> =
        std::collections::HashMap::default();
    for (mut key, value) in transfers {
        if let Some(new) = replace.get(&key.from_stop_id) {
            key.from_stop_id = new.clone();
        }
        if let Some(new) = replace.get(&key.to_stop_id) {
            key.to_stop_id = new.clone();
        }
        rewritten.entry(key).or_insert(value);
    }
    feed.transfers = rewritten;

    for pathway in feed.pathways.values_mut() {
        if let Some(new) = replace.get(&pathway.from_stop_id) {
            pathway.from_stop_id = new.clone();
        }
        if let Some(new) = replace.get(&pathway.to_stop_id) {
            pathway.to_stop_id = new.clone();
        }
    }

    for old in replace.keys() {
        feed.stops.remove(old);
    }
}
