use gtfs_feed::{Feed, Frequency, Trip};
use rustc_hash::{FxHashMap, FxHashSet};

use super::{float_eq, Processor};

/// Rewrites arithmetic progressions of departures among equivalent trips
/// into one template trip plus `frequencies.txt` rows, a variant of the
/// cover-by-arithmetic-progression approximation of Bast and Storandt
/// (SIGSPATIAL 2014)
pub struct FrequencyMinimizer {
    /// Smallest headway considered, in seconds
    pub min_headway: u32,
    /// Largest headway considered, in seconds
    pub max_headway: u32,
}

impl Default for FrequencyMinimizer {
    fn default() -> Self {
        FrequencyMinimizer {
            min_headway: 60,
            max_headway: 3600,
        }
    }
}

/// One departure of an equivalence class: a trip, its start time, and the
/// frequency row it was expanded from, if any
#[derive(Clone)]
struct Departure {
    trip_id: String,
    start: u32,
    source_freq: Option<Frequency>,
}

/// Indices into the departure list forming one arithmetic progression
#[derive(Clone)]
struct Progression {
    matches: Vec<usize>,
    headway: u32,
}

impl Processor for FrequencyMinimizer {
    fn run(&self, feed: &mut Feed) {
        print!("Minimizing frequencies / stop times... ");

        let trips_before = feed.trips.len();
        let freqs_before: usize = feed.trips.values().map(|t| t.frequencies.len()).sum();

        let mut groups: FxHashMap<(String, String), Vec<String>> = FxHashMap::default();
        for (id, trip) in &feed.trips {
            groups
                .entry((trip.route_id.clone(), trip.service_id.clone()))
                .or_default()
                .push(id.clone());
        }

        let mut processed: FxHashSet<String> = FxHashSet::default();
        let trip_ids: Vec<String> = feed.trips.keys().cloned().collect();

        for trip_id in &trip_ids {
            if processed.contains(trip_id) || !feed.trips.contains_key(trip_id) {
                continue;
            }
            let trip = &feed.trips[trip_id];
            if trip.stop_times.is_empty() {
                continue;
            }

            let group = &groups[&(trip.route_id.clone(), trip.service_id.clone())];
            let mut departures = self.expand_equivalent(feed, trip_id, group);
            for d in &departures {
                processed.insert(d.trip_id.clone());
            }

            let covered: FxHashSet<String> =
                departures.iter().map(|d| d.trip_id.clone()).collect();
            if covered.len() < 2 {
                continue;
            }

            departures.sort_by_key(|d| d.start);

            let plain = self.cover(&departures, false);
            let packed_plain = pack(&departures, plain);
            let overlapping = self.cover(&departures, true);
            let packed_overlapping = pack(&departures, overlapping);

            let packed = if packed_plain.len() > packed_overlapping.len() {
                packed_overlapping
            } else {
                packed_plain
            };

            if packed.len() >= covered.len() {
                // rewriting would not save any trips
                continue;
            }

            self.emit(feed, trip_id, &departures, packed, &mut processed);
        }

        feed.clean_transfers();

        let freqs_after: usize = feed.trips.values().map(|t| t.frequencies.len()).sum();
        println!(
            "done. ({}{} frequencies, {}{} trips [{}{:.2}%])",
            if freqs_after >= freqs_before { "+" } else { "" },
            freqs_after as i64 - freqs_before as i64,
            if feed.trips.len() >= trips_before { "+" } else { "" },
            feed.trips.len() as i64 - trips_before as i64,
            if feed.trips.len() >= trips_before { "+" } else { "" },
            100.0 * (feed.trips.len() as f64 - trips_before as f64) / (trips_before as f64 + 0.001),
        );
    }
}

impl FrequencyMinimizer {
    /// Departures of all trips in the group equivalent to `trip_id` modulo
    /// absolute time; trips with existing frequencies are expanded into
    /// their synthetic departures
    fn expand_equivalent(&self, feed: &Feed, trip_id: &str, group: &[String]) -> Vec<Departure> {
        let trip = &feed.trips[trip_id];
        let mut ret = Vec::new();

        for other_id in group {
            let other = &feed.trips[other_id];
            if other_id != trip_id && !time_independent_equal(feed, trip, other) {
                continue;
            }

            if other.frequencies.is_empty() {
                if let Some(start) = other.stop_times[0].arrival_time {
                    ret.push(Departure {
                        trip_id: other_id.clone(),
                        start,
                        source_freq: None,
                    });
                }
            } else {
                for f in &other.frequencies {
                    let mut s = f.start_time;
                    while s < f.end_time {
                        ret.push(Departure {
                            trip_id: other_id.clone(),
                            start: s,
                            source_freq: Some(f.clone()),
                        });
                        s += f.headway_secs;
                    }
                }
            }
        }
        ret
    }

    /// Headways that actually occur as pairwise start-time gaps within the
    /// configured bounds
    fn possible_headways(&self, departures: &[Departure]) -> Vec<u32> {
        let mut set: FxHashSet<u32> = FxHashSet::default();
        for (i, a) in departures.iter().enumerate() {
            for b in &departures[i + 1..] {
                let gap = b.start.abs_diff(a.start);
                if gap != 0 && gap >= self.min_headway && gap <= self.max_headway {
                    set.insert(gap);
                }
            }
        }
        let mut ret: Vec<u32> = set.into_iter().collect();
        ret.sort_unstable();
        ret
    }

    /// Greedy cover: repeatedly take the first unmarked departure and the
    /// headway yielding the longest progression of unmarked matches. The
    /// overlapping variant may step over marked departures, the plain one
    /// must stay consecutive
    fn cover(&self, departures: &[Departure], overlapping: bool) -> Vec<Progression> {
        let headways = self.possible_headways(departures);
        let mut marked = vec![false; departures.len()];
        let mut ret: Vec<Progression> = Vec::new();

        const MINIMUM_COVER: usize = 2;

        let mut has_unmarked = true;
        while has_unmarked {
            let mut min_size = departures.len();
            while min_size > 0 {
                let Some(i) = marked.iter().position(|&m| !m) else {
                    has_unmarked = false;
                    break;
                };

                let start = departures[i].start;
                let mut best = Progression {
                    matches: vec![i],
                    headway: 0,
                };

                for &headway in &headways {
                    let mut cand = Progression {
                        matches: vec![i],
                        headway: 0,
                    };

                    for j in i + 1..departures.len() {
                        if marked[j] {
                            if overlapping {
                                continue;
                            }
                            break;
                        }

                        if freq_compatible(&departures[i], &departures[j])
                            && departures[j].start
                                == start + cand.matches.len() as u32 * headway
                        {
                            cand.matches.push(j);
                            cand.headway = headway;
                        } else if !overlapping {
                            break;
                        }
                    }

                    if cand.matches.len() > best.matches.len()
                        && (cand.matches.len() >= MINIMUM_COVER || cand.matches.len() == 1)
                    {
                        best = cand;
                    }
                }

                if best.matches.len() >= min_size {
                    for &m in &best.matches {
                        marked[m] = true;
                    }
                    ret.push(best);
                }
                min_size -= 1;
            }
        }
        ret
    }

    /// Materializes the packs: the first one reuses the original trip id,
    /// later ones get `<origId>_<n>` ids; each pack carries its frequency
    /// rows and its stop times shifted to the pack's earliest start
    fn emit(
        &self,
        feed: &mut Feed,
        orig_id: &str,
        departures: &[Departure],
        packs: Vec<Vec<Progression>>,
        processed: &mut FxHashSet<String>,
    ) {
        let template = feed.trips[orig_id].clone();
        let mut suffix = 1usize;

        for pack in packs {
            let cur_id = if suffix == 1 {
                orig_id.to_string()
            } else {
                let mut new_id;
                loop {
                    new_id = format!("{}_{}", orig_id, suffix);
                    if feed.trips.contains_key(&new_id) {
                        suffix += 1;
                    } else {
                        break;
                    }
                }

                let mut copy = template.clone();
                copy.id = new_id.clone();
                copy.frequencies.clear();
                for attr in &mut copy.attributions {
                    attr.trip_id = Some(new_id.clone());
                }

                for col in feed.extra.trips.values_mut() {
                    if let Some(v) = col.get(orig_id).cloned() {
                        col.insert(new_id.clone(), v);
                    }
                }
                let seqs: Vec<u32> = copy.stop_times.iter().map(|st| st.sequence).collect();
                for col in feed.extra.stop_times.values_mut() {
                    for &seq in &seqs {
                        if let Some(v) = col.get(&(orig_id.to_string(), seq)).cloned() {
                            col.insert((new_id.clone(), seq), v);
                        }
                    }
                }

                processed.insert(new_id.clone());
                feed.trips.insert(new_id.clone(), copy);
                new_id
            };
            suffix += 1;

            let mut smallest_start = departures[pack[0].matches[0]].start;
            let mut freqs: Vec<Frequency> = Vec::new();

            for progression in &pack {
                if progression.matches.len() == 1 {
                    // single matches only ever occur in single-progression
                    // packs and stay plain trips
                    continue;
                }
                let first = &departures[progression.matches[0]];
                let last = &departures[progression.matches[progression.matches.len() - 1]];
                smallest_start = smallest_start.min(first.start);

                freqs.push(Frequency {
                    start_time: first.start,
                    end_time: last.start + progression.headway,
                    headway_secs: progression.headway,
                    exact_times: first.source_freq.as_ref().map_or(true, |f| f.exact_times),
                });
            }

            let cur = feed.trips.get_mut(&cur_id).expect("pack trip exists");
            cur.frequencies = freqs;
            shift_stop_times(cur, smallest_start);
        }

        // the remaining members of the class are now covered by the packs
        let doomed: FxHashSet<&str> = departures
            .iter()
            .map(|d| d.trip_id.as_str())
            .filter(|id| *id != orig_id)
            .collect();
        for id in doomed {
            feed.trips.remove(id);
        }
    }
}

/// Packs non-overlapping progressions together time-wise; each pack becomes
/// one trip. Single-match progressions stay single trips
fn pack(departures: &[Departure], progressions: Vec<Progression>) -> Vec<Vec<Progression>> {
    let mut packs: Vec<Vec<Progression>> = vec![Vec::new()];
    let mut singles: Vec<Vec<Progression>> = Vec::new();

    let span = |p: &Progression| {
        (
            departures[p.matches[0]].start,
            departures[p.matches[p.matches.len() - 1]].start,
        )
    };

    for progression in progressions {
        if progression.matches.len() == 1 {
            singles.push(vec![progression]);
            continue;
        }

        let (start, end) = span(&progression);
        let mut inserted = false;
        for existing in packs.iter_mut() {
            let overlaps = existing.iter().any(|other| {
                let (other_start, other_end) = span(other);
                !(other_start > end || other_end < start)
            });
            if !overlaps {
                existing.push(progression.clone());
                inserted = true;
                break;
            }
        }
        if !inserted {
            packs.push(vec![progression]);
        }
    }

    if packs.len() == 1 && packs[0].is_empty() {
        return singles;
    }
    packs.extend(singles);
    packs
}

/// True if the two departures can live in the same frequency row
fn freq_compatible(a: &Departure, b: &Departure) -> bool {
    match (&a.source_freq, &b.source_freq) {
        (None, None) => true,
        (Some(fa), None) => fa.exact_times,
        (None, Some(fb)) => fb.exact_times,
        (Some(fa), Some(fb)) => fa.exact_times == fb.exact_times,
    }
}

/// Trips are interchangeable when everything but the absolute times agrees:
/// same stops in order, same relative time deltas, same per-halt attributes
fn time_independent_equal(feed: &Feed, a: &Trip, b: &Trip) -> bool {
    if !(extra_eq(feed, a, b)
        && a.route_id == b.route_id
        && a.service_id == b.service_id
        && a.headsign == b.headsign
        && a.short_name == b.short_name
        && a.direction_id == b.direction_id
        && a.block_id == b.block_id
        && a.shape_id == b.shape_id
        && a.wheelchair_accessible == b.wheelchair_accessible
        && a.bikes_allowed == b.bikes_allowed)
    {
        return false;
    }
    same_relative_stop_times(feed, a, b)
}

fn extra_eq(feed: &Feed, a: &Trip, b: &Trip) -> bool {
    gtfs_feed::extra_fields_equal(&feed.extra.trips, &a.id, &b.id)
}

fn same_relative_stop_times(feed: &Feed, a: &Trip, b: &Trip) -> bool {
    if a.stop_times.len() != b.stop_times.len() {
        return false;
    }
    if a.stop_times.is_empty() {
        return true;
    }

    let mut prev: Option<(&gtfs_feed::StopTime, &gtfs_feed::StopTime)> = None;
    for (sa, sb) in a.stop_times.iter().zip(&b.stop_times) {
        let extras_eq = feed.extra.stop_times.values().all(|col| {
            col.get(&(a.id.clone(), sa.sequence)) == col.get(&(b.id.clone(), sb.sequence))
        });

        let measures_eq = match (sa.shape_dist_traveled, sb.shape_dist_traveled) {
            (None, None) => true,
            (Some(da), Some(db)) => float_eq(da, db, 0.01),
            _ => false,
        };

        if !(extras_eq
            && sa.stop_id == sb.stop_id
            && sa.headsign == sb.headsign
            && sa.pickup_type == sb.pickup_type
            && sa.drop_off_type == sb.drop_off_type
            && sa.continuous_pickup == sb.continuous_pickup
            && sa.continuous_drop_off == sb.continuous_drop_off
            && measures_eq
            && sa.timepoint == sb.timepoint)
        {
            return false;
        }

        if let Some((pa, pb)) = prev {
            let delta = |x: Option<u32>, y: Option<u32>| match (x, y) {
                (Some(x), Some(y)) => Some(x as i64 - y as i64),
                _ => None,
            };
            if delta(sa.arrival_time, pa.arrival_time) != delta(sb.arrival_time, pb.arrival_time) {
                return false;
            }
            if delta(sa.departure_time, pa.departure_time)
                != delta(sb.departure_time, pb.departure_time)
            {
                return false;
            }
        }
        prev = Some((sa, sb));
    }
    true
}

/// Shifts a trip's stop times to start at `start`, preserving all
/// inter-stop deltas
fn shift_stop_times(trip: &mut Trip, start: u32) {
    let mut offset: i64 = 0;

    for i in 0..trip.stop_times.len() {
        let arr = trip.stop_times[i].arrival_time.unwrap_or(0) as i64;
        let dep = trip.stop_times[i].departure_time.unwrap_or(arr as u32) as i64;
        let dwell = dep - arr;

        let next_gap = if i + 1 < trip.stop_times.len() {
            trip.stop_times[i + 1].arrival_time.unwrap_or(0) as i64 - arr
        } else {
            0
        };

        trip.stop_times[i].arrival_time = Some((start as i64 + offset) as u32);
        trip.stop_times[i].departure_time = Some((start as i64 + offset + dwell) as u32);

        offset += next_gap;
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;

    fn feed_with_departures(times: &[u32]) -> Feed {
        let mut feed = Feed::new();
        feed.stops
            .insert("BEATTY_AIRPORT".into(), stop("BEATTY_AIRPORT", 36.87, -116.78));
        feed.stops
            .insert("BULLFROG".into(), stop("BULLFROG", 36.88, -116.82));
        feed.routes.insert("AB".into(), route("AB"));
        feed.services.insert(
            "FULLW".into(),
            daily_service("FULLW", date(2016, 1, 1), date(2016, 12, 31)),
        );

        for (i, &dep) in times.iter().enumerate() {
            let id = if i == 0 {
                "AB1a".to_string()
            } else {
                format!("AB1{}", (b'a' + i as u8) as char)
            };
            feed.trips.insert(
                id.clone(),
                trip(
                    &id,
                    "AB",
                    "FULLW",
                    vec![
                        stop_time("BEATTY_AIRPORT", 1, dep, dep),
                        stop_time("BULLFROG", 2, dep + 900, dep + 900),
                    ],
                ),
            );
        }
        feed
    }

    #[test]
    fn evenly_spaced_trips_become_one_frequency_row() {
        // 08:00, 08:10, 08:20, 08:30
        let mut feed = feed_with_departures(&[28800, 29400, 30000, 30600]);
        FrequencyMinimizer::default().run(&mut feed);

        assert_eq!(feed.trips.len(), 1);
        let survivor = feed.trips.values().next().unwrap();
        assert_eq!(survivor.frequencies.len(), 1);
        let f = &survivor.frequencies[0];
        assert_eq!(f.start_time, 28800);
        assert_eq!(f.end_time, 30600 + 600);
        assert_eq!(f.headway_secs, 600);
        assert!(f.exact_times);

        // the template starts at the progression start and keeps its deltas
        assert_eq!(survivor.stop_times[0].departure_time, Some(28800));
        assert_eq!(survivor.stop_times[1].arrival_time, Some(28800 + 900));
        feed.check_references().unwrap();
    }

    #[test]
    fn irregular_departures_stay_explicit() {
        let mut feed = feed_with_departures(&[28800, 29000, 30100]);
        FrequencyMinimizer::default().run(&mut feed);
        assert_eq!(feed.trips.len(), 3);
        assert!(feed.trips.values().all(|t| t.frequencies.is_empty()));
    }

    #[test]
    fn two_progressions_with_disjoint_spans_share_one_trip() {
        // 10-minute headway in the morning, 20-minute in the evening
        let mut feed = feed_with_departures(&[
            28800,
            29400,
            30000,
            30600, // 08:00..08:30 every 10 min
            64800,
            66000,
            67200,
            68400, // 18:00..19:00 every 20 min
        ]);
        FrequencyMinimizer::default().run(&mut feed);

        assert_eq!(feed.trips.len(), 1);
        let survivor = feed.trips.values().next().unwrap();
        assert_eq!(survivor.frequencies.len(), 2);
    }

    #[test]
    fn existing_frequencies_are_expanded_and_recombined() {
        let mut feed = feed_with_departures(&[30000, 30600]); // 08:20, 08:30
        feed.trips.get_mut("AB1a").unwrap().frequencies.push(Frequency {
            start_time: 28800,
            end_time: 30000, // expands to 08:00 and 08:10
            headway_secs: 600,
            exact_times: true,
        });

        FrequencyMinimizer::default().run(&mut feed);

        assert_eq!(feed.trips.len(), 1);
        let survivor = feed.trips.values().next().unwrap();
        assert_eq!(survivor.frequencies.len(), 1);
        let f = &survivor.frequencies[0];
        assert_eq!((f.start_time, f.end_time, f.headway_secs), (28800, 31200, 600));
    }

    #[test]
    fn different_relative_times_split_the_class() {
        let mut feed = feed_with_departures(&[28800, 29400, 30000]);
        // make one trip slower between the stops
        feed.trips.get_mut("AB1b").unwrap().stop_times[1].arrival_time = Some(29400 + 1200);
        feed.trips.get_mut("AB1b").unwrap().stop_times[1].departure_time = Some(29400 + 1200);

        FrequencyMinimizer::default().run(&mut feed);
        // the outlier survives untouched
        assert!(feed.trips.len() >= 2);
        assert!(feed.trips.contains_key("AB1b"));
    }
}
