use chrono::{Duration, NaiveDate};
use gtfs_feed::{
    extra_fields_equal, Availability, BaseRouteType, BikesAllowed, Feed, Service, Trip,
};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use std::hash::{Hash, Hasher};

use super::{pct, Processor};

/// Merges trips that serve the same stations at the same times.
///
/// Trip relations form a hierarchy: attribute-equal (same route, or same
/// base transit mode in fuzzy matching, and matching per-trip attributes),
/// stop-time-equal (same station parents at the same times, ignoring the
/// arrival at the first and the departure at the last halt), and a calendar
/// relation on the active-day sets. Four rounds run to a fixed point:
///
/// 1. calendar-equal trips merge into one, combining permissive flags;
/// 2. calendar-contained trips are deleted, the container survives;
/// 3. calendar-overlapping trips have the shared days removed from one of
///    them, copying the service first when it is shared;
/// 4. calendar-adjacent trips (up to seven days apart, same weekday
///    bitmap) merge by extending the surviving service over the union.
///
/// Frequency-based trips are left alone
pub struct TripDuplicateRemover {
    pub fuzzy: bool,
    pub max_day_dist: i64,
}

impl Default for TripDuplicateRemover {
    fn default() -> Self {
        TripDuplicateRemover {
            fuzzy: false,
            max_day_dist: 7,
        }
    }
}

struct State {
    ref_date: NaiveDate,
    /// Per service, its active days as offsets from `ref_date`
    day_lists: FxHashMap<String, Vec<i64>>,
    /// How many trips use each service
    service_refs: FxHashMap<String, usize>,
    merged_counter: usize,
}

impl State {
    fn day_list(&self, service_id: &str) -> &[i64] {
        self.day_lists.get(service_id).map_or(&[], |v| v.as_slice())
    }

    fn rewrite_day_list(&mut self, service: &Service) {
        let ref_date = self.ref_date;
        self.day_lists.insert(
            service.id.clone(),
            service
                .active_dates()
                .into_iter()
                .map(|d| (d - ref_date).num_days())
                .collect(),
        );
    }

    fn date_of(&self, day: i64) -> NaiveDate {
        self.ref_date + Duration::days(day)
    }
}

impl Processor for TripDuplicateRemover {
    fn run(&self, feed: &mut Feed) {
        print!("Removing redundant trips... ");
        let before = feed.trips.len();

        let Some(ref_date) = feed
            .services
            .values()
            .filter_map(|s| s.first_defined_date())
            .min()
        else {
            println!("done. (-0 trips [-0.00%])");
            return;
        };

        let mut state = State {
            ref_date,
            day_lists: FxHashMap::default(),
            service_refs: FxHashMap::default(),
            merged_counter: 0,
        };
        for service in feed.services.values() {
            state.rewrite_day_list(service);
        }
        for trip in feed.trips.values() {
            *state.service_refs.entry(trip.service_id.clone()).or_insert(0) += 1;
        }

        while self.combine_equal_round(feed, &mut state) {}
        while self.combine_contained_round(feed, &mut state) {}
        while self.combine_overlap_round(feed, &mut state) {}
        for dist in 1..=self.max_day_dist {
            while self.combine_adjacent_round(feed, &mut state, dist) {}
        }

        feed.clean_transfers();

        println!(
            "done. (-{} trips [-{:.2}%])",
            before - feed.trips.len(),
            pct(before, feed.trips.len())
        );
    }
}

impl TripDuplicateRemover {
    /// Buckets of trips worth comparing, by a hash of endpoint stations,
    /// halt count, first departure, last arrival and transit mode (plus
    /// route, headsign and short name when matching strictly)
    fn trip_buckets(&self, feed: &Feed) -> Vec<Vec<String>> {
        let mut buckets: FxHashMap<u64, Vec<String>> = FxHashMap::default();
        for (id, trip) in &feed.trips {
            if trip.stop_times.is_empty() {
                continue;
            }
            buckets
                .entry(self.trip_hash(feed, trip))
                .or_default()
                .push(id.clone());
        }
        buckets.into_values().filter(|b| b.len() > 1).collect()
    }

    fn trip_hash(&self, feed: &Feed, trip: &Trip) -> u64 {
        let mut h = FxHasher::default();

        let first = &trip.stop_times[0];
        let last = &trip.stop_times[trip.stop_times.len() - 1];
        feed.station_of(&first.stop_id).hash(&mut h);
        feed.station_of(&last.stop_id).hash(&mut h);
        trip.stop_times.len().hash(&mut h);
        first.departure_time.hash(&mut h);
        last.arrival_time.hash(&mut h);
        let route_type = feed.routes.get(&trip.route_id).map(|r| r.route_type).unwrap_or(3);
        BaseRouteType::from_extended(route_type).hash(&mut h);

        if !self.fuzzy {
            trip.route_id.hash(&mut h);
            trip.short_name.hash(&mut h);
            trip.headsign.hash(&mut h);
        }

        h.finish()
    }

    fn attr_eq(&self, feed: &Feed, a: &Trip, b: &Trip) -> bool {
        if !self.fuzzy && a.route_id != b.route_id {
            return false;
        }
        if self.fuzzy {
            let type_of = |t: &Trip| {
                feed.routes
                    .get(&t.route_id)
                    .map(|r| BaseRouteType::from_extended(r.route_type))
            };
            if type_of(a) != type_of(b) {
                return false;
            }
        }

        // frequency-based trips are excluded from deduplication
        if !a.frequencies.is_empty() || !b.frequencies.is_empty() {
            return false;
        }

        if self.fuzzy {
            return true;
        }

        let shape_matches =
            a.shape_id == b.shape_id || a.shape_id.is_none() || b.shape_id.is_none();

        extra_fields_equal(&feed.extra.trips, &a.id, &b.id)
            && shape_matches
            && a.wheelchair_accessible == b.wheelchair_accessible
            && a.bikes_allowed == b.bikes_allowed
            && a.short_name == b.short_name
            && a.headsign == b.headsign
            && a.direction_id == b.direction_id
            && a.block_id == b.block_id
    }

    /// Same station parent at every position; interior halts must match in
    /// arrival and departure, the first only in departure, the last only in
    /// arrival
    fn stop_times_eq(&self, feed: &Feed, a: &Trip, b: &Trip) -> bool {
        if a.stop_times.len() != b.stop_times.len() {
            return false;
        }

        let n = a.stop_times.len();
        for (i, (sa, sb)) in a.stop_times.iter().zip(&b.stop_times).enumerate() {
            if feed.station_of(&sa.stop_id) != feed.station_of(&sb.stop_id) {
                return false;
            }

            if i == 0 && sa.departure_time == sb.departure_time {
                continue;
            }
            if i == n - 1 && sa.arrival_time == sb.arrival_time {
                continue;
            }
            if sa.arrival_time == sb.arrival_time && sa.departure_time == sb.departure_time {
                continue;
            }
            return false;
        }
        true
    }

    /// True if `child` serves a subset of `parent`'s days
    fn cal_contained(&self, state: &State, child: &Trip, parent: &Trip) -> bool {
        let child_days = state.day_list(&child.service_id);
        let parent_days = state.day_list(&parent.service_id);

        if child_days.is_empty() {
            return true;
        }
        if child_days.len() > parent_days.len() {
            return false;
        }
        intersect(child_days, parent_days).len() == child_days.len()
    }

    fn cal_overlap(&self, state: &State, a: &Trip, b: &Trip) -> Vec<i64> {
        intersect(
            state.day_list(&a.service_id),
            state.day_list(&b.service_id),
        )
    }

    /// Adjacent within `dist` days, same weekday bitmap, to keep the merged
    /// service simple
    fn cal_adjacent(&self, feed: &Feed, state: &State, child: &Trip, parent: &Trip, dist: i64) -> bool {
        let (Some(cs), Some(ps)) = (
            feed.services.get(&child.service_id),
            feed.services.get(&parent.service_id),
        ) else {
            return false;
        };
        if cs.start_date.is_none() || ps.start_date.is_none() || cs.weekdays != ps.weekdays {
            return false;
        }

        let child_days = state.day_list(&child.service_id);
        let parent_days = state.day_list(&parent.service_id);
        if child_days.is_empty() || parent_days.is_empty() {
            return false;
        }

        let diff_front = parent_days[0] - child_days[child_days.len() - 1];
        let diff_back = child_days[0] - parent_days[parent_days.len() - 1];

        (diff_front > 0 && diff_front <= dist) || (diff_back > 0 && diff_back <= dist)
    }

    /// One analysis pass over the buckets, grouping mergeable trips. The
    /// per-bucket scans run in parallel; `select` decides the relation
    fn find_groups<F>(&self, feed: &Feed, select: F) -> Vec<Vec<String>>
    where
        F: Fn(&Feed, &Trip, &Trip) -> bool + Sync,
    {
        self.trip_buckets(feed)
            .into_par_iter()
            .map(|bucket| {
                let mut groups: Vec<Vec<String>> = Vec::new();
                let mut processed: FxHashSet<&str> = FxHashSet::default();

                for ta_id in &bucket {
                    if processed.contains(ta_id.as_str()) {
                        continue;
                    }
                    let ta = &feed.trips[ta_id];
                    let mut group: Vec<String> = Vec::new();

                    // the calendar relations are directional, so every other
                    // bucket member is a candidate, not only the later ones
                    for tb_id in &bucket {
                        if tb_id == ta_id || processed.contains(tb_id.as_str()) {
                            continue;
                        }
                        let tb = &feed.trips[tb_id];
                        if self.attr_eq(feed, ta, tb)
                            && self.stop_times_eq(feed, ta, tb)
                            && select(feed, ta, tb)
                        {
                            group.push(tb_id.clone());
                            processed.insert(tb_id);
                        }
                    }

                    if !group.is_empty() {
                        processed.insert(ta_id);
                        group.insert(0, ta_id.clone());
                        groups.push(group);
                    }
                }
                groups
            })
            .flatten()
            .collect()
    }

    fn combine_equal_round(&self, feed: &mut Feed, state: &mut State) -> bool {
        let groups = {
            let state_ref: &State = state;
            self.find_groups(feed, |_, a, b| state_ref.day_lists_eq(a, b))
        };

        for group in &groups {
            self.combine_equal(feed, state, group);
        }
        !groups.is_empty()
    }

    fn combine_equal(&self, feed: &mut Feed, state: &mut State, group: &[String]) {
        let ref_id = &group[0];
        for other_id in &group[1..] {
            let Some(mut other) = feed.trips.remove(other_id) else {
                continue;
            };
            *state.service_refs.entry(other.service_id.clone()).or_insert(1) -= 1;

            let shape_measures: Option<Vec<Option<f32>>> = other
                .shape_id
                .as_ref()
                .map(|_| other.stop_times.iter().map(|st| st.shape_dist_traveled).collect());

            let ref_trip = feed.trips.get_mut(ref_id).expect("reference trip exists");

            // moved attribution rows keep naming their owner
            for attr in &mut other.attributions {
                attr.trip_id = Some(ref_id.clone());
            }
            ref_trip.attributions.extend(other.attributions);

            if ref_trip.bikes_allowed == BikesAllowed::NoBikeInfo
                && other.bikes_allowed != BikesAllowed::NoBikeInfo
            {
                ref_trip.bikes_allowed = other.bikes_allowed;
            }
            if ref_trip.bikes_allowed == BikesAllowed::NotAllowed
                && other.bikes_allowed == BikesAllowed::Allowed
            {
                ref_trip.bikes_allowed = BikesAllowed::Allowed;
            }
            if ref_trip.wheelchair_accessible == Availability::InformationNotAvailable
                && other.wheelchair_accessible != Availability::InformationNotAvailable
            {
                ref_trip.wheelchair_accessible = other.wheelchair_accessible;
            }
            if ref_trip.wheelchair_accessible == Availability::NotAvailable
                && other.wheelchair_accessible == Availability::Available
            {
                ref_trip.wheelchair_accessible = Availability::Available;
            }

            if ref_trip.shape_id.is_none() && other.shape_id.is_some() {
                ref_trip.shape_id = other.shape_id;
                if let Some(measures) = shape_measures {
                    for (st, m) in ref_trip.stop_times.iter_mut().zip(measures) {
                        st.shape_dist_traveled = m;
                    }
                }
            }

            if ref_trip.headsign.as_deref().map_or(true, str::is_empty) && other.headsign.is_some()
            {
                ref_trip.headsign = other.headsign;
            }
            if ref_trip.short_name.as_deref().map_or(true, str::is_empty)
                && other.short_name.is_some()
            {
                ref_trip.short_name = other.short_name;
            }
        }
    }

    fn combine_contained_round(&self, feed: &mut Feed, state: &mut State) -> bool {
        let groups = {
            let state_ref: &State = state;
            self.find_groups(feed, |_, a, b| self.cal_contained(state_ref, b, a))
        };

        for group in &groups {
            let ref_id = &group[0];
            for other_id in &group[1..] {
                let Some(mut other) = feed.trips.remove(other_id) else {
                    continue;
                };
                *state.service_refs.entry(other.service_id.clone()).or_insert(1) -= 1;

                let shape_measures: Option<Vec<Option<f32>>> = other
                    .shape_id
                    .as_ref()
                    .map(|_| other.stop_times.iter().map(|st| st.shape_dist_traveled).collect());

                let ref_trip = feed.trips.get_mut(ref_id).expect("reference trip exists");
                for attr in &mut other.attributions {
                    attr.trip_id = Some(ref_id.clone());
                }
                ref_trip.attributions.extend(other.attributions);
                if ref_trip.shape_id.is_none() && other.shape_id.is_some() {
                    ref_trip.shape_id = other.shape_id;
                    if let Some(measures) = shape_measures {
                        for (st, m) in ref_trip.stop_times.iter_mut().zip(measures) {
                            st.shape_dist_traveled = m;
                        }
                    }
                }
            }
        }
        !groups.is_empty()
    }

    fn combine_overlap_round(&self, feed: &mut Feed, state: &mut State) -> bool {
        // groups carry the shared days that have to leave the reference
        let groups: Vec<(String, Vec<String>, Vec<i64>)> = {
            let state_ref: &State = state;
            self.trip_buckets(feed)
                .into_par_iter()
                .map(|bucket| {
                    let mut out: Vec<(String, Vec<String>, Vec<i64>)> = Vec::new();
                    let mut processed: FxHashSet<&str> = FxHashSet::default();

                    for ta_id in &bucket {
                        if processed.contains(ta_id.as_str()) {
                            continue;
                        }
                        let ta = &feed.trips[ta_id];
                        let mut members: Vec<String> = Vec::new();
                        let mut days: Vec<i64> = Vec::new();

                        for tb_id in &bucket {
                            if tb_id == ta_id || processed.contains(tb_id.as_str()) {
                                continue;
                            }
                            let tb = &feed.trips[tb_id];
                            if self.attr_eq(feed, ta, tb) && self.stop_times_eq(feed, ta, tb) {
                                let overlap = self.cal_overlap(state_ref, tb, ta);
                                if !overlap.is_empty() {
                                    members.push(tb_id.clone());
                                    days = merge_sorted(&days, &overlap);
                                    processed.insert(tb_id);
                                }
                            }
                        }

                        if !members.is_empty() {
                            processed.insert(ta_id);
                            out.push((ta_id.clone(), members, days));
                        }
                    }
                    out
                })
                .flatten()
                .collect()
        };

        for (ref_id, members, days) in &groups {
            self.exclude_overlap(feed, state, ref_id, members, days);
        }
        !groups.is_empty()
    }

    /// Removes the shared days from the reference trip's service, copying
    /// the service first when other trips still use it. A service emptied
    /// by the removal deletes the trip
    fn exclude_overlap(
        &self,
        feed: &mut Feed,
        state: &mut State,
        ref_id: &str,
        members: &[String],
        days: &[i64],
    ) {
        // inherit a shape before days are taken away
        if feed.trips.get(ref_id).map_or(false, |t| t.shape_id.is_none()) {
            if let Some(donor_id) = members.first() {
                let donor = &feed.trips[donor_id];
                if donor.shape_id.is_some() {
                    let shape_id = donor.shape_id.clone();
                    let measures: Vec<Option<f32>> =
                        donor.stop_times.iter().map(|st| st.shape_dist_traveled).collect();
                    let ref_trip = feed.trips.get_mut(ref_id).expect("reference trip exists");
                    ref_trip.shape_id = shape_id;
                    for (st, m) in ref_trip.stop_times.iter_mut().zip(measures) {
                        st.shape_dist_traveled = m;
                    }
                }
            }
        }

        let service_id = feed.trips[ref_id].service_id.clone();

        if state.service_refs.get(&service_id).copied().unwrap_or(0) == 1 {
            let service = feed.services.get_mut(&service_id).expect("service exists");
            for &d in days {
                service.exceptions.insert(state.date_of(d), false);
            }
            let service = feed.services[&service_id].clone();
            state.rewrite_day_list(&service);

            if state.day_list(&service_id).is_empty() {
                feed.trips.remove(ref_id);
                *state.service_refs.entry(service_id).or_insert(1) -= 1;
            }
        } else {
            let mut new_service = feed.services[&service_id].clone();
            new_service.id = next_merged_id(feed, state);
            for &d in days {
                new_service.exceptions.insert(state.date_of(d), false);
            }
            state.rewrite_day_list(&new_service);

            if state.day_list(&new_service.id).is_empty() {
                feed.trips.remove(ref_id);
                *state.service_refs.entry(service_id).or_insert(1) -= 1;
                return;
            }

            *state.service_refs.entry(service_id).or_insert(1) -= 1;
            state.service_refs.insert(new_service.id.clone(), 1);
            feed.trips.get_mut(ref_id).expect("reference trip exists").service_id =
                new_service.id.clone();
            feed.services.insert(new_service.id.clone(), new_service);
        }
    }

    fn combine_adjacent_round(&self, feed: &mut Feed, state: &mut State, dist: i64) -> bool {
        let groups = {
            let state_ref: &State = state;
            self.find_groups(feed, |f, a, b| self.cal_adjacent(f, state_ref, b, a, dist))
        };

        for group in &groups {
            self.combine_adjacent(feed, state, group);
        }
        !groups.is_empty()
    }

    fn combine_adjacent(&self, feed: &mut Feed, state: &mut State, group: &[String]) {
        let ref_id = &group[0];

        // make the reference's service private before extending it
        let service_id = feed.trips[ref_id].service_id.clone();
        let service_id = if state.service_refs.get(&service_id).copied().unwrap_or(0) != 1 {
            let mut new_service = feed.services[&service_id].clone();
            new_service.id = next_merged_id(feed, state);
            state.rewrite_day_list(&new_service);
            *state.service_refs.entry(service_id).or_insert(1) -= 1;
            state.service_refs.insert(new_service.id.clone(), 1);
            feed.trips.get_mut(ref_id).expect("reference trip exists").service_id =
                new_service.id.clone();
            let id = new_service.id.clone();
            feed.services.insert(id.clone(), new_service);
            id
        } else {
            service_id
        };

        let other_services: Vec<String> = group[1..]
            .iter()
            .filter_map(|id| feed.trips.get(id).map(|t| t.service_id.clone()))
            .collect();
        self.combine_services(feed, state, &other_services, &service_id);

        for other_id in &group[1..] {
            let Some(mut other) = feed.trips.remove(other_id) else {
                continue;
            };
            *state.service_refs.entry(other.service_id.clone()).or_insert(1) -= 1;

            let shape_measures: Option<Vec<Option<f32>>> = other
                .shape_id
                .as_ref()
                .map(|_| other.stop_times.iter().map(|st| st.shape_dist_traveled).collect());

            // inherit additional columns the reference does not carry
            for col in feed.extra.trips.values_mut() {
                if let Some(v) = col.get(other_id) {
                    if !col.contains_key(ref_id) {
                        let v = v.clone();
                        col.insert(ref_id.clone(), v);
                    }
                }
            }

            let ref_trip = feed.trips.get_mut(ref_id).expect("reference trip exists");
            for attr in &mut other.attributions {
                attr.trip_id = Some(ref_id.clone());
            }
            ref_trip.attributions.extend(other.attributions);
            if ref_trip.shape_id.is_none() && other.shape_id.is_some() {
                ref_trip.shape_id = other.shape_id;
                if let Some(measures) = shape_measures {
                    for (st, m) in ref_trip.stop_times.iter_mut().zip(measures) {
                        st.shape_dist_traveled = m;
                    }
                }
            }
        }
    }

    /// Extends `ref_service` to cover the union of the active days of all
    /// given services, adding and removing exceptions as needed
    fn combine_services(
        &self,
        feed: &mut Feed,
        state: &mut State,
        services: &[String],
        ref_service: &str,
    ) {
        let mut dlist: Vec<i64> = state.day_list(ref_service).to_vec();
        for s in services {
            if s == ref_service {
                continue;
            }
            dlist = merge_sorted(&dlist, state.day_list(s));
        }

        let has_range = feed.services[ref_service].start_date.is_some();
        if has_range {
            let service = feed.services.get_mut(ref_service).expect("service exists");
            for s in services {
                let days = state.day_lists.get(s).cloned().unwrap_or_default();
                if days.is_empty() {
                    continue;
                }
                let first = state.date_of(days[0]);
                let last = state.date_of(days[days.len() - 1]);
                if service.start_date.map_or(true, |d| first < d) {
                    service.start_date = Some(first);
                }
                if service.end_date.map_or(true, |d| last > d) {
                    service.end_date = Some(last);
                }
            }

            for &d in &dlist {
                let date = state.date_of(d);
                if !service.is_active_on(date) {
                    service.exceptions.insert(date, true);
                }
            }

            let snapshot = feed.services[ref_service].clone();
            state.rewrite_day_list(&snapshot);

            // drop days the extended range brought in that nobody serves
            let wrong: Vec<i64> = diff_sorted(state.day_list(ref_service), &dlist);
            let service = feed.services.get_mut(ref_service).expect("service exists");
            for d in wrong {
                service.exceptions.insert(state.date_of(d), false);
            }
        } else {
            let service = feed.services.get_mut(ref_service).expect("service exists");
            for &d in &dlist {
                let date = state.date_of(d);
                if !service.is_active_on(date) {
                    service.exceptions.insert(date, true);
                }
            }
        }

        let snapshot = feed.services[ref_service].clone();
        state.rewrite_day_list(&snapshot);
    }
}

impl State {
    fn day_lists_eq(&self, a: &Trip, b: &Trip) -> bool {
        if a.service_id == b.service_id {
            return true;
        }
        self.day_list(&a.service_id) == self.day_list(&b.service_id)
    }
}

/// The first free `merged<n>` service id
fn next_merged_id(feed: &Feed, state: &mut State) -> String {
    loop {
        let id = format!("merged{}", state.merged_counter);
        state.merged_counter += 1;
        if !feed.services.contains_key(&id) {
            return id;
        }
    }
}

fn intersect(a: &[i64], b: &[i64]) -> Vec<i64> {
    let set: FxHashSet<i64> = b.iter().copied().collect();
    a.iter().copied().filter(|d| set.contains(d)).collect()
}

fn merge_sorted(a: &[i64], b: &[i64]) -> Vec<i64> {
    let mut out: Vec<i64> = a.iter().chain(b.iter()).copied().collect();
    out.sort_unstable();
    out.dedup();
    out
}

fn diff_sorted(a: &[i64], b: &[i64]) -> Vec<i64> {
    let set: FxHashSet<i64> = b.iter().copied().collect();
    a.iter().copied().filter(|d| !set.contains(d)).collect()
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;

    fn base_feed() -> Feed {
        let mut feed = Feed::new();
        feed.stops.insert("A".into(), stop("A", 48.0, 7.8));
        feed.stops.insert("B".into(), stop("B", 48.1, 7.9));
        feed.routes.insert("R".into(), route("R"));
        feed
    }

    fn two_stop_trip(id: &str, service: &str, dep: u32) -> Trip {
        trip(
            id,
            "R",
            service,
            vec![
                stop_time("A", 0, dep, dep),
                stop_time("B", 1, dep + 900, dep + 900),
            ],
        )
    }

    #[test]
    fn equal_trips_merge_and_combine_permissive_flags() {
        let mut feed = base_feed();
        feed.services.insert(
            "SV".into(),
            daily_service("SV", date(2020, 1, 6), date(2020, 6, 28)),
        );
        let mut t1 = two_stop_trip("T1", "SV", 28800);
        t1.bikes_allowed = BikesAllowed::NoBikeInfo;
        let mut t2 = two_stop_trip("T2", "SV", 28800);
        t2.bikes_allowed = BikesAllowed::Allowed;
        t2.attributions.push(gtfs_feed::Attribution {
            trip_id: Some("T2".into()),
            organization_name: "Operator GmbH".into(),
            ..Default::default()
        });
        feed.trips.insert("T1".into(), t1);
        feed.trips.insert("T2".into(), t2);

        TripDuplicateRemover::default().run(&mut feed);

        assert_eq!(feed.trips.len(), 1);
        let survivor = feed.trips.values().next().unwrap();
        assert_eq!(survivor.bikes_allowed, BikesAllowed::Allowed);
        // the attribution moved with the merge and follows the survivor
        assert_eq!(survivor.attributions.len(), 1);
        assert_eq!(
            survivor.attributions[0].trip_id.as_deref(),
            Some(survivor.id.as_str())
        );
        feed.check_references().unwrap();
    }

    #[test]
    fn different_times_block_the_merge() {
        let mut feed = base_feed();
        feed.services.insert(
            "SV".into(),
            daily_service("SV", date(2020, 1, 6), date(2020, 6, 28)),
        );
        feed.trips.insert("T1".into(), two_stop_trip("T1", "SV", 28800));
        feed.trips.insert("T2".into(), two_stop_trip("T2", "SV", 29400));

        TripDuplicateRemover::default().run(&mut feed);
        assert_eq!(feed.trips.len(), 2);
    }

    #[test]
    fn contained_service_days_delete_the_contained_trip() {
        let mut feed = base_feed();
        feed.services.insert(
            "BIG".into(),
            daily_service("BIG", date(2020, 1, 6), date(2020, 6, 28)),
        );
        feed.services.insert(
            "SMALL".into(),
            daily_service("SMALL", date(2020, 2, 3), date(2020, 2, 9)),
        );
        feed.trips.insert("T1".into(), two_stop_trip("T1", "BIG", 28800));
        feed.trips.insert("T2".into(), two_stop_trip("T2", "SMALL", 28800));

        TripDuplicateRemover::default().run(&mut feed);

        assert_eq!(feed.trips.len(), 1);
        assert!(feed.trips.contains_key("T1"));
    }

    #[test]
    fn overlapping_days_are_cut_from_one_trip() {
        let mut feed = base_feed();
        feed.services.insert(
            "JANFEB".into(),
            daily_service("JANFEB", date(2020, 1, 6), date(2020, 2, 9)),
        );
        feed.services.insert(
            "FEBMAR".into(),
            daily_service("FEBMAR", date(2020, 2, 3), date(2020, 3, 8)),
        );
        feed.trips
            .insert("T1".into(), two_stop_trip("T1", "JANFEB", 28800));
        feed.trips
            .insert("T2".into(), two_stop_trip("T2", "FEBMAR", 28800));

        TripDuplicateRemover::default().run(&mut feed);

        // both trips survive, but no day is served twice and none is lost
        assert_eq!(feed.trips.len(), 2);
        let mut d = date(2020, 1, 6);
        while d <= date(2020, 3, 8) {
            let served: usize = feed
                .trips
                .values()
                .filter(|t| feed.services[&t.service_id].is_active_on(d))
                .count();
            assert_eq!(served, 1, "{} should be served exactly once", d);
            d += chrono::Duration::days(1);
        }
        feed.check_references().unwrap();
    }

    #[test]
    fn adjacent_ranges_with_equal_bitmaps_merge() {
        let mut feed = base_feed();
        feed.services.insert(
            "W1".into(),
            daily_service("W1", date(2020, 1, 6), date(2020, 1, 12)),
        );
        feed.services.insert(
            "W2".into(),
            daily_service("W2", date(2020, 1, 13), date(2020, 1, 19)),
        );
        feed.trips.insert("T1".into(), two_stop_trip("T1", "W1", 28800));
        feed.trips.insert("T2".into(), two_stop_trip("T2", "W2", 28800));

        TripDuplicateRemover::default().run(&mut feed);

        assert_eq!(feed.trips.len(), 1);
        let survivor = feed.trips.values().next().unwrap();
        let service = &feed.services[&survivor.service_id];
        let mut d = date(2020, 1, 6);
        while d <= date(2020, 1, 19) {
            assert!(service.is_active_on(d));
            d += chrono::Duration::days(1);
        }
        feed.check_references().unwrap();
    }

    #[test]
    fn shared_services_are_copied_before_modification() {
        let mut feed = base_feed();
        feed.stops.insert("C".into(), stop("C", 48.2, 8.0));
        feed.services.insert(
            "JANFEB".into(),
            daily_service("JANFEB", date(2020, 1, 6), date(2020, 2, 9)),
        );
        feed.services.insert(
            "FEBMAR".into(),
            daily_service("FEBMAR", date(2020, 2, 3), date(2020, 3, 8)),
        );
        feed.trips
            .insert("T1".into(), two_stop_trip("T1", "JANFEB", 28800));
        feed.trips
            .insert("T2".into(), two_stop_trip("T2", "FEBMAR", 28800));
        // an unrelated trip shares T1's service and must keep all its days
        feed.trips.insert(
            "BYSTANDER".into(),
            trip(
                "BYSTANDER",
                "R",
                "JANFEB",
                vec![stop_time("C", 0, 36000, 36000)],
            ),
        );

        TripDuplicateRemover::default().run(&mut feed);

        let bystander = &feed.trips["BYSTANDER"];
        assert_eq!(bystander.service_id, "JANFEB");
        let mut d = date(2020, 1, 6);
        while d <= date(2020, 2, 9) {
            assert!(feed.services["JANFEB"].is_active_on(d));
            d += chrono::Duration::days(1);
        }
        feed.check_references().unwrap();
    }

    #[test]
    fn frequency_trips_are_left_alone() {
        let mut feed = base_feed();
        feed.services.insert(
            "SV".into(),
            daily_service("SV", date(2020, 1, 6), date(2020, 6, 28)),
        );
        let mut t1 = two_stop_trip("T1", "SV", 28800);
        t1.frequencies.push(gtfs_feed::Frequency {
            start_time: 28800,
            end_time: 36000,
            headway_secs: 600,
            exact_times: true,
        });
        feed.trips.insert("T1".into(), t1);
        feed.trips.insert("T2".into(), two_stop_trip("T2", "SV", 28800));

        TripDuplicateRemover::default().run(&mut feed);
        assert_eq!(feed.trips.len(), 2);
    }

    #[test]
    fn fuzzy_matching_needs_only_the_same_base_mode() {
        let mut feed = base_feed();
        let mut express = route("REXP");
        express.route_type = 702; // express bus, same base mode as plain bus
        express.short_name = "X10".into();
        feed.routes.insert("REXP".into(), express);
        feed.services.insert(
            "SV".into(),
            daily_service("SV", date(2020, 1, 6), date(2020, 6, 28)),
        );
        feed.trips.insert("T1".into(), two_stop_trip("T1", "SV", 28800));
        let mut t2 = two_stop_trip("T2", "SV", 28800);
        t2.route_id = "REXP".into();
        feed.trips.insert("T2".into(), t2);

        TripDuplicateRemover::default().run(&mut feed);
        assert_eq!(feed.trips.len(), 2, "strict matching keeps them apart");

        TripDuplicateRemover {
            fuzzy: true,
            max_day_dist: 7,
        }
        .run(&mut feed);
        assert_eq!(feed.trips.len(), 1, "fuzzy matching merges across routes");
    }
}
