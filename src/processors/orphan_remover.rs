use gtfs_feed::{ContinuousPickupDropOff, Feed, LocationType, PickupDropOffType};
use rustc_hash::FxHashSet;

use super::{pct, Processor};

/// Removes entities that nothing references. The stop sweep runs twice
/// because deleting a stop can orphan its former parent station
pub struct OrphanRemover {}

impl Processor for OrphanRemover {
    fn run(&self, feed: &mut Feed) {
        print!("Removing unreferenced entries... ");

        let trips_before = feed.trips.len();
        let transfers_before = feed.transfers.len();
        let stops_before = feed.stops.len();
        let shapes_before = feed.shapes.len();
        let services_before = feed.services.len();
        let routes_before = feed.routes.len();
        let agencies_before = feed.agencies.len();

        self.remove_trip_orphans(feed);

        self.remove_stop_orphans(feed);
        self.remove_stop_orphans(feed);

        self.remove_transfer_orphans(feed);

        self.remove_shape_orphans(feed);
        self.remove_service_orphans(feed);
        self.remove_route_orphans(feed);
        self.remove_agency_orphans(feed);

        feed.clean_transfers();

        println!(
            "done. (-{} trips [-{:.2}%], -{} stops [-{:.2}%], -{} shapes [-{:.2}%], -{} services [-{:.2}%], -{} routes [-{:.2}%], -{} agencies [-{:.2}%], -{} transfers [-{:.2}%])",
            trips_before - feed.trips.len(),
            pct(trips_before, feed.trips.len()),
            stops_before - feed.stops.len(),
            pct(stops_before, feed.stops.len()),
            shapes_before - feed.shapes.len(),
            pct(shapes_before, feed.shapes.len()),
            services_before - feed.services.len(),
            pct(services_before, feed.services.len()),
            routes_before - feed.routes.len(),
            pct(routes_before, feed.routes.len()),
            agencies_before - feed.agencies.len(),
            pct(agencies_before, feed.agencies.len()),
            transfers_before - feed.transfers.len(),
            pct(transfers_before, feed.transfers.len()),
        );
    }
}

impl OrphanRemover {
    /// Trips without any stop time and without frequencies serve nobody,
    /// as do trips that never allow a pickup or never allow a drop off
    fn remove_trip_orphans(&self, feed: &mut Feed) {
        let mut doomed = Vec::new();

        for (id, trip) in &feed.trips {
            if trip.stop_times.is_empty() && trip.frequencies.is_empty() {
                doomed.push(id.clone());
                continue;
            }

            let route_continuous_pickup = feed
                .routes
                .get(&trip.route_id)
                .map_or(ContinuousPickupDropOff::NotAvailable, |r| r.continuous_pickup);
            let route_continuous_drop_off = feed
                .routes
                .get(&trip.route_id)
                .map_or(ContinuousPickupDropOff::NotAvailable, |r| r.continuous_drop_off);

            let mut has_pickup = false;
            let mut has_drop_off = false;
            for st in &trip.stop_times {
                if st.drop_off_type != PickupDropOffType::NotAvailable
                    || st.continuous_drop_off != ContinuousPickupDropOff::NotAvailable
                    || route_continuous_drop_off != ContinuousPickupDropOff::NotAvailable
                {
                    has_drop_off = true;
                }
                if st.pickup_type != PickupDropOffType::NotAvailable
                    || st.continuous_pickup != ContinuousPickupDropOff::NotAvailable
                    || route_continuous_pickup != ContinuousPickupDropOff::NotAvailable
                {
                    has_pickup = true;
                }
                if has_pickup && has_drop_off {
                    break;
                }
            }
            if !has_pickup || !has_drop_off {
                doomed.push(id.clone());
            }
        }

        for id in doomed {
            feed.trips.remove(&id);
        }
    }

    /// A stop stays if a stop time, a transfer endpoint, a pathway endpoint
    /// or a surviving stop's parent reference points at it. Entrances are
    /// never removed by orphaning alone
    fn remove_stop_orphans(&self, feed: &mut Feed) {
        let mut referenced: FxHashSet<&str> = FxHashSet::default();

        for trip in feed.trips.values() {
            for st in &trip.stop_times {
                referenced.insert(&st.stop_id);
            }
        }
        for key in feed.transfers.keys() {
            referenced.insert(&key.from_stop_id);
            referenced.insert(&key.to_stop_id);
        }
        for stop in feed.stops.values() {
            if let Some(parent) = &stop.parent_station {
                referenced.insert(parent);
            }
        }
        for pathway in feed.pathways.values() {
            referenced.insert(&pathway.from_stop_id);
            referenced.insert(&pathway.to_stop_id);
        }

        let doomed: Vec<String> = feed
            .stops
            .values()
            .filter(|s| !referenced.contains(s.id.as_str()) && s.location_type != LocationType::Entrance)
            .map(|s| s.id.clone())
            .collect();
        drop(referenced);

        for id in doomed {
            feed.stops.remove(&id);
        }
    }

    /// Transfers with vanished stop endpoints or vanished referenced routes
    fn remove_transfer_orphans(&self, feed: &mut Feed) {
        let (stops, routes) = (&feed.stops, &feed.routes);
        feed.transfers.retain(|k, _| {
            stops.contains_key(&k.from_stop_id)
                && stops.contains_key(&k.to_stop_id)
                && k.from_route_id
                    .as_ref()
                    .map_or(true, |r| routes.contains_key(r))
                && k.to_route_id
                    .as_ref()
                    .map_or(true, |r| routes.contains_key(r))
        });
    }

    fn remove_shape_orphans(&self, feed: &mut Feed) {
        let referenced: FxHashSet<&str> = feed
            .trips
            .values()
            .filter_map(|t| t.shape_id.as_deref())
            .collect();

        let doomed: Vec<String> = feed
            .shapes
            .keys()
            .filter(|id| !referenced.contains(id.as_str()))
            .cloned()
            .collect();
        drop(referenced);

        for id in doomed {
            feed.shapes.remove(&id);
        }
    }

    fn remove_service_orphans(&self, feed: &mut Feed) {
        let referenced: FxHashSet<&str> =
            feed.trips.values().map(|t| t.service_id.as_str()).collect();

        let doomed: Vec<String> = feed
            .services
            .keys()
            .filter(|id| !referenced.contains(id.as_str()))
            .cloned()
            .collect();
        drop(referenced);

        for id in doomed {
            feed.services.remove(&id);
        }
    }

    fn remove_route_orphans(&self, feed: &mut Feed) {
        let mut referenced: FxHashSet<&str> =
            feed.trips.values().map(|t| t.route_id.as_str()).collect();

        for fare in feed.fare_attributes.values() {
            for rule in &fare.rules {
                if let Some(route_id) = &rule.route_id {
                    referenced.insert(route_id);
                }
            }
        }

        let doomed: Vec<String> = feed
            .routes
            .keys()
            .filter(|id| !referenced.contains(id.as_str()))
            .cloned()
            .collect();
        drop(referenced);

        for id in doomed {
            feed.routes.remove(&id);
        }
    }

    fn remove_agency_orphans(&self, feed: &mut Feed) {
        let mut referenced: FxHashSet<&str> = feed
            .routes
            .values()
            .filter_map(|r| r.agency_id.as_deref())
            .collect();

        for fare in feed.fare_attributes.values() {
            if let Some(agency_id) = &fare.agency_id {
                referenced.insert(agency_id);
            }
        }

        let doomed: Vec<String> = feed
            .agencies
            .values()
            .filter(|a| !referenced.contains(a.id.as_deref().unwrap_or("")))
            .filter_map(|a| a.id.clone())
            .collect();
        drop(referenced);

        for id in doomed {
            feed.agencies.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use gtfs_feed::*;

    #[test]
    fn sweeps_unreferenced_stops_but_keeps_referenced_parents() {
        let mut feed = Feed::new();
        feed.stops.insert("META1".into(), station("META1", 36.4, -117.1));
        feed.stops.insert("META2".into(), stop("META2", 36.5, -117.2));
        let mut fur = stop("FUR_CREEK_RES", 36.42, -117.13);
        fur.parent_station = Some("META1".into());
        feed.stops.insert("FUR_CREEK_RES".into(), fur);

        feed.routes.insert("AB".into(), route("AB"));
        feed.services.insert(
            "S".into(),
            daily_service("S", date(2016, 1, 1), date(2016, 12, 31)),
        );
        feed.trips.insert(
            "T".into(),
            trip(
                "T",
                "AB",
                "S",
                vec![stop_time("FUR_CREEK_RES", 0, 28800, 28800)],
            ),
        );

        OrphanRemover {}.run(&mut feed);

        assert!(feed.stops.contains_key("META1"));
        assert!(feed.stops.contains_key("FUR_CREEK_RES"));
        assert!(!feed.stops.contains_key("META2"));
        feed.check_references().unwrap();
    }

    #[test]
    fn deletes_empty_and_unboardable_trips_and_their_orphans() {
        let mut feed = Feed::new();
        feed.stops.insert("S1".into(), stop("S1", 1.0, 1.0));
        feed.routes.insert("R1".into(), route("R1"));
        feed.routes.insert("R2".into(), route("R2"));
        feed.services.insert(
            "SV".into(),
            daily_service("SV", date(2016, 1, 1), date(2016, 12, 31)),
        );

        feed.trips
            .insert("EMPTY".into(), trip("EMPTY", "R1", "SV", vec![]));

        let mut unboardable = trip(
            "NOPICK",
            "R2",
            "SV",
            vec![stop_time("S1", 0, 28800, 28800)],
        );
        for st in &mut unboardable.stop_times {
            st.pickup_type = PickupDropOffType::NotAvailable;
        }
        feed.trips.insert("NOPICK".into(), unboardable);

        feed.trips.insert(
            "OK".into(),
            trip("OK", "R1", "SV", vec![stop_time("S1", 0, 28800, 28800)]),
        );

        OrphanRemover {}.run(&mut feed);

        assert!(!feed.trips.contains_key("EMPTY"));
        assert!(!feed.trips.contains_key("NOPICK"));
        assert!(feed.trips.contains_key("OK"));
        // R2 lost its only trip and goes with it
        assert!(!feed.routes.contains_key("R2"));
        assert!(feed.routes.contains_key("R1"));
        feed.check_references().unwrap();
    }

    #[test]
    fn entrances_survive_orphaning() {
        let mut feed = Feed::new();
        let mut entrance = stop("E", 1.0, 1.0);
        entrance.location_type = LocationType::Entrance;
        feed.stops.insert("E".into(), entrance);

        OrphanRemover {}.run(&mut feed);
        assert!(feed.stops.contains_key("E"));
    }
}
