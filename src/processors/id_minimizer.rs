use gtfs_feed::{Attribution, Feed, TransferKey};
use rustc_hash::FxHashMap;

use super::Processor;

/// Which tables keep their original ids
#[derive(Debug, Default, Clone)]
pub struct KeepIds {
    pub stops: bool,
    pub routes: bool,
    pub trips: bool,
    pub services: bool,
    pub shapes: bool,
    pub agencies: bool,
    pub fares: bool,
    pub pathways: bool,
    pub levels: bool,
}

/// Renumbers entity ids to dense sequences in base 10 or base 36. Every
/// reference and every additional-column map is rewritten in lockstep.
/// Kept tables are skipped, except that a `N#` feed-concatenation prefix
/// is stripped when the unprefixed id is still free
pub struct IdMinimizer {
    pub base: u32,
    pub keep: KeepIds,
}

impl Processor for IdMinimizer {
    fn run(&self, feed: &mut Feed) {
        print!("Minimizing ids... ");

        self.renumber_trips(feed);
        self.renumber_stops(feed);
        self.renumber_routes(feed);
        self.renumber_services(feed);
        self.renumber_shapes(feed);
        self.renumber_agencies(feed);
        self.renumber_fares(feed);
        self.renumber_pathways(feed);
        self.renumber_levels(feed);

        println!("done.");
    }
}

/// Formats `n` in the given base with digits 0-9a-z
fn to_base(mut n: u64, base: u32) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = Vec::new();
    loop {
        out.push(DIGITS[(n % base as u64) as usize]);
        n /= base as u64;
        if n == 0 {
            break;
        }
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ascii")
}

impl IdMinimizer {
    /// The renumbering map for one table: dense ids counting from 1, or,
    /// for kept tables, only the `N#` prefix restorations
    fn id_mapping<'a, I>(&self, ids: I, keep: bool) -> FxHashMap<String, String>
    where
        I: Iterator<Item = &'a String>,
    {
        let mut mapping = FxHashMap::default();

        if !keep {
            let mut counter = 1u64;
            let mut ids: Vec<&String> = ids.collect();
            ids.sort();
            for id in ids {
                mapping.insert(id.clone(), to_base(counter, self.base));
                counter += 1;
            }
            return mapping;
        }

        // kept table: restore ids that carry a feed-concatenation prefix,
        // when the plain id is not taken
        let ids: Vec<&String> = ids.collect();
        let taken: std::collections::HashSet<&str> = ids.iter().map(|s| s.as_str()).collect();
        for id in ids {
            if let Some(stripped) = strip_feed_prefix(id) {
                if !taken.contains(stripped) && !mapping.values().any(|v| v == stripped) {
                    mapping.insert(id.clone(), stripped.to_string());
                }
            }
        }
        mapping
    }

    fn renumber_trips(&self, feed: &mut Feed) {
        let mapping = self.id_mapping(feed.trips.keys(), self.keep.trips);
        if mapping.is_empty() {
            return;
        }

        let trips = std::mem::take(&mut feed.trips);
        feed.trips = trips
            .into_iter()
            .map(|(id, mut trip)| {
                let new_id = mapping.get(&id).cloned().unwrap_or(id);
                trip.id = new_id.clone();
                (new_id, trip)
            })
            .collect();

        rewrite_transfer_keys(feed, |k| {
            rekey_opt(&mut k.from_trip_id, &mapping);
            rekey_opt(&mut k.to_trip_id, &mapping);
        });
        rewrite_attributions(feed, |attr| rekey_opt(&mut attr.trip_id, &mapping));

        for col in feed.extra.trips.values_mut() {
            rekey_columns(col, &mapping);
        }
        for col in feed.extra.stop_times.values_mut() {
            let old = std::mem::take(col);
            *col = old
                .into_iter()
                .map(|((trip_id, seq), v)| {
                    let trip_id = mapping.get(&trip_id).cloned().unwrap_or(trip_id);
                    ((trip_id, seq), v)
                })
                .collect();
        }
    }

    fn renumber_stops(&self, feed: &mut Feed) {
        let mapping = self.id_mapping(feed.stops.keys(), self.keep.stops);
        if mapping.is_empty() {
            return;
        }

        let stops = std::mem::take(&mut feed.stops);
        feed.stops = stops
            .into_iter()
            .map(|(id, mut stop)| {
                let new_id = mapping.get(&id).cloned().unwrap_or(id);
                stop.id = new_id.clone();
                (new_id, stop)
            })
            .collect();

        for stop in feed.stops.values_mut() {
            rekey_opt(&mut stop.parent_station, &mapping);
        }
        for trip in feed.trips.values_mut() {
            for st in &mut trip.stop_times {
                if let Some(new) = mapping.get(&st.stop_id) {
                    st.stop_id = new.clone();
                }
            }
        }
        rewrite_transfer_keys(feed, |k| {
            if let Some(new) = mapping.get(&k.from_stop_id) {
                k.from_stop_id = new.clone();
            }
            if let Some(new) = mapping.get(&k.to_stop_id) {
                k.to_stop_id = new.clone();
            }
        });
        for pathway in feed.pathways.values_mut() {
            if let Some(new) = mapping.get(&pathway.from_stop_id) {
                pathway.from_stop_id = new.clone();
            }
            if let Some(new) = mapping.get(&pathway.to_stop_id) {
                pathway.to_stop_id = new.clone();
            }
        }

        for col in feed.extra.stops.values_mut() {
            rekey_columns(col, &mapping);
        }
    }

    fn renumber_routes(&self, feed: &mut Feed) {
        let mapping = self.id_mapping(feed.routes.keys(), self.keep.routes);
        if mapping.is_empty() {
            return;
        }

        let routes = std::mem::take(&mut feed.routes);
        feed.routes = routes
            .into_iter()
            .map(|(id, mut route)| {
                let new_id = mapping.get(&id).cloned().unwrap_or(id);
                route.id = new_id.clone();
                (new_id, route)
            })
            .collect();

        for trip in feed.trips.values_mut() {
            if let Some(new) = mapping.get(&trip.route_id) {
                trip.route_id = new.clone();
            }
        }
        for fare in feed.fare_attributes.values_mut() {
            for rule in &mut fare.rules {
                rekey_opt(&mut rule.route_id, &mapping);
            }
        }
        rewrite_transfer_keys(feed, |k| {
            rekey_opt(&mut k.from_route_id, &mapping);
            rekey_opt(&mut k.to_route_id, &mapping);
        });
        rewrite_attributions(feed, |attr| rekey_opt(&mut attr.route_id, &mapping));

        for col in feed.extra.routes.values_mut() {
            rekey_columns(col, &mapping);
        }
    }

    fn renumber_services(&self, feed: &mut Feed) {
        let mapping = self.id_mapping(feed.services.keys(), self.keep.services);
        if mapping.is_empty() {
            return;
        }

        let services = std::mem::take(&mut feed.services);
        feed.services = services
            .into_iter()
            .map(|(id, mut service)| {
                let new_id = mapping.get(&id).cloned().unwrap_or(id);
                service.id = new_id.clone();
                (new_id, service)
            })
            .collect();

        for trip in feed.trips.values_mut() {
            if let Some(new) = mapping.get(&trip.service_id) {
                trip.service_id = new.clone();
            }
        }
    }

    fn renumber_shapes(&self, feed: &mut Feed) {
        let mapping = self.id_mapping(feed.shapes.keys(), self.keep.shapes);
        if mapping.is_empty() {
            return;
        }

        let shapes = std::mem::take(&mut feed.shapes);
        feed.shapes = shapes
            .into_iter()
            .map(|(id, mut shape)| {
                let new_id = mapping.get(&id).cloned().unwrap_or(id);
                shape.id = new_id.clone();
                (new_id, shape)
            })
            .collect();

        for trip in feed.trips.values_mut() {
            rekey_opt(&mut trip.shape_id, &mapping);
        }
        for col in feed.extra.shapes.values_mut() {
            rekey_columns(col, &mapping);
        }
    }

    fn renumber_agencies(&self, feed: &mut Feed) {
        // the anonymous agency of a single-agency feed keeps its empty id
        let mapping = self.id_mapping(
            feed.agencies.keys().filter(|id| !id.is_empty()),
            self.keep.agencies,
        );
        if mapping.is_empty() {
            return;
        }

        let agencies = std::mem::take(&mut feed.agencies);
        feed.agencies = agencies
            .into_iter()
            .map(|(id, mut agency)| {
                let new_id = mapping.get(&id).cloned().unwrap_or(id);
                if agency.id.is_some() {
                    agency.id = Some(new_id.clone());
                }
                (new_id, agency)
            })
            .collect();

        for route in feed.routes.values_mut() {
            rekey_opt(&mut route.agency_id, &mapping);
        }
        for fare in feed.fare_attributes.values_mut() {
            rekey_opt(&mut fare.agency_id, &mapping);
        }
        rewrite_attributions(feed, |attr| rekey_opt(&mut attr.agency_id, &mapping));
        for col in feed.extra.agencies.values_mut() {
            rekey_columns(col, &mapping);
        }
    }

    fn renumber_fares(&self, feed: &mut Feed) {
        let mapping = self.id_mapping(feed.fare_attributes.keys(), self.keep.fares);
        if mapping.is_empty() {
            return;
        }

        let fares = std::mem::take(&mut feed.fare_attributes);
        feed.fare_attributes = fares
            .into_iter()
            .map(|(id, mut fare)| {
                let new_id = mapping.get(&id).cloned().unwrap_or(id);
                fare.id = new_id.clone();
                for rule in &mut fare.rules {
                    rule.fare_id = new_id.clone();
                }
                (new_id, fare)
            })
            .collect();

        for col in feed.extra.fare_attributes.values_mut() {
            rekey_columns(col, &mapping);
        }
    }

    fn renumber_pathways(&self, feed: &mut Feed) {
        let mapping = self.id_mapping(feed.pathways.keys(), self.keep.pathways);
        if mapping.is_empty() {
            return;
        }

        let pathways = std::mem::take(&mut feed.pathways);
        feed.pathways = pathways
            .into_iter()
            .map(|(id, mut pathway)| {
                let new_id = mapping.get(&id).cloned().unwrap_or(id);
                pathway.id = new_id.clone();
                (new_id, pathway)
            })
            .collect();

        for col in feed.extra.pathways.values_mut() {
            rekey_columns(col, &mapping);
        }
    }

    fn renumber_levels(&self, feed: &mut Feed) {
        let mapping = self.id_mapping(feed.levels.keys(), self.keep.levels);
        if mapping.is_empty() {
            return;
        }

        let levels = std::mem::take(&mut feed.levels);
        feed.levels = levels
            .into_iter()
            .map(|(id, mut level)| {
                let new_id = mapping.get(&id).cloned().unwrap_or(id);
                level.id = new_id.clone();
                (new_id, level)
            })
            .collect();

        for stop in feed.stops.values_mut() {
            rekey_opt(&mut stop.level_id, &mapping);
        }
        for col in feed.extra.levels.values_mut() {
            rekey_columns(col, &mapping);
        }
    }
}

/// The unprefixed part of an id of the form `N#rest`
fn strip_feed_prefix(id: &str) -> Option<&str> {
    let (prefix, rest) = id.split_once('#')?;
    if !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_digit()) && !rest.is_empty() {
        Some(rest)
    } else {
        None
    }
}

fn rekey_opt(field: &mut Option<String>, mapping: &FxHashMap<String, String>) {
    if let Some(v) = field {
        if let Some(new) = mapping.get(v) {
            *field = Some(new.clone());
        }
    }
}

fn rekey_columns(col: &mut std::collections::HashMap<String, String>, mapping: &FxHashMap<String, String>) {
    let old = std::mem::take(col);
    *col = old
        .into_iter()
        .map(|(id, v)| (mapping.get(&id).cloned().unwrap_or(id), v))
        .collect();
}

fn rewrite_transfer_keys<F: Fn(&mut TransferKey)>(feed: &mut Feed, rewrite: F) {
    let transfers = std::mem::take(&mut feed.transfers);
    feed.transfers = transfers
        .into_iter()
        .map(|(mut k, v)| {
            rewrite(&mut k);
            (k, v)
        })
        .collect();
}

/// Applies `rewrite` to every attribution row, wherever it is owned; the
/// rows carry their owner's id and must follow every renaming
fn rewrite_attributions<F: FnMut(&mut Attribution)>(feed: &mut Feed, mut rewrite: F) {
    for attr in &mut feed.attributions {
        rewrite(attr);
    }
    for agency in feed.agencies.values_mut() {
        for attr in &mut agency.attributions {
            rewrite(attr);
        }
    }
    for route in feed.routes.values_mut() {
        for attr in &mut route.attributions {
            rewrite(attr);
        }
    }
    for trip in feed.trips.values_mut() {
        for attr in &mut trip.attributions {
            rewrite(attr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;

    fn sample_feed() -> Feed {
        let mut feed = Feed::new();
        feed.stops.insert("stop:alpha".into(), stop("stop:alpha", 1.0, 1.0));
        feed.stops.insert("stop:beta".into(), stop("stop:beta", 1.1, 1.1));
        feed.routes.insert("route-77".into(), route("route-77"));
        feed.services.insert(
            "winter".into(),
            daily_service("winter", date(2020, 1, 1), date(2020, 3, 31)),
        );
        let mut t = trip(
            "trip-4711",
            "route-77",
            "winter",
            vec![
                stop_time("stop:alpha", 0, 28800, 28800),
                stop_time("stop:beta", 1, 29400, 29400),
            ],
        );
        t.attributions.push(Attribution {
            trip_id: Some("trip-4711".into()),
            organization_name: "Operator GmbH".into(),
            ..Default::default()
        });
        feed.trips.insert("trip-4711".into(), t);
        feed.extra
            .trips
            .entry("operator_note".into())
            .or_default()
            .insert("trip-4711".into(), "spare vehicle".into());
        feed
    }

    #[test]
    fn renumbers_densely_and_rewrites_references() {
        let mut feed = sample_feed();
        IdMinimizer {
            base: 10,
            keep: KeepIds::default(),
        }
        .run(&mut feed);

        assert_eq!(feed.trips.len(), 1);
        let trip = feed.trips.values().next().unwrap();
        assert_eq!(trip.id, "1");
        assert_eq!(trip.route_id, "1");
        assert_eq!(trip.service_id, "1");
        let stop_ids: Vec<&str> = trip.stop_times.iter().map(|st| st.stop_id.as_str()).collect();
        assert_eq!(stop_ids, vec!["1", "2"]);
        // the attribution row names its renumbered owner
        assert_eq!(trip.attributions[0].trip_id.as_deref(), Some("1"));
        feed.check_references().unwrap();

        // additional columns moved with the trip
        assert_eq!(
            feed.extra.trips["operator_note"].get("1"),
            Some(&"spare vehicle".to_string())
        );
    }

    #[test]
    fn base36_produces_dense_character_ids() {
        let mut feed = Feed::new();
        for i in 0..40 {
            let id = format!("stop{}", i);
            feed.stops.insert(id.clone(), stop(&id, 1.0, 1.0));
        }
        IdMinimizer {
            base: 36,
            keep: KeepIds::default(),
        }
        .run(&mut feed);

        assert!(feed.stops.contains_key("1"));
        assert!(feed.stops.contains_key("z"));
        assert!(feed.stops.contains_key("11")); // 37 in base 36
        assert_eq!(feed.stops.len(), 40);
    }

    #[test]
    fn kept_tables_only_lose_their_concatenation_prefix() {
        let mut feed = sample_feed();
        feed.stops.insert("0#platform".into(), stop("0#platform", 2.0, 2.0));
        feed.trips.get_mut("trip-4711").unwrap().stop_times[0].stop_id = "0#platform".into();

        let keep = KeepIds {
            stops: true,
            ..Default::default()
        };
        IdMinimizer { base: 10, keep }.run(&mut feed);

        assert!(feed.stops.contains_key("platform"));
        assert!(feed.stops.contains_key("stop:alpha"));
        let trip = feed.trips.values().next().unwrap();
        assert_eq!(trip.stop_times[0].stop_id, "platform");
        feed.check_references().unwrap();
    }

    #[test]
    fn to_base_formats_like_the_standard_radix() {
        assert_eq!(to_base(1, 10), "1");
        assert_eq!(to_base(255, 10), "255");
        assert_eq!(to_base(35, 36), "z");
        assert_eq!(to_base(36, 36), "10");
    }
}
