use gtfs_feed::{extra_fields_equal, FareRule, Feed, Route};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use std::hash::{Hash, Hasher};

use super::{pct, prefer_reference_id, Processor};

/// Merges routes that are equal in every attribute and, row for row, in
/// every fare rule referencing them
pub struct RouteDuplicateRemover {}

impl Processor for RouteDuplicateRemover {
    fn run(&self, feed: &mut Feed) {
        print!("Removing redundant routes... ");
        let before = feed.routes.len();

        let mut trips_by_route: FxHashMap<String, Vec<String>> = FxHashMap::default();
        for (id, trip) in &feed.trips {
            trips_by_route
                .entry(trip.route_id.clone())
                .or_default()
                .push(id.clone());
        }

        // buckets of equally hashed routes partition the search
        let mut buckets: FxHashMap<u64, Vec<String>> = FxHashMap::default();
        for route in feed.routes.values() {
            buckets.entry(route_hash(route)).or_default().push(route.id.clone());
        }

        let mut processed: FxHashSet<String> = FxHashSet::default();
        let route_ids: Vec<String> = feed.routes.keys().cloned().collect();

        for id in &route_ids {
            if processed.contains(id) || !feed.routes.contains_key(id) {
                continue;
            }
            let route = &feed.routes[id];
            let bucket = &buckets[&route_hash(route)];

            let mut eq: Vec<String> = bucket
                .par_iter()
                .filter(|other| {
                    *other != id
                        && feed.routes.contains_key(*other)
                        && routes_equal(feed, route, &feed.routes[*other])
                        && fare_rules_equal(feed, id, other)
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
            combine_routes(feed, eq, &mut trips_by_route);
        }

        feed.clean_transfers();

        println!(
            "done. (-{} routes [-{:.2}%])",
            before - feed.routes.len(),
            pct(before, feed.routes.len())
        );
    }
}

fn route_hash(route: &Route) -> u64 {
    let mut h = FxHasher::default();
    route.agency_id.hash(&mut h);
    route.short_name.hash(&mut h);
    route.long_name.hash(&mut h);
    route.desc.hash(&mut h);
    route.route_type.hash(&mut h);
    (route.color.r, route.color.g, route.color.b).hash(&mut h);
    (route.text_color.r, route.text_color.g, route.text_color.b).hash(&mut h);
    h.finish()
}

fn routes_equal(feed: &Feed, a: &Route, b: &Route) -> bool {
    extra_fields_equal(&feed.extra.routes, &a.id, &b.id)
        && a.agency_id == b.agency_id
        && a.short_name == b.short_name
        && a.long_name == b.long_name
        && a.desc == b.desc
        && a.route_type == b.route_type
        && a.continuous_pickup == b.continuous_pickup
        && a.continuous_drop_off == b.continuous_drop_off
        && a.url == b.url
        && a.color == b.color
        && a.text_color == b.text_color
}

/// Every fare class that mentions either route must carry, one to one, the
/// same rule rows for both routes (multiset equality)
fn fare_rules_equal(feed: &Feed, a: &str, b: &str) -> bool {
    for fare in feed.fare_attributes.values() {
        if !fare
            .rules
            .iter()
            .any(|r| r.route_id.as_deref() == Some(a) || r.route_id.as_deref() == Some(b))
        {
            continue;
        }

        let mut rules_a: Vec<&FareRule> = Vec::new();
        let mut rules_b: Vec<&FareRule> = Vec::new();

        for rule in &fare.rules {
            if rule.route_id.as_deref() == Some(a) {
                // an equivalent unmatched b-rule cancels this one; if two
                // equivalent rules exist for a but only one for b, the
                // rules count as NOT equal, minimizing that is the job of
                // a separate fare-rule minimizer
                if let Some(pos) = rules_b.iter().position(|rb| zone_eq(rule, rb)) {
                    rules_b.remove(pos);
                } else {
                    rules_a.push(rule);
                }
            } else if rule.route_id.as_deref() == Some(b) {
                if let Some(pos) = rules_a.iter().position(|ra| zone_eq(rule, ra)) {
                    rules_a.remove(pos);
                } else {
                    rules_b.push(rule);
                }
            }
        }

        if !rules_a.is_empty() || !rules_b.is_empty() {
            return false;
        }
    }
    true
}

fn zone_eq(a: &FareRule, b: &FareRule) -> bool {
    a.origin_id == b.origin_id && a.destination_id == b.destination_id && a.contains_id == b.contains_id
}

fn combine_routes(
    feed: &mut Feed,
    routes: Vec<String>,
    trips_by_route: &mut FxHashMap<String, Vec<String>>,
) {
    let mut ref_id = routes[0].as_str();
    for id in &routes {
        ref_id = prefer_reference_id(ref_id, id);
    }
    let ref_id = ref_id.to_string();

    for id in &routes {
        if *id == ref_id {
            continue;
        }

        for trip_id in trips_by_route.remove(id).unwrap_or_default() {
            if let Some(trip) = feed.trips.get_mut(&trip_id) {
                if trip.route_id == *id {
                    trip.route_id = ref_id.clone();
                }
                trips_by_route
                    .entry(ref_id.clone())
                    .or_default()
                    .push(trip_id);
            }
        }

        let mut attributions = feed.routes.remove(id).map(|r| r.attributions).unwrap_or_default();
        // the rows keep naming their owner; re-point them at the survivor
        for attr in &mut attributions {
            attr.route_id = Some(ref_id.clone());
        }
        if let Some(ref_route) = feed.routes.get_mut(&ref_id) {
            ref_route.attributions.extend(attributions);
        }

        // the merged route's rules are duplicates of the reference's; a
        // fare class left without rules (but which had some) is deleted
        let mut doomed_fares = Vec::new();
        for (fare_id, fare) in feed.fare_attributes.iter_mut() {
            let had_rules = !fare.rules.is_empty();
            fare.rules.retain(|r| r.route_id.as_deref() != Some(id.as_str()));
            if had_rules && fare.rules.is_empty() {
                doomed_fares.push(fare_id.clone());
            }
        }
        for fare_id in doomed_fares {
            feed.fare_attributes.remove(&fare_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use gtfs_feed::FareAttribute;

    fn fare(id: &str, rules: Vec<FareRule>) -> FareAttribute {
        FareAttribute {
            id: id.to_string(),
            price: "2.00".to_string(),
            currency: "USD".to_string(),
            payment_method: Default::default(),
            transfers: Default::default(),
            agency_id: None,
            transfer_duration: None,
            rules,
        }
    }

    fn rule(fare_id: &str, route: &str) -> FareRule {
        FareRule {
            fare_id: fare_id.to_string(),
            route_id: Some(route.to_string()),
            ..Default::default()
        }
    }

    fn feed_with_three_equal_routes() -> Feed {
        let mut feed = Feed::new();
        feed.stops.insert("S".into(), stop("S", 1.0, 1.0));
        feed.services.insert(
            "SV".into(),
            daily_service("SV", date(2020, 1, 1), date(2020, 12, 31)),
        );
        for id in ["AB", "BFC", "CFC"] {
            feed.routes.insert(id.into(), route(id));
            feed.trips.insert(
                format!("t_{}", id),
                trip(&format!("t_{}", id), id, "SV", vec![stop_time("S", 0, 0, 0)]),
            );
        }
        feed
    }

    #[test]
    fn equal_routes_with_matching_fare_rules_collapse() {
        let mut feed = feed_with_three_equal_routes();
        feed.fare_attributes.insert(
            "p".into(),
            fare(
                "p",
                vec![rule("p", "AB"), rule("p", "BFC"), rule("p", "CFC")],
            ),
        );

        RouteDuplicateRemover {}.run(&mut feed);

        // all three were equal; one route remains and every trip and one
        // fare rule point at it
        assert_eq!(feed.routes.len(), 1);
        let survivor = feed.routes.keys().next().unwrap().clone();
        assert!(feed.trips.values().all(|t| t.route_id == survivor));
        let rules = &feed.fare_attributes["p"].rules;
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].route_id.as_deref(), Some(survivor.as_str()));
        feed.check_references().unwrap();
    }

    #[test]
    fn differing_fare_rules_prevent_the_merge() {
        let mut feed = feed_with_three_equal_routes();
        feed.fare_attributes.insert(
            "p".into(),
            fare("p", vec![rule("p", "AB"), rule("p", "BFC")]),
        );
        let mut odd = rule("q", "CFC");
        odd.origin_id = Some("zone1".into());
        feed.fare_attributes.insert("q".into(), fare("q", vec![odd]));

        RouteDuplicateRemover {}.run(&mut feed);

        // AB and BFC merge; CFC's fare situation differs and it stays
        assert_eq!(feed.routes.len(), 2);
        assert!(feed.routes.contains_key("CFC"));
    }

    #[test]
    fn attribute_differences_prevent_the_merge() {
        let mut feed = feed_with_three_equal_routes();
        feed.routes.get_mut("CFC").unwrap().short_name = "11".into();

        RouteDuplicateRemover {}.run(&mut feed);
        assert_eq!(feed.routes.len(), 2);
        assert!(feed.routes.contains_key("CFC"));
    }

    #[test]
    fn reference_prefers_structured_ids_and_keeps_attributions_closed() {
        let mut feed = Feed::new();
        feed.stops.insert("S".into(), stop("S", 1.0, 1.0));
        feed.services.insert(
            "SV".into(),
            daily_service("SV", date(2020, 1, 1), date(2020, 12, 31)),
        );
        for id in ["4711", "de:54564:345"] {
            let mut r = route(id);
            r.attributions.push(gtfs_feed::Attribution {
                route_id: Some(id.to_string()),
                organization_name: "Operator GmbH".into(),
                ..Default::default()
            });
            feed.routes.insert(id.into(), r);
            feed.trips.insert(
                format!("t_{}", id),
                trip(&format!("t_{}", id), id, "SV", vec![stop_time("S", 0, 0, 0)]),
            );
        }

        RouteDuplicateRemover {}.run(&mut feed);
        assert_eq!(feed.routes.len(), 1);
        assert!(feed.routes.contains_key("de:54564:345"));
        let survivor = &feed.routes["de:54564:345"];
        assert_eq!(survivor.attributions.len(), 2);
        assert!(survivor
            .attributions
            .iter()
            .all(|a| a.route_id.as_deref() == Some("de:54564:345")));
        feed.check_references().unwrap();
    }
}
