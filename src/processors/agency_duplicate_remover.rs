use gtfs_feed::{extra_fields_equal, Agency, Feed};
use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use std::hash::{Hash, Hasher};

use super::{pct, Processor};

/// Merges agencies whose attributes all match. Routes and fare attributes
/// are re-pointed at the surviving agency
pub struct AgencyDuplicateRemover {}

impl Processor for AgencyDuplicateRemover {
    fn run(&self, feed: &mut Feed) {
        print!("Removing redundant agencies... ");
        let before = feed.agencies.len();

        let mut buckets: FxHashMap<u64, Vec<String>> = FxHashMap::default();
        for (key, agency) in &feed.agencies {
            let mut h = FxHasher::default();
            agency.name.hash(&mut h);
            buckets.entry(h.finish()).or_default().push(key.clone());
        }

        let mut processed: FxHashSet<String> = FxHashSet::default();
        let keys: Vec<String> = feed.agencies.keys().cloned().collect();

        for key in &keys {
            if processed.contains(key) || !feed.agencies.contains_key(key) {
                continue;
            }
            let mut h = FxHasher::default();
            feed.agencies[key].name.hash(&mut h);

            let mut eq: Vec<String> = buckets[&h.finish()]
                .iter()
                .filter(|other| {
                    *other != key
                        && feed.agencies.contains_key(*other)
                        && agencies_equal(feed, &feed.agencies[key], &feed.agencies[*other])
                })
                .cloned()
                .collect();

            if eq.is_empty() {
                continue;
            }
            eq.push(key.clone());
            for e in &eq {
                processed.insert(e.clone());
            }
            combine_agencies(feed, eq);
        }

        println!(
            "done. (-{} agencies [-{:.2}%])",
            before - feed.agencies.len(),
            pct(before, feed.agencies.len())
        );
    }
}

fn agencies_equal(feed: &Feed, a: &Agency, b: &Agency) -> bool {
    extra_fields_equal(&feed.extra.agencies, a.id.as_deref().unwrap_or(""), b.id.as_deref().unwrap_or(""))
        && a.name == b.name
        && a.url == b.url
        && a.timezone == b.timezone
        && a.lang == b.lang
        && a.phone == b.phone
        && a.fare_url == b.fare_url
        && a.email == b.email
}

fn combine_agencies(feed: &mut Feed, agencies: Vec<String>) {
    // the shortest id wins
    let ref_key = agencies
        .iter()
        .min_by_key(|id| (id.len(), id.as_str()))
        .unwrap()
        .clone();
    let ref_id = feed.agencies[&ref_key].id.clone();

    for key in &agencies {
        if *key == ref_key {
            continue;
        }

        for route in feed.routes.values_mut() {
            if route.agency_id.as_deref() == Some(key.as_str()) {
                route.agency_id = ref_id.clone();
            }
        }
        for fare in feed.fare_attributes.values_mut() {
            if fare.agency_id.as_deref() == Some(key.as_str()) {
                fare.agency_id = ref_id.clone();
            }
        }

        let mut attributions = feed
            .agencies
            .remove(key)
            .map(|a| a.attributions)
            .unwrap_or_default();
        // the rows keep naming their owner; re-point them at the survivor
        for attr in &mut attributions {
            attr.agency_id = ref_id.clone();
        }
        if let Some(ref_agency) = feed.agencies.get_mut(&ref_key) {
            ref_agency.attributions.extend(attributions);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agency(id: &str, name: &str) -> Agency {
        Agency {
            id: Some(id.to_string()),
            name: name.to_string(),
            url: "http://example.com".to_string(),
            timezone: "Europe/Berlin".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn equal_agencies_collapse_onto_the_shortest_id() {
        let mut feed = Feed::new();
        let mut long = agency("AG-LONG", "Verkehrsbund");
        long.attributions.push(gtfs_feed::Attribution {
            agency_id: Some("AG-LONG".into()),
            organization_name: "Operator GmbH".into(),
            ..Default::default()
        });
        feed.agencies.insert("AG-LONG".into(), long);
        feed.agencies.insert("AG".into(), agency("AG", "Verkehrsbund"));
        let mut r = super::super::testutil::route("R");
        r.agency_id = Some("AG-LONG".into());
        feed.routes.insert("R".into(), r);

        AgencyDuplicateRemover {}.run(&mut feed);

        assert_eq!(feed.agencies.len(), 1);
        assert!(feed.agencies.contains_key("AG"));
        assert_eq!(feed.routes["R"].agency_id.as_deref(), Some("AG"));
        // the merged attribution follows its new owner
        let attrs = &feed.agencies["AG"].attributions;
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].agency_id.as_deref(), Some("AG"));
        feed.check_references().unwrap();
    }

    #[test]
    fn different_timezone_is_a_different_agency() {
        let mut feed = Feed::new();
        feed.agencies.insert("A".into(), agency("A", "Verkehrsbund"));
        let mut other = agency("B", "Verkehrsbund");
        other.timezone = "Europe/Paris".to_string();
        feed.agencies.insert("B".into(), other);

        AgencyDuplicateRemover {}.run(&mut feed);
        assert_eq!(feed.agencies.len(), 2);
    }
}
