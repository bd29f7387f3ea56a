use gtfs_feed::{Availability, Feed, LocationType, Stop, Transfer, TransferKey};
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::geo;
use crate::grid::Grid;

use super::{pct, Processor};

/// Hierarchically merges station clusters to unify platforms of the same
/// logical station. Similarity is the product of a distance score and a
/// tf-idf cosine similarity of the tokenized stop names; merging is driven
/// by a max-heap over each cluster's best neighbor and stops below 0.5
pub struct StopReclusterer {
    /// Distance scale of the geometric score, in meters
    pub dist_threshold: f64,
    /// Cosine similarity at which two names start counting as similar
    pub name_threshold: f64,
}

/// A cluster holds stations as parent candidates and their platform-like
/// members
#[derive(Default, Clone)]
struct StopCluster {
    parents: Vec<String>,
    children: Vec<String>,
}

struct HeapEntry {
    simi: f64,
    cluster: usize,
    version: u64,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.simi == other.simi
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.simi.total_cmp(&other.simi)
    }
}

impl Processor for StopReclusterer {
    fn run(&self, feed: &mut Feed) {
        print!("Reclustering stops... ");

        let mut clusters = build_initial_clusters(feed);
        let total = clusters.len();

        let scores = NameScores::build(feed);

        // mercator positions; children without coordinates borrow their
        // parent's, per the reference-guaranteed hierarchy
        let positions: FxHashMap<String, (f64, f64)> = feed
            .stops
            .values()
            .filter_map(|s| stop_lat_lon(feed, s).map(|(lat, lon)| (s.id.clone(), geo::web_mercator(lat, lon))))
            .collect();

        // the grid search radius allows for mercator distortion
        let search_radius = self.dist_threshold * 10.0;
        let points: Vec<(f64, f64)> = positions.values().copied().collect();
        let mut grid: Grid<usize> = Grid::new(&points, search_radius);
        for (cid, cluster) in clusters.iter().enumerate() {
            for member in cluster.parents.iter().chain(&cluster.children) {
                if let Some(&(x, y)) = positions.get(member) {
                    grid.add_point(x, y, cid);
                }
            }
        }

        let mut alive: Vec<bool> = vec![true; clusters.len()];
        let mut version: Vec<u64> = vec![0; clusters.len()];
        // per cluster, neighbors sorted ascending by similarity
        let mut neighbors: Vec<Vec<(usize, f64)>> = Vec::with_capacity(clusters.len());

        for cid in 0..clusters.len() {
            let neighs = self.neighbor_candidates(feed, &clusters, &positions, &grid, cid, search_radius, &scores);
            neighbors.push(neighs);
        }

        let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::new();
        for (cid, neighs) in neighbors.iter().enumerate() {
            heap.push(HeapEntry {
                simi: neighs.last().map_or(0.0, |n| n.1),
                cluster: cid,
                version: 0,
            });
        }

        while let Some(top) = heap.pop() {
            if !alive[top.cluster] || top.version != version[top.cluster] {
                // stale entry of a merged or updated cluster
                continue;
            }
            if top.simi < 0.5 {
                break;
            }

            // drop neighbors that were merged away in the meantime
            while neighbors[top.cluster]
                .last()
                .map_or(false, |&(nid, _)| !alive[nid])
            {
                neighbors[top.cluster].pop();
            }
            let Some(&(winner, best_simi)) = neighbors[top.cluster].last() else {
                continue;
            };
            if best_simi != top.simi {
                // best neighbor changed, re-queue with the fresh priority
                version[top.cluster] += 1;
                heap.push(HeapEntry {
                    simi: best_simi,
                    cluster: top.cluster,
                    version: version[top.cluster],
                });
                continue;
            }

            // absorb the popped cluster into its best neighbor
            let absorbed = std::mem::take(&mut clusters[top.cluster]);
            clusters[winner].parents.extend(absorbed.parents);
            clusters[winner].children.extend(absorbed.children);
            alive[top.cluster] = false;

            // the winner's neighbors see a changed cluster; refresh their
            // similarity to it and their heap priority
            let affected: Vec<usize> = neighbors[winner].iter().map(|&(n, _)| n).collect();
            for nid in affected {
                if !alive[nid] {
                    continue;
                }
                let new_simi = self.cluster_similarity(feed, &clusters[nid], &clusters[winner], &positions, &scores);
                if let Some(entry) = neighbors[nid].iter_mut().find(|(n, _)| *n == winner) {
                    entry.1 = new_simi;
                }
                neighbors[nid].sort_by(|a, b| a.1.total_cmp(&b.1));
                version[nid] += 1;
                heap.push(HeapEntry {
                    simi: neighbors[nid].last().map_or(0.0, |n| n.1),
                    cluster: nid,
                    version: version[nid],
                });
            }

            neighbors[winner] =
                self.neighbor_candidates(feed, &clusters, &positions, &grid, winner, search_radius, &scores);
            version[winner] += 1;
            heap.push(HeapEntry {
                simi: neighbors[winner].last().map_or(0.0, |n| n.1),
                cluster: winner,
                version: version[winner],
            });
        }

        let mut remaining = 0usize;
        for cid in 0..clusters.len() {
            if !alive[cid] || (clusters[cid].parents.is_empty() && clusters[cid].children.is_empty()) {
                continue;
            }
            remaining += 1;
            if clusters[cid].parents.is_empty() && clusters[cid].children.len() == 1 {
                continue;
            }
            let cluster = clusters[cid].clone();
            self.write_cluster(feed, &cluster, &positions, &scores);
        }

        println!(
            "done. (-{} clusters [-{:.2}%])",
            total - remaining,
            pct(total, remaining)
        );
    }
}

impl StopReclusterer {
    #[allow(clippy::too_many_arguments)]
    fn neighbor_candidates(
        &self,
        feed: &Feed,
        clusters: &[StopCluster],
        positions: &FxHashMap<String, (f64, f64)>,
        grid: &Grid<usize>,
        cid: usize,
        radius: f64,
        scores: &NameScores,
    ) -> Vec<(usize, f64)> {
        let mut found: FxHashSet<usize> = FxHashSet::default();
        for member in clusters[cid].parents.iter().chain(&clusters[cid].children) {
            if let Some(&(x, y)) = positions.get(member) {
                for n in grid.neighbors(x, y, radius) {
                    if n != cid {
                        found.insert(n);
                    }
                }
            }
        }

        let mut ret: Vec<(usize, f64)> = found
            .into_iter()
            .filter(|&n| !clusters[n].parents.is_empty() || !clusters[n].children.is_empty())
            .map(|n| {
                (
                    n,
                    self.cluster_similarity(feed, &clusters[cid], &clusters[n], positions, scores),
                )
            })
            .collect();
        ret.sort_by(|a, b| a.1.total_cmp(&b.1));
        ret
    }

    /// Average pairwise member similarity between two clusters
    fn cluster_similarity(
        &self,
        feed: &Feed,
        a: &StopCluster,
        b: &StopCluster,
        positions: &FxHashMap<String, (f64, f64)>,
        scores: &NameScores,
    ) -> f64 {
        let mut sum = 0.0;
        let mut count = 0usize;
        for sa in a.parents.iter().chain(&a.children) {
            for sb in b.parents.iter().chain(&b.children) {
                sum += self.stop_similarity(feed, sa, sb, positions, scores);
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    fn stop_similarity(
        &self,
        feed: &Feed,
        a: &str,
        b: &str,
        positions: &FxHashMap<String, (f64, f64)>,
        scores: &NameScores,
    ) -> f64 {
        let d = match (positions.get(a), positions.get(b)) {
            (Some(&(ax, ay)), Some(&(bx, by))) => geo::dist(ax, ay, bx, by),
            _ => return 0.0,
        };
        let geo_simi = 0.5 - 0.5 * ((d - self.dist_threshold) / (self.dist_threshold * 0.25)).tanh();

        let (Some(vec_a), Some(vec_b)) = (scores.vector(a), scores.vector(b)) else {
            return geo_simi;
        };

        let mut name_simi = cosine(vec_a, vec_b);
        if name_simi > self.name_threshold {
            name_simi = 0.5 + (name_simi - self.name_threshold) / (2.0 * (1.0 - self.name_threshold));
        } else {
            name_simi /= 2.0 * self.name_threshold;
        }

        geo_simi * name_simi
    }

    /// Resolves a finished cluster back into the stop hierarchy: one
    /// station keeps its role, the best-matching of several wins, none at
    /// all synthesizes a parent at the member centroid
    fn write_cluster(
        &self,
        feed: &mut Feed,
        cluster: &StopCluster,
        positions: &FxHashMap<String, (f64, f64)>,
        scores: &NameScores,
    ) {
        let parent_id = if cluster.parents.is_empty() && cluster.children.len() > 1 {
            create_parent(feed, &cluster.children)
        } else if cluster.parents.len() == 1 {
            cluster.parents[0].clone()
        } else {
            let mut best: Option<(f64, &String)> = None;
            for p in &cluster.parents {
                let total: f64 = cluster
                    .children
                    .iter()
                    .map(|c| self.stop_similarity(feed, p, c, positions, scores))
                    .sum();
                let avg = total / cluster.children.len().max(1) as f64;
                if best.map_or(true, |(b, _)| avg >= b) {
                    best = Some((avg, p));
                }
            }
            match best {
                Some((_, p)) => p.clone(),
                None => return,
            }
        };

        for child in &cluster.children {
            if let Some(stop) = feed.stops.get_mut(child) {
                if matches!(
                    stop.location_type,
                    LocationType::StopPoint | LocationType::Entrance | LocationType::GenericNode
                ) {
                    stop.parent_station = Some(parent_id.clone());
                }
            }
        }

        for loser in &cluster.parents {
            if *loser == parent_id {
                continue;
            }

            let transfers = std::mem::take(&mut feed.transfers);
            let mut rewritten: std::collections::HashMap<TransferKey, Transfer> =
                std::collections::HashMap::default();
            for (mut key, value) in transfers {
                if key.from_stop_id == *loser {
                    key.from_stop_id = parent_id.clone();
                }
                if key.to_stop_id == *loser {
                    key.to_stop_id = parent_id.clone();
                }
                rewritten.entry(key).or_insert(value);
            }
            feed.transfers = rewritten;

            for pathway in feed.pathways.values_mut() {
                if pathway.from_stop_id == *loser {
                    pathway.from_stop_id = parent_id.clone();
                }
                if pathway.to_stop_id == *loser {
                    pathway.to_stop_id = parent_id.clone();
                }
            }

            feed.stops.remove(loser);
        }
    }
}

/// Initial clusters: one per station with its platform-like children, one
/// per unparented stop. Boarding areas follow their platform's cluster
fn build_initial_clusters(feed: &Feed) -> Vec<StopCluster> {
    let mut clusters: Vec<StopCluster> = Vec::new();
    let mut parent_cluster: FxHashMap<&str, usize> = FxHashMap::default();
    let mut child_cluster: FxHashMap<&str, usize> = FxHashMap::default();

    for stop in feed.stops.values() {
        if stop.location_type == LocationType::Station {
            clusters.push(StopCluster {
                parents: vec![stop.id.clone()],
                children: Vec::new(),
            });
            parent_cluster.insert(&stop.id, clusters.len() - 1);
        }
    }

    for stop in feed.stops.values() {
        if matches!(
            stop.location_type,
            LocationType::StopPoint | LocationType::Entrance | LocationType::GenericNode
        ) {
            match stop.parent_station.as_deref().and_then(|p| parent_cluster.get(p)) {
                Some(&cid) => {
                    clusters[cid].children.push(stop.id.clone());
                    child_cluster.insert(&stop.id, cid);
                }
                None => {
                    clusters.push(StopCluster {
                        parents: Vec::new(),
                        children: vec![stop.id.clone()],
                    });
                    child_cluster.insert(&stop.id, clusters.len() - 1);
                }
            }
        }
    }

    for stop in feed.stops.values() {
        if stop.location_type != LocationType::BoardingArea {
            continue;
        }
        let cid = stop
            .parent_station
            .as_deref()
            .and_then(|platform| {
                feed.stops
                    .get(platform)
                    .and_then(|p| p.parent_station.as_deref())
                    .and_then(|station| parent_cluster.get(station).copied())
                    .or_else(|| child_cluster.get(platform).copied())
            });
        match cid {
            Some(cid) => clusters[cid].children.push(stop.id.clone()),
            None => clusters.push(StopCluster {
                parents: Vec::new(),
                children: vec![stop.id.clone()],
            }),
        }
    }

    clusters
}

fn stop_lat_lon(feed: &Feed, stop: &Stop) -> Option<(f64, f64)> {
    if let (Some(lat), Some(lon)) = (stop.latitude, stop.longitude) {
        return Some((lat, lon));
    }
    let parent = feed.stops.get(stop.parent_station.as_deref()?)?;
    match (parent.latitude, parent.longitude) {
        (Some(lat), Some(lon)) => Some((lat, lon)),
        _ => panic!("could not find a coordinate for stop {}", stop.id),
    }
}

/// Synthesizes a station at the centroid of the members, merging the
/// attributes they agree on
fn create_parent(feed: &mut Feed, members: &[String]) -> String {
    let mut avg_lat = 0.0;
    let mut avg_lon = 0.0;
    let mut count = 0usize;

    let mut wheelchair = Availability::InformationNotAvailable;
    let mut url: Option<String> = None;
    let mut timezone: Option<String> = None;

    for (i, id) in members.iter().enumerate() {
        let stop = &feed.stops[id];
        if let (Some(lat), Some(lon)) = (stop.latitude, stop.longitude) {
            avg_lat += lat;
            avg_lon += lon;
            count += 1;
        }

        if wheelchair == Availability::InformationNotAvailable {
            wheelchair = stop.wheelchair_boarding;
        } else if stop.wheelchair_boarding != Availability::InformationNotAvailable
            && stop.wheelchair_boarding != wheelchair
        {
            wheelchair = Availability::InformationNotAvailable;
        }

        if i == 0 {
            url = stop.url.clone();
            timezone = stop.timezone.clone();
        } else {
            if url.is_some() && stop.url != url {
                url = None;
            }
            if timezone.is_some() && stop.timezone != timezone {
                timezone = None;
            }
        }
    }

    let mut id = format!("par::{}", members[0]);
    let mut attempt = 1;
    while feed.stops.contains_key(&id) {
        id = format!("par{}::{}", attempt, members[0]);
        attempt += 1;
    }

    let parent = Stop {
        id: id.clone(),
        name: feed.stops[&members[0]].name.clone(),
        latitude: (count > 0).then(|| avg_lat / count as f64),
        longitude: (count > 0).then(|| avg_lon / count as f64),
        location_type: LocationType::Station,
        wheelchair_boarding: wheelchair,
        url,
        timezone,
        ..Default::default()
    };
    feed.stops.insert(id.clone(), parent);
    id
}

/// tf-idf vectors over the tokenized upper-cased stop names
struct NameScores {
    vectors: FxHashMap<String, FxHashMap<usize, f64>>,
}

impl NameScores {
    fn build(feed: &Feed) -> NameScores {
        let splitter = Regex::new(r"[^\p{L}]+").unwrap();

        let mut word_ids: FxHashMap<String, usize> = FxHashMap::default();
        let mut df: Vec<f64> = Vec::new();

        let mut tokenized: FxHashMap<String, FxHashMap<usize, f64>> = FxHashMap::default();

        for stop in feed.stops.values() {
            let mut counts: FxHashMap<usize, f64> = FxHashMap::default();
            for token in splitter.split(&stop.name.to_uppercase()) {
                if token.is_empty() {
                    continue;
                }
                let next_id = word_ids.len();
                let id = *word_ids.entry(token.to_string()).or_insert(next_id);
                if id == df.len() {
                    df.push(0.0);
                }
                *counts.entry(id).or_insert(0.0) += 1.0;
            }
            for &id in counts.keys() {
                df[id] += 1.0;
            }
            tokenized.insert(stop.id.clone(), counts);
        }

        let n = feed.stops.len() as f64;
        let idf: Vec<f64> = df.iter().map(|&d| (n / d).ln()).collect();

        let vectors = tokenized
            .into_iter()
            .map(|(id, counts)| {
                let v = counts
                    .into_iter()
                    .map(|(word, count)| (word, count * idf[word]))
                    .collect();
                (id, v)
            })
            .collect();

        NameScores { vectors }
    }

    fn vector(&self, stop_id: &str) -> Option<&FxHashMap<usize, f64>> {
        self.vectors.get(stop_id).filter(|v| !v.is_empty())
    }
}

fn cosine(a: &FxHashMap<usize, f64>, b: &FxHashMap<usize, f64>) -> f64 {
    let mut dot = 0.0;
    for (word, va) in a {
        if let Some(vb) = b.get(word) {
            dot += va * vb;
        }
    }
    let norm_a: f64 = a.values().map(|v| v * v).sum::<f64>().sqrt();
    let norm_b: f64 = b.values().map(|v| v * v).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;

    fn recluster() -> StopReclusterer {
        StopReclusterer {
            dist_threshold: 75.0,
            name_threshold: 0.55,
        }
    }

    fn named(mut s: Stop, name: &str) -> Stop {
        s.name = name.to_string();
        s
    }

    #[test]
    fn two_stations_with_equal_names_nearby_unify() {
        let mut feed = Feed::new();
        feed.stops.insert(
            "st1".into(),
            named(station("st1", 48.0, 7.8), "Hauptbahnhof"),
        );
        // ~20 m east
        feed.stops.insert(
            "st2".into(),
            named(station("st2", 48.0, 7.80027), "Hauptbahnhof"),
        );
        let mut p1 = named(stop("p1", 48.0, 7.8), "Hauptbahnhof");
        p1.parent_station = Some("st1".into());
        let mut p2 = named(stop("p2", 48.0, 7.80027), "Hauptbahnhof");
        p2.parent_station = Some("st2".into());
        feed.stops.insert("p1".into(), p1);
        feed.stops.insert("p2".into(), p2);

        recluster().run(&mut feed);

        // one station absorbed the other; both platforms hang below it
        let stations: Vec<&Stop> = feed
            .stops
            .values()
            .filter(|s| s.location_type == LocationType::Station)
            .collect();
        assert_eq!(stations.len(), 1);
        let station_id = stations[0].id.clone();
        assert_eq!(
            feed.stops["p1"].parent_station.as_deref(),
            Some(station_id.as_str())
        );
        assert_eq!(
            feed.stops["p2"].parent_station.as_deref(),
            Some(station_id.as_str())
        );
        feed.check_references().unwrap();
    }

    #[test]
    fn distant_or_differently_named_stations_stay_apart() {
        let mut feed = Feed::new();
        feed.stops.insert(
            "st1".into(),
            named(station("st1", 48.0, 7.8), "Hauptbahnhof"),
        );
        // same name but ~2 km away
        feed.stops.insert(
            "st2".into(),
            named(station("st2", 48.0, 7.827), "Hauptbahnhof"),
        );
        // nearby but a completely different name
        feed.stops.insert(
            "st3".into(),
            named(station("st3", 48.0, 7.80013), "Messe Ost"),
        );

        recluster().run(&mut feed);
        assert_eq!(feed.stops.len(), 3);
    }

    #[test]
    fn parentless_platforms_get_a_synthesized_station() {
        let mut feed = Feed::new();
        feed.stops.insert(
            "a".into(),
            named(stop("a", 48.0, 7.8), "Rathaus"),
        );
        feed.stops.insert(
            "b".into(),
            named(stop("b", 48.0, 7.80007), "Rathaus"),
        );

        recluster().run(&mut feed);

        let parent = feed
            .stops
            .values()
            .find(|s| s.location_type == LocationType::Station)
            .expect("a parent was synthesized");
        assert!(parent.id.starts_with("par::"));
        assert_eq!(feed.stops["a"].parent_station.as_deref(), Some(parent.id.as_str()));
        assert_eq!(feed.stops["b"].parent_station.as_deref(), Some(parent.id.as_str()));
        // centroid of the two members
        assert!((parent.longitude.unwrap() - 7.800035).abs() < 1e-6);
        feed.check_references().unwrap();
    }
}
