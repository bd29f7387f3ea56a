use gtfs_feed::Feed;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::geo;
use crate::grid::Grid;

use super::{pct, Processor};

const SAMPLE_STEP: f64 = 10.0;
const SEGMENT_WINDOW: i64 = 20;
const GRID_CELL: f64 = 5_000.0;

/// Removes shapes that run within `max_eq_dist` of each other as curves.
/// The check samples the candidate every 10 m and snaps each sample onto
/// the other shape within a sliding segment window around the last match;
/// it is run in both directions. Trips of eliminated shapes are re-pointed
/// at the surviving one
pub struct ShapeDuplicateRemover {
    pub max_eq_dist: f64,
}

/// A shape projected to mercator, one entry per point: x, y and the
/// measurement (NaN when absent)
type MercShape = Vec<(f64, f64, f64)>;

impl Processor for ShapeDuplicateRemover {
    fn run(&self, feed: &mut Feed) {
        print!("Removing redundant shapes... ");
        let before = feed.shapes.len();

        let mercs: FxHashMap<String, MercShape> = feed
            .shapes
            .par_iter()
            .map(|(id, shape)| {
                let points = shape
                    .points
                    .iter()
                    .map(|p| {
                        let (x, y) = geo::web_mercator(p.lat, p.lon);
                        (x, y, p.dist_traveled.map_or(f64::NAN, |d| d as f64))
                    })
                    .collect();
                (id.clone(), points)
            })
            .collect();

        // the grid narrows candidate search to nearby shapes
        let all_points: Vec<(f64, f64)> = mercs
            .values()
            .flat_map(|m| m.iter().map(|&(x, y, _)| (x, y)))
            .collect();
        let mut grid: Grid<u32> = Grid::new(&all_points, GRID_CELL);
        let mut idx_to_id: Vec<String> = Vec::with_capacity(mercs.len());
        for (id, merc) in &mercs {
            let handle = idx_to_id.len() as u32;
            idx_to_id.push(id.clone());
            for w in merc.windows(2) {
                grid.add_segment(w[0].0, w[0].1, w[1].0, w[1].1, handle);
            }
        }

        let mut trips_by_shape: FxHashMap<String, Vec<String>> = FxHashMap::default();
        for (id, trip) in &feed.trips {
            if let Some(shape_id) = &trip.shape_id {
                trips_by_shape
                    .entry(shape_id.clone())
                    .or_default()
                    .push(id.clone());
            }
        }

        let shape_ids: Vec<String> = feed.shapes.keys().cloned().collect();
        for id in &shape_ids {
            if !feed.shapes.contains_key(id) {
                continue;
            }
            let merc = &mercs[id];
            if merc.len() < 2 {
                continue;
            }

            // probe around the middle of the shape
            let mid = merc[(merc.len() - 1) / 2];
            let candidates = grid.neighbors(mid.0, mid.1, self.max_eq_dist + GRID_CELL);

            let mut eq: Vec<String> = candidates
                .into_par_iter()
                .map(|handle| &idx_to_id[handle as usize])
                .filter(|other| {
                    *other != id
                        && feed.shapes.contains_key(*other)
                        && in_distance_to_shape(self.max_eq_dist, merc, &mercs[*other])
                        && in_distance_to_shape(self.max_eq_dist, &mercs[*other], merc)
                })
                .cloned()
                .collect();

            if eq.is_empty() {
                continue;
            }
            eq.push(id.clone());
            self.combine_shapes(feed, eq, &mut trips_by_shape);
        }

        println!(
            "done. (-{} shapes [-{:.2}%])",
            before - feed.shapes.len(),
            pct(before, feed.shapes.len())
        );
    }
}

impl ShapeDuplicateRemover {
    /// Collapses a cluster of equivalent shapes onto the one with the
    /// largest final measurement, which preserves the most information
    fn combine_shapes(
        &self,
        feed: &mut Feed,
        shapes: Vec<String>,
        trips_by_shape: &mut FxHashMap<String, Vec<String>>,
    ) {
        let mut ref_id = shapes[0].clone();
        let mut ref_measure = f64::NEG_INFINITY;
        for id in &shapes {
            let m = feed.shapes[id].last_measure().map_or(f64::NEG_INFINITY, |m| m as f64);
            if m > ref_measure {
                ref_measure = m;
                ref_id = id.clone();
            }
        }

        for id in &shapes {
            if *id == ref_id {
                continue;
            }
            for trip_id in trips_by_shape.remove(id).unwrap_or_default() {
                if let Some(trip) = feed.trips.get_mut(&trip_id) {
                    if trip.shape_id.as_deref() == Some(id) {
                        trip.shape_id = Some(ref_id.clone());
                    }
                    trips_by_shape
                        .entry(ref_id.clone())
                        .or_default()
                        .push(trip_id);
                }
            }
            feed.shapes.remove(id);
        }
    }
}

/// True if every 10 m sample of `a` lies within `max_d` of `b`, with the
/// snap anchored near the previous match and the traveled distance inside
/// the same window. Underestimates for shapes much longer than `max_d`
fn in_distance_to_shape(max_d: f64, a: &MercShape, b: &MercShape) -> bool {
    if a.len() < 2 || b.len() < 2 {
        return false;
    }

    let mut last = 0i64;

    if geo::dist(a[0].0, a[0].1, b[0].0, b[0].1) > max_d {
        return false;
    }

    for i in 1..a.len() {
        let seg_len = geo::dist(a[i - 1].0, a[i - 1].1, a[i].0, a[i].1);

        let mut cur = SAMPLE_STEP;
        while cur < seg_len {
            let p = interpolate(cur, &a[i - 1], &a[i]);
            let (anchor, cur_dist) = dist_point_to_shape(p.0, p.1, b, last - 1);
            last = anchor;

            let upper = b[(b.len() as i64 - 1).min(anchor + 2) as usize].2;
            let lower = b[0.max(anchor - 1) as usize].2;
            // NaN measurements make both bound checks pass, which is what
            // an unmeasured shape needs
            if cur_dist > max_d || p.2 > upper || p.2 < lower {
                return false;
            }
            cur += SAMPLE_STEP;
        }
    }

    true
}

/// Heuristic snap of a point onto a shape: only segments in a window
/// around the anchor `s` are examined. Returns the new anchor and distance
fn dist_point_to_shape(px: f64, py: f64, shape: &MercShape, s: i64) -> (i64, f64) {
    let s = s.max(0);
    let mut min_dist = f64::INFINITY;
    let mut min_index = s;

    let start = 0.max(s - SEGMENT_WINDOW) as usize + 1;
    let end = ((s + SEGMENT_WINDOW) as usize).min(shape.len());

    for i in start..end {
        let d = geo::perpendicular_dist(
            px,
            py,
            shape[i - 1].0,
            shape[i - 1].1,
            shape[i].0,
            shape[i].1,
        );
        if d < min_dist {
            min_index = i as i64 - 1;
            min_dist = d;
        }
    }

    (min_index, min_dist)
}

/// Point at distance `d` along the segment [a, b], with its interpolated
/// measurement
fn interpolate(d: f64, a: &(f64, f64, f64), b: &(f64, f64, f64)) -> (f64, f64, f64) {
    let seg_len = geo::dist(a.0, a.1, b.0, b.1);
    let t = d / seg_len;
    (
        a.0 + (b.0 - a.0) * t,
        a.1 + (b.1 - a.1) * t,
        a.2 + (b.2 - a.2) * t,
    )
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use gtfs_feed::{Shape, ShapePoint};

    fn shape_with(id: &str, coords: &[(f64, f64, f32)]) -> Shape {
        Shape {
            id: id.to_string(),
            points: coords
                .iter()
                .enumerate()
                .map(|(i, &(lat, lon, m))| ShapePoint {
                    lat,
                    lon,
                    sequence: i as u32,
                    dist_traveled: Some(m),
                })
                .collect(),
        }
    }

    const COORDS_A: &[(f64, f64, f32)] = &[
        (37.61, -122.39, 0.0),
        (37.62, -122.38, 1500.0),
        (37.63, -122.37, 3000.0),
        (37.64, -122.36, 4500.0),
        (37.65, -122.35, 6000.0),
        (37.66, -122.34, 7500.0),
    ];

    fn nearly_identical_feed() -> Feed {
        let mut feed = Feed::new();
        feed.shapes
            .insert("A_shp".into(), shape_with("A_shp", COORDS_A));

        // offset by well under a meter, slightly shorter measurement
        let coords_b: Vec<(f64, f64, f32)> = COORDS_A
            .iter()
            .map(|&(lat, lon, m)| (lat + 0.000_000_05, lon, m * 0.9999))
            .collect();
        feed.shapes
            .insert("B_shp".into(), shape_with("B_shp", &coords_b));

        feed.routes.insert("R".into(), route("R"));
        feed.services.insert(
            "SV".into(),
            daily_service("SV", date(2020, 1, 1), date(2020, 12, 31)),
        );
        feed.stops.insert("S1".into(), stop("S1", 37.61, -122.39));
        let mut t1 = trip("T1", "R", "SV", vec![stop_time("S1", 0, 0, 0)]);
        t1.shape_id = Some("A_shp".into());
        feed.trips.insert("T1".into(), t1);
        let mut t2 = trip("T2", "R", "SV", vec![stop_time("S1", 0, 0, 0)]);
        t2.shape_id = Some("B_shp".into());
        feed.trips.insert("T2".into(), t2);
        feed
    }

    #[test]
    fn nearly_identical_shapes_collapse_to_the_better_measured_one() {
        let mut feed = nearly_identical_feed();
        ShapeDuplicateRemover { max_eq_dist: 10.0 }.run(&mut feed);

        assert_eq!(feed.shapes.len(), 1);
        // A_shp has the larger final measurement and wins
        assert!(feed.shapes.contains_key("A_shp"));
        assert_eq!(feed.trips["T1"].shape_id.as_deref(), Some("A_shp"));
        assert_eq!(feed.trips["T2"].shape_id.as_deref(), Some("A_shp"));
        feed.check_references().unwrap();
    }

    #[test]
    fn distant_shapes_stay() {
        let mut feed = nearly_identical_feed();
        // move B_shp a few hundred meters away
        feed.shapes.insert(
            "B_shp".into(),
            shape_with(
                "B_shp",
                &COORDS_A
                    .iter()
                    .map(|&(lat, lon, m)| (lat + 0.005, lon, m))
                    .collect::<Vec<_>>(),
            ),
        );
        ShapeDuplicateRemover { max_eq_dist: 10.0 }.run(&mut feed);
        assert_eq!(feed.shapes.len(), 2);
    }

    #[test]
    fn equivalence_check_is_directional_on_extensions() {
        // b is a strict prefix of a; the sample walk of a falls outside
        // b's measurement window once it passes the end
        let a: MercShape = (0..20).map(|i| (i as f64 * 50.0, 0.0, i as f64 * 50.0)).collect();
        let b: MercShape = (0..10).map(|i| (i as f64 * 50.0, 0.0, i as f64 * 50.0)).collect();
        assert!(!in_distance_to_shape(10.0, &a, &b));
        assert!(in_distance_to_shape(10.0, &b, &a));
    }
}
