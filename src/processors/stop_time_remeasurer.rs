use gtfs_feed::{Feed, Shape};
use rayon::prelude::*;

use crate::geo;

use super::Processor;

const SEARCH_RADIUS: f64 = 250.0;

/// Snaps stop-time events without `shape_dist_traveled` onto the trip's
/// shape: per halt, candidate segments within 250 m; then one candidate per
/// halt is chosen so that progression along the shape never moves
/// backwards, minimizing the total snap distance. Trips without a viable
/// monotone assignment are counted and left unchanged
pub struct StopTimeRemeasurer {}

/// One snap candidate: segment index, ground distance to the snapped
/// point, and progression within the segment
#[derive(Clone, Copy)]
struct Candidate {
    segment: u32,
    dist: f64,
    progress: f64,
}

impl Processor for StopTimeRemeasurer {
    fn run(&self, feed: &mut Feed) {
        print!("Remeasuring stop times... ");

        let fix_trips: Vec<String> = feed
            .trips
            .iter()
            .filter(|(_, t)| {
                t.shape_id.is_some()
                    && t.stop_times.iter().any(|st| st.shape_dist_traveled.is_none())
            })
            .map(|(id, _)| id.clone())
            .collect();

        // measurements per trip, computed in parallel, applied serially
        let results: Vec<(String, Option<Vec<f32>>)> = fix_trips
            .par_iter()
            .map(|id| (id.clone(), self.remeasure(feed, id)))
            .collect();

        let mut succeeded = 0usize;
        let mut failed = 0usize;
        for (id, measures) in results {
            match measures {
                Some(measures) => {
                    succeeded += 1;
                    let trip = feed.trips.get_mut(&id).expect("trip exists");
                    for (st, m) in trip.stop_times.iter_mut().zip(measures) {
                        st.shape_dist_traveled = Some(m);
                    }
                }
                None => {
                    failed += 1;
                    log::debug!("no monotone snap found for trip '{}'", id);
                }
            }
        }

        println!(
            "done. ({} trips without full measure, {} trips remeasured, {} trips failed)",
            fix_trips.len(),
            succeeded,
            failed
        );
    }
}

impl StopTimeRemeasurer {
    fn remeasure(&self, feed: &Feed, trip_id: &str) -> Option<Vec<f32>> {
        let trip = &feed.trips[trip_id];
        let shape = &feed.shapes[trip.shape_id.as_ref()?];

        // the final measurement interpolates shape measurements, so the
        // shape must be fully measured
        if shape.points.iter().any(|p| p.dist_traveled.is_none()) {
            return None;
        }

        let mut candidates: Vec<Vec<Candidate>> = Vec::with_capacity(trip.stop_times.len());
        for st in &trip.stop_times {
            let stop = feed.stops.get(&st.stop_id)?;
            let (lat, lon) = (stop.latitude?, stop.longitude?);
            let mut cands = segment_candidates(shape, lat, lon);
            if cands.is_empty() {
                return None;
            }
            cands.sort_by(|a, b| a.dist.total_cmp(&b.dist));
            candidates.push(cands);
        }

        // forward dynamic program over the candidate layers; a transition
        // is allowed only when it does not travel backwards on the shape
        let n = candidates.len();
        let mut dist: Vec<Vec<f64>> = candidates
            .iter()
            .map(|layer| vec![f64::INFINITY; layer.len()])
            .collect();
        let mut pred: Vec<Vec<i64>> = candidates
            .iter()
            .map(|layer| vec![-1i64; layer.len()])
            .collect();
        dist.push(vec![f64::INFINITY]);
        pred.push(vec![-1]);

        for j in 0..candidates[0].len() {
            dist[0][j] = 0.0;
            pred[0][j] = 0;
        }

        for i in 0..n {
            for j in 0..candidates[i].len() {
                for k in 0..dist[i + 1].len() {
                    if i != n - 1 {
                        let cur = &candidates[i][j];
                        let next = &candidates[i + 1][k];
                        if cur.segment > next.segment
                            || (cur.segment == next.segment && cur.progress > next.progress)
                        {
                            continue;
                        }
                    }
                    let cost = dist[i][j] + candidates[i][j].dist;
                    if cost < dist[i + 1][k] {
                        dist[i + 1][k] = cost;
                        pred[i + 1][k] = j as i64;
                    }
                }
            }
        }

        if pred[n][0] == -1 {
            // no monotone arrangement exists
            return None;
        }

        let mut measures = vec![0f32; n];
        let mut cursor = 0usize;
        for i in (0..n).rev() {
            let chosen = pred[i + 1][cursor] as usize;
            cursor = chosen;

            let c = &candidates[i][chosen];
            let a = shape.points[c.segment as usize]
                .dist_traveled
                .expect("shape is fully measured");
            let b = shape.points[c.segment as usize + 1]
                .dist_traveled
                .expect("shape is fully measured");
            measures[i] = a + (b - a) * c.progress as f32;
        }

        Some(measures)
    }
}

/// All shape segments whose snap point lies within the search radius
fn segment_candidates(shape: &Shape, lat: f64, lon: f64) -> Vec<Candidate> {
    let mut ret = Vec::new();
    for i in 0..shape.points.len().saturating_sub(1) {
        let a = &shape.points[i];
        let b = &shape.points[i + 1];
        let (sx, sy, progress) =
            geo::snap_to_segment(lon, lat, a.lon, a.lat, b.lon, b.lat);
        let d = geo::haversine(lat, lon, sy, sx);
        if d <= SEARCH_RADIUS {
            ret.push(Candidate {
                segment: i as u32,
                dist: d,
                progress,
            });
        }
    }
    ret
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use gtfs_feed::ShapePoint;

    fn measured_shape(id: &str) -> Shape {
        // straight line north along a meridian, 4 points, measured in meters
        Shape {
            id: id.to_string(),
            points: (0u32..4)
                .map(|i| ShapePoint {
                    lat: 48.0 + i as f64 * 0.001,
                    lon: 7.8,
                    sequence: i,
                    dist_traveled: Some(i as f32 * 111.2),
                })
                .collect(),
        }
    }

    fn feed_with_trip(stop_coords: &[(f64, f64)]) -> Feed {
        let mut feed = Feed::new();
        feed.shapes.insert("shp".into(), measured_shape("shp"));
        feed.routes.insert("R".into(), route("R"));
        feed.services.insert(
            "SV".into(),
            daily_service("SV", date(2020, 1, 1), date(2020, 12, 31)),
        );

        let mut stop_times = Vec::new();
        for (i, &(lat, lon)) in stop_coords.iter().enumerate() {
            let id = format!("S{}", i);
            feed.stops.insert(id.clone(), stop(&id, lat, lon));
            stop_times.push(stop_time(&id, i as u32, 28800 + i as u32 * 60, 28800 + i as u32 * 60));
        }
        let mut t = trip("T", "R", "SV", stop_times);
        t.shape_id = Some("shp".into());
        feed.trips.insert("T".into(), t);
        feed
    }

    #[test]
    fn stops_along_the_shape_get_monotone_measurements() {
        let mut feed = feed_with_trip(&[(48.0, 7.8), (48.0015, 7.8), (48.003, 7.8)]);
        StopTimeRemeasurer {}.run(&mut feed);

        let measures: Vec<f32> = feed.trips["T"]
            .stop_times
            .iter()
            .map(|st| st.shape_dist_traveled.unwrap())
            .collect();
        assert!(measures.windows(2).all(|w| w[0] <= w[1]));
        assert!(measures[0] < 10.0);
        assert!((measures[1] - 166.8).abs() < 5.0);
        assert!((measures[2] - 333.6).abs() < 5.0);
    }

    #[test]
    fn stops_far_from_the_shape_fail_the_trip() {
        // second stop is kilometers away from the polyline
        let mut feed = feed_with_trip(&[(48.0, 7.8), (48.1, 7.9), (48.003, 7.8)]);
        StopTimeRemeasurer {}.run(&mut feed);

        assert!(feed.trips["T"]
            .stop_times
            .iter()
            .all(|st| st.shape_dist_traveled.is_none()));
    }
}
