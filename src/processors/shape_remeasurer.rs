use gtfs_feed::{Feed, Shape};
use rayon::prelude::*;

use crate::geo;

use super::Processor;

/// Fills measurement holes in `shape_dist_traveled` along each shape.
/// Known measurements are interpolated between proportionally to geometric
/// distance; leading and trailing runs of unknowns are extrapolated at the
/// average unit rate observed within the shape
pub struct ShapeRemeasurer {
    /// Assume meters (unit rate 1) when a shape carries measurements but no
    /// usable average rate could be derived
    pub force: bool,
}

impl Processor for ShapeRemeasurer {
    fn run(&self, feed: &mut Feed) {
        print!("Remeasuring shapes... ");

        feed.shapes
            .par_iter_mut()
            .for_each(|(_, shape)| self.remeasure(shape));

        // stop time measurements that overshoot their shape's final
        // measurement are clamped down to it
        for trip in feed.trips.values_mut() {
            let Some(last) = trip
                .shape_id
                .as_ref()
                .and_then(|id| feed.shapes.get(id))
                .and_then(|s| s.last_measure())
            else {
                continue;
            };
            for st in &mut trip.stop_times {
                if let Some(d) = st.shape_dist_traveled {
                    if d > last {
                        st.shape_dist_traveled = Some(last);
                    }
                }
            }
        }

        println!("done. ({} shapes remeasured)", feed.shapes.len());
    }
}

impl ShapeRemeasurer {
    fn remeasure(&self, shape: &mut Shape) {
        let (avg_measure, no_measurements) = self.remeasure_known(shape);

        if no_measurements {
            // no unit to derive, use meters
            self.remeasure_unknown(shape, 1.0);
        } else if avg_measure != 0.0 {
            self.remeasure_unknown(shape, avg_measure);
        } else if self.force {
            self.remeasure_unknown(shape, 1.0);
        } else {
            // a zero unit rate cannot be extrapolated, and meters cannot be
            // assumed because stop time measurements may use another unit
            for p in &mut shape.points {
                p.dist_traveled = None;
            }
        }
    }

    /// Interpolates holes between known measurements and returns the average
    /// meters-per-measurement-unit rate, plus whether the shape carries no
    /// measurement at all
    fn remeasure_known(&self, shape: &mut Shape) -> (f64, bool) {
        let mut rate_sum = 0.0;
        let mut rate_count = 0usize;
        let mut measured = 0usize;

        let mut last_index: Option<usize> = None;
        let mut last_measure = -1.0f64;
        let mut d = 0.0;

        for i in 0..shape.points.len() {
            if i > 0 {
                d += point_dist(shape, i - 1, i);
            }
            if let Some(m) = shape.points[i].dist_traveled {
                measured += 1;
                if let Some(last) = last_index {
                    if d > 0.0 {
                        let local_rate = (m as f64 - last_measure) / d;
                        if i - last > 1 {
                            self.remeasure_between(last + 1, i, local_rate, last_measure, shape);
                        }
                        rate_sum += local_rate;
                        rate_count += 1;
                    }
                }
                last_index = Some(i);
                last_measure = m as f64;
                d = 0.0;
            }
        }

        if rate_count == 0 {
            return (0.0, measured == 0);
        }
        (rate_sum / rate_count as f64, measured == 0)
    }

    /// Extrapolates the remaining unknown runs (leading and trailing) at the
    /// given unit rate
    fn remeasure_unknown(&self, shape: &mut Shape, rate: f64) {
        let mut run_start: Option<usize> = None;
        let mut last_measure = 0.0f64;

        for i in 0..=shape.points.len() {
            if i == shape.points.len() || shape.points[i].dist_traveled.is_some() {
                if let Some(start) = run_start {
                    self.remeasure_between(start, i, rate, last_measure, shape);
                    run_start = None;
                }
                if i < shape.points.len() {
                    last_measure = shape.points[i].dist_traveled.unwrap_or(0.0) as f64;
                }
            } else if run_start.is_none() {
                run_start = Some(i);
            }
        }
    }

    fn remeasure_between(
        &self,
        from: usize,
        to: usize,
        rate: f64,
        last_measure: f64,
        shape: &mut Shape,
    ) {
        let mut d = 0.0;
        for i in from..to {
            if i > 0 {
                d += point_dist(shape, i - 1, i);
            }
            shape.points[i].dist_traveled = Some((last_measure + d * rate) as f32);
        }
    }
}

/// Web-mercator distance between two shape points
fn point_dist(shape: &Shape, i: usize, j: usize) -> f64 {
    let (ax, ay) = geo::web_mercator(shape.points[i].lat, shape.points[i].lon);
    let (bx, by) = geo::web_mercator(shape.points[j].lat, shape.points[j].lon);
    geo::dist(ax, ay, bx, by)
}

#[cfg(test)]
mod tests {
    use super::super::float_eq;
    use super::*;
    use gtfs_feed::ShapePoint;

    fn shape(points: &[(f64, f64, Option<f32>)]) -> Shape {
        Shape {
            id: "shp".to_string(),
            points: points
                .iter()
                .enumerate()
                .map(|(i, &(lat, lon, dist_traveled))| ShapePoint {
                    lat,
                    lon,
                    sequence: i as u32,
                    dist_traveled,
                })
                .collect(),
        }
    }

    #[test]
    fn interpolates_interior_holes_proportionally() {
        // four points on the equator, evenly spaced; ends measured 0 and 30
        let mut s = shape(&[
            (0.0, 0.0, Some(0.0)),
            (0.0, 0.001, None),
            (0.0, 0.002, None),
            (0.0, 0.003, Some(30.0)),
        ]);
        ShapeRemeasurer { force: false }.remeasure(&mut s);

        assert!(float_eq(s.points[1].dist_traveled.unwrap(), 10.0, 0.01));
        assert!(float_eq(s.points[2].dist_traveled.unwrap(), 20.0, 0.01));
    }

    #[test]
    fn extrapolates_ends_at_the_observed_rate() {
        let mut s = shape(&[
            (0.0, 0.0, None),
            (0.0, 0.001, Some(10.0)),
            (0.0, 0.002, Some(20.0)),
            (0.0, 0.003, None),
        ]);
        ShapeRemeasurer { force: false }.remeasure(&mut s);

        assert!(float_eq(s.points[0].dist_traveled.unwrap(), 0.0, 0.01));
        assert!(float_eq(s.points[3].dist_traveled.unwrap(), 30.0, 0.01));
    }

    #[test]
    fn fully_unmeasured_shapes_get_meters() {
        let mut s = shape(&[
            (0.0, 0.0, None),
            (0.0, 0.001, None),
            (0.0, 0.002, None),
        ]);
        ShapeRemeasurer { force: false }.remeasure(&mut s);

        let d01 = s.points[1].dist_traveled.unwrap();
        // one thousandth of a degree of longitude at the equator is ~111 m
        assert!(float_eq(d01, 111.32, 0.1));
        assert!(s.points[2].dist_traveled.unwrap() > d01);
    }

    #[test]
    fn monotone_after_remeasuring() {
        let mut s = shape(&[
            (47.0, 7.0, None),
            (47.001, 7.001, Some(155.0)),
            (47.002, 7.001, None),
            (47.003, 7.002, Some(470.0)),
            (47.004, 7.003, None),
        ]);
        ShapeRemeasurer { force: false }.remeasure(&mut s);

        let mut last = f32::NEG_INFINITY;
        for p in &s.points {
            let d = p.dist_traveled.unwrap();
            assert!(d >= last);
            last = d;
        }
    }

    #[test]
    fn clamps_overshooting_stop_time_measurements() {
        use super::super::testutil::*;
        let mut feed = Feed::new();
        feed.shapes.insert(
            "shp".into(),
            shape(&[(0.0, 0.0, Some(0.0)), (0.0, 0.001, Some(100.0))]),
        );
        feed.stops.insert("S1".into(), stop("S1", 0.0, 0.0));
        feed.routes.insert("R".into(), route("R"));
        feed.services.insert(
            "SV".into(),
            daily_service("SV", date(2020, 1, 1), date(2020, 12, 31)),
        );
        let mut t = trip("T", "R", "SV", vec![stop_time("S1", 0, 0, 0)]);
        t.shape_id = Some("shp".into());
        t.stop_times[0].shape_dist_traveled = Some(150.0);
        feed.trips.insert("T".into(), t);

        ShapeRemeasurer { force: false }.run(&mut feed);
        assert_eq!(
            feed.trips["T"].stop_times[0].shape_dist_traveled,
            Some(100.0)
        );
    }
}
