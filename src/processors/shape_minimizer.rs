use gtfs_feed::{Feed, ShapePoint};
use rayon::prelude::*;

use crate::geo;

use super::Processor;

/// Simplifies each shape independently with Douglas-Peucker. Epsilon is in
/// web-mercator meters; surviving points are renumbered 0..k-1
pub struct ShapeMinimizer {
    pub epsilon: f64,
}

impl Processor for ShapeMinimizer {
    fn run(&self, feed: &mut Feed) {
        print!("Minimizing shapes... ");

        let removed: usize = feed
            .shapes
            .par_iter_mut()
            .map(|(_, shape)| {
                let before = shape.points.len();
                shape.points = minimize(std::mem::take(&mut shape.points), self.epsilon);
                for (i, p) in shape.points.iter_mut().enumerate() {
                    p.sequence = i as u32;
                }
                before - shape.points.len()
            })
            .sum();

        println!("done. (-{} shape points)", removed);
    }
}

/// Douglas-Peucker on the projected polyline
fn minimize(points: Vec<ShapePoint>, epsilon: f64) -> Vec<ShapePoint> {
    if points.len() < 3 {
        return points;
    }

    let mut max_dist = 0.0;
    let mut max_index = 0;

    let (ax, ay) = project(&points[0]);
    let (bx, by) = project(&points[points.len() - 1]);

    // TODO: also bound the measurement error of removed points, not only
    // the geometric one
    for (i, p) in points.iter().enumerate().take(points.len() - 1).skip(1) {
        let (px, py) = project(p);
        let d = geo::perpendicular_dist(px, py, ax, ay, bx, by);
        if d > max_dist {
            max_index = i;
            max_dist = d;
        }
    }

    if max_dist > epsilon {
        let mut head = minimize(points[..=max_index].to_vec(), epsilon);
        let tail = minimize(points[max_index..].to_vec(), epsilon);
        head.pop();
        head.extend(tail);
        head
    } else {
        vec![points[0], points[points.len() - 1]]
    }
}

fn project(p: &ShapePoint) -> (f64, f64) {
    geo::web_mercator(p.lat, p.lon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gtfs_feed::Shape;

    fn shape_of(coords: &[(f64, f64)]) -> Shape {
        Shape {
            id: "shp".to_string(),
            points: coords
                .iter()
                .enumerate()
                .map(|(i, &(lat, lon))| ShapePoint {
                    lat,
                    lon,
                    sequence: i as u32 * 10,
                    dist_traveled: None,
                })
                .collect(),
        }
    }

    #[test]
    fn collinear_interior_points_are_removed() {
        let pts = minimize(
            shape_of(&[
                (0.0, 0.0),
                (0.0, 0.001),
                (0.0, 0.002),
                (0.0, 0.003),
            ])
            .points,
            1.0,
        );
        assert_eq!(pts.len(), 2);
        assert_eq!(pts[0].lon, 0.0);
        assert_eq!(pts[1].lon, 0.003);
    }

    #[test]
    fn significant_corners_survive() {
        // a right-angle corner, ~111 m off the chord
        let pts = minimize(
            shape_of(&[(0.0, 0.0), (0.001, 0.001), (0.0, 0.002)]).points,
            1.0,
        );
        assert_eq!(pts.len(), 3);
    }

    #[test]
    fn removed_points_stay_within_epsilon_of_the_chord() {
        // slight zigzag below the 1 m threshold
        let original = shape_of(&[
            (0.0, 0.0),
            (0.000_001, 0.001),
            (-0.000_001, 0.002),
            (0.0, 0.003),
        ]);
        let kept = minimize(original.points.clone(), 1.0);
        assert_eq!(kept.len(), 2);

        for p in &original.points {
            let (px, py) = project(p);
            let mut min_d = f64::INFINITY;
            for w in kept.windows(2) {
                let (ax, ay) = project(&w[0]);
                let (bx, by) = project(&w[1]);
                min_d = min_d.min(geo::perpendicular_dist(px, py, ax, ay, bx, by));
            }
            assert!(min_d <= 1.0);
        }
    }

    #[test]
    fn sequences_are_renumbered_densely() {
        let mut feed = Feed::new();
        feed.shapes.insert(
            "shp".into(),
            shape_of(&[(0.0, 0.0), (0.001, 0.001), (0.0, 0.002)]),
        );
        ShapeMinimizer { epsilon: 1.0 }.run(&mut feed);
        let seqs: Vec<u32> = feed.shapes["shp"].points.iter().map(|p| p.sequence).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }
}
