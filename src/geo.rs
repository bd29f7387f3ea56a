//! Projections and distances. All planar work happens in web-mercator
//! meters, which keeps segment math euclidean; thresholds in this crate are
//! mercator meters, not ground meters.

const EARTH_RADIUS: f64 = 6_378_137.0;
const DEG_TO_RAD: f64 = 0.017453292519943295;

/// Projects WGS84 latitude/longitude to web-mercator x/y
pub fn web_mercator(lat: f64, lon: f64) -> (f64, f64) {
    let x = EARTH_RADIUS * lon * DEG_TO_RAD;
    let a = lat * DEG_TO_RAD;
    let y = (EARTH_RADIUS / 2.0) * ((1.0 + a.sin()) / (1.0 - a.sin())).ln();
    (x, y)
}

/// Unprojects web-mercator x/y back to latitude/longitude
pub fn web_mercator_inverse(x: f64, y: f64) -> (f64, f64) {
    let lat = (std::f64::consts::FRAC_PI_2 - 2.0 * (-y / EARTH_RADIUS).exp().atan()).to_degrees();
    let lon_raw = (x / EARTH_RADIUS).to_degrees();
    let lon = lon_raw - ((lon_raw + 180.0) / 360.0).floor() * 360.0;
    (lat, lon)
}

/// Euclidean distance between two planar points
pub fn dist(x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    ((x2 - x1) * (x2 - x1) + (y2 - y1) * (y2 - y1)).sqrt()
}

/// Perpendicular distance from point p to the line segment [a, b]
pub fn perpendicular_dist(px: f64, py: f64, ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    let d = dist(ax, ay, bx, by) * dist(ax, ay, bx, by);

    if d == 0.0 {
        return dist(px, py, ax, ay);
    }
    let t = ((px - ax) * (bx - ax) + (py - ay) * (by - ay)) / d;
    if t < 0.0 {
        dist(px, py, ax, ay)
    } else if t > 1.0 {
        dist(px, py, bx, by)
    } else {
        dist(px, py, ax + t * (bx - ax), ay + t * (by - ay))
    }
}

/// Snaps point p onto the segment [a, b]; returns the snapped point and the
/// progression t in [0, 1] along the segment
pub fn snap_to_segment(
    px: f64,
    py: f64,
    ax: f64,
    ay: f64,
    bx: f64,
    by: f64,
) -> (f64, f64, f64) {
    let d = dist(ax, ay, bx, by) * dist(ax, ay, bx, by);
    if d == 0.0 {
        return (ax, ay, 0.0);
    }
    let t = (((px - ax) * (bx - ax) + (py - ay) * (by - ay)) / d).clamp(0.0, 1.0);
    (ax + t * (bx - ax), ay + t * (by - ay), t)
}

/// Great-circle distance between two coordinates, in meters
pub fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Equirectangular approximation of [haversine], good enough for the short
/// distances compared against thresholds
pub fn haversine_approx(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let x = (lon2 - lon1).to_radians() * ((lat1 + lat2) / 2.0).to_radians().cos();
    let y = (lat2 - lat1).to_radians();
    EARTH_RADIUS * (x * x + y * y).sqrt()
}
