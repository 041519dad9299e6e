//! Small pure helpers shared across the control layer.

/// Arithmetic mean; 0.0 for an empty slice.
#[inline]
pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Population standard deviation; 0.0 for an empty slice.
#[inline]
pub fn stddev(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / xs.len() as f64;
    var.sqrt()
}

/// Normalize an angular delta in degrees into (-180, 180].
///
/// Keeps relative moves taking the short way around when an absolute
/// orientation stream wraps past the +/-180 seam.
#[inline]
pub fn wrap_degrees(delta: f64) -> f64 {
    let mut d = delta % 360.0;
    if d > 180.0 {
        d -= 360.0;
    } else if d <= -180.0 {
        d += 360.0;
    }
    d
}

/// Centroid of four corner points (arithmetic mean of x's and y's).
#[inline]
pub fn centroid(corners: &[(f64, f64); 4]) -> (f64, f64) {
    let (sx, sy) = corners
        .iter()
        .fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
    (sx / 4.0, sy / 4.0)
}
