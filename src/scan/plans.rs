//! Plan-building helpers for common scan patterns.

use crate::motion::Position3D;

/// Serpentine (boustrophedon) XY grid at a fixed Z height.
///
/// Walks X from `x0` towards `x1` in `step` increments, scanning Y upward
/// on even columns and downward on odd ones so the head never retraces a
/// full column between samples.
///
/// Returns an empty plan when `step` is not positive or either range is
/// inverted; the scan engine rejects empty plans.
#[must_use]
pub fn serpentine_grid(x0: f64, x1: f64, y0: f64, y1: f64, step: f64, z: f64) -> Vec<Position3D> {
    if step <= 0.0 || x1 < x0 || y1 < y0 {
        return Vec::new();
    }
    let nx = ((x1 - x0) / step).floor() as usize + 1;
    let ny = ((y1 - y0) / step).floor() as usize + 1;

    let mut points = Vec::with_capacity(nx * ny);
    for ix in 0..nx {
        let x = x0 + ix as f64 * step;
        for iy in 0..ny {
            let iy = if ix % 2 == 1 { ny - 1 - iy } else { iy };
            points.push(Position3D::new(x, y0 + iy as f64 * step, z));
        }
    }
    points
}
