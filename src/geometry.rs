// src/geometry.rs
//
// Box and polygon helpers shared by the analyzers. Boxes are [x1, y1, x2, y2]
// in pixels; polygons may be configured either normalized (0..1) or in
// pixels and are resolved against the frame size at test time.

use crate::types::BBox;
use serde::{Deserialize, Serialize};

pub fn center(b: &BBox) -> [f32; 2] {
    [(b[0] + b[2]) * 0.5, (b[1] + b[3]) * 0.5]
}

pub fn bottom_center(b: &BBox) -> [f32; 2] {
    [(b[0] + b[2]) * 0.5, b[3]]
}

pub fn area(b: &BBox) -> f32 {
    (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0)
}

pub fn distance(a: [f32; 2], b: [f32; 2]) -> f32 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

pub fn iou(a: &BBox, b: &BBox) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter <= 0.0 {
        return 0.0;
    }

    let union = area(a) + area(b) - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// Euclidean gap between two boxes; 0 when they touch or overlap.
pub fn box_gap(a: &BBox, b: &BBox) -> f32 {
    let dx = (a[0].max(b[0]) - a[2].min(b[2])).max(0.0);
    let dy = (a[1].max(b[1]) - a[3].min(b[3])).max(0.0);
    (dx * dx + dy * dy).sqrt()
}

/// Smallest box containing both
pub fn union_box(a: &BBox, b: &BBox) -> BBox {
    [a[0].min(b[0]), a[1].min(b[1]), a[2].max(b[2]), a[3].max(b[3])]
}

// ============================================================================
// POLYGONS
// ============================================================================

/// Region of interest as configured: a closed ring of [x, y] points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polygon {
    pub points: Vec<[f32; 2]>,
}

impl Polygon {
    pub fn new(points: Vec<[f32; 2]>) -> Self {
        Self { points }
    }

    /// Every coordinate within [0, 1] means the polygon is normalized.
    pub fn is_normalized(&self) -> bool {
        self.points
            .iter()
            .flat_map(|p| p.iter())
            .fold(f32::MIN, |acc, v| acc.max(*v))
            <= 1.0
    }

    /// Pixel-space ring for a frame of the given size
    pub fn resolve(&self, frame_w: f32, frame_h: f32) -> Vec<[f32; 2]> {
        if self.is_normalized() {
            self.points
                .iter()
                .map(|p| [p[0] * frame_w, p[1] * frame_h])
                .collect()
        } else {
            self.points.clone()
        }
    }

    /// Point-in-polygon, boundary inclusive.
    pub fn contains(&self, point: [f32; 2], frame_w: f32, frame_h: f32) -> bool {
        let ring = self.resolve(frame_w, frame_h);
        point_in_ring(&ring, point)
    }
}

const EDGE_EPSILON: f32 = 1e-3;

fn point_in_ring(ring: &[[f32; 2]], p: [f32; 2]) -> bool {
    if ring.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[j];

        if on_segment(a, b, p) {
            return true;
        }

        if (a[1] > p[1]) != (b[1] > p[1]) {
            let x_cross = (b[0] - a[0]) * (p[1] - a[1]) / (b[1] - a[1]) + a[0];
            if p[0] < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn on_segment(a: [f32; 2], b: [f32; 2], p: [f32; 2]) -> bool {
    let cross = (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0]);
    let len = distance(a, b).max(1.0);
    if (cross / len).abs() > EDGE_EPSILON {
        return false;
    }
    p[0] >= a[0].min(b[0]) - EDGE_EPSILON
        && p[0] <= a[0].max(b[0]) + EDGE_EPSILON
        && p[1] >= a[1].min(b[1]) - EDGE_EPSILON
        && p[1] <= a[1].max(b[1]) + EDGE_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x1: f32, y1: f32, x2: f32, y2: f32) -> Polygon {
        Polygon::new(vec![[x1, y1], [x2, y1], [x2, y2], [x1, y2]])
    }

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = [0.0, 0.0, 100.0, 100.0];
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &[200.0, 0.0, 300.0, 100.0]), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = [0.0, 0.0, 100.0, 100.0];
        let b = [50.0, 0.0, 150.0, 100.0];
        // 5000 / 15000
        assert!((iou(&a, &b) - 1.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_box_gap() {
        let a = [0.0, 0.0, 10.0, 10.0];
        assert_eq!(box_gap(&a, &[5.0, 5.0, 20.0, 20.0]), 0.0);
        assert!((box_gap(&a, &[13.0, 14.0, 20.0, 20.0]) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalized_polygon_is_scaled() {
        let roi = square(0.0, 0.5, 1.0, 1.0);
        assert!(roi.is_normalized());
        assert!(roi.contains([640.0, 600.0], 1280.0, 720.0));
        assert!(!roi.contains([640.0, 100.0], 1280.0, 720.0));
    }

    #[test]
    fn test_pixel_polygon_boundary_inclusive() {
        let roi = square(100.0, 100.0, 200.0, 200.0);
        assert!(!roi.is_normalized());
        assert!(roi.contains([100.0, 150.0], 1280.0, 720.0));
        assert!(roi.contains([150.0, 150.0], 1280.0, 720.0));
        assert!(!roi.contains([99.0, 150.0], 1280.0, 720.0));
    }

    #[test]
    fn test_degenerate_polygon_contains_nothing() {
        let line = Polygon::new(vec![[0.0, 0.0], [10.0, 10.0]]);
        assert!(!line.contains([5.0, 5.0], 100.0, 100.0));
    }
}
