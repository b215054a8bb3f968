//! Core type definitions for the animation engine.
//!
//! This module defines the fundamental types shared by the geometry,
//! flow and scheduling layers.

use serde::{Deserialize, Serialize};

/// Animation time unit in milliseconds.
///
/// Stage durations, operation offsets and event timestamps all use the same
/// `Millis` representation on the orchestrator's virtual clock.
pub type Millis = u64;

/// Identifier of a functional unit in the datapath (e.g. `"RegFile"`).
pub type ComponentId = String;

/// Identifier of a token within one flow run (e.g. `"alu_result"`).
pub type TokenId = String;

/// A point in canvas coordinates at the current layout scale.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    /// Creates a new point.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Returns true if both coordinates are within `tolerance` of `other`.
    pub fn approx_eq(&self, other: &Point, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance && (self.y - other.y).abs() <= tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert_eq!(a.distance(&b), 5.0);
    }

    #[test]
    fn test_point_approx_eq() {
        let a = Point::new(10.0, 10.0);
        assert!(a.approx_eq(&Point::new(11.5, 9.0), 2.0));
        assert!(!a.approx_eq(&Point::new(13.0, 10.0), 2.0));
    }
}
