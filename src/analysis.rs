//! Shared-segment detection between concurrently travelling tokens.
//!
//! When several tokens are in flight, parts of their paths may run along the
//! same wire run. The renderer can use this to offset or merge them. The
//! result is advisory and never feeds back into scheduling.
//!
//! # Example
//!
//! ```
//! use datapath_flow::analysis::find_shared_segments;
//! use datapath_flow::types::Point;
//!
//! let a = vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 5.0)];
//! let b = vec![Point::new(10.0, 0.0), Point::new(0.0, 0.0)];
//! let paths = vec![("a".to_string(), a), ("b".to_string(), b)];
//!
//! let shared = find_shared_segments(&paths, 0.5);
//! assert_eq!(shared.len(), 1);
//! assert_eq!(shared[0].tokens, ("a".to_string(), "b".to_string()));
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{Point, TokenId};

/// One straight piece of a polyline.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: Point,
    pub end: Point,
}

impl Segment {
    pub fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    pub fn length(&self) -> f64 {
        self.start.distance(&self.end)
    }

    /// True when both endpoint pairs are within `tolerance`, in either
    /// orientation.
    pub fn matches(&self, other: &Segment, tolerance: f64) -> bool {
        let same = self.start.approx_eq(&other.start, tolerance) && self.end.approx_eq(&other.end, tolerance);
        let reversed =
            self.start.approx_eq(&other.end, tolerance) && self.end.approx_eq(&other.start, tolerance);
        same || reversed
    }
}

/// Splits a polyline into its segments, skipping zero-length ones.
pub fn segments(path: &[Point]) -> Vec<Segment> {
    path.windows(2)
        .map(|pair| Segment::new(pair[0], pair[1]))
        .filter(|seg| seg.length() > 0.0)
        .collect()
}

/// A segment that two tokens' paths have in common.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SharedSegment {
    pub tokens: (TokenId, TokenId),
    /// Segment indices within each token's path
    pub indices: (usize, usize),
    /// The segment as it appears in the first token's path
    pub segment: Segment,
}

/// Compares every pair of paths segment by segment.
///
/// Quadratic in the number of segments, which stays small: a handful of
/// tokens move at once and each path has a few corners.
pub fn find_shared_segments(paths: &[(TokenId, Vec<Point>)], tolerance: f64) -> Vec<SharedSegment> {
    let split: Vec<(&TokenId, Vec<Segment>)> =
        paths.iter().map(|(id, path)| (id, segments(path))).collect();

    let mut shared = Vec::new();
    for (i, (first, first_segments)) in split.iter().enumerate() {
        for (second, second_segments) in &split[i + 1..] {
            for (a, seg_a) in first_segments.iter().enumerate() {
                for (b, seg_b) in second_segments.iter().enumerate() {
                    if seg_a.matches(seg_b, tolerance) {
                        shared.push(SharedSegment {
                            tokens: ((*first).clone(), (*second).clone()),
                            indices: (a, b),
                            segment: *seg_a,
                        });
                    }
                }
            }
        }
    }
    shared
}
