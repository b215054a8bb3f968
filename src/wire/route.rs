//! Parameterized Manhattan routing.
//!
//! A [`Route`] describes how a wire leaves its source port, which horizontal
//! and vertical runs it takes, and which port of the destination it enters.
//! Run targets come either from a named vertical routing line or from an
//! edge of one of the two endpoint rectangles plus an offset. Offsets are
//! given at scale 1.0 and multiplied by the layout scale.
//!
//! After the explicit legs, the route finishes with at most two segments
//! determined by the destination side: ports on the left/right side are
//! approached horizontally, ports on the top/bottom side vertically.
//!
//! ```
//! use datapath_flow::component::{Layout, Side};
//! use datapath_flow::wire::route::{Coord, Port, Route};
//!
//! let route = Route::new(Port::new("PC", Side::Right), Port::new("InstructionMemory", Side::Left))
//!     .horizontal(Coord::line("pc_out"));
//! let points = route.compute(&Layout::standard(1.0)).unwrap();
//! assert_eq!(points.first().unwrap().x, 80.0);
//! assert_eq!(points.last().unwrap().x, 120.0);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::component::{ComponentRect, Layout, Side};
use crate::types::{ComponentId, Point};

const SAME_POINT_EPSILON: f64 = 1e-9;

/// Errors raised while computing a route.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("component not in layout: {0}")]
    MissingComponent(ComponentId),

    #[error("routing line not in layout: {0}")]
    MissingLine(String),
}

/// Result type for routing operations.
pub type RouteResult<T> = Result<T, RouteError>;

/// A connection point on a component: a side and a position along it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub component: ComponentId,
    pub side: Side,
    /// Position along the side, 0.0 = top/left end, 1.0 = bottom/right end.
    #[serde(default = "default_fraction")]
    pub at: f64,
}

fn default_fraction() -> f64 {
    0.5
}

impl Port {
    /// Port at the middle of `side`.
    pub fn new(component: impl Into<ComponentId>, side: Side) -> Self {
        Self::at(component, side, 0.5)
    }

    /// Port at `fraction` along `side`.
    pub fn at(component: impl Into<ComponentId>, side: Side, fraction: f64) -> Self {
        Self {
            component: component.into(),
            side,
            at: fraction,
        }
    }
}

/// An edge coordinate of a rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    Left,
    Right,
    Top,
    Bottom,
    CenterX,
    CenterY,
}

impl Edge {
    fn of(self, rect: &ComponentRect) -> f64 {
        match self {
            Edge::Left => rect.left(),
            Edge::Right => rect.right(),
            Edge::Top => rect.top(),
            Edge::Bottom => rect.bottom(),
            Edge::CenterX => rect.center().x,
            Edge::CenterY => rect.center().y,
        }
    }
}

/// Where a run ends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coord {
    /// A named vertical routing line (x) shared by parallel wires.
    Line(String),
    /// An edge of the source rectangle plus an unscaled offset.
    Source(Edge, f64),
    /// An edge of the destination rectangle plus an unscaled offset.
    Destination(Edge, f64),
}

impl Coord {
    pub fn line(name: impl Into<String>) -> Self {
        Coord::Line(name.into())
    }

    pub fn src(edge: Edge, offset: f64) -> Self {
        Coord::Source(edge, offset)
    }

    pub fn dst(edge: Edge, offset: f64) -> Self {
        Coord::Destination(edge, offset)
    }
}

/// One explicit run of a route.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Leg {
    /// Move horizontally until x reaches the coordinate.
    Horizontal(Coord),
    /// Move vertically until y reaches the coordinate.
    Vertical(Coord),
}

/// A hand-authored wire route between two component ports.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub from: Port,
    pub to: Port,
    #[serde(default)]
    pub legs: Vec<Leg>,
}

impl Route {
    /// Creates a route with no explicit legs.
    pub fn new(from: Port, to: Port) -> Self {
        Self {
            from,
            to,
            legs: Vec::new(),
        }
    }

    /// Appends a horizontal run.
    pub fn horizontal(mut self, target: Coord) -> Self {
        self.legs.push(Leg::Horizontal(target));
        self
    }

    /// Appends a vertical run.
    pub fn vertical(mut self, target: Coord) -> Self {
        self.legs.push(Leg::Vertical(target));
        self
    }

    /// Computes the polyline for this route in `layout`.
    ///
    /// The result always has at least two points; the first lies on the
    /// source port, the last on the destination port.
    pub fn compute(&self, layout: &Layout) -> RouteResult<Vec<Point>> {
        let src = layout
            .rect(&self.from.component)
            .ok_or_else(|| RouteError::MissingComponent(self.from.component.clone()))?;
        let dst = layout
            .rect(&self.to.component)
            .ok_or_else(|| RouteError::MissingComponent(self.to.component.clone()))?;

        let start = src.port(self.from.side, self.from.at);
        let end = dst.port(self.to.side, self.to.at);

        let mut points = vec![start];
        let mut cur = start;

        for leg in &self.legs {
            cur = match leg {
                Leg::Horizontal(target) => Point::new(resolve(target, layout, src, dst)?, cur.y),
                Leg::Vertical(target) => Point::new(cur.x, resolve(target, layout, src, dst)?),
            };
            push_point(&mut points, cur);
        }

        let corner = match self.to.side {
            Side::Top | Side::Bottom => Point::new(end.x, cur.y),
            Side::Left | Side::Right | Side::Center => Point::new(cur.x, end.y),
        };
        push_point(&mut points, corner);
        push_point(&mut points, end);

        if points.len() < 2 {
            points.push(end);
        }
        Ok(points)
    }
}

fn resolve(
    coord: &Coord,
    layout: &Layout,
    src: &ComponentRect,
    dst: &ComponentRect,
) -> RouteResult<f64> {
    match coord {
        Coord::Line(name) => layout
            .line(name)
            .ok_or_else(|| RouteError::MissingLine(name.clone())),
        Coord::Source(edge, offset) => Ok(edge.of(src) + offset * layout.scale()),
        Coord::Destination(edge, offset) => Ok(edge.of(dst) + offset * layout.scale()),
    }
}

fn push_point(points: &mut Vec<Point>, p: Point) {
    match points.last() {
        Some(last) if last.approx_eq(&p, SAME_POINT_EPSILON) => {}
        _ => points.push(p),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentRect;

    fn two_box_layout() -> Layout {
        let mut layout = Layout::new(1.0);
        layout.insert_rect(ComponentRect::new("A", 0.0, 0.0, 10.0, 10.0));
        layout.insert_rect(ComponentRect::new("B", 100.0, 50.0, 10.0, 10.0));
        layout.set_line("mid", 50.0);
        layout
    }

    #[test]
    fn test_direct_route_to_left_port() {
        let route = Route::new(Port::new("A", Side::Right), Port::new("B", Side::Left));
        let points = route.compute(&two_box_layout()).unwrap();
        assert_eq!(
            points,
            vec![
                Point::new(10.0, 5.0),
                Point::new(10.0, 55.0),
                Point::new(100.0, 55.0),
            ]
        );
    }

    #[test]
    fn test_route_through_line() {
        let route = Route::new(Port::new("A", Side::Right), Port::new("B", Side::Left))
            .horizontal(Coord::line("mid"));
        let points = route.compute(&two_box_layout()).unwrap();
        assert_eq!(
            points,
            vec![
                Point::new(10.0, 5.0),
                Point::new(50.0, 5.0),
                Point::new(50.0, 55.0),
                Point::new(100.0, 55.0),
            ]
        );
    }

    #[test]
    fn test_top_port_is_approached_vertically() {
        let route = Route::new(Port::new("A", Side::Bottom), Port::new("B", Side::Top));
        let points = route.compute(&two_box_layout()).unwrap();
        assert_eq!(
            points,
            vec![
                Point::new(5.0, 10.0),
                Point::new(105.0, 10.0),
                Point::new(105.0, 50.0),
            ]
        );
    }

    #[test]
    fn test_offsets_follow_scale() {
        let base = two_box_layout();
        let layout = Layout::from_parts(
            base.rects().map(|r| r.scaled(2.0)).collect::<Vec<_>>(),
            vec![("mid".to_string(), 100.0)],
            2.0,
        );
        let route = Route::new(Port::new("A", Side::Right), Port::new("B", Side::Left))
            .vertical(Coord::src(Edge::Top, -5.0));
        let points = route.compute(&layout).unwrap();
        assert_eq!(points[1], Point::new(20.0, -10.0));
    }

    #[test]
    fn test_degenerate_route_keeps_two_points() {
        let mut layout = Layout::new(1.0);
        layout.insert_rect(ComponentRect::new("A", 0.0, 0.0, 10.0, 10.0));
        let route = Route::new(Port::new("A", Side::Center), Port::new("A", Side::Center));
        let points = route.compute(&layout).unwrap();
        assert_eq!(points.len(), 2);
    }

    #[test]
    fn test_missing_component_and_line() {
        let layout = two_box_layout();
        let missing = Route::new(Port::new("A", Side::Right), Port::new("C", Side::Left));
        assert_eq!(
            missing.compute(&layout),
            Err(RouteError::MissingComponent("C".to_string()))
        );

        let bad_line = Route::new(Port::new("A", Side::Right), Port::new("B", Side::Left))
            .horizontal(Coord::line("nowhere"));
        assert_eq!(
            bad_line.compute(&layout),
            Err(RouteError::MissingLine("nowhere".to_string()))
        );
    }
}
