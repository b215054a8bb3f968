//! Component registry: the coordinate source of truth for functional units.
//!
//! Every functional unit of the datapath (PC, instruction memory, register
//! file, ALUs, multiplexers, gates...) is described by a rectangle in canvas
//! coordinates. Connection points are always derived from the current
//! rectangle and never cached, so a re-scale is picked up by the next read.
//!
//! The registry hands out immutable [`Layout`] snapshots. `initialize()`
//! swaps the whole table at once, so a reader holding a snapshot never sees a
//! partially updated layout.
//!
//! # Example
//!
//! ```
//! use datapath_flow::component::{ComponentRegistry, Layout, Side};
//!
//! let registry = ComponentRegistry::new(Layout::standard(1.0));
//! let pc_right = registry.connection_point("PC", Side::Right).unwrap();
//!
//! registry.rescale(2.0);
//! let scaled = registry.connection_point("PC", Side::Right).unwrap();
//! assert_eq!(scaled.x, pc_right.x * 2.0);
//! ```

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::types::{ComponentId, Point};

/// Errors raised by component lookups.
///
/// `NotFound` is recoverable: callers treat it as "component currently
/// absent from the diagram" and skip the dependent visual.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComponentError {
    #[error("component not found: {0}")]
    NotFound(ComponentId),
}

/// A side (or the center) of a component rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Top,
    Bottom,
    Left,
    Right,
    Center,
}

/// Rectangle occupied by one functional unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComponentRect {
    pub id: ComponentId,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ComponentRect {
    /// Creates a new rectangle.
    pub fn new(id: impl Into<ComponentId>, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            width,
            height,
        }
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Midpoint of the given side, or the center.
    pub fn connection_point(&self, side: Side) -> Point {
        self.port(side, 0.5)
    }

    /// A point along `side` at `fraction` (0.0 = top/left end, 1.0 = bottom/right end).
    ///
    /// `fraction` is clamped to `[0, 1]`. For `Side::Center` the fraction is ignored.
    pub fn port(&self, side: Side, fraction: f64) -> Point {
        let f = fraction.clamp(0.0, 1.0);
        match side {
            Side::Top => Point::new(self.x + self.width * f, self.top()),
            Side::Bottom => Point::new(self.x + self.width * f, self.bottom()),
            Side::Left => Point::new(self.left(), self.y + self.height * f),
            Side::Right => Point::new(self.right(), self.y + self.height * f),
            Side::Center => self.center(),
        }
    }

    /// Returns true if `p` lies on (or within `epsilon` of) the rectangle outline.
    pub fn on_boundary(&self, p: &Point, epsilon: f64) -> bool {
        let within_x = p.x >= self.left() - epsilon && p.x <= self.right() + epsilon;
        let within_y = p.y >= self.top() - epsilon && p.y <= self.bottom() + epsilon;
        if !(within_x && within_y) {
            return false;
        }
        (p.x - self.left()).abs() <= epsilon
            || (p.x - self.right()).abs() <= epsilon
            || (p.y - self.top()).abs() <= epsilon
            || (p.y - self.bottom()).abs() <= epsilon
    }

    /// Returns a copy with every coordinate multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            id: self.id.clone(),
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
        }
    }
}

/// Unit rectangles of the built-in LEGv8 single-cycle datapath at scale 1.0.
const STANDARD_RECTS: &[(&str, f64, f64, f64, f64)] = &[
    ("PC", 40.0, 300.0, 40.0, 80.0),
    ("InstructionMemory", 120.0, 280.0, 110.0, 140.0),
    ("ALUPC", 140.0, 60.0, 50.0, 70.0),
    ("Control", 330.0, 80.0, 70.0, 190.0),
    ("MuxReg2Loc", 300.0, 350.0, 20.0, 60.0),
    ("RegFile", 380.0, 290.0, 130.0, 160.0),
    ("SignExtend", 420.0, 500.0, 60.0, 60.0),
    ("ShiftLeft2", 560.0, 130.0, 50.0, 40.0),
    ("ALUBranch", 650.0, 70.0, 60.0, 90.0),
    ("ALUControl", 600.0, 510.0, 60.0, 50.0),
    ("MuxALUSrc", 570.0, 360.0, 20.0, 70.0),
    ("ALUMain", 640.0, 300.0, 80.0, 140.0),
    ("DataMemory", 790.0, 290.0, 120.0, 160.0),
    ("MuxMemToReg", 960.0, 340.0, 20.0, 70.0),
    ("ZeroAND", 800.0, 170.0, 40.0, 30.0),
    ("BranchOR", 870.0, 110.0, 40.0, 30.0),
    ("MuxPC", 980.0, 40.0, 20.0, 70.0),
];

/// Shared vertical routing lines (x-coordinates at scale 1.0).
const STANDARD_LINES: &[(&str, f64)] = &[
    ("pc_feedback", 20.0),
    ("pc_out", 100.0),
    ("pc_tap", 105.0),
    ("pc4_out", 210.0),
    ("instr_bus", 270.0),
    ("wb_return", 365.0),
    ("rd2", 530.0),
    ("imm_bus", 540.0),
    ("store_data", 545.0),
    ("ctl_aluop", 550.0),
    ("ctl_alusrc", 555.0),
    ("rd1", 600.0),
    ("alu_b", 615.0),
    ("branch_pc_in", 625.0),
    ("sl2_out", 630.0),
    ("alu_zero", 745.0),
    ("alu_out", 760.0),
    ("dm_in", 770.0),
    ("ctl_branch", 780.0),
    ("uncond_drop", 848.0),
    ("and_out", 858.0),
    ("dm_out", 930.0),
    ("wb_mux_in", 940.0),
    ("branch_target", 950.0),
    ("wb_out", 1010.0),
    ("pc_loop", 1030.0),
];

/// An immutable snapshot of the component table and routing lines.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Layout {
    scale: f64,
    rects: BTreeMap<ComponentId, ComponentRect>,
    vertical_lines: BTreeMap<String, f64>,
}

impl Default for Layout {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Layout {
    /// Creates an empty layout at the given scale.
    pub fn new(scale: f64) -> Self {
        Self {
            scale,
            rects: BTreeMap::new(),
            vertical_lines: BTreeMap::new(),
        }
    }

    /// The built-in LEGv8 single-cycle datapath layout, scaled uniformly.
    pub fn standard(scale: f64) -> Self {
        let mut layout = Self::new(scale);
        for &(id, x, y, w, h) in STANDARD_RECTS {
            layout.insert_rect(ComponentRect::new(id, x, y, w, h).scaled(scale));
        }
        for &(name, x) in STANDARD_LINES {
            layout.set_line(name, x * scale);
        }
        layout
    }

    /// Builds a layout from explicit rectangles and lines.
    pub fn from_parts(
        rects: impl IntoIterator<Item = ComponentRect>,
        vertical_lines: impl IntoIterator<Item = (String, f64)>,
        scale: f64,
    ) -> Self {
        let mut layout = Self::new(scale);
        for rect in rects {
            layout.insert_rect(rect);
        }
        for (name, x) in vertical_lines {
            layout.set_line(name, x);
        }
        layout
    }

    /// Adds or replaces a rectangle.
    pub fn insert_rect(&mut self, rect: ComponentRect) {
        self.rects.insert(rect.id.clone(), rect);
    }

    /// Removes a rectangle, returning it if present.
    pub fn remove_rect(&mut self, id: &str) -> Option<ComponentRect> {
        self.rects.remove(id)
    }

    /// Adds or replaces a named vertical routing line.
    pub fn set_line(&mut self, name: impl Into<String>, x: f64) {
        self.vertical_lines.insert(name.into(), x);
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn rect(&self, id: &str) -> Option<&ComponentRect> {
        self.rects.get(id)
    }

    pub fn line(&self, name: &str) -> Option<f64> {
        self.vertical_lines.get(name).copied()
    }

    pub fn rects(&self) -> impl Iterator<Item = &ComponentRect> {
        self.rects.values()
    }

    pub fn lines(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.vertical_lines.iter()
    }

    pub fn len(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }
}

struct RegistryState {
    layout: Arc<Layout>,
    generation: u64,
}

/// Holds the current layout and swaps it atomically on re-initialization.
///
/// Single writer, many readers. Readers take an `Arc<Layout>` snapshot and
/// keep a consistent view for as long as they hold it.
pub struct ComponentRegistry {
    state: RwLock<RegistryState>,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new(Layout::standard(1.0))
    }
}

impl ComponentRegistry {
    /// Creates a registry holding `layout`.
    pub fn new(layout: Layout) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                layout: Arc::new(layout),
                generation: 0,
            }),
        }
    }

    /// Replaces the whole component table at once.
    pub fn initialize(
        &self,
        rects: impl IntoIterator<Item = ComponentRect>,
        vertical_lines: impl IntoIterator<Item = (String, f64)>,
        scale: f64,
    ) {
        self.install(Layout::from_parts(rects, vertical_lines, scale));
    }

    /// Installs a prebuilt layout.
    pub fn install(&self, layout: Layout) {
        let layout = Arc::new(layout);
        let mut state = self.state.write();
        state.layout = layout;
        state.generation += 1;
        tracing::debug!(
            generation = state.generation,
            components = state.layout.len(),
            scale = state.layout.scale(),
            "component table replaced"
        );
    }

    /// Rebuilds the standard layout at a new scale.
    pub fn rescale(&self, scale: f64) {
        self.install(Layout::standard(scale));
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<Layout> {
        Arc::clone(&self.state.read().layout)
    }

    /// Number of times the table has been replaced.
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    pub fn get(&self, id: &str) -> Result<ComponentRect, ComponentError> {
        self.snapshot()
            .rect(id)
            .cloned()
            .ok_or_else(|| ComponentError::NotFound(id.to_string()))
    }

    pub fn connection_point(&self, id: &str, side: Side) -> Result<Point, ComponentError> {
        self.get(id).map(|rect| rect.connection_point(side))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.snapshot().rect(id).is_some()
    }

    pub fn component_ids(&self) -> Vec<ComponentId> {
        self.snapshot().rects().map(|r| r.id.clone()).collect()
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("ComponentRegistry")
            .field("generation", &state.generation)
            .field("components", &state.layout.len())
            .field("scale", &state.layout.scale())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_points() {
        let rect = ComponentRect::new("ALU", 100.0, 200.0, 40.0, 80.0);
        assert_eq!(rect.connection_point(Side::Top), Point::new(120.0, 200.0));
        assert_eq!(rect.connection_point(Side::Bottom), Point::new(120.0, 280.0));
        assert_eq!(rect.connection_point(Side::Left), Point::new(100.0, 240.0));
        assert_eq!(rect.connection_point(Side::Right), Point::new(140.0, 240.0));
        assert_eq!(rect.connection_point(Side::Center), Point::new(120.0, 240.0));
    }

    #[test]
    fn test_port_fraction_is_clamped() {
        let rect = ComponentRect::new("M", 0.0, 0.0, 10.0, 100.0);
        assert_eq!(rect.port(Side::Left, 0.25), Point::new(0.0, 25.0));
        assert_eq!(rect.port(Side::Left, 2.0), Point::new(0.0, 100.0));
    }

    #[test]
    fn test_on_boundary() {
        let rect = ComponentRect::new("R", 0.0, 0.0, 10.0, 10.0);
        assert!(rect.on_boundary(&Point::new(0.0, 5.0), 0.01));
        assert!(rect.on_boundary(&Point::new(10.5, 5.0), 1.0));
        assert!(!rect.on_boundary(&Point::new(5.0, 5.0), 1.0));
        assert!(!rect.on_boundary(&Point::new(20.0, 5.0), 1.0));
    }

    #[test]
    fn test_standard_layout() {
        let layout = Layout::standard(1.0);
        assert_eq!(layout.len(), STANDARD_RECTS.len());
        assert!(layout.rect("RegFile").is_some());
        assert_eq!(layout.line("instr_bus"), Some(270.0));
    }

    #[test]
    fn test_registry_not_found_is_recoverable() {
        let registry = ComponentRegistry::default();
        assert_eq!(
            registry.get("FloatingPointUnit"),
            Err(ComponentError::NotFound("FloatingPointUnit".to_string()))
        );
        assert!(registry.connection_point("FloatingPointUnit", Side::Top).is_err());
    }

    #[test]
    fn test_initialize_replaces_whole_table() {
        let registry = ComponentRegistry::default();
        let before = registry.snapshot();

        registry.initialize(
            vec![ComponentRect::new("PC", 0.0, 0.0, 10.0, 10.0)],
            vec![("pc_out".to_string(), 15.0)],
            0.5,
        );

        // The old snapshot is untouched.
        assert!(before.rect("RegFile").is_some());

        let after = registry.snapshot();
        assert_eq!(after.len(), 1);
        assert_eq!(after.scale(), 0.5);
        assert!(!registry.contains("RegFile"));
        assert_eq!(registry.generation(), 1);
    }

    #[test]
    fn test_rescale_recomputes_points() {
        let registry = ComponentRegistry::default();
        let p1 = registry.connection_point("ALUMain", Side::Center).unwrap();
        registry.rescale(1.5);
        let p2 = registry.connection_point("ALUMain", Side::Center).unwrap();
        assert_eq!(p2, Point::new(p1.x * 1.5, p1.y * 1.5));
    }
}
