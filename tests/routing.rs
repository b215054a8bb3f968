//! Routing properties over randomized layouts.

use proptest::prelude::*;

use datapath_flow::component::Layout;
use datapath_flow::types::Point;
use datapath_flow::{create_default_registry, ComponentRect, ComponentRegistry, WireError};

const EPSILON: f64 = 1e-6;

/// The standard layout at `scale`, each rectangle nudged by one offset.
fn perturbed(scale: f64, offsets: &[(f64, f64)]) -> Layout {
    let standard = Layout::standard(scale);
    let rects: Vec<ComponentRect> = standard
        .rects()
        .zip(offsets.iter().cycle())
        .map(|(rect, &(dx, dy))| {
            let mut moved = rect.clone();
            moved.x += dx * scale;
            moved.y += dy * scale;
            moved
        })
        .collect();
    let lines: Vec<(String, f64)> = standard.lines().map(|(name, x)| (name.clone(), *x)).collect();
    Layout::from_parts(rects, lines, scale)
}

fn is_manhattan(path: &[Point]) -> bool {
    path.windows(2)
        .all(|pair| (pair[0].x - pair[1].x).abs() < EPSILON || (pair[0].y - pair[1].y).abs() < EPSILON)
}

// ============================================================================
// Fixed layouts
// ============================================================================

#[test]
fn test_every_wire_routes_on_standard_layout() {
    let wires = create_default_registry();
    let layout = Layout::standard(1.0);
    for conn in wires.connections() {
        let path = conn.compute(&layout).unwrap();
        assert!(path.len() >= 2, "{}", conn.name);
        assert!(is_manhattan(&path), "{} is not orthogonal: {:?}", conn.name, path);
    }
}

#[test]
fn test_missing_component_is_recoverable() {
    let wires = create_default_registry();
    let mut layout = Layout::standard(1.0);
    layout.remove_rect("DataMemory");

    let err = wires.compute("ALUMain->DataMemory", &layout).unwrap_err();
    assert!(matches!(err, WireError::Route { .. }));
    assert!(wires.compute("PC->ALUPC", &layout).is_ok());
}

#[test]
fn test_rescaled_registry_scales_paths() {
    let wires = create_default_registry();
    let registry = ComponentRegistry::default();
    let before = wires.compute("RegFile->ALUMain", &registry.snapshot()).unwrap();

    registry.rescale(1.5);
    let after = wires.compute("RegFile->ALUMain", &registry.snapshot()).unwrap();

    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(&after) {
        assert!(b.approx_eq(&Point::new(a.x * 1.5, a.y * 1.5), EPSILON));
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_endpoints_lie_on_boundaries(
        scale in 0.5f64..3.0,
        offsets in prop::collection::vec((-5.0f64..5.0, -5.0f64..5.0), 17),
    ) {
        let wires = create_default_registry();
        let layout = perturbed(scale, &offsets);

        for conn in wires.connections() {
            let path = conn.compute(&layout).unwrap();
            prop_assert!(path.len() >= 2);
            prop_assert!(is_manhattan(&path));

            let source = layout.rect(conn.source()).unwrap();
            let destination = layout.rect(conn.destination()).unwrap();
            prop_assert!(source.on_boundary(&path[0], EPSILON), "{} start {:?}", conn.name, path[0]);
            prop_assert!(
                destination.on_boundary(&path[path.len() - 1], EPSILON),
                "{} end {:?}",
                conn.name,
                path[path.len() - 1]
            );
        }
    }

    #[test]
    fn prop_routing_is_deterministic(scale in 0.25f64..4.0) {
        let wires = create_default_registry();
        let layout = Layout::standard(scale);
        for conn in wires.connections() {
            prop_assert_eq!(conn.compute(&layout).unwrap(), conn.compute(&layout).unwrap());
        }
    }
}
