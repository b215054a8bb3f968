//! # datapath-flow
//!
//! Animation engine for instruction data flow through a single-cycle LEGv8
//! datapath diagram.
//!
//! Each instruction format has a flow: six stages (fetch, decode, execute,
//! memory, write back, PC update), each a timed list of operations on
//! tokens ("circles") that travel along the wires of the diagram. The engine
//! schedules those operations on a virtual clock, routes tokens over the
//! component layout and emits [`VisualEvent`]s for a renderer to draw.
//!
//! ## Design Principles
//!
//! - **Flows are data**: every flow is built from shared stage templates and
//!   validated once at load time by replaying token lifetimes.
//! - **Virtual time**: nothing waits on the wall clock. Timers fire in
//!   `(deadline, seq)` order, so the same inputs always give the same events.
//! - **Race-free cancellation**: each run has a generation; timers from an
//!   older generation are dropped.
//! - **Injected collaborators**: the CPU simulator, component layout and wire
//!   registry are passed in; the engine owns no globals.
//!
//! ## Features
//!
//! - `parallel` - Validate flows in parallel using rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use datapath_flow::{EventPayload, Orchestrator, RunState, SnapshotCore};
//!
//! let core = SnapshotCore::with_instruction("LDUR X1, [X2, #8]").set_register(2, 64);
//! let mut orchestrator = Orchestrator::standard(core);
//!
//! orchestrator.start(0).unwrap();
//! while let Some(deadline) = orchestrator.next_deadline() {
//!     orchestrator.advance_to(deadline);
//! }
//!
//! let events = orchestrator.drain_events();
//! assert!(matches!(events.last().unwrap().payload, EventPayload::FlowCompleted { .. }));
//! assert_eq!(orchestrator.state(), RunState::Done);
//!
//! let stats = orchestrator.export_stats();
//! println!("Final time: {}", stats["orchestrator"]["current_time"]);
//! ```
//!
//! ## Real-time Playback
//!
//! ```rust,ignore
//! use datapath_flow::{Orchestrator, Player, SystemClock};
//!
//! let mut player = Player::new(Orchestrator::standard(core), SystemClock::new());
//! let stop = player.stop_handle();   // call stop.stop() from another thread
//! player.play()?;
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use datapath_flow::config::EngineConfig;
//!
//! let config = EngineConfig::from_file("animation.yaml")?;
//! datapath_flow::init_logging(&config.log_level);
//! ```

pub mod types;
pub mod component;
pub mod wire;
pub mod token;
pub mod flow;
pub mod label;
pub mod event;
pub mod config;
pub mod stats;
pub mod analysis;
pub mod scheduler;

// Re-export commonly used types
pub use types::{ComponentId, Millis, Point, TokenId};
pub use component::{ComponentRect, ComponentRegistry, Layout, Side};
pub use wire::{create_default_registry, PipelineStage, WireConnection, WireError, WirePathRegistry};
pub use token::{DataType, Token};
pub use flow::{Flow, FlowDefect, FlowLibrary, FlowResolution, InstructionFormat, Operation, OperationKind, Stage};
pub use label::{resolve_label, CpuCore, DecodedInstruction, SnapshotCore};
pub use event::{EventListener, EventPayload, HighlightKind, VisualEvent};
pub use config::{ConfigError, EngineConfig, EngineConfigBuilder};
pub use stats::RunStats;
pub use analysis::{find_shared_segments, SharedSegment};
pub use scheduler::{Clock, ManualClock, Orchestrator, Player, RunState, SchedulerError, StopHandle, SystemClock};

/// Initialize the tracing subscriber for logging.
///
/// Call this at the start of your program to enable logging. `RUST_LOG`
/// takes precedence over `level`.
///
/// # Example
///
/// ```rust,ignore
/// datapath_flow::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();
}
