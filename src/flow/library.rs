//! Mnemonic → flow lookup.
//!
//! The library is built once at startup. Every flow is validated eagerly
//! against the wire registry; defects are logged and kept for inspection but
//! never stop the engine from loading.
//!
//! # Example
//!
//! ```
//! use datapath_flow::flow::FlowLibrary;
//! use datapath_flow::wire::create_default_registry;
//!
//! let wires = create_default_registry();
//! let library = FlowLibrary::load(&wires);
//! assert!(library.defects().is_empty());
//!
//! let add = library.resolve("add");
//! assert!(!add.fallback);
//! assert_eq!(add.flow.name, "ADD");
//!
//! let unknown = library.resolve("FOO");
//! assert!(unknown.fallback);
//! ```

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use std::collections::HashMap;
use std::sync::Arc;

use crate::flow::templates::InstructionFormat;
use crate::flow::validate::{validate_flow, FlowDefect};
use crate::flow::Flow;
use crate::wire::WirePathRegistry;

/// Mnemonic used when an instruction has no flow of its own.
pub const DEFAULT_MNEMONIC: &str = "ADD";

/// Outcome of looking up a mnemonic.
#[derive(Clone, Debug)]
pub struct FlowResolution {
    pub flow: Arc<Flow>,
    /// True when the mnemonic was unknown and the default flow was used.
    pub fallback: bool,
}

/// Flows keyed by upper-case mnemonic.
#[derive(Clone, Debug)]
pub struct FlowLibrary {
    flows: HashMap<String, Arc<Flow>>,
    default: Arc<Flow>,
    defects: Vec<FlowDefect>,
}

fn validate_all(flows: &[Flow], wires: &WirePathRegistry) -> Vec<FlowDefect> {
    #[cfg(feature = "parallel")]
    let defects: Vec<FlowDefect> = flows
        .par_iter()
        .flat_map_iter(|flow| validate_flow(flow, wires))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let defects: Vec<FlowDefect> = flows
        .iter()
        .flat_map(|flow| validate_flow(flow, wires))
        .collect();

    defects
}

impl FlowLibrary {
    /// Instantiates the template of every supported mnemonic and validates
    /// the result against `wires`.
    pub fn load(wires: &WirePathRegistry) -> Self {
        let flows: Vec<Flow> = InstructionFormat::ALL
            .into_iter()
            .flat_map(|format| format.mnemonics().iter().map(move |m| format.flow(*m)))
            .collect();

        let defects = validate_all(&flows, wires);
        for defect in &defects {
            tracing::warn!(%defect, "flow definition defect");
        }

        let flows: HashMap<String, Arc<Flow>> = flows
            .into_iter()
            .map(|flow| (flow.name.clone(), Arc::new(flow)))
            .collect();
        let default = flows
            .get(DEFAULT_MNEMONIC)
            .cloned()
            .unwrap_or_else(|| Arc::new(InstructionFormat::R.flow(DEFAULT_MNEMONIC)));

        tracing::info!(
            flows = flows.len(),
            defects = defects.len(),
            "flow library loaded"
        );

        Self {
            flows,
            default,
            defects,
        }
    }

    /// Adds or replaces the flow for `mnemonic`, returning its defects.
    pub fn insert(&mut self, mnemonic: &str, flow: Flow, wires: &WirePathRegistry) -> Vec<FlowDefect> {
        let found = validate_flow(&flow, wires);
        for defect in &found {
            tracing::warn!(%defect, "flow definition defect");
        }
        self.defects.extend(found.iter().cloned());
        self.flows
            .insert(mnemonic.trim().to_ascii_uppercase(), Arc::new(flow));
        found
    }

    /// Looks up the flow for `mnemonic`, case-insensitively.
    ///
    /// Unknown mnemonics resolve to the default R-format flow with a warning.
    pub fn resolve(&self, mnemonic: &str) -> FlowResolution {
        let key = mnemonic.trim().to_ascii_uppercase();
        match self.flows.get(&key) {
            Some(flow) => FlowResolution {
                flow: Arc::clone(flow),
                fallback: false,
            },
            None => {
                tracing::warn!(
                    mnemonic = %mnemonic,
                    fallback = %self.default.name,
                    "no flow for instruction, using default"
                );
                FlowResolution {
                    flow: Arc::clone(&self.default),
                    fallback: true,
                }
            }
        }
    }

    pub fn contains(&self, mnemonic: &str) -> bool {
        self.flows.contains_key(&mnemonic.trim().to_ascii_uppercase())
    }

    /// Every defect found while loading or inserting flows.
    pub fn defects(&self) -> &[FlowDefect] {
        &self.defects
    }

    /// Registered mnemonics, sorted.
    pub fn mnemonics(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.flows.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}
