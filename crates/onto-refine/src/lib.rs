//! Onto Refine - Critique and refinement of extracted ontologies
//!
//! - Ontology critic: six quality dimensions, weighted overall, typed findings
//! - Action table mapping critic findings to parameter adjustments
//! - EWMA score trend for reporting
//! - Refinement mediator: the round-based generate, critique, refine loop
//!
//! Author: hephaex@gmail.com

pub mod actions;
pub mod critic;
pub mod mediator;
pub mod trend;

pub use actions::{plan_actions, AppliedAction, Knob, RefinementAction, ACTION_TABLE};
pub use critic::OntologyCritic;
pub use mediator::{
    CancelHandle, RefinementMediator, RefinementPhase, RefinementState, RoundRecord,
};
pub use trend::{ScoreTrend, TrendDirection};
