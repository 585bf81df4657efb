//! # Orchestrator
//!
//! Container lifecycle: start/stop state machine, one background context per
//! active container, bounded shutdown, epoch-fenced reading callbacks and the
//! multi-container [`Simulation`] registry.

pub mod container;
pub mod error;
pub mod simulation;

pub use container::{ContainerOrchestrator, StopOutcome};
pub use error::{OrchestratorError, Result};
pub use simulation::Simulation;
