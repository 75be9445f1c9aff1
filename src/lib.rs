//! Evolving soft-body organisms: point-mass bodies driven by evolvable brains,
//! living on a chunked grid under a fixed-order simulation step.

pub mod arena;
pub mod brain;
pub mod codec;
pub mod config;
pub mod energy;
pub mod environment;
pub mod error;
pub mod gene;
pub mod genome;
pub mod grid;
pub mod organism;
pub mod physics;
pub mod reproduction;
pub mod save_load;
pub mod stats;
pub mod terrain;
pub mod wiring;

pub use arena::OrganismId;
pub use config::SimConfig;
pub use environment::{Environment, TickReport};
pub use genome::{Genome, GenomeKind};
pub use organism::{Organism, OrganismView};
