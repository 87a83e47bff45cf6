//! The genotype filtering engine: condition compiler (C4), bitwise scanner
//! (C5), compound-het engine (C6), packed-bitmask set algebra (C7), and the
//! filter pipeline orchestrator (C8).

pub mod cancel;
pub mod compound;
pub mod condition;
pub mod orchestrator;
pub mod packed;
pub mod scanner;

pub use cancel::{new_token, CancellationToken};
pub use condition::GenotypeScenario;
pub use orchestrator::{evaluate, EvaluateRequest};
