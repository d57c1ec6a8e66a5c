// Consensus: proof of work and block validation

pub mod pow;
pub mod validation;

pub use pow::{ProofOfWork, Target, MiningResult};
pub use validation::{BlockValidator, ValidationError};
