pub mod elements;
pub mod environment;

pub use environment::{chemical_environment, ChemicalEnvironment};
