pub mod analyzer;
pub mod ground_state;
pub mod oracle;
pub mod tables;
pub mod wyckoff;

pub use analyzer::{IdealizedCell, SymmetryAnalyzer, SymmetryDataset};
pub use oracle::{run_isolated, MoyoOracle, OracleCell, OracleDataset, SymmetryOracle};
pub use tables::SymmetryTables;
