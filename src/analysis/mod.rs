pub mod clustering;
pub mod linked_units;
