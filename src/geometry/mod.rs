pub mod cell;
pub mod delaunay;
pub mod intervals;
pub mod periodic;

pub use cell::{dimensions, minimized_cell, vacuum_directions, with_axis_length};
pub use delaunay::TetrahedraDecomposition;
pub use intervals::Intervals;
pub use periodic::{
    displacement_tensor, displacement_tensor_finite, distance_matrix, distance_matrix_radii_pbc,
    neighbour_cells, thickness, wrap_positions, DisplacementTensor,
};
