pub mod data_plane;
pub mod determinism;
