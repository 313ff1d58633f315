pub mod header;
pub mod overscan;

pub use header::detect_header_geometry;
pub use overscan::{detect_overscan_geometry, zero_run_boundaries};
