pub mod average;
pub mod flat_field;
pub mod gain;
pub mod noise;
pub mod reference;

pub use average::average_frames;
pub use flat_field::flat_field_into;
pub use gain::{compute_gain, median, GainTable};
pub use noise::{build_noise_cube, prepare_noise_cube, NoiseCube};
pub use reference::{load_or_build, CachePaths, ReferenceFrames, ReferenceInputs};
