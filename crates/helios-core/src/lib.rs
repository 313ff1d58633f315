pub mod burst;
pub mod calibrate;
pub mod consts;
pub mod detection;
pub mod error;
pub mod frame;
pub mod frameset;
pub mod io;
pub mod kisip;
pub mod pipeline;
pub mod source;
pub mod transcribe;
