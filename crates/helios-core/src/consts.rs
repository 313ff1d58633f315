/// Maximum number of bursts the reconstruction tool accepts in one invocation.
/// Burst indices are split into `batch = index / BURSTS_PER_BATCH` and
/// `within = index % BURSTS_PER_BATCH`.
pub const BURSTS_PER_BATCH: usize = 1000;

/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Averaging and noise-cube progress is logged every this many frames.
pub const PROGRESS_LOG_INTERVAL: usize = 100;

/// Capacity of the channel carrying external process output lines.
pub const PROCESS_LOG_CHANNEL_CAPACITY: usize = 256;

/// FITS logical record size in bytes.
pub const FITS_BLOCK_SIZE: usize = 2880;

/// FITS header card size in bytes.
pub const FITS_CARD_SIZE: usize = 80;

/// Descriptor file carrying path stems and burst indices.
pub const INIT_FILE_NAME: &str = "init_file.dat";

/// Descriptor file carrying reconstruction method parameters.
pub const INIT_METHOD_NAME: &str = "init_method.dat";

/// Descriptor file carrying instrument properties.
pub const INIT_PROPS_NAME: &str = "init_props.dat";

/// Extension appended by the reconstruction tool to its output images.
pub const RECONSTRUCTED_EXTENSION: &str = "final";

/// Extension of per-burst metadata sidecars (appended to the cube file name).
pub const SIDECAR_EXTENSION: &str = "txt";

/// Sub-directories of the work directory created for every run.
pub const PRE_SPECKLE_DIR: &str = "preSpeckle";
pub const SPECKLE_DIR: &str = "speckle";
pub const POST_SPECKLE_DIR: &str = "postSpeckle";

/// Search-path variables prepended before spawning the reconstruction tool.
pub const PATH_VAR: &str = "PATH";
pub const LIBRARY_PATH_VAR: &str = "LD_LIBRARY_PATH";
