use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::burst::timestamp::ObservationClock;
use crate::consts::{POST_SPECKLE_DIR, PRE_SPECKLE_DIR, SPECKLE_DIR};
use crate::error::{HeliosError, Result};
use crate::frame::{ImageGeometry, SourceFamily};
use crate::io::file_form::{FileForm, FormFields};

/// Complete description of one calibration and reconstruction run.
///
/// Built once (usually from TOML) and passed by reference to every stage.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub instrument: InstrumentConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub kisip: KisipConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Camera name, used for cache and log file names (`ZYLA`, `ROSA_GBAND`, ...).
    pub name: String,
    pub family: SourceFamily,
    /// Frames per burst cube.
    pub burst_number: usize,
    /// Observation start date, `YYYYMMDD`.
    pub obs_date: String,
    /// Observation start time, `HHMMSS`.
    pub obs_time: String,
    /// Exposure time of one frame in milliseconds.
    pub exposure_ms: f64,
    /// Burst cube file names inside `preSpeckle/`.
    pub burst_form: FileForm,
    /// Reconstructed image names inside `speckle/`.
    pub speckled_form: FileForm,
    /// Noise cube file name inside `preSpeckle/`.
    pub noise_file: String,
    /// Generate the noise cube from the first flat frames.
    pub compute_noise: bool,
    /// Skip detection and use this geometry.
    pub geometry: Option<GeometryOverride>,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            name: "ZYLA".into(),
            family: SourceFamily::RawBuffer,
            burst_number: 64,
            obs_date: String::new(),
            obs_time: String::new(),
            exposure_ms: 1.0,
            burst_form: FileForm::default_burst(),
            speckled_form: FileForm::default_speckled(),
            noise_file: "noise.raw".into(),
            compute_noise: true,
            geometry: None,
        }
    }
}

/// Explicit `(rows, cols)` shapes replacing geometry detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeometryOverride {
    pub data_shape: [usize; 2],
    pub image_shape: [usize; 2],
}

impl GeometryOverride {
    pub fn to_geometry(&self) -> Result<ImageGeometry> {
        ImageGeometry::new(
            (self.data_shape[0], self.data_shape[1]),
            (self.image_shape[0], self.image_shape[1]),
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub dark_base: PathBuf,
    pub dark_pattern: String,
    pub flat_base: PathBuf,
    pub flat_pattern: String,
    pub data_base: PathBuf,
    pub data_pattern: String,
    /// Root of all outputs: caches, descriptors and the
    /// `preSpeckle/`, `speckle/`, `postSpeckle/` directories.
    pub work_base: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dark_base: PathBuf::from("dark"),
            dark_pattern: "*.dat".into(),
            flat_base: PathBuf::from("flat"),
            flat_pattern: "*.dat".into(),
            data_base: PathBuf::from("data"),
            data_pattern: "*.dat".into(),
            work_base: PathBuf::from("work"),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KisipConfig {
    #[serde(default)]
    pub method: KisipMethod,
    #[serde(default)]
    pub props: KisipProps,
    #[serde(default)]
    pub env: KisipEnv,
}

/// Reconstruction method parameters written to `init_method.dat`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KisipMethod {
    /// Method selector understood by the reconstruction tool.
    pub method: u32,
    pub subfield_arcsec: f64,
    /// Phase reconstruction limit, percent of the diffraction limit.
    pub phase_rec_limit: f64,
    pub ux: i64,
    pub uv: i64,
    pub max_iter: u32,
    pub sn_thresh: f64,
    pub weight_exp: f64,
    pub phase_rec_apod: f64,
    pub noise_filter: bool,
}

impl Default for KisipMethod {
    fn default() -> Self {
        Self {
            method: 1,
            subfield_arcsec: 5.0,
            phase_rec_limit: 95.0,
            ux: 10,
            uv: 10,
            max_iter: 30,
            sn_thresh: 80.0,
            weight_exp: 1.2,
            phase_rec_apod: 15.0,
            noise_filter: true,
        }
    }
}

/// Instrument properties written to `init_props.dat`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KisipProps {
    pub arcsec_per_pix_x: f64,
    pub arcsec_per_pix_y: f64,
    pub wavelength_nm: f64,
    /// Bytes to skip at the start of every burst cube.
    pub header_offset: u64,
    pub telescope_diameter_mm: f64,
    pub ao_lock_x: f64,
    pub ao_lock_y: f64,
    pub ao_used: bool,
}

impl Default for KisipProps {
    fn default() -> Self {
        Self {
            arcsec_per_pix_x: 0.1,
            arcsec_per_pix_y: 0.1,
            wavelength_nm: 430.0,
            header_offset: 0,
            telescope_diameter_mm: 760.0,
            ao_lock_x: -1.0,
            ao_lock_y: -1.0,
            ao_used: true,
        }
    }
}

/// Location and parallelism of the reconstruction tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KisipEnv {
    pub bin: PathBuf,
    pub lib: PathBuf,
    pub mpirun: String,
    pub nproc: usize,
    pub exe: String,
}

impl Default for KisipEnv {
    fn default() -> Self {
        Self {
            bin: PathBuf::from("/usr/local/kisip/bin"),
            lib: PathBuf::from("/usr/local/kisip/lib"),
            mpirun: "mpirun".into(),
            nproc: 4,
            exe: "entry".into(),
        }
    }
}

impl RunConfig {
    /// Check values that cannot be expressed in the types.
    pub fn validate(&self) -> Result<()> {
        let instrument = &self.instrument;
        if instrument.name.trim().is_empty() {
            return Err(HeliosError::Configuration("instrument name is empty".into()));
        }
        if instrument.burst_number == 0 {
            return Err(HeliosError::Configuration("burst_number must be at least 1".into()));
        }
        let digits = |s: &str, n: usize| {
            s.get(..n)
                .is_some_and(|head| head.bytes().all(|b| b.is_ascii_digit()))
        };
        if !digits(&instrument.obs_date, 8) {
            return Err(HeliosError::Configuration(format!(
                "obs_date {:?} is not YYYYMMDD",
                instrument.obs_date
            )));
        }
        if !digits(&instrument.obs_time, 6) {
            return Err(HeliosError::Configuration(format!(
                "obs_time {:?} is not HHMMSS",
                instrument.obs_time
            )));
        }
        if instrument.noise_file.trim().is_empty() {
            return Err(HeliosError::Configuration("noise_file is empty".into()));
        }
        if let Some(geometry) = &instrument.geometry {
            geometry.to_geometry()?;
        }
        if self.kisip.env.nproc == 0 {
            return Err(HeliosError::Configuration("kisip.env.nproc must be at least 1".into()));
        }
        self.observation_clock()?;
        Ok(())
    }

    pub fn observation_clock(&self) -> Result<ObservationClock> {
        ObservationClock::new(
            &self.instrument.obs_date,
            &self.instrument.obs_time,
            self.instrument.exposure_ms,
            self.instrument.burst_number,
        )
    }

    pub fn pre_speckle_dir(&self) -> PathBuf {
        self.paths.work_base.join(PRE_SPECKLE_DIR)
    }

    pub fn speckle_dir(&self) -> PathBuf {
        self.paths.work_base.join(SPECKLE_DIR)
    }

    pub fn post_speckle_dir(&self) -> PathBuf {
        self.paths.work_base.join(POST_SPECKLE_DIR)
    }

    /// `<work>/<INSTRUMENT>_<kind>.fits`.
    pub fn cache_file(&self, kind: &str) -> PathBuf {
        self.paths
            .work_base
            .join(format!("{}_{kind}.fits", self.instrument.name))
    }

    pub fn noise_file(&self) -> PathBuf {
        self.pre_speckle_dir().join(&self.instrument.noise_file)
    }

    /// Path of one burst cube.
    pub fn burst_path(&self, batch: usize, burst: usize) -> PathBuf {
        self.pre_speckle_dir()
            .join(self.instrument.burst_form.render(self.fields(batch, burst)))
    }

    /// Sidecar of one burst cube (`<cube>.txt`).
    pub fn sidecar_path(&self, batch: usize, burst: usize) -> PathBuf {
        sidecar_of(&self.burst_path(batch, burst))
    }

    pub fn fields(&self, batch: usize, burst: usize) -> FormFields<'_> {
        FormFields {
            date: &self.instrument.obs_date,
            time: &self.instrument.obs_time,
            batch,
            burst,
        }
    }

    /// `<work>/<obsTime>_<instrument>.log`, the conventional run log.
    pub fn default_log_file(&self) -> PathBuf {
        self.paths.work_base.join(format!(
            "{}_{}.log",
            self.instrument.obs_time,
            self.instrument.name.to_lowercase()
        ))
    }
}

/// `<path>.txt`.
pub fn sidecar_of(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(crate::consts::SIDECAR_EXTENSION);
    PathBuf::from(name)
}
