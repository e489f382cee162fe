//! Run parameters and the nondimensional constitutive model.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Shear viscosity of the solid matrix (the viscosity scale).
pub const SHEAR_VISCOSITY: f64 = 1.0;
/// Porosity floor used in the bulk viscosity.
pub const PHI_MIN: f64 = 1e-4;
/// Reference porosity of the permeability law.
pub const PHI_REF: f64 = 0.01;

#[derive(Debug, Error, PartialEq)]
pub enum ParamsError {
    #[error("invalid parameter `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Nondimensional physical parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalParams {
    /// Damkohler number scaling the melting rate.
    pub da: f64,
    /// Bulk-to-shear viscosity ratio.
    #[serde(rename = "R")]
    pub viscosity_ratio: f64,
    /// Buoyancy number.
    #[serde(rename = "B")]
    pub buoyancy_number: f64,
    /// Melt/solid dihedral angle in degrees.
    pub theta: f64,
    /// Compaction length over domain radius.
    #[serde(rename = "dL")]
    pub compaction_length: f64,
}

impl PhysicalParams {
    pub fn shear_viscosity(&self) -> f64 {
        SHEAR_VISCOSITY
    }

    /// `zeta(phi) = R / max(phi, PHI_MIN)`
    pub fn bulk_viscosity(&self, phi: f64) -> f64 {
        self.viscosity_ratio / phi.max(PHI_MIN)
    }

    /// `k(phi) = dL^2 cos^2(theta / 2) (phi / PHI_REF)^3`, zero for `phi <= 0`.
    pub fn permeability(&self, phi: f64) -> f64 {
        let geometric = (0.5 * self.theta.to_radians()).cos().powi(2);
        self.compaction_length.powi(2) * geometric * (phi.max(0.0) / PHI_REF).powi(3)
    }
}

/// Everything a run reads from the parameter file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    pub logfile: PathBuf,
    /// Write time-series output every `out_freq` steps.
    pub out_freq: usize,
    #[serde(rename = "T")]
    pub end_time: f64,
    pub dt: f64,
    /// Courant number threshold, used as a diagnostic only.
    pub cfl: f64,
    #[serde(flatten)]
    pub physics: PhysicalParams,
    /// Cells per axis of the sphere mesh.
    #[serde(default = "default_resolution")]
    pub resolution: usize,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_resolution() -> usize {
    6
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl SimulationParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        let invalid = |key, reason: &str| {
            Err(ParamsError::Invalid {
                key,
                reason: reason.to_string(),
            })
        };
        if self.out_freq == 0 {
            return invalid("out_freq", "must be at least 1");
        }
        let positive = [
            ("T", self.end_time),
            ("dt", self.dt),
            ("cfl", self.cfl),
            ("R", self.physics.viscosity_ratio),
        ];
        for (key, value) in positive {
            if value.is_nan() || value <= 0.0 || value.is_infinite() {
                return invalid(key, "must be a positive finite number");
            }
        }
        if self.resolution == 0 {
            return invalid("resolution", "must be at least 1");
        }
        let finite = [
            ("da", self.physics.da),
            ("B", self.physics.buoyancy_number),
            ("theta", self.physics.theta),
            ("dL", self.physics.compaction_length),
        ];
        for (key, value) in finite {
            if !value.is_finite() {
                return invalid(key, "must be finite");
            }
        }
        Ok(())
    }
}
