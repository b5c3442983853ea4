use crate::boundary::BoundaryPolicy;
use crate::error::{SimError, SimResult};
use crate::grid::Grid;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FluidParams {
    #[serde(default = "default_dt")]
    pub dt: f32,
    #[serde(default)]
    pub diffusion: f32,
    #[serde(default)]
    pub viscosity: f32,
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    #[serde(default)]
    pub boundary: BoundaryPolicy,
    #[serde(default)]
    pub warm_start: bool,
}

fn default_dt() -> f32 {
    0.1
}

fn default_iterations() -> usize {
    10
}

impl Default for FluidParams {
    fn default() -> Self {
        Self {
            dt: default_dt(),
            diffusion: 0.0,
            viscosity: 0.0,
            iterations: default_iterations(),
            boundary: BoundaryPolicy::default(),
            warm_start: false,
        }
    }
}

impl FluidParams {
    pub fn validate(&self) -> SimResult<()> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(invalid("dt", format!("must be finite and > 0, got {}", self.dt)));
        }
        if !(self.diffusion.is_finite() && self.diffusion >= 0.0) {
            return Err(invalid(
                "diffusion",
                format!("must be finite and >= 0, got {}", self.diffusion),
            ));
        }
        if !(self.viscosity.is_finite() && self.viscosity >= 0.0) {
            return Err(invalid(
                "viscosity",
                format!("must be finite and >= 0, got {}", self.viscosity),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FdmSolverConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Residual is checked every `check_interval` iterations, skipping the first.
    #[serde(default = "default_check_interval")]
    pub check_interval: usize,
    /// Bound on the squared residual norm.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_relaxation_weight")]
    pub relaxation_weight: f32,
}

fn default_max_iterations() -> usize {
    500
}

fn default_check_interval() -> usize {
    1
}

fn default_threshold() -> f32 {
    0.5
}

fn default_relaxation_weight() -> f32 {
    1.0
}

impl Default for FdmSolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            check_interval: default_check_interval(),
            threshold: default_threshold(),
            relaxation_weight: default_relaxation_weight(),
        }
    }
}

impl FdmSolverConfig {
    pub fn validate(&self) -> SimResult<()> {
        if self.check_interval == 0 {
            return Err(invalid("check_interval", "must be >= 1".to_string()));
        }
        if !(self.threshold.is_finite() && self.threshold > 0.0) {
            return Err(invalid(
                "threshold",
                format!("must be finite and > 0, got {}", self.threshold),
            ));
        }
        if !(self.relaxation_weight > 0.0 && self.relaxation_weight <= 2.0) {
            return Err(invalid(
                "relaxation_weight",
                format!("must be in (0, 2], got {}", self.relaxation_weight),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    pub width: usize,
    pub height: usize,
    #[serde(default = "default_depth")]
    pub depth: usize,
}

fn default_depth() -> usize {
    1
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 64,
            depth: 1,
        }
    }
}

impl GridConfig {
    pub fn to_grid(&self) -> SimResult<Grid> {
        if self.depth <= 1 {
            Grid::new_2d(self.width, self.height)
        } else {
            Grid::new_3d(self.width, self.height, self.depth)
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub fluid: FluidParams,
    #[serde(default)]
    pub fdm: FdmSolverConfig,
}

impl SimConfig {
    pub fn validate(&self) -> SimResult<()> {
        self.grid.to_grid()?;
        self.fluid.validate()?;
        self.fdm.validate()
    }

    pub fn from_json(json: &str) -> SimResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SimError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> SimResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SimError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> SimResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SimError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&content)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> SimResult<()> {
        let path = path.as_ref();
        let content = self.to_json()?;
        std::fs::write(path, content)
            .map_err(|e| SimError::Config(format!("{}: {e}", path.display())))
    }
}

fn invalid(name: &'static str, reason: String) -> SimError {
    SimError::InvalidParameter { name, reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_solver() {
        let fdm = FdmSolverConfig::default();
        assert_eq!(fdm.max_iterations, 500);
        assert_eq!(fdm.check_interval, 1);
        assert_eq!(fdm.threshold, 0.5);
        assert_eq!(FluidParams::default().iterations, 10);
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = SimConfig::from_json(
            r#"{ "grid": { "width": 32, "height": 16 }, "fluid": { "viscosity": 0.01, "boundary": "walls" } }"#,
        )
        .unwrap();
        assert_eq!(config.grid.depth, 1);
        assert_eq!(config.fluid.boundary, BoundaryPolicy::Walls);
        assert_eq!(config.fluid.iterations, 10);
        assert_eq!(config.fdm, FdmSolverConfig::default());
    }

    #[test]
    fn rejects_bad_values() {
        let mut fluid = FluidParams::default();
        fluid.dt = 0.0;
        assert!(matches!(
            fluid.validate(),
            Err(SimError::InvalidParameter { name: "dt", .. })
        ));
        let fdm = FdmSolverConfig {
            check_interval: 0,
            ..FdmSolverConfig::default()
        };
        assert!(fdm.validate().is_err());
        assert!(SimConfig::from_json(r#"{ "grid": { "width": 2, "height": 8 } }"#).is_err());
        assert!(matches!(SimConfig::from_json("{"), Err(SimError::Config(_))));
    }

    #[test]
    fn json_round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("stable_fluids_cfg_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sim.json");
        let mut config = SimConfig::default();
        config.grid.depth = 8;
        config.fluid.warm_start = true;
        config.save(&path).unwrap();
        let loaded = SimConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
