use std::{collections::HashMap, path::Path};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    error::{ConfigError, ConfigResult},
    floating_type_mod::FT,
    linear_solver::PreconditionerKind,
    neighborhood_search::NeighborhoodSearchAlgorithm,
    sph_kernels::KernelType,
    viscosity::weiler2018::Weiler2018Settings,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    pub rest_density: FT,
    pub particle_radius: FT,

    // kernel support radius in multiples of the particle radius
    pub support_radius_factor: FT,

    pub time_step_size: FT,
    pub kernel: KernelType,
    pub neighborhood_search_algorithm: NeighborhoodSearchAlgorithm,

    pub viscosity: FT,
    pub boundary_viscosity: FT,
    pub viscosity_max_iters: usize,
    pub viscosity_max_error: FT,
    pub preconditioner: PreconditionerKind,

    #[serde(default)]
    pub counters_enabled: bool,
}

impl Default for SimulationParams {
    fn default() -> Self {
        let viscosity = Weiler2018Settings::default();
        SimulationParams {
            rest_density: 1000.,
            particle_radius: 0.025,
            support_radius_factor: 4.,
            time_step_size: 0.001,
            kernel: KernelType::Cubic,
            neighborhood_search_algorithm: NeighborhoodSearchAlgorithm::Grid,
            viscosity: viscosity.viscosity,
            boundary_viscosity: viscosity.boundary_viscosity,
            viscosity_max_iters: viscosity.max_iterations,
            viscosity_max_error: viscosity.max_error,
            preconditioner: viscosity.preconditioner,
            counters_enabled: false,
        }
    }
}

impl SimulationParams {
    pub fn support_radius(&self) -> FT {
        self.support_radius_factor * self.particle_radius
    }

    /// Distance of neighboring particles in the initial sampling.
    pub fn particle_spacing(&self) -> FT {
        2. * self.particle_radius
    }

    pub fn particle_mass(&self) -> FT {
        let spacing = self.particle_spacing();
        spacing * spacing * spacing * self.rest_density
    }

    pub fn viscosity_settings(&self) -> Weiler2018Settings {
        Weiler2018Settings {
            viscosity: self.viscosity,
            boundary_viscosity: self.boundary_viscosity,
            max_iterations: self.viscosity_max_iters,
            max_error: self.viscosity_max_error,
            preconditioner: self.preconditioner,
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        fn positive(name: &'static str, value: FT) -> ConfigResult<()> {
            if value > 0. && value.is_finite() {
                Ok(())
            } else {
                Err(ConfigError::InvalidValue {
                    name,
                    reason: format!("must be positive (got {})", value),
                })
            }
        }

        positive("rest_density", self.rest_density)?;
        positive("particle_radius", self.particle_radius)?;
        positive("support_radius_factor", self.support_radius_factor)?;
        positive("time_step_size", self.time_step_size)?;
        self.viscosity_settings().validate()?;
        Ok(())
    }

    pub fn from_yaml_value(value: serde_yaml::Value) -> ConfigResult<SimulationParams> {
        let params: SimulationParams = serde_yaml::from_value(value)?;
        params.validate()?;
        Ok(params)
    }

    /**
     * Reads the simulation config at `path`. Every key of the optional overwrite file replaces the same key
     * of the simulation config.
     */
    pub fn load(path: &Path, overwrite_path: Option<&Path>) -> ConfigResult<SimulationParams> {
        let mut params: serde_yaml::Value = read_yaml_file(path)?;

        if let Some(overwrite_path) = overwrite_path {
            let overwrites: HashMap<String, serde_yaml::Value> = read_yaml_file(overwrite_path)?;
            apply_overwrites(&mut params, overwrites)?;
        }

        Self::from_yaml_value(params)
    }
}

pub fn apply_overwrites(params: &mut serde_yaml::Value, overwrites: HashMap<String, serde_yaml::Value>) -> ConfigResult<()> {
    let mapping = params.as_mapping_mut().ok_or_else(|| ConfigError::InvalidValue {
        name: "simulation config",
        reason: "expected a mapping of parameter names to values".to_string(),
    })?;

    for (k, v) in overwrites.into_iter() {
        match mapping.get_mut(&serde_yaml::Value::String(k.clone())) {
            Some(entry) => *entry = v,
            None => return Err(ConfigError::UnknownOverride(k)),
        }
    }
    Ok(())
}

pub fn read_yaml_file<T: DeserializeOwned>(path: &Path) -> ConfigResult<T> {
    let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&yaml).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}
