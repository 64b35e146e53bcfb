use log::info;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, ConfigResult},
    fluid_model::BoundaryPointSet,
    floating_type_mod::FT,
    simulation_parameters::SimulationParams,
    sph_kernels::SphKernel,
    vec3f, ParticleModel, V3,
};

fn default_boundary_layers() -> usize {
    2
}

/**
 * Particle sampled box around the domain `[min, max]`. The box is open on no side.
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneBoundary {
    pub min: [FT; 3],
    pub max: [FT; 3],

    #[serde(default = "default_boundary_layers")]
    pub layers: usize,

    // velocity of the boundary particles (the box does not move)
    #[serde(default)]
    pub velocity: [FT; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneFluidBlock {
    pub pos: [FT; 3],
    pub size: [FT; 3],

    #[serde(default)]
    pub velocity: [FT; 3],

    // adds `shear_rate * (y - center_y)` to the x velocity
    pub shear_rate: Option<FT>,

    // maximum of a uniform random perturbation per velocity component
    pub velocity_noise: Option<FT>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    pub boundary: Option<SceneBoundary>,
    pub blocks: Vec<SceneFluidBlock>,

    #[serde(default)]
    pub seed: u64,
}

/**
 * Regular grid of `counts[0] * counts[1] * counts[2]` positions starting at `origin`. The x index runs
 * fastest, z slowest.
 */
pub fn block_positions(origin: V3, counts: [usize; 3], spacing: FT) -> Vec<V3> {
    let mut positions = Vec::with_capacity(counts[0] * counts[1] * counts[2]);
    for z in 0..counts[2] {
        for y in 0..counts[1] {
            for x in 0..counts[0] {
                positions.push(origin + vec3f(x as FT, y as FT, z as FT) * spacing);
            }
        }
    }
    positions
}

fn cells_along(min: FT, max: FT, spacing: FT) -> usize {
    ((max - min) / spacing).round().max(0.) as usize
}

/**
 * Particles of `layers` shells around the box `[min, max]`. The innermost shell lies half a spacing
 * outside the box.
 */
pub fn boundary_box_positions(min: V3, max: V3, spacing: FT, layers: usize) -> Vec<V3> {
    let counts: Vec<usize> = (0..3).map(|d| cells_along(min[d], max[d], spacing)).collect();
    let layers = layers as i64;
    let inside = |k: i64, d: usize| k >= 0 && k < counts[d] as i64;

    let mut positions = Vec::new();
    for z in -layers..counts[2] as i64 + layers {
        for y in -layers..counts[1] as i64 + layers {
            for x in -layers..counts[0] as i64 + layers {
                if inside(x, 0) && inside(y, 1) && inside(z, 2) {
                    continue;
                }
                positions.push(min + (vec3f(x as FT, y as FT, z as FT) + V3::repeat(0.5)) * spacing);
            }
        }
    }
    positions
}

fn add_fluid_block(
    block: &SceneFluidBlock,
    spacing: FT,
    rng: &mut StdRng,
    positions: &mut Vec<V3>,
    velocities: &mut Vec<V3>,
) {
    let pos = V3::from(block.pos);
    let counts = [0, 1, 2].map(|d| cells_along(0., block.size[d], spacing));
    let center_y = pos.y + 0.5 * block.size[1];
    let base_velocity = V3::from(block.velocity);

    for p in block_positions(pos + V3::repeat(0.5 * spacing), counts, spacing) {
        let mut v = base_velocity;
        if let Some(shear_rate) = block.shear_rate {
            v.x += shear_rate * (p.y - center_y);
        }
        if let Some(noise) = block.velocity_noise {
            if noise > 0. {
                v += V3::from_fn(|_, _| rng.gen_range(-noise..noise));
            }
        }
        positions.push(p);
        velocities.push(v);
    }
}

/**
 * Samples the fluid blocks and the boundary box of the scene, computes the boundary psi values,
 * neighborhoods and densities.
 */
pub fn init_fluid_model<K: SphKernel>(
    params: &SimulationParams,
    scene_config: &SceneConfig,
) -> ConfigResult<ParticleModel<K>> {
    if scene_config.blocks.is_empty() {
        return Err(ConfigError::InvalidValue {
            name: "blocks",
            reason: "the scene contains no fluid block".to_string(),
        });
    }

    let spacing = params.particle_spacing();
    let mut rng = StdRng::seed_from_u64(scene_config.seed);

    let mut positions = Vec::new();
    let mut velocities = Vec::new();
    for block in &scene_config.blocks {
        add_fluid_block(block, spacing, &mut rng, &mut positions, &mut velocities);
    }
    let num_fluid_particles = positions.len();
    let masses = vec![params.particle_mass(); num_fluid_particles];

    let mut boundaries = Vec::new();
    if let Some(boundary) = &scene_config.boundary {
        let boundary_positions = boundary_box_positions(
            V3::from(boundary.min),
            V3::from(boundary.max),
            spacing,
            boundary.layers,
        );
        let boundary_velocities = vec![V3::from(boundary.velocity); boundary_positions.len()];
        boundaries.push(BoundaryPointSet::new(boundary_positions, boundary_velocities));
    }

    info!(
        "scene: {} fluid particles, {} boundary particles",
        num_fluid_particles,
        boundaries.iter().map(|b| b.num_particles()).sum::<usize>()
    );

    let mut model = ParticleModel::<K>::new(
        positions,
        velocities,
        masses,
        boundaries,
        params.support_radius(),
        params.rest_density,
        params.neighborhood_search_algorithm,
    );
    model.compute_boundary_psi();
    model.update_neighborhoods();
    model.compute_densities();
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sph_kernels::CubicKernel, FluidModel};

    const SCENE_YAML: &str = "
boundary:
  min: [0.0, 0.0, 0.0]
  max: [0.5, 0.5, 0.5]
blocks:
  - pos: [0.0, 0.0, 0.0]
    size: [0.2, 0.3, 0.2]
    velocity: [0.0, 0.0, 1.0]
    shear_rate: 2.0
";

    #[test]
    fn block_positions_run_x_fastest() {
        let p = block_positions(vec3f(1., 0., 0.), [3, 2, 2], 0.5);
        assert_eq!(p.len(), 12);
        assert_eq!(p[1], vec3f(1.5, 0., 0.));
        assert_eq!(p[3], vec3f(1., 0.5, 0.));
        assert_eq!(p[6], vec3f(1., 0., 0.5));
    }

    #[test]
    fn boundary_box_is_a_hollow_shell() {
        let positions = boundary_box_positions(V3::zeros(), vec3f(1., 1., 1.), 0.25, 1);
        // 6^3 grid minus the 4^3 interior
        assert_eq!(positions.len(), 6 * 6 * 6 - 4 * 4 * 4);
        assert!(positions
            .iter()
            .all(|p| p.iter().any(|&x| x < 0. || x > 1.)));
    }

    #[test]
    fn scene_initializes_fluid_and_boundary() {
        let scene: SceneConfig = serde_yaml::from_str(SCENE_YAML).unwrap();
        let params = SimulationParams::default();
        let model = init_fluid_model::<CubicKernel>(&params, &scene).unwrap();

        // spacing 0.05: 4 x 6 x 4 particles
        assert_eq!(model.num_particles(), 96);
        assert_eq!(model.num_point_sets(), 2);
        assert!(model.boundaries()[0].psi.iter().all(|&psi| psi > 0.));

        // shear profile around the block center (y = 0.15), base velocity in z
        let bottom = model.velocity(0, 0);
        let top = model.velocity(0, 95);
        assert!(bottom.x < 0. && top.x > 0.);
        crate::assert_ft_approx_eq(bottom.x, -top.x, 1e-5, || "shear profile".into());
        assert_eq!(bottom.z, 1.);
        assert!(model.density(0) > 0.);
    }

    #[test]
    fn velocity_noise_is_reproducible() {
        let mut scene: SceneConfig = serde_yaml::from_str(SCENE_YAML).unwrap();
        scene.blocks[0].velocity_noise = Some(0.1);
        let params = SimulationParams::default();
        let a = init_fluid_model::<CubicKernel>(&params, &scene).unwrap();
        let b = init_fluid_model::<CubicKernel>(&params, &scene).unwrap();
        assert_eq!(a.particles.velocity, b.particles.velocity);
    }

    #[test]
    fn scene_without_fluid_is_rejected() {
        let scene = SceneConfig {
            boundary: None,
            blocks: Vec::new(),
            seed: 0,
        };
        assert!(init_fluid_model::<CubicKernel>(&SimulationParams::default(), &scene).is_err());
    }
}
