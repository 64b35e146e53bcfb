use nalgebra::zero;
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::*;
use crate::{
    assert_ft_approx_eq,
    fluid_model::BoundaryPointSet,
    linear_solver::LinearOperator,
    neighborhood_search::NeighborhoodSearchAlgorithm,
    parameters::{ParameterAssignments, ParameterTable},
    scene::block_positions,
    sph_kernels::CubicKernel,
    vec3f, ParticleModel, M3,
};

const SPACING: FT = 0.05;
const REST_DENSITY: FT = 1000.;

fn random_velocities(n: usize, seed: u64) -> Vec<V3> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| V3::from_fn(|_, _| rng.gen_range(-1.0..1.0)))
        .collect()
}

fn fluid_block(count: usize, velocities: impl FnOnce(usize) -> Vec<V3>) -> ParticleModel<CubicKernel> {
    let positions = block_positions(vec3f(0., 0., 0.), [count, count, count], SPACING);
    let n = positions.len();
    let mass = SPACING * SPACING * SPACING * REST_DENSITY;
    let mut model = ParticleModel::new(
        positions,
        velocities(n),
        vec![mass; n],
        Vec::new(),
        2. * SPACING,
        REST_DENSITY,
        NeighborhoodSearchAlgorithm::Grid,
    );
    model.update_neighborhoods();
    model.compute_densities();
    model
}

fn prepare(model: &mut ParticleModel<CubicKernel>) {
    model.compute_boundary_psi();
    model.update_neighborhoods();
    model.compute_densities();
}

fn settings(viscosity: FT, max_error: FT, max_iterations: usize) -> Weiler2018Settings {
    Weiler2018Settings {
        viscosity,
        max_error,
        max_iterations,
        ..Weiler2018Settings::default()
    }
}

fn flatten(v: &[V3]) -> Vec<FT> {
    v.iter().flat_map(|x| x.iter().cloned()).collect()
}

fn triplet(flat: &[FT], i: usize) -> V3 {
    vec3f(flat[3 * i], flat[3 * i + 1], flat[3 * i + 2])
}

#[test]
fn zero_velocity_is_a_fixed_point_with_static_boundaries() {
    let mut model = fluid_block(4, |n| vec![zero(); n]);
    model.add_boundary(BoundaryPointSet::new_static(block_positions(
        vec3f(0., -0.1, 0.),
        [4, 2, 4],
        SPACING,
    )));
    prepare(&mut model);
    assert!(model.neighbors(1, 0).len() > 0);

    let op = ImplicitViscosityOperator::new(&model, 5., 5., 0.01);
    let x = vec![0.; op.dim()];
    let mut out = vec![1.; op.dim()];
    op.apply(&x, &mut out);
    assert!(out.iter().all(|&v| v == 0.));
}

#[test]
fn isolated_particle_is_unaffected() {
    let mut model = ParticleModel::<CubicKernel>::new(
        vec![vec3f(0.3, 0.2, 0.1)],
        vec![vec3f(1., -2., 0.5)],
        vec![0.125],
        Vec::new(),
        0.1,
        REST_DENSITY,
        NeighborhoodSearchAlgorithm::Grid,
    );
    prepare(&mut model);

    let op = ImplicitViscosityOperator::new(&model, 10., 10., 0.01);
    let v = [1., -2., 0.5];
    let mut out = [0.; 3];
    op.apply(&v, &mut out);
    assert_eq!(out, v);
    assert_eq!(op.block_diagonal_element(0), M3::identity());
    assert_eq!(op.diagonal_element(0), V3::repeat(1.));
}

#[test]
fn two_particles_exchange_momentum_antisymmetrically() {
    let mut model = ParticleModel::<CubicKernel>::new(
        vec![vec3f(0., 0., 0.), vec3f(0.03, 0.02, -0.01)],
        vec![zero(); 2],
        vec![0.125; 2],
        Vec::new(),
        0.1,
        REST_DENSITY,
        NeighborhoodSearchAlgorithm::Grid,
    );
    prepare(&mut model);
    assert_eq!(model.density(0), model.density(1));

    let op = ImplicitViscosityOperator::new(&model, 2., 0., 0.01);
    let v = [0.5, -1., 2., -0.3, 0.7, 0.1];
    let mut out = [0.; 6];
    op.apply(&v, &mut out);

    let delta0 = triplet(&out, 0) - triplet(&v, 0);
    let delta1 = triplet(&out, 1) - triplet(&v, 1);
    assert!(delta0.norm() > 0.);
    for d in 0..3 {
        assert_ft_approx_eq(delta0[d], -delta1[d], 1e-5, || format!("axis {}", d));
    }
}

#[test]
fn diagonal_preconditioner_is_the_diagonal_of_the_block() {
    let model = fluid_block(3, |n| vec![zero(); n]);
    let op = ImplicitViscosityOperator::new(&model, 3., 0., 0.02);
    for i in [0, 13, 26] {
        let block = op.block_diagonal_element(i);
        let diagonal = op.diagonal_element(i);
        for d in 0..3 {
            assert_ft_approx_eq(block[(d, d)], diagonal[d], 1e-5, || format!("particle {} axis {}", i, d));
        }
    }
}

#[test]
fn empty_system_is_a_no_op() {
    let mut model = fluid_block(3, |n| random_velocities(n, 1));
    let mut visco = ViscosityWeiler2018::new(settings(1., 0.01, 100), model.num_particles(), false).unwrap();
    let time = TimeManager::new(0.01);

    visco.step(&mut model, &time);
    assert!(visco.warm_start().iter().any(|v| *v != V3::zeros()));

    for a in model.accelerations_mut() {
        *a = vec3f(1., 2., 3.);
    }
    let accelerations_before = model.particles.acceleration.clone();
    let cache_before = visco.warm_start().to_vec();

    model.set_num_active_particles(0);
    visco.step(&mut model, &time);

    assert_eq!(visco.iterations(), 0);
    assert_eq!(model.particles.acceleration, accelerations_before);
    assert_eq!(visco.warm_start(), &cache_before[..]);
}

#[test]
fn step_adds_velocity_change_over_dt_to_accelerations() {
    let mut model = fluid_block(4, |n| random_velocities(n, 2));
    for a in model.accelerations_mut() {
        *a = vec3f(0., -9.81, 0.);
    }
    let dt = 0.005;
    let time = TimeManager::new(dt);

    let mut visco = ViscosityWeiler2018::new(settings(2., 1e-4, 100), model.num_particles(), false).unwrap();
    visco.step(&mut model, &time);

    for i in 0..model.num_particles() {
        let expected = vec3f(0., -9.81, 0.) + visco.warm_start()[i] / dt;
        for d in 0..3 {
            assert_ft_approx_eq(model.particles.acceleration[i][d], expected[d], 1e-3, || {
                format!("acceleration {} axis {}", i, d)
            });
        }
    }
}

#[test]
fn solution_satisfies_the_system() {
    let mut model = fluid_block(4, |n| random_velocities(n, 3));
    let time = TimeManager::new(0.01);
    let mut visco = ViscosityWeiler2018::new(settings(1., 1e-5, 200), model.num_particles(), false).unwrap();
    visco.step(&mut model, &time);

    let v = flatten(&model.particles.velocity);
    let new_v: Vec<V3> = (0..model.num_particles())
        .map(|i| model.particles.velocity[i] + visco.warm_start()[i])
        .collect();
    let new_v = flatten(&new_v);

    let op = ImplicitViscosityOperator::new(&model, 1., 0., 0.01);
    let mut a_new_v = vec![0.; op.dim()];
    op.apply(&new_v, &mut a_new_v);

    let residual: FT = a_new_v.iter().zip(v.iter()).map(|(x, y)| (x - y) * (x - y)).sum::<FT>().sqrt();
    let rhs: FT = v.iter().map(|x| x * x).sum::<FT>().sqrt();
    assert!(residual / rhs < 1e-3, "relative residual {}", residual / rhs);
}

#[test]
fn iterations_are_bounded_by_the_maximum() {
    let mut model = fluid_block(4, |n| random_velocities(n, 4));
    let time = TimeManager::new(0.01);
    let mut visco = ViscosityWeiler2018::new(settings(10., MIN_MAX_ERROR, 3), model.num_particles(), false).unwrap();
    visco.step(&mut model, &time);

    assert!(visco.iterations() > 0);
    assert!(visco.iterations() <= 3);
    assert!(model.particles.acceleration.iter().all(|a| a.iter().all(|x| x.is_finite())));
}

#[test]
fn warm_start_needs_no_more_iterations_than_cold_start() {
    let mut model = fluid_block(5, |n| random_velocities(n, 5));
    let time = TimeManager::new(0.01);
    let mut visco = ViscosityWeiler2018::new(settings(10., 1e-4, 100), model.num_particles(), false).unwrap();

    visco.step(&mut model, &time);
    let cold_iterations = visco.iterations();

    // same state again, the previous correction is now the guess
    visco.step(&mut model, &time);
    let warm_iterations = visco.iterations();

    assert!(cold_iterations > 0);
    assert!(
        warm_iterations <= cold_iterations,
        "warm {} > cold {}",
        warm_iterations,
        cold_iterations
    );

    visco.clear_warm_start();
    assert!(visco.warm_start().iter().all(|v| *v == V3::zeros()));
    visco.step(&mut model, &time);
    assert!(visco.iterations() > 0);
}

#[test]
fn velocity_change_scales_with_time_step() {
    let velocities = random_velocities(5 * 5 * 5, 6);
    let run = |dt: FT| {
        let mut model = fluid_block(5, |_| velocities.clone());
        let mut visco = ViscosityWeiler2018::new(settings(0.5, MIN_MAX_ERROR, 300), model.num_particles(), false).unwrap();
        visco.step(&mut model, &TimeManager::new(dt));
        let change: FT = visco.warm_start().iter().map(|v| v.norm_squared()).sum::<FT>().sqrt();
        let accel: FT = model.particles.acceleration.iter().map(|a| a.norm_squared()).sum::<FT>().sqrt();
        (change, accel)
    };

    let (change_full, accel_full) = run(0.01);
    let (change_half, accel_half) = run(0.005);
    assert!(change_half > 0.);

    let ratio = change_full / change_half;
    assert!(ratio > 1.5 && ratio < 2.1, "velocity change ratio {}", ratio);

    // the acceleration is the change divided by dt and stays of the same magnitude
    let accel_ratio = accel_full / accel_half;
    assert!(accel_ratio > 0.75 && accel_ratio < 1.05, "acceleration ratio {}", accel_ratio);
}

#[test]
fn warm_start_follows_the_particle_count() {
    let mut model = fluid_block(3, |n| random_velocities(n, 7));
    let n = model.num_particles();
    let time = TimeManager::new(0.01);
    let mut visco = ViscosityWeiler2018::new(settings(1., 1e-4, 100), n, false).unwrap();
    visco.step(&mut model, &time);
    assert_eq!(visco.warm_start().len(), n);

    // far away from the block, so without neighbors
    let new_positions: Vec<V3> = (0..5).map(|k| vec3f(5. + k as FT, 5., 5.)).collect();
    model.add_fluid_particles(&new_positions, &[vec3f(1., 0., 0.); 5], &[0.125; 5]);
    model.update_neighborhoods();
    model.compute_densities();

    visco.step(&mut model, &time);
    assert_eq!(visco.warm_start().len(), n + 5);
    for i in n..n + 5 {
        assert_eq!(visco.warm_start()[i], V3::zeros());
    }

    model.truncate_fluid_particles(10);
    model.update_neighborhoods();
    model.compute_densities();
    visco.step(&mut model, &time);
    assert_eq!(visco.warm_start().len(), 10);
}

#[test]
fn reset_and_sort_hooks_keep_the_warm_start() {
    let mut model = fluid_block(3, |n| random_velocities(n, 8));
    let mut visco = ViscosityWeiler2018::new(settings(1., 1e-4, 100), model.num_particles(), false).unwrap();
    visco.step(&mut model, &TimeManager::new(0.01));
    let cache = visco.warm_start().to_vec();

    NonPressureForce::<ParticleModel<CubicKernel>>::reset(&mut visco);
    NonPressureForce::<ParticleModel<CubicKernel>>::perform_neighborhood_search_sort(&mut visco);
    assert_eq!(visco.warm_start(), &cache[..]);
}

#[test]
fn registered_parameters_are_validated() {
    let mut visco = ViscosityWeiler2018::new(Weiler2018Settings::default(), 0, false).unwrap();

    let table = ParameterTable::collect(&mut visco);
    let names: Vec<&str> = table.entries().iter().map(|e| e.info.name).collect();
    assert_eq!(
        names,
        ["viscosity", "viscosityBoundary", "viscoIterations", "viscoMaxIter", "viscoMaxError"]
    );

    ParameterAssignments::parse(["viscosityBoundary=0.5", "viscoMaxIter=20", "viscoMaxError=0.001"])
        .unwrap()
        .apply(&mut visco)
        .unwrap();
    let s = visco.settings();
    assert_eq!(s.boundary_viscosity, 0.5);
    assert_eq!(s.max_iterations, 20);
    assert_eq!(s.max_error, 0.001);

    let err = ParameterAssignments::parse(["viscoMaxError=1e-9"]).unwrap().apply(&mut visco);
    assert!(matches!(err, Err(ParameterError::BelowMinimum { .. })));
    let err = ParameterAssignments::parse(["viscoMaxIter=0"]).unwrap().apply(&mut visco);
    assert!(matches!(err, Err(ParameterError::BelowMinimum { .. })));
    let err = ParameterAssignments::parse(["viscoIterations=3"]).unwrap().apply(&mut visco);
    assert_eq!(err, Err(ParameterError::ReadOnly { name: "viscoIterations".into() }));
}

#[test]
fn settings_validation_rejects_out_of_range_values() {
    assert!(Weiler2018Settings::default().validate().is_ok());
    assert!(settings(-1., 0.01, 10).validate().is_err());
    assert!(settings(1., 1e-8, 10).validate().is_err());
    assert!(settings(1., 0.01, 0).validate().is_err());
}

#[test]
fn invalid_settings_are_rejected_on_construction() {
    assert!(matches!(
        ViscosityWeiler2018::new(settings(-1., 0.01, 10), 4, false),
        Err(ParameterError::BelowMinimum { .. })
    ));
    assert!(ViscosityWeiler2018::new(settings(1., 0.01, 0), 4, false).is_err());
    assert!(ViscosityWeiler2018::new(settings(1., 0.01, 10), 4, false).is_ok());
}

#[test]
fn operator_matches_the_viscosity_formula() {
    let boundary_velocity = vec3f(0.4, -0.2, 0.3);
    let mut model = ParticleModel::<CubicKernel>::new(
        vec![vec3f(0., 0., 0.), vec3f(0.03, 0.02, -0.01)],
        vec![zero(); 2],
        vec![0.125; 2],
        vec![BoundaryPointSet::new(
            vec![vec3f(0.01, -0.03, 0.02)],
            vec![boundary_velocity],
        )],
        0.1,
        REST_DENSITY,
        NeighborhoodSearchAlgorithm::Grid,
    );
    prepare(&mut model);
    for i in 0..2 {
        assert!(model.neighbors(0, i).contains(&((1 - i) as u32)));
        assert_eq!(model.neighbors(1, i).to_vec(), vec![0]);
    }
    assert!(model.boundary_psi(1, 0) > 0.);

    let (viscosity, boundary_viscosity, dt) = (2., 3., 0.01);
    let v = [vec3f(0.5, -1., 2.), vec3f(-0.3, 0.7, 0.1)];
    let op = ImplicitViscosityOperator::new(&model, viscosity, boundary_viscosity, dt);
    let mut out = vec![0.; 6];
    op.apply(&flatten(&v), &mut out);

    let h = model.support_radius();
    for i in 0..2 {
        let j = 1 - i;
        let xi = model.position(0, i);
        let density_i = model.density(i);

        let xij = xi - model.position(0, j);
        let fluid_coeff = 10. * viscosity * (model.mass(j) / model.density(j)) / (xij.norm_squared() + 0.01 * h * h);
        let xib = xi - model.position(1, 0);
        let boundary_coeff =
            10. * boundary_viscosity * (model.boundary_psi(1, 0) / density_i) / (xib.norm_squared() + 0.01 * h * h);

        let a = fluid_coeff * (v[i] - v[j]).dot(&xij) * model.grad_w(xij)
            + boundary_coeff * (v[i] - boundary_velocity).dot(&xib) * model.grad_w(xib);
        let expected = v[i] - (dt / density_i) * a;
        assert!((expected - v[i]).norm() > 1e-3);

        let result = triplet(&out, i);
        for d in 0..3 {
            assert_ft_approx_eq(result[d], expected[d], 1e-5, || format!("particle {} axis {}", i, d));
        }

        let expected_block = M3::identity()
            - (dt / density_i)
                * (fluid_coeff * model.grad_w(xij) * xij.transpose()
                    + boundary_coeff * model.grad_w(xib) * xib.transpose());
        let block = op.block_diagonal_element(i);
        let diagonal = op.diagonal_element(i);
        for r in 0..3 {
            assert_ft_approx_eq(diagonal[r], expected_block[(r, r)], 1e-5, || format!("diagonal {} {}", i, r));
            for c in 0..3 {
                assert_ft_approx_eq(block[(r, c)], expected_block[(r, c)], 1e-5, || {
                    format!("block {} ({}, {})", i, r, c)
                });
            }
        }
    }
}
