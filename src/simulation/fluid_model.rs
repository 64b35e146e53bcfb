use std::{fmt::Display, marker::PhantomData};

use log::debug;
use nalgebra::zero;
use num_traits::Float;

use crate::{
    concurrency::{par_iter_mut1, par_reduce0},
    floating_type_mod::FT,
    neighborhood_search::{NeighborhoodCache, NeighborhoodSearchAlgorithm},
    sph_kernels::SphKernel,
    V3,
};

/**
 * Read access to the particle state that non-pressure forces need, plus the additive acceleration field.
 *
 * Point set 0 is the fluid itself, every point set `pid >= 1` is a boundary body. Neighbor lists are
 * always given for fluid particles: `neighbors(pid, i)` lists the particles of point set `pid` that are
 * neighbors of fluid particle `i`.
 */
pub trait FluidModel: Sync {
    /// Number of fluid particles the solvers operate on (always the first ones).
    fn num_active_particles(&self) -> usize;

    /// Number of fluid particles including the inactive ones.
    fn num_particles(&self) -> usize;

    fn num_point_sets(&self) -> usize;

    fn neighbors(&self, point_set: usize, i: usize) -> &[u32];

    fn position(&self, point_set: usize, i: usize) -> V3;
    fn velocity(&self, point_set: usize, i: usize) -> V3;

    fn density(&self, i: usize) -> FT;
    fn mass(&self, i: usize) -> FT;

    /// Only defined for boundary point sets (`point_set >= 1`).
    fn boundary_psi(&self, point_set: usize, i: usize) -> FT;

    fn accelerations_mut(&mut self) -> &mut [V3];

    fn support_radius(&self) -> FT;
    fn rest_density(&self) -> FT;

    fn grad_w(&self, r: V3) -> V3;
}

macro_rules! decl_particle_vec {
    (pub struct $struct_name:ident { $(pub $field_name:ident: Vec<$field_type:ty> | $default_value:expr),*$(,)?  }) => {
        pub struct $struct_name {
            $(
                pub $field_name : Vec<$field_type>,
            )*
        }

        impl $struct_name {
            pub fn truncate(&mut self, len: usize) {
                $(
                    self.$field_name.truncate(len);
                )*
            }

            pub fn extend(&mut self, num_elements: usize) {
                $(
                    self.$field_name.extend((0..num_elements).map::<$field_type, _>(|_| $default_value));
                )*
            }

            pub fn default(len: usize) -> Self {
                Self {
                    $(
                        $field_name: (0..len).map(|_| $default_value).collect::<Vec<$field_type>>(),
                    )*
                }
            }
        }
    }
}

decl_particle_vec! {
    pub struct ParticleVec {
        pub mass: Vec<FT> | 0.,
        pub position: Vec<V3> | zero(),
        pub velocity: Vec<V3> | zero(),
        pub acceleration: Vec<V3> | zero(),
        pub density: Vec<FT> | 0.,
    }
}

impl ParticleVec {
    pub fn len(&self) -> usize {
        self.position.len()
    }
}

/**
 * A static or moving boundary body sampled with particles (Akinci et al. 2012).
 */
pub struct BoundaryPointSet {
    pub position: Vec<V3>,
    pub velocity: Vec<V3>,

    // "Psi_b" is the boundary particle's contribution to the fluid density (the boundary pseudo-mass)
    pub psi: Vec<FT>,

    boundary_boundary_neighs: NeighborhoodCache,
}

impl BoundaryPointSet {
    pub fn new(position: Vec<V3>, velocity: Vec<V3>) -> Self {
        assert!(position.len() == velocity.len());
        let num_boundary_particles = position.len();
        BoundaryPointSet {
            position,
            velocity,
            psi: vec![0.; num_boundary_particles],
            boundary_boundary_neighs: NeighborhoodCache::new(num_boundary_particles),
        }
    }

    pub fn new_static(position: Vec<V3>) -> Self {
        let velocity = vec![zero(); position.len()];
        Self::new(position, velocity)
    }

    pub fn num_particles(&self) -> usize {
        self.position.len()
    }
}

pub struct ParticleModel<K: SphKernel> {
    pub particles: ParticleVec,
    boundaries: Vec<BoundaryPointSet>,

    // `neighs[0]` holds fluid-fluid neighbors, `neighs[b]` fluid neighbors in boundary `b - 1`
    neighs: Vec<NeighborhoodCache>,

    num_active_particles: usize,
    support_radius: FT,
    rest_density: FT,
    search_algorithm: NeighborhoodSearchAlgorithm,

    _kernel: PhantomData<K>,
}

impl<K: SphKernel> ParticleModel<K> {
    pub fn new(
        fluid_particle_positions: Vec<V3>,
        fluid_particle_velocities: Vec<V3>,
        fluid_particle_masses: Vec<FT>,
        boundaries: Vec<BoundaryPointSet>,
        support_radius: FT,
        rest_density: FT,
        search_algorithm: NeighborhoodSearchAlgorithm,
    ) -> Self {
        let num_fluid_particles = fluid_particle_positions.len();
        assert!(fluid_particle_velocities.len() == num_fluid_particles);
        assert!(fluid_particle_masses.len() == num_fluid_particles);

        let mut particles = ParticleVec::default(num_fluid_particles);
        particles.position = fluid_particle_positions;
        particles.velocity = fluid_particle_velocities;
        particles.mass = fluid_particle_masses;

        let neighs = (0..boundaries.len() + 1)
            .map(|_| NeighborhoodCache::new(num_fluid_particles))
            .collect();

        ParticleModel {
            particles,
            boundaries,
            neighs,
            num_active_particles: num_fluid_particles,
            support_radius,
            rest_density,
            search_algorithm,
            _kernel: PhantomData,
        }
    }

    pub fn add_boundary(&mut self, boundary: BoundaryPointSet) {
        self.boundaries.push(boundary);
        self.neighs.push(NeighborhoodCache::new(self.particles.len()));
    }

    pub fn boundaries(&self) -> &[BoundaryPointSet] {
        &self.boundaries
    }

    pub fn set_num_active_particles(&mut self, num_active_particles: usize) {
        assert!(num_active_particles <= self.particles.len());
        self.num_active_particles = num_active_particles;
    }

    /**
     * Appends active fluid particles (like an emitter would). Neighborhoods and densities have to be
     * updated afterwards.
     */
    pub fn add_fluid_particles(&mut self, positions: &[V3], velocities: &[V3], masses: &[FT]) {
        assert!(positions.len() == velocities.len() && positions.len() == masses.len());
        let old_len = self.particles.len();
        let num_new = positions.len();

        self.particles.extend(num_new);
        self.particles.position[old_len..].copy_from_slice(positions);
        self.particles.velocity[old_len..].copy_from_slice(velocities);
        self.particles.mass[old_len..].copy_from_slice(masses);

        for neighs in &mut self.neighs {
            neighs.extend(num_new);
        }

        if self.num_active_particles == old_len {
            self.num_active_particles += num_new;
        }
    }

    pub fn truncate_fluid_particles(&mut self, len: usize) {
        self.particles.truncate(len);
        for neighs in &mut self.neighs {
            neighs.truncate(len);
        }
        self.num_active_particles = self.num_active_particles.min(len);
    }

    pub fn fluid_neighbors(&self) -> &NeighborhoodCache {
        &self.neighs[0]
    }

    pub fn update_neighborhoods(&mut self) {
        let n = self.num_active_particles;
        let active_positions = &self.particles.position[..n];

        self.neighs[0].build(
            self.search_algorithm,
            active_positions,
            active_positions,
            self.support_radius,
            true,
        );

        for (b, boundary) in self.boundaries.iter().enumerate() {
            self.neighs[b + 1].build(
                self.search_algorithm,
                &boundary.position,
                active_positions,
                self.support_radius,
                false,
            );
        }

        debug!(
            "neighborhood update: {} active particles, avg {:.1} fluid neighbors",
            n,
            self.average_fluid_neighbor_count()
        );
    }

    fn average_fluid_neighbor_count(&self) -> FT {
        let n = self.num_active_particles;
        if n == 0 {
            return 0.;
        }
        let fluid_neighs = &self.neighs[0];
        let total = par_reduce0(n, || 0, |a, b| a + b, |i| fluid_neighs.neighbor_count(i));
        total as FT / n as FT
    }

    /**
     * Psi_b = rest_density / sum_k W(x_b - x_k) where k runs over the boundary particles of the same body
     * (including b itself).
     */
    pub fn compute_boundary_psi(&mut self) {
        let support_radius = self.support_radius;
        let rest_density = self.rest_density;
        let search_algorithm = self.search_algorithm;

        for boundary in &mut self.boundaries {
            boundary.boundary_boundary_neighs.build(
                search_algorithm,
                &boundary.position,
                &boundary.position,
                support_radius,
                true,
            );

            let boundary_positions = &boundary.position;
            let boundary_boundary_neighs = &boundary.boundary_boundary_neighs;

            par_iter_mut1(&mut boundary.psi, |bi, psi| {
                let mut number_density: FT = K::w_zero(support_radius);
                for bj in boundary_boundary_neighs.iter(bi) {
                    number_density += K::w(boundary_positions[bi] - boundary_positions[bj], support_radius);
                }
                *psi = rest_density / number_density;
            });
        }
    }

    pub fn compute_densities(&mut self) {
        let n = self.num_active_particles;
        let support_radius = self.support_radius;
        let position = &self.particles.position;
        let mass = &self.particles.mass;
        let boundaries = &self.boundaries;
        let neighs = &self.neighs;

        par_iter_mut1(&mut self.particles.density[..n], |i, p_density| {
            let mut density_acc = mass[i] * K::w_zero(support_radius);
            for j in neighs[0].iter(i) {
                density_acc += mass[j] * K::w(position[i] - position[j], support_radius);
            }

            for (b, boundary) in boundaries.iter().enumerate() {
                for j in neighs[b + 1].iter(i) {
                    density_acc += boundary.psi[j] * K::w(position[i] - boundary.position[j], support_radius);
                }
            }

            *p_density = density_acc;
        });
    }

    pub fn clear_accelerations(&mut self) {
        par_iter_mut1(&mut self.particles.acceleration, |_, a| {
            *a = zero();
        });
    }

    /**
     * v += dt * a for all active particles. Positions are left untouched.
     */
    pub fn integrate_velocities(&mut self, dt: FT) {
        let n = self.num_active_particles;
        let acceleration = &self.particles.acceleration;
        par_iter_mut1(&mut self.particles.velocity[..n], |i, v| {
            *v += dt * acceleration[i];
        });
    }

    pub fn kinetic_energy(&self) -> FT {
        let mass = &self.particles.mass;
        let velocity = &self.particles.velocity;
        par_reduce0(
            self.num_active_particles,
            || 0.,
            |a, b| a + b,
            |i| 0.5 * mass[i] * velocity[i].norm_squared(),
        )
    }
}

impl<K: SphKernel> FluidModel for ParticleModel<K> {
    fn num_active_particles(&self) -> usize {
        self.num_active_particles
    }

    fn num_particles(&self) -> usize {
        self.particles.len()
    }

    fn num_point_sets(&self) -> usize {
        self.boundaries.len() + 1
    }

    fn neighbors(&self, point_set: usize, i: usize) -> &[u32] {
        self.neighs[point_set].neighbors(i)
    }

    fn position(&self, point_set: usize, i: usize) -> V3 {
        match point_set {
            0 => self.particles.position[i],
            b => self.boundaries[b - 1].position[i],
        }
    }

    fn velocity(&self, point_set: usize, i: usize) -> V3 {
        match point_set {
            0 => self.particles.velocity[i],
            b => self.boundaries[b - 1].velocity[i],
        }
    }

    fn density(&self, i: usize) -> FT {
        self.particles.density[i]
    }

    fn mass(&self, i: usize) -> FT {
        self.particles.mass[i]
    }

    fn boundary_psi(&self, point_set: usize, i: usize) -> FT {
        assert!(point_set >= 1, "the fluid point set has no boundary psi");
        self.boundaries[point_set - 1].psi[i]
    }

    fn accelerations_mut(&mut self) -> &mut [V3] {
        &mut self.particles.acceleration
    }

    fn support_radius(&self) -> FT {
        self.support_radius
    }

    fn rest_density(&self) -> FT {
        self.rest_density
    }

    fn grad_w(&self, r: V3) -> V3 {
        K::grad_w(r, self.support_radius)
    }
}

pub fn is_ft_approx_eq<FT: Float>(a: FT, b: FT, tolerance: FT) -> bool {
    assert!(!a.is_nan());
    assert!(!b.is_nan());
    b <= a + tolerance && b >= a - tolerance
}

pub fn assert_ft_approx_eq<FT: Float + Display>(a: FT, b: FT, tolerance: FT, s: impl FnOnce() -> String) {
    if !is_ft_approx_eq(a, b, tolerance) {
        panic!(
            "{} value not equal with a tolerance of {}:\n\ta={}\n\tb={}\n",
            s(),
            tolerance,
            a,
            b
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{scene::block_positions, sph_kernels::CubicKernel, vec3f};

    fn resting_block() -> ParticleModel<CubicKernel> {
        let spacing = 0.05;
        let rest_density = 1000.;
        let positions = block_positions(vec3f(0., 0., 0.), [8, 8, 8], spacing);
        let n = positions.len();
        let mass = spacing * spacing * spacing * rest_density;
        ParticleModel::new(
            positions,
            vec![zero(); n],
            vec![mass; n],
            Vec::new(),
            4. * spacing / 2.,
            rest_density,
            NeighborhoodSearchAlgorithm::Grid,
        )
    }

    #[test]
    fn interior_density_is_close_to_rest_density() {
        let mut model = resting_block();
        model.update_neighborhoods();
        model.compute_densities();

        // particle in the middle of the block has a full neighborhood
        let center = 4 * 64 + 4 * 8 + 4;
        assert_ft_approx_eq(model.density(center) / 1000., 1., 0.05, || format!("density[{}]", center));
    }

    #[test]
    fn boundary_particles_add_density_at_the_fluid_bottom() {
        let spacing = 0.05;
        let bottom = 4 * 64 + 4;

        let mut without_boundary = resting_block();
        without_boundary.update_neighborhoods();
        without_boundary.compute_densities();

        let mut model = resting_block();
        model.add_boundary(BoundaryPointSet::new_static(block_positions(
            vec3f(0., -0.15, 0.),
            [8, 3, 8],
            spacing,
        )));
        model.compute_boundary_psi();
        model.update_neighborhoods();
        model.compute_densities();

        // the top boundary layer has fewer boundary neighbors than the middle layer
        let psi_top = model.boundary_psi(1, 4 * 24 + 2 * 8 + 4);
        let psi_middle = model.boundary_psi(1, 4 * 24 + 1 * 8 + 4);
        assert!(psi_middle > 0.);
        assert!(psi_top > psi_middle);

        assert!(model.neighbors(1, bottom).len() > 0);
        assert!(model.density(bottom) > without_boundary.density(bottom));
    }

    #[test]
    fn adding_particles_keeps_neighborhoods_sized() {
        let mut model = resting_block();
        let n = model.num_particles();
        model.add_fluid_particles(&[vec3f(1., 1., 1.)], &[vec3f(0., 1., 0.)], &[0.125]);

        assert_eq!(model.num_particles(), n + 1);
        assert_eq!(model.num_active_particles(), n + 1);
        assert_eq!(model.fluid_neighbors().len(), n + 1);

        model.truncate_fluid_particles(10);
        assert_eq!(model.num_active_particles(), 10);
        assert_eq!(model.fluid_neighbors().len(), 10);
    }

    #[test]
    fn integrate_velocities_only_touches_active_particles() {
        let mut model = resting_block();
        model.set_num_active_particles(3);
        for a in model.accelerations_mut() {
            *a = vec3f(1., 0., 0.);
        }
        model.integrate_velocities(0.5);
        assert_eq!(model.velocity(0, 2), vec3f(0.5, 0., 0.));
        assert_eq!(model.velocity(0, 3), V3::zeros());
    }
}
