use crate::{
    concurrency::par_iter_mut_triplets,
    floating_type_mod::FT,
    linear_solver::{
        BlockJacobiPreconditioner3, JacobiPreconditioner3, LinearOperator, Preconditioner3, PreconditionerKind,
    },
    FluidModel, M3, V3,
};

const VISCOSITY_SCALE: FT = 10.;
const REGULARIZATION: FT = 0.01;

enum Neighbor {
    Fluid(usize),
    Boundary { velocity: V3 },
}

/**
 * The implicit viscosity system `(I - dt/rho L) v` of Weiler et al. 2018 for all active fluid particles.
 *
 * `L` is the SPH discretization of the viscous Laplacian with fluid-fluid coupling by `viscosity` and
 * fluid-boundary coupling by `boundary_viscosity`. Boundary velocities are known, so they only enter
 * through the boundary point sets of the model.
 */
pub struct ImplicitViscosityOperator<'a, M: FluidModel + ?Sized> {
    model: &'a M,
    viscosity: FT,
    boundary_viscosity: FT,
    dt: FT,
    num_particles: usize,
}

fn read_triplet(flat: &[FT], i: usize) -> V3 {
    V3::new(flat[3 * i], flat[3 * i + 1], flat[3 * i + 2])
}

impl<'a, M: FluidModel + ?Sized> ImplicitViscosityOperator<'a, M> {
    pub fn new(model: &'a M, viscosity: FT, boundary_viscosity: FT, dt: FT) -> Self {
        ImplicitViscosityOperator {
            model,
            viscosity,
            boundary_viscosity,
            dt,
            num_particles: model.num_active_particles(),
        }
    }

    pub fn num_particles(&self) -> usize {
        self.num_particles
    }

    /**
     * Calls `f(neighbor, coefficient, x_i - x_j, gradW(x_i - x_j))` for every fluid and boundary neighbor
     * of fluid particle `i`.
     */
    fn for_each_coupling(&self, i: usize, mut f: impl FnMut(Neighbor, FT, V3, V3)) {
        let model = self.model;
        let h = model.support_radius();
        let regularization = REGULARIZATION * h * h;
        let xi = model.position(0, i);
        let density_i = model.density(i);

        for &j in model.neighbors(0, i) {
            let j = j as usize;
            let xixj = xi - model.position(0, j);
            let coeff = VISCOSITY_SCALE * self.viscosity * (model.mass(j) / model.density(j))
                / (xixj.norm_squared() + regularization);
            f(Neighbor::Fluid(j), coeff, xixj, model.grad_w(xixj));
        }

        for pid in 1..model.num_point_sets() {
            for &j in model.neighbors(pid, i) {
                let j = j as usize;
                let xixj = xi - model.position(pid, j);
                let coeff = VISCOSITY_SCALE * self.boundary_viscosity * (model.boundary_psi(pid, j) / density_i)
                    / (xixj.norm_squared() + regularization);
                f(
                    Neighbor::Boundary {
                        velocity: model.velocity(pid, j),
                    },
                    coeff,
                    xixj,
                    model.grad_w(xixj),
                );
            }
        }
    }

    /// The 3x3 diagonal block of row `i`.
    pub fn block_diagonal_element(&self, i: usize) -> M3 {
        let mut sum = M3::zeros();
        self.for_each_coupling(i, |_, coeff, xixj, grad_w| {
            sum += coeff * (grad_w * xixj.transpose());
        });
        M3::identity() - (self.dt / self.model.density(i)) * sum
    }

    /// The diagonal entries of row `i`.
    pub fn diagonal_element(&self, i: usize) -> V3 {
        let mut sum = V3::zeros();
        self.for_each_coupling(i, |_, coeff, xixj, grad_w| {
            sum += coeff * grad_w.component_mul(&xixj);
        });
        V3::repeat(1.) - (self.dt / self.model.density(i)) * sum
    }

    pub fn build_preconditioner(&self, kind: PreconditionerKind) -> Preconditioner3 {
        match kind {
            PreconditionerKind::BlockDiagonal => {
                BlockJacobiPreconditioner3::new(self.num_particles, |i| self.block_diagonal_element(i)).into()
            }
            PreconditionerKind::Diagonal => {
                JacobiPreconditioner3::new(self.num_particles, |i| self.diagonal_element(i)).into()
            }
        }
    }
}

impl<'a, M: FluidModel + ?Sized> LinearOperator for ImplicitViscosityOperator<'a, M> {
    fn dim(&self) -> usize {
        3 * self.num_particles
    }

    fn apply(&self, x: &[FT], out: &mut [FT]) {
        assert_eq!(x.len(), self.dim());
        assert_eq!(out.len(), self.dim());

        par_iter_mut_triplets(out, |i, out_i| {
            let vi = read_triplet(x, i);

            let mut ai = V3::zeros();
            self.for_each_coupling(i, |neighbor, coeff, xixj, grad_w| {
                let vj = match neighbor {
                    Neighbor::Fluid(j) => read_triplet(x, j),
                    Neighbor::Boundary { velocity } => velocity,
                };
                ai += coeff * (vi - vj).dot(&xixj) * grad_w;
            });

            let result = vi - (self.dt / self.model.density(i)) * ai;
            out_i.copy_from_slice(result.as_slice());
        });
    }
}
