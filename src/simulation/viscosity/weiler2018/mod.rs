/*!
Implicit viscosity after Weiler et al. 2018, "A Physically Consistent Implicit Viscosity Solver for SPH Fluids".

Every step solves `(I - dt/rho L) v_new = v` with a preconditioned conjugate gradient method and adds
`(v_new - v) / dt` to the particle accelerations. The velocity change of the previous step is kept as
warm start for the next solve.
*/

use log::debug;
use nalgebra::{zero, DVector};

use crate::{
    concurrency::{par_iter_mut2, par_iter_mut_triplets2},
    error::ParameterError,
    floating_type_mod::FT,
    linear_solver::{ConjugateGradient, PreconditionerKind},
    parameters::{ParameterInfo, ParameterValue, ParameterVisitor, Parameterized},
    statistics::{write_statistics, PerformanceCounters, ValueCounters},
    viscosity::{NonPressureForce, ViscosityBase, DEFAULT_VISCOSITY},
    FluidModel, TimeManager, V3,
};

mod operator;

pub use operator::ImplicitViscosityOperator;

pub const MIN_MAX_ERROR: FT = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weiler2018Settings {
    pub viscosity: FT,
    pub boundary_viscosity: FT,
    pub max_iterations: usize,
    pub max_error: FT,
    pub preconditioner: PreconditionerKind,
}

impl Default for Weiler2018Settings {
    fn default() -> Self {
        Weiler2018Settings {
            viscosity: DEFAULT_VISCOSITY,
            boundary_viscosity: 0.,
            max_iterations: 100,
            max_error: 0.01,
            preconditioner: PreconditionerKind::default(),
        }
    }
}

impl Weiler2018Settings {
    pub fn validate(&self) -> Result<(), ParameterError> {
        fn at_least(name: &str, value: FT, min: FT) -> Result<(), ParameterError> {
            if value >= min {
                Ok(())
            } else {
                Err(ParameterError::BelowMinimum {
                    name: name.to_string(),
                    value,
                    min,
                })
            }
        }

        at_least("viscosity", self.viscosity, 0.)?;
        at_least("viscosityBoundary", self.boundary_viscosity, 0.)?;
        at_least("viscoMaxIter", self.max_iterations as FT, 1.)?;
        at_least("viscoMaxError", self.max_error, MIN_MAX_ERROR)?;
        Ok(())
    }
}

pub struct ViscosityWeiler2018 {
    base: ViscosityBase,
    boundary_viscosity: FT,
    max_iterations: usize,
    max_error: FT,
    preconditioner_kind: PreconditionerKind,

    // iterations of the last solve
    iterations: usize,

    // velocity change of the last step, used as warm start
    v_diff: Vec<V3>,

    solver: ConjugateGradient,

    pcounters: PerformanceCounters,
    vcounters: ValueCounters,
}

impl ViscosityWeiler2018 {
    /// Fails if a setting is below the minimum of its parameter.
    pub fn new(
        settings: Weiler2018Settings,
        num_particles: usize,
        counters_enabled: bool,
    ) -> Result<Self, ParameterError> {
        settings.validate()?;

        Ok(ViscosityWeiler2018 {
            base: ViscosityBase {
                viscosity: settings.viscosity,
            },
            boundary_viscosity: settings.boundary_viscosity,
            max_iterations: settings.max_iterations,
            max_error: settings.max_error,
            preconditioner_kind: settings.preconditioner,
            iterations: 0,
            v_diff: vec![zero(); num_particles],
            solver: ConjugateGradient::new(settings.max_error, settings.max_iterations),
            pcounters: PerformanceCounters::new(counters_enabled),
            vcounters: ValueCounters::new(counters_enabled),
        })
    }

    pub fn settings(&self) -> Weiler2018Settings {
        Weiler2018Settings {
            viscosity: self.base.viscosity,
            boundary_viscosity: self.boundary_viscosity,
            max_iterations: self.max_iterations,
            max_error: self.max_error,
            preconditioner: self.preconditioner_kind,
        }
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Relative residual of the last solve.
    pub fn solver_error(&self) -> FT {
        self.solver.error()
    }

    pub fn warm_start(&self) -> &[V3] {
        &self.v_diff
    }

    pub fn clear_warm_start(&mut self) {
        for v in &mut self.v_diff {
            *v = zero();
        }
    }

    pub fn statistics(&self) -> String {
        write_statistics(&self.pcounters, &self.vcounters)
    }

    fn resize_warm_start(&mut self, num_particles: usize) {
        if self.v_diff.len() != num_particles {
            self.v_diff.resize(num_particles, zero());
        }
    }
}

impl<M: FluidModel + ?Sized> NonPressureForce<M> for ViscosityWeiler2018 {
    fn step(&mut self, model: &mut M, time: &TimeManager) {
        let num_particles = model.num_active_particles();
        if num_particles == 0 {
            self.iterations = 0;
            return;
        }
        self.resize_warm_start(model.num_particles());

        let dt = time.time_step_size();
        let n = 3 * num_particles;

        let mut b = DVector::<FT>::zeros(n);
        let mut g = DVector::<FT>::zeros(n);

        let x = {
            let model: &M = model;
            let v_diff = &self.v_diff;

            // b = v, g = v + v_diff
            par_iter_mut_triplets2(b.as_mut_slice(), g.as_mut_slice(), |i, bi, gi| {
                let vi = model.velocity(0, i);
                bi.copy_from_slice(vi.as_slice());
                gi.copy_from_slice((vi + v_diff[i]).as_slice());
            });

            let op = ImplicitViscosityOperator::new(model, self.base.viscosity, self.boundary_viscosity, dt);
            let precond = op.build_preconditioner(self.preconditioner_kind);

            self.solver.set_tolerance(self.max_error);
            self.solver.set_max_iterations(self.max_iterations);

            self.pcounters.begin("CG solve");
            let x = self.solver.solve_with_guess(&op, &precond, &b, &g);
            self.pcounters.end("CG solve");
            x
        };

        self.iterations = self.solver.iterations();
        self.vcounters.add_value("Visco iterations", self.iterations as FT);
        debug!(
            "viscosity solve: {} particles, {} iterations, relative residual {:e}",
            num_particles,
            self.iterations,
            self.solver.error()
        );

        let x = x.as_slice();
        let b = b.as_slice();
        par_iter_mut2(
            &mut model.accelerations_mut()[..num_particles],
            &mut self.v_diff[..num_particles],
            |i, ai, v_diff_i| {
                let new_v = V3::new(x[3 * i], x[3 * i + 1], x[3 * i + 2]);
                let old_v = V3::new(b[3 * i], b[3 * i + 1], b[3 * i + 2]);
                *v_diff_i = new_v - old_v;
                *ai += *v_diff_i / dt;
            },
        );
    }
}

impl Parameterized for ViscosityWeiler2018 {
    fn register_parameters(&mut self, visitor: &mut dyn ParameterVisitor) {
        self.base.register_parameters(visitor);

        visitor.visit(
            ParameterInfo {
                name: "viscosityBoundary",
                label: "Viscosity coefficient (Boundary)",
                group: "Viscosity",
                description: "Coefficient for the viscosity force computation at the boundary.",
                read_only: false,
            },
            ParameterValue::Real {
                value: &mut self.boundary_viscosity,
                min: Some(0.),
            },
        );

        visitor.visit(
            ParameterInfo {
                name: "viscoIterations",
                label: "Iterations",
                group: "Viscosity",
                description: "Iterations required by the viscosity solver.",
                read_only: true,
            },
            ParameterValue::UInt {
                value: &mut self.iterations,
                min: None,
            },
        );

        visitor.visit(
            ParameterInfo {
                name: "viscoMaxIter",
                label: "Max. iterations (visco)",
                group: "Viscosity",
                description: "Maximum number of iterations of the viscosity solver.",
                read_only: false,
            },
            ParameterValue::UInt {
                value: &mut self.max_iterations,
                min: Some(1),
            },
        );

        visitor.visit(
            ParameterInfo {
                name: "viscoMaxError",
                label: "Max. visco error",
                group: "Viscosity",
                description: "Relative residual at which the viscosity solver stops.",
                read_only: false,
            },
            ParameterValue::Real {
                value: &mut self.max_error,
                min: Some(MIN_MAX_ERROR),
            },
        );
    }
}

#[cfg(test)]
mod tests;
