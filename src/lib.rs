/*!
Implicit viscosity for SPH fluids (Weiler et al. 2018) with a matrix-free conjugate gradient solver.
*/

mod platform;
mod simulation;

pub use simulation::*;

pub use platform::start;
