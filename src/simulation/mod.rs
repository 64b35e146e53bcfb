pub mod concurrency;
pub mod error;
pub mod fluid_model;
pub mod linear_solver;
pub mod neighborhood_search;
pub mod parameters;
pub mod scene;
pub mod simulation_parameters;
pub mod sph_kernels;
pub mod statistics;
pub mod time_manager;
pub mod viscosity;

pub type IT = i32;

#[cfg(feature = "double-precision")]
pub mod floating_type_mod {
    pub type FT = f64;
    pub use std::f64::consts::PI;
}

#[cfg(not(feature = "double-precision"))]
pub mod floating_type_mod {
    pub type FT = f32;
    pub use std::f32::consts::PI;
}

use floating_type_mod::FT;

use nalgebra::{SMatrix, SVector};

pub type V<FT, const D: usize> = SVector<FT, D>;
pub type M<FT, const D: usize> = SMatrix<FT, D, D>;

pub type VI<const D: usize> = V<IT, D>;

pub type V3 = V<FT, 3>;
pub type M3 = M<FT, 3>;

pub fn vec3f(x: FT, y: FT, z: FT) -> V3 {
    [x, y, z].into()
}

pub use fluid_model::{assert_ft_approx_eq, is_ft_approx_eq, FluidModel, ParticleModel};
pub use time_manager::TimeManager;
pub use viscosity::{weiler2018::ViscosityWeiler2018, NonPressureForce, ViscosityBase};
