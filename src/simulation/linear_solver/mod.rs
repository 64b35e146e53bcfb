/*!
Matrix-free linear solver building blocks.

Systems are never assembled. A [`LinearOperator`] only knows how to apply itself to a flat vector, a
[`Preconditioner`] only knows how to apply an approximate inverse. Vectors store three consecutive
entries per particle.
*/

use enum_dispatch::enum_dispatch;

use crate::floating_type_mod::FT;

pub mod conjugate_gradient;
pub mod preconditioner;

pub use conjugate_gradient::ConjugateGradient;
pub use preconditioner::{BlockJacobiPreconditioner3, JacobiPreconditioner3, PreconditionerKind};

pub trait LinearOperator: Sync {
    /// Number of rows (and columns) of the square system.
    fn dim(&self) -> usize;

    /// out = A * x
    fn apply(&self, x: &[FT], out: &mut [FT]);
}

#[enum_dispatch]
pub trait Preconditioner {
    /// z = M^-1 * r
    fn apply(&self, r: &[FT], z: &mut [FT]);
}

#[enum_dispatch(Preconditioner)]
pub enum Preconditioner3 {
    BlockJacobiPreconditioner3,
    JacobiPreconditioner3,
}
