use serde::{Deserialize, Serialize};

use crate::{
    concurrency::{par_iter_mut1, par_iter_mut_triplets},
    floating_type_mod::FT,
    linear_solver::Preconditioner,
    M3, V3,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreconditionerKind {
    /// Inverse of the full 3x3 diagonal block of every particle.
    BlockDiagonal,

    /// Inverse of the matrix diagonal only.
    Diagonal,
}

impl Default for PreconditionerKind {
    fn default() -> Self {
        PreconditionerKind::BlockDiagonal
    }
}

fn read_triplet(flat: &[FT], i: usize) -> V3 {
    V3::new(flat[3 * i], flat[3 * i + 1], flat[3 * i + 2])
}

/**
 * Block-Jacobi preconditioner with one inverted 3x3 block per particle. Singular blocks are replaced
 * by the identity.
 */
pub struct BlockJacobiPreconditioner3 {
    inv_diag: Vec<M3>,
}

impl BlockJacobiPreconditioner3 {
    pub fn new<F: Fn(usize) -> M3 + Send + Sync>(num_particles: usize, diagonal_block: F) -> Self {
        let mut inv_diag = vec![M3::identity(); num_particles];
        par_iter_mut1(&mut inv_diag, |i, inv| {
            *inv = diagonal_block(i).try_inverse().unwrap_or_else(M3::identity);
        });
        BlockJacobiPreconditioner3 { inv_diag }
    }

    pub fn num_particles(&self) -> usize {
        self.inv_diag.len()
    }

    pub fn inverse_block(&self, i: usize) -> &M3 {
        &self.inv_diag[i]
    }
}

impl Preconditioner for BlockJacobiPreconditioner3 {
    fn apply(&self, r: &[FT], z: &mut [FT]) {
        assert_eq!(r.len(), 3 * self.inv_diag.len());
        let inv_diag = &self.inv_diag;
        par_iter_mut_triplets(z, |i, zi| {
            let v = inv_diag[i] * read_triplet(r, i);
            zi.copy_from_slice(v.as_slice());
        });
    }
}

/**
 * Jacobi scaling with the inverted matrix diagonal. Zero diagonal entries are replaced by 1.
 */
pub struct JacobiPreconditioner3 {
    inv_diag: Vec<V3>,
}

impl JacobiPreconditioner3 {
    pub fn new<F: Fn(usize) -> V3 + Send + Sync>(num_particles: usize, diagonal: F) -> Self {
        let mut inv_diag = vec![V3::repeat(1.); num_particles];
        par_iter_mut1(&mut inv_diag, |i, inv| {
            *inv = diagonal(i).map(|d| if d != 0. { 1. / d } else { 1. });
        });
        JacobiPreconditioner3 { inv_diag }
    }

    pub fn num_particles(&self) -> usize {
        self.inv_diag.len()
    }

    pub fn inverse_diagonal(&self, i: usize) -> V3 {
        self.inv_diag[i]
    }
}

impl Preconditioner for JacobiPreconditioner3 {
    fn apply(&self, r: &[FT], z: &mut [FT]) {
        assert_eq!(r.len(), 3 * self.inv_diag.len());
        let inv_diag = &self.inv_diag;
        par_iter_mut_triplets(z, |i, zi| {
            let v = inv_diag[i].component_mul(&read_triplet(r, i));
            zi.copy_from_slice(v.as_slice());
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{linear_solver::Preconditioner3, vec3f};

    #[test]
    fn block_jacobi_inverts_blocks() {
        let block = M3::new(2., 1., 0., 0., 4., 0., 0., 0., 0.5);
        let precond = BlockJacobiPreconditioner3::new(2, |_| block);

        let r = [1., 2., 3., 4., 5., 6.];
        let mut z = [0.; 6];
        precond.apply(&r, &mut z);

        for i in 0..2 {
            let back = block * read_triplet(&z, i);
            for d in 0..3 {
                crate::assert_ft_approx_eq(back[d], r[3 * i + d], 1e-5, || format!("block {} axis {}", i, d));
            }
        }
    }

    #[test]
    fn singular_blocks_fall_back_to_identity() {
        let precond = BlockJacobiPreconditioner3::new(3, |i| if i == 1 { M3::zeros() } else { M3::identity() * 2. });
        assert_eq!(*precond.inverse_block(1), M3::identity());
        assert_eq!(*precond.inverse_block(0), M3::identity() * 0.5);
    }

    #[test]
    fn jacobi_scales_by_inverse_diagonal() {
        let precond: Preconditioner3 = JacobiPreconditioner3::new(2, |i| {
            if i == 0 {
                vec3f(2., 4., 0.)
            } else {
                vec3f(1., 0.5, 8.)
            }
        })
        .into();

        let r = [1., 1., 3., 1., 1., 1.];
        let mut z = [0.; 6];
        precond.apply(&r, &mut z);
        assert_eq!(z, [0.5, 0.25, 3., 1., 2., 0.125]);
    }
}
