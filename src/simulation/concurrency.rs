use rayon::prelude::*;

use crate::floating_type_mod::FT;

pub fn par_iter_mut1<T1: Send + Sync, F: Fn(usize, &mut T1) + Send + Sync>(arr1: &mut [T1], f: F) {
    arr1.into_par_iter().enumerate().for_each(|(idx, v1)| {
        f(idx, v1);
    });
}

pub fn par_iter_mut2<T1: Send + Sync, T2: Send + Sync, F: Fn(usize, &mut T1, &mut T2) + Send + Sync>(
    arr1: &mut [T1],
    arr2: &mut [T2],
    f: F,
) {
    arr1.into_par_iter()
        .zip(arr2.into_par_iter())
        .enumerate()
        .for_each(|(idx, (v1, v2))| {
            f(idx, v1, v2);
        });
}

/**
 * Calls `f` for every particle with the three consecutive entries `3*i..3*i+3` of a flat vector.
 */
pub fn par_iter_mut_triplets<F: Fn(usize, &mut [FT]) + Send + Sync>(flat: &mut [FT], f: F) {
    assert!(flat.len() % 3 == 0);
    flat.par_chunks_exact_mut(3).enumerate().for_each(|(idx, chunk)| {
        f(idx, chunk);
    });
}

/**
 * Same as `par_iter_mut_triplets` but for two flat vectors of equal length.
 */
pub fn par_iter_mut_triplets2<F: Fn(usize, &mut [FT], &mut [FT]) + Send + Sync>(
    flat1: &mut [FT],
    flat2: &mut [FT],
    f: F,
) {
    assert!(flat1.len() == flat2.len());
    assert!(flat1.len() % 3 == 0);
    flat1
        .par_chunks_exact_mut(3)
        .zip(flat2.par_chunks_exact_mut(3))
        .enumerate()
        .for_each(|(idx, (c1, c2))| {
            f(idx, c1, c2);
        });
}

pub fn par_reduce0<
    F: Fn(usize) -> X + Send + Sync,
    X: Send,
    C: Fn(X, X) -> X + Send + Sync,
    I: Fn() -> X + Send + Sync,
>(
    n: usize,
    identity: I,
    combine: C,
    f: F,
) -> X {
    (0..n).into_par_iter().map(|i| f(i)).reduce(identity, combine)
}

pub fn par_dot(a: &[FT], b: &[FT]) -> FT {
    assert_eq!(a.len(), b.len());
    a.par_iter().zip(b.par_iter()).map(|(x, y)| x * y).sum()
}

/// `y += alpha * x`
pub fn par_axpy(alpha: FT, x: &[FT], y: &mut [FT]) {
    assert_eq!(x.len(), y.len());
    par_iter_mut1(y, |i, yi| {
        *yi += alpha * x[i];
    });
}

#[test]
fn par_dot_matches_sequential_sum() {
    let a: Vec<FT> = (0..1000).map(|i| (i % 7) as FT).collect();
    let b: Vec<FT> = (0..1000).map(|i| (i % 3) as FT - 1.).collect();
    let expected: FT = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    assert_eq!(par_dot(&a, &b), expected);
}

#[test]
fn triplets_are_addressed_by_particle_index() {
    let mut flat = vec![0. as FT; 12];
    par_iter_mut_triplets(&mut flat, |i, chunk| {
        for d in 0..3 {
            chunk[d] = (3 * i + d) as FT;
        }
    });
    for (k, v) in flat.iter().enumerate() {
        assert_eq!(*v, k as FT);
    }
}
