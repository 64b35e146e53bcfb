use serde::{Deserialize, Serialize};

use crate::{
    floating_type_mod::{FT, PI},
    V3, VI,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelType {
    Cubic,
    WendlandQuinticC2,
}

/**
 * q = r / support_radius
 */
pub fn cubic_kernel_unnormalized(q: FT) -> FT {
    if q < 0.5 {
        return 6. * (q * q * q - q * q) + 1.;
    } else if q < 1. {
        let v = 1. - q;
        return 2. * (v * v * v);
    } else {
        return 0.;
    }
}

pub fn cubic_kernel_unnormalized_deriv(q: FT) -> FT {
    if q < 0.5 {
        return 18. * q * q - 12. * q;
    } else if q < 1. {
        let v = 1. - q;
        return -6. * v * v;
    } else {
        return 0.;
    };
}

/**
 * r is the distance to the center.
 * h is the support radius.
 */
pub fn cubic_kernel_3d(r: FT, h: FT) -> FT {
    let norm_factor = 8. / (PI * (h * h * h));
    return norm_factor * cubic_kernel_unnormalized(r / h);
}

/**
 * Calculate the derivative dW/dx where W=kernel(|x-y|) and x-y=diff.
 */
pub fn cubic_kernel_3d_deriv(diff: V3, h: FT) -> V3 {
    let r = diff.norm();
    let q: FT = r / h;
    if q <= 1.0e-5 || q >= 1. {
        return V3::zeros();
    }

    let norm_factor = 8. / (PI * (h * h * h));
    return norm_factor * cubic_kernel_unnormalized_deriv(q) / (h * r) * diff;
}

pub fn wendland_quintic_c2_3d(r: FT, h: FT) -> FT {
    let q = r / h;
    if q >= 1. {
        return 0.;
    }
    let norm_factor = 21. / (2. * PI * (h * h * h));
    let v = 1. - q;
    norm_factor * (v * v * v * v) * (4. * q + 1.)
}

pub fn wendland_quintic_c2_3d_deriv(diff: V3, h: FT) -> V3 {
    let r = diff.norm();
    let q = r / h;
    if q <= 1.0e-5 || q >= 1. {
        return V3::zeros();
    }
    let norm_factor = -210. / (PI * (h * h * h));
    let v = 1. - q;
    norm_factor * (v * v * v) / (h * h) * diff
}

// Sync is needed since the kernel is evaluated inside parallel iterators
pub trait SphKernel: Sync + Send {
    fn kernel_type() -> KernelType;

    fn w(diff: V3, support_radius: FT) -> FT;
    fn grad_w(diff: V3, support_radius: FT) -> V3;

    fn w_zero(support_radius: FT) -> FT {
        Self::w(V3::zeros(), support_radius)
    }
}

pub enum CubicKernel {}
impl SphKernel for CubicKernel {
    fn kernel_type() -> KernelType {
        KernelType::Cubic
    }

    fn w(diff: V3, support_radius: FT) -> FT {
        cubic_kernel_3d(diff.norm(), support_radius)
    }

    fn grad_w(diff: V3, support_radius: FT) -> V3 {
        cubic_kernel_3d_deriv(diff, support_radius)
    }
}

pub enum WendlandQuinticC2Kernel {}
impl SphKernel for WendlandQuinticC2Kernel {
    fn kernel_type() -> KernelType {
        KernelType::WendlandQuinticC2
    }

    fn w(diff: V3, support_radius: FT) -> FT {
        wendland_quintic_c2_3d(diff.norm(), support_radius)
    }

    fn grad_w(diff: V3, support_radius: FT) -> V3 {
        wendland_quintic_c2_3d_deriv(diff, support_radius)
    }
}

pub fn iterate_grid_neighbors(dist: i32, mut f: impl FnMut(VI<3>)) {
    for z in -dist..=dist {
        for y in -dist..=dist {
            for x in -dist..=dist {
                f([x, y, z].into());
            }
        }
    }
}

#[cfg(test)]
fn kernel_integration_test<K: SphKernel>() {
    use crate::vec3f;

    let support_radius = 0.1;
    let grid_size = 60;
    let cell_len = 2. * support_radius / grid_size as FT;
    let cell_volume = cell_len * cell_len * cell_len;

    let mut integral: f64 = 0.;
    for z in 0..grid_size {
        for y in 0..grid_size {
            for x in 0..grid_size {
                let integration_point = vec3f(
                    (x as FT + 0.5) * cell_len - support_radius,
                    (y as FT + 0.5) * cell_len - support_radius,
                    (z as FT + 0.5) * cell_len - support_radius,
                );
                integral += (K::w(integration_point, support_radius) * cell_volume) as f64;
            }
        }
    }

    println!("Integration of {:?} kernel: {}", K::kernel_type(), integral);
    crate::assert_ft_approx_eq(integral as FT, 1., 0.01, || format!("integral of {:?}", K::kernel_type()));
}

#[cfg(test)]
fn kernel_derivative_test<K: SphKernel>() {
    use crate::vec3f;

    let support_radius: FT = 1.;
    let diff = 1e-3;
    let test_grid_size = 12;
    let probe_offset = 2. * support_radius / test_grid_size as FT;

    for z in 0..test_grid_size {
        for y in 0..test_grid_size {
            for x in 0..test_grid_size {
                let probe_point = vec3f(
                    (x as FT + 0.5) * probe_offset - support_radius,
                    (y as FT + 0.5) * probe_offset - support_radius,
                    (z as FT + 0.5) * probe_offset - support_radius,
                );

                let analytical_deriv = K::grad_w(probe_point, support_radius);

                let mut approx_deriv = V3::zeros();
                for d in 0..3 {
                    let mut offset = V3::zeros();
                    offset[d] = diff * 0.5;
                    let pos = K::w(probe_point + offset, support_radius);
                    let neg = K::w(probe_point - offset, support_radius);
                    approx_deriv[d] = (pos - neg) / diff;
                }

                for d in 0..3 {
                    crate::assert_ft_approx_eq(analytical_deriv[d], approx_deriv[d], 0.01, || {
                        format!("{:?} gradient at {:?}", K::kernel_type(), probe_point)
                    });
                }
            }
        }
    }
}

#[test]
fn cubic_kernel_3d_integration_test() {
    kernel_integration_test::<CubicKernel>();
}

#[test]
fn wendland_kernel_3d_integration_test() {
    kernel_integration_test::<WendlandQuinticC2Kernel>();
}

#[test]
fn cubic_kernel_3d_derivative_test() {
    kernel_derivative_test::<CubicKernel>();
}

#[test]
fn wendland_kernel_3d_derivative_test() {
    kernel_derivative_test::<WendlandQuinticC2Kernel>();
}

#[test]
fn kernel_gradient_is_antisymmetric() {
    use crate::vec3f;

    let x = vec3f(0.013, -0.02, 0.031);
    let g_pos = CubicKernel::grad_w(x, 0.1);
    let g_neg = CubicKernel::grad_w(-x, 0.1);
    assert_eq!(g_pos, -g_neg);
    assert_eq!(CubicKernel::grad_w(V3::zeros(), 0.1), V3::zeros());
}
