use enum_dispatch::enum_dispatch;

use crate::{
    errors::ConfigurationError,
    floating_type_mod::{FT, PI},
    VF,
};

/// Kernel support radius in units of the smoothing length.
pub const SUPPORT_RADIUS_BY_SMOOTHING_LENGTH: FT = 2.;

// Sync is needed since we use this trait inside parallel iterators
pub trait DimensionUtils<const D: usize>: Sync {
    fn cubic_spline_normalization(h: FT) -> FT;
    fn spiky_normalization(h: FT) -> FT;
}

pub enum DimensionUtils2d {}
impl DimensionUtils<2> for DimensionUtils2d {
    fn cubic_spline_normalization(h: FT) -> FT {
        10. / (7. * PI * h * h)
    }

    fn spiky_normalization(h: FT) -> FT {
        5. / (16. * PI * h * h)
    }
}

pub enum DimensionUtils3d {}
impl DimensionUtils<3> for DimensionUtils3d {
    fn cubic_spline_normalization(h: FT) -> FT {
        1. / (PI * h * h * h)
    }

    fn spiky_normalization(h: FT) -> FT {
        15. / (64. * PI * h * h * h)
    }
}

/**
 * A radially symmetric kernel with support `s = |r|/h <= 2`.
 *
 * The gradient of every kernel here is parallel to the separation vector, so
 * kernels only report the scalar factor in front of it.
 */
#[enum_dispatch]
pub trait KernelTrait {
    fn name(&self) -> &'static str;

    fn smoothing_length(&self) -> FT;

    /// Factor `f` with `grad W(rij) = f * rij`, where `s = |rij|/h`. `None` outside of the support.
    fn gradient_factor(&self, s: FT) -> Option<FT>;

    fn weight(&self, s: FT) -> FT;
}

/**
 * Cubic spline kernel
 * J.J.Monaghan, Smoothed Particle Hydrodynamics, Annu.Rev.Astron.Astrophys., 30, 543-574, 1992.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicSplineKernel {
    h: FT,
    norm_factor: FT,
    grad_factor: FT,
}

impl CubicSplineKernel {
    pub fn new<DU: DimensionUtils<D>, const D: usize>(h: FT) -> Self {
        let norm_factor = DU::cubic_spline_normalization(h);
        Self {
            h,
            norm_factor,
            grad_factor: norm_factor / (h * h),
        }
    }
}

impl KernelTrait for CubicSplineKernel {
    fn name(&self) -> &'static str {
        "SPLINE"
    }

    fn smoothing_length(&self) -> FT {
        self.h
    }

    #[inline(always)]
    fn gradient_factor(&self, s: FT) -> Option<FT> {
        if s > SUPPORT_RADIUS_BY_SMOOTHING_LENGTH {
            None
        } else if s > 1. {
            let v = 2. - s;
            Some(self.grad_factor * -0.75 * v * v / s)
        } else {
            Some(self.grad_factor * (2.25 * s - 3.))
        }
    }

    fn weight(&self, s: FT) -> FT {
        if s > SUPPORT_RADIUS_BY_SMOOTHING_LENGTH {
            0.
        } else if s > 1. {
            let v = 2. - s;
            self.norm_factor * 0.25 * v * v * v
        } else {
            self.norm_factor * (1. - 1.5 * s * s + 0.75 * s * s * s)
        }
    }
}

/**
 * Spiky kernel
 * M.Desbrun and M.Gascuel, Smoothed Particles: A new paradigm for animating highly deformable bodies, 1996.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpikyKernel {
    h: FT,
    norm_factor: FT,
    grad_factor: FT,
}

impl SpikyKernel {
    pub fn new<DU: DimensionUtils<D>, const D: usize>(h: FT) -> Self {
        let norm_factor = DU::spiky_normalization(h);
        Self {
            h,
            norm_factor,
            grad_factor: norm_factor * (-3. / (h * h)),
        }
    }
}

impl KernelTrait for SpikyKernel {
    fn name(&self) -> &'static str {
        "SPIKY"
    }

    fn smoothing_length(&self) -> FT {
        self.h
    }

    #[inline(always)]
    fn gradient_factor(&self, s: FT) -> Option<FT> {
        if s > SUPPORT_RADIUS_BY_SMOOTHING_LENGTH {
            return None;
        }
        let v = 2. - s;
        Some(self.grad_factor * v * v / s)
    }

    fn weight(&self, s: FT) -> FT {
        if s > SUPPORT_RADIUS_BY_SMOOTHING_LENGTH {
            return 0.;
        }
        let v = 2. - s;
        self.norm_factor * v * v * v
    }
}

#[enum_dispatch(KernelTrait)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SmoothingKernel {
    CubicSplineKernel,
    SpikyKernel,
}

/// Names accepted by `SmoothingKernel::from_name` (case-insensitive).
pub const KERNEL_NAMES: [&str; 2] = ["SPLINE", "SPIKY"];

impl SmoothingKernel {
    /** Resolve a kernel by name and compute its normalization for smoothing length `h`. */
    pub fn from_name<DU: DimensionUtils<D>, const D: usize>(
        name: &str,
        h: FT,
    ) -> Result<SmoothingKernel, ConfigurationError> {
        let kernel = match name.to_ascii_uppercase().as_str() {
            "SPLINE" | "CUBIC_SPLINE" => CubicSplineKernel::new::<DU, D>(h).into(),
            "SPIKY" => SpikyKernel::new::<DU, D>(h).into(),
            _ => {
                return Err(ConfigurationError::UnknownKernel {
                    name: name.to_string(),
                    available: KERNEL_NAMES.join(", "),
                })
            }
        };
        Ok(kernel)
    }

    /**
     * Gradient of the kernel with respect to `x_i` where `rij = x_i - x_j`.
     * Returns `None` if `x_j` is outside of the support. `rij` must not be zero.
     */
    #[inline(always)]
    pub fn gradient<const D: usize>(&self, rij: &VF<D>) -> Option<VF<D>> {
        let s = rij.norm() / self.smoothing_length();
        self.gradient_factor(s).map(|factor| rij * factor)
    }

    pub fn weight_at<const D: usize>(&self, rij: &VF<D>) -> FT {
        self.weight(rij.norm() / self.smoothing_length())
    }
}

#[cfg(test)]
fn all_kernels<DU: DimensionUtils<D>, const D: usize>(h: FT) -> Vec<SmoothingKernel> {
    KERNEL_NAMES
        .iter()
        .map(|name| SmoothingKernel::from_name::<DU, D>(name, h).unwrap())
        .collect()
}

#[test]
fn gradient_out_of_support_iff_beyond_two_smoothing_lengths() {
    fn inner<DU: DimensionUtils<D>, const D: usize>() {
        let h: FT = 0.3;
        for kernel in all_kernels::<DU, D>(h) {
            let mut direction = VF::<D>::zeros();
            for d in 0..D {
                direction[d] = 1. + d as FT;
            }
            let direction = direction.normalize();

            for step in 0..30 {
                // s in [0.05, 2.95], never exactly on the support border
                let s = 0.05 + 0.1 * step as FT;
                let rij = direction * (s * h);
                let gradient = kernel.gradient(&rij);
                if s > SUPPORT_RADIUS_BY_SMOOTHING_LENGTH {
                    assert!(gradient.is_none(), "{} D={} s={}: expected no support", kernel.name(), D, s);
                } else {
                    let gradient = gradient.unwrap_or_else(|| {
                        panic!("{} D={} s={}: expected support", kernel.name(), D, s)
                    });
                    for d in 0..D {
                        assert!(gradient[d].is_finite());
                    }
                    // gradient points from j towards i with negative sign (kernel decreases outwards)
                    assert!(gradient.dot(&rij) < 0., "{} D={} s={}", kernel.name(), D, s);
                }
            }
        }
    }

    inner::<DimensionUtils2d, 2>();
    inner::<DimensionUtils3d, 3>();
}

#[test]
fn kernel_2d_integration_test() {
    use crate::vec2f;

    let h = 5.;
    let support_radius = SUPPORT_RADIUS_BY_SMOOTHING_LENGTH * h;
    let grid_size = 400;
    let square_len = 2. * support_radius / grid_size as FT;
    let square_area = (square_len * square_len) as f64;

    for kernel in all_kernels::<DimensionUtils2d, 2>(h) {
        let mut integral: f64 = 0.;

        for y in 0..grid_size {
            for x in 0..grid_size {
                let integration_point = vec2f(
                    (x as FT + 0.5) * square_len - support_radius,
                    (y as FT + 0.5) * square_len - support_radius,
                );
                integral += kernel.weight_at(&integration_point) as f64 * square_area;
            }
        }

        println!("Integration of 2D {} kernel with h={:.2}: {}", kernel.name(), h, integral);
        assert!((integral - 1.).abs() < 5e-3);
    }
}

#[test]
fn kernel_3d_integration_test() {
    use crate::vec3f;

    let h = 0.5;
    let support_radius = SUPPORT_RADIUS_BY_SMOOTHING_LENGTH * h;
    let grid_size = 80;
    let cube_len = 2. * support_radius / grid_size as FT;
    let cube_volume = (cube_len * cube_len * cube_len) as f64;

    let coord = |i: usize| (i as FT + 0.5) * cube_len - support_radius;

    for kernel in all_kernels::<DimensionUtils3d, 3>(h) {
        let mut integral: f64 = 0.;
        for z in 0..grid_size {
            for y in 0..grid_size {
                for x in 0..grid_size {
                    let integration_point = vec3f(coord(x), coord(y), coord(z));
                    integral += kernel.weight_at(&integration_point) as f64 * cube_volume;
                }
            }
        }

        println!("Integration of 3D {} kernel with h={:.2}: {}", kernel.name(), h, integral);
        assert!((integral - 1.).abs() < 5e-3);
    }
}

#[test]
fn kernel_2d_derivative_test() {
    use crate::{vec2f, V2};

    let h = 1.;
    let support_radius = SUPPORT_RADIUS_BY_SMOOTHING_LENGTH * h;
    let test_grid_size = 100;
    let diff = support_radius * 1e-2;
    let diff_half = diff * 0.5;

    let probe_offset = 2.5 * support_radius / test_grid_size as FT;

    for kernel in all_kernels::<DimensionUtils2d, 2>(h) {
        for y in 0..=test_grid_size {
            for x in 0..=test_grid_size {
                let probe_point = vec2f(
                    (x as FT + 0.5) * probe_offset - 1.25 * support_radius,
                    (y as FT + 0.5) * probe_offset - 1.25 * support_radius,
                );

                // the spiky kernel has a cusp at the origin
                if probe_point.norm() < 0.25 * h {
                    continue;
                }

                let analytical_deriv: V2 = kernel.gradient(&probe_point).unwrap_or_else(V2::zeros);

                let x_neg = kernel.weight_at(&(probe_point + vec2f(-diff_half, 0.)));
                let x_pos = kernel.weight_at(&(probe_point + vec2f(diff_half, 0.)));
                let y_neg = kernel.weight_at(&(probe_point + vec2f(0., -diff_half)));
                let y_pos = kernel.weight_at(&(probe_point + vec2f(0., diff_half)));

                let approx_deriv = vec2f((x_pos - x_neg) / diff, (y_pos - y_neg) / diff);
                let absolute_error = analytical_deriv - approx_deriv;

                assert!(
                    absolute_error.x.abs() < 0.001 && absolute_error.y.abs() < 0.001,
                    "{} at [{:+.4}, {:+.4}]: analytical={:?} approx={:?}",
                    kernel.name(),
                    probe_point.x,
                    probe_point.y,
                    analytical_deriv,
                    approx_deriv,
                );
            }
        }
    }
}

#[test]
fn kernel_names_resolve_case_insensitively() {
    let h = 0.1;
    let spline = SmoothingKernel::from_name::<DimensionUtils2d, 2>("spline", h).unwrap();
    assert_eq!(spline.name(), "SPLINE");
    let spline = SmoothingKernel::from_name::<DimensionUtils2d, 2>("Cubic_Spline", h).unwrap();
    assert_eq!(spline.name(), "SPLINE");
    let spiky = SmoothingKernel::from_name::<DimensionUtils3d, 3>("SPIKY", h).unwrap();
    assert_eq!(spiky.name(), "SPIKY");
    assert_eq!(spiky.smoothing_length(), h);

    let err = SmoothingKernel::from_name::<DimensionUtils2d, 2>("POLY6", h).unwrap_err();
    assert_eq!(
        err,
        ConfigurationError::UnknownKernel {
            name: "POLY6".to_string(),
            available: "SPLINE, SPIKY".to_string(),
        }
    );
}

#[test]
fn normalization_constants() {
    let h: FT = 2.;
    crate::assert_ft_approx_eq(
        DimensionUtils2d::cubic_spline_normalization(h),
        10. / (28. * PI),
        1e-6,
        || "2D spline".to_string(),
    );
    crate::assert_ft_approx_eq(
        DimensionUtils3d::cubic_spline_normalization(h),
        1. / (8. * PI),
        1e-6,
        || "3D spline".to_string(),
    );
    crate::assert_ft_approx_eq(
        DimensionUtils2d::spiky_normalization(h),
        5. / (64. * PI),
        1e-6,
        || "2D spiky".to_string(),
    );
    crate::assert_ft_approx_eq(
        DimensionUtils3d::spiky_normalization(h),
        15. / (512. * PI),
        1e-6,
        || "3D spiky".to_string(),
    );
}

#[test]
fn support_ends_at_support_radius() {
    let h: FT = 0.4;
    let radius = SUPPORT_RADIUS_BY_SMOOTHING_LENGTH;
    for kernel in all_kernels::<DimensionUtils2d, 2>(h)
        .into_iter()
        .chain(all_kernels::<DimensionUtils3d, 3>(h))
    {
        assert_eq!(kernel.gradient_factor(radius), Some(0.), "{}", kernel.name());
        assert_eq!(kernel.weight(radius), 0., "{}", kernel.name());
        assert!(kernel.gradient_factor(radius * 1.001).is_none(), "{}", kernel.name());
        assert_eq!(kernel.weight(radius * 1.001), 0., "{}", kernel.name());
        assert!(kernel.weight(radius * 0.999) > 0., "{}", kernel.name());
    }
}
