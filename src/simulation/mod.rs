pub mod boundary_handler;
pub mod concurrency;
pub mod equation_of_state;
pub mod errors;
pub mod scene;
pub mod simulation;
pub mod simulation_parameters;
pub mod sph_kernels;

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

use nalgebra::SVector;

pub type V<FT, const D: usize> = SVector<FT, D>;

pub type VF<const D: usize> = V<FT, D>;

pub type V2 = V<FT, 2>;
pub type V3 = V<FT, 3>;

pub fn vec2f(x: FT, y: FT) -> V<FT, 2> {
    [x, y].into()
}

pub fn vec3f(x: FT, y: FT, z: FT) -> V<FT, 3> {
    [x, y, z].into()
}

/// Builds a `VF<D>` from a slice, `None` if the lengths disagree.
pub fn vecf_from_slice<const D: usize>(values: &[FT]) -> Option<VF<D>> {
    if values.len() != D {
        return None;
    }
    Some(VF::<D>::from_column_slice(values))
}

pub use simulation::*;

#[test]
fn vector_math_contract() {
    let a = vec3f(1., 2., 2.);
    let b = vec3f(-1., 0.5, 4.);

    assert_eq!(a + b, vec3f(0., 2.5, 6.));
    assert_eq!(a - b, vec3f(2., 1.5, -2.));
    assert_eq!(a.dot(&b), 8.);
    assert_eq!(a.norm(), 3.);

    let c = vec2f(3., 4.);
    assert_eq!(c.norm(), 5.);
    assert_eq!(c.dot(&vec2f(1., -1.)), -1.);
}

#[test]
fn vecf_from_slice_checks_length() {
    assert_eq!(vecf_from_slice::<2>(&[1., 2.]), Some(vec2f(1., 2.)));
    assert_eq!(vecf_from_slice::<3>(&[1., 2.]), None);
}
