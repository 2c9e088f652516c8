use crate::{floating_type_mod::FT, VF};
use serde::{Deserialize, Serialize};

fn default_external_force() -> [FT; 3] {
    [0., -0.00981, 0.]
}

fn default_lennard_jones_d() -> FT {
    10.
}

fn default_lennard_jones_p1() -> FT {
    4.
}

fn default_lennard_jones_p2() -> FT {
    2.
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    // 2 or 3, fixed for the whole run
    pub dimension: usize,

    pub rest_density: FT,
    pub speed_of_sound: FT,

    // artificial viscosity (Monaghan 1994)
    pub viscosity_alpha: FT,
    pub viscosity_beta: FT,

    pub time_step: FT,

    // kernel support is 2h
    pub smoothing_length: FT,

    // initial distance between fluid particles, also the rest distance for boundary repulsion
    pub particle_spacing: FT,

    // only the first `dimension` components are used
    #[serde(default = "default_external_force")]
    pub external_force: [FT; 3],

    // repulsive Lennard-Jones boundary force
    #[serde(default = "default_lennard_jones_d")]
    pub lennard_jones_d: FT,
    #[serde(default = "default_lennard_jones_p1")]
    pub lennard_jones_p1: FT,
    #[serde(default = "default_lennard_jones_p2")]
    pub lennard_jones_p2: FT,
}

impl SimulationParams {
    pub fn external_force_vector<const D: usize>(&self) -> VF<D> {
        VF::<D>::from_iterator(self.external_force.iter().cloned().take(D))
    }

    /** Mass of a fluid particle sampled at `particle_spacing` */
    pub fn particle_mass(&self) -> FT {
        self.particle_spacing * self.particle_spacing * self.particle_spacing * self.rest_density
    }
}

/// Contents of a simulation config file: the strategy names next to the numeric parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub kernel: String,
    pub equation_of_state: String,
    #[serde(flatten)]
    pub params: SimulationParams,
}

#[cfg(test)]
pub(crate) fn test_params(dimension: usize) -> SimulationParams {
    SimulationParams {
        dimension,
        rest_density: 1.,
        speed_of_sound: 1.,
        viscosity_alpha: 0.1,
        viscosity_beta: 0.2,
        time_step: 0.01,
        smoothing_length: 0.1,
        particle_spacing: 0.05,
        external_force: [0., 0., 0.],
        lennard_jones_d: default_lennard_jones_d(),
        lennard_jones_p1: default_lennard_jones_p1(),
        lennard_jones_p2: default_lennard_jones_p2(),
    }
}

#[test]
fn simulation_config_from_yaml_uses_defaults() {
    let yaml = "
kernel: SPLINE
equation_of_state: BATCHELOR
dimension: 2
rest_density: 1.0
speed_of_sound: 1.5
viscosity_alpha: 0.08
viscosity_beta: 0.0
time_step: 0.05
smoothing_length: 0.12
particle_spacing: 0.1
";
    let config: SimulationConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.kernel, "SPLINE");
    assert_eq!(config.equation_of_state, "BATCHELOR");
    assert_eq!(config.params.dimension, 2);
    assert_eq!(config.params.external_force, [0., -0.00981, 0.]);
    assert_eq!(config.params.lennard_jones_d, 10.);
    assert_eq!(config.params.lennard_jones_p1, 4.);
    assert_eq!(config.params.lennard_jones_p2, 2.);
}

#[test]
fn external_force_is_truncated_to_dimension() {
    let mut params = test_params(2);
    params.external_force = [1., -2., 3.];
    assert_eq!(params.external_force_vector::<2>(), crate::vec2f(1., -2.));
    assert_eq!(params.external_force_vector::<3>(), crate::vec3f(1., -2., 3.));
}
