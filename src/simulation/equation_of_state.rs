use enum_dispatch::enum_dispatch;

use crate::{
    concurrency::par_iter_mut1, errors::ConfigurationError, floating_type_mod::FT,
    simulation_parameters::SimulationParams,
};

#[enum_dispatch]
pub trait EquationOfStateTrait {
    fn name(&self) -> &'static str;

    fn pressure(&self, density: FT) -> FT;
}

/**
 * Batchelor's equation of state in the form suggested by Monaghan:
 * J.J.Monaghan, Simulating Free Surface Flows with SPH, J.Comput.Phys., 110, 399-406, 1994.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchelorEos {
    rest_density: FT,
    b: FT,
}

impl BatchelorEos {
    pub const EXPONENT: i32 = 7;

    pub fn new(rest_density: FT, speed_of_sound: FT) -> Self {
        Self {
            rest_density,
            b: rest_density * speed_of_sound * speed_of_sound / Self::EXPONENT as FT,
        }
    }
}

impl EquationOfStateTrait for BatchelorEos {
    fn name(&self) -> &'static str {
        "BATCHELOR"
    }

    #[inline(always)]
    fn pressure(&self, density: FT) -> FT {
        self.b * ((density / self.rest_density).powi(Self::EXPONENT) - 1.)
    }
}

/**
 * Linear equation of state:
 * M.Desbrun and M.Gascuel, Smoothed Particles: A new paradigm for animating highly deformable bodies, 1996.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DesbrunEos {
    rest_density: FT,
    stiffness: FT,
}

impl DesbrunEos {
    pub const STIFFNESS: FT = 30.;

    pub fn new(rest_density: FT) -> Self {
        Self {
            rest_density,
            stiffness: Self::STIFFNESS,
        }
    }
}

impl EquationOfStateTrait for DesbrunEos {
    fn name(&self) -> &'static str {
        "DESBRUN"
    }

    #[inline(always)]
    fn pressure(&self, density: FT) -> FT {
        self.stiffness * (density - self.rest_density)
    }
}

#[enum_dispatch(EquationOfStateTrait)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EquationOfState {
    BatchelorEos,
    DesbrunEos,
}

/// Names accepted by `EquationOfState::from_name` (case-insensitive).
pub const EQUATION_OF_STATE_NAMES: [&str; 2] = ["BATCHELOR", "DESBRUN"];

impl EquationOfState {
    pub fn from_name(name: &str, simulation_params: &SimulationParams) -> Result<EquationOfState, ConfigurationError> {
        let eos = match name.to_ascii_uppercase().as_str() {
            "BATCHELOR" | "MONAGHAN" => {
                BatchelorEos::new(simulation_params.rest_density, simulation_params.speed_of_sound).into()
            }
            "DESBRUN" => DesbrunEos::new(simulation_params.rest_density).into(),
            _ => {
                return Err(ConfigurationError::UnknownEquationOfState {
                    name: name.to_string(),
                    available: EQUATION_OF_STATE_NAMES.join(", "),
                })
            }
        };
        Ok(eos)
    }

    /** Writes the pressure for every density. Both slices have one entry per fluid particle. */
    pub fn compute_pressures(&self, densities: &[FT], pressures: &mut [FT]) {
        assert!(densities.len() == pressures.len());
        par_iter_mut1(pressures, |i, pressure| {
            *pressure = self.pressure(densities[i]);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation_parameters::test_params;

    fn all_equations_of_state(params: &SimulationParams) -> Vec<EquationOfState> {
        EQUATION_OF_STATE_NAMES
            .iter()
            .map(|name| EquationOfState::from_name(name, params).unwrap())
            .collect()
    }

    #[test]
    fn zero_pressure_at_rest_density() {
        for rest_density in [0.5, 1., 1000.] {
            let mut params = test_params(2);
            params.rest_density = rest_density;
            params.speed_of_sound = 3.;
            for eos in all_equations_of_state(&params) {
                assert_eq!(eos.pressure(rest_density), 0., "{}", eos.name());
            }
        }
    }

    #[test]
    fn pressure_increases_with_density() {
        let params = test_params(3);
        for eos in all_equations_of_state(&params) {
            let mut last_pressure = eos.pressure(0.1);
            for i in 1..40 {
                let density = 0.1 + 0.05 * i as FT;
                let pressure = eos.pressure(density);
                assert!(pressure > last_pressure, "{} at density {}", eos.name(), density);
                last_pressure = pressure;
            }
            // compression gives positive, expansion negative pressure
            assert!(eos.pressure(1.1) > 0.);
            assert!(eos.pressure(0.9) < 0.);
        }
    }

    #[test]
    fn pressure_laws_match_closed_form() {
        let mut params = test_params(2);
        params.speed_of_sound = 10.;
        let batchelor = EquationOfState::from_name("batchelor", &params).unwrap();
        let desbrun = EquationOfState::from_name("desbrun", &params).unwrap();

        // B = rho0 * c^2 / 7
        crate::assert_ft_approx_eq(
            batchelor.pressure(2.),
            100. / 7. * (128. - 1.),
            1e-2,
            || "batchelor".to_string(),
        );
        assert_eq!(desbrun.pressure(2.), 30.);
    }

    #[test]
    fn compute_pressures_covers_all_particles() {
        let params = test_params(2);
        let eos = EquationOfState::from_name("DESBRUN", &params).unwrap();
        let densities = vec![1., 2., 0.5, 1.];
        let mut pressures = vec![FT::NAN; 4];
        eos.compute_pressures(&densities, &mut pressures);
        assert_eq!(pressures, vec![0., 30., -15., 0.]);
    }

    #[test]
    fn unknown_equation_of_state() {
        let params = test_params(2);
        assert_eq!(
            EquationOfState::from_name("TAIT", &params).unwrap_err(),
            ConfigurationError::UnknownEquationOfState {
                name: "TAIT".to_string(),
                available: "BATCHELOR, DESBRUN".to_string(),
            }
        );
        assert_eq!(EquationOfState::from_name("Monaghan", &params).unwrap().name(), "BATCHELOR");
    }
}
