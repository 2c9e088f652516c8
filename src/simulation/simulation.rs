use crate::boundary_handler::LennardJonesBoundary;
use crate::concurrency::{par_iter_mut2, par_iter_mut3, par_iter_reduce1};
use crate::equation_of_state::{EquationOfState, EquationOfStateTrait};
use crate::errors::ConfigurationError;
use crate::simulation_parameters::SimulationParams;
use crate::sph_kernels::{DimensionUtils, KernelTrait, SmoothingKernel};
use crate::{floating_type_mod::FT, VF};

use nalgebra::zero;
use num_traits::Float;
use tracing::{debug, trace};

use std::collections::HashMap;
use std::fmt::{Display, Write};
use std::marker::PhantomData;
use std::time::{Duration, Instant};

#[derive(Clone)]
struct Counter<T> {
    values: Vec<T>,
    last_start: Instant,
}
impl<T> Counter<T> {
    fn new() -> Self {
        Counter::<T> {
            last_start: Instant::now(),
            values: Vec::new(),
        }
    }
    fn add_value(&mut self, v: T) {
        self.values.push(v);
    }
}
impl Counter<FT> {
    fn avg(&self) -> FT {
        self.values.iter().cloned().sum::<FT>() / self.values.len() as FT
    }
    fn min(&self) -> FT {
        self.values.iter().cloned().fold(FT::MAX, FT::min)
    }
    fn max(&self) -> FT {
        self.values.iter().cloned().fold(FT::MIN, FT::max)
    }
}
impl Counter<Duration> {
    fn begin(&mut self) {
        self.last_start = Instant::now();
    }

    fn end(&mut self) {
        self.values.push(Instant::now() - self.last_start);
    }

    fn avg(&self) -> Duration {
        self.values.iter().cloned().sum::<Duration>() / self.values.len() as u32
    }

    fn sum(&self) -> Duration {
        self.values.iter().cloned().sum::<Duration>()
    }
}

struct ValueCounters {
    counters: HashMap<String, Counter<FT>>,
    enabled: bool,
}
impl ValueCounters {
    fn new(enabled: bool) -> ValueCounters {
        ValueCounters {
            counters: HashMap::default(),
            enabled,
        }
    }

    fn add_value(&mut self, id: &str, v: FT) {
        if self.enabled {
            self.counters
                .entry(id.to_string())
                .or_insert_with(Counter::<FT>::new)
                .add_value(v);
        }
    }
}

struct PerformanceCounters {
    counters: HashMap<String, Counter<Duration>>,
    enabled: bool,
}
impl PerformanceCounters {
    fn new(enabled: bool) -> PerformanceCounters {
        PerformanceCounters {
            counters: HashMap::default(),
            enabled,
        }
    }

    fn begin(&mut self, id: &str) {
        if self.enabled {
            self.counters
                .entry(id.to_string())
                .or_insert_with(Counter::<Duration>::new)
                .begin();
        }
    }
    fn end(&mut self, id: &str) {
        if self.enabled {
            if let Some(counter) = self.counters.get_mut(id) {
                counter.end();
            }
        }
    }
}

macro_rules! decl_particle_vec {
    (pub struct $struct_name:ident<const D: usize> { $(pub $field_name:ident: Vec<$field_type:ty> | $default_value:expr),*$(,)?  }) => {
        #[derive(Debug, Clone, PartialEq)]
        pub struct $struct_name<const D: usize> {
            $(
                pub $field_name : Vec<$field_type>,
            )*
        }

        impl<const D: usize> $struct_name<D> {
            pub fn extend(&mut self, num_elements: usize) {
                $(
                    self.$field_name.extend((0..num_elements).map::<$field_type, _>(|_| $default_value));
                )*
            }

            pub fn default(len: usize) -> Self {
                Self {
                    $(
                        $field_name: (0..len).map(|_| $default_value).collect::<Vec<$field_type>>(),
                    )*
                }
            }
        }
    }
}

decl_particle_vec! {
    pub struct ParticleVec<const D: usize> {
        pub position: Vec<VF<D>> | zero(),
        pub velocity: Vec<VF<D>> | zero(),

        // velocity at t - dt/2
        pub interval_velocity: Vec<VF<D>> | zero(),
        pub acceleration: Vec<VF<D>> | zero(),

        pub density: Vec<FT> | 0.,

        // density at t - dt/2
        pub interval_density: Vec<FT> | 0.,
        pub density_derivative: Vec<FT> | 0.,

        pub pressure: Vec<FT> | 0.,
        pub mass: Vec<FT> | 0.,
    }
}

impl<const D: usize> ParticleVec<D> {
    pub fn new() -> Self {
        Self::default(0)
    }

    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    /**
     * Appends a particle. The half-step velocity and density start out equal to
     * the full-step values and the pressure is zero until the first step.
     */
    pub fn add_particle(&mut self, position: VF<D>, velocity: VF<D>, mass: FT, density: FT) {
        let i = self.len();
        self.extend(1);
        self.position[i] = position;
        self.velocity[i] = velocity;
        self.interval_velocity[i] = velocity;
        self.mass[i] = mass;
        self.density[i] = density;
        self.interval_density[i] = density;
    }

    /// Every field must hold one entry per particle (as many as `position`).
    pub fn check_consistent_len(&self) -> Result<(), ConfigurationError> {
        let n = self.len();
        let lengths = [
            ("velocity", self.velocity.len()),
            ("interval_velocity", self.interval_velocity.len()),
            ("acceleration", self.acceleration.len()),
            ("density", self.density.len()),
            ("interval_density", self.interval_density.len()),
            ("density_derivative", self.density_derivative.len()),
            ("pressure", self.pressure.len()),
            ("mass", self.mass.len()),
        ];
        for (field, len) in lengths {
            if len != n {
                return Err(ConfigurationError::InconsistentParticleArrays {
                    field,
                    len,
                    expected: n,
                });
            }
        }
        Ok(())
    }
}

/**
 * Weakly compressible SPH with brute-force neighbor search and leap-frog time integration.
 *
 * J.J.Monaghan, Simulating Free Surface Flows with SPH, J.Comput.Phys., 110, 399-406, 1994.
 */
pub struct FluidSimulation<DU: DimensionUtils<D>, const D: usize> {
    particles: ParticleVec<D>,
    boundary: LennardJonesBoundary<D>,
    kernel: SmoothingKernel,
    equation_of_state: EquationOfState,
    simulation_params: SimulationParams,

    step_number: usize,

    pcounters: PerformanceCounters,
    vcounters: ValueCounters,

    _dimension_utils: PhantomData<DU>,
}

impl<DU: DimensionUtils<D>, const D: usize> FluidSimulation<DU, D> {
    /**
     * Resolves the kernel and equation of state by name and takes ownership of the
     * initial particle state. Fails before any step can be taken if a name is unknown,
     * the parameters ask for a different dimension than `D` or the particle fields
     * differ in length.
     */
    pub fn initialize(
        kernel_name: &str,
        equation_of_state_name: &str,
        simulation_params: SimulationParams,
        particles: ParticleVec<D>,
        boundary_particle_positions: Vec<VF<D>>,
    ) -> Result<Self, ConfigurationError> {
        if simulation_params.dimension != 2 && simulation_params.dimension != 3 {
            return Err(ConfigurationError::UnsupportedDimension(simulation_params.dimension));
        }
        if simulation_params.dimension != D {
            return Err(ConfigurationError::DimensionMismatch {
                configured: simulation_params.dimension,
                engine: D,
            });
        }

        let kernel = SmoothingKernel::from_name::<DU, D>(kernel_name, simulation_params.smoothing_length)?;
        let equation_of_state = EquationOfState::from_name(equation_of_state_name, &simulation_params)?;

        particles.check_consistent_len()?;

        debug!(
            kernel = kernel.name(),
            equation_of_state = equation_of_state.name(),
            dimension = D,
            fluid_particles = particles.len(),
            boundary_particles = boundary_particle_positions.len(),
            "initialized fluid simulation"
        );

        Ok(FluidSimulation {
            particles,
            boundary: LennardJonesBoundary::new(boundary_particle_positions),
            kernel,
            equation_of_state,
            simulation_params,
            step_number: 0,
            pcounters: PerformanceCounters::new(false),
            vcounters: ValueCounters::new(false),
            _dimension_utils: PhantomData,
        })
    }

    /** Track timings and particle statistics for `write_statistics`. */
    pub fn enable_statistics(&mut self) {
        self.pcounters.enabled = true;
        self.vcounters.enabled = true;
    }

    pub fn particles(&self) -> &ParticleVec<D> {
        &self.particles
    }

    pub fn positions(&self) -> &[VF<D>] {
        &self.particles.position
    }

    pub fn boundary_positions(&self) -> &[VF<D>] {
        self.boundary.boundary_positions()
    }

    pub fn num_fluid_particles(&self) -> usize {
        self.particles.len()
    }

    pub fn num_boundary_particles(&self) -> usize {
        self.boundary.num_boundary_particles()
    }

    pub fn kernel(&self) -> &SmoothingKernel {
        &self.kernel
    }

    pub fn equation_of_state(&self) -> &EquationOfState {
        &self.equation_of_state
    }

    pub fn simulation_params(&self) -> &SimulationParams {
        &self.simulation_params
    }

    /// Simulated time `step_number * time_step`, computed without accumulating rounding errors.
    pub fn time(&self) -> FT {
        self.step_number as FT * self.simulation_params.time_step
    }

    pub fn step_number(&self) -> usize {
        self.step_number
    }

    /**
     * Acceleration and rate of change of density of particle `i`
     * (Monaghan 1994, momentum equation with artificial viscosity and continuity equation).
     *
     * Neighbors are summed in ascending index order so the result does not depend
     * on how particles are distributed over threads.
     */
    #[inline(always)]
    fn calculate_particle_accel_and_density_rate(
        i: usize,
        position: &[VF<D>],
        velocity: &[VF<D>],
        density: &[FT],
        pressure: &[FT],
        mass: &[FT],
        kernel: &SmoothingKernel,
        boundary: &LennardJonesBoundary<D>,
        simulation_params: &SimulationParams,
    ) -> (VF<D>, FT) {
        let h = kernel.smoothing_length();
        let viscosity_nu = 0.01 * h * h;
        let alpha_c = simulation_params.viscosity_alpha * simulation_params.speed_of_sound;
        let beta = simulation_params.viscosity_beta;

        let mut accel: VF<D> = simulation_params.external_force_vector::<D>();
        let mut density_derivative: FT = 0.;

        let pressure_term_i = pressure[i] / (density[i] * density[i]);

        for j in 0..position.len() {
            if j == i {
                continue;
            }

            let x_ij = position[i] - position[j];
            let grad_ij = match kernel.gradient(&x_ij) {
                Some(grad_ij) => grad_ij,
                None => continue,
            };

            // artificial viscosity, only for approaching particles
            let v_ij = velocity[i] - velocity[j];
            let v_dot_x = x_ij.dot(&v_ij);
            let viscosity_term = if v_dot_x < 0. {
                let mu = h * v_dot_x / (x_ij.norm_squared() + viscosity_nu);
                2. * mu * (-alpha_c + beta * mu) / (density[i] + density[j])
            } else {
                0.
            };

            let pressure_term = pressure_term_i + pressure[j] / (density[j] * density[j]);

            accel -= grad_ij * (mass[j] * (pressure_term + viscosity_term));
            density_derivative += mass[j] * v_ij.dot(&grad_ij);
        }

        boundary.add_repulsion_accel(&position[i], &mut accel, simulation_params);

        (accel, density_derivative)
    }

    fn accumulate_forces(
        particles: &mut ParticleVec<D>,
        kernel: &SmoothingKernel,
        boundary: &LennardJonesBoundary<D>,
        simulation_params: &SimulationParams,
    ) {
        let position = &particles.position;
        let velocity = &particles.velocity;
        let density = &particles.density;
        let pressure = &particles.pressure;
        let mass = &particles.mass;

        par_iter_mut2(
            &mut particles.acceleration,
            &mut particles.density_derivative,
            |i, p_accel, p_density_derivative| {
                let (accel, density_derivative) = Self::calculate_particle_accel_and_density_rate(
                    i,
                    position,
                    velocity,
                    density,
                    pressure,
                    mass,
                    kernel,
                    boundary,
                    simulation_params,
                );
                *p_accel = accel;
                *p_density_derivative = density_derivative;
            },
        );
    }

    /**
     * Leap-frog scheme (M.P.Allen and D.J.Tildesley, Computer Simulation of Liquids, 1987).
     * Velocity and density at full steps are reconstructed from the half-step values.
     */
    fn leapfrog_integration(particles: &mut ParticleVec<D>, dt: FT) {
        let acceleration = &particles.acceleration;
        par_iter_mut3(
            &mut particles.interval_velocity,
            &mut particles.position,
            &mut particles.velocity,
            |i, p_interval_velocity, p_position, p_velocity| {
                *p_interval_velocity += acceleration[i] * dt;
                *p_position += *p_interval_velocity * dt;
                *p_velocity = *p_interval_velocity + acceleration[i] * dt / 2.;
            },
        );

        let density_derivative = &particles.density_derivative;
        par_iter_mut2(
            &mut particles.interval_density,
            &mut particles.density,
            |i, p_interval_density, p_density| {
                *p_interval_density += density_derivative[i] * dt;
                *p_density = *p_interval_density + density_derivative[i] * dt / 2.;
            },
        );
    }

    /** Advance the simulation by one `time_step`: pressures, then forces, then integration. */
    pub fn single_step(&mut self) {
        self.pcounters.begin("simulation-step");

        self.pcounters.begin("eos");
        self.equation_of_state
            .compute_pressures(&self.particles.density, &mut self.particles.pressure);
        self.pcounters.end("eos");

        self.pcounters.begin("forces");
        Self::accumulate_forces(
            &mut self.particles,
            &self.kernel,
            &self.boundary,
            &self.simulation_params,
        );
        self.pcounters.end("forces");

        self.pcounters.begin("integration");
        Self::leapfrog_integration(&mut self.particles, self.simulation_params.time_step);
        self.pcounters.end("integration");

        self.step_number += 1;

        self.pcounters.end("simulation-step");

        if self.vcounters.enabled {
            self.vcounters
                .add_value("particle-count", self.particles.len() as FT);
            self.vcounters.add_value("max-speed", self.max_speed());
        }

        trace!(step = self.step_number, time = self.time() as f64, "simulation step done");
    }

    pub fn max_speed(&self) -> FT {
        par_iter_reduce1(&self.particles.velocity, || 0., FT::max, |_, v| v.norm())
    }

    /** True if any position, velocity or density became NaN or infinite. */
    pub fn has_non_finite_state(&self) -> bool {
        let particles = &self.particles;
        par_iter_reduce1(
            &particles.position,
            || false,
            |a, b| a || b,
            |i, position| {
                !(position.iter().all(|x| x.is_finite())
                    && particles.velocity[i].iter().all(|x| x.is_finite())
                    && particles.density[i].is_finite())
            },
        )
    }

    pub fn write_statistics(&self) -> Result<String, std::fmt::Error> {
        let mut s = String::new();

        if let Some(step_counter) = self.pcounters.counters.get("simulation-step") {
            writeln!(
                s,
                "simulation-time: {}ms ({} steps)",
                step_counter.sum().as_secs_f64() * 1000.,
                step_counter.values.len()
            )?;
            writeln!(s)?;
        }

        let mut v = self.pcounters.counters.iter().collect::<Vec<_>>();
        v.sort_by(|x, y| x.0.cmp(y.0));
        for (label, pcounter) in v {
            writeln!(s, "{}: avg:{}ms", label, pcounter.avg().as_secs_f64() * 1000.)?;
        }
        writeln!(s)?;

        let mut v = self.vcounters.counters.iter().collect::<Vec<_>>();
        v.sort_by(|x, y| x.0.cmp(y.0));
        for (label, vcounter) in v {
            writeln!(
                s,
                "{}: min:{} max:{} avg:{}",
                label,
                vcounter.min(),
                vcounter.max(),
                vcounter.avg()
            )?;
        }

        Ok(s)
    }
}

pub fn is_ft_approx_eq<FT: Float>(a: FT, b: FT, tolerance: FT) -> bool {
    assert!(!a.is_nan());
    assert!(!b.is_nan());
    b <= a + tolerance && b >= a - tolerance
}

pub fn assert_ft_approx_eq<FT: Float + Display>(a: FT, b: FT, tolerance: FT, s: impl FnOnce() -> String) {
    if !is_ft_approx_eq(a, b, tolerance) {
        panic!(
            "{} value not equal with a tolerance of {}:\n\ta={}\n\tb={}\n",
            s(),
            tolerance,
            a,
            b
        );
    }
}
