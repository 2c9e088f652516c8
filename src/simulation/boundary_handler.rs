use crate::{floating_type_mod::FT, simulation_parameters::SimulationParams, VF};

/**
 * Solid boundaries sampled by static particles. Fluid particles closer than the
 * rest spacing to a sample are pushed away by the repulsive part of a
 * Lennard-Jones potential (Monaghan 1994). The force is never attractive.
 */
#[derive(Debug, Clone)]
pub struct LennardJonesBoundary<const D: usize> {
    boundary_positions: Vec<VF<D>>,
}

impl<const D: usize> LennardJonesBoundary<D> {
    pub fn new(boundary_particle_positions: Vec<VF<D>>) -> Self {
        Self {
            boundary_positions: boundary_particle_positions,
        }
    }

    pub fn num_boundary_particles(&self) -> usize {
        self.boundary_positions.len()
    }

    pub fn boundary_positions(&self) -> &[VF<D>] {
        &self.boundary_positions
    }

    /**
     * Acceleration of a fluid particle caused by a single boundary particle,
     * where `rik` points from the boundary particle to the fluid particle.
     *
     * A zero `rik` is not guarded against and yields non-finite values.
     */
    #[inline(always)]
    pub fn pair_repulsion_accel(rik: &VF<D>, simulation_params: &SimulationParams) -> Option<VF<D>> {
        let d2: FT = rik.norm_squared();
        let ratio = simulation_params.particle_spacing / d2.sqrt();
        if ratio > 1. {
            let magnitude = (ratio.powf(simulation_params.lennard_jones_p1)
                - ratio.powf(simulation_params.lennard_jones_p2))
                * simulation_params.lennard_jones_d
                / d2;
            Some(rik * magnitude)
        } else {
            None
        }
    }

    /** Adds the repulsion of all boundary particles (in index order) to `accel`. */
    #[inline(always)]
    pub fn add_repulsion_accel(&self, position: &VF<D>, accel: &mut VF<D>, simulation_params: &SimulationParams) {
        for boundary_position in &self.boundary_positions {
            let rik = position - boundary_position;
            if let Some(repulsion) = Self::pair_repulsion_accel(&rik, simulation_params) {
                *accel += repulsion;
            }
        }
    }
}
