/*!
Weakly compressible SPH fluid simulation (Monaghan 1994) in two and three dimensions,
with leap-frog time integration and Lennard-Jones boundary particles.
*/

mod platform;
mod simulation;

pub use simulation::*;

pub use platform::start;
