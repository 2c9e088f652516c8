use thiserror::Error;

/// Raised by `FluidSimulation::initialize` before any step is taken.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("unknown smoothing kernel `{name}` (available: {available})")]
    UnknownKernel { name: String, available: String },
    #[error("unknown equation of state `{name}` (available: {available})")]
    UnknownEquationOfState { name: String, available: String },
    #[error("unsupported dimension {0}, only 2 and 3 are supported")]
    UnsupportedDimension(usize),
    #[error("parameters request dimension {configured} but the simulation is {engine}-dimensional")]
    DimensionMismatch { configured: usize, engine: usize },
    #[error("particle field `{field}` has {len} entries but there are {expected} particles")]
    InconsistentParticleArrays {
        field: &'static str,
        len: usize,
        expected: usize,
    },
}

#[derive(Error, Debug)]
pub enum SceneError {
    #[error("failed to read scene file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse scene: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("{what} has {len} components, expected {dimension}")]
    VectorLength {
        what: String,
        len: usize,
        dimension: usize,
    },
    #[error("{what} needs {expected} entries for a {dimension}D scene but has {len}")]
    ShapeArity {
        what: String,
        len: usize,
        expected: usize,
        dimension: usize,
    },
    #[error("spacing `{what}` must be positive, got {value}")]
    NonPositiveSpacing { what: &'static str, value: f64 },
}
