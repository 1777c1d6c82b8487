use crate::Float;
use thiserror::Error;

/// Everything that can go wrong inside the beam container and the slicer.
///
/// All of these are unrecoverable at the point of detection: this is
/// numerical simulation code, and silently clamping or zero-filling would
/// corrupt the statistics downstream. The binary surfaces them through
/// `anyhow` with added context.
#[derive(Debug, Error)]
pub enum BeamError {
    #[error("particle mass must be positive, got {0} eV")]
    InvalidParticle(Float),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("coordinate arrays differ in length: {n_dt} dt values vs {n_de} dE values")]
    ParticleCountMismatch { n_dt: usize, n_de: usize },

    #[error("cannot merge incompatible beams: {0}")]
    TypeMismatch(String),

    #[error("all {0} macroparticles are lost, elimination would leave an empty beam")]
    AllParticlesLost(usize),

    #[error("no live macroparticles, statistics are undefined")]
    EmptyBeam,

    #[error("derivative mode '{0}' is not recognized (expected filter1d, gradient or diff)")]
    UnsupportedDerivativeMode(String),
}
