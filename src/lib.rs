use anyhow::{Context as _, Result};
use rand::prelude::*;
use rand_distr::StandardNormal;
use serde::Deserialize;
use std::fs;
use std::str::FromStr;

pub mod beam;
pub mod coherent;
pub mod errors;
pub mod rf;
pub mod save;
pub mod slices;

use crate::beam::{Beam, ReferenceKinematics, Species};
use crate::coherent::Side;
use crate::errors::BeamError;
use crate::rf::RfProgram;
use crate::slices::{SliceStrategy, SparseSlicer};

// We use a type alias for f64/Float to support double and single
// precision, selected once at build time. The original runs in float64,
// so that is the default here.
#[cfg(feature = "sprec")]
pub type Float = f32;

#[cfg(not(feature = "sprec"))]
pub type Float = f64;

pub const PI: Float = std::f64::consts::PI as Float;

/// Which execution context owns the bulk kernels: the host runs them
/// sequentially over the host-side buffers, the accelerator context runs
/// them as parallel kernels over the accelerator-side buffers. Threaded
/// explicitly through constructors rather than read from global state.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Context {
    Host,
    Accel,
}

impl FromStr for Context {
    type Err = BeamError;

    fn from_str(s: &str) -> Result<Context, BeamError> {
        match s {
            "host" => Ok(Context::Host),
            "accel" => Ok(Context::Accel),
            other => Err(BeamError::InvalidConfig(format!(
                "unknown execution context '{}', expected host or accel",
                other
            ))),
        }
    }
}

#[derive(Deserialize)]
pub struct Config {
    pub species: SpeciesConfig,
    pub beam: BeamParams,
    pub rf: RfParams,
    pub slicing: SlicingParams,
    pub setup: Setup,
    pub output: Output,
}

#[derive(Deserialize)]
pub struct SpeciesConfig {
    /// "proton", "electron" or "custom".
    pub kind: String,
    /// Rest energy in eV, custom species only.
    pub mass: Option<Float>,
    /// Charge in units of e, custom species only.
    pub charge: Option<Float>,
}

#[derive(Deserialize)]
pub struct BeamParams {
    pub n_macroparticles: usize,
    pub intensity: Float,
    /// Synchronous-particle momentum [eV/c].
    pub momentum: Float,
    /// Gaussian bunch widths used by the driver to populate the filled
    /// buckets.
    pub sigma_dt: Float,
    pub sigma_de: Float,
}

#[derive(Deserialize)]
pub struct RfParams {
    /// RF frequency [Hz]; constant across the run, as sparse slicing
    /// requires.
    pub frequency: Float,
}

#[derive(Deserialize)]
pub struct SlicingParams {
    pub n_slices: usize,
    pub filling_pattern: Vec<bool>,
    /// "batched" or "per_bucket".
    pub strategy: String,
}

#[derive(Deserialize)]
pub struct Setup {
    pub n_turns: u32,
    /// "host" or "accel".
    pub context: String,
    /// Synchrotron tune of the toy rotation the driver applies in place of
    /// the real tracker.
    pub synchrotron_tune: Float,
    /// Symmetric energy acceptance [eV]; particles outside are flagged
    /// lost each turn.
    pub energy_cut: Float,
}

#[derive(Deserialize)]
pub struct Output {
    pub write_output: bool,
    pub output_interval: u32,
    pub stride: usize,
}

impl Config {
    pub fn new() -> Result<Config> {
        let contents =
            fs::read_to_string("config.toml").context("Could not open the config.toml file")?;
        toml::from_str(&contents).with_context(|| "Could not parse Config file")
    }

    pub fn species(&self) -> Result<Species, BeamError> {
        match self.species.kind.as_str() {
            "proton" => Ok(Species::proton()),
            "electron" => Ok(Species::electron()),
            "custom" => {
                let mass = self.species.mass.ok_or_else(|| {
                    BeamError::InvalidConfig("custom species needs a mass".to_string())
                })?;
                let charge = self.species.charge.ok_or_else(|| {
                    BeamError::InvalidConfig("custom species needs a charge".to_string())
                })?;
                Species::new(mass, charge)
            }
            other => Err(BeamError::InvalidConfig(format!(
                "unknown species kind '{}'",
                other
            ))),
        }
    }
}

/// Deposits a Gaussian bunch in the center of every filled bucket. Stands
/// in for the distribution-matching collaborator so the driver has
/// something to slice.
fn seed_bunches(cfg: &Config, beam: &mut Beam, rf_period: Float) {
    let filled: Vec<usize> = cfg
        .slicing
        .filling_pattern
        .iter()
        .enumerate()
        .filter(|&(_, &f)| f)
        .map(|(k, _)| k)
        .collect();
    let mut rng = thread_rng();

    let dt = beam.dt.read_mut(Side::Host);
    for (i, x) in dt.iter_mut().enumerate() {
        let center = (filled[i % filled.len()] as Float + 0.5) * rf_period;
        let r: Float = rng.sample(StandardNormal);
        *x = center + cfg.beam.sigma_dt * r;
    }
    let de = beam.de.read_mut(Side::Host);
    for y in de.iter_mut() {
        let r: Float = rng.sample(StandardNormal);
        *y = cfg.beam.sigma_de * r;
    }
}

/// Toy stand-in for the tracking collaborators: rotates every particle
/// around its bucket center in normalized phase space. Enough motion to
/// exercise slicing, losses and the coherency protocol turn by turn.
fn rotate_bunches(cfg: &Config, beam: &mut Beam, rf_period: Float) {
    let theta = 2.0 * PI * cfg.setup.synchrotron_tune;
    let (sin_t, cos_t) = theta.sin_cos();
    let sx = cfg.beam.sigma_dt;
    let sy = cfg.beam.sigma_de;

    // Mutating both coordinate arrays through the host side; the
    // accelerator mirrors go stale until the next accel-side read.
    let dt = beam.dt.read_mut(Side::Host);
    let de = beam.de.read_mut(Side::Host);
    for (x, y) in dt.iter_mut().zip(de.iter_mut()) {
        let center = ((*x / rf_period).floor() + 0.5) * rf_period;
        let u = (*x - center) / sx;
        let v = *y / sy;
        *x = center + sx * (u * cos_t + v * sin_t);
        *y = sy * (v * cos_t - u * sin_t);
    }
}

pub fn run(cfg: Config) -> Result<()> {
    let species = cfg.species()?;
    let kinematics = ReferenceKinematics::from_momentum(&species, cfg.beam.momentum)?;
    let mut beam = Beam::new(
        species,
        kinematics,
        cfg.beam.n_macroparticles,
        cfg.beam.intensity,
    )?;

    let context = Context::from_str(&cfg.setup.context)?;
    let strategy = SliceStrategy::from_str(&cfg.slicing.strategy)?;
    let omega = 2.0 * PI * cfg.rf.frequency;
    let mut rf = RfProgram::constant(omega, cfg.setup.n_turns as usize);
    let mut slicer = SparseSlicer::new(
        &rf,
        cfg.slicing.n_slices,
        cfg.slicing.filling_pattern.clone(),
        strategy,
        context,
    )?;

    println!("initializing beam");
    seed_bunches(&cfg, &mut beam, rf.rf_period());

    for t in 0..=cfg.setup.n_turns {
        rotate_bunches(&cfg, &mut beam, rf.rf_period());
        beam.losses_energy_cut(-cfg.setup.energy_cut, cfg.setup.energy_cut);

        slicer.recompute_cuts(&rf);
        slicer.slice(&mut beam);

        if t % cfg.output.output_interval == 0 {
            beam.statistics()?;
            println!(
                "turn {}: mean_dt {:.3e} s, sigma_dt {:.3e} s, sigma_dE {:.3e} eV, lost {}",
                t,
                beam.mean_dt,
                beam.sigma_dt,
                beam.sigma_de,
                beam.n_macroparticles_lost()
            );
            if cfg.output.write_output {
                save::save_output(t, &cfg, &mut beam, &slicer)?;
            }
        }
        rf.advance_turn();
    }

    println!(
        "done: {} transfers dt, {} transfers dE",
        beam.dt.transfers(),
        beam.de.transfers()
    );
    Ok(())
}
