use crate::coherent::{CoherentArray, Side};
use crate::errors::BeamError;
use crate::rf::RfProgram;
use crate::{Float, PI};
use itertools::izip;

/// Proton rest energy in eV (CODATA 2018).
pub const PROTON_MASS_EV: Float = 938.272_088_16e6 as Float;
/// Electron rest energy in eV (CODATA 2018).
pub const ELECTRON_MASS_EV: Float = 0.510_998_95e6 as Float;

/// Rest mass [eV] and charge [e] of a particle type. Immutable after
/// construction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Species {
    pub mass: Float,
    pub charge: Float,
}

impl Species {
    pub fn new(mass: Float, charge: Float) -> Result<Species, BeamError> {
        if mass > 0.0 {
            Ok(Species { mass, charge })
        } else {
            Err(BeamError::InvalidParticle(mass))
        }
    }

    pub fn proton() -> Species {
        Species {
            mass: PROTON_MASS_EV,
            charge: 1.0,
        }
    }

    pub fn electron() -> Species {
        Species {
            mass: ELECTRON_MASS_EV,
            charge: -1.0,
        }
    }
}

/// Reference-particle kinematics, fixed at beam construction.
#[derive(Clone, Copy, Debug)]
pub struct ReferenceKinematics {
    pub beta: Float,
    pub gamma: Float,
    /// Total energy of the synchronous particle [eV].
    pub energy: Float,
    /// Momentum of the synchronous particle [eV/c].
    pub momentum: Float,
}

impl ReferenceKinematics {
    pub fn from_momentum(species: &Species, momentum: Float) -> Result<ReferenceKinematics, BeamError> {
        if momentum <= 0.0 {
            return Err(BeamError::InvalidConfig(format!(
                "reference momentum must be positive, got {} eV/c",
                momentum
            )));
        }
        let gamma = (1.0 + (momentum / species.mass).powi(2)).sqrt();
        let energy = gamma * species.mass;
        Ok(ReferenceKinematics {
            beta: momentum / energy,
            gamma,
            energy,
            momentum,
        })
    }
}

/// Contiguous sub-range of the particle arrays owned by one worker in a
/// distributed run. The gather/scatter orchestration itself lives outside
/// this crate; this is the metadata it exchanges with the container.
#[derive(Clone, Copy, Debug)]
pub struct WorkerRange {
    pub start: usize,
    pub size: usize,
    pub stride: usize,
    pub total_size: usize,
}

/// Something a beam can be extended with: another beam (merge) or a pair
/// of coordinate sequences (append).
pub enum BeamExtend<'a> {
    Beam(&'a mut Beam),
    Coordinates(&'a [Float], &'a [Float]),
}

/// The beam container: per-macroparticle arrival-time offsets `dt` [s]
/// and energy offsets `de` [eV] relative to the synchronous particle,
/// mirrored between host and accelerator memory, plus the host-resident
/// liveness ids and the scalar beam properties.
///
/// `id[i] == 0` is the sole liveness flag. Loss operations only flag
/// particles; nothing is removed from the arrays until
/// `eliminate_lost_particles` compacts them.
pub struct Beam {
    pub species: Species,
    pub kinematics: ReferenceKinematics,
    pub dt: CoherentArray<Float>,
    pub de: CoherentArray<Float>,
    pub id: Vec<i64>,
    /// Total intensity in number of charges.
    pub intensity: Float,
    /// Intensity carried by one macroparticle.
    pub ratio: Float,
    pub n_macroparticles: usize,
    pub mean_dt: Float,
    pub mean_de: Float,
    pub sigma_dt: Float,
    pub sigma_de: Float,
    /// R.m.s. longitudinal emittance in the Gaussian approximation [eVs].
    pub epsn_rms: Float,
    /// Losses aggregated across distributed workers, fed back by the
    /// external gather step.
    pub n_total_lost_remote: u64,
}

impl Beam {
    /// Creates a beam with all-zero coordinates and ids `1..=n`.
    pub fn new(
        species: Species,
        kinematics: ReferenceKinematics,
        n_macroparticles: usize,
        intensity: Float,
    ) -> Result<Beam, BeamError> {
        if n_macroparticles == 0 {
            return Err(BeamError::InvalidConfig(
                "n_macroparticles must be > 0".to_string(),
            ));
        }
        if intensity <= 0.0 {
            return Err(BeamError::InvalidConfig(format!(
                "intensity must be positive, got {}",
                intensity
            )));
        }
        Ok(Beam {
            species,
            kinematics,
            dt: CoherentArray::zeros(n_macroparticles),
            de: CoherentArray::zeros(n_macroparticles),
            id: (1..=n_macroparticles as i64).collect(),
            intensity,
            ratio: intensity / n_macroparticles as Float,
            n_macroparticles,
            mean_dt: 0.0,
            mean_de: 0.0,
            sigma_dt: 0.0,
            sigma_de: 0.0,
            epsn_rms: 0.0,
            n_total_lost_remote: 0,
        })
    }

    pub fn n_macroparticles_lost(&self) -> usize {
        self.id.iter().filter(|&&id| id == 0).count()
    }

    pub fn n_macroparticles_alive(&self) -> usize {
        self.n_macroparticles - self.n_macroparticles_lost()
    }

    /// Mean, population standard deviation and r.m.s. emittance over the
    /// live subset, stored in the `mean_*` / `sigma_*` / `epsn_rms`
    /// fields. Fails rather than silently producing NaN when every
    /// particle is lost.
    ///
    /// In a distributed run each worker computes this over its own
    /// `WorkerRange` sub-beam; cross-worker aggregation happens in the
    /// gather step outside this crate, which reports the combined loss
    /// total back through `set_remote_losses` / `n_total_lost_remote`.
    pub fn statistics(&mut self) -> Result<(), BeamError> {
        let dt = self.dt.read(Side::Host);
        let de = self.de.read(Side::Host);
        let id = &self.id;

        let n_alive = id.iter().filter(|&&i| i != 0).count();
        if n_alive == 0 {
            return Err(BeamError::EmptyBeam);
        }
        let norm = 1.0 / n_alive as Float;

        let mut sum_dt = 0.0;
        let mut sum_de = 0.0;
        for (&x, &y, &i) in izip!(dt, de, id) {
            if i != 0 {
                sum_dt += x;
                sum_de += y;
            }
        }
        let mean_dt = sum_dt * norm;
        let mean_de = sum_de * norm;

        let mut var_dt = 0.0;
        let mut var_de = 0.0;
        for (&x, &y, &i) in izip!(dt, de, id) {
            if i != 0 {
                var_dt += (x - mean_dt) * (x - mean_dt);
                var_de += (y - mean_de) * (y - mean_de);
            }
        }

        self.mean_dt = mean_dt;
        self.mean_de = mean_de;
        self.sigma_dt = (var_dt * norm).sqrt();
        self.sigma_de = (var_de * norm).sqrt();
        self.epsn_rms = PI * self.sigma_dt * self.sigma_de;
        Ok(())
    }

    /// Flags every particle outside the separatrix as lost. The actual
    /// Hamiltonian boundary test is the collaborator's; it receives the
    /// reference kinematics, the RF program and both coordinate arrays and
    /// returns a per-particle membership mask.
    pub fn losses_separatrix<F>(&mut self, rf: &RfProgram, is_in_separatrix: F)
    where
        F: Fn(&ReferenceKinematics, &RfProgram, &[Float], &[Float]) -> Vec<bool>,
    {
        let dt = self.dt.read(Side::Host);
        let de = self.de.read(Side::Host);
        let inside = is_in_separatrix(&self.kinematics, rf, dt, de);
        if !cfg!(feature = "unchecked") {
            assert_eq!(inside.len(), self.id.len());
        }
        for (id, &inside) in self.id.iter_mut().zip(&inside) {
            if !inside {
                *id = 0;
            }
        }
    }

    /// Flags particles with `dt` outside `(dt_min, dt_max)` as lost.
    pub fn losses_longitudinal_cut(&mut self, dt_min: Float, dt_max: Float) {
        let dt = self.dt.read(Side::Host);
        for (id, &x) in self.id.iter_mut().zip(dt) {
            if (x - dt_min) * (dt_max - x) < 0.0 {
                *id = 0;
            }
        }
    }

    /// Flags particles with `de` outside `(de_min, de_max)` as lost,
    /// e.g. on collimators.
    pub fn losses_energy_cut(&mut self, de_min: Float, de_max: Float) {
        let de = self.de.read(Side::Host);
        for (id, &y) in self.id.iter_mut().zip(de) {
            if (y - de_min) * (de_max - y) < 0.0 {
                *id = 0;
            }
        }
    }

    /// Flags particles with `de` below `de_min` as lost.
    pub fn losses_below_energy(&mut self, de_min: Float) {
        let de = self.de.read(Side::Host);
        for (id, &y) in self.id.iter_mut().zip(de) {
            if y - de_min < 0.0 {
                *id = 0;
            }
        }
    }

    /// Compacts the arrays down to the live particles. Fails, leaving the
    /// beam untouched, if no particle would survive; downstream code
    /// cannot work with an empty beam.
    pub fn eliminate_lost_particles(&mut self) -> Result<(), BeamError> {
        let n_alive = self.id.iter().filter(|&&i| i != 0).count();
        if n_alive == 0 {
            return Err(BeamError::AllParticlesLost(self.n_macroparticles));
        }
        if n_alive == self.n_macroparticles {
            return Ok(());
        }

        let new_dt: Vec<Float> = {
            let dt = self.dt.read(Side::Host);
            izip!(dt, &self.id)
                .filter(|&(_, &id)| id != 0)
                .map(|(&x, _)| x)
                .collect()
        };
        let new_de: Vec<Float> = {
            let de = self.de.read(Side::Host);
            izip!(de, &self.id)
                .filter(|&(_, &id)| id != 0)
                .map(|(&y, _)| y)
                .collect()
        };
        self.dt.write(Side::Host, new_dt);
        self.de.write(Side::Host, new_de);
        self.id.retain(|&id| id != 0);
        self.n_macroparticles = n_alive;
        self.ratio = self.intensity / self.n_macroparticles as Float;
        Ok(())
    }

    /// Appends new particles with fresh sequential ids.
    pub fn add_particles(&mut self, new_dt: &[Float], new_de: &[Float]) -> Result<(), BeamError> {
        if new_dt.len() != new_de.len() {
            return Err(BeamError::ParticleCountMismatch {
                n_dt: new_dt.len(),
                n_de: new_de.len(),
            });
        }
        let first = self.n_macroparticles as i64 + 1;
        self.id
            .extend(first..first + new_dt.len() as i64);
        self.dt.append(new_dt);
        self.de.append(new_de);
        self.n_macroparticles += new_dt.len();
        self.ratio = self.intensity / self.n_macroparticles as Float;
        Ok(())
    }

    /// Merges another beam into this one. Live particles from `other` get
    /// fresh sequential ids; particles already lost in `other` stay lost,
    /// but still consume a sequence number so that ids assigned later
    /// remain unique with respect to the merged population.
    pub fn add_beam(&mut self, other: &mut Beam) -> Result<(), BeamError> {
        if self.species != other.species {
            return Err(BeamError::TypeMismatch(format!(
                "species mass {} eV / charge {} e vs mass {} eV / charge {} e",
                self.species.mass, self.species.charge, other.species.mass, other.species.charge
            )));
        }

        self.dt.append(other.dt.read(Side::Host));
        self.de.append(other.de.read(Side::Host));

        let mut counter = self.n_macroparticles as i64 + 1;
        for &old_id in &other.id {
            if old_id != 0 {
                self.id.push(counter);
            } else {
                self.id.push(0);
            }
            counter += 1;
        }
        self.n_macroparticles += other.n_macroparticles;
        self.ratio = self.intensity / self.n_macroparticles as Float;
        Ok(())
    }

    /// Single polymorphic extension entry point: merge when handed a beam,
    /// append when handed coordinate sequences.
    pub fn extend(&mut self, other: BeamExtend) -> Result<(), BeamError> {
        match other {
            BeamExtend::Beam(beam) => self.add_beam(beam),
            BeamExtend::Coordinates(new_dt, new_de) => self.add_particles(new_dt, new_de),
        }
    }

    /// Keeps only this worker's contiguous sub-range of the arrays. The
    /// intensity (and with it `ratio`) stays global; each worker carries
    /// the same per-macroparticle weight as before the split.
    pub fn split(&mut self, range: &WorkerRange) -> Result<(), BeamError> {
        if range.start + range.size > self.n_macroparticles || range.size == 0 {
            return Err(BeamError::InvalidConfig(format!(
                "worker range [{}, {}) does not fit a beam of {} macroparticles",
                range.start,
                range.start + range.size,
                self.n_macroparticles
            )));
        }
        let lo = range.start;
        let hi = range.start + range.size;
        let dt = self.dt.read(Side::Host)[lo..hi].to_vec();
        let de = self.de.read(Side::Host)[lo..hi].to_vec();
        self.dt.write(Side::Host, dt);
        self.de.write(Side::Host, de);
        self.id = self.id[lo..hi].to_vec();
        self.n_macroparticles = range.size;
        Ok(())
    }

    /// Records the loss total the distributed gather computed across all
    /// workers.
    pub fn set_remote_losses(&mut self, total: u64) {
        self.n_total_lost_remote = total;
    }
}
