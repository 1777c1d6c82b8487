use beamdyn_rs::beam::{Beam, ReferenceKinematics, Species};
use beamdyn_rs::rf::RfProgram;
use beamdyn_rs::{Float, PI};

pub const RF_PERIOD: Float = 5e-9;

// Sets up a small proton beam so it can be used in testing; all
// coordinates start at zero, ids at 1..=n.
pub fn setup_beam(n: usize) -> Beam {
    let species = Species::proton();
    let kinematics = ReferenceKinematics::from_momentum(&species, 450e9).unwrap();
    Beam::new(species, kinematics, n, 1e11).unwrap()
}

pub fn setup_rf(n_turns: usize) -> RfProgram {
    RfProgram::constant(2.0 * PI / RF_PERIOD, n_turns)
}
