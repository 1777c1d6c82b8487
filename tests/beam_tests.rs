mod common;

use beamdyn_rs::beam::{Beam, BeamExtend, ReferenceKinematics, Species, WorkerRange};
use beamdyn_rs::coherent::Side;
use beamdyn_rs::errors::BeamError;
use beamdyn_rs::Float;

#[test]
fn test_construction() {
    let beam = common::setup_beam(100);
    assert_eq!(beam.n_macroparticles, 100);
    assert_eq!(beam.id.len(), 100);
    let expected: Vec<i64> = (1..=100).collect();
    assert_eq!(beam.id, expected);
    assert!((beam.ratio - 1e11 / 100.0).abs() < 1e-3);
    assert_eq!(beam.n_macroparticles_lost(), 0);
}

#[test]
fn test_construction_rejects_bad_parameters() {
    let species = Species::proton();
    let kin = ReferenceKinematics::from_momentum(&species, 450e9).unwrap();
    assert!(matches!(
        Beam::new(species, kin, 0, 1e11),
        Err(BeamError::InvalidConfig(_))
    ));
    assert!(matches!(
        Beam::new(species, kin, 10, -1.0),
        Err(BeamError::InvalidConfig(_))
    ));
    assert!(matches!(
        Species::new(-1.0, 1.0),
        Err(BeamError::InvalidParticle(_))
    ));
}

#[test]
fn test_kinematics_are_consistent() {
    let species = Species::proton();
    let kin = ReferenceKinematics::from_momentum(&species, 450e9).unwrap();
    assert!(kin.gamma > 1.0);
    assert!(kin.beta < 1.0 && kin.beta > 0.99);
    // E^2 = p^2 + m^2
    let lhs = kin.energy * kin.energy;
    let rhs = kin.momentum * kin.momentum + species.mass * species.mass;
    assert!((lhs - rhs).abs() / lhs < 1e-12 as Float);
}

#[test]
fn test_energy_cut_end_to_end() {
    // 1000 particles, every coordinate zero: a (-1, 1) eV acceptance
    // loses nothing.
    let mut beam = common::setup_beam(1000);
    beam.losses_energy_cut(-1.0, 1.0);
    assert_eq!(beam.n_macroparticles_lost(), 0);

    // kick 10 of them outside, reapply
    {
        let de = beam.de.read_mut(Side::Host);
        for y in de.iter_mut().take(10) {
            *y = 5.0;
        }
    }
    beam.losses_energy_cut(-1.0, 1.0);
    assert_eq!(beam.n_macroparticles_lost(), 10);
    assert_eq!(beam.n_macroparticles_alive(), 990);
}

#[test]
fn test_mark_lost_is_idempotent() {
    let mut beam = common::setup_beam(50);
    {
        let dt = beam.dt.read_mut(Side::Host);
        for (i, x) in dt.iter_mut().enumerate() {
            *x = i as Float;
        }
    }
    beam.losses_longitudinal_cut(0.0, 25.0);
    let after_first = beam.id.clone();
    beam.losses_longitudinal_cut(0.0, 25.0);
    assert_eq!(beam.id, after_first);
}

#[test]
fn test_losses_below_energy() {
    let mut beam = common::setup_beam(4);
    beam.de.write(Side::Host, vec![-2.0, -0.5, 0.0, 3.0]);
    beam.losses_below_energy(-1.0);
    assert_eq!(beam.id, vec![0, 2, 3, 4]);
}

#[test]
fn test_losses_separatrix_uses_collaborator_mask() {
    let mut beam = common::setup_beam(6);
    beam.dt.write(Side::Host, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    let rf = common::setup_rf(1);
    // toy boundary test: inside while dt < 3
    beam.losses_separatrix(&rf, |_kin, _rf, dt, _de| {
        dt.iter().map(|&x| x < 3.0).collect()
    });
    assert_eq!(beam.id, vec![1, 2, 3, 0, 0, 0]);
}

#[test]
fn test_statistics_on_live_subset() {
    let mut beam = common::setup_beam(4);
    beam.dt.write(Side::Host, vec![1.0, 3.0, 100.0, 5.0]);
    beam.de.write(Side::Host, vec![2.0, 4.0, -50.0, 6.0]);
    beam.id[2] = 0; // the outlier is lost and must not count

    beam.statistics().unwrap();
    assert!((beam.mean_dt - 3.0).abs() < 1e-12);
    assert!((beam.mean_de - 4.0).abs() < 1e-12);
    // population std of [1, 3, 5]
    let expected = (8.0 as Float / 3.0).sqrt();
    assert!((beam.sigma_dt - expected).abs() < 1e-12);
    assert!((beam.sigma_de - expected).abs() < 1e-12);
    let epsn = beamdyn_rs::PI * beam.sigma_dt * beam.sigma_de;
    assert!((beam.epsn_rms - epsn).abs() < 1e-12);
}

#[test]
fn test_statistics_fails_on_empty_beam() {
    let mut beam = common::setup_beam(5);
    for id in beam.id.iter_mut() {
        *id = 0;
    }
    assert!(matches!(beam.statistics(), Err(BeamError::EmptyBeam)));
}

#[test]
fn test_add_particles_then_statistics() {
    let mut beam = common::setup_beam(10);
    // flag the originals lost so statistics sees only the added subset
    for id in beam.id.iter_mut() {
        *id = 0;
    }
    let new_dt = [1.0 as Float, 2.0, 3.0];
    let new_de = [4.0 as Float, 5.0, 6.0];
    beam.add_particles(&new_dt, &new_de).unwrap();

    assert_eq!(beam.n_macroparticles, 13);
    assert_eq!(&beam.id[10..], &[11, 12, 13]);
    assert!((beam.ratio - 1e11 / 13.0).abs() < 1.0);

    beam.statistics().unwrap();
    assert!((beam.mean_dt - 2.0).abs() < 1e-12);
    assert!((beam.mean_de - 5.0).abs() < 1e-12);
    let expected = (2.0 as Float / 3.0).sqrt();
    assert!((beam.sigma_dt - expected).abs() < 1e-12);
}

#[test]
fn test_add_particles_rejects_mismatched_lengths() {
    let mut beam = common::setup_beam(10);
    let err = beam.add_particles(&[1.0, 2.0], &[1.0]).unwrap_err();
    assert!(matches!(
        err,
        BeamError::ParticleCountMismatch { n_dt: 2, n_de: 1 }
    ));
    // nothing was appended
    assert_eq!(beam.n_macroparticles, 10);
    assert_eq!(beam.id.len(), 10);
}

#[test]
fn test_eliminate_lost_particles_compacts() {
    let mut beam = common::setup_beam(6);
    beam.dt.write(Side::Host, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    beam.de.write(Side::Host, vec![10.0, 11.0, 12.0, 13.0, 14.0, 15.0]);
    beam.id[1] = 0;
    beam.id[4] = 0;

    beam.eliminate_lost_particles().unwrap();
    assert_eq!(beam.n_macroparticles, 4);
    assert_eq!(beam.id, vec![1, 3, 4, 6]);
    assert_eq!(beam.dt.read(Side::Host), &[0.0, 2.0, 3.0, 5.0]);
    assert_eq!(beam.de.read(Side::Host), &[10.0, 12.0, 13.0, 15.0]);
    assert!((beam.ratio - 1e11 / 4.0).abs() < 1.0);
}

#[test]
fn test_eliminate_all_lost_fails_and_leaves_beam_unmodified() {
    let mut beam = common::setup_beam(5);
    beam.dt.write(Side::Host, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    for id in beam.id.iter_mut() {
        *id = 0;
    }
    let err = beam.eliminate_lost_particles().unwrap_err();
    assert!(matches!(err, BeamError::AllParticlesLost(5)));
    assert_eq!(beam.n_macroparticles, 5);
    assert_eq!(beam.dt.read(Side::Host), &[1.0, 2.0, 3.0, 4.0, 5.0]);
}

#[test]
fn test_add_beam_lost_particles_consume_ids() {
    let mut beam = common::setup_beam(3);
    let mut other = common::setup_beam(4);
    other.dt.write(Side::Host, vec![1.0, 2.0, 3.0, 4.0]);
    other.id[0] = 0;
    other.id[2] = 0;

    beam.add_beam(&mut other).unwrap();
    assert_eq!(beam.n_macroparticles, 7);
    // lost particles keep id 0 but still advance the sequence counter
    assert_eq!(beam.id, vec![1, 2, 3, 0, 5, 0, 7]);

    // ids assigned afterwards continue past the consumed numbers
    beam.add_particles(&[9.0], &[9.0]).unwrap();
    assert_eq!(*beam.id.last().unwrap(), 8);
}

#[test]
fn test_add_beam_rejects_species_mismatch() {
    let mut beam = common::setup_beam(3);
    let species = Species::electron();
    let kin = ReferenceKinematics::from_momentum(&species, 1e9).unwrap();
    let mut other = Beam::new(species, kin, 3, 1e9).unwrap();
    assert!(matches!(
        beam.add_beam(&mut other),
        Err(BeamError::TypeMismatch(_))
    ));
}

#[test]
fn test_extend_dispatches_on_shape() {
    let mut beam = common::setup_beam(2);
    let mut other = common::setup_beam(2);
    beam.extend(BeamExtend::Beam(&mut other)).unwrap();
    assert_eq!(beam.n_macroparticles, 4);
    beam.extend(BeamExtend::Coordinates(&[1.0], &[2.0])).unwrap();
    assert_eq!(beam.n_macroparticles, 5);
    assert_eq!(beam.id, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_split_keeps_sub_range_and_global_ratio() {
    let mut beam = common::setup_beam(10);
    beam.dt.write(
        Side::Host,
        (0..10).map(|i| i as Float).collect::<Vec<Float>>(),
    );
    let ratio_before = beam.ratio;
    let range = WorkerRange {
        start: 4,
        size: 3,
        stride: 1,
        total_size: 10,
    };
    beam.split(&range).unwrap();
    assert_eq!(beam.n_macroparticles, 3);
    assert_eq!(beam.dt.read(Side::Host), &[4.0, 5.0, 6.0]);
    assert_eq!(beam.id, vec![5, 6, 7]);
    assert_eq!(beam.ratio, ratio_before);

    beam.set_remote_losses(42);
    assert_eq!(beam.n_total_lost_remote, 42);
}

#[test]
fn test_split_rejects_out_of_range() {
    let mut beam = common::setup_beam(10);
    let range = WorkerRange {
        start: 8,
        size: 5,
        stride: 1,
        total_size: 10,
    };
    assert!(matches!(
        beam.split(&range),
        Err(BeamError::InvalidConfig(_))
    ));
}
