use beamdyn_rs::coherent::{CoherentArray, Side};
use beamdyn_rs::Float;

#[test]
fn test_zeros_start_host_fresh() {
    let mut arr: CoherentArray<Float> = CoherentArray::zeros(16);
    assert_eq!(arr.len(), 16);
    assert_eq!(arr.transfers(), 0);
    assert!(arr.read(Side::Host).iter().all(|&v| v == 0.0));
    // host reads never touch the accelerator side
    assert_eq!(arr.transfers(), 0);
}

#[test]
fn test_round_trip_costs_one_transfer() {
    let mut arr = CoherentArray::from_vec(vec![1.0 as Float, 2.0, 3.0]);
    // first accel read allocates the mirror and copies once
    assert_eq!(arr.read(Side::Accel), &[1.0, 2.0, 3.0]);
    assert_eq!(arr.transfers(), 1);
    // second read with no intervening write is free
    assert_eq!(arr.read(Side::Accel), &[1.0, 2.0, 3.0]);
    assert_eq!(arr.read(Side::Host), &[1.0, 2.0, 3.0]);
    assert_eq!(arr.transfers(), 1);
}

#[test]
fn test_write_invalidates_other_side_lazily() {
    let mut arr = CoherentArray::from_vec(vec![0.0 as Float; 4]);
    arr.read(Side::Accel);
    assert_eq!(arr.transfers(), 1);

    // several host writes before any accel read cost nothing
    arr.write(Side::Host, vec![1.0, 1.0, 1.0, 1.0]);
    arr.read_mut(Side::Host)[0] = 7.0;
    assert_eq!(arr.transfers(), 1);

    assert_eq!(arr.read(Side::Accel), &[7.0, 1.0, 1.0, 1.0]);
    assert_eq!(arr.transfers(), 2);
}

#[test]
fn test_accel_write_flows_back_to_host() {
    let mut arr = CoherentArray::from_vec(vec![0.0 as Float; 3]);
    arr.write(Side::Accel, vec![4.0, 5.0, 6.0]);
    assert_eq!(arr.read(Side::Host), &[4.0, 5.0, 6.0]);
    assert_eq!(arr.transfers(), 1);
}

#[test]
fn test_in_place_accel_mutation() {
    let mut arr = CoherentArray::from_vec(vec![1.0 as Float; 4]);
    for v in arr.read_mut(Side::Accel).iter_mut() {
        *v += 1.0;
    }
    assert_eq!(arr.read(Side::Host), &[2.0, 2.0, 2.0, 2.0]);
    // one transfer up, one back
    assert_eq!(arr.transfers(), 2);
}

#[test]
fn test_append_resizes_and_invalidates_mirror() {
    let mut arr = CoherentArray::from_vec(vec![1.0 as Float, 2.0]);
    arr.read(Side::Accel);
    arr.append(&[3.0, 4.0]);
    assert_eq!(arr.len(), 4);
    assert_eq!(arr.read(Side::Accel), &[1.0, 2.0, 3.0, 4.0]);
}
