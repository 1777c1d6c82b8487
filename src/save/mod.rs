use crate::beam::Beam;
use crate::coherent::Side;
use crate::slices::SparseSlicer;
use crate::{Config, Float};
use anyhow::{Context, Result};

pub(crate) fn save_profile(slicer: &SparseSlicer, bunch: usize, outdir: &str) -> Result<()> {
    let counts: Vec<Float> = slicer.macroparticle_count(bunch).to_vec();
    npy::to_file(format!("{}/profiles/bunch_{:03}.npy", outdir, bunch), counts)
        .context(format!("Could not save bunch {} profile to file", bunch))?;

    let centers: Vec<Float> = slicer.bin_centers(bunch).to_vec();
    npy::to_file(
        format!("{}/profiles/bin_centers_{:03}.npy", outdir, bunch),
        centers,
    )
    .context(format!("Could not save bunch {} bin centers to file", bunch))?;

    Ok(())
}

pub(crate) fn save_output(t: u32, cfg: &Config, beam: &mut Beam, slicer: &SparseSlicer) -> Result<()> {
    let output_prefix = format!("output/dat_{:05}", t / cfg.output.output_interval);
    std::fs::create_dir_all(&output_prefix).context("Unable to create output directory")?;
    std::fs::create_dir_all(&format!("{}/profiles", &output_prefix))
        .context("Unable to create output directory")?;

    println!("saving beam");
    let dt: Vec<Float> = beam
        .dt
        .read(Side::Host)
        .iter()
        .step_by(cfg.output.stride)
        .copied()
        .collect();
    npy::to_file(format!("{}/dt.npy", output_prefix), dt)
        .context("Could not save dt data to file")?;

    let de: Vec<Float> = beam
        .de
        .read(Side::Host)
        .iter()
        .step_by(cfg.output.stride)
        .copied()
        .collect();
    npy::to_file(format!("{}/dE.npy", output_prefix), de)
        .context("Could not save dE data to file")?;

    let id: Vec<i64> = beam.id.iter().step_by(cfg.output.stride).copied().collect();
    npy::to_file(format!("{}/id.npy", output_prefix), id)
        .context("Could not save id data to file")?;

    for bunch in 0..slicer.n_filled_buckets {
        save_profile(slicer, bunch, &output_prefix)?;
    }

    Ok(())
}
