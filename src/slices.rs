use crate::beam::Beam;
use crate::coherent::Side;
use crate::errors::BeamError;
use crate::rf::RfProgram;
use crate::{Context, Float};
use rayon::prelude::*;
use std::str::FromStr;

/// How `slice()` routes particles into the per-bucket histograms.
///
/// Both strategies apply the same half-open window comparisons and the
/// same bin formula, so for identical input they produce bit-for-bit
/// identical counts; `PerBucket` exists as the reference path to test
/// `Batched` against.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SliceStrategy {
    /// One bulk pass, O(N): each particle's bucket is resolved from
    /// `floor(dt / rf_period)` and routed through the bunch-index lookup.
    Batched,
    /// One independent histogram pass per filled bucket, O(K*N).
    PerBucket,
}

impl FromStr for SliceStrategy {
    type Err = BeamError;

    fn from_str(s: &str) -> Result<SliceStrategy, BeamError> {
        match s {
            "batched" => Ok(SliceStrategy::Batched),
            "per_bucket" => Ok(SliceStrategy::PerBucket),
            other => Err(BeamError::InvalidConfig(format!(
                "unknown slicing strategy '{}', expected batched or per_bucket",
                other
            ))),
        }
    }
}

/// Numerical mode for the profile derivative consumers may request.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DerivativeMode {
    /// Binomially smoothed histogram, then central gradient.
    Filter1d,
    /// Central gradient, one-sided at the edges.
    Gradient,
    /// First differences at bin midpoints, interpolated back onto the
    /// bin centers.
    Diff,
}

impl FromStr for DerivativeMode {
    type Err = BeamError;

    fn from_str(s: &str) -> Result<DerivativeMode, BeamError> {
        match s {
            "filter1d" => Ok(DerivativeMode::Filter1d),
            "gradient" => Ok(DerivativeMode::Gradient),
            "diff" => Ok(DerivativeMode::Diff),
            other => Err(BeamError::UnsupportedDerivativeMode(other.to_string())),
        }
    }
}

/// Sparse slicer: one fixed-width time window per filled RF bucket, each
/// holding an `n_slices`-bin histogram ("profile") of the live particles'
/// arrival times.
///
/// Only valid while the RF frequency stays constant across the run; the
/// filling pattern and bucket count are assumed stable, the cuts are
/// recomputed per turn anyway via `recompute_cuts`.
pub struct SparseSlicer {
    pub rf_period: Float,
    pub filling_pattern: Vec<bool>,
    /// For filled bucket k, its 0-based rank among filled buckets; -1 for
    /// empty buckets.
    pub bunch_index: Vec<i32>,
    /// Absolute bucket position of every filled bucket, in rank order.
    bucket_position: Vec<usize>,
    pub n_filled_buckets: usize,
    pub n_slices: usize,
    pub cut_left: Vec<Float>,
    pub cut_right: Vec<Float>,
    /// Shared storage for all profiles, row per filled bucket.
    bin_centers: Vec<Float>,
    counts: Vec<Float>,
    strategy: SliceStrategy,
    context: Context,
}

impl SparseSlicer {
    pub fn new(
        rf: &RfProgram,
        n_slices: usize,
        filling_pattern: Vec<bool>,
        strategy: SliceStrategy,
        context: Context,
    ) -> Result<SparseSlicer, BeamError> {
        if n_slices == 0 {
            return Err(BeamError::InvalidConfig(
                "n_slices must be > 0".to_string(),
            ));
        }
        let n_filled = filling_pattern.iter().filter(|&&f| f).count();
        if n_filled == 0 {
            return Err(BeamError::InvalidConfig(
                "filling pattern has no filled bucket".to_string(),
            ));
        }

        let mut bunch_index = vec![-1i32; filling_pattern.len()];
        let mut bucket_position = Vec::with_capacity(n_filled);
        let mut rank = 0i32;
        for (k, &filled) in filling_pattern.iter().enumerate() {
            if filled {
                bunch_index[k] = rank;
                bucket_position.push(k);
                rank += 1;
            }
        }

        let mut slicer = SparseSlicer {
            rf_period: 0.0,
            filling_pattern,
            bunch_index,
            bucket_position,
            n_filled_buckets: n_filled,
            n_slices,
            cut_left: vec![0.0; n_filled],
            cut_right: vec![0.0; n_filled],
            bin_centers: vec![0.0; n_filled * n_slices],
            counts: vec![0.0; n_filled * n_slices],
            strategy,
            context,
        };
        slicer.recompute_cuts(rf);
        Ok(slicer)
    }

    /// Realigns the bucket windows to the RF period of the current turn.
    /// Call once per turn, after the RF program advances.
    pub fn recompute_cuts(&mut self, rf: &RfProgram) {
        self.rf_period = rf.rf_period();
        let bin_width = self.rf_period / self.n_slices as Float;
        for (i, &pos) in self.bucket_position.iter().enumerate() {
            // Both edges come from the same k * rf_period expression, so
            // adjacent windows share the exact float value on their common
            // edge; cut_left + rf_period may round one ulp past it.
            self.cut_left[i] = pos as Float * self.rf_period;
            self.cut_right[i] = (pos + 1) as Float * self.rf_period;
            for j in 0..self.n_slices {
                self.bin_centers[i * self.n_slices + j] =
                    self.cut_left[i] + (j as Float + 0.5) * bin_width;
            }
        }
    }

    /// Histogram counts of filled bucket `bunch` (read-only view).
    pub fn macroparticle_count(&self, bunch: usize) -> &[Float] {
        &self.counts[bunch * self.n_slices..(bunch + 1) * self.n_slices]
    }

    /// Bin centers of filled bucket `bunch` (read-only view).
    pub fn bin_centers(&self, bunch: usize) -> &[Float] {
        &self.bin_centers[bunch * self.n_slices..(bunch + 1) * self.n_slices]
    }

    /// All counts as one contiguous matrix, row per filled bucket. This is
    /// the bulk-access surface for impedance consumers.
    pub fn counts_flat(&self) -> &[Float] {
        &self.counts
    }

    pub fn bin_centers_flat(&self) -> &[Float] {
        &self.bin_centers
    }

    /// Recomputes every profile from the beam's current `dt` array. Live
    /// particles outside all windows are silently excluded. Synchronous;
    /// in the accelerator context the histogram runs as a parallel bulk
    /// kernel over the accelerator-side buffer after the coherency layer
    /// has refreshed it.
    pub fn slice(&mut self, beam: &mut Beam) {
        for c in self.counts.iter_mut() {
            *c = 0.0;
        }
        let side = match self.context {
            Context::Host => Side::Host,
            Context::Accel => Side::Accel,
        };
        let dt = beam.dt.read(side);
        let id = &beam.id;
        if !cfg!(feature = "unchecked") {
            assert_eq!(dt.len(), id.len());
        }

        match (self.strategy, self.context) {
            (SliceStrategy::Batched, Context::Host) => {
                batched_histogram(
                    dt,
                    id,
                    &mut self.counts,
                    &self.cut_left,
                    &self.cut_right,
                    &self.bunch_index,
                    self.rf_period,
                    self.n_slices,
                );
            }
            (SliceStrategy::Batched, Context::Accel) => {
                self.counts = batched_histogram_par(
                    dt,
                    id,
                    &self.cut_left,
                    &self.cut_right,
                    &self.bunch_index,
                    self.rf_period,
                    self.n_filled_buckets,
                    self.n_slices,
                );
            }
            (SliceStrategy::PerBucket, _) => {
                for i in 0..self.n_filled_buckets {
                    single_bucket_histogram(
                        dt,
                        id,
                        &mut self.counts[i * self.n_slices..(i + 1) * self.n_slices],
                        self.cut_left[i],
                        self.cut_right[i],
                        self.rf_period,
                        self.n_slices,
                    );
                }
            }
        }
    }

    /// Discrete derivative of bucket `bunch`'s profile with respect to bin
    /// position. Returns the bin-center sequence and the derivative, both
    /// of the profile's length.
    pub fn profile_derivative(
        &self,
        bunch: usize,
        mode: DerivativeMode,
    ) -> Result<(Vec<Float>, Vec<Float>), BeamError> {
        if self.n_slices < 2 {
            return Err(BeamError::InvalidConfig(
                "profile derivative needs at least two slices".to_string(),
            ));
        }
        if self.context == Context::Accel && mode == DerivativeMode::Filter1d {
            return Err(BeamError::UnsupportedDerivativeMode(
                "filter1d (not available in the accelerator context)".to_string(),
            ));
        }
        let centers = self.bin_centers(bunch);
        let counts = self.macroparticle_count(bunch);
        let dist = centers[1] - centers[0];

        let derivative = match mode {
            DerivativeMode::Gradient => gradient(counts, dist),
            DerivativeMode::Filter1d => {
                let smoothed = binomial_smooth(counts);
                gradient(&smoothed, dist)
            }
            DerivativeMode::Diff => {
                // First differences live at the bin midpoints; interpolate
                // them back onto the bin centers so the output matches the
                // center sequence.
                let diffs: Vec<Float> = counts
                    .windows(2)
                    .map(|w| (w[1] - w[0]) / dist)
                    .collect();
                let mid: Vec<Float> = centers[..centers.len() - 1]
                    .iter()
                    .map(|&c| c + 0.5 * dist)
                    .collect();
                centers.iter().map(|&c| interp(c, &mid, &diffs)).collect()
            }
        };
        Ok((centers.to_vec(), derivative))
    }
}

/// Window membership shared by both strategies: half-open
/// `[cut_left, cut_right)`, so a particle exactly on a right edge belongs
/// to the next bucket.
#[inline(always)]
fn bin_of(x: Float, cut_left: Float, cut_right: Float, rf_period: Float, n_slices: usize) -> Option<usize> {
    if x < cut_left || x >= cut_right {
        return None;
    }
    let bin = ((x - cut_left) * n_slices as Float / rf_period) as usize;
    // float roundoff near the right edge could land one past the end
    Some(bin.min(n_slices - 1))
}

/// Resolves the bucket containing `x` the way the batched kernel does:
/// floor division, then a neighbor correction so the final membership test
/// is the exact half-open comparison `single_bucket_histogram` uses.
#[inline(always)]
fn bucket_of(x: Float, rf_period: Float) -> i64 {
    let mut k = (x / rf_period).floor() as i64;
    if x < k as Float * rf_period {
        k -= 1;
    } else if x >= (k + 1) as Float * rf_period {
        k += 1;
    }
    k
}

fn batched_histogram(
    dt: &[Float],
    id: &[i64],
    counts: &mut [Float],
    cut_left: &[Float],
    cut_right: &[Float],
    bunch_index: &[i32],
    rf_period: Float,
    n_slices: usize,
) {
    for (&x, &pid) in dt.iter().zip(id) {
        if pid == 0 {
            continue;
        }
        let k = bucket_of(x, rf_period);
        if k < 0 || k as usize >= bunch_index.len() {
            continue;
        }
        let rank = bunch_index[k as usize];
        if rank < 0 {
            continue;
        }
        let row = rank as usize;
        if let Some(bin) = bin_of(x, cut_left[row], cut_right[row], rf_period, n_slices) {
            counts[row * n_slices + bin] += 1.0;
        }
    }
}

/// Bulk-parallel variant of `batched_histogram` for the accelerator
/// context: thread-local histograms folded over chunks of the particle
/// arrays, then summed. Counts are order-independent so the result is
/// identical to the sequential kernel.
fn batched_histogram_par(
    dt: &[Float],
    id: &[i64],
    cut_left: &[Float],
    cut_right: &[Float],
    bunch_index: &[i32],
    rf_period: Float,
    n_filled: usize,
    n_slices: usize,
) -> Vec<Float> {
    dt.par_iter()
        .zip(id.par_iter())
        .fold(
            || vec![0.0; n_filled * n_slices],
            |mut local, (&x, &pid)| {
                if pid != 0 {
                    let k = bucket_of(x, rf_period);
                    if k >= 0 && (k as usize) < bunch_index.len() {
                        let rank = bunch_index[k as usize];
                        if rank >= 0 {
                            let row = rank as usize;
                            if let Some(bin) =
                                bin_of(x, cut_left[row], cut_right[row], rf_period, n_slices)
                            {
                                local[row * n_slices + bin] += 1.0;
                            }
                        }
                    }
                }
                local
            },
        )
        .reduce(
            || vec![0.0; n_filled * n_slices],
            |mut a, b| {
                for (av, bv) in a.iter_mut().zip(b) {
                    *av += bv;
                }
                a
            },
        )
}

fn single_bucket_histogram(
    dt: &[Float],
    id: &[i64],
    counts: &mut [Float],
    cut_left: Float,
    cut_right: Float,
    rf_period: Float,
    n_slices: usize,
) {
    for (&x, &pid) in dt.iter().zip(id) {
        if pid == 0 {
            continue;
        }
        if let Some(bin) = bin_of(x, cut_left, cut_right, rf_period, n_slices) {
            counts[bin] += 1.0;
        }
    }
}

/// Central differences, one-sided at both ends; same length as the input.
fn gradient(y: &[Float], dist: Float) -> Vec<Float> {
    let n = y.len();
    let mut out = vec![0.0; n];
    out[0] = (y[1] - y[0]) / dist;
    for i in 1..n - 1 {
        out[i] = (y[i + 1] - y[i - 1]) / (2.0 * dist);
    }
    out[n - 1] = (y[n - 1] - y[n - 2]) / dist;
    out
}

/// One pass of the 1-2-1 binomial smoothing kernel, edges clamped.
fn binomial_smooth(y: &[Float]) -> Vec<Float> {
    let n = y.len();
    let mut out = vec![0.0; n];
    out[0] = 0.75 * y[0] + 0.25 * y[1];
    for i in 1..n - 1 {
        out[i] = 0.25 * y[i - 1] + 0.5 * y[i] + 0.25 * y[i + 1];
    }
    out[n - 1] = 0.25 * y[n - 2] + 0.75 * y[n - 1];
    out
}

/// Linear interpolation of `(xs, ys)` at `x`, clamped to the end values.
/// `xs` must be ascending.
fn interp(x: Float, xs: &[Float], ys: &[Float]) -> Float {
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[xs.len() - 1] {
        return ys[ys.len() - 1];
    }
    let hi = xs.partition_point(|&v| v < x);
    let lo = hi - 1;
    let w = (x - xs[lo]) / (xs[hi] - xs[lo]);
    ys[lo] + w * (ys[hi] - ys[lo])
}
