use crate::errors::BeamError;
use crate::{Float, PI};

/// The slice of the RF station program the beam container cares about:
/// the angular frequency of the accelerating waveform per turn, plus the
/// turn counter. The real frequency/phase program lives with the tracking
/// collaborators; this is only the data contract they feed us.
pub struct RfProgram {
    pub omega_rf: Vec<Float>,
    pub counter: usize,
}

impl RfProgram {
    pub fn new(omega_rf: Vec<Float>) -> Result<RfProgram, BeamError> {
        if omega_rf.is_empty() {
            return Err(BeamError::InvalidConfig(
                "RF program needs at least one turn".to_string(),
            ));
        }
        Ok(RfProgram {
            omega_rf,
            counter: 0,
        })
    }

    /// Constant-frequency program. Sparse slicing is only valid when the
    /// RF frequency does not change over the run, so this is the common
    /// constructor. Always holds at least the zeroth turn.
    pub fn constant(omega: Float, n_turns: usize) -> RfProgram {
        RfProgram {
            omega_rf: vec![omega; n_turns + 1],
            counter: 0,
        }
    }

    pub fn omega(&self) -> Float {
        self.omega_rf[self.counter]
    }

    pub fn rf_period(&self) -> Float {
        2.0 * PI / self.omega()
    }

    pub fn advance_turn(&mut self) {
        if self.counter + 1 < self.omega_rf.len() {
            self.counter += 1;
        }
    }
}
