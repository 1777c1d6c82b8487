use num_traits::Zero;

/// One of the two memory locations that may hold the authoritative copy
/// of an array.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Side {
    Host,
    Accel,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Host => Side::Accel,
            Side::Accel => Side::Host,
        }
    }
}

/// A logical array mirrored between a host buffer and an accelerator
/// buffer, with lazy pull-based synchronization.
///
/// At any instant at least one side is fresh. A read on a stale side
/// copies from the fresh side first (counted in `transfers`); a write
/// through one side marks the other side stale without copying anything.
/// Several writes on the same side before a cross-side read therefore
/// cost exactly one transfer, not one per write.
///
/// The host buffer exists from construction; the accelerator mirror is
/// allocated on the first accelerator-side access.
pub struct CoherentArray<T> {
    host: Vec<T>,
    accel: Option<Vec<T>>,
    host_valid: bool,
    accel_valid: bool,
    transfers: u64,
}

impl<T: Copy + Zero> CoherentArray<T> {
    pub fn zeros(n: usize) -> CoherentArray<T> {
        CoherentArray {
            host: vec![T::zero(); n],
            accel: None,
            host_valid: true,
            accel_valid: false,
            transfers: 0,
        }
    }

    pub fn from_vec(data: Vec<T>) -> CoherentArray<T> {
        CoherentArray {
            host: data,
            accel: None,
            host_valid: true,
            accel_valid: false,
            transfers: 0,
        }
    }

    /// Logical length. The host buffer always carries the current length,
    /// even while it is stale (stale only means its *contents* are old;
    /// resizing happens exclusively through host-side reallocation).
    pub fn len(&self) -> usize {
        self.host.len()
    }

    pub fn is_empty(&self) -> bool {
        self.host.is_empty()
    }

    /// Number of actual cross-memory copies performed so far. Diagnostic
    /// only, no functional role.
    pub fn transfers(&self) -> u64 {
        self.transfers
    }

    fn validate_host(&mut self) {
        if !self.host_valid {
            if !cfg!(feature = "unchecked") {
                assert!(self.accel_valid, "both sides stale, coherency broken");
            }
            let accel = self.accel.as_ref().expect("stale host with no accel buffer");
            self.host.copy_from_slice(accel);
            self.host_valid = true;
            self.transfers += 1;
        }
    }

    fn validate_accel(&mut self) {
        if !self.accel_valid {
            if !cfg!(feature = "unchecked") {
                assert!(self.host_valid, "both sides stale, coherency broken");
            }
            match self.accel {
                Some(ref mut accel) if accel.len() == self.host.len() => {
                    accel.copy_from_slice(&self.host);
                }
                _ => {
                    self.accel = Some(self.host.clone());
                }
            }
            self.accel_valid = true;
            self.transfers += 1;
        }
    }

    /// Read-only view through `side`, refreshing it first if stale.
    pub fn read(&mut self, side: Side) -> &[T] {
        match side {
            Side::Host => {
                self.validate_host();
                &self.host
            }
            Side::Accel => {
                self.validate_accel();
                self.accel.as_ref().expect("accel buffer exists after validation")
            }
        }
    }

    /// Mutable view through `side`: refresh it, then mark the other side
    /// stale since the caller is about to overwrite in place.
    pub fn read_mut(&mut self, side: Side) -> &mut [T] {
        match side {
            Side::Host => {
                self.validate_host();
                self.accel_valid = false;
                &mut self.host
            }
            Side::Accel => {
                self.validate_accel();
                self.host_valid = false;
                self.accel.as_mut().expect("accel buffer exists after validation")
            }
        }
    }

    /// Replace `side`'s buffer wholesale. No copy is performed; the other
    /// side only becomes consistent again on its next read.
    ///
    /// Host-side writes are the one place where the logical length may
    /// change; a stale accelerator mirror of the wrong size is dropped and
    /// reallocated lazily. Accelerator-side writes must keep the length.
    pub fn write(&mut self, side: Side, data: Vec<T>) {
        match side {
            Side::Host => {
                if self
                    .accel
                    .as_ref()
                    .map(|a| a.len() != data.len())
                    .unwrap_or(false)
                {
                    self.accel = None;
                }
                self.host = data;
                self.host_valid = true;
                self.accel_valid = false;
            }
            Side::Accel => {
                if !cfg!(feature = "unchecked") {
                    assert_eq!(
                        data.len(),
                        self.host.len(),
                        "accelerator-side write may not resize the array"
                    );
                }
                self.accel = Some(data);
                self.accel_valid = true;
                self.host_valid = false;
            }
        }
    }

    /// Append through the host side (explicit reallocation, the only way
    /// the array grows). The accelerator mirror is invalidated and will be
    /// resized on its next access.
    pub fn append(&mut self, tail: &[T]) {
        self.validate_host();
        self.host.extend_from_slice(tail);
        self.accel = None;
        self.accel_valid = false;
    }
}
