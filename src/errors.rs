//! Status and error types returned across the motion core's upward interface.

/// The result of any upward-facing motion core operation.
///
/// `Retry` is surfaced unchanged through every layer; `ZeroLengthMove` is not
/// an error in the conventional sense — the caller's input is simply dropped.
/// The two fatal variants (`BufferFullFatal`, `FailedToConverge`) abort the
/// current command; they never corrupt queue state.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Status {
    /// Operation completed.
    Ok,
    /// Downstream is full, or more work remains; call again later.
    Retry,
    /// Nothing to do (dispatcher found no running record).
    NoOp,
    /// Requested move length is below `MIN_LINE_LENGTH`; not queued.
    ZeroLengthMove,
    /// `get_write_buffer` failed after a successful `test_write` preflight.
    /// This is an invariant violation in the caller and must not happen if
    /// `aline`'s `test_write(MAX_BUFFERS_NEEDED)` contract is respected.
    BufferFullFatal,
    /// The region planner's iteration bound was hit while running in strict
    /// (`__UNFORGIVING`-equivalent) mode.
    FailedToConverge,
    /// Internal logic error; should be unreachable.
    Err,
}

impl Status {
    /// True for `Ok` and `Retry` (the two outcomes that represent forward
    /// progress rather than a dropped or aborted command).
    pub fn is_progress(self) -> bool {
        matches!(self, Status::Ok | Status::Retry)
    }

    /// True for the two fatal variants that abort the current command.
    pub fn is_fatal(self) -> bool {
        matches!(self, Status::BufferFullFatal | Status::FailedToConverge | Status::Err)
    }
}

impl core::fmt::Display for Status {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Status::Ok => "ok",
            Status::Retry => "retry",
            Status::NoOp => "no-op",
            Status::ZeroLengthMove => "zero-length move",
            Status::BufferFullFatal => "buffer pool exhausted after successful preflight",
            Status::FailedToConverge => "region planner failed to converge",
            Status::Err => "internal error",
        };
        f.write_str(s)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Status {}
