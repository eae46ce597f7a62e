#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// The run finished but the result is failed (iteration failures, errors,
    /// or drops when drops are not ignored).
    RunFailed = 10,

    /// Invalid CLI/config input (bad flags, invalid rates or stage files,
    /// unknown scenario).
    InvalidInput = 30,

    /// Internal error (IO failures, unexpected invariants).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
