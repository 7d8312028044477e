//! Run verdicts.
//!
//! A run terminates with exactly one [`TestResult`]. The numeric codes only
//! exist for the legacy exit-code mapping; nothing orders or compares
//! verdicts by them.

use std::fmt;
use std::str::FromStr;

/// Closed set of terminal run outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestResult {
    /// Test reported success.
    Success,
    /// Test reported failure.
    Failure,
    /// Test reported an internal error.
    Error,
    /// Bare `end` marker without a verdict.
    End,
    /// Run ended without any verdict being produced.
    Undefined,
    /// A bounded wait was exceeded.
    Timeout,
    /// Flashing the image failed.
    IoerrCopy,
    /// Mount point never became ready.
    IoerrDisk,
    /// Serial/transport channel failed or was lost.
    IoerrSerial,
    /// No image file to flash.
    NoImage,
    /// Device endpoint could not be determined.
    NotDetected,
    /// DUT hit an assertion.
    AssertFailure,
    /// Run-only mode; output streamed without supervision.
    Passive,
    /// The image was never built.
    BuildFailed,
    /// The DUT never acknowledged the sync handshake.
    SyncFailed,
}

impl TestResult {
    /// Every verdict, in legacy numeric order.
    pub const ALL: &'static [TestResult] = &[
        TestResult::Success,
        TestResult::Failure,
        TestResult::Error,
        TestResult::End,
        TestResult::Undefined,
        TestResult::Timeout,
        TestResult::IoerrCopy,
        TestResult::IoerrDisk,
        TestResult::IoerrSerial,
        TestResult::NoImage,
        TestResult::NotDetected,
        TestResult::AssertFailure,
        TestResult::Passive,
        TestResult::BuildFailed,
        TestResult::SyncFailed,
    ];

    /// Canonical lowercase wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TestResult::Success => "success",
            TestResult::Failure => "failure",
            TestResult::Error => "error",
            TestResult::End => "end",
            TestResult::Undefined => "undefined",
            TestResult::Timeout => "timeout",
            TestResult::IoerrCopy => "ioerr_copy",
            TestResult::IoerrDisk => "ioerr_disk",
            TestResult::IoerrSerial => "ioerr_serial",
            TestResult::NoImage => "no_image",
            TestResult::NotDetected => "not_detected",
            TestResult::AssertFailure => "assert_failure",
            TestResult::Passive => "passive",
            TestResult::BuildFailed => "build_failed",
            TestResult::SyncFailed => "sync_failed",
        }
    }

    /// Position in the legacy numeric mapping.
    ///
    /// Significant only for reporting compatibility; never used for
    /// ordering logic.
    pub fn legacy_code(&self) -> i32 {
        Self::ALL.iter().position(|r| r == self).unwrap_or(0) as i32
    }

    /// Whether this verdict means the run passed.
    pub fn is_success(&self) -> bool {
        matches!(self, TestResult::Success)
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestResult {
    type Err = UnknownResult;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownResult(s.to_string()))
    }
}

/// Error for verdict strings outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown test result: {0:?}")]
pub struct UnknownResult(pub String);
