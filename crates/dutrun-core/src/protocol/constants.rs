//! Key-value protocol constants.
//!
//! The DUT and the host exchange ASCII lines of the form `{{key;value}}`.
//! Keys starting with [`RESERVED_PREFIX`] belong to the protocol itself and
//! cannot be claimed by host tests without forced registration.

/// Default serial console baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Prefix marking a key as reserved for internal control frames.
pub const RESERVED_PREFIX: &str = "__";

// ============================================================================
// Control keys (host <-> DUT and host-internal)
// ============================================================================

/// Handshake frame, repeated until the DUT echoes it back.
pub const KEY_SYNC: &str = "__sync";
/// DUT announces the host test it expects to run against.
pub const KEY_HOST_TEST_NAME: &str = "__host_test_name";
/// DUT announces its expected test duration in seconds.
pub const KEY_TIMEOUT: &str = "__timeout";
/// DUT reports its client protocol version.
pub const KEY_VERSION: &str = "__version";
/// Coverage payload frame: `{{__coverage_start;<path>;<hex payload>}}`.
pub const KEY_COVERAGE_START: &str = "__coverage_start";
/// Test case markers emitted by the DUT-side test harness.
pub const KEY_TESTCASE_START: &str = "__testcase_start";
pub const KEY_TESTCASE_FINISH: &str = "__testcase_finish";
pub const KEY_TESTCASE_COUNT: &str = "__testcase_count";
pub const KEY_TESTCASE_NAME: &str = "__testcase_name";
pub const KEY_TESTCASE_SUMMARY: &str = "__testcase_summary";
/// Raw received line, consumed by default so shared-channel noise is silent.
pub const KEY_RXD_LINE: &str = "__rxd_line";
/// DUT requests the supervised run to end with the given exit code.
pub const KEY_EXIT: &str = "__exit";
/// Internal: unwind the event loop itself.
pub const KEY_EXIT_EVENT_QUEUE: &str = "__exit_event_queue";

/// Keys that ordinary registration may never overwrite.
pub const RESTRICTED_CALLBACKS: &[&str] = &[
    KEY_COVERAGE_START,
    KEY_TESTCASE_START,
    KEY_TESTCASE_FINISH,
    KEY_TESTCASE_SUMMARY,
    KEY_EXIT,
    KEY_EXIT_EVENT_QUEUE,
];

/// Keys pre-wired to a no-op handler so unhandled control frames don't error.
pub const CONSUMED_BY_DEFAULT: &[&str] = &[
    KEY_COVERAGE_START,
    KEY_TESTCASE_START,
    KEY_TESTCASE_FINISH,
    KEY_TESTCASE_COUNT,
    KEY_TESTCASE_NAME,
    KEY_TESTCASE_SUMMARY,
    KEY_RXD_LINE,
];

/// The verdict key; carries `success` on a passing run.
pub const KEY_END: &str = "end";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restricted_keys_are_reserved() {
        for key in RESTRICTED_CALLBACKS {
            assert!(key.starts_with(RESERVED_PREFIX));
        }
    }

    #[test]
    fn end_is_not_reserved() {
        assert!(!KEY_END.starts_with(RESERVED_PREFIX));
    }
}
