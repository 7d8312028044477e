//! Captured-output collection.
//!
//! After a run, the recorded console text is mined for the verdict
//! marker, per-testcase results, memory metrics and coverage payload
//! blocks. Everything here is pure string work over the capture; a
//! malformed line is skipped, never an error.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, warn};

use crate::protocol::{
    Frame, KEY_COVERAGE_START, KEY_TESTCASE_FINISH, KEY_TESTCASE_SUMMARY, dump_payload,
    unpack_hex_payload,
};
use crate::verdict::TestResult;

/// Result of one DUT-side test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCaseResult {
    pub name: String,
    pub passed: u32,
    pub failed: u32,
}

/// The DUT's own pass/fail totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TestCaseSummary {
    pub passes: u32,
    pub failures: u32,
}

/// Stack usage of one reported thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadStackInfo {
    pub id: String,
    pub entry_stack_size: u64,
    pub max_stack_size: u64,
}

/// Heap and stack figures reported by the DUT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryMetrics {
    pub max_heap: Option<u64>,
    pub reserved_heap: Option<u64>,
    pub thread_stack_info: Vec<ThreadStackInfo>,
}

impl MemoryMetrics {
    /// Combined worst-case stack usage over all reported threads.
    pub fn total_max_stack(&self) -> u64 {
        self.thread_stack_info
            .iter()
            .map(|t| t.max_stack_size)
            .sum()
    }
}

/// Find the first verdict marker `{{<result>}}` in the capture.
///
/// Absent marker means the run produced no verdict: [`TestResult::Timeout`].
pub fn get_test_result(output: &str) -> TestResult {
    for line in output.lines() {
        let mut rest = line;
        while let Some(start) = rest.find("{{") {
            let after = &rest[start + 2..];
            if let Some(end) = after.find("}}")
                && let Ok(result) = after[..end].parse::<TestResult>()
            {
                return result;
            }
            rest = &rest[start + 2..];
        }
    }
    TestResult::Timeout
}

/// Per-testcase results from `__testcase_finish` frames.
///
/// Frame value is `name;passed;failed`; a later result for the same name
/// overwrites the earlier one.
pub fn get_testcase_results(output: &str) -> Vec<TestCaseResult> {
    let mut results: BTreeMap<String, TestCaseResult> = BTreeMap::new();
    for frame in frames_in(output) {
        if frame.key != KEY_TESTCASE_FINISH {
            continue;
        }
        let mut parts = frame.value.split(';');
        let (Some(name), Some(passed), Some(failed)) =
            (parts.next(), parts.next(), parts.next())
        else {
            warn!(value = %frame.value, "malformed testcase finish frame");
            continue;
        };
        let (Ok(passed), Ok(failed)) = (passed.parse(), failed.parse()) else {
            warn!(value = %frame.value, "non-numeric testcase counters");
            continue;
        };
        results.insert(
            name.to_string(),
            TestCaseResult {
                name: name.to_string(),
                passed,
                failed,
            },
        );
    }
    results.into_values().collect()
}

/// Overall summary from the `__testcase_summary` frame (`passes;failures`).
pub fn get_testcase_summary(output: &str) -> Option<TestCaseSummary> {
    for frame in frames_in(output) {
        if frame.key != KEY_TESTCASE_SUMMARY {
            continue;
        }
        let mut parts = frame.value.split(';');
        if let (Some(passes), Some(failures)) = (parts.next(), parts.next())
            && let (Ok(passes), Ok(failures)) = (passes.parse(), failures.parse())
        {
            return Some(TestCaseSummary { passes, failures });
        }
    }
    None
}

/// Heap and thread-stack metrics from `max_heap_usage`, `reserved_heap`
/// and `__thread_info` frames.
pub fn get_memory_metrics(output: &str) -> MemoryMetrics {
    let mut metrics = MemoryMetrics::default();
    for frame in frames_in(output) {
        match frame.key.as_str() {
            "max_heap_usage" => metrics.max_heap = frame.value.parse().ok(),
            "reserved_heap" => metrics.reserved_heap = frame.value.parse().ok(),
            "__thread_info" => {
                // Value is `"<id>";<entry_stack_size>;<max_stack_size>`.
                let mut parts = frame.value.split(';');
                if let (Some(id), Some(entry), Some(max)) =
                    (parts.next(), parts.next(), parts.next())
                    && let (Ok(entry), Ok(max)) = (entry.parse(), max.parse())
                {
                    metrics.thread_stack_info.push(ThreadStackInfo {
                        id: id.trim_matches('"').to_string(),
                        entry_stack_size: entry,
                        max_stack_size: max,
                    });
                }
            }
            _ => {}
        }
    }
    metrics
}

/// Extract coverage payload blocks and persist them under `build_path`.
///
/// Each block is a `__coverage_start` frame whose value is
/// `<path>;<hex payload>`. Returns the number of files written; decode
/// and I/O failures are logged and skipped.
pub fn get_coverage_data(build_path: &Path, output: &str) -> usize {
    let mut written = 0;
    for frame in frames_in(output) {
        if frame.key != KEY_COVERAGE_START {
            continue;
        }
        let Some((path, payload)) = frame.value.split_once(';') else {
            warn!(value = %frame.value, "malformed coverage frame");
            continue;
        };
        match unpack_hex_payload(payload) {
            Ok(bytes) => {
                if dump_payload(build_path, Path::new(path), &bytes) {
                    info!(bytes = bytes.len(), path = %path, "coverage payload dumped");
                    written += 1;
                }
            }
            Err(e) => warn!(path = %path, error = %e, "coverage payload decode failed"),
        }
    }
    written
}

fn frames_in(output: &str) -> impl Iterator<Item = Frame> + '_ {
    output.lines().filter_map(Frame::decode)
}
