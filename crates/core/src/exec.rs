// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Execution options, limits, and results for sandboxed runs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum accepted source size in bytes (100 KB).
pub const MAX_CODE_BYTES: usize = 100 * 1024;

/// Validation bounds for caller-supplied options.
pub const MIN_WALL_TIMEOUT_MS: u64 = 1_000;
pub const MAX_WALL_TIMEOUT_MS: u64 = 60_000;
pub const MAX_CPU_CORES: f64 = 4.0;
pub const MAX_PIDS: u32 = 1_024;

/// Errors from option validation at admission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionsError {
    #[error("wallTimeoutMs {0} out of range [{MIN_WALL_TIMEOUT_MS}, {MAX_WALL_TIMEOUT_MS}]")]
    Timeout(u64),
    #[error("memoryLimit {0:?} does not match ^\\d+[kmg]?$")]
    Memory(String),
    #[error("cpuLimit {0} out of range (0, {MAX_CPU_CORES}]")]
    Cpu(String),
    #[error("processCountLimit {0} out of range [1, {MAX_PIDS}]")]
    Pids(u32),
}

/// Global caps applied on top of per-request validation.
///
/// Sourced from the environment at startup; requests clamp to these
/// rather than being rejected.
#[derive(Debug, Clone)]
pub struct ExecLimits {
    pub max_wall_timeout_ms: u64,
    pub max_memory_limit_bytes: u64,
    pub max_cpu_cores: f64,
}

impl Default for ExecLimits {
    fn default() -> Self {
        Self {
            max_wall_timeout_ms: 30_000,
            max_memory_limit_bytes: 128 * 1024 * 1024,
            max_cpu_cores: 0.5,
        }
    }
}

/// Fully-populated resource profile for one sandbox run.
///
/// Always complete after admission; partial caller input is merged
/// through [`OptionsPatch::resolve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecOptions {
    /// Size string, e.g. "128m". Validated against `^\d+[kmg]?$`.
    pub memory_limit: String,
    /// Fractional cores, in (0, 4].
    pub cpu_limit: f64,
    pub wall_timeout_ms: u64,
    pub process_count_limit: u32,
    pub compiler_flags: Vec<String>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            memory_limit: "128m".to_string(),
            cpu_limit: 0.5,
            wall_timeout_ms: 30_000,
            process_count_limit: 32,
            compiler_flags: vec![
                "-std=c++17".to_string(),
                "-Wall".to_string(),
                "-Wextra".to_string(),
            ],
        }
    }
}

/// Partial options as accepted from the client. Every absent field
/// takes its default; present fields are validated and clamped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OptionsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wall_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_count_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler_flags: Option<Vec<String>>,
}

impl OptionsPatch {
    /// Merge with defaults, validate bounds, and clamp to global limits.
    pub fn resolve(self, limits: &ExecLimits) -> Result<ExecOptions, OptionsError> {
        let defaults = ExecOptions::default();

        let wall_timeout_ms = match self.wall_timeout_ms {
            Some(ms) => {
                if !(MIN_WALL_TIMEOUT_MS..=MAX_WALL_TIMEOUT_MS).contains(&ms) {
                    return Err(OptionsError::Timeout(ms));
                }
                ms
            }
            None => defaults.wall_timeout_ms,
        }
        .min(limits.max_wall_timeout_ms);

        let memory_limit = match self.memory_limit {
            Some(m) => {
                let bytes = parse_memory_limit(&m).ok_or(OptionsError::Memory(m.clone()))?;
                if bytes > limits.max_memory_limit_bytes {
                    format_memory_limit(limits.max_memory_limit_bytes)
                } else {
                    m
                }
            }
            None => defaults.memory_limit,
        };

        let cpu_limit = match self.cpu_limit {
            Some(c) => {
                if !(c > 0.0 && c <= MAX_CPU_CORES) {
                    return Err(OptionsError::Cpu(format!("{c}")));
                }
                c.min(limits.max_cpu_cores)
            }
            None => defaults.cpu_limit.min(limits.max_cpu_cores),
        };

        let process_count_limit = match self.process_count_limit {
            Some(p) => {
                if !(1..=MAX_PIDS).contains(&p) {
                    return Err(OptionsError::Pids(p));
                }
                p
            }
            None => defaults.process_count_limit,
        };

        let compiler_flags = self.compiler_flags.unwrap_or(defaults.compiler_flags);

        Ok(ExecOptions {
            memory_limit,
            cpu_limit,
            wall_timeout_ms,
            process_count_limit,
            compiler_flags,
        })
    }
}

/// Parse a size string matching `^\d+[kmg]?$` into bytes.
///
/// Returns None on anything else (empty, signs, whitespace, uppercase
/// or other units).
pub fn parse_memory_limit(s: &str) -> Option<u64> {
    if s.is_empty() {
        return None;
    }
    let (digits, unit) = match s.as_bytes().last() {
        Some(b'k') => (&s[..s.len() - 1], 1024u64),
        Some(b'm') => (&s[..s.len() - 1], 1024 * 1024),
        Some(b'g') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u64>().ok()?.checked_mul(unit)
}

/// Render a byte count back into the largest whole size unit.
fn format_memory_limit(bytes: u64) -> String {
    const G: u64 = 1024 * 1024 * 1024;
    const M: u64 = 1024 * 1024;
    const K: u64 = 1024;
    if bytes >= G && bytes % G == 0 {
        format!("{}g", bytes / G)
    } else if bytes >= M && bytes % M == 0 {
        format!("{}m", bytes / M)
    } else if bytes >= K && bytes % K == 0 {
        format!("{}k", bytes / K)
    } else {
        format!("{bytes}")
    }
}

/// Outcome of one sandbox run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
    pub timed_out: bool,
    /// Populated only on pre-run/setup failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecResult {
    /// Result for a run that never launched.
    pub fn setup_failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
