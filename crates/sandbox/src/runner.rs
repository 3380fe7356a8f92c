// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Docker sandbox runner.
//!
//! Each run gets a fresh container confined on every axis at once: no
//! network, read-only root, all capabilities dropped, no privilege
//! escalation, unprivileged uid, and hard caps on memory, CPU share,
//! pids, and wall time. The submitted source is bind-mounted read-only
//! at `/src`; compile output lands on a small tmpfs scratch. Teardown
//! runs on every exit path.

use async_trait::async_trait;
use duet_core::{ExecOptions, ExecResult, JobId};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;

/// Marker line the in-container script appends with the cgroup memory
/// high-water mark. Parsed off the end of stdout, best-effort.
const MEM_MARKER: &str = "__DUET_MEM__";

/// Size of the tmpfs scratch for build artefacts.
const SCRATCH_SIZE: &str = "10m";

/// Cap on captured stdout/stderr, each. Runaway program output beyond
/// this is dropped, not stored.
const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

/// Runs one submission in an isolated sandbox. Every run is
/// independent; no state survives between runs.
#[async_trait]
pub trait SandboxRunner: Send + Sync + 'static {
    /// Compile and execute `code` under `options`. Never errors: setup
    /// failures come back as a result with `error` populated.
    async fn run(&self, job_id: &JobId, code: &str, options: &ExecOptions) -> ExecResult;

    /// Force-stop the sandbox for a job, if one is live.
    async fn kill(&self, job_id: &JobId);
}

/// Docker CLI sandbox runner.
#[derive(Clone)]
pub struct DockerRunner {
    image: String,
    /// Host directory that holds per-run workspaces.
    workspace_root: PathBuf,
}

impl DockerRunner {
    pub fn new(image: impl Into<String>, workspace_root: impl Into<PathBuf>) -> Self {
        Self { image: image.into(), workspace_root: workspace_root.into() }
    }

    fn container_name(job_id: &JobId) -> String {
        format!("duet-sbx-{}", job_id.suffix())
    }

    /// Compile-then-execute as a single in-container command.
    ///
    /// The compiler's exit code propagates when compilation fails; the
    /// program's exit code otherwise. The memory marker is emitted on
    /// its own stdout line after a forced newline so it never glues to
    /// program output.
    fn build_script(options: &ExecOptions) -> String {
        let flags = options.compiler_flags.join(" ");
        format!(
            "g++ {flags} /src/main.cpp -o /tmp/a.out && /tmp/a.out\n\
             rc=$?\n\
             echo\n\
             echo \"{MEM_MARKER}$(cat /sys/fs/cgroup/memory.peak 2>/dev/null \
             || cat /sys/fs/cgroup/memory/memory.max_usage_in_bytes 2>/dev/null \
             || echo -1)\"\n\
             exit $rc"
        )
    }

    async fn run_inner(&self, job_id: &JobId, code: &str, options: &ExecOptions) -> ExecResult {
        let workspace = self.workspace_root.join(format!("sbx-{}", job_id.suffix()));
        if let Err(e) = prepare_workspace(&workspace, code).await {
            return ExecResult::setup_failure(format!("workspace setup failed: {e}"));
        }

        let name = Self::container_name(job_id);
        let src_mount = format!("{}:/src:ro", workspace.display());
        let scratch = format!("/tmp:rw,nosuid,size={SCRATCH_SIZE}");
        let memory = &options.memory_limit;
        let cpus = format!("{}", options.cpu_limit);
        let pids = format!("{}", options.process_count_limit);
        let script = Self::build_script(options);

        let args: Vec<&str> = vec![
            "run",
            "--rm",
            "--name",
            &name,
            "--network",
            "none",
            "--read-only",
            "--cap-drop",
            "ALL",
            "--security-opt",
            "no-new-privileges",
            "--user",
            "65534:65534",
            "--memory",
            memory,
            "--memory-swap",
            memory,
            "--cpus",
            &cpus,
            "--pids-limit",
            &pids,
            "--tmpfs",
            &scratch,
            "-v",
            &src_mount,
            "-w",
            "/tmp",
            &self.image,
            "sh",
            "-c",
            &script,
        ];

        tracing::info!(
            job_id = %job_id,
            container = %name,
            wall_timeout_ms = options.wall_timeout_ms,
            memory = %memory,
            "launching sandbox"
        );

        let start = Instant::now();
        let wall = Duration::from_millis(options.wall_timeout_ms);
        let output = tokio::time::timeout(
            wall,
            tokio::process::Command::new("docker").args(&args).output(),
        )
        .await;

        let result = match output {
            Err(_elapsed) => {
                // Watchdog fired: hard-kill the container.
                tracing::warn!(job_id = %job_id, container = %name, "wall timeout, killing sandbox");
                let _ = run_docker(&["kill", &name]).await;
                ExecResult {
                    success: false,
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: None,
                    execution_time_ms: start.elapsed().as_millis() as u64,
                    memory_bytes: None,
                    timed_out: true,
                    error: None,
                }
            }
            Ok(Err(e)) => ExecResult::setup_failure(format!("failed to exec docker: {e}")),
            Ok(Ok(output)) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                let (stdout, memory_bytes) =
                    split_memory_marker(&String::from_utf8_lossy(&output.stdout));
                let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
                let exit_code = output.status.code();
                ExecResult {
                    success: output.status.success(),
                    stdout: truncate_capture(stdout),
                    stderr: truncate_capture(stderr),
                    exit_code,
                    execution_time_ms: elapsed_ms,
                    memory_bytes,
                    timed_out: false,
                    error: None,
                }
            }
        };

        // Unconditional teardown. `--rm` usually handles the container;
        // force-remove covers kill races and daemon hiccups.
        let _ = run_docker(&["rm", "-f", &name]).await;
        if let Err(e) = tokio::fs::remove_dir_all(&workspace).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(job_id = %job_id, error = %e, "workspace cleanup failed");
            }
        }

        result
    }
}

#[async_trait]
impl SandboxRunner for DockerRunner {
    async fn run(&self, job_id: &JobId, code: &str, options: &ExecOptions) -> ExecResult {
        let start = Instant::now();
        let result = self.run_inner(job_id, code, options).await;
        tracing::info!(
            job_id = %job_id,
            success = result.success,
            timed_out = result.timed_out,
            exit_code = ?result.exit_code,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "sandbox finished"
        );
        result
    }

    async fn kill(&self, job_id: &JobId) {
        let name = Self::container_name(job_id);
        tracing::info!(job_id = %job_id, container = %name, "force-stopping sandbox");
        let _ = run_docker(&["rm", "-f", &name]).await;
        let workspace = self.workspace_root.join(format!("sbx-{}", job_id.suffix()));
        let _ = tokio::fs::remove_dir_all(&workspace).await;
    }
}

/// Materialize the source into a uniquely named workspace on the host.
async fn prepare_workspace(workspace: &std::path::Path, code: &str) -> std::io::Result<()> {
    tokio::fs::create_dir_all(workspace).await?;
    let mut file = tokio::fs::File::create(workspace.join("main.cpp")).await?;
    file.write_all(code.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// Cap a captured stream at [`MAX_CAPTURE_BYTES`], cutting on a char
/// boundary.
fn truncate_capture(mut s: String) -> String {
    if s.len() > MAX_CAPTURE_BYTES {
        let mut end = MAX_CAPTURE_BYTES;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
    s
}

/// Split the memory marker off the end of stdout.
///
/// Returns the program's stdout (trailing whitespace trimmed) and the
/// parsed high-water mark. `-1` (cgroup file unavailable) maps to None.
fn split_memory_marker(raw: &str) -> (String, Option<u64>) {
    match raw.rfind(MEM_MARKER) {
        Some(pos) => {
            let value = raw[pos + MEM_MARKER.len()..].trim();
            let stdout = raw[..pos].trim_end().to_string();
            (stdout, value.parse::<u64>().ok())
        }
        None => (raw.trim_end().to_string(), None),
    }
}

/// Run a docker CLI command and return stdout on success.
pub(crate) async fn run_docker(args: &[&str]) -> Result<String, String> {
    let output = tokio::process::Command::new("docker")
        .args(args)
        .output()
        .await
        .map_err(|e| format!("failed to exec docker: {}", e))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!("docker {} failed: {}", args.first().unwrap_or(&""), stderr.trim()))
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
