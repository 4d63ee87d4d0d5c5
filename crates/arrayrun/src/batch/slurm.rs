//! Submission of a planned job array to Slurm via `sbatch`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::batch::BatchPlan;
use crate::common::fsutils::ensure_dir;
use crate::exec::process::ExecutionOutcome;
use crate::exec::{ExecContext, ExecutionHooks, Invocation, Lifecycle};

/// Name of the script that will be submitted to Slurm.
const SUBMIT_SCRIPT_NAME: &str = "submit.sh";

/// Default cap on the number of array slots requested from the scheduler.
pub const DEFAULT_MAX_SLOTS: u32 = 1990;

/// Resource requests and body of one job array submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitParams {
    /// Name of the job as it shows up in the scheduler queue.
    pub job_name: String,
    pub partition: String,
    pub ntasks: u32,
    pub cpus_per_task: u32,
    /// Memory per CPU to request, in gigabytes.
    pub mem_per_cpu_gb: u32,
    /// Per-job logic placed below the scheduler directives. The default is a
    /// placeholder; real submissions supply their own commands, typically
    /// keyed on the scheduler's array index variable.
    pub body: String,
}

impl Default for SubmitParams {
    fn default() -> SubmitParams {
        SubmitParams {
            job_name: "arrayrun".to_string(),
            partition: "batch".to_string(),
            ntasks: 1,
            cpus_per_task: 1,
            mem_per_cpu_gb: 2,
            body: "echo 'Hello world!'".to_string(),
        }
    }
}

/// Submits a job array sized by a [`BatchPlan`]: preparation renders the
/// submission script into the log directory, the lifecycle runs
/// `sbatch <script>`, and the finish hook scrapes the job id out of the
/// scheduler's reply.
pub struct JobArraySubmitter {
    params: SubmitParams,
    plan: BatchPlan,
    log_dir: PathBuf,
    script_path: PathBuf,
}

impl JobArraySubmitter {
    /// Plans a job array for `total_items` work items, each estimated to take
    /// `time_per_item`, bounded by [`DEFAULT_MAX_SLOTS`] concurrent slots.
    /// Scheduler logs and the rendered script live under `log_dir`.
    pub fn new(
        time_per_item: Duration,
        total_items: u32,
        log_dir: impl Into<PathBuf>,
        params: SubmitParams,
    ) -> JobArraySubmitter {
        JobArraySubmitter::with_max_slots(
            time_per_item,
            total_items,
            DEFAULT_MAX_SLOTS,
            log_dir,
            params,
        )
    }

    pub fn with_max_slots(
        time_per_item: Duration,
        total_items: u32,
        max_slots: u32,
        log_dir: impl Into<PathBuf>,
        params: SubmitParams,
    ) -> JobArraySubmitter {
        let log_dir = log_dir.into();
        let plan = BatchPlan::new(total_items, max_slots, time_per_item);
        let script_path = log_dir.join(SUBMIT_SCRIPT_NAME);
        JobArraySubmitter {
            params,
            plan,
            log_dir,
            script_path,
        }
    }

    pub fn plan(&self) -> &BatchPlan {
        &self.plan
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    /// The `sbatch` command line this submitter will run. Adjust the returned
    /// invocation and pass it to [`Lifecycle::new`] directly to control
    /// capture or verbosity.
    pub fn invocation(&self) -> Invocation {
        Invocation::new([
            "sbatch".to_string(),
            self.script_path.display().to_string(),
        ])
    }

    /// Renders and submits the job array; returns the scheduler's job id.
    pub fn submit(self) -> crate::Result<String> {
        let invocation = self.invocation();
        Lifecycle::new(invocation, self).run()
    }
}

impl ExecutionHooks for JobArraySubmitter {
    type Output = String;

    fn prepare(&mut self, ctx: &mut ExecContext) -> anyhow::Result<()> {
        ensure_dir(&self.log_dir)
            .with_context(|| format!("Cannot create log directory {}", self.log_dir.display()))?;

        let script = build_submit_script(&self.plan, &self.params, &self.log_dir);
        if ctx.invocation().is_verbose() {
            log::info!("Script to be submitted:\n{script}");
        }
        std::fs::write(&self.script_path, script).with_context(|| {
            format!(
                "Cannot write submission script into {}",
                self.script_path.display()
            )
        })?;
        Ok(())
    }

    fn finish(&mut self, _ctx: &ExecContext, outcome: &ExecutionOutcome) -> anyhow::Result<String> {
        parse_job_id(&outcome.output)
    }
}

/// Renders the submission script: the `#SBATCH` directive header, a blank
/// line, then the body.
fn build_submit_script(plan: &BatchPlan, params: &SubmitParams, log_dir: &Path) -> String {
    format!(
        r##"#!/bin/bash
#SBATCH --job-name={name}
#SBATCH --partition={partition}
#SBATCH --output={log_dir}/%J.out
#SBATCH --time={time}
#SBATCH --ntasks={ntasks}
#SBATCH --cpus-per-task={cpus}
#SBATCH --mem-per-cpu={mem}G
#SBATCH --array={array}

{body}
"##,
        name = params.job_name,
        partition = params.partition,
        log_dir = log_dir.display(),
        time = plan.slot_time(),
        ntasks = params.ntasks,
        cpus = params.cpus_per_task,
        mem = params.mem_per_cpu_gb,
        array = plan.array_range(),
        body = params.body,
    )
}

/// Extracts the job id from the scheduler's submission reply: the first
/// contiguous run of decimal digits.
pub fn parse_job_id(reply: &str) -> anyhow::Result<String> {
    let digits: String = reply
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        anyhow::bail!("Missing job id in sbatch output\n{reply}");
    }
    Ok(digits)
}
