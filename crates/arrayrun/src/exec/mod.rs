//! Lifecycle for running one external program: prepare working state,
//! execute, classify the result, post-process on success and clean up
//! unconditionally. Specializations supply behavior through
//! [`ExecutionHooks`] instead of reimplementing the sequence.

pub mod process;

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::common::error::RunError;
use crate::common::fsutils::{ensure_dir, get_current_dir};
use process::{ExecutionOutcome, run_command};

/// Where the captured output of a run is persisted.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum CaptureMode {
    /// Keep the captured output in memory only.
    Disabled,
    /// Write it to `<program>.out` in the working directory.
    #[default]
    ProgramOut,
    /// Write it to the given file name, resolved against the working
    /// directory.
    File(PathBuf),
}

/// Immutable description of one external command, in the style of
/// [`std::process::Command`]: construct with [`Invocation::new`], adjust it
/// with the chainable setters, then hand it to a [`Lifecycle`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    /// Full command line, program name first.
    args: Vec<String>,
    capture: CaptureMode,
    dir_out: Option<PathBuf>,
    tempdir: Option<PathBuf>,
    keep_tempdir: bool,
    cwd: PathBuf,
    verbose: bool,
}

impl Invocation {
    pub fn new<I, S>(args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation {
            args: args.into_iter().map(|arg| arg.into()).collect(),
            capture: CaptureMode::default(),
            dir_out: None,
            tempdir: None,
            keep_tempdir: false,
            cwd: get_current_dir(),
            verbose: true,
        }
    }

    pub fn capture(&mut self, mode: CaptureMode) -> &mut Invocation {
        self.capture = mode;
        self
    }

    /// Directory for the outputs of the program, created during preparation
    /// if missing.
    pub fn dir_out(&mut self, dir: impl Into<PathBuf>) -> &mut Invocation {
        self.dir_out = Some(dir.into());
        self
    }

    /// Directory for temporary input/output files. When unset, preparation
    /// creates a uniquely named one.
    pub fn tempdir(&mut self, dir: impl Into<PathBuf>) -> &mut Invocation {
        self.tempdir = Some(dir.into());
        self
    }

    /// Keep the temporary directory instead of removing it during cleanup.
    pub fn keep_tempdir(&mut self, keep: bool) -> &mut Invocation {
        self.keep_tempdir = keep;
        self
    }

    /// Working directory the program runs in; also anchors the capture file.
    pub fn current_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Invocation {
        self.cwd = dir.into();
        self
    }

    /// Emit progress and failure messages through the `log` facade.
    pub fn verbose(&mut self, verbose: bool) -> &mut Invocation {
        self.verbose = verbose;
        self
    }

    /// Program name, i.e. the first element of the command line.
    pub fn get_program(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or_default()
    }

    /// Full command line, program name first.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_current_dir(&self) -> &Path {
        &self.cwd
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Path of the capture file, if capture is enabled.
    pub fn capture_path(&self) -> Option<PathBuf> {
        match &self.capture {
            CaptureMode::Disabled => None,
            CaptureMode::ProgramOut => Some(self.cwd.join(format!("{}.out", self.get_program()))),
            CaptureMode::File(name) => Some(self.cwd.join(name)),
        }
    }
}

/// Mutable state of one run, handed to the hooks.
pub struct ExecContext<'a> {
    invocation: &'a Invocation,
    tempdir: Option<PathBuf>,
}

impl<'a> ExecContext<'a> {
    pub(crate) fn new(invocation: &'a Invocation) -> ExecContext<'a> {
        ExecContext {
            invocation,
            tempdir: invocation.tempdir.clone(),
        }
    }

    pub fn invocation(&self) -> &Invocation {
        self.invocation
    }

    /// The temporary directory of this run, once preparation established one.
    pub fn tempdir(&self) -> Option<&Path> {
        self.tempdir.as_deref()
    }

    /// Establishes the temporary directory: the caller-supplied path if there
    /// was one, otherwise a fresh uniquely named directory in the system
    /// temporary location. `label` becomes part of the directory prefix.
    pub fn create_tempdir(&mut self, label: &str) -> anyhow::Result<()> {
        if self.invocation.verbose {
            log::info!("Creating temporary directory...");
        }
        match &self.tempdir {
            Some(dir) => {
                ensure_dir(dir).with_context(|| {
                    format!("Cannot create temporary directory {}", dir.display())
                })?;
            }
            None => {
                let prefix = format!(
                    "{}_{}_",
                    self.invocation.get_program(),
                    label.to_lowercase()
                );
                let dir = tempfile::Builder::new()
                    .prefix(&prefix)
                    .tempdir()
                    .context("Cannot create temporary directory")?
                    .into_path();
                self.tempdir = Some(dir);
            }
        }
        Ok(())
    }

    /// Writes `text` to the capture file, if capture is enabled.
    pub fn write_capture(&self, text: &str) -> anyhow::Result<()> {
        if let Some(path) = self.invocation.capture_path() {
            std::fs::write(&path, text).with_context(|| {
                format!("Cannot write captured output into {}", path.display())
            })?;
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        let Some(dir) = self.tempdir.take() else {
            return;
        };
        if self.invocation.keep_tempdir || !dir.exists() {
            return;
        }
        if self.invocation.verbose {
            log::info!("Removing temporary directory...");
        }
        if let Err(error) = std::fs::remove_dir_all(&dir) {
            log::warn!(
                "Cannot remove temporary directory {}: {error}",
                dir.display()
            );
        }
    }
}

/// Behavior that specializes a [`Lifecycle`].
///
/// `prepare` stages input for the program, `is_failed` flags unwanted output
/// behind a successful exit code, `finish` turns the raw outcome into the
/// final result. Only `finish` is mandatory.
pub trait ExecutionHooks {
    type Output;

    /// Short label used in the temporary directory prefix.
    fn name(&self) -> &'static str {
        let type_name = std::any::type_name::<Self>();
        type_name.rsplit("::").next().unwrap_or(type_name)
    }

    /// Called before execution. The default establishes the temporary
    /// directory and the output directory; an override fully replaces that,
    /// so specializations that stage their own artifacts opt into directory
    /// handling explicitly via [`ExecContext`].
    fn prepare(&mut self, ctx: &mut ExecContext) -> anyhow::Result<()> {
        ctx.create_tempdir(self.name())?;
        if let Some(dir_out) = &ctx.invocation().dir_out {
            if !dir_out.exists() {
                if ctx.invocation().verbose {
                    log::info!("Creating output directory...");
                }
                std::fs::create_dir_all(dir_out).with_context(|| {
                    format!("Cannot create output directory {}", dir_out.display())
                })?;
            }
        }
        Ok(())
    }

    /// Domain failure check, consulted only after a zero exit code. Returns a
    /// descriptive message when the output is unacceptable despite the
    /// successful exit.
    fn is_failed(&self, _outcome: &ExecutionOutcome) -> Option<String> {
        None
    }

    /// Called after a successful run to produce the final result. Anything
    /// worth keeping must be persisted outside the temporary directory, which
    /// is about to be removed.
    fn finish(
        &mut self,
        ctx: &ExecContext,
        outcome: &ExecutionOutcome,
    ) -> anyhow::Result<Self::Output>;
}

/// Stock hooks: persist the captured output according to the capture mode and
/// hand the outcome back unchanged.
#[derive(Debug, Default)]
pub struct DefaultHooks;

impl ExecutionHooks for DefaultHooks {
    type Output = ExecutionOutcome;

    fn finish(
        &mut self,
        ctx: &ExecContext,
        outcome: &ExecutionOutcome,
    ) -> anyhow::Result<ExecutionOutcome> {
        ctx.write_capture(&outcome.output)?;
        Ok(outcome.clone())
    }
}

/// Drives one external program run through prepare, execute, classification
/// and finish/fail, with unconditional cleanup of the temporary directory.
///
/// A lifecycle is single-use: [`Lifecycle::run`] consumes it.
pub struct Lifecycle<H> {
    invocation: Invocation,
    hooks: H,
}

impl<H: ExecutionHooks> Lifecycle<H> {
    pub fn new(invocation: Invocation, hooks: H) -> Lifecycle<H> {
        Lifecycle { invocation, hooks }
    }

    /// Runs the full sequence and returns the hook-produced result.
    ///
    /// Every exit path flows through cleanup before the result is returned,
    /// so the temporary directory never outlives the run unless the
    /// invocation asked to keep it.
    pub fn run(mut self) -> crate::Result<H::Output> {
        let mut ctx = ExecContext::new(&self.invocation);
        let result = drive(&mut self.hooks, &mut ctx);
        ctx.cleanup();
        result
    }
}

fn drive<H: ExecutionHooks>(hooks: &mut H, ctx: &mut ExecContext) -> crate::Result<H::Output> {
    hooks.prepare(ctx)?;

    let invocation = ctx.invocation();
    if invocation.verbose {
        log::info!("Running command:\n$ {}", invocation.args.join(" "));
    }
    let outcome =
        run_command(&invocation.args, &invocation.cwd).map_err(|error| RunError::Launch {
            program: invocation.get_program().to_string(),
            source: error,
        })?;

    if !outcome.success() {
        return Err(fail(ctx, &outcome, None));
    }
    if let Some(message) = hooks.is_failed(&outcome) {
        return Err(fail(ctx, &outcome, Some(message)));
    }

    if invocation.verbose {
        log::info!("Command was run successfully.");
        log::info!("stdout:\n{}", outcome.output);
    }
    Ok(hooks.finish(ctx, &outcome)?)
}

/// Composes the failure report, emits/persists it, and produces the
/// classified error: the domain message when the failure predicate supplied
/// one, the non-zero exit otherwise.
fn fail(ctx: &ExecContext, outcome: &ExecutionOutcome, failed_message: Option<String>) -> RunError {
    let invocation = ctx.invocation();
    let report = format!(
        "\n{} EXECUTION FAILED.\nCommand: {}\nReturncode: {}\nstdout:\n{}",
        invocation.get_program(),
        invocation.args.join(" "),
        outcome.exit_code,
        outcome.output,
    );

    if invocation.verbose {
        log::error!("{report}");
    }
    if let Some(path) = invocation.capture_path() {
        if let Err(error) = std::fs::write(&path, &report) {
            log::warn!("Cannot write failure report into {}: {error}", path.display());
        }
    }

    match failed_message {
        Some(message) => RunError::Failed(message),
        None => RunError::NonZeroExit {
            program: invocation.get_program().to_string(),
            code: outcome.exit_code,
            output: outcome.output.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::*;

    /// Hooks that expose the temporary directory established by the default
    /// preparation, so tests can observe what cleanup did to it.
    struct TempdirProbe;

    impl ExecutionHooks for TempdirProbe {
        type Output = PathBuf;

        fn finish(
            &mut self,
            ctx: &ExecContext,
            _outcome: &ExecutionOutcome,
        ) -> anyhow::Result<PathBuf> {
            Ok(ctx.tempdir().expect("no tempdir was created").to_path_buf())
        }
    }

    fn quiet(args: &[&str]) -> Invocation {
        let mut invocation = Invocation::new(args.iter().copied());
        invocation.capture(CaptureMode::Disabled).verbose(false);
        invocation
    }

    fn create_listing_dir(sandbox: &TempDir) -> PathBuf {
        let dir = sandbox.path().join("listing");
        std::fs::create_dir(&dir).unwrap();
        for name in ["test1.txt", "test2.txt", "test3.txt"] {
            std::fs::write(dir.join(name), "").unwrap();
        }
        dir
    }

    #[test]
    fn creates_tempdir_when_unspecified() {
        let mut invocation = quiet(&["ls", "."]);
        invocation.keep_tempdir(true);

        let tempdir = Lifecycle::new(invocation, TempdirProbe).run().unwrap();
        assert!(tempdir.exists());
        let name = tempdir.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("ls_tempdirprobe_"));
        std::fs::remove_dir_all(tempdir).unwrap();
    }

    #[test]
    fn creates_specified_tempdir() {
        let sandbox = TempDir::with_prefix("arrayrun").unwrap();
        let tempdir = sandbox.path().join("work");
        assert!(!tempdir.exists());

        let mut invocation = quiet(&["ls", "."]);
        invocation.tempdir(&tempdir).keep_tempdir(true);
        Lifecycle::new(invocation, TempdirProbe).run().unwrap();

        assert!(tempdir.exists());
    }

    #[test]
    fn creates_specified_dir_out() {
        let sandbox = TempDir::with_prefix("arrayrun").unwrap();
        let dir_out = sandbox.path().join("nested").join("output");

        let mut invocation = quiet(&["ls", "."]);
        invocation.dir_out(&dir_out);
        Lifecycle::new(invocation, DefaultHooks).run().unwrap();

        assert!(dir_out.exists());
    }

    #[test]
    fn removes_tempdir_after_run() {
        let invocation = quiet(&["ls", "."]);
        let tempdir = Lifecycle::new(invocation, TempdirProbe).run().unwrap();
        assert!(!tempdir.exists());
    }

    #[test]
    fn removes_tempdir_after_failure() {
        let sandbox = TempDir::with_prefix("arrayrun").unwrap();
        let tempdir = sandbox.path().join("work");

        let mut invocation = quiet(&["sh", "-c", "exit 1"]);
        invocation.tempdir(&tempdir);
        let error = Lifecycle::new(invocation, DefaultHooks).run().unwrap_err();

        assert!(matches!(error, RunError::NonZeroExit { .. }));
        assert!(!tempdir.exists());
    }

    #[test]
    fn invalid_program_is_a_launch_error() {
        let invocation = quiet(&["arrayrun-no-such-program", "."]);
        let error = Lifecycle::new(invocation, DefaultHooks).run().unwrap_err();
        match error {
            RunError::Launch { program, .. } => assert_eq!(program, "arrayrun-no-such-program"),
            other => panic!("expected a launch error, got {other:?}"),
        }
    }

    #[test]
    fn nonzero_exit_carries_code_and_output() {
        let invocation = quiet(&["sh", "-c", "echo broken; exit 3"]);
        let error = Lifecycle::new(invocation, DefaultHooks).run().unwrap_err();
        match error {
            RunError::NonZeroExit {
                program,
                code,
                output,
            } => {
                assert_eq!(program, "sh");
                assert_eq!(code, 3);
                assert_eq!(output, "broken\n");
            }
            other => panic!("expected an exit error, got {other:?}"),
        }
    }

    #[test]
    fn domain_failure_carries_the_predicate_message() {
        struct RejectEverything;

        impl ExecutionHooks for RejectEverything {
            type Output = ();

            fn is_failed(&self, _outcome: &ExecutionOutcome) -> Option<String> {
                Some("The output is not as expected".to_string())
            }

            fn finish(
                &mut self,
                _ctx: &ExecContext,
                _outcome: &ExecutionOutcome,
            ) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let invocation = quiet(&["ls", "."]);
        let error = Lifecycle::new(invocation, RejectEverything).run().unwrap_err();
        match error {
            RunError::Failed(message) => assert_eq!(message, "The output is not as expected"),
            other => panic!("expected a domain failure, got {other:?}"),
        }
    }

    #[test]
    fn listing_output_lands_in_the_outcome() {
        let sandbox = TempDir::with_prefix("arrayrun").unwrap();
        let dir = create_listing_dir(&sandbox);

        let mut invocation = quiet(&["ls", "."]);
        invocation.current_dir(&dir);
        let outcome = Lifecycle::new(invocation, DefaultHooks).run().unwrap();

        assert_eq!(outcome.args, vec!["ls".to_string(), ".".to_string()]);
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.output, "test1.txt\ntest2.txt\ntest3.txt\n");
    }

    #[test]
    fn capture_file_holds_the_program_output() {
        let sandbox = TempDir::with_prefix("arrayrun").unwrap();
        let dir = create_listing_dir(&sandbox);

        let mut invocation = Invocation::new(["ls", "."]);
        invocation.current_dir(&dir).verbose(false);
        Lifecycle::new(invocation, DefaultHooks).run().unwrap();

        let captured = std::fs::read_to_string(dir.join("ls.out")).unwrap();
        assert_eq!(captured, "test1.txt\ntest2.txt\ntest3.txt\n");
    }

    #[test]
    fn named_capture_file_is_respected() {
        let sandbox = TempDir::with_prefix("arrayrun").unwrap();
        let dir = create_listing_dir(&sandbox);

        let mut invocation = Invocation::new(["ls", "."]);
        invocation
            .current_dir(&dir)
            .capture(CaptureMode::File("listing.txt".into()))
            .verbose(false);
        Lifecycle::new(invocation, DefaultHooks).run().unwrap();

        let captured = std::fs::read_to_string(dir.join("listing.txt")).unwrap();
        assert_eq!(captured, "test1.txt\ntest2.txt\ntest3.txt\n");
    }

    #[test]
    fn failure_report_replaces_the_captured_output() {
        let sandbox = TempDir::with_prefix("arrayrun").unwrap();

        let mut invocation = Invocation::new(["sh", "-c", "echo broken; exit 1"]);
        invocation.current_dir(sandbox.path()).verbose(false);
        let _ = Lifecycle::new(invocation, DefaultHooks).run().unwrap_err();

        let report = std::fs::read_to_string(sandbox.path().join("sh.out")).unwrap();
        assert!(report.contains("sh EXECUTION FAILED."));
        assert!(report.contains("Returncode: 1"));
        assert!(report.contains("broken"));
    }
}
