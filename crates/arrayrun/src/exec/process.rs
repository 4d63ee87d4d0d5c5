use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use bstr::ByteSlice;

/// Result of one finished process run.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// The exact command line that was executed, program first.
    pub args: Vec<String>,
    /// Exit code of the child, or -1 if it was terminated by a signal.
    pub exit_code: i32,
    /// Combined stdout/stderr of the child, in write order.
    pub output: String,
    /// Wall-clock time between spawn and termination.
    pub duration: Duration,
}

impl ExecutionOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs `args` in `cwd` and blocks until the child terminates.
///
/// Stdout and stderr are redirected into a single pipe, so the captured text
/// preserves the interleaving the child actually produced.
pub fn run_command(args: &[String], cwd: &Path) -> std::io::Result<ExecutionOutcome> {
    let Some(program) = args.first() else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "empty command line",
        ));
    };

    let start = Instant::now();
    let (mut reader, writer) = std::io::pipe()?;
    let stderr_writer = writer.try_clone()?;
    let mut child = Command::new(program)
        .args(&args[1..])
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(writer)
        .stderr(stderr_writer)
        .spawn()?;

    // The temporary `Command` above dropped the parent's copies of the write
    // ends; reading would otherwise never reach EOF.
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw)?;
    let status = child.wait()?;

    Ok(ExecutionOutcome {
        args: args.to_vec(),
        exit_code: status.code().unwrap_or(-1),
        output: raw.to_str_lossy().into_owned(),
        duration: start.elapsed(),
    })
}
