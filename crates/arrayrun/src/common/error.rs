use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    /// The program could not be launched or communicated with at the OS level.
    #[error("Cannot run or communicate with external program `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// The program itself signaled failure through its exit code.
    #[error("`{program}` exited with code {code}")]
    NonZeroExit {
        program: String,
        code: i32,
        output: String,
    },
    /// The program exited with code 0, but its output failed the domain check.
    #[error("{0}")]
    Failed(String),
    #[error("Error: {0}")]
    GenericError(String),
}

impl From<anyhow::Error> for RunError {
    fn from(error: anyhow::Error) -> Self {
        Self::GenericError(error.to_string())
    }
}
