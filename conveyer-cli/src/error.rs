use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

use conveyer::error::ConveyerError;

/// Returns whether terminal output should include backtraces.
fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

/// Result type for command line operations.
pub type CliResult<T> = Result<T, CliError>;

/// Backtrace captured when a non-conveyer error is created.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for the `conveyer` binary.
///
/// Wraps [`ConveyerError`] for failed runs and adds variants for setup errors.
#[derive(Debug)]
pub enum CliError {
    /// The conveyer run failed.
    Conveyer(ConveyerError),
    /// Configuration could not be loaded or is invalid.
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    /// Reading input or starting the runtime failed.
    Io(std::io::Error, CapturedBacktrace),
}

impl CliError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            CliError::Conveyer(_) => "conveyer error",
            CliError::Config(_, _) => "configuration error",
            CliError::Io(_, _) => "i/o error",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            CliError::Conveyer(err) => err.backtrace(),
            CliError::Config(_, cb) => Some(&cb.0),
            CliError::Io(_, cb) => Some(&cb.0),
        }
    }

    /// Creates a configuration error from any error type.
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        CliError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns a user-oriented report for terminal output.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("conveyer failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {}\n", self));

        // Aggregated errors already list every member in their display output.
        if !matches!(self, CliError::Conveyer(err) if err.errors().is_some()) {
            let mut source = Error::source(self);
            let mut idx = 1usize;
            while let Some(err) = source {
                out.push_str(&format!("cause {idx}: {err}\n"));
                source = err.source();
                idx += 1;
            }
        }

        if should_render_backtrace()
            && let Some(backtrace) = self.backtrace()
        {
            out.push_str("backtrace:\n");
            out.push_str(&backtrace.to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Conveyer(err) => write!(f, "{err}"),
            CliError::Config(source, _) => write!(f, "configuration error: {source}"),
            CliError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for CliError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CliError::Conveyer(err) => err.source(),
            CliError::Config(source, _) => Some(source.as_ref()),
            CliError::Io(source, _) => Some(source),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io(err, CapturedBacktrace::capture())
    }
}

impl From<ConveyerError> for CliError {
    fn from(err: ConveyerError) -> Self {
        CliError::Conveyer(err)
    }
}

#[cfg(test)]
mod tests {
    use conveyer::error::ErrorKind;
    use conveyer_config::shared::ValidationError;

    use super::*;

    #[test]
    fn report_names_category_and_error() {
        let err = CliError::config(ValidationError::SeparatorOutputsZero);
        let report = err.render_report();

        assert!(report.starts_with("conveyer failed\n"));
        assert!(report.contains("category: configuration error\n"));
        assert!(report.contains("`separator_outputs` cannot be zero"));
    }

    #[test]
    fn conveyer_errors_keep_their_kind() {
        let err: CliError =
            ConveyerError::from((ErrorKind::CantBeDecorated, "Value cannot be decorated")).into();

        assert_eq!(err.category(), "conveyer error");
        assert!(matches!(err, CliError::Conveyer(inner) if inner.kind() == ErrorKind::CantBeDecorated));
    }
}
