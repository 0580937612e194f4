//! Error types and result definitions for conveyer operations.
//!
//! Provides an error system with classification, aggregation, and captured diagnostic metadata.
//! The [`ConveyerError`] type supports single errors, errors with additional detail, and multiple
//! aggregated errors for runs that collect every stage failure.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::Location;
use std::sync::Arc;

use tokio::task::JoinError;

/// Convenient result type for conveyer operations using [`ConveyerError`] as the error type.
pub type ConveyerResult<T> = Result<T, ConveyerError>;

/// Detailed payload stored for single [`ConveyerError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for conveyer operations.
///
/// [`ConveyerError`] can represent a single error, optionally carrying dynamic detail and a
/// source error, or an aggregation of multiple errors coming from different stages.
#[derive(Debug, Clone)]
pub struct ConveyerError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Single error payload holding rich metadata.
    Single(ErrorPayload),
    /// Multiple aggregated errors.
    ///
    /// Only produced when a run is configured to collect every stage failure.
    Many {
        errors: Vec<ConveyerError>,
        location: &'static Location<'static>,
    },
}

/// Specific categories of errors that can occur while building or running a conveyer.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Channel Errors
    /// A channel name was used for I/O but no stage ever registered it.
    ChannelNotFound,
    /// A value was sent to a channel that was already closed.
    ChannelClosed,

    // Stage Errors
    /// The decorator received a value it refuses to decorate.
    CantBeDecorated,
    /// A separator was registered without any output channel.
    EmptyOutputs,
    /// A stage task panicked.
    StagePanic,

    // State & Configuration Errors
    /// The conveyer was already run once and cannot be restarted.
    AlreadyRun,
    ConfigError,

    // Unknown / Uncategorized
    Unknown,
}

impl ConveyerError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For multiple errors, returns the kind of the first error or [`ErrorKind::Unknown`]
    /// if the error list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the static description of this error.
    ///
    /// For multiple errors, returns the description of the first error.
    pub fn description(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.description.as_ref()),
            ErrorRepr::Many { ref errors, .. } => errors.first().and_then(|e| e.description()),
        }
    }

    /// Returns the detailed error information if available.
    ///
    /// For multiple errors, returns the detail of the first error that has one.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the aggregated errors, if this is an aggregation.
    pub fn errors(&self) -> Option<&[ConveyerError]> {
        match self.repr {
            ErrorRepr::Single(_) => None,
            ErrorRepr::Many { ref errors, .. } => Some(errors),
        }
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating [`error::Error`] to this error and returns the modified instance.
    ///
    /// Has no effect on aggregated errors, which forward their first contained error as source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }

        self
    }

    /// Creates a [`ConveyerError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        ConveyerError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for ConveyerError {
    fn eq(&self, other: &ConveyerError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (
                ErrorRepr::Many {
                    errors: errors_a, ..
                },
                ErrorRepr::Many {
                    errors: errors_b, ..
                },
            ) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl Hash for ConveyerError {
    /// Hashes the error using only its stable identifying components.
    ///
    /// Location, detail, source and backtrace are excluded so that errors of the same category
    /// produce the same hash.
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.repr).hash(state);
        match &self.repr {
            ErrorRepr::Single(payload) => {
                payload.kind.hash(state);
                payload.description.hash(state);
            }
            ErrorRepr::Many { errors, .. } => {
                errors.len().hash(state);
                for error in errors {
                    error.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for ConveyerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                write_detail(payload.detail.as_deref(), f, 1)
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if errors.is_empty() {
                    return write!(f, "\n  (no inner errors provided)");
                }

                for (index, error) in errors.iter().enumerate() {
                    let rendered = format!("{error}");
                    let mut lines = rendered.lines();
                    match lines.next() {
                        Some(first_line) => write!(f, "\n  {}. {}", index + 1, first_line)?,
                        None => write!(f, "\n  {}.", index + 1)?,
                    }

                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for ConveyerError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Writes the detail block with indentation.
fn write_detail(detail: Option<&str>, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
    let Some(detail) = detail else {
        return Ok(());
    };

    let indent_str = "  ".repeat(indent);
    if detail.trim().is_empty() {
        return write!(f, "\n{indent_str}Detail: <empty>");
    }

    write!(f, "\n{indent_str}Detail:")?;
    for line in detail.lines() {
        write!(f, "\n{indent_str}  {line}")?;
    }

    Ok(())
}

/// Creates a [`ConveyerError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for ConveyerError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> ConveyerError {
        ConveyerError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`ConveyerError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for ConveyerError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> ConveyerError {
        ConveyerError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Creates a [`ConveyerError`] from a vector of errors for aggregation.
///
/// A vector with exactly one error yields that error unwrapped.
impl<E> From<Vec<E>> for ConveyerError
where
    E: Into<ConveyerError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> ConveyerError {
        let location = Location::caller();

        let mut errors: Vec<ConveyerError> = errors.into_iter().map(Into::into).collect();
        if errors.len() == 1
            && let Some(error) = errors.pop()
        {
            return error;
        }

        ConveyerError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

/// Converts a failed stage [`JoinError`] into a [`ConveyerError`] with [`ErrorKind::StagePanic`].
impl From<JoinError> for ConveyerError {
    #[track_caller]
    fn from(err: JoinError) -> ConveyerError {
        let description = if err.is_cancelled() {
            "Stage task was cancelled"
        } else {
            "Stage task panicked"
        };

        let detail = err.to_string();
        ConveyerError::from_components(
            ErrorKind::StagePanic,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            None,
        )
    }
}

/// Converts a configuration [`conveyer_config::shared::ValidationError`] into a
/// [`ConveyerError`] with [`ErrorKind::ConfigError`].
impl From<conveyer_config::shared::ValidationError> for ConveyerError {
    #[track_caller]
    fn from(err: conveyer_config::shared::ValidationError) -> ConveyerError {
        let detail = err.to_string();
        let source = Arc::new(err);
        ConveyerError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Invalid conveyer configuration"),
            Some(Cow::Owned(detail)),
            Some(source),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bail, conveyer_error};

    fn failing() -> ConveyerResult<()> {
        bail!(ErrorKind::CantBeDecorated, "Value cannot be decorated");
    }

    #[test]
    fn errors_compare_by_kind() {
        let a = conveyer_error!(ErrorKind::ChannelNotFound, "Channel not found", "left");
        let b = conveyer_error!(ErrorKind::ChannelNotFound, "Other description");

        assert_eq!(a, b);
        assert_eq!(a.detail(), Some("left"));
        assert_eq!(b.detail(), None);
    }

    #[test]
    fn bail_returns_error_with_kind() {
        let err = failing().unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CantBeDecorated);
        assert_eq!(err.description(), Some("Value cannot be decorated"));
        assert!(err.to_string().starts_with("[CantBeDecorated] Value cannot be decorated @"));
    }

    #[test]
    fn single_element_vec_is_unwrapped() {
        let err: ConveyerError =
            vec![conveyer_error!(ErrorKind::EmptyOutputs, "No outputs")].into();

        assert!(err.errors().is_none());
        assert_eq!(err.kind(), ErrorKind::EmptyOutputs);
    }

    #[test]
    fn aggregated_errors_expose_all_kinds() {
        let err: ConveyerError = vec![
            conveyer_error!(ErrorKind::CantBeDecorated, "Value cannot be decorated"),
            conveyer_error!(ErrorKind::EmptyOutputs, "No outputs"),
        ]
        .into();

        assert_eq!(err.kind(), ErrorKind::CantBeDecorated);
        assert_eq!(
            err.kinds(),
            vec![ErrorKind::CantBeDecorated, ErrorKind::EmptyOutputs]
        );
        assert_eq!(err.errors().map(<[_]>::len), Some(2));

        let rendered = err.to_string();
        assert!(rendered.starts_with("[Many] 2 errors aggregated"));
        assert!(rendered.contains("1. [CantBeDecorated]"));
        assert!(rendered.contains("2. [EmptyOutputs]"));
    }
}
