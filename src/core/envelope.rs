//! Result envelope for asynchronous operations.
//!
//! A [`ResultEnvelope`] is always in exactly one of three states: loading,
//! success, or error. Error envelopes may carry the last good value so a UI
//! can keep showing stale data while the fault is displayed.

use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};

use super::classify::classify;
use super::error::ErrorKind;

/// Three-state wrapper around the outcome of an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultEnvelope<T> {
    /// The operation is still running.
    Loading {
        /// Completion fraction in `0.0..=1.0`, when known.
        progress: Option<f32>,
    },
    /// The operation produced a value.
    Success(T),
    /// The operation failed.
    Error {
        /// Classified fault.
        kind: ErrorKind,
        /// Last good value, if one was seen.
        stale: Option<T>,
    },
}

impl<T> ResultEnvelope<T> {
    /// Loading without progress information.
    pub fn loading() -> Self {
        Self::Loading { progress: None }
    }

    /// Successful value.
    pub fn success(value: T) -> Self {
        Self::Success(value)
    }

    /// Failure without stale data.
    pub fn error(kind: ErrorKind) -> Self {
        Self::Error { kind, stale: None }
    }

    /// Failure that keeps the last good value.
    pub fn error_with_stale(kind: ErrorKind, stale: T) -> Self {
        Self::Error {
            kind,
            stale: Some(stale),
        }
    }

    /// Wrap an `anyhow` result, classifying the fault.
    pub fn from_result(result: anyhow::Result<T>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(fault) => Self::error(classify(&fault)),
        }
    }

    /// Transform the success value and any stale value. Loading and the error
    /// kind are preserved.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ResultEnvelope<U> {
        match self {
            Self::Loading { progress } => ResultEnvelope::Loading { progress },
            Self::Success(value) => ResultEnvelope::Success(f(value)),
            Self::Error { kind, stale } => ResultEnvelope::Error {
                kind,
                stale: stale.map(f),
            },
        }
    }

    /// Collapse the envelope with one handler per state.
    pub fn fold<R>(
        self,
        on_loading: impl FnOnce(Option<f32>) -> R,
        on_success: impl FnOnce(T) -> R,
        on_error: impl FnOnce(ErrorKind, Option<T>) -> R,
    ) -> R {
        match self {
            Self::Loading { progress } => on_loading(progress),
            Self::Success(value) => on_success(value),
            Self::Error { kind, stale } => on_error(kind, stale),
        }
    }

    /// Success value, or `default` in any other state.
    pub fn get_or_else(self, default: T) -> T {
        match self {
            Self::Success(value) => value,
            _ => default,
        }
    }

    /// Run `f` on the success value, returning the envelope unchanged.
    pub fn on_success(self, f: impl FnOnce(&T)) -> Self {
        if let Self::Success(value) = &self {
            f(value);
        }
        self
    }

    /// Run `f` on the error kind, returning the envelope unchanged.
    pub fn on_error(self, f: impl FnOnce(&ErrorKind)) -> Self {
        if let Self::Error { kind, .. } = &self {
            f(kind);
        }
        self
    }

    /// Whether the operation is still running.
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }

    /// Whether the operation succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Whether the operation failed.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// The success value, if any.
    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    /// The success value, or the stale value of an error.
    pub fn data_or_stale(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Error { stale, .. } => stale.as_ref(),
            Self::Loading { .. } => None,
        }
    }

    /// The error kind, if the operation failed.
    pub fn error_kind(&self) -> Option<&ErrorKind> {
        match self {
            Self::Error { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// Borrow the contents.
    pub fn as_ref(&self) -> ResultEnvelope<&T> {
        match self {
            Self::Loading { progress } => ResultEnvelope::Loading {
                progress: *progress,
            },
            Self::Success(value) => ResultEnvelope::Success(value),
            Self::Error { kind, stale } => ResultEnvelope::Error {
                kind: kind.clone(),
                stale: stale.as_ref(),
            },
        }
    }
}

impl<T> From<Result<T, ErrorKind>> for ResultEnvelope<T> {
    fn from(result: Result<T, ErrorKind>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(kind) => Self::error(kind),
        }
    }
}

enum Progress<S, T> {
    Start(Pin<Box<S>>),
    Running(Pin<Box<S>>, Option<T>),
    Done,
}

/// Adapt a fallible stream into a stream of envelopes.
///
/// Emits `Loading` first, then `Success` per item. The first error is emitted
/// once, carrying the last good item as stale data, and ends the stream.
pub fn envelope_stream<S, T, E>(source: S) -> impl Stream<Item = ResultEnvelope<T>>
where
    S: Stream<Item = Result<T, E>>,
    T: Clone,
    E: Into<anyhow::Error>,
{
    stream::unfold(Progress::Start(Box::pin(source)), |state| async move {
        match state {
            Progress::Start(source) => {
                Some((ResultEnvelope::loading(), Progress::Running(source, None)))
            }
            Progress::Running(mut source, last) => match source.next().await {
                Some(Ok(item)) => Some((
                    ResultEnvelope::Success(item.clone()),
                    Progress::Running(source, Some(item)),
                )),
                Some(Err(fault)) => {
                    let kind = classify(&fault.into());
                    Some((ResultEnvelope::Error { kind, stale: last }, Progress::Done))
                }
                None => None,
            },
            Progress::Done => None,
        }
    })
}
