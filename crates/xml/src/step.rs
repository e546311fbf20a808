//! Resumable operation results.

use crate::error::XmlError;

/// Outcome of one attempt at a resumable operation.
///
/// `NeedMoreInput` means the input source is dry and nothing observable has
/// changed: retrying the same call once more input is available continues
/// where the attempt stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step<T> {
    Ready(T),
    NeedMoreInput,
}

impl<T> Step<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Step::Ready(_))
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Step::Ready(value) => Some(value),
            Step::NeedMoreInput => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Step<U> {
        match self {
            Step::Ready(value) => Step::Ready(f(value)),
            Step::NeedMoreInput => Step::NeedMoreInput,
        }
    }
}

pub type StepResult<T> = Result<Step<T>, XmlError>;

/// Unwrap `Step::Ready` or return `Ok(Step::NeedMoreInput)` from the
/// enclosing function.
macro_rules! ready {
    ($e:expr) => {
        match $e {
            $crate::step::Step::Ready(value) => value,
            $crate::step::Step::NeedMoreInput => {
                return Ok($crate::step::Step::NeedMoreInput);
            }
        }
    };
}

pub(crate) use ready;
