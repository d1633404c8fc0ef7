//! Dependency tokens.
//!
//! A [`Dependency`] is an ownership-preserving reference to one antecedent
//! asynchronous resource. The set of antecedent kinds is small and fixed, so
//! tokens are a tagged enum rather than a trait object:
//!
//! * [`Dependency::Stream`]: all work queued so far on a stream,
//! * [`Dependency::Future`]: the completion of an earlier dispatch,
//! * [`Dependency::Event`]: a recorded event.
//!
//! Holding a token keeps its resource alive. Resources are shared through
//! reference counting and released once, when the last holder lets go.

use crate::engine::error::DependencyError;
use crate::engine::event::Event;
use crate::engine::future::Future;
use crate::engine::stream::Stream;

/// Kind tag of a [`Dependency`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    /// A stream (non-owning).
    Stream,
    /// A future.
    Future,
    /// An event.
    Event,
}

/// A lifetime-preserving reference to an antecedent resource.
#[derive(Debug)]
pub enum Dependency {
    /// Everything queued on the stream before the dependent work.
    Stream(Stream),

    /// Completion of an earlier dispatch.
    Future(Future),

    /// Latest record of an event.
    Event(Event),
}

impl Dependency {
    /// Kind tag.
    pub fn kind(&self) -> DependencyKind {
        match self {
            Dependency::Stream(_) => DependencyKind::Stream,
            Dependency::Future(_) => DependencyKind::Future,
            Dependency::Event(_) => DependencyKind::Event,
        }
    }

    /// Stream this token is bound to, if any.
    pub fn stream(&self) -> Option<&Stream> {
        match self {
            Dependency::Stream(stream) => Some(stream),
            Dependency::Future(future) => future.stream(),
            Dependency::Event(_) => None,
        }
    }

    /// Checks that the token still refers to a live, usable resource.
    ///
    /// `position` is reported back in the error.
    pub(crate) fn validate(&self, position: usize) -> Result<(), DependencyError> {
        match self {
            Dependency::Stream(stream) if stream.is_closed() => {
                Err(DependencyError::ClosedStream { position, stream: stream.id() })
            }
            Dependency::Future(future) if !future.is_valid() => {
                Err(DependencyError::EmptyFuture { position })
            }
            Dependency::Event(event) if !event.is_recorded() => {
                Err(DependencyError::UnrecordedEvent { position, event: event.id() })
            }
            _ => Ok(()),
        }
    }
}

impl From<Stream> for Dependency {
    fn from(stream: Stream) -> Self {
        Dependency::Stream(stream)
    }
}

impl From<&Stream> for Dependency {
    fn from(stream: &Stream) -> Self {
        Dependency::Stream(stream.clone())
    }
}

impl From<Future> for Dependency {
    fn from(future: Future) -> Self {
        Dependency::Future(future)
    }
}

impl From<Event> for Dependency {
    fn from(event: Event) -> Self {
        Dependency::Event(event)
    }
}

impl From<&Event> for Dependency {
    fn from(event: &Event) -> Self {
        Dependency::Event(event.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_rejects_invalid_tokens() {
        let closed = Stream::new().unwrap();
        closed.close();
        assert_eq!(
            Dependency::from(&closed).validate(0),
            Err(DependencyError::ClosedStream { position: 0, stream: closed.id() })
        );

        assert_eq!(
            Dependency::from(Future::default()).validate(1),
            Err(DependencyError::EmptyFuture { position: 1 })
        );

        let event = Event::new();
        assert_eq!(
            Dependency::from(&event).validate(2),
            Err(DependencyError::UnrecordedEvent { position: 2, event: event.id() })
        );
    }

    #[test]
    fn validation_accepts_live_tokens() {
        let stream = Stream::new().unwrap();
        let event = Event::new();
        stream.record(&event).unwrap();

        assert!(Dependency::from(&stream).validate(0).is_ok());
        assert!(Dependency::from(&event).validate(1).is_ok());
        assert_eq!(Dependency::from(&event).kind(), DependencyKind::Event);
    }
}
