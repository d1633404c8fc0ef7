//! Execution contexts.
//!
//! An [`ExecutionContext`] tells a dispatch *where* to run (a stream) and
//! *after what* (antecedent dependencies). [`Policy`] is the standard
//! implementation:
//!
//! ```no_run
//! use stream_dispatch::{Policy, Stream};
//!
//! let stream = Stream::new()?;
//! let policy = Policy::new().on(&stream);
//! # Ok::<(), stream_dispatch::AllocationError>(())
//! ```

use crate::engine::dependency::Dependency;
use crate::engine::error::DependencyError;
use crate::engine::stream::Stream;

/// Source of a dispatch's stream and antecedent dependencies.
pub trait ExecutionContext {
    /// Stream requested by the caller. The default stream means "no preference".
    fn stream(&self) -> &Stream;

    /// Consumes the context, yielding every antecedent dependency in order.
    ///
    /// Fails if any dependency is no longer usable.
    fn extract_dependencies(self) -> Result<Vec<Dependency>, DependencyError>
    where
        Self: Sized;
}

/// A stream plus an ordered list of dependencies.
#[derive(Debug)]
pub struct Policy {
    stream: Stream,
    dependencies: Vec<Dependency>,
}

impl Default for Policy {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy {
    /// Policy on the default stream with no dependencies.
    pub fn new() -> Self {
        Self {
            stream: Stream::default_stream().clone(),
            dependencies: Vec::new(),
        }
    }

    /// Runs on `stream` instead of the default stream.
    pub fn on(mut self, stream: &Stream) -> Self {
        self.stream = stream.clone();
        self
    }

    /// Adds a dependency.
    pub fn after(mut self, dependency: impl Into<Dependency>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// Adds several dependencies, in order.
    pub fn after_all<I>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Dependency>,
    {
        self.dependencies.extend(dependencies.into_iter().map(Into::into));
        self
    }

    /// Dependencies added so far.
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }
}

impl ExecutionContext for Policy {
    fn stream(&self) -> &Stream {
        &self.stream
    }

    fn extract_dependencies(self) -> Result<Vec<Dependency>, DependencyError> {
        for (position, dependency) in self.dependencies.iter().enumerate() {
            dependency.validate(position)?;
        }
        Ok(self.dependencies)
    }
}

/// Shorthand for [`Policy::new`].
pub fn device() -> Policy {
    Policy::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::dependency::DependencyKind;
    use crate::engine::event::Event;
    use crate::engine::future::Future;

    #[test]
    fn extraction_preserves_order() {
        let stream = Stream::new().unwrap();
        let event = Event::new();
        stream.record(&event).unwrap();

        let policy = device().after(&event).after(&stream);
        let kinds: Vec<_> = policy
            .extract_dependencies()
            .unwrap()
            .iter()
            .map(Dependency::kind)
            .collect();

        assert_eq!(kinds, vec![DependencyKind::Event, DependencyKind::Stream]);
    }

    #[test]
    fn extraction_reports_the_first_invalid_position() {
        let event = Event::new();
        let ready = Event::new();
        Stream::new().unwrap().record(&ready).unwrap();

        let err = Policy::new()
            .after_all([ready.clone()])
            .after(Future::default())
            .after(&event)
            .extract_dependencies()
            .unwrap_err();

        assert_eq!(err, DependencyError::EmptyFuture { position: 1 });
    }

    #[test]
    fn new_policy_targets_the_default_stream() {
        let stream = Stream::new().unwrap();
        assert!(Policy::new().stream().is_default());
        assert!(Policy::new().on(&stream).stream().same_as(&stream));
    }
}
