//! Lassie error types.

use crate::Cid;
use std::sync::Arc;

/// A clonable trait-object inner error.
#[derive(Clone, Default)]
pub struct DynInnerError(
    pub Option<Arc<dyn std::error::Error + 'static + Send + Sync>>,
);

impl std::fmt::Debug for DynInnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for DynInnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.as_ref() {
            None => f.write_str("None"),
            Some(s) => s.fmt(f),
        }
    }
}

impl std::error::Error for DynInnerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.as_ref().map(|s| {
            let out: &(dyn std::error::Error + 'static) = &**s;
            out
        })
    }
}

impl DynInnerError {
    /// Construct a new DynInnerError from a source error.
    pub fn new<E: std::error::Error + 'static + Send + Sync>(e: E) -> Self {
        Self(Some(Arc::new(e)))
    }
}

/// The core lassie error type. This type is used in all external
/// lassie apis as well as internally in the retrieval modules.
///
/// This type is required to implement `Clone` so that a single failure
/// can be reported both to event subscribers and to the caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LassieError {
    /// The [Context](crate::Context) governing the operation was cancelled.
    #[error("context cancelled")]
    Cancelled,

    /// The deadline of the [Context](crate::Context) governing the
    /// operation has passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// No usable candidate was found for the requested root.
    #[error("no candidates found for {0}")]
    NoCandidates(Cid),

    /// Generic lassie internal error.
    #[error("{ctx} (src: {src})")]
    Other {
        /// Any context associated with this error.
        ctx: Arc<str>,

        /// The inner error (if any).
        #[source]
        src: DynInnerError,
    },
}

impl LassieError {
    /// Construct an "other" error with an inner source error.
    pub fn other_src<
        C: std::fmt::Display,
        S: std::error::Error + 'static + Send + Sync,
    >(
        ctx: C,
        src: S,
    ) -> Self {
        Self::Other {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::new(src),
        }
    }

    /// Construct an "other" error.
    pub fn other<C: std::fmt::Display>(ctx: C) -> Self {
        Self::Other {
            ctx: ctx.to_string().into_boxed_str().into(),
            src: DynInnerError::default(),
        }
    }

    /// Returns true if this error was produced by an expired or
    /// cancelled [Context](crate::Context).
    pub fn is_context_error(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

/// The core lassie result type.
pub type LassieResult<T> = Result<T, LassieError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(
            "bla (src: None)",
            LassieError::other("bla").to_string().as_str(),
        );
        assert_eq!(
            "foo (src: bar)",
            LassieError::other_src("foo", std::io::Error::other("bar"))
                .to_string()
                .as_str(),
        );
        assert_eq!(
            "context deadline exceeded",
            LassieError::DeadlineExceeded.to_string().as_str(),
        );
        assert_eq!(
            "no candidates found for uAXESIA",
            LassieError::NoCandidates(Cid::from(bytes::Bytes::from_static(
                &[0x01, 0x71, 0x12, 0x20]
            )))
            .to_string()
            .as_str(),
        );
    }

    #[test]
    fn error_debug() {
        assert_eq!(
            "Other { ctx: \"bla\", src: None }",
            format!("{:?}", LassieError::other("bla")).as_str(),
        );
    }

    #[test]
    fn context_errors() {
        assert!(LassieError::Cancelled.is_context_error());
        assert!(LassieError::DeadlineExceeded.is_context_error());
        assert!(!LassieError::other("bla").is_context_error());
    }

    #[test]
    fn ensure_lassie_error_type_is_send_and_sync() {
        fn ensure<T: std::fmt::Display + Send + Sync>(_t: T) {}
        ensure(LassieError::other("bla"));
    }
}
