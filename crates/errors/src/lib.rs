use std::borrow::Cow;

/// `ErrorMetadata` is attached to an `anyhow::Error` chain via
/// `.context(e /* ErrorMetadata */)`. It is a generic object used across the
/// codebase to tag errors with information used to classify them without
/// resorting to string matching.
///
/// `short_msg` is a CapitalCamelCase tag usable in tests and metrics. `msg` is
/// the developer-facing description.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error("{msg}")]
pub struct ErrorMetadata {
    pub code: ErrorCode,
    pub short_msg: Cow<'static, str>,
    pub msg: Cow<'static, str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BadRequest,
    NotFound,
    /// The caller hit a defensive limit (e.g. a stopped or overloaded
    /// component). Safe to retry.
    Overloaded,
    OperationalInternalServerError,
}

impl ErrorMetadata {
    /// Bad request: the caller supplied something the system cannot accept
    /// (e.g. a malformed document).
    pub fn bad_request(
        short_msg: impl Into<Cow<'static, str>>,
        msg: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            code: ErrorCode::BadRequest,
            short_msg: short_msg.into(),
            msg: msg.into(),
        }
    }

    pub fn not_found(
        short_msg: impl Into<Cow<'static, str>>,
        msg: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            code: ErrorCode::NotFound,
            short_msg: short_msg.into(),
            msg: msg.into(),
        }
    }

    /// Internal error with a user-visible message indicating the caller has
    /// hit some defensive limit. Maps to a retriable 503-equivalent.
    ///
    /// If you do not need a custom error message, use `anyhow` without any
    /// `ErrorMetadata`, which is shown to callers as a generic internal
    /// server error.
    pub fn overloaded(
        short_msg: impl Into<Cow<'static, str>>,
        msg: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            code: ErrorCode::Overloaded,
            short_msg: short_msg.into(),
            msg: msg.into(),
        }
    }

    pub fn operational_internal_server_error() -> Self {
        Self {
            code: ErrorCode::OperationalInternalServerError,
            short_msg: "InternalServerError".into(),
            msg: "The request could not be completed, please try again.".into(),
        }
    }

    pub fn is_overloaded(&self) -> bool {
        self.code == ErrorCode::Overloaded
    }

    pub fn is_bad_request(&self) -> bool {
        self.code == ErrorCode::BadRequest
    }

    pub fn is_not_found(&self) -> bool {
        self.code == ErrorCode::NotFound
    }
}

/// Helper for pulling an [`ErrorMetadata`] back out of an `anyhow::Error`
/// chain, the way callers are expected to classify errors returned by this
/// crate's public API.
pub trait ErrorMetadataAnyhowExt {
    fn error_metadata(&self) -> Option<&ErrorMetadata>;

    fn is_overloaded(&self) -> bool {
        self.error_metadata().is_some_and(|e| e.is_overloaded())
    }
}

impl ErrorMetadataAnyhowExt for anyhow::Error {
    fn error_metadata(&self) -> Option<&ErrorMetadata> {
        self.chain().find_map(|e| e.downcast_ref::<ErrorMetadata>())
    }
}
