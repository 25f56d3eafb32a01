use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadParams,
    NotFound,
    InvalidPeriodType,
    InvalidClassGroup,
    Unauthorized,
    Storage,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::BadParams => "bad_params",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidPeriodType => "invalid_period_type",
            ErrorKind::InvalidClassGroup => "invalid_class_group",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Storage => "db_query_failed",
        }
    }
}

/// Failure of a core operation. Carries the wire code the IPC layer replies with.
#[derive(Debug, Clone)]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadParams, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn invalid_period_type(raw: &str) -> Self {
        Self::new(
            ErrorKind::InvalidPeriodType,
            "periodType must be one of: monthly, quarterly, yearly",
        )
        .with_details(serde_json::json!({ "periodType": raw }))
    }

    pub fn invalid_class_group(raw: &str) -> Self {
        Self::new(ErrorKind::InvalidClassGroup, "unknown class group")
            .with_details(serde_json::json!({ "classGroupId": raw }))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message)
    }
}

impl std::error::Error for CoreError {}

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        CoreError::new(ErrorKind::Storage, e.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
