use std::fmt::{Debug, Display, Formatter};

pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// This is defined as a convenience.
pub type Result<T> = std::result::Result<T, Error>;

pub struct TaskError {
    err: String,
    file: &'static str,
    line: u32,
    // Send + Sync so the error can cross worker tasks; exposed as `&dyn Error` in `source()`
    source: Option<Error>,
}

impl TaskError {
    pub fn new(
        err: impl Into<String>,
        file: &'static str,
        line: u32,
        source: Option<Error>,
    ) -> Self {
        Self {
            err: err.into(),
            file,
            line,
            source,
        }
    }

    pub fn message(&self) -> &str {
        &self.err
    }
}

#[macro_export]
macro_rules! task_error {
    ($fmt:expr $(, $($args:tt)*)?) => {
        $crate::err::TaskError::new(
            format!($fmt $(,$($args)*)?),
            file!(), line!(), None)
    };
}

#[macro_export]
macro_rules! task_error_with_source {
    ($source:expr, $fmt:expr $(, $($args:tt)*)?) => {
        $crate::err::TaskError::new(
            format!($fmt $(,$($args)*)?),
            file!(), line!(), Some(Box::new($source) as $crate::err::Error))
    }
}

impl Debug for TaskError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]:{} {}", self.file, self.line, self.err)
    }
}

impl Display for TaskError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.err)
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error))
    }
}
