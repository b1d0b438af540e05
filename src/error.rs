// Structured failure context, threaded through `Result` rather than a
// process-wide error code. The call site raising an error attaches
// whatever attributes (path, address, length, register snapshot, ...) the
// reader would need and returns `Err(WashError)`; it does not unwind the
// process itself. The root loop is the one place that decides what to do
// with an unrecovered error: print it, run the registered dump callbacks,
// and stop.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    #[error("unimplemented")]
    Unimplemented,
    #[error("invalid parameter")]
    InvalidParam,
    #[error("memory out of bounds")]
    MemOutOfBounds,
    #[error("failed allocation")]
    FailedAlloc,
    #[error("file i/o")]
    FileIO,
    #[error("unknown exception code")]
    UnknownExcpCode,
    #[error("integrity")]
    Integrity,
    #[error("invalid file length")]
    InvalidFileLen,
    #[error("overflow")]
    Overflow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Str(String),
    Int(i64),
    U32(u32),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Str(s) => write!(f, "{}", s),
            AttrValue::Int(i) => write!(f, "{}", i),
            AttrValue::U32(u) => write!(f, "0x{:08x}", u),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    pub name: &'static str,
    pub value: AttrValue,
}

/// The error raised at a discovery site, with the site's file/line and any
/// number of attached diagnostic attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct WashError {
    pub kind: ErrorKind,
    pub site_file: &'static str,
    pub site_line: u32,
    pub attrs: Vec<Attr>,
}

impl WashError {
    pub fn new(kind: ErrorKind, site_file: &'static str, site_line: u32) -> Self {
        WashError { kind, site_file, site_line, attrs: Vec::new() }
    }

    pub fn with_str(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.attrs.push(Attr { name, value: AttrValue::Str(value.into()) });
        self
    }

    pub fn with_int(mut self, name: &'static str, value: i64) -> Self {
        self.attrs.push(Attr { name, value: AttrValue::Int(value) });
        self
    }

    pub fn with_u32(mut self, name: &'static str, value: u32) -> Self {
        self.attrs.push(Attr { name, value: AttrValue::U32(value) });
        self
    }
}

impl fmt::Display for WashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.kind)?;
        for attr in &self.attrs {
            writeln!(f, "[{}] = {}", attr.name, attr.value)?;
        }
        Ok(())
    }
}

impl std::error::Error for WashError {}

pub type WashResult<T> = Result<T, WashError>;

/// Raises a `WashError` carrying the raise site's file and line, mirroring
/// the original `RAISE_ERROR` macro.
#[macro_export]
macro_rules! raise_error {
    ($kind:expr) => {
        $crate::error::WashError::new($kind, file!(), line!())
    };
}

/// A small registry of callbacks invoked once, in registration order,
/// before an unrecovered error is reported to the user. Analogous to the
/// original's "error callback" registrations (e.g. an SH-4 register dump).
#[derive(Default)]
pub struct ErrorReporter {
    callbacks: Vec<Box<dyn Fn(&WashError)>>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        ErrorReporter { callbacks: Vec::new() }
    }

    pub fn register(&mut self, callback: Box<dyn Fn(&WashError)>) {
        self.callbacks.push(callback);
    }

    /// Prints the error in the user-visible format and runs every
    /// registered dump callback. Does not terminate the process itself —
    /// the root loop decides whether to abort or, in debugger-attached
    /// mode, hand control back to the front-end.
    pub fn report(&self, err: &WashError) {
        eprint!("{}", err);
        for callback in &self.callbacks {
            callback(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_user_visible_format() {
        let err = WashError::new(ErrorKind::MemOutOfBounds, "mem.rs", 10)
            .with_u32("addr", 0xdead_beef)
            .with_int("length", 4);
        let rendered = format!("{}", err);
        assert_eq!(rendered, "ERROR: memory out of bounds\n[addr] = 0xdeadbeef\n[length] = 4\n");
    }

    #[test]
    fn reporter_runs_callbacks_in_order() {
        use std::cell::RefCell;
        use std::rc::Rc;
        let trail = Rc::new(RefCell::new(Vec::new()));
        let mut reporter = ErrorReporter::new();
        let t1 = Rc::clone(&trail);
        reporter.register(Box::new(move |_| t1.borrow_mut().push(1)));
        let t2 = Rc::clone(&trail);
        reporter.register(Box::new(move |_| t2.borrow_mut().push(2)));
        reporter.report(&WashError::new(ErrorKind::Integrity, "x.rs", 1));
        assert_eq!(*trail.borrow(), vec![1, 2]);
    }
}
