use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Soft error produced while evaluating a single row.
///
/// These never abort a query. The evaluator replaces the failed value with
/// null and records the code in the session statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    CannotCast,
    NotSupported,
    DivideByZero,
    Overflow,
    InvalidArgument,
    InvalidInputValue,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 6] = [
        ErrorCode::CannotCast,
        ErrorCode::NotSupported,
        ErrorCode::DivideByZero,
        ErrorCode::Overflow,
        ErrorCode::InvalidArgument,
        ErrorCode::InvalidInputValue,
    ];

    const fn slot(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CannotCast => "cannot_cast",
            Self::NotSupported => "not_supported",
            Self::DivideByZero => "divide_by_zero",
            Self::Overflow => "overflow",
            Self::InvalidArgument => "invalid_argument",
            Self::InvalidInputValue => "invalid_input_value",
        };
        write!(f, "{s}")
    }
}

/// Counters for a single execution.
///
/// Shared between every compiled evaluator and operator of a pipeline.
#[derive(Debug, Default)]
pub struct ExecutionStatistics {
    processed_rows: AtomicU64,
    errors: [AtomicU64; ErrorCode::ALL.len()],
}

impl ExecutionStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&self, code: ErrorCode) {
        self.errors[code.slot()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_processed_row(&self) {
        self.processed_rows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn processed_rows(&self) -> u64 {
        self.processed_rows.load(Ordering::Relaxed)
    }

    /// Total number of soft errors across all codes.
    pub fn errors_count(&self) -> u64 {
        self.errors.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    pub fn error_count(&self, code: ErrorCode) -> u64 {
        self.errors[code.slot()].load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.processed_rows.store(0, Ordering::Relaxed);
        for c in &self.errors {
            c.store(0, Ordering::Relaxed);
        }
    }

    /// Human readable summary of the counters. Only non-zero error codes are
    /// listed.
    pub fn dump(&self) -> String {
        let mut out = format!(
            "processed: {}, errors: {}",
            self.processed_rows(),
            self.errors_count()
        );
        for code in ErrorCode::ALL {
            let count = self.error_count(code);
            if count > 0 {
                out.push_str(&format!("\n  {code}: {count}"));
            }
        }
        out
    }
}
