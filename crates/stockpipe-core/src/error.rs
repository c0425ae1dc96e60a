use thiserror::Error;

/// Validation errors raised while building domain values and configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },
    #[error("symbol list must contain at least one symbol")]
    EmptySymbolList,

    #[error("history days must be a positive integer: '{value}'")]
    InvalidHistoryDays { value: String },
    #[error("date window start {start} must be before end {end}")]
    InvalidWindow { start: String, end: String },

    #[error("fetch concurrency must be at least 1: '{value}'")]
    InvalidConcurrency { value: String },
    #[error("request delay must be 'MS' or 'MIN-MAX' milliseconds with MIN <= MAX: '{value}'")]
    InvalidDelayRange { value: String },

    #[error("invalid {field} '{value}': expected [A-Za-z_][A-Za-z0-9_]*")]
    InvalidIdentifier { field: &'static str, value: String },
    #[error("table id '{value}' is reserved for the '{model}' model")]
    ReservedTableId { value: String, model: &'static str },
}
