pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),
    
    #[error("Parse error: {0}")]
    Parse(String),
    
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Device State conflicts
///
/// The `Display` text is what the interpreter reports after `Error: `.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StateError {
    #[error("invalid {quantity} {value:.2}. Valid range: {min} to {max}")]
    OutOfRange {
        quantity: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    
    #[error("move out of bounds: {axis} {value:.2} not within 0 to {max:.2}")]
    OutOfBounds {
        axis: char,
        value: f64,
        max: f64,
    },
    
    #[error("{quantity} must not be negative (got {value:.2})")]
    Negative {
        quantity: &'static str,
        value: f64,
    },
    
    #[error("printer is paused")]
    Paused,
}
