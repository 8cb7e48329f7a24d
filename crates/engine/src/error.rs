use std::io;
use thiserror::Error;

/// Host-level failures.
///
/// Everything recoverable (missing includes, constant redeclarations,
/// script exceptions, …) is rendered in-band as an `<< Error: … >>`
/// envelope in the produced document instead; `process` only returns
/// `Err` when it cannot produce a document at all.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to read input '{path}'")]
    Input {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("extension name '{0}' is reserved")]
    ReservedExtension(String),
}
