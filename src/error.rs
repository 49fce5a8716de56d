//! Error taxonomy.
//!
//! The original throws C++ exceptions only at I²C driver boundaries and
//! otherwise routes everything through logging plus an `errorExit()` for
//! the fatal categories. This module keeps that propagation policy:
//! [`LunaMonError`] is returned by fallible constructors and parsers, but
//! nothing in the decode/bridge hot paths panics on attacker- or
//! line-noise-controlled input.

use thiserror::Error;

/// The six error categories. `Configuration` and `Hardware` are
/// fatal (routed to [`error_exit`]); `Frame`, `Bounds`, and `Backpressure`
/// are handled locally by incrementing a counter and continuing;
/// `Network` is retried indefinitely at the interface level.
#[derive(Debug, Error)]
pub enum LunaMonError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("frame error: {0}")]
    Frame(String),

    #[error("bounds error: {0}")]
    Bounds(String),

    #[error("backpressure: {0}")]
    Backpressure(String),

    #[error("hardware/runtime error: {0}")]
    Hardware(String),

    #[error("network error: {0}")]
    Network(String),
}

impl LunaMonError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, LunaMonError::Configuration(_) | LunaMonError::Hardware(_))
    }
}

/// The direct analogue of the original's `errorExit()`: log the cause at
/// error level and halt. Spec §6: "Fatal errors halt the task loop and log
/// an `errorExit` with a one-line cause; no automatic restart."
///
/// In this rewrite a fatal error aborts the whole process rather than just
/// the calling task, since there's no supervisor tree to hand a half-dead
/// process back to; that's a deliberate simplification noted in DESIGN.md.
pub fn error_exit(cause: &str) -> ! {
    log::error!("errorExit: {cause}");
    std::process::exit(1);
}

pub type Result<T> = std::result::Result<T, LunaMonError>;
