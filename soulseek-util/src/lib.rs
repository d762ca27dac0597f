//! Shared, dependency-free-of-the-rest-of-the-workspace primitives used by
//! every other crate: diagnostics, cancellation, rate counting and token
//! allocation.

mod cancellation;
mod diagnostics;
mod rate_counter;
mod token;

pub use cancellation::CancellationToken;
pub use diagnostics::{DiagnosticEvent, DiagnosticLevel, DiagnosticSink};
pub use rate_counter::RateCounter;
pub use token::TokenAllocator;
