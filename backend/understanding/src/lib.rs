//! Talking to the label analysis service: transfer with upload progress, and
//! normalization of the loosely-typed responses it returns.

pub mod diagnostics;
pub mod dispatcher;
pub mod normalize;
pub mod progress;

pub use diagnostics::{Diagnostic, pretty_raw};
pub use dispatcher::{DEFAULT_CAPTURE_PARAM, DEFAULT_CHUNK_SIZE, DEFAULT_TIMEOUT, TransferDispatcher};
pub use normalize::{Normalization, normalize};
pub use progress::ProgressTracker;
