//! The scan flow: acquire an image, send it for analysis, show the result.

pub mod controller;
pub mod state;

pub use controller::AcquisitionController;
pub use state::{DispatchOutcome, PendingImage, ScanOutcome, ScanState, TransferSnapshot};
