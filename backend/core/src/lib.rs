pub mod error;
pub mod traits;
pub mod types;

pub use error::ScanError;
pub use traits::{AnalysisTransport, NoProgress, ProgressSink};
pub use types::{
    AcquiredImage, AnalysisRecord, DispatchRequest, ImagePayload, ImageSource, PreviewHandle,
    RawResponse, RequestId, ScanPhase, TransferState, PLACEHOLDER_NAME,
};
