//! Image acquisition from the local filesystem.

use std::path::Path;

use nutrilens_core::{AcquiredImage, ImagePayload, ImageSource, ScanError};
use tokio::fs;
use tracing::{debug, warn};

use crate::mime_detect::{image_mime_for, is_image};
use crate::preview::data_url;

const FALLBACK_FILE_NAME: &str = "upload.jpg";

/// Read an image file into an [`AcquiredImage`] with its preview.
///
/// Content is not validated beyond being non-empty.
pub async fn load_image_file(path: impl AsRef<Path>) -> Result<AcquiredImage, ScanError> {
    let path = path.as_ref();
    let bytes = fs::read(path)
        .await
        .map_err(|e| ScanError::FileUnreadable(format!("{}: {e}", path.display())))?;

    if bytes.is_empty() {
        return Err(ScanError::FileUnreadable(format!("{} is empty", path.display())));
    }

    let mime_type = image_mime_for(path, &bytes);
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(FALLBACK_FILE_NAME)
        .to_string();
    debug!(path = %path.display(), bytes = bytes.len(), mime_type, "Loaded image file");
    if !is_image(mime_type) {
        warn!(path = %path.display(), mime_type, "File does not look like an image; sending it anyway");
    }

    let payload = ImagePayload::new(bytes, mime_type, file_name);
    let preview = data_url(&payload);
    Ok(AcquiredImage::new(
        ImageSource::File {
            path: path.to_path_buf(),
        },
        payload,
        preview,
    ))
}
