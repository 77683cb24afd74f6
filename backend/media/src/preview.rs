use base64::{Engine, engine::general_purpose::STANDARD};
use nutrilens_core::{ImagePayload, PreviewHandle};

/// Build a `data:` URL preview for a payload, renderable by any front end as is.
pub fn data_url(payload: &ImagePayload) -> PreviewHandle {
    PreviewHandle::new(format!(
        "data:{};base64,{}",
        payload.mime_type,
        STANDARD.encode(&payload.bytes)
    ))
}
