//! File-upload mode: the whole request body is read as `multipart/form-data`.

use axum::body::Body;
use axum::extract::{FromRequest, Multipart, Request};
use http_body_util::Limited;
use svcbind_protocol::{BindingError, FileContent, UploadedFile};
use tracing::debug;

/// Reads every part of a multipart body. Parts that carry a file name become
/// [`UploadedFile`] records in arrival order; other parts are drained and
/// dropped.
///
/// Parts arrive sequentially on one stream, so each file's chunks are
/// collected before the next part can be reached. The whole body is capped at
/// `max_body_bytes`; a larger upload fails while its parts are read.
pub async fn read_uploads(
    request: Request,
    max_body_bytes: usize,
) -> Result<Vec<UploadedFile>, BindingError> {
    let request = request.map(|body| Body::new(Limited::new(body, max_body_bytes)));
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|rejection| BindingError::Multipart(rejection.body_text()))?;

    let mut files = Vec::new();
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|error| BindingError::Multipart(error.body_text()))?
    {
        let form_field_name = field.name().unwrap_or_default().to_owned();
        let file_name = field.file_name().map(str::to_owned);

        let mut chunks = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|error| BindingError::Multipart(error.body_text()))?
        {
            if file_name.is_some() {
                chunks.push(chunk);
            }
        }

        match file_name {
            Some(file_name) if !file_name.is_empty() => {
                files.push(UploadedFile::new(
                    form_field_name,
                    file_name,
                    FileContent::from_chunks(chunks),
                ));
            }
            _ => debug!(field = %form_field_name, "dropping non-file multipart part"),
        }
    }
    Ok(files)
}
