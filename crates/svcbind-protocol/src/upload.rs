//! File-upload records produced in file-upload mode.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Bytes;
use futures_util::Stream;
use serde::Serialize;
use tokio::io::{AsyncRead, ReadBuf};

/// Content of one uploaded file part, readable either as an [`AsyncRead`] or
/// as a [`Stream`] of chunks.
#[derive(Default)]
pub struct FileContent {
    chunks: VecDeque<Bytes>,
}

impl FileContent {
    pub fn from_chunks(chunks: impl IntoIterator<Item = Bytes>) -> Self {
        Self {
            chunks: chunks.into_iter().filter(|chunk| !chunk.is_empty()).collect(),
        }
    }

    /// Bytes not yet read.
    pub fn len(&self) -> usize {
        self.chunks.iter().map(Bytes::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        if self.chunks.len() == 1 {
            return self.chunks.into_iter().next().unwrap_or_default();
        }
        let mut joined = Vec::with_capacity(self.len());
        for chunk in self.chunks {
            joined.extend_from_slice(&chunk);
        }
        Bytes::from(joined)
    }
}

impl fmt::Debug for FileContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileContent")
            .field("remaining", &self.len())
            .finish()
    }
}

impl Stream for FileContent {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.get_mut().chunks.pop_front().map(Ok))
    }
}

impl AsyncRead for FileContent {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some(front) = this.chunks.front_mut() {
            let take = front.len().min(buf.remaining());
            buf.put_slice(&front.split_to(take));
            if front.is_empty() {
                this.chunks.pop_front();
            }
        }
        Poll::Ready(Ok(()))
    }
}

/// One multipart part that carried a file name.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub form_field_name: String,
    pub file_name: String,
    #[serde(skip)]
    pub content: FileContent,
}

impl UploadedFile {
    pub fn new(
        form_field_name: impl Into<String>,
        file_name: impl Into<String>,
        content: FileContent,
    ) -> Self {
        Self {
            form_field_name: form_field_name.into(),
            file_name: file_name.into(),
            content,
        }
    }
}

/// The whole bound argument of a file-upload route.
#[derive(Debug, Default, Serialize)]
#[serde(transparent)]
pub struct UploadedFiles(pub Vec<UploadedFile>);

impl Deref for UploadedFiles {
    type Target = Vec<UploadedFile>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for UploadedFiles {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl IntoIterator for UploadedFiles {
    type Item = UploadedFile;
    type IntoIter = std::vec::IntoIter<UploadedFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
