use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng;

const BOUNDARY_LEN: usize = 30;
const DEFAULT_FILE_MIME: &str = "application/octet-stream";

/// File attached to a multipart upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileItem {
    pub file_name: String,
    pub content: Bytes,
    /// Part `Content-Type`; empty means `application/octet-stream`
    pub mime_type: String,
}

impl FileItem {
    #[must_use]
    pub fn new(
        file_name: impl Into<String>,
        content: impl Into<Bytes>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content: content.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Files without content are left out of uploads.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Random alphanumeric part boundary.
#[must_use]
pub fn generate_boundary() -> String {
    rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(BOUNDARY_LEN)
        .map(char::from)
        .collect()
}

#[must_use]
pub fn content_type(boundary: &str) -> String {
    format!("multipart/form-data; boundary={boundary}")
}

/// Encode a `multipart/form-data` body. Empty files are skipped.
#[must_use]
pub fn encode(
    boundary: &str,
    text_params: &[(&str, &str)],
    files: &[(&str, &FileItem)],
) -> Bytes {
    let mut out = BytesMut::new();

    for (name, value) in text_params {
        put_part_header(&mut out, boundary, name, None);
        out.put_slice(b"\r\n");
        out.put_slice(value.as_bytes());
        out.put_slice(b"\r\n");
    }

    for (name, file) in files.iter().filter(|(_, file)| !file.is_empty()) {
        put_part_header(&mut out, boundary, name, Some(&file.file_name));
        out.put_slice(b"Content-Type: ");
        out.put_slice(if file.mime_type.is_empty() {
            DEFAULT_FILE_MIME.as_bytes()
        } else {
            file.mime_type.as_bytes()
        });
        out.put_slice(b"\r\n\r\n");
        out.put_slice(&file.content);
        out.put_slice(b"\r\n");
    }

    out.put_slice(b"--");
    out.put_slice(boundary.as_bytes());
    out.put_slice(b"--\r\n");
    out.freeze()
}

fn put_part_header(out: &mut BytesMut, boundary: &str, name: &str, file_name: Option<&str>) {
    out.put_slice(b"--");
    out.put_slice(boundary.as_bytes());
    out.put_slice(b"\r\nContent-Disposition: form-data; name=\"");
    out.put_slice(escape_quotes(name).as_bytes());
    out.put_slice(b"\"");
    if let Some(file_name) = file_name {
        out.put_slice(b"; filename=\"");
        out.put_slice(escape_quotes(file_name).as_bytes());
        out.put_slice(b"\"");
    }
    out.put_slice(b"\r\n");
}

fn escape_quotes(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
