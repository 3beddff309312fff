//! Direct-to-storage part uploads through presigned URLs.

use crate::{
    config::RetryPolicy,
    errors::{UploadError, UploadResult},
    models::multipart::CompletedPart,
    services::chunker::PartRange,
};
use bytes::{Bytes, BytesMut};
use reqwest::{Client, StatusCode, header};
use std::{io::SeekFrom, path::Path};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};
use tracing::{debug, warn};

const MAX_ERROR_BODY: usize = 512;

/// Read the bytes of one part from disk.
pub async fn read_part(path: &Path, range: PartRange) -> UploadResult<Bytes> {
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(range.offset)).await?;
    let mut buf = BytesMut::zeroed(range.len as usize);
    file.read_exact(&mut buf).await?;
    Ok(buf.freeze())
}

/// Strip the quotes storage providers put around ETags.
pub fn normalize_etag(etag: &str) -> &str {
    etag.trim().trim_start_matches("W/").trim_matches('"')
}

fn looks_like_md5(value: &str) -> bool {
    value.len() == 32 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// PUTs part bodies to presigned URLs and collects their ETags.
#[derive(Clone)]
pub struct PartUploader {
    client: Client,
    retry: RetryPolicy,
    verify_etags: bool,
}

impl PartUploader {
    pub fn new(client: Client, retry: RetryPolicy, verify_etags: bool) -> Self {
        Self {
            client,
            retry,
            verify_etags,
        }
    }

    /// Upload one part, retrying transient failures per the retry policy.
    pub async fn upload_part(
        &self,
        url: &str,
        part_number: u32,
        body: Bytes,
    ) -> UploadResult<CompletedPart> {
        let expected = self
            .verify_etags
            .then(|| format!("{:x}", md5::compute(&body)));

        let mut attempt = 1;
        loop {
            match self
                .put_once(url, part_number, body.clone(), expected.as_deref())
                .await
            {
                Ok(part) => return Ok(part),
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "part {} attempt {}/{} failed: {}; retrying in {:?}",
                        part_number, attempt, self.retry.max_attempts, err, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn put_once(
        &self,
        url: &str,
        part_number: u32,
        body: Bytes,
        expected_md5: Option<&str>,
    ) -> UploadResult<CompletedPart> {
        let len = body.len();
        let resp = self
            .client
            .put(url)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|source| UploadError::PartTransport {
                part_number,
                source,
            })?;

        let status = resp.status();
        if status == StatusCode::FORBIDDEN {
            return Err(UploadError::PresignedUrlRejected {
                part_number,
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let mut text = resp.text().await.unwrap_or_default();
            if text.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
            }
            return Err(UploadError::PartRejected {
                part_number,
                status: status.as_u16(),
                body: text,
            });
        }

        let etag = resp
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !normalize_etag(v).is_empty())
            .map(str::to_string)
            .ok_or(UploadError::MissingEtag { part_number })?;

        if let Some(expected) = expected_md5 {
            let actual = normalize_etag(&etag);
            if looks_like_md5(actual) && !actual.eq_ignore_ascii_case(expected) {
                return Err(UploadError::EtagMismatch {
                    part_number,
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }

        debug!("part {} uploaded ({} bytes), etag={}", part_number, len, etag);
        Ok(CompletedPart { part_number, etag })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_quotes_are_stripped() {
        assert_eq!(normalize_etag("\"abc\""), "abc");
        assert_eq!(normalize_etag("W/\"abc\""), "abc");
        assert_eq!(normalize_etag("abc"), "abc");
        assert_eq!(normalize_etag("\"\""), "");
    }

    #[test]
    fn md5_shape_detection() {
        assert!(looks_like_md5("5d41402abc4b2a76b9719d911017c592"));
        assert!(!looks_like_md5("5d41402abc4b2a76b9719d911017c592-3"));
        assert!(!looks_like_md5("not-an-md5"));
    }

    #[tokio::test]
    async fn reads_the_requested_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        tokio::fs::write(&path, &data).await.unwrap();

        let range = PartRange {
            part_number: 2,
            offset: 400,
            len: 400,
        };
        let part = read_part(&path, range).await.unwrap();
        assert_eq!(&part[..], &data[400..800]);
    }

    #[tokio::test]
    async fn short_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.bin");
        tokio::fs::write(&path, b"tiny").await.unwrap();

        let range = PartRange {
            part_number: 1,
            offset: 0,
            len: 10,
        };
        assert!(matches!(
            read_part(&path, range).await,
            Err(UploadError::Io(_))
        ));
    }
}
