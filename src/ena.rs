use std::fs;
use std::io::{self, Read, Write};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::Compression;
use flate2::write::GzEncoder;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use tracing::debug;

use crate::domain::Accession;
use crate::error::PipelineError;
use crate::project::Project;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub trait SequenceClient: Send + Sync {
    fn download_record(&self, accession: &Accession, sink: &mut dyn Write)
    -> Result<u64, PipelineError>;
}

#[derive(Clone)]
pub struct EnaHttpClient {
    client: Client,
    base_url: String,
}

pub(crate) fn build_http_client(timeout_secs: u64) -> Result<Client, PipelineError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("rfam-genome-pipeline/{}", env!("CARGO_PKG_VERSION")))
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?,
    );
    Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|err| PipelineError::ResolveHttp(err.to_string()))
}

impl EnaHttpClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_http_client(timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn record_url(&self, accession: &Accession) -> String {
        format!(
            "{}/fasta/{}?download=true&gzip=true",
            self.base_url,
            accession.as_str()
        )
    }
}

impl SequenceClient for EnaHttpClient {
    fn download_record(
        &self,
        accession: &Accession,
        sink: &mut dyn Write,
    ) -> Result<u64, PipelineError> {
        let url = self.record_url(accession);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| PipelineError::FetchHttp {
                accession: accession.to_string(),
                message: err.to_string(),
            })?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "ENA request failed".to_string());
            return Err(PipelineError::FetchStatus {
                accession: accession.to_string(),
                status,
                message,
            });
        }
        copy_as_gzip(response, sink).map_err(|err| PipelineError::FetchHttp {
            accession: accession.to_string(),
            message: err.to_string(),
        })
    }
}

/// Copies `body` to `sink`, compressing it on the way unless it already
/// starts with the gzip magic bytes. The magic is read across as many short
/// reads as it takes.
pub fn copy_as_gzip<R: Read>(mut body: R, sink: &mut dyn Write) -> io::Result<u64> {
    let mut head = [0u8; GZIP_MAGIC.len()];
    let mut filled = 0;
    while filled < head.len() {
        match body.read(&mut head[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    if filled == 0 {
        return Ok(0);
    }

    let mut reader = io::Cursor::new(&head[..filled]).chain(body);
    if head[..filled] == GZIP_MAGIC {
        return io::copy(&mut reader, sink);
    }
    let mut counter = CountingWriter { inner: sink, written: 0 };
    {
        let mut encoder = GzEncoder::new(&mut counter, Compression::default());
        io::copy(&mut reader, &mut encoder)?;
        encoder.finish()?;
    }
    Ok(counter.written)
}

struct CountingWriter<'a> {
    inner: &'a mut dyn Write,
    written: u64,
}

impl Write for CountingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FetchOutcome {
    Downloaded { path: String, bytes: u64 },
    AlreadyPresent { path: String },
}

/// Fetches one record into `{destination}/{accession}.fa.gz`. An existing
/// file is never touched and no request is made for it. The download lands
/// in a hidden temp file first, so a failed fetch leaves nothing behind.
pub fn fetch_accession<C: SequenceClient + ?Sized>(
    client: &C,
    accession: &Accession,
    destination: &Utf8Path,
) -> Result<FetchOutcome, PipelineError> {
    let target: Utf8PathBuf = Project::record_path(destination, accession);
    if target.as_std_path().exists() {
        debug!(path = %target, "record already present");
        return Ok(FetchOutcome::AlreadyPresent {
            path: target.to_string(),
        });
    }

    fs::create_dir_all(destination.as_std_path()).map_err(|err| PipelineError::Directory {
        path: destination.to_string(),
        message: err.to_string(),
    })?;
    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{}", accession.as_str()))
        .suffix(".partial")
        .tempfile_in(destination.as_std_path())
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;

    let bytes = client.download_record(accession, temp.as_file_mut())?;
    if bytes == 0 {
        return Err(PipelineError::EmptyResponse(accession.to_string()));
    }
    temp.as_file_mut()
        .sync_all()
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    temp.persist(target.as_std_path())
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    debug!(path = %target, bytes, "record downloaded");

    Ok(FetchOutcome::Downloaded {
        path: target.to_string(),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;

    use super::*;

    #[test]
    fn plain_body_gets_compressed() {
        let mut out = Vec::new();
        let written = copy_as_gzip(&b">seq\nACGT\n"[..], &mut out).unwrap();
        assert_eq!(written as usize, out.len());
        assert!(out.starts_with(&GZIP_MAGIC));
        let mut text = String::new();
        GzDecoder::new(&out[..]).read_to_string(&mut text).unwrap();
        assert_eq!(text, ">seq\nACGT\n");
    }

    #[test]
    fn gzip_body_passes_through() {
        let mut compressed = Vec::new();
        copy_as_gzip(&b">x\nA\n"[..], &mut compressed).unwrap();
        let mut out = Vec::new();
        copy_as_gzip(&compressed[..], &mut out).unwrap();
        assert_eq!(out, compressed);
    }

    struct OneByteReader<'a>(&'a [u8]);

    impl Read for OneByteReader<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let Some((first, rest)) = self.0.split_first() else {
                return Ok(0);
            };
            if buf.is_empty() {
                return Ok(0);
            }
            buf[0] = *first;
            self.0 = rest;
            Ok(1)
        }
    }

    #[test]
    fn short_reads_do_not_compress_twice() {
        let mut compressed = Vec::new();
        copy_as_gzip(&b">x\nACGU\n"[..], &mut compressed).unwrap();

        let mut out = Vec::new();
        let written = copy_as_gzip(OneByteReader(&compressed), &mut out).unwrap();
        assert_eq!(written as usize, compressed.len());
        assert_eq!(out, compressed);

        let mut plain = Vec::new();
        copy_as_gzip(OneByteReader(b">y\nGG\n"), &mut plain).unwrap();
        let mut text = String::new();
        GzDecoder::new(&plain[..]).read_to_string(&mut text).unwrap();
        assert_eq!(text, ">y\nGG\n");
    }

    #[test]
    fn single_byte_body_is_compressed() {
        let mut out = Vec::new();
        copy_as_gzip(&b"A"[..], &mut out).unwrap();
        let mut text = String::new();
        GzDecoder::new(&out[..]).read_to_string(&mut text).unwrap();
        assert_eq!(text, "A");
    }

    #[test]
    fn empty_body_writes_nothing() {
        let mut out = Vec::new();
        assert_eq!(copy_as_gzip(&b""[..], &mut out).unwrap(), 0);
        assert!(out.is_empty());
    }
}
