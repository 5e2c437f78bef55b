// components/media_downloader/src/transport.rs
use crate::error::{DownloadError, TransferError};
use crate::types::Locator;
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;

/// An open response body
pub struct TransferBody {
    /// Offset of the first byte `reader` yields
    pub start_offset: u64,
    /// Size of the complete payload, when the source reports it
    pub total_len: Option<u64>,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the payload behind `locator`, asking for bytes from `offset` on.
    /// Sources that ignore the request answer with `start_offset == 0`.
    async fn open(&self, locator: &Locator, offset: u64) -> Result<TransferBody, TransferError>;
}

/// HTTP(S) transport with ranged requests
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| DownloadError::HttpClient(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, locator: &Locator, offset: u64) -> Result<TransferBody, TransferError> {
        let mut request = self.client.get(locator.url.clone());
        for (name, value) in &locator.headers {
            if !name.eq_ignore_ascii_case(RANGE.as_str()) {
                request = request.header(name.as_str(), value.as_str());
            }
        }
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_builder() {
                TransferError::Fatal(e.to_string())
            } else {
                TransferError::Transient(e.to_string())
            }
        })?;

        let content_range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let opened = classify(response.status(), content_range.as_deref(), response.content_length(), offset)?;
        let (start_offset, total_len) = match opened {
            Opened::Body { start_offset, total_len } => (start_offset, total_len),
            Opened::Complete(total) => {
                tracing::debug!(url = %locator.url, offset, "nothing left to transfer");
                return Ok(TransferBody {
                    start_offset: total,
                    total_len: Some(total),
                    reader: Box::new(tokio::io::empty()),
                });
            }
        };

        tracing::debug!(url = %locator.url, offset, start_offset, ?total_len, "response opened");

        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));

        Ok(TransferBody {
            start_offset,
            total_len,
            reader: Box::new(StreamReader::new(Box::pin(stream))),
        })
    }
}

/// What a response means for a request starting at some offset
#[derive(Debug, PartialEq, Eq)]
enum Opened {
    Body { start_offset: u64, total_len: Option<u64> },
    /// The requested offset is already the end of the payload
    Complete(u64),
}

fn classify(
    status: StatusCode,
    content_range: Option<&str>,
    content_length: Option<u64>,
    offset: u64,
) -> Result<Opened, TransferError> {
    match status {
        StatusCode::OK => Ok(Opened::Body {
            start_offset: 0,
            total_len: content_length,
        }),
        StatusCode::PARTIAL_CONTENT => content_range
            .and_then(parse_content_range)
            .map(|(start_offset, total_len)| Opened::Body { start_offset, total_len })
            .ok_or_else(|| TransferError::Fatal("partial response without a usable Content-Range".to_string())),
        StatusCode::RANGE_NOT_SATISFIABLE
            if offset > 0 && content_range.and_then(parse_unsatisfied_range) == Some(offset) =>
        {
            Ok(Opened::Complete(offset))
        }
        s if is_transient_status(s) => Err(TransferError::Transient(format!("server responded with {s}"))),
        s => Err(TransferError::Fatal(format!("server responded with {s}"))),
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// `bytes <start>-<end>/<total>` into the start offset and the total size
fn parse_content_range(value: &str) -> Option<(u64, Option<u64>)> {
    let range = value.trim().strip_prefix("bytes")?.trim_start();
    let (span, total) = range.split_once('/')?;
    let (start, _end) = span.split_once('-')?;
    let start = start.trim().parse().ok()?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    Some((start, total))
}

/// `bytes */<total>` as sent with a 416 response
fn parse_unsatisfied_range(value: &str) -> Option<u64> {
    value
        .trim()
        .strip_prefix("bytes")?
        .trim_start()
        .strip_prefix("*/")?
        .trim()
        .parse()
        .ok()
}

/// Fetch a small payload into memory, refusing anything over `limit` bytes
pub async fn fetch_bytes(
    transport: &dyn Transport,
    locator: &Locator,
    limit: usize,
) -> Result<Vec<u8>, TransferError> {
    let body = transport.open(locator, 0).await?;
    if body.total_len.is_some_and(|len| len > limit as u64) {
        return Err(TransferError::Fatal(format!("payload larger than {limit} bytes")));
    }

    let mut bytes = Vec::new();
    body.reader
        .take(limit as u64 + 1)
        .read_to_end(&mut bytes)
        .await
        .map_err(|e| TransferError::Transient(e.to_string()))?;

    if bytes.len() > limit {
        return Err(TransferError::Fatal(format!("payload larger than {limit} bytes")));
    }
    Ok(bytes)
}

#[cfg(test)]
pub mod stub {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};
    use std::io;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    /// What the stub does for one `open` call
    #[derive(Clone)]
    pub enum Scripted {
        Refuse(TransferError),
        Serve {
            data: Vec<u8>,
            honor_range: bool,
            /// Drop the connection after this many bytes of the response
            fail_after: Option<usize>,
            /// Announce the payload size
            report_len: bool,
        },
    }

    impl Scripted {
        pub fn serve(data: &[u8]) -> Self {
            Self::Serve {
                data: data.to_vec(),
                honor_range: true,
                fail_after: None,
                report_len: true,
            }
        }

        /// Serve `data` with no size announced, like a chunked response
        pub fn without_length(data: &[u8]) -> Self {
            Self::Serve {
                data: data.to_vec(),
                honor_range: true,
                fail_after: None,
                report_len: false,
            }
        }

        pub fn transient() -> Self {
            Self::Refuse(TransferError::Transient("connection reset".to_string()))
        }

        pub fn fatal() -> Self {
            Self::Refuse(TransferError::Fatal("404 Not Found".to_string()))
        }
    }

    /// Transport answering per URL from a queue of scripted responses
    #[derive(Default)]
    pub struct TransportStub {
        scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
        opened: Mutex<Vec<(String, u64)>>,
        largest_read: Arc<AtomicUsize>,
    }

    impl TransportStub {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn script(self, url: &str, responses: impl IntoIterator<Item = Scripted>) -> Self {
            self.scripts
                .lock()
                .entry(url.to_string())
                .or_default()
                .extend(responses);
            self
        }

        /// Every `open` call as (url, requested offset)
        pub fn opened(&self) -> Vec<(String, u64)> {
            self.opened.lock().clone()
        }

        pub fn opened_urls(&self) -> Vec<String> {
            self.opened.lock().iter().map(|(url, _)| url.clone()).collect()
        }

        pub fn largest_read(&self) -> usize {
            self.largest_read.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for TransportStub {
        async fn open(&self, locator: &Locator, offset: u64) -> Result<TransferBody, TransferError> {
            let url = locator.url.to_string();
            self.opened.lock().push((url.clone(), offset));

            let next = self.scripts.lock().get_mut(&url).and_then(|queue| queue.pop_front());
            match next {
                None => Err(TransferError::Fatal(format!("nothing scripted for {url}"))),
                Some(Scripted::Refuse(error)) => Err(error),
                Some(Scripted::Serve {
                    data,
                    honor_range,
                    fail_after,
                    report_len,
                }) => {
                    let start = if honor_range { (offset as usize).min(data.len()) } else { 0 };
                    Ok(TransferBody {
                        start_offset: start as u64,
                        total_len: report_len.then_some(data.len() as u64),
                        reader: Box::new(ScriptedReader {
                            data: data[start..].to_vec(),
                            pos: 0,
                            fail_after,
                            largest_read: Arc::clone(&self.largest_read),
                        }),
                    })
                }
            }
        }
    }

    struct ScriptedReader {
        data: Vec<u8>,
        pos: usize,
        fail_after: Option<usize>,
        largest_read: Arc<AtomicUsize>,
    }

    impl AsyncRead for ScriptedReader {
        fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            self.largest_read.fetch_max(buf.remaining(), Ordering::SeqCst);

            let limit = self.fail_after.unwrap_or(self.data.len()).min(self.data.len());
            if self.pos >= limit && self.pos < self.data.len() {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset")));
            }

            let n = (limit - self.pos).min(buf.remaining());
            let start = self.pos;
            buf.put_slice(&self.data[start..start + n]);
            self.pos += n;
            Poll::Ready(Ok(()))
        }
    }
}
