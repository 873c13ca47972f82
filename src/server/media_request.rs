use crate::globals::statics::MEDIA_PATH;
use tiny_http::{Header, Method};

/// request line and Range header of what a client sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: Method,
    pub url: String,
    pub range: Option<String>,
}

impl RequestHead {
    /// parse the head of a request; `None` when the request line is not HTTP
    #[must_use]
    pub fn parse(raw: &[u8]) -> Option<RequestHead> {
        let text = String::from_utf8_lossy(raw);
        let head = text.split("\r\n\r\n").next().unwrap_or_default();
        let mut lines = head.lines();
        let mut request_line = lines.next()?.split_whitespace();
        let method: Method = request_line.next()?.parse().ok()?;
        let url = request_line.next()?.to_string();
        if !request_line.next()?.starts_with("HTTP/") {
            return None;
        }
        let range = lines
            .filter_map(|line| line.parse::<Header>().ok())
            .find(|h| h.field.equiv("Range"))
            .map(|h| h.value.as_str().to_string());
        Some(RequestHead { method, url, range })
    }

    #[must_use]
    pub fn media_request(&self) -> MediaRequest {
        MediaRequest::parse(&self.url, self.range.as_deref())
    }
}

/// true once `raw` holds the blank line ending a request head
#[must_use]
pub fn head_complete(raw: &[u8]) -> bool {
    raw.windows(4).any(|w| w == b"\r\n\r\n")
}

/// what a renderer asked the media server for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    /// the path starts with the media prefix; suffix and query are ignored
    pub is_media: bool,
    /// start offset of a `Range: bytes=<start>-` header
    pub range_start: Option<u64>,
}

impl MediaRequest {
    #[must_use]
    pub fn parse(url: &str, range_header: Option<&str>) -> MediaRequest {
        let path = url.split('?').next().unwrap_or_default();
        MediaRequest {
            is_media: path.starts_with(MEDIA_PATH),
            range_start: range_header.and_then(parse_range_start),
        }
    }

    /// the offset to serve from: only a start inside the file counts, 0 means the whole file
    #[must_use]
    pub fn effective_start(&self, total: u64) -> Option<u64> {
        self.range_start.filter(|&start| start > 0 && start < total)
    }
}

/// start offset of `bytes=<start>-[<end>]`; the end is ignored, suffix ranges are not supported
#[must_use]
pub fn parse_range_start(value: &str) -> Option<u64> {
    let lower = value.to_ascii_lowercase();
    let pos = lower.find("bytes=")?;
    let range = value[pos + "bytes=".len()..].trim_start();
    let digits: &str = &range[..range.find(|c: char| !c.is_ascii_digit()).unwrap_or(range.len())];
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// `Content-Range` value for a response starting at `start`
#[must_use]
pub fn content_range(start: u64, total: u64) -> String {
    format!("bytes {}-{}/{}", start, total.saturating_sub(1), total)
}
