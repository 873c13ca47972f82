use crate::{
    dlna::features::build_feature_string,
    enums::errors::ServerError,
    globals::statics::{
        APP_NAME, APP_VERSION, CLOSE_LINGER_MS, IO_BUFFER_SIZE, MEDIA_PATH, REQUEST_BUFFER_SIZE,
        REQUEST_TIMEOUT_MS, SERVER_POLL_MS, THREAD_STACK,
    },
    media::descriptor::{DescriptorSlot, MediaDescriptor, MediaSource},
    server::media_request::{MediaRequest, RequestHead, content_range, head_complete},
    utils::ui_logger::{LogCategory, ui_log},
};
use log::debug;
use std::{
    fs::File,
    io::{self, BufWriter, Read, Seek, SeekFrom, Write},
    net::{Shutdown, SocketAddr, TcpListener, TcpStream},
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tiny_http::{Header, Method, StatusCode};

const NOT_FOUND: &str = "Not Found";
const NOT_ALLOWED: &str = "Method Not Allowed";

/// the media server: one listening socket, one connection served at a time
/// from whatever descriptor the controller has published.
/// Every connection carries exactly one response and is closed by the server.
/// Dropping it stops the serve loop and joins its thread.
pub struct MediaServer {
    addr: SocketAddr,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MediaServer {
    /// `start` - bind and start serving; the server is accepting once this returns
    pub fn start(bind: SocketAddr, slot: Arc<DescriptorSlot>) -> Result<MediaServer, ServerError> {
        let bind_error = |e: io::Error| ServerError::Bind {
            addr: bind.to_string(),
            reason: e.to_string(),
        };
        let listener = TcpListener::bind(bind).map_err(bind_error)?;
        listener.set_nonblocking(true).map_err(bind_error)?;
        let addr = listener.local_addr().map_err(bind_error)?;
        let running = Arc::new(AtomicBool::new(true));
        let running_c = running.clone();
        let handle = thread::Builder::new()
            .name("media_server".into())
            .stack_size(THREAD_STACK)
            .spawn(move || run_server(&listener, &slot, &running_c))?;
        debug!("media server listening on {addr}");
        Ok(MediaServer {
            addr,
            running,
            handle: Some(handle),
        })
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// stop serving and wait for the connection in progress to end
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                debug!("media server thread panicked");
            }
            debug!("media server stopped");
        }
    }
}

impl Drop for MediaServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// `run_server` - serve until the running flag clears, polling so shutdown is noticed
fn run_server(listener: &TcpListener, slot: &DescriptorSlot, running: &AtomicBool) {
    while running.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, remote)) => handle_connection(&stream, &remote.to_string(), slot),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(SERVER_POLL_MS));
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                ui_log(
                    LogCategory::Error,
                    &format!("Media server stopped accepting connections: {e}"),
                );
                break;
            }
        }
    }
}

/// read the request head, answer it, close the connection
fn handle_connection(stream: &TcpStream, remote: &str, slot: &DescriptorSlot) {
    let raw = stream
        .set_nonblocking(false)
        .and_then(|()| stream.set_read_timeout(Some(Duration::from_millis(REQUEST_TIMEOUT_MS))))
        .and_then(|()| read_head(stream));
    match raw {
        Ok(raw) => {
            let mut writer = BufWriter::with_capacity(IO_BUFFER_SIZE, stream);
            let result = handle_request(&mut writer, RequestHead::parse(&raw), slot, remote)
                .and_then(|()| writer.flush());
            if let Err(e) = result {
                debug!("=>Http connection with {remote} terminated [{e}]");
            }
        }
        Err(e) => debug!("no request from {remote}: {e}"),
    }
    close(stream, remote);
}

/// one read may not hold the whole head, stop at its end or when the buffer is full
fn read_head(mut stream: &TcpStream) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; REQUEST_BUFFER_SIZE];
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
        if head_complete(&buf[..filled]) {
            break;
        }
    }
    buf.truncate(filled);
    Ok(buf)
}

/// end of response: FIN to the client, then discard its unread input for a moment
/// so the close does not turn into a reset
fn close(mut stream: &TcpStream, remote: &str) {
    if let Err(e) = stream.shutdown(Shutdown::Write) {
        debug!("closing connection with {remote}: {e}");
        return;
    }
    let linger = Duration::from_millis(CLOSE_LINGER_MS);
    if stream.set_read_timeout(Some(linger)).is_err() {
        return;
    }
    let deadline = Instant::now() + linger;
    let mut sink = [0u8; 1024];
    while Instant::now() < deadline {
        match stream.read(&mut sink) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
    }
}

/// dump the request head
#[cfg(debug_assertions)]
fn dump_rq_head(head: &RequestHead) {
    if let Some(range) = &head.range {
        debug!(" <== Request Range: {range}");
    }
}

fn handle_request<W: Write>(
    w: &mut W,
    head: Option<RequestHead>,
    slot: &DescriptorSlot,
    remote: &str,
) -> io::Result<()> {
    let Some(head) = head else {
        debug!("malformed request from {remote}");
        return bad_request(w, "", false);
    };
    debug!("{} {} from {remote}", head.method, head.url);
    #[cfg(debug_assertions)]
    dump_rq_head(&head);
    let is_head = match head.method {
        Method::Get => false,
        Method::Head => true,
        _ => return invalid_request(w, &head.method, remote),
    };
    let media_rq = head.media_request();
    if !media_rq.is_media {
        return bad_request(w, &head.url, is_head);
    }
    let Some(descriptor) = slot.current() else {
        debug!("nothing published yet");
        return bad_request(w, &head.url, is_head);
    };
    match &descriptor.source {
        MediaSource::File(path) => file_request(w, &descriptor, path, &media_rq, is_head, remote),
        MediaSource::Live { .. } => live_request(w, &descriptor, is_head, remote),
    }
}

/// passthrough of the original file, with byte range support
fn file_request<W: Write>(
    w: &mut W,
    descriptor: &MediaDescriptor,
    path: &Path,
    media_rq: &MediaRequest,
    is_head: bool,
    remote: &str,
) -> io::Result<()> {
    let (mut file, total) = match File::open(path).and_then(|f| {
        let len = f.metadata()?.len();
        Ok((f, len))
    }) {
        Ok(opened) => opened,
        Err(e) => {
            debug!("{}: {e}", path.display());
            return bad_request(w, MEDIA_PATH, is_head);
        }
    };
    let start = media_rq.effective_start(total);
    let mut headers = get_dlna_headers(descriptor);
    headers.extend(headers_from(&[("Accept-Ranges", "bytes")]));
    let (status, remaining) = match start {
        Some(start) => {
            headers.extend(headers_from(&[("Content-Range", &content_range(start, total))]));
            (206, total - start)
        }
        None => (200, total),
    };
    if is_head {
        return write_head(w, status, &headers, Some(remaining));
    }
    if let Some(start) = start
        && let Err(e) = file.seek(SeekFrom::Start(start))
    {
        debug!("{}: seek to {start} failed: {e}", path.display());
        return bad_request(w, MEDIA_PATH, is_head);
    }
    ui_log(
        LogCategory::Info,
        &format!(
            "Serving '{}' to {remote} from byte {}",
            descriptor.title,
            start.unwrap_or(0)
        ),
    );
    write_head(w, status, &headers, Some(remaining))?;
    io::copy(&mut file.take(remaining), w)?;
    Ok(())
}

/// the producer's output, length unknown, no ranges; the body ends when the connection closes
fn live_request<W: Write>(
    w: &mut W,
    descriptor: &MediaDescriptor,
    is_head: bool,
    remote: &str,
) -> io::Result<()> {
    let headers = get_dlna_headers(descriptor);
    if is_head {
        return write_head(w, 200, &headers, None);
    }
    let Some(mut stream) = descriptor.pipe_stream().filter(|_| descriptor.is_live()) else {
        return bad_request(w, MEDIA_PATH, is_head);
    };
    ui_log(
        LogCategory::Info,
        &format!("Streaming '{}' to {remote}", descriptor.title),
    );
    write_head(w, 200, &headers, None)?;
    io::copy(&mut stream, w)?;
    Ok(())
}

/// invalid METHOD request
fn invalid_request<W: Write>(w: &mut W, method: &Method, remote: &str) -> io::Result<()> {
    debug!("Unsupported HTTP method {method} from {remote}");
    let mut headers = get_error_headers();
    headers.extend(headers_from(&[("Allow", "GET, HEAD")]));
    write_head(w, 405, &headers, Some(NOT_ALLOWED.len() as u64))?;
    w.write_all(NOT_ALLOWED.as_bytes())
}

/// this request is not recognized, reject with an error 404
fn bad_request<W: Write>(w: &mut W, url: &str, is_head: bool) -> io::Result<()> {
    debug!("Unrecognized request '{url}'");
    write_head(w, 404, &get_error_headers(), Some(NOT_FOUND.len() as u64))?;
    if is_head {
        return Ok(());
    }
    w.write_all(NOT_FOUND.as_bytes())
}

/// status line, headers and the blank line; no length means the body runs until close
fn write_head<W: Write>(
    w: &mut W,
    status: u16,
    headers: &[Header],
    length: Option<u64>,
) -> io::Result<()> {
    let status = StatusCode(status);
    write!(w, "HTTP/1.1 {} {}\r\n", status.0, status.default_reason_phrase())?;
    for header in headers {
        write!(w, "{header}\r\n")?;
    }
    if let Some(length) = length {
        write!(w, "Content-Length: {length}\r\n")?;
    }
    w.write_all(b"\r\n")
}

/// build the header list, ill-formed values are dropped
fn headers_from(pairs: &[(&str, &str)]) -> Vec<Header> {
    pairs
        .iter()
        .filter_map(|(field, value)| Header::from_bytes(field.as_bytes(), value.as_bytes()).ok())
        .collect()
}

/// get the standard headers
fn get_std_headers() -> Vec<Header> {
    let server = format!("{APP_NAME}/{APP_VERSION}");
    headers_from(&[("Server", &server), ("Connection", "close")])
}

/// get the dlna headers for a descriptor
fn get_dlna_headers(descriptor: &MediaDescriptor) -> Vec<Header> {
    let features = build_feature_string(descriptor.profile(), descriptor.is_streaming());
    let mut headers = get_std_headers();
    headers.extend(headers_from(&[
        ("Content-Type", &descriptor.mime_type),
        ("transferMode.dlna.org", "Streaming"),
        ("contentFeatures.dlna.org", &features),
    ]));
    headers
}

/// headers of 404/405 responses
fn get_error_headers() -> Vec<Header> {
    let features = build_feature_string(None, false);
    let mut headers = get_std_headers();
    headers.extend(headers_from(&[
        ("Content-Type", "text/plain"),
        ("transferMode.dlna.org", "Streaming"),
        ("contentFeatures.dlna.org", &features),
    ]));
    headers
}
