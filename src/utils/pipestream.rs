///
/// pipestream.rs
///
/// PipeStream: the Read implementation handed to the HTTP response for live media.
/// It reads the producer's pipe and reports end-of-stream as soon as the
/// producer's liveness flag clears, so a response never outlives its segment.
///
use std::{
    io::{self, ErrorKind, Read},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

/// read end of a producer pipe, shared between the descriptor and the response being served
pub type SharedPipe = Arc<Mutex<Box<dyn Read + Send>>>;

pub struct PipeStream {
    pipe: SharedPipe,
    live: Arc<AtomicBool>,
}

impl PipeStream {
    #[must_use]
    pub fn new(pipe: SharedPipe, live: Arc<AtomicBool>) -> PipeStream {
        PipeStream { pipe, live }
    }
}

impl Read for PipeStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.live.load(Ordering::Acquire) {
            return Ok(0);
        }
        let mut pipe = self
            .pipe
            .lock()
            .map_err(|_| io::Error::other("producer pipe lock poisoned"))?;
        loop {
            match pipe.read(buf) {
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn shared(data: &[u8]) -> SharedPipe {
        Arc::new(Mutex::new(Box::new(Cursor::new(data.to_vec()))))
    }

    #[test]
    fn reads_until_pipe_eof() {
        let live = Arc::new(AtomicBool::new(true));
        let mut stream = PipeStream::new(shared(b"0123456789"), live);
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"0123456789");
    }

    #[test]
    fn stops_when_flag_clears() {
        let live = Arc::new(AtomicBool::new(true));
        let mut stream = PipeStream::new(shared(b"0123456789"), live.clone());
        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).unwrap(), 4);
        live.store(false, Ordering::Release);
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }
}
