use crate::{
    enums::media::MediaMode,
    utils::pipestream::{PipeStream, SharedPipe},
};
use std::{
    path::PathBuf,
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

/// where the bytes of a segment come from
pub enum MediaSource {
    /// passthrough of the original file, range requests allowed
    File(PathBuf),
    /// read end of a running producer
    Live {
        pipe: SharedPipe,
        live: Arc<AtomicBool>,
    },
}

/// what the media server serves for one playback segment.
/// Never mutated: a seek restart publishes a new descriptor.
pub struct MediaDescriptor {
    pub mode: MediaMode,
    pub title: String,
    pub needs_transcode: bool,
    pub mime_type: String,
    /// `DLNA.ORG_PN`, empty when there is none
    pub dlna_profile: String,
    pub source: MediaSource,
}

impl MediaDescriptor {
    /// served as a stream without length or seek support
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.needs_transcode || self.mode == MediaMode::Screen
    }

    #[must_use]
    pub fn profile(&self) -> Option<&str> {
        Some(self.dlna_profile.as_str()).filter(|p| !p.is_empty())
    }

    /// false once the producer behind a live source has been told to stop
    #[must_use]
    pub fn is_live(&self) -> bool {
        match &self.source {
            MediaSource::File(_) => true,
            MediaSource::Live { live, .. } => live.load(Ordering::Acquire),
        }
    }

    /// reader for a live response, `None` for files
    #[must_use]
    pub fn pipe_stream(&self) -> Option<PipeStream> {
        match &self.source {
            MediaSource::File(_) => None,
            MediaSource::Live { pipe, live } => Some(PipeStream::new(pipe.clone(), live.clone())),
        }
    }
}

/// the controller publishes, the media server takes a snapshot per request
#[derive(Default)]
pub struct DescriptorSlot {
    current: RwLock<Option<Arc<MediaDescriptor>>>,
}

impl DescriptorSlot {
    #[must_use]
    pub fn new() -> Arc<DescriptorSlot> {
        Arc::new(DescriptorSlot::default())
    }

    /// replace the served descriptor as a whole
    pub fn publish(&self, descriptor: MediaDescriptor) {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *current = Some(Arc::new(descriptor));
    }

    pub fn clear(&self) {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *current = None;
    }

    #[must_use]
    pub fn current(&self) -> Option<Arc<MediaDescriptor>> {
        self.current
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        io::{Cursor, Read},
        sync::Mutex,
    };

    fn live_descriptor(data: &[u8], live: Arc<AtomicBool>) -> MediaDescriptor {
        MediaDescriptor {
            mode: MediaMode::File,
            title: "a.mkv".to_string(),
            needs_transcode: true,
            mime_type: "video/mp2t".to_string(),
            dlna_profile: "AVC_TS_HP_HD_AAC_MULT5".to_string(),
            source: MediaSource::Live {
                pipe: Arc::new(Mutex::new(Box::new(Cursor::new(data.to_vec())))),
                live,
            },
        }
    }

    #[test]
    fn publish_replaces_wholesale() {
        let slot = DescriptorSlot::new();
        assert!(slot.current().is_none());
        let first_live = Arc::new(AtomicBool::new(true));
        slot.publish(live_descriptor(b"first", first_live.clone()));
        let first = slot.current().unwrap();
        slot.publish(live_descriptor(b"second", Arc::new(AtomicBool::new(true))));
        // a reader holding the old snapshot keeps its own pipe
        let mut out = String::new();
        first.pipe_stream().unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "first");
        let mut out = String::new();
        slot.current()
            .unwrap()
            .pipe_stream()
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "second");
        first_live.store(false, Ordering::Release);
        assert!(!first.is_live());
        slot.clear();
        assert!(slot.current().is_none());
    }

    #[test]
    fn streaming_and_profile() {
        let d = live_descriptor(b"", Arc::new(AtomicBool::new(true)));
        assert!(d.is_streaming());
        assert_eq!(d.profile(), Some("AVC_TS_HP_HD_AAC_MULT5"));
        let d = MediaDescriptor {
            mode: MediaMode::File,
            title: "b.mp4".to_string(),
            needs_transcode: false,
            mime_type: "video/mp4".to_string(),
            dlna_profile: String::new(),
            source: MediaSource::File("/tmp/b.mp4".into()),
        };
        assert!(!d.is_streaming());
        assert_eq!(d.profile(), None);
        assert!(d.pipe_stream().is_none());
    }
}
