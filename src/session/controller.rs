///
/// controller.rs
///
/// The playback session: negotiate each item, serve it, drive the renderer and
/// react to user commands until the playlist is done or the user quits.
///
/// Resources of a playing item live in an `ActiveItem` whose drop stops the
/// renderer before the producer goes away. The media server is owned by
/// `PlaybackSession::run` and outlives every item, so teardown always runs
/// renderer, producer, server.
///
use crate::{
    dlna::{
        compat::decide_transcode,
        features::{derive_dlna_profile, derive_mime_type, transcode_profile},
    },
    enums::{
        errors::{ProducerError, ServerError, SessionError},
        media::{CodecChoice, MediaMode, TranscodeCodec},
        messages::UserCommand,
    },
    globals::statics::{MEDIA_PATH, PLAYBACK_TICK_MS},
    media::{
        descriptor::{DescriptorSlot, MediaDescriptor, MediaSource},
        probe::MediaProbe,
        producer::{Producer, ProducerConfig, ProducerFactory, ProducerSource},
    },
    server::media_server::MediaServer,
    upnp::avtransport::{AvTransportControl, CapabilitySet},
    utils::{
        cancel::CancelToken,
        ui_logger::{LogCategory, ui_log},
    },
};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::debug;
use std::{
    cell::OnceCell,
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

/// renderer state is polled every this many ticks
const POLL_EVERY_TICKS: u32 = 4;
/// consecutive failed polls before the control channel is given up
const MAX_POLL_FAILURES: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Resolving,
    Negotiating,
    Serving,
    Playing,
    SeekRestart,
    Stopping,
}

/// what to play
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackTarget {
    Files(Vec<PathBuf>),
    Screen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// our address as seen from the renderer, used in the media url
    pub local_addr: IpAddr,
    pub codec_choice: CodecChoice,
    pub force_transcode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Finished,
    Next,
    Quit,
}

/// a negotiated playlist item
#[derive(Debug, Clone)]
struct PreparedItem {
    index: usize,
    title: String,
    source: ProducerSource,
    needs_transcode: bool,
    mime_type: String,
    dlna_profile: String,
    codec: TranscodeCodec,
    duration: Option<u32>,
}

impl PreparedItem {
    fn mode(&self) -> MediaMode {
        match self.source {
            ProducerSource::File(_) => MediaMode::File,
            ProducerSource::Screen => MediaMode::Screen,
        }
    }

    fn producer_config(&self, start_secs: u32) -> ProducerConfig {
        ProducerConfig {
            source: self.source.clone(),
            start_secs,
            codec: self.codec,
        }
    }
}

/// the resources of the item being played
struct ActiveItem<'r, R: AvTransportControl> {
    renderer: &'r R,
    slot: Arc<DescriptorSlot>,
    uri: String,
    mime_type: String,
    dlna_profile: String,
    streaming: bool,
    /// source offset the current segment started at
    segment_start: u32,
    /// last position reported by the renderer, relative to the segment
    last_position: u32,
    seen_playing: bool,
    producer: Option<Producer>,
}

impl<'r, R: AvTransportControl> ActiveItem<'r, R> {
    fn new(renderer: &'r R, slot: Arc<DescriptorSlot>, uri: String) -> Self {
        ActiveItem {
            renderer,
            slot,
            uri,
            mime_type: String::new(),
            dlna_profile: String::new(),
            streaming: false,
            segment_start: 0,
            last_position: 0,
            seen_playing: false,
            producer: None,
        }
    }

    /// publish the descriptor for a segment; a producer's pipe is in hand before the server can see it
    fn publish(
        &mut self,
        item: &PreparedItem,
        producer: Option<Producer>,
    ) -> Result<(), ProducerError> {
        let (source, mime_type, dlna_profile) = match producer {
            Some(mut producer) => {
                let pipe = producer.take_pipe().ok_or(ProducerError::NoPipe)?;
                let source = MediaSource::Live {
                    pipe: Arc::new(Mutex::new(pipe)),
                    live: producer.running_flag(),
                };
                let mime_type = producer.mime_type().to_string();
                let dlna_profile = producer.dlna_profile().to_string();
                self.producer = Some(producer);
                (source, mime_type, dlna_profile)
            }
            None => match &item.source {
                ProducerSource::File(path) => (
                    MediaSource::File(path.clone()),
                    item.mime_type.clone(),
                    item.dlna_profile.clone(),
                ),
                ProducerSource::Screen => return Err(ProducerError::NoPipe),
            },
        };
        let descriptor = MediaDescriptor {
            mode: item.mode(),
            title: item.title.clone(),
            needs_transcode: item.needs_transcode,
            mime_type: mime_type.clone(),
            dlna_profile: dlna_profile.clone(),
            source,
        };
        self.streaming = descriptor.is_streaming();
        self.mime_type = mime_type;
        self.dlna_profile = dlna_profile;
        self.slot.publish(descriptor);
        Ok(())
    }

    fn stop_producer(&mut self) {
        if let Some(mut producer) = self.producer.take() {
            producer.stop();
        }
    }

    /// position in the source, across seek restarts
    fn logical_position(&self) -> u32 {
        self.segment_start.saturating_add(self.last_position)
    }
}

impl<R: AvTransportControl> Drop for ActiveItem<'_, R> {
    fn drop(&mut self) {
        if let Err(e) = self.renderer.stop() {
            debug!("Stop at end of item: {e}");
        }
        self.stop_producer();
        self.slot.clear();
    }
}

/// one playback session against one renderer
pub struct PlaybackSession<'a, R, F, P>
where
    R: AvTransportControl,
    F: ProducerFactory,
    P: MediaProbe,
{
    renderer: &'a R,
    factory: &'a F,
    probe: &'a P,
    options: SessionOptions,
    commands: Receiver<UserCommand>,
    cancel: CancelToken,
    slot: Arc<DescriptorSlot>,
    capabilities: OnceCell<Option<CapabilitySet>>,
    state: SessionState,
}

impl<'a, R, F, P> PlaybackSession<'a, R, F, P>
where
    R: AvTransportControl,
    F: ProducerFactory,
    P: MediaProbe,
{
    #[must_use]
    pub fn new(
        renderer: &'a R,
        factory: &'a F,
        probe: &'a P,
        options: SessionOptions,
        commands: Receiver<UserCommand>,
        cancel: CancelToken,
    ) -> Self {
        PlaybackSession {
            renderer,
            factory,
            probe,
            options,
            commands,
            cancel,
            slot: DescriptorSlot::new(),
            capabilities: OnceCell::new(),
            state: SessionState::Idle,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!("session {:?} -> {state:?}", self.state);
            self.state = state;
        }
    }

    /// play `target`; `start_server` is called once, after the first item negotiated
    pub fn run<S>(&mut self, target: PlaybackTarget, start_server: S) -> Result<(), SessionError>
    where
        S: FnOnce(Arc<DescriptorSlot>) -> Result<MediaServer, ServerError>,
    {
        let sources: Vec<ProducerSource> = match target {
            PlaybackTarget::Files(files) => files.into_iter().map(ProducerSource::File).collect(),
            PlaybackTarget::Screen => vec![ProducerSource::Screen],
        };
        let Some(first) = sources.first() else {
            return Err(SessionError::EmptyPlaylist);
        };
        let result = self.run_items(&sources, first, start_server);
        self.set_state(SessionState::Idle);
        result
    }

    fn run_items<S>(
        &mut self,
        sources: &[ProducerSource],
        first: &ProducerSource,
        start_server: S,
    ) -> Result<(), SessionError>
    where
        S: FnOnce(Arc<DescriptorSlot>) -> Result<MediaServer, ServerError>,
    {
        self.set_state(SessionState::Negotiating);
        let mut prepared = Some(self.negotiate(0, first)?);
        self.set_state(SessionState::Serving);
        let server = start_server(self.slot.clone())?;
        let media_base = format!(
            "http://{}{MEDIA_PATH}",
            SocketAddr::new(self.options.local_addr, server.port())
        );
        debug!("media url base {media_base}");

        for (index, source) in sources.iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            let item = match prepared.take() {
                Some(item) => Ok(item),
                None => {
                    self.set_state(SessionState::Negotiating);
                    self.negotiate(index, source)
                }
            };
            match item.and_then(|item| self.play_item(&item, &media_base)) {
                Ok(ItemOutcome::Quit) => break,
                Ok(ItemOutcome::Finished | ItemOutcome::Next) => {}
                Err(e) if index > 0 && e.is_item_local() => {
                    ui_log(LogCategory::Warning, &format!("Skipping item {}: {e}", index + 1));
                }
                Err(e) => {
                    self.set_state(SessionState::Stopping);
                    return Err(e);
                }
            }
        }
        self.set_state(SessionState::Stopping);
        self.slot.clear();
        drop(server);
        Ok(())
    }

    /// the transcode codec, asking the renderer at most once per session
    fn transcode_codec(&self) -> TranscodeCodec {
        match self.options.codec_choice {
            CodecChoice::H264 => TranscodeCodec::H264,
            CodecChoice::Hevc => TranscodeCodec::Hevc,
            CodecChoice::Auto => self
                .capabilities
                .get_or_init(|| self.renderer.capabilities())
                .as_ref()
                .map_or(TranscodeCodec::H264, CapabilitySet::preferred_codec),
        }
    }

    fn negotiate(&self, index: usize, source: &ProducerSource) -> Result<PreparedItem, SessionError> {
        let ProducerSource::File(path) = source else {
            let codec = self.transcode_codec();
            let (mime_type, dlna_profile) = transcode_profile(codec);
            return Ok(PreparedItem {
                index,
                title: "Screen".to_string(),
                source: ProducerSource::Screen,
                needs_transcode: true,
                mime_type: mime_type.to_string(),
                dlna_profile: dlna_profile.to_string(),
                codec,
                duration: None,
            });
        };
        let info = self
            .probe
            .probe(path)
            .map_err(|source| SessionError::Negotiation {
                path: path.clone(),
                source,
            })?;
        let container = info.container.as_deref();
        let needs_transcode =
            decide_transcode(info.video, info.audio, container, self.options.force_transcode);
        let (codec, mime_type, dlna_profile) = if needs_transcode {
            let codec = self.transcode_codec();
            let (mime_type, dlna_profile) = transcode_profile(codec);
            (codec, mime_type, dlna_profile)
        } else {
            (
                TranscodeCodec::H264,
                derive_mime_type(container, info.video),
                derive_dlna_profile(container, info.video),
            )
        };
        let title = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        debug!(
            "{title}: {info:?}, transcode: {needs_transcode}, {mime_type} '{dlna_profile}'"
        );
        Ok(PreparedItem {
            index,
            title,
            source: source.clone(),
            needs_transcode,
            mime_type: mime_type.to_string(),
            dlna_profile: dlna_profile.to_string(),
            codec,
            duration: info.duration_secs(),
        })
    }

    fn push_uri(&self, active: &ActiveItem<'_, R>, title: &str) -> Result<(), SessionError> {
        self.renderer.set_av_transport_uri(
            &active.uri,
            &active.mime_type,
            title,
            active.streaming,
            Some(active.dlna_profile.as_str()).filter(|p| !p.is_empty()),
        )?;
        self.renderer.play()?;
        Ok(())
    }

    fn play_item(&mut self, item: &PreparedItem, media_base: &str) -> Result<ItemOutcome, SessionError> {
        self.set_state(SessionState::Serving);
        let uri = format!("{media_base}?item={}", item.index);
        let mut active = ActiveItem::new(self.renderer, self.slot.clone(), uri);
        let producer = if item.needs_transcode {
            Some(self.factory.start(&item.producer_config(0))?)
        } else {
            None
        };
        active.publish(item, producer)?;
        ui_log(
            LogCategory::Info,
            &format!(
                "Playing '{}'{}",
                item.title,
                if item.needs_transcode { " (transcoding)" } else { "" }
            ),
        );
        self.push_uri(&active, &item.title)?;
        self.set_state(SessionState::Playing);
        self.playing_loop(item, &mut active)
    }

    fn playing_loop(
        &mut self,
        item: &PreparedItem,
        active: &mut ActiveItem<'_, R>,
    ) -> Result<ItemOutcome, SessionError> {
        let tick = Duration::from_millis(PLAYBACK_TICK_MS);
        let mut ticks = 0u32;
        let mut poll_failures = 0u32;
        let mut input_closed = false;
        loop {
            if self.cancel.is_cancelled() {
                return Ok(ItemOutcome::Quit);
            }
            let command = if input_closed {
                thread::sleep(tick);
                None
            } else {
                match self.commands.recv_timeout(tick) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => {
                        input_closed = true;
                        None
                    }
                }
            };
            match command {
                Some(UserCommand::Quit) => return Ok(ItemOutcome::Quit),
                Some(UserCommand::Next) => return Ok(ItemOutcome::Next),
                Some(UserCommand::Seek(delta)) => {
                    self.seek(item, active, delta)?;
                    ticks = 0;
                    continue;
                }
                None => {}
            }
            ticks += 1;
            if ticks % POLL_EVERY_TICKS != 0 {
                continue;
            }
            match self.poll_renderer(active) {
                Ok(true) => {
                    ui_log(LogCategory::Info, &format!("Finished '{}'", item.title));
                    return Ok(ItemOutcome::Finished);
                }
                Ok(false) => poll_failures = 0,
                Err(e) => {
                    poll_failures += 1;
                    debug!("poll {poll_failures}/{MAX_POLL_FAILURES} failed: {e}");
                    if poll_failures >= MAX_POLL_FAILURES {
                        return Err(e);
                    }
                }
            }
        }
    }

    /// true when the renderer went from playing to idle
    fn poll_renderer(&self, active: &mut ActiveItem<'_, R>) -> Result<bool, SessionError> {
        let state = self.renderer.transport_state()?;
        if let Ok(position) = self.renderer.position() {
            active.last_position = position;
        }
        debug!(
            "renderer {state:?} at {}s",
            active.logical_position()
        );
        if state.is_active() {
            active.seen_playing = true;
            Ok(false)
        } else {
            Ok(active.seen_playing && state.is_idle())
        }
    }

    fn seek(
        &mut self,
        item: &PreparedItem,
        active: &mut ActiveItem<'_, R>,
        delta: i32,
    ) -> Result<(), SessionError> {
        if !active.streaming {
            debug!("seek {delta:+}s on the renderer");
            self.renderer.seek_relative(delta)?;
            return Ok(());
        }
        self.set_state(SessionState::SeekRestart);
        if let Ok(position) = self.renderer.position() {
            active.last_position = position;
        }
        let mut target = (i64::from(active.logical_position()) + i64::from(delta)).max(0);
        if let Some(duration) = item.duration {
            target = target.min(i64::from(duration.saturating_sub(1)));
        }
        let target = u32::try_from(target).unwrap_or(0);
        ui_log(
            LogCategory::Info,
            &format!(
                "Restarting '{}' at {}s",
                item.title, target
            ),
        );
        self.renderer.stop()?;
        active.stop_producer();
        let producer = self.factory.start(&item.producer_config(target))?;
        active.publish(item, Some(producer))?;
        self.push_uri(active, &item.title)?;
        active.segment_start = target;
        active.last_position = 0;
        active.seen_playing = false;
        self.set_state(SessionState::Playing);
        Ok(())
    }
}
