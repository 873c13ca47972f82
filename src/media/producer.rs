///
/// producer.rs
///
/// The producer: a background encoder whose output the media server streams.
///
/// A `Producer` owns one run of the encoder. Its pipe is handed to the
/// descriptor once, its running flag doubles as the descriptor's liveness flag,
/// and stopping it clears the flag and joins the thread, so no two producers of
/// one session ever write at the same time.
///
use crate::{
    dlna::features::transcode_profile,
    enums::{errors::ProducerError, media::TranscodeCodec},
    globals::statics::THREAD_STACK,
    utils::{
        configuration::ScreenConfig,
        ui_logger::{LogCategory, ui_log},
    },
};
use log::{debug, log_enabled};
use std::{
    ffi::OsString,
    io::Read,
    path::PathBuf,
    process::{Child, Command, Stdio},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

const MONITOR_POLL: Duration = Duration::from_millis(100);
const STOP_TIMEOUT: Duration = Duration::from_secs(2);
/// a capture that survives this long has its inputs
const WARMUP: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProducerSource {
    File(PathBuf),
    Screen,
}

/// immutable startup parameters of one producer run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerConfig {
    pub source: ProducerSource,
    /// encoding starts at this offset into the source, ignored for the screen
    pub start_secs: u32,
    pub codec: TranscodeCodec,
}

pub trait ProducerFactory {
    fn start(&self, config: &ProducerConfig) -> Result<Producer, ProducerError>;
}

/// handle of a running producer
pub struct Producer {
    mime_type: String,
    dlna_profile: String,
    pipe: Option<Box<dyn Read + Send>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Producer {
    /// start `run` on its own thread; it must return soon after the flag it gets clears
    pub fn spawn<F>(
        name: &str,
        pipe: Box<dyn Read + Send>,
        mime_type: &str,
        dlna_profile: &str,
        run: F,
    ) -> Result<Producer, ProducerError>
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let running_c = running.clone();
        let handle = thread::Builder::new()
            .name(name.into())
            .stack_size(THREAD_STACK)
            .spawn(move || run(running_c))
            .map_err(|source| ProducerError::Spawn {
                program: name.to_string(),
                source,
            })?;
        Ok(Producer {
            mime_type: mime_type.to_string(),
            dlna_profile: dlna_profile.to_string(),
            pipe: Some(pipe),
            running,
            handle: Some(handle),
        })
    }

    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    #[must_use]
    pub fn dlna_profile(&self) -> &str {
        &self.dlna_profile
    }

    /// the read end of the output, available once
    pub fn take_pipe(&mut self) -> Option<Box<dyn Read + Send>> {
        self.pipe.take()
    }

    #[must_use]
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// clear the running flag and join the producer thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                debug!("producer thread panicked");
            }
            debug!("producer stopped");
        }
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// runs an external ffmpeg writing MPEG-TS to its stdout
pub struct FfmpegFactory {
    program: String,
    screen: ScreenConfig,
}

impl FfmpegFactory {
    #[must_use]
    pub fn new(program: &str, screen: ScreenConfig) -> FfmpegFactory {
        FfmpegFactory {
            program: program.to_string(),
            screen,
        }
    }

    fn spawn_child(&self, args: &[OsString]) -> Result<Child, ProducerError> {
        debug!("{} {args:?}", self.program);
        let stderr = if log_enabled!(log::Level::Debug) {
            Stdio::inherit()
        } else {
            Stdio::null()
        };
        Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(stderr)
            .spawn()
            .map_err(|source| ProducerError::Spawn {
                program: self.program.clone(),
                source,
            })
    }

    /// start the capture, falling back to video only when the audio input fails
    fn spawn_capture(&self, codec: TranscodeCodec) -> Result<Child, ProducerError> {
        if self.screen.audio_device.is_some() {
            let mut child = self.spawn_child(&screen_args(&self.screen, codec, true))?;
            match exited_within(&mut child, WARMUP) {
                None => return Ok(child),
                Some(status) => {
                    ui_log(
                        LogCategory::Warning,
                        &format!("Audio capture failed ({status}), continuing with video only"),
                    );
                }
            }
        }
        let mut child = self.spawn_child(&screen_args(&self.screen, codec, false))?;
        match exited_within(&mut child, WARMUP) {
            None => Ok(child),
            Some(status) => Err(ProducerError::ExitedEarly(status)),
        }
    }
}

impl ProducerFactory for FfmpegFactory {
    fn start(&self, config: &ProducerConfig) -> Result<Producer, ProducerError> {
        let mut child = match &config.source {
            ProducerSource::File(_) => self.spawn_child(&file_args(config))?,
            ProducerSource::Screen => self.spawn_capture(config.codec)?,
        };
        let Some(stdout) = child.stdout.take() else {
            stop_process(&mut child);
            return Err(ProducerError::NoPipe);
        };
        let (mime_type, dlna_profile) = transcode_profile(config.codec);
        Producer::spawn("producer", Box::new(stdout), mime_type, dlna_profile, move |running| {
            monitor(child, &running);
        })
    }
}

/// wait for the encoder to end on its own or for the running flag to clear
fn monitor(mut child: Child, running: &AtomicBool) {
    loop {
        if !running.load(Ordering::Acquire) {
            stop_process(&mut child);
            return;
        }
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("encoder exited: {status}");
                return;
            }
            Ok(None) => thread::sleep(MONITOR_POLL),
            Err(e) => {
                debug!("encoder status check failed: {e}");
                stop_process(&mut child);
                return;
            }
        }
    }
}

/// the exit status if the child ends within `window`
fn exited_within(child: &mut Child, window: Duration) -> Option<String> {
    let deadline = Instant::now() + window;
    while Instant::now() < deadline {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status.to_string()),
            Ok(None) => thread::sleep(MONITOR_POLL),
            Err(e) => return Some(e.to_string()),
        }
    }
    None
}

/// SIGTERM, a bounded wait, then kill
pub fn stop_process(child: &mut Child) {
    match child.try_wait() {
        Ok(Some(_)) => return,
        Ok(None) => {}
        Err(_) => {
            let _ = child.kill();
            let _ = child.wait();
            return;
        }
    }
    #[cfg(unix)]
    {
        if let Ok(pid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: the pid belongs to a child we have not reaped yet
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
            let deadline = Instant::now() + STOP_TIMEOUT;
            while Instant::now() < deadline {
                match child.try_wait() {
                    Ok(Some(_)) => return,
                    Ok(None) => thread::sleep(MONITOR_POLL),
                    Err(_) => break,
                }
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn video_encoder(codec: TranscodeCodec) -> &'static str {
    match codec {
        TranscodeCodec::H264 => "libx264",
        TranscodeCodec::Hevc => "libx265",
    }
}

fn push_all(args: &mut Vec<OsString>, items: &[&str]) {
    args.extend(items.iter().map(OsString::from));
}

const AUDIO_ENCODING: [&str; 8] = ["-c:a", "aac", "-b:a", "192k", "-ac", "2", "-ar", "48000"];
const TS_OUTPUT: [&str; 3] = ["-f", "mpegts", "pipe:1"];

/// arguments to transcode a file from `start_secs`
#[must_use]
pub fn file_args(config: &ProducerConfig) -> Vec<OsString> {
    let mut args = Vec::with_capacity(40);
    push_all(&mut args, &["-hide_banner", "-loglevel", "error", "-nostdin"]);
    if config.start_secs > 0 {
        push_all(&mut args, &["-ss", &config.start_secs.to_string()]);
    }
    if let ProducerSource::File(path) = &config.source {
        args.push("-i".into());
        args.push(path.as_os_str().to_os_string());
    }
    push_all(
        &mut args,
        &[
            "-map",
            "0:v:0?",
            "-map",
            "0:a:0?",
            "-c:v",
            video_encoder(config.codec),
            "-preset",
            "veryfast",
            "-pix_fmt",
            "yuv420p",
        ],
    );
    push_all(&mut args, &AUDIO_ENCODING);
    push_all(&mut args, &TS_OUTPUT);
    args
}

/// arguments to capture the screen, with or without the audio input
#[must_use]
pub fn screen_args(screen: &ScreenConfig, codec: TranscodeCodec, with_audio: bool) -> Vec<OsString> {
    let framerate = screen.framerate.to_string();
    let mut args = Vec::with_capacity(40);
    push_all(&mut args, &["-hide_banner", "-loglevel", "error", "-nostdin"]);
    push_all(
        &mut args,
        &[
            "-f",
            &screen.input_format,
            "-framerate",
            &framerate,
            "-i",
            &screen.display,
        ],
    );
    let audio_device = screen.audio_device.as_deref().filter(|_| with_audio);
    if let Some(device) = audio_device {
        push_all(&mut args, &["-f", &screen.audio_format, "-i", device]);
    }
    push_all(&mut args, &["-map", "0:v:0"]);
    if audio_device.is_some() {
        push_all(&mut args, &["-map", "1:a:0"]);
    }
    push_all(
        &mut args,
        &[
            "-c:v",
            video_encoder(codec),
            "-preset",
            "veryfast",
            "-tune",
            "zerolatency",
            "-pix_fmt",
            "yuv420p",
            "-g",
            &(screen.framerate * 2).to_string(),
        ],
    );
    if audio_device.is_some() {
        push_all(&mut args, &AUDIO_ENCODING);
    }
    push_all(&mut args, &TS_OUTPUT);
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    fn after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        let pos = args.iter().position(|a| a == flag)?;
        args.get(pos + 1).map(String::as_str)
    }

    #[test]
    fn transcode_from_offset() {
        let config = ProducerConfig {
            source: ProducerSource::File("/videos/movie.avi".into()),
            start_secs: 155,
            codec: TranscodeCodec::Hevc,
        };
        let args = strings(&file_args(&config));
        assert_eq!(after(&args, "-ss"), Some("155"));
        assert_eq!(after(&args, "-i"), Some("/videos/movie.avi"));
        assert_eq!(after(&args, "-c:v"), Some("libx265"));
        assert_eq!(after(&args, "-f"), Some("mpegts"));
        // input seeking: the offset comes before the input
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < input);
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[test]
    fn transcode_from_start() {
        let config = ProducerConfig {
            source: ProducerSource::File("movie.avi".into()),
            start_secs: 0,
            codec: TranscodeCodec::H264,
        };
        let args = strings(&file_args(&config));
        assert!(!args.contains(&"-ss".to_string()));
        assert_eq!(after(&args, "-c:v"), Some("libx264"));
        assert_eq!(after(&args, "-c:a"), Some("aac"));
    }

    #[test]
    fn capture_with_and_without_audio() {
        let screen = ScreenConfig::default();
        let args = strings(&screen_args(&screen, TranscodeCodec::H264, true));
        assert_eq!(after(&args, "-f"), Some("x11grab"));
        assert_eq!(after(&args, "-framerate"), Some("30"));
        assert!(args.contains(&"pulse".to_string()));
        assert!(args.contains(&"1:a:0".to_string()));
        assert_eq!(after(&args, "-c:a"), Some("aac"));

        let args = strings(&screen_args(&screen, TranscodeCodec::H264, false));
        assert!(!args.contains(&"pulse".to_string()));
        assert!(!args.contains(&"1:a:0".to_string()));
        assert!(!args.contains(&"-c:a".to_string()));

        let silent = ScreenConfig {
            audio_device: None,
            ..ScreenConfig::default()
        };
        let args = strings(&screen_args(&silent, TranscodeCodec::Hevc, true));
        assert!(!args.contains(&"-c:a".to_string()));
        assert_eq!(after(&args, "-c:v"), Some("libx265"));
    }

    #[test]
    fn stop_joins_the_thread() {
        let mut producer = Producer::spawn(
            "test_producer",
            Box::new(Cursor::new(b"ts".to_vec())),
            "video/mp2t",
            "AVC_TS_HP_HD_AAC_MULT5",
            |running| {
                while running.load(Ordering::Acquire) {
                    thread::sleep(Duration::from_millis(10));
                }
            },
        )
        .unwrap();
        let flag = producer.running_flag();
        assert!(flag.load(Ordering::Acquire));
        assert_eq!(producer.mime_type(), "video/mp2t");
        assert!(producer.take_pipe().is_some());
        assert!(producer.take_pipe().is_none());
        producer.stop();
        assert!(!flag.load(Ordering::Acquire));
    }

    #[test]
    fn missing_encoder() {
        let factory = FfmpegFactory::new("/nonexistent/ffmpeg", ScreenConfig::default());
        let config = ProducerConfig {
            source: ProducerSource::File("movie.avi".into()),
            start_secs: 0,
            codec: TranscodeCodec::H264,
        };
        assert!(matches!(
            factory.start(&config),
            Err(ProducerError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn terminate_child() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let started = Instant::now();
        stop_process(&mut child);
        assert!(child.try_wait().unwrap().is_some());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
