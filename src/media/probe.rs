use crate::enums::{
    errors::ProbeError,
    media::{AudioCodec, VideoCodec},
};
use log::debug;
use serde::Deserialize;
use std::{
    path::Path,
    process::{Command, Stdio},
};

/// what the compatibility decision needs to know about a file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    /// comma joined format names, e.g. `mov,mp4,m4a,3gp,3g2,mj2`
    pub container: Option<String>,
    /// first video stream
    pub video: Option<VideoCodec>,
    /// first audio stream
    pub audio: Option<AudioCodec>,
    /// seconds, when the container tells
    pub duration: Option<f64>,
}

impl MediaInfo {
    /// whole seconds, used to clamp seek targets
    #[must_use]
    pub fn duration_secs(&self) -> Option<u32> {
        self.duration
            .filter(|d| d.is_finite() && *d >= 1.0)
            .map(|d| d.min(f64::from(u32::MAX)) as u32)
    }
}

pub trait MediaProbe {
    fn probe(&self, path: &Path) -> Result<MediaInfo, ProbeError>;
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    #[serde(default)]
    disposition: Option<ProbeDisposition>,
}

#[derive(Deserialize)]
struct ProbeDisposition {
    #[serde(default)]
    attached_pic: u8,
}

#[derive(Deserialize)]
struct ProbeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

/// parse `ffprobe -print_format json -show_format -show_streams` output
pub fn parse_probe_output(json: &str) -> Result<MediaInfo, ProbeError> {
    let output: ProbeOutput = serde_json::from_str(json)?;
    let codec_of = |kind: &str| {
        output
            .streams
            .iter()
            .filter(|s| s.codec_type.as_deref() == Some(kind))
            // cover art shows up as a video stream
            .find(|s| s.disposition.as_ref().is_none_or(|d| d.attached_pic == 0))
            .and_then(|s| s.codec_name.clone())
    };
    let video = codec_of("video").map(|name| VideoCodec::from_codec_name(&name));
    let audio = codec_of("audio").map(|name| AudioCodec::from_codec_name(&name));
    if video.is_none() && audio.is_none() {
        return Err(ProbeError::NoStreams);
    }
    let (container, duration) = match output.format {
        Some(format) => (
            format.format_name,
            format.duration.and_then(|d| d.trim().parse::<f64>().ok()),
        ),
        None => (None, None),
    };
    Ok(MediaInfo {
        container,
        video,
        audio,
        duration,
    })
}

/// probes files with an external ffprobe
pub struct Ffprobe {
    program: String,
}

impl Ffprobe {
    #[must_use]
    pub fn new(program: &str) -> Ffprobe {
        Ffprobe {
            program: program.to_string(),
        }
    }
}

impl MediaProbe for Ffprobe {
    fn probe(&self, path: &Path) -> Result<MediaInfo, ProbeError> {
        debug!("probing {}", path.display());
        let output = Command::new(&self.program)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ProbeError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::Failed {
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        let info = parse_probe_output(&String::from_utf8_lossy(&output.stdout))?;
        debug!("{}: {info:?}", path.display());
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static MP4_OUTPUT: &str = r#"{
    "streams": [
        { "index": 0, "codec_name": "h264", "codec_type": "video", "width": 1920 },
        { "index": 1, "codec_name": "aac", "codec_type": "audio", "channels": 2 }
    ],
    "format": {
        "filename": "movie.mp4",
        "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
        "duration": "5400.120000"
    }
}"#;

    #[test]
    fn mp4_with_aac() {
        let info = parse_probe_output(MP4_OUTPUT).unwrap();
        assert_eq!(info.container.as_deref(), Some("mov,mp4,m4a,3gp,3g2,mj2"));
        assert_eq!(info.video, Some(VideoCodec::H264));
        assert_eq!(info.audio, Some(AudioCodec::Aac));
        assert_eq!(info.duration_secs(), Some(5400));
    }

    #[test]
    fn cover_art_is_not_video() {
        let json = r#"{
    "streams": [
        { "codec_name": "mjpeg", "codec_type": "video", "disposition": { "attached_pic": 1 } },
        { "codec_name": "flac", "codec_type": "audio" }
    ],
    "format": { "format_name": "flac" }
}"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.video, None);
        assert_eq!(info.audio, Some(AudioCodec::Flac));
        assert_eq!(info.duration_secs(), None);
    }

    #[test]
    fn unusable_output() {
        assert!(matches!(
            parse_probe_output(r#"{ "streams": [], "format": {} }"#),
            Err(ProbeError::NoStreams)
        ));
        assert!(matches!(
            parse_probe_output(r#"{ "streams": [{ "codec_type": "data" }] }"#),
            Err(ProbeError::NoStreams)
        ));
        assert!(matches!(parse_probe_output("not json"), Err(ProbeError::Parse(_))));
    }

    #[test]
    fn missing_program() {
        let probe = Ffprobe::new("/nonexistent/ffprobe");
        assert!(matches!(
            probe.probe(Path::new("movie.mp4")),
            Err(ProbeError::Spawn { .. })
        ));
    }
}
