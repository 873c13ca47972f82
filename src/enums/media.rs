use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// what is being served: a (list of) file(s) or a live screen capture
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MediaMode {
    File,
    Screen,
}

impl fmt::Display for MediaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaMode::File => write!(f, "File"),
            MediaMode::Screen => write!(f, "Screen"),
        }
    }
}

/// video codecs as reported by the media probe
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum VideoCodec {
    H264,
    Hevc,
    Vp8,
    Vp9,
    Av1,
    Mpeg4,
    Mpeg1,
    Mpeg2,
    Vc1,
    Wmv3,
    Mjpeg,
    Other,
}

impl VideoCodec {
    /// map an ffprobe `codec_name` to a codec
    #[must_use]
    pub fn from_codec_name(name: &str) -> VideoCodec {
        match name.to_ascii_lowercase().as_str() {
            "h264" => VideoCodec::H264,
            "hevc" | "h265" => VideoCodec::Hevc,
            "vp8" => VideoCodec::Vp8,
            "vp9" => VideoCodec::Vp9,
            "av1" => VideoCodec::Av1,
            "mpeg4" => VideoCodec::Mpeg4,
            "mpeg1video" => VideoCodec::Mpeg1,
            "mpeg2video" => VideoCodec::Mpeg2,
            "vc1" => VideoCodec::Vc1,
            "wmv3" => VideoCodec::Wmv3,
            "mjpeg" => VideoCodec::Mjpeg,
            _ => VideoCodec::Other,
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VideoCodec::H264 => "H.264",
            VideoCodec::Hevc => "HEVC",
            VideoCodec::Vp8 => "VP8",
            VideoCodec::Vp9 => "VP9",
            VideoCodec::Av1 => "AV1",
            VideoCodec::Mpeg4 => "MPEG-4",
            VideoCodec::Mpeg1 => "MPEG-1",
            VideoCodec::Mpeg2 => "MPEG-2",
            VideoCodec::Vc1 => "VC-1",
            VideoCodec::Wmv3 => "WMV3",
            VideoCodec::Mjpeg => "MJPEG",
            VideoCodec::Other => "other",
        };
        write!(f, "{name}")
    }
}

/// audio codecs as reported by the media probe
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum AudioCodec {
    Aac,
    Mp3,
    Mp2,
    Flac,
    Ac3,
    Eac3,
    Vorbis,
    Opus,
    Wmav1,
    Wmav2,
    PcmS16le,
    PcmS16be,
    PcmS24le,
    PcmS24be,
    PcmS32le,
    PcmS32be,
    PcmU8,
    PcmAlaw,
    PcmMulaw,
    AdpcmImaWav,
    AdpcmMs,
    Dts,
    Other,
}

impl AudioCodec {
    /// map an ffprobe `codec_name` to a codec
    #[must_use]
    pub fn from_codec_name(name: &str) -> AudioCodec {
        match name.to_ascii_lowercase().as_str() {
            "aac" => AudioCodec::Aac,
            "mp3" => AudioCodec::Mp3,
            "mp2" => AudioCodec::Mp2,
            "flac" => AudioCodec::Flac,
            "ac3" => AudioCodec::Ac3,
            "eac3" => AudioCodec::Eac3,
            "vorbis" => AudioCodec::Vorbis,
            "opus" => AudioCodec::Opus,
            "wmav1" => AudioCodec::Wmav1,
            "wmav2" => AudioCodec::Wmav2,
            "pcm_s16le" => AudioCodec::PcmS16le,
            "pcm_s16be" => AudioCodec::PcmS16be,
            "pcm_s24le" => AudioCodec::PcmS24le,
            "pcm_s24be" => AudioCodec::PcmS24be,
            "pcm_s32le" => AudioCodec::PcmS32le,
            "pcm_s32be" => AudioCodec::PcmS32be,
            "pcm_u8" => AudioCodec::PcmU8,
            "pcm_alaw" => AudioCodec::PcmAlaw,
            "pcm_mulaw" => AudioCodec::PcmMulaw,
            "adpcm_ima_wav" => AudioCodec::AdpcmImaWav,
            "adpcm_ms" => AudioCodec::AdpcmMs,
            "dts" => AudioCodec::Dts,
            _ => AudioCodec::Other,
        }
    }
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// the video encoder the producer uses when transcoding or capturing
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TranscodeCodec {
    H264,
    Hevc,
}

impl fmt::Display for TranscodeCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscodeCodec::H264 => write!(f, "H.264"),
            TranscodeCodec::Hevc => write!(f, "HEVC"),
        }
    }
}

/// configured transcode codec; `Auto` asks the renderer what it can decode
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CodecChoice {
    #[default]
    Auto,
    H264,
    Hevc,
}

impl FromStr for CodecChoice {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(CodecChoice::Auto),
            "h264" | "avc" => Ok(CodecChoice::H264),
            "hevc" | "h265" => Ok(CodecChoice::Hevc),
            _ => Err(()),
        }
    }
}

/// AVTransport `CurrentTransportState` values we care about
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TransportState {
    Playing,
    Stopped,
    PausedPlayback,
    Transitioning,
    NoMediaPresent,
    Other,
}

impl TransportState {
    /// the renderer is (about to be) rendering the current URI
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(
            self,
            TransportState::Playing | TransportState::Transitioning | TransportState::PausedPlayback
        )
    }

    /// the renderer has nothing left to render
    #[must_use]
    pub fn is_idle(self) -> bool {
        matches!(self, TransportState::Stopped | TransportState::NoMediaPresent)
    }
}

impl FromStr for TransportState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "PLAYING" => Ok(TransportState::Playing),
            "STOPPED" => Ok(TransportState::Stopped),
            "PAUSED_PLAYBACK" => Ok(TransportState::PausedPlayback),
            "TRANSITIONING" => Ok(TransportState::Transitioning),
            "NO_MEDIA_PRESENT" => Ok(TransportState::NoMediaPresent),
            "" => Err(()),
            _ => Ok(TransportState::Other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_names() {
        assert_eq!(VideoCodec::from_codec_name("h264"), VideoCodec::H264);
        assert_eq!(VideoCodec::from_codec_name("mpeg2video"), VideoCodec::Mpeg2);
        assert_eq!(VideoCodec::from_codec_name("prores"), VideoCodec::Other);
        assert_eq!(AudioCodec::from_codec_name("pcm_s24le"), AudioCodec::PcmS24le);
        assert_eq!(AudioCodec::from_codec_name("DTS"), AudioCodec::Dts);
        assert_eq!(AudioCodec::from_codec_name("truehd"), AudioCodec::Other);
    }

    #[test]
    fn transport_states() {
        assert_eq!("PLAYING".parse(), Ok(TransportState::Playing));
        assert_eq!(" STOPPED ".parse(), Ok(TransportState::Stopped));
        assert_eq!("RECORDING".parse(), Ok(TransportState::Other));
        assert!("".parse::<TransportState>().is_err());
        assert!(TransportState::Transitioning.is_active());
        assert!(TransportState::NoMediaPresent.is_idle());
    }

    #[test]
    fn codec_choice() {
        assert_eq!("HEVC".parse(), Ok(CodecChoice::Hevc));
        assert_eq!("avc".parse(), Ok(CodecChoice::H264));
        assert!("vp9".parse::<CodecChoice>().is_err());
    }
}
