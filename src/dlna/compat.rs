///
/// compat.rs
///
/// Can the renderer play a file as is, or does it need the producer?
///
use crate::{
    dlna::features::matches_any,
    enums::media::{AudioCodec, VideoCodec},
};

const GENERIC_VIDEO_CONTAINERS: &[&str] = &["avi", "matroska", "asf", "mp4", "mov", "3gp", "flv"];

const AUDIO_ONLY_CONTAINERS: &[&str] = &[
    "mp4", "mov", "matroska", "webm", "mpegts", "avi", "asf", "flv", "mpeg", "vob", "mp3", "flac",
    "ogg", "wav",
];

/// per codec container whitelist; a missing container is never compatible
#[must_use]
pub fn is_video_container_compatible(codec: VideoCodec, container: Option<&str>) -> bool {
    let Some(container) = container else {
        return false;
    };
    match codec {
        VideoCodec::H264 => matches_any(
            container,
            &["avi", "matroska", "asf", "mp4", "mov", "3gp", "flv", "mpeg"],
        ),
        VideoCodec::Hevc => matches_any(container, &["matroska", "mp4", "mov", "mpegts"]),
        VideoCodec::Vp8 | VideoCodec::Vp9 | VideoCodec::Av1 => {
            matches_any(container, &["webm", "matroska"])
        }
        VideoCodec::Mpeg1 | VideoCodec::Mpeg2 => container.contains("mpeg"),
        VideoCodec::Mpeg4 | VideoCodec::Vc1 | VideoCodec::Wmv3 | VideoCodec::Mjpeg => {
            matches_any(container, GENERIC_VIDEO_CONTAINERS)
        }
        VideoCodec::Other => false,
    }
}

/// audio codecs the renderer class decodes; DTS is not one of them
#[must_use]
pub fn is_audio_codec_compatible(codec: AudioCodec) -> bool {
    !matches!(codec, AudioCodec::Dts | AudioCodec::Other)
}

/// containers acceptable for audio only passthrough
#[must_use]
pub fn is_container_compatible(container: Option<&str>) -> bool {
    container.is_some_and(|c| matches_any(c, AUDIO_ONLY_CONTAINERS))
}

/// true when the file has to go through the producer
#[must_use]
pub fn decide_transcode(
    video: Option<VideoCodec>,
    audio: Option<AudioCodec>,
    container: Option<&str>,
    force: bool,
) -> bool {
    if force {
        return true;
    }
    match video {
        Some(video) => {
            let audio_ok = audio.is_none_or(is_audio_codec_compatible);
            !(is_video_container_compatible(video, container) && audio_ok)
        }
        None => {
            let audio_ok = audio.is_some_and(is_audio_codec_compatible);
            !(audio_ok && is_container_compatible(container))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MP4: Option<&str> = Some("mov,mp4,m4a,3gp,3g2,mj2");
    const MKV: Option<&str> = Some("matroska,webm");

    #[test]
    fn video_containers() {
        assert!(is_video_container_compatible(VideoCodec::H264, MP4));
        assert!(is_video_container_compatible(VideoCodec::H264, MKV));
        assert!(is_video_container_compatible(VideoCodec::H264, Some("mpegts")));
        assert!(!is_video_container_compatible(VideoCodec::H264, Some("webm")));
        assert!(is_video_container_compatible(VideoCodec::Hevc, Some("mpegts")));
        assert!(!is_video_container_compatible(VideoCodec::Hevc, Some("avi")));
        assert!(is_video_container_compatible(VideoCodec::Vp9, Some("webm")));
        assert!(is_video_container_compatible(VideoCodec::Av1, MKV));
        assert!(!is_video_container_compatible(VideoCodec::Vp8, MP4));
        assert!(is_video_container_compatible(VideoCodec::Mpeg2, Some("mpeg")));
        assert!(!is_video_container_compatible(VideoCodec::Mpeg2, MP4));
        assert!(is_video_container_compatible(VideoCodec::Mpeg4, Some("avi")));
        assert!(!is_video_container_compatible(VideoCodec::Mpeg4, Some("mpeg")));
        assert!(is_video_container_compatible(VideoCodec::Vc1, Some("asf")));
        assert!(is_video_container_compatible(VideoCodec::Mjpeg, Some("avi")));
        assert!(!is_video_container_compatible(VideoCodec::Other, MP4));
        assert!(!is_video_container_compatible(VideoCodec::H264, None));
    }

    #[test]
    fn tables_are_pure() {
        let codecs = [VideoCodec::H264, VideoCodec::Hevc, VideoCodec::Vp9, VideoCodec::Mpeg4];
        let containers = [MP4, MKV, Some("avi"), Some("webm"), None];
        for codec in codecs {
            for container in containers {
                assert_eq!(
                    is_video_container_compatible(codec, container),
                    is_video_container_compatible(codec, container)
                );
            }
        }
        for codec in [AudioCodec::Aac, AudioCodec::Dts, AudioCodec::Opus] {
            assert_eq!(is_audio_codec_compatible(codec), is_audio_codec_compatible(codec));
        }
    }

    #[test]
    fn audio_codecs() {
        assert!(is_audio_codec_compatible(AudioCodec::Aac));
        assert!(is_audio_codec_compatible(AudioCodec::Eac3));
        assert!(is_audio_codec_compatible(AudioCodec::PcmMulaw));
        assert!(is_audio_codec_compatible(AudioCodec::AdpcmMs));
        assert!(!is_audio_codec_compatible(AudioCodec::Dts));
        assert!(!is_audio_codec_compatible(AudioCodec::Other));
    }

    #[test]
    fn audio_only_containers() {
        assert!(is_container_compatible(Some("mp3")));
        assert!(is_container_compatible(Some("ogg")));
        assert!(is_container_compatible(MP4));
        assert!(!is_container_compatible(Some("aiff")));
        assert!(!is_container_compatible(None));
    }

    #[test]
    fn transcode_decisions() {
        let h264 = Some(VideoCodec::H264);
        assert!(!decide_transcode(h264, Some(AudioCodec::Aac), MP4, false));
        assert!(decide_transcode(h264, Some(AudioCodec::Aac), Some("webm"), false));
        assert!(!decide_transcode(h264, None, MKV, false));
        // DTS forces a transcode whatever the video and container
        assert!(decide_transcode(h264, Some(AudioCodec::Dts), MP4, false));
        assert!(decide_transcode(Some(VideoCodec::Vp9), Some(AudioCodec::Dts), Some("webm"), false));
        assert!(decide_transcode(None, Some(AudioCodec::Dts), Some("wav"), false));
        // audio only
        assert!(!decide_transcode(None, Some(AudioCodec::Mp3), Some("mp3"), false));
        assert!(decide_transcode(None, Some(AudioCodec::Mp3), Some("aiff"), false));
        assert!(decide_transcode(None, None, Some("mp3"), false));
        // force wins
        assert!(decide_transcode(h264, Some(AudioCodec::Aac), MP4, true));
    }
}
