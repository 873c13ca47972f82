///
/// features.rs
///
/// DLNA content features.
///
/// Pure functions deriving the MIME type, the `DLNA.ORG_PN` profile and the
/// `contentFeatures.dlna.org` value from a probed (container, video codec) pair.
/// Container names are ffmpeg style and may be comma joined aliases such as
/// `"mov,mp4,m4a,3gp,3g2,mj2"` or `"matroska,webm"`, so all table lookups are
/// substring matches with the first listed rule winning.
///
use crate::enums::media::{TranscodeCodec, VideoCodec};

/// `DLNA.ORG_FLAGS` for transcoded or live streams (`DLNA.ORG_CI=1`)
pub const FLAGS_TRANSCODED: &str = "01700000000000000000000000000000";
/// `DLNA.ORG_FLAGS` for original content (`DLNA.ORG_CI=0`)
pub const FLAGS_ORIGINAL: &str = "21700000000000000000000000000000";

/// MIME type of everything the producer emits
pub const TRANSCODE_MIME: &str = "video/mp2t";

/// true when `haystack` contains any of `needles`
#[must_use]
pub fn matches_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

#[must_use]
pub fn derive_mime_type(container: Option<&str>, video: Option<VideoCodec>) -> &'static str {
    let Some(container) = container else {
        return TRANSCODE_MIME;
    };
    if matches_any(container, &["mp4", "mov"]) {
        "video/mp4"
    } else if container.contains("matroska") {
        match video {
            Some(VideoCodec::Vp8 | VideoCodec::Vp9 | VideoCodec::Av1) => "video/webm",
            _ => "video/x-mkv",
        }
    } else if container.contains("mpegts") {
        "video/mp2t"
    } else if container.contains("mpeg") {
        "video/mpeg"
    } else if container.contains("avi") {
        "video/avi"
    } else if container.contains("asf") {
        "video/x-ms-wmv"
    } else if container.contains("flv") {
        "video/x-flv"
    } else if container.contains("mp3") {
        "audio/mpeg"
    } else if container.contains("flac") {
        "audio/flac"
    } else if container.contains("ogg") {
        "audio/ogg"
    } else if container.contains("wav") {
        "audio/wav"
    } else {
        TRANSCODE_MIME
    }
}

/// the `DLNA.ORG_PN` token, empty when no profile applies
#[must_use]
pub fn derive_dlna_profile(container: Option<&str>, video: Option<VideoCodec>) -> &'static str {
    let container = container.unwrap_or_default();
    match video {
        Some(VideoCodec::H264) => {
            if matches_any(container, &["mp4", "mov", "3gp"]) {
                "AVC_MP4_MP_SD_AAC"
            } else if container.contains("matroska") {
                "AVC_MKV_MP_HD_AAC"
            } else if container.contains("mpegts") {
                "AVC_TS_MP_SD_AAC_MULT5"
            } else if container.contains("avi") {
                "AVC_MP4_MP_SD_AAC"
            } else {
                ""
            }
        }
        Some(VideoCodec::Hevc) if matches_any(container, &["mp4", "mov"]) => "HEVC_MP4_MP_L51_AAC",
        Some(VideoCodec::Mpeg4) => "MPEG4_P2_MP4_SP_AAC",
        _ => "",
    }
}

/// MIME type and profile of a producer stream, fixed by the encoder and muxer it runs
#[must_use]
pub fn transcode_profile(codec: TranscodeCodec) -> (&'static str, &'static str) {
    match codec {
        TranscodeCodec::H264 => (TRANSCODE_MIME, "AVC_TS_HP_HD_AAC_MULT5"),
        TranscodeCodec::Hevc => (TRANSCODE_MIME, "HEVC_TS_HD_NA"),
    }
}

/// build the `contentFeatures.dlna.org` value; the same string goes into the
/// DIDL-Lite `protocolInfo` and the HTTP header.
/// Streams advertise no seek support, files advertise byte seek only.
#[must_use]
pub fn build_feature_string(profile: Option<&str>, is_streaming: bool) -> String {
    let (op, ci, flags) = if is_streaming {
        ("00", "1", FLAGS_TRANSCODED)
    } else {
        ("01", "0", FLAGS_ORIGINAL)
    };
    match profile {
        Some(pn) if !pn.is_empty() => {
            // protocolInfo is colon delimited
            let pn = pn.replace(':', "_");
            format!("DLNA.ORG_PN={pn};DLNA.ORG_OP={op};DLNA.ORG_CI={ci};DLNA.ORG_FLAGS={flags}")
        }
        _ => format!("DLNA.ORG_OP={op};DLNA.ORG_CI={ci};DLNA.ORG_FLAGS={flags}"),
    }
}
