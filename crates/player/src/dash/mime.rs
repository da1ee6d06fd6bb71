//! Mime type helpers used to classify representations.

pub const BASE_TYPE_VIDEO: &str = "video";
pub const BASE_TYPE_AUDIO: &str = "audio";
pub const BASE_TYPE_TEXT: &str = "text";

pub const VIDEO_MP4V: &str = "video/mp4v-es";
pub const VIDEO_H264: &str = "video/avc";
pub const VIDEO_H265: &str = "video/hevc";
pub const VIDEO_VP8: &str = "video/x-vnd.on2.vp8";
pub const VIDEO_VP9: &str = "video/x-vnd.on2.vp9";
pub const VIDEO_AV1: &str = "video/av01";
pub const VIDEO_MPEG: &str = "video/mpeg";
pub const VIDEO_MPEG2: &str = "video/mpeg2";
pub const VIDEO_VC1: &str = "video/wvc1";
pub const VIDEO_DOLBY_VISION: &str = "video/dolby-vision";

pub const AUDIO_AAC: &str = "audio/mp4a-latm";
pub const AUDIO_MPEG: &str = "audio/mpeg";
pub const AUDIO_AC3: &str = "audio/ac3";
pub const AUDIO_EAC3: &str = "audio/eac3";
pub const AUDIO_EAC3_JOC: &str = "audio/eac3-joc";
pub const AUDIO_AC4: &str = "audio/ac4";
pub const AUDIO_DTS: &str = "audio/vnd.dts";
pub const AUDIO_DTS_HD: &str = "audio/vnd.dts.hd";
pub const AUDIO_VORBIS: &str = "audio/vorbis";
pub const AUDIO_OPUS: &str = "audio/opus";
pub const AUDIO_FLAC: &str = "audio/flac";

pub const APPLICATION_MP4: &str = "application/mp4";
pub const APPLICATION_RAWCC: &str = "application/x-rawcc";
pub const APPLICATION_TTML: &str = "application/ttml+xml";
pub const APPLICATION_MP4VTT: &str = "application/x-mp4-vtt";
pub const APPLICATION_CEA608: &str = "application/cea-608";
pub const APPLICATION_CEA708: &str = "application/cea-708";

fn top_level_type(mime_type: &str) -> Option<&str> {
    mime_type.split_once('/').map(|(top, _)| top)
}

pub fn is_video(mime_type: &str) -> bool {
    top_level_type(mime_type) == Some(BASE_TYPE_VIDEO)
}

pub fn is_audio(mime_type: &str) -> bool {
    top_level_type(mime_type) == Some(BASE_TYPE_AUDIO)
}

pub fn is_text(mime_type: &str) -> bool {
    top_level_type(mime_type) == Some(BASE_TYPE_TEXT)
}

/// Text formats, including the ones carried in an `application/*` container.
pub fn is_raw_text(mime_type: &str) -> bool {
    is_text(mime_type)
        || matches!(
            mime_type,
            APPLICATION_TTML | APPLICATION_MP4VTT | APPLICATION_CEA608 | APPLICATION_CEA708
        )
}

/// Derives the sample mime type from the container mime type and the codecs string.
pub fn sample_mime_type(container_mime_type: Option<&str>, codecs: Option<&str>) -> Option<String> {
    let container = container_mime_type?;
    if is_audio(container) {
        return first_codec_mime_type(codecs?, BASE_TYPE_AUDIO);
    }
    if is_video(container) {
        return first_codec_mime_type(codecs?, BASE_TYPE_VIDEO);
    }
    if is_raw_text(container) {
        return Some(container.to_string());
    }

    let codecs = codecs?;
    match container {
        APPLICATION_MP4 if codecs.starts_with("stpp") => Some(APPLICATION_TTML.to_string()),
        APPLICATION_MP4 if codecs.starts_with("wvtt") => Some(APPLICATION_MP4VTT.to_string()),
        APPLICATION_RAWCC if codecs.contains("cea708") => Some(APPLICATION_CEA708.to_string()),
        APPLICATION_RAWCC if codecs.contains("eia608") || codecs.contains("cea608") => {
            Some(APPLICATION_CEA608.to_string())
        }
        _ => None,
    }
}

fn first_codec_mime_type(codecs: &str, base_type: &str) -> Option<String> {
    codecs
        .trim()
        .split(',')
        .filter_map(media_mime_type)
        .find(|mime_type| mime_type.starts_with(base_type))
        .map(str::to_string)
}

/// Maps a single RFC 6381 codec string to a mime type.
pub fn media_mime_type(codec: &str) -> Option<&'static str> {
    let codec = codec.trim().to_ascii_lowercase();

    if has_prefix(&codec, &["avc1", "avc3"]) {
        Some(VIDEO_H264)
    } else if has_prefix(&codec, &["hev1", "hvc1"]) {
        Some(VIDEO_H265)
    } else if has_prefix(&codec, &["dvav", "dva1", "dvhe", "dvh1"]) {
        Some(VIDEO_DOLBY_VISION)
    } else if has_prefix(&codec, &["av01"]) {
        Some(VIDEO_AV1)
    } else if has_prefix(&codec, &["vp9", "vp09"]) {
        Some(VIDEO_VP9)
    } else if has_prefix(&codec, &["vp8", "vp08"]) {
        Some(VIDEO_VP8)
    } else if has_prefix(&codec, &["mp4a"]) {
        let object_type = codec
            .get(5..7)
            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            .and_then(mime_type_from_mp4_object_type);
        Some(object_type.unwrap_or(AUDIO_AAC))
    } else if has_prefix(&codec, &["ac-3", "dac3"]) {
        Some(AUDIO_AC3)
    } else if has_prefix(&codec, &["ec-3", "dec3"]) {
        Some(AUDIO_EAC3)
    } else if has_prefix(&codec, &["ec+3"]) {
        Some(AUDIO_EAC3_JOC)
    } else if has_prefix(&codec, &["ac-4", "dac4"]) {
        Some(AUDIO_AC4)
    } else if has_prefix(&codec, &["dtsc", "dtse"]) {
        Some(AUDIO_DTS)
    } else if has_prefix(&codec, &["dtsh", "dtsl"]) {
        Some(AUDIO_DTS_HD)
    } else if has_prefix(&codec, &["opus"]) {
        Some(AUDIO_OPUS)
    } else if has_prefix(&codec, &["vorbis"]) {
        Some(AUDIO_VORBIS)
    } else if has_prefix(&codec, &["flac"]) {
        Some(AUDIO_FLAC)
    } else if has_prefix(&codec, &["stpp"]) {
        Some(APPLICATION_TTML)
    } else if has_prefix(&codec, &["wvtt"]) {
        Some(APPLICATION_MP4VTT)
    } else {
        None
    }
}

fn has_prefix(codec: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|prefix| codec.starts_with(prefix))
}

/// ISO/IEC 14496-1 object type indication.
fn mime_type_from_mp4_object_type(object_type: u8) -> Option<&'static str> {
    match object_type {
        0x20 => Some(VIDEO_MP4V),
        0x21 => Some(VIDEO_H264),
        0x23 => Some(VIDEO_H265),
        0x60..=0x65 => Some(VIDEO_MPEG2),
        0x6A => Some(VIDEO_MPEG),
        0x69 | 0x6B => Some(AUDIO_MPEG),
        0xA3 => Some(VIDEO_VC1),
        0xB1 => Some(VIDEO_VP9),
        0x40 | 0x66 | 0x67 | 0x68 => Some(AUDIO_AAC),
        0xA5 => Some(AUDIO_AC3),
        0xA6 => Some(AUDIO_EAC3),
        0xA9 | 0xAC => Some(AUDIO_DTS),
        0xAA | 0xAB => Some(AUDIO_DTS_HD),
        0xAD => Some(AUDIO_OPUS),
        0xAE => Some(AUDIO_AC4),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentType {
    Audio,
    Video,
    Text,
    #[default]
    Unknown,
}

impl ContentType {
    /// Parses the `contentType` attribute of an `AdaptationSet` or `ContentComponent`.
    pub fn from_attribute(value: Option<&str>) -> Self {
        match value {
            Some(BASE_TYPE_AUDIO) => Self::Audio,
            Some(BASE_TYPE_VIDEO) => Self::Video,
            Some(BASE_TYPE_TEXT) => Self::Text,
            _ => Self::Unknown,
        }
    }

    pub fn from_sample_mime_type(mime_type: Option<&str>) -> Self {
        match mime_type {
            Some(m) if is_audio(m) => Self::Audio,
            Some(m) if is_video(m) => Self::Video,
            Some(m) if is_raw_text(m) => Self::Text,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Text => "text",
            Self::Unknown => "unknown",
        })
    }
}
