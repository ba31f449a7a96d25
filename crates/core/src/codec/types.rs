//! Format names, codec groups and MIME types.

use serde::{Deserialize, Serialize};

/// A set of formats sharing compatible codecs.
///
/// Conversions between two members of the same group can stream-copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecGroup {
    /// MPEG-4 family containers (H.264 / AAC)
    Mp4Family,
    /// AVI (MPEG-4 Part 2 / MP3)
    Avi,
    /// WebM (VP8 / Vorbis)
    WebM,
    /// Matroska (H.264 / AAC or MP3)
    Matroska,
    /// Windows Media Video
    Wmv,
    /// Flash Video
    Flv,
    /// Ogg Theora video
    OggTheora,
    /// Raw H.264 / HEVC elementary streams
    RawVideo,
    /// MP3 audio
    Mp3,
    /// WAVE audio
    Wav,
    /// Ogg Vorbis audio
    OggVorbis,
    /// AAC audio (raw ADTS or M4A)
    Aac,
    /// Windows Media Audio
    Wma,
    /// FLAC audio
    Flac,
}

impl CodecGroup {
    /// Every registered group.
    pub const ALL: [CodecGroup; 14] = [
        Self::Mp4Family,
        Self::Avi,
        Self::WebM,
        Self::Matroska,
        Self::Wmv,
        Self::Flv,
        Self::OggTheora,
        Self::RawVideo,
        Self::Mp3,
        Self::Wav,
        Self::OggVorbis,
        Self::Aac,
        Self::Wma,
        Self::Flac,
    ];

    /// Format names belonging to this group.
    pub fn members(&self) -> &'static [&'static str] {
        match self {
            Self::Mp4Family => &["mp4", "m4v", "mp4v", "mov", "3gp", "3g2"],
            Self::Avi => &["avi"],
            Self::WebM => &["webm"],
            Self::Matroska => &["mkv"],
            Self::Wmv => &["wmv"],
            Self::Flv => &["flv"],
            Self::OggTheora => &["ogv"],
            Self::RawVideo => &["h264", "264", "hevc", "265"],
            Self::Mp3 => &["mp3"],
            Self::Wav => &["wav"],
            Self::OggVorbis => &["ogg"],
            Self::Aac => &["aac", "m4a"],
            Self::Wma => &["wma"],
            Self::Flac => &["flac"],
        }
    }

    /// Looks up the group of a format name.
    pub fn of(format: &str) -> Option<CodecGroup> {
        let format = normalize_format(format);
        Self::ALL
            .into_iter()
            .find(|group| group.members().contains(&format.as_str()))
    }

    /// Whether members of this group carry no video track.
    pub fn is_audio_only(&self) -> bool {
        matches!(
            self,
            Self::Mp3 | Self::Wav | Self::OggVorbis | Self::Aac | Self::Wma | Self::Flac
        )
    }

    /// Whether members are raw elementary streams without container timestamps.
    pub fn is_elementary_stream(&self) -> bool {
        matches!(self, Self::RawVideo)
    }
}

/// Audio codec used when re-encoding into Matroska.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MkvAudio {
    /// Advanced Audio Coding
    #[default]
    Aac,
    /// MPEG Audio Layer III
    Mp3,
}

/// Normalizes a format hint: trims, drops a leading dot, lowercases.
pub fn normalize_format(format: &str) -> String {
    format.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// File extension written for a target format.
pub fn output_extension(format: &str) -> String {
    match normalize_format(format).as_str() {
        "mp4v" => "mp4".to_string(),
        other => other.to_string(),
    }
}

const MIME_TYPES: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("m4v", "video/x-m4v"),
    ("mp4v", "video/mp4"),
    ("mov", "video/quicktime"),
    ("3gp", "video/3gpp"),
    ("3g2", "video/3gpp2"),
    ("avi", "video/x-msvideo"),
    ("webm", "video/webm"),
    ("mkv", "video/x-matroska"),
    ("wmv", "video/x-ms-wmv"),
    ("flv", "video/x-flv"),
    ("ogv", "video/ogg"),
    ("h264", "video/h264"),
    ("264", "video/h264"),
    ("hevc", "video/h265"),
    ("265", "video/h265"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("aac", "audio/aac"),
    ("m4a", "audio/mp4"),
    ("wma", "audio/x-ms-wma"),
    ("flac", "audio/flac"),
];

/// MIME type for a format name; `application/octet-stream` when unknown.
pub fn mime_type(format: &str) -> &'static str {
    let format = normalize_format(format);
    MIME_TYPES
        .iter()
        .find(|(name, _)| *name == format)
        .map(|(_, mime)| *mime)
        .unwrap_or("application/octet-stream")
}

/// Format name for a MIME type (first registered match).
pub fn format_from_mime(mime: &str) -> Option<&'static str> {
    let mime = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    MIME_TYPES
        .iter()
        .find(|(_, m)| *m == mime)
        .map(|(name, _)| *name)
}

/// Format name from a file name's extension.
pub fn format_from_file_name(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(normalize_format(ext))
}

/// File name without its last extension.
pub fn file_stem(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    }
}
