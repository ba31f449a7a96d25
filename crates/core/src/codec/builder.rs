//! Codec command builder.
//!
//! Maps `(source format, target format)` to the engine arguments used to
//! transcode one segment. Same-group conversions stream-copy; everything
//! else uses the encode strategy registered for the target.

use thiserror::Error;

use super::types::{normalize_format, CodecGroup, MkvAudio};

/// Errors raised while building a codec command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// No encode strategy is registered for the target.
    #[error("Unsupported target format: {format}")]
    UnsupportedFormat { format: String },
}

/// Concrete encode strategy for a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeStrategy {
    /// Remux without re-encoding
    StreamCopy,
    /// H.264 video, AAC audio
    H264Aac,
    /// H.264 / AAC with a low-bandwidth mobile profile (3GP)
    MobileH264Aac,
    /// MPEG-4 Part 2 video, MP3 audio
    Mpeg4Mp3,
    /// VP8 video, Vorbis audio
    Vp8Vorbis,
    /// H.264 video, selectable audio (Matroska)
    H264Matroska(MkvAudio),
    /// WMV2 video, WMA audio
    Wmv2Wma,
    /// FLV1 video, MP3 audio
    FlvMp3,
    /// Theora video, Vorbis audio
    TheoraVorbis,
    /// Video-only elementary stream
    RawVideo { hevc: bool },
    /// Audio-only output with the given encoder
    AudioOnly(&'static str),
}

impl EncodeStrategy {
    fn video_args(&self) -> Vec<String> {
        let codec = match self {
            Self::StreamCopy => "copy",
            Self::H264Aac | Self::MobileH264Aac | Self::H264Matroska(_) => "libx264",
            Self::Mpeg4Mp3 => "mpeg4",
            Self::Vp8Vorbis => "libvpx",
            Self::Wmv2Wma => "wmv2",
            Self::FlvMp3 => "flv",
            Self::TheoraVorbis => "libtheora",
            Self::RawVideo { hevc: false } => "libx264",
            Self::RawVideo { hevc: true } => "libx265",
            Self::AudioOnly(_) => return vec!["-vn".to_string()],
        };
        vec!["-c:v".to_string(), codec.to_string()]
    }

    fn audio_args(&self) -> Vec<String> {
        let codec = match self {
            Self::StreamCopy => "copy",
            Self::H264Aac | Self::MobileH264Aac => "aac",
            Self::H264Matroska(MkvAudio::Aac) => "aac",
            Self::H264Matroska(MkvAudio::Mp3) => "libmp3lame",
            Self::Mpeg4Mp3 | Self::FlvMp3 => "libmp3lame",
            Self::Vp8Vorbis | Self::TheoraVorbis => "libvorbis",
            Self::Wmv2Wma => "wmav2",
            Self::RawVideo { .. } => return vec!["-an".to_string()],
            Self::AudioOnly(codec) => *codec,
        };
        vec!["-c:a".to_string(), codec.to_string()]
    }

    fn extra_args(&self) -> Vec<String> {
        match self {
            Self::MobileH264Aac => [
                "-r", "20", "-s", "352x288", "-b:v", "400k", "-ac", "1", "-ar", "8000", "-b:a",
                "24k",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            _ => Vec::new(),
        }
    }
}

/// Engine arguments for one conversion, fixed once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecCommand {
    /// Strategy the arguments were derived from.
    pub strategy: EncodeStrategy,
    /// Video codec arguments.
    pub video_args: Vec<String>,
    /// Audio codec arguments.
    pub audio_args: Vec<String>,
    /// Additional encoder settings.
    pub extra_args: Vec<String>,
}

impl CodecCommand {
    fn from_strategy(strategy: EncodeStrategy) -> Self {
        Self {
            strategy,
            video_args: strategy.video_args(),
            audio_args: strategy.audio_args(),
            extra_args: strategy.extra_args(),
        }
    }

    /// Whether both streams are copied without re-encoding.
    pub fn is_stream_copy(&self) -> bool {
        self.strategy == EncodeStrategy::StreamCopy
    }

    /// Full argument list reading `input` and writing `output`.
    pub fn to_args(&self, input: &str, output: &str) -> Vec<String> {
        let mut args = vec!["-i".to_string(), input.to_string()];
        args.extend(self.video_args.iter().cloned());
        args.extend(self.audio_args.iter().cloned());
        args.extend(self.extra_args.iter().cloned());
        args.push(output.to_string());
        args
    }
}

/// Builds [`CodecCommand`]s from format pairs.
#[derive(Debug, Clone, Default)]
pub struct CommandBuilder {
    mkv_audio: MkvAudio,
}

impl CommandBuilder {
    /// Creates a builder using `mkv_audio` for Matroska targets.
    pub fn new(mkv_audio: MkvAudio) -> Self {
        Self { mkv_audio }
    }

    /// Every target format with a registered strategy.
    pub fn supported_targets() -> Vec<&'static str> {
        CodecGroup::ALL
            .iter()
            .flat_map(|group| group.members().iter().copied())
            .collect()
    }

    /// Fails unless `target` has a registered strategy.
    pub fn validate_target(&self, target: &str) -> Result<CodecGroup, CodecError> {
        CodecGroup::of(target).ok_or_else(|| CodecError::UnsupportedFormat {
            format: normalize_format(target),
        })
    }

    /// Picks the encode strategy for a conversion.
    pub fn strategy_for(&self, source: &str, target: &str) -> Result<EncodeStrategy, CodecError> {
        let target_group = self.validate_target(target)?;
        if CodecGroup::of(source) == Some(target_group) {
            return Ok(EncodeStrategy::StreamCopy);
        }

        let target = normalize_format(target);
        let strategy = match target_group {
            CodecGroup::Mp4Family => match target.as_str() {
                "3gp" | "3g2" => EncodeStrategy::MobileH264Aac,
                _ => EncodeStrategy::H264Aac,
            },
            CodecGroup::Avi => EncodeStrategy::Mpeg4Mp3,
            CodecGroup::WebM => EncodeStrategy::Vp8Vorbis,
            CodecGroup::Matroska => EncodeStrategy::H264Matroska(self.mkv_audio),
            CodecGroup::Wmv => EncodeStrategy::Wmv2Wma,
            CodecGroup::Flv => EncodeStrategy::FlvMp3,
            CodecGroup::OggTheora => EncodeStrategy::TheoraVorbis,
            CodecGroup::RawVideo => EncodeStrategy::RawVideo {
                hevc: matches!(target.as_str(), "hevc" | "265"),
            },
            CodecGroup::Mp3 => EncodeStrategy::AudioOnly("libmp3lame"),
            CodecGroup::Wav => EncodeStrategy::AudioOnly("pcm_s16le"),
            CodecGroup::OggVorbis => EncodeStrategy::AudioOnly("libvorbis"),
            CodecGroup::Aac => EncodeStrategy::AudioOnly("aac"),
            CodecGroup::Wma => EncodeStrategy::AudioOnly("wmav2"),
            CodecGroup::Flac => EncodeStrategy::AudioOnly("flac"),
        };
        Ok(strategy)
    }

    /// Builds the command for a conversion.
    pub fn build(&self, source: &str, target: &str) -> Result<CodecCommand, CodecError> {
        self.strategy_for(source, target)
            .map(CodecCommand::from_strategy)
    }
}
