//! Codec command builder.
//!
//! Formats are grouped by compatible codecs. Converting between members of
//! one group stream-copies; converting across groups re-encodes with the
//! strategy registered for the target.

mod builder;
mod types;

pub use builder::{CodecCommand, CodecError, CommandBuilder, EncodeStrategy};
pub use types::{
    file_stem, format_from_file_name, format_from_mime, mime_type, normalize_format,
    output_extension, CodecGroup, MkvAudio,
};
