use thiserror::Error;

/// Errors produced while parsing, re-framing or composing Ogg/Opus and tonie
/// container data. The CLI boundary wraps these in `anyhow` for reporting;
/// everything below that boundary propagates this type directly.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed Ogg stream at byte {offset}: {reason}")]
    MalformedOgg { offset: u64, reason: String },

    #[error("unsupported Opus packet (page {page_no}, packet {packet_index}): {reason}")]
    UnsupportedOpus {
        page_no: u32,
        packet_index: usize,
        reason: String,
    },

    #[error("opus packet of {size} bytes exceeds the {max} byte page budget (page {page_no})")]
    PacketTooLarge {
        page_no: u32,
        size: usize,
        max: usize,
    },

    #[error("page {page_no} could not be padded to {target} bytes (stuck at {actual} bytes)")]
    PadOverflow {
        page_no: u32,
        target: usize,
        actual: usize,
    },

    #[error("failed to decode tonie header: {reason}")]
    HeaderDecodeError { reason: String },

    #[error("chapter index {index} is out of range (file has {count} chapters)")]
    ChapterOutOfRange { index: usize, count: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
