//! Token name and value tables
//!
//! Canonical AL 1.1 token names mapped to their numeric values, for
//! diagnostics and for callers that carry tokens in config files or over the
//! wire. Lookups are by linear scan; the table is small and cold.

use crate::panner::DistanceModel;
use crate::types::{BufferState, PlaybackMode, SampleFormat, SourceState};

/// Every token the engine knows, name first.
///
/// Two names share the value 0; `token_name(0)` resolves to whichever is
/// registered first, which is AL_NONE.
pub const TOKENS: &[(&str, u32)] = &[
    ("AL_NONE", 0),
    ("AL_NO_ERROR", 0),
    ("AL_SOURCE_RELATIVE", 0x202),
    ("AL_CONE_INNER_ANGLE", 0x1001),
    ("AL_CONE_OUTER_ANGLE", 0x1002),
    ("AL_PITCH", 0x1003),
    ("AL_POSITION", 0x1004),
    ("AL_DIRECTION", 0x1005),
    ("AL_VELOCITY", 0x1006),
    ("AL_LOOPING", 0x1007),
    ("AL_BUFFER", 0x1009),
    ("AL_GAIN", 0x100A),
    ("AL_MIN_GAIN", 0x100D),
    ("AL_MAX_GAIN", 0x100E),
    ("AL_ORIENTATION", 0x100F),
    ("AL_SOURCE_STATE", 0x1010),
    ("AL_INITIAL", 0x1011),
    ("AL_PLAYING", 0x1012),
    ("AL_PAUSED", 0x1013),
    ("AL_STOPPED", 0x1014),
    ("AL_BUFFERS_QUEUED", 0x1015),
    ("AL_BUFFERS_PROCESSED", 0x1016),
    ("AL_REFERENCE_DISTANCE", 0x1020),
    ("AL_ROLLOFF_FACTOR", 0x1021),
    ("AL_CONE_OUTER_GAIN", 0x1022),
    ("AL_MAX_DISTANCE", 0x1023),
    ("AL_SEC_OFFSET", 0x1024),
    ("AL_SAMPLE_OFFSET", 0x1025),
    ("AL_BYTE_OFFSET", 0x1026),
    ("AL_SOURCE_TYPE", 0x1027),
    ("AL_STATIC", 0x1028),
    ("AL_STREAMING", 0x1029),
    ("AL_UNDETERMINED", 0x1030),
    ("AL_FORMAT_MONO8", 0x1100),
    ("AL_FORMAT_MONO16", 0x1101),
    ("AL_FORMAT_STEREO8", 0x1102),
    ("AL_FORMAT_STEREO16", 0x1103),
    ("AL_FREQUENCY", 0x2001),
    ("AL_BITS", 0x2002),
    ("AL_CHANNELS", 0x2003),
    ("AL_SIZE", 0x2004),
    ("AL_UNUSED", 0x2010),
    ("AL_PENDING", 0x2011),
    ("AL_PROCESSED", 0x2012),
    ("AL_INVALID_NAME", 0xA001),
    ("AL_INVALID_ENUM", 0xA002),
    ("AL_INVALID_VALUE", 0xA003),
    ("AL_INVALID_OPERATION", 0xA004),
    ("AL_OUT_OF_MEMORY", 0xA005),
    ("AL_VENDOR", 0xB001),
    ("AL_VERSION", 0xB002),
    ("AL_RENDERER", 0xB003),
    ("AL_EXTENSIONS", 0xB004),
    ("AL_DOPPLER_FACTOR", 0xC000),
    ("AL_SPEED_OF_SOUND", 0xC003),
    ("AL_DISTANCE_MODEL", 0xD000),
    ("AL_INVERSE_DISTANCE", 0xD001),
    ("AL_INVERSE_DISTANCE_CLAMPED", 0xD002),
    ("AL_LINEAR_DISTANCE", 0xD003),
    ("AL_LINEAR_DISTANCE_CLAMPED", 0xD004),
    ("AL_EXPONENT_DISTANCE", 0xD005),
    ("AL_EXPONENT_DISTANCE_CLAMPED", 0xD006),
];

/// Numeric value of a token name; None for unknown or empty names
pub fn token_value(name: &str) -> Option<u32> {
    TOKENS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, value)| *value)
}

/// First registered name carrying the value
pub fn token_name(value: u32) -> Option<&'static str> {
    TOKENS.iter().find(|(_, v)| *v == value).map(|(n, _)| *n)
}

pub fn source_state_token(state: SourceState) -> u32 {
    match state {
        SourceState::Initial => 0x1011,
        SourceState::Playing => 0x1012,
        SourceState::Paused => 0x1013,
        SourceState::Stopped => 0x1014,
    }
}

pub fn buffer_state_token(state: BufferState) -> u32 {
    match state {
        BufferState::Unused => 0x2010,
        BufferState::Pending => 0x2011,
        BufferState::Processed => 0x2012,
    }
}

pub fn playback_mode_token(mode: PlaybackMode) -> u32 {
    match mode {
        PlaybackMode::Undetermined => 0x1030,
        PlaybackMode::Static => 0x1028,
        PlaybackMode::Streaming => 0x1029,
    }
}

pub fn format_token(format: SampleFormat) -> u32 {
    match format {
        SampleFormat::Mono8 => 0x1100,
        SampleFormat::Mono16 => 0x1101,
        SampleFormat::Stereo8 => 0x1102,
        SampleFormat::Stereo16 => 0x1103,
    }
}

pub fn format_from_token(value: u32) -> Option<SampleFormat> {
    match value {
        0x1100 => Some(SampleFormat::Mono8),
        0x1101 => Some(SampleFormat::Mono16),
        0x1102 => Some(SampleFormat::Stereo8),
        0x1103 => Some(SampleFormat::Stereo16),
        _ => None,
    }
}

pub fn distance_model_token(model: DistanceModel) -> u32 {
    match model {
        DistanceModel::None => 0,
        DistanceModel::Inverse => 0xD001,
        DistanceModel::InverseClamped => 0xD002,
        DistanceModel::Linear => 0xD003,
        DistanceModel::LinearClamped => 0xD004,
        DistanceModel::Exponent => 0xD005,
        DistanceModel::ExponentClamped => 0xD006,
    }
}

pub fn distance_model_from_token(value: u32) -> Option<DistanceModel> {
    match value {
        0 => Some(DistanceModel::None),
        0xD001 => Some(DistanceModel::Inverse),
        0xD002 => Some(DistanceModel::InverseClamped),
        0xD003 => Some(DistanceModel::Linear),
        0xD004 => Some(DistanceModel::LinearClamped),
        0xD005 => Some(DistanceModel::Exponent),
        0xD006 => Some(DistanceModel::ExponentClamped),
        _ => None,
    }
}
