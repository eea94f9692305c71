//! API frame type identifiers.
//!
//! The type byte is the first byte of every frame body. Values not listed
//! here still decode, as [`crate::Frame::Generic`].

/// Local AT command.
pub const COMMAND: u8 = 0x08;

/// Response to a local AT command.
pub const COMMAND_RESPONSE: u8 = 0x88;

/// AT command addressed to a remote module.
pub const REMOTE_COMMAND: u8 = 0x17;

/// Response to a remote AT command.
pub const REMOTE_COMMAND_RESPONSE: u8 = 0x97;

/// Unsolicited IO data sample.
pub const IO_SAMPLE: u8 = 0x92;

/// Returns a human-readable name for a frame type.
pub fn type_name(frame_type: u8) -> &'static str {
    match frame_type {
        COMMAND => "COMMAND",
        COMMAND_RESPONSE => "COMMAND_RESPONSE",
        REMOTE_COMMAND => "REMOTE_COMMAND",
        REMOTE_COMMAND_RESPONSE => "REMOTE_COMMAND_RESPONSE",
        IO_SAMPLE => "IO_SAMPLE",
        _ => "GENERIC",
    }
}

/// Returns true if frames of this type carry a correlation id.
pub fn is_correlated(frame_type: u8) -> bool {
    matches!(
        frame_type,
        COMMAND | COMMAND_RESPONSE | REMOTE_COMMAND | REMOTE_COMMAND_RESPONSE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_types_have_names() {
        assert_eq!(type_name(COMMAND), "COMMAND");
        assert_eq!(type_name(COMMAND_RESPONSE), "COMMAND_RESPONSE");
        assert_eq!(type_name(REMOTE_COMMAND), "REMOTE_COMMAND");
        assert_eq!(type_name(REMOTE_COMMAND_RESPONSE), "REMOTE_COMMAND_RESPONSE");
        assert_eq!(type_name(IO_SAMPLE), "IO_SAMPLE");
        assert_eq!(type_name(0x10), "GENERIC");
    }

    #[test]
    fn only_command_types_are_correlated() {
        assert!(is_correlated(COMMAND));
        assert!(is_correlated(REMOTE_COMMAND_RESPONSE));
        assert!(!is_correlated(IO_SAMPLE));
        assert!(!is_correlated(0x8A));
    }
}
