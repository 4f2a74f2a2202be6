//! EV3 Direct Command Protocol
//!
//! Byte layout of direct command frames sent to the brick and of the
//! direct replies it sends back. Everything here is pure: no state, no I/O.

use thiserror::Error;

/// Direct command types (EV3 Communication Developer Kit, section 4)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    /// The brick answers with the reserved global variables
    Reply = 0x00,
    /// Fire-and-forget
    NoReply = 0x80,
}

/// Reply type of a successful direct command
pub const DIRECT_REPLY: u8 = 0x02;

/// Size of the fixed command header (length, counter, type, allocation)
pub const COMMAND_HEADER_LEN: usize = 7;

/// Offset of the payload in a reply frame
pub const REPLY_PAYLOAD_OFFSET: usize = 5;

/// Opcodes used by this crate
pub mod opcode {
    pub const OUTPUT_STEP_SPEED: u8 = 0xAE;
    pub const OUTPUT_TIME_SPEED: u8 = 0xAF;
    pub const OUTPUT_STOP: u8 = 0xA3;
    pub const OUTPUT_RESET: u8 = 0xA2;
    pub const OUTPUT_GET_COUNT: u8 = 0xB3;
    pub const SOUND: u8 = 0x94;
    pub const SOUND_CMD_TONE: u8 = 1;
    pub const SOUND_CMD_STOP: u8 = 0;
    pub const UI_WRITE: u8 = 0x82;
    pub const UI_WRITE_LED: u8 = 0x1B;
    pub const INPUT_DEVICE_LIST: u8 = 0x98;
    pub const INPUT_READSI: u8 = 0x9D;
}

/// Argument encodings and fixed argument values
pub mod value {
    /// Chain layer; daisy-chained bricks are not supported
    pub const LAYER: u8 = 0x00;
    /// One byte follows
    pub const NUM8: u8 = 0x81;
    /// Two bytes follow
    pub const NUM16: u8 = 0x82;
    /// Four bytes follow
    pub const NUM32: u8 = 0x83;
    /// Global variable, one byte index follows
    pub const GV1: u8 = 0xE1;
    pub const COAST: u8 = 0x00;
    pub const BRAKE: u8 = 0x01;
    /// Default ramp length (ms or degrees)
    pub const LONG_RAMP: u32 = 50;
    pub const DO_NOT_CHANGE_TYPE: u8 = 0;
    /// Beep volume
    pub const TONE_VOLUME: u8 = 2;
}

/// Globals reserved by a device list request
pub const DEVICE_LIST_ALLOCATION: u16 = 33;

/// Bytes of reply space per sensor or motor slot
pub const VALUE_SLOT_SIZE: u16 = 4;

/// Globals reserved by a values request: a slot per sensor and per motor port
pub const VALUES_ALLOCATION: u16 = 8 * VALUE_SLOT_SIZE;

/// Errors produced while parsing a reply frame
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplyError {
    #[error("reply too short: {len} bytes")]
    TooShort { len: usize },
    #[error("unexpected reply type {0:#04X}")]
    UnexpectedType(u8),
}

/// Build a direct command frame
///
/// # Frame Structure
///
/// ```text
/// [0-1] : Length (u16 little-endian), excludes these two bytes
/// [2-3] : Message counter (always 0)
/// [4]   : Command type (REPLY / NO_REPLY)
/// [5-6] : Global allocation (u16 little-endian)
/// [7-n] : Opcodes and arguments
/// ```
///
/// The opcode sequence is copied verbatim; a malformed sequence yields a
/// malformed frame.
pub fn encode(kind: CommandType, ops: &[u8], allocation: u16) -> Vec<u8> {
    let len = (COMMAND_HEADER_LEN - 2 + ops.len()) as u16;
    let mut frame = Vec::with_capacity(COMMAND_HEADER_LEN + ops.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&[0, 0]);
    frame.push(kind as u8);
    frame.extend_from_slice(&allocation.to_le_bytes());
    frame.extend_from_slice(ops);
    frame
}

/// Parse a reply frame and return its payload
///
/// # Reply Structure
///
/// ```text
/// [0-1] : Length (u16 little-endian)
/// [2-3] : Message counter
/// [4]   : Reply type (DIRECT_REPLY on success)
/// [5-n] : Reserved global variables
/// ```
pub fn parse_reply(bytes: &[u8]) -> Result<&[u8], ReplyError> {
    if bytes.len() < REPLY_PAYLOAD_OFFSET {
        return Err(ReplyError::TooShort { len: bytes.len() });
    }
    match bytes[4] {
        DIRECT_REPLY => Ok(&bytes[REPLY_PAYLOAD_OFFSET..]),
        other => Err(ReplyError::UnexpectedType(other)),
    }
}

/// Payload of a direct reply, or `None` for anything else
pub fn decode_reply(bytes: &[u8]) -> Option<&[u8]> {
    parse_reply(bytes).ok()
}

/// `NUM8` prefixed byte
pub fn num8(byte: u8) -> [u8; 2] {
    [value::NUM8, byte]
}

/// `NUM16` prefixed little-endian value
pub fn num16(n: u16) -> [u8; 3] {
    let [lo, hi] = n.to_le_bytes();
    [value::NUM16, lo, hi]
}

/// `NUM32` prefixed little-endian value
pub fn num32(n: u32) -> [u8; 5] {
    let [b0, b1, b2, b3] = n.to_le_bytes();
    [value::NUM32, b0, b1, b2, b3]
}

/// Run-phase argument: 16 bits while it fits below `0x7fff`, else 32 bits
pub fn run_value(run: u32) -> Vec<u8> {
    if run < 0x7fff {
        num16(run as u16).to_vec()
    } else {
        num32(run).to_vec()
    }
}

/// Motor ports are addressed as an output bit field (1, 2, 4, 8)
pub fn port_mask(port: usize) -> u8 {
    1 << port
}

/// Speed byte for a power magnitude, two's complement when reversed
pub fn signed_speed(power: u8, reverse: bool) -> u8 {
    if reverse {
        (0x100 - power as u16) as u8
    } else {
        power
    }
}

/// Decode a little-endian IEEE-754 value
pub fn decode_f32(bytes: [u8; 4]) -> f32 {
    f32::from_le_bytes(bytes)
}

/// Decode a little-endian tacho count, sign-extended from 32 bits
pub fn decode_count(bytes: [u8; 4]) -> i64 {
    i32::from_le_bytes(bytes) as i64
}

/// Opcode sequence requesting the list of attached devices
pub fn device_list_ops() -> [u8; 6] {
    [
        opcode::INPUT_DEVICE_LIST,
        value::NUM8,
        0x21, // array length
        0x60, // changed flag
        value::GV1,
        0x20, // global index of the list
    ]
}

/// `READSI` of one sensor port into the given global slot
pub fn read_si_ops(port: u8, mode: u8, global_index: u8) -> [u8; 7] {
    [
        opcode::INPUT_READSI,
        value::LAYER,
        port,
        value::DO_NOT_CHANGE_TYPE,
        mode,
        value::GV1,
        global_index,
    ]
}

/// `GET_COUNT` of one motor port into the given global slot
pub fn get_count_ops(port: u8, global_index: u8) -> [u8; 5] {
    [
        opcode::OUTPUT_GET_COUNT,
        value::LAYER,
        port,
        value::GV1,
        global_index,
    ]
}

/// `OUTPUT_STOP` for one motor
pub fn stop_ops(port: usize, brake: bool) -> [u8; 4] {
    [
        opcode::OUTPUT_STOP,
        value::LAYER,
        port_mask(port),
        if brake { value::BRAKE } else { value::COAST },
    ]
}

/// `OUTPUT_RESET` of one motor's tacho counter
pub fn reset_ops(port: usize) -> [u8; 3] {
    [opcode::OUTPUT_RESET, value::LAYER, port_mask(port)]
}

/// Play a tone at `freq` Hz for `duration_ms`
pub fn tone_ops(freq: u16, duration_ms: u16) -> Vec<u8> {
    let mut ops = vec![opcode::SOUND, opcode::SOUND_CMD_TONE];
    ops.extend_from_slice(&num8(value::TONE_VOLUME));
    ops.extend_from_slice(&num16(freq));
    ops.extend_from_slice(&num16(duration_ms));
    ops
}

/// Silence the speaker
pub fn stop_sound_ops() -> [u8; 2] {
    [opcode::SOUND, opcode::SOUND_CMD_STOP]
}

/// Set the brick status light pattern
pub fn led_ops(pattern: u8) -> [u8; 4] {
    [opcode::UI_WRITE, opcode::UI_WRITE_LED, value::NUM8, pattern]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_header_length() {
        let ops = [0xA3, 0x00, 0x01, 0x00];
        let frame = encode(CommandType::NoReply, &ops, 0);
        assert_eq!(frame.len(), ops.len() + COMMAND_HEADER_LEN);
        let len = u16::from_le_bytes([frame[0], frame[1]]) as usize;
        assert_eq!(len, frame.len() - 2);
        assert_eq!(frame[4], 0x80);
        assert_eq!(&frame[7..], &ops);
    }

    #[test]
    fn test_encode_allocation_is_little_endian() {
        let frame = encode(CommandType::Reply, &[], 0x0121);
        assert_eq!(&frame[2..7], &[0x00, 0x00, 0x00, 0x21, 0x01]);
    }

    #[test]
    fn test_decode_reply_rejects_short_and_foreign_frames() {
        assert_eq!(decode_reply(&[0x03, 0x00, 0x00, 0x00]), None);
        assert_eq!(decode_reply(&[0x03, 0x00, 0x00, 0x00, 0x04, 0x01]), None);
        assert_eq!(
            parse_reply(&[0x03, 0x00, 0x00, 0x00, 0x04]),
            Err(ReplyError::UnexpectedType(0x04))
        );
    }

    #[test]
    fn test_decode_reply_returns_payload() {
        let reply = [0x05, 0x00, 0x00, 0x00, DIRECT_REPLY, 0xAA, 0xBB];
        assert_eq!(decode_reply(&reply), Some(&[0xAA, 0xBB][..]));
        assert_eq!(decode_reply(&reply[..5]), Some(&[][..]));
    }

    #[test]
    fn test_float_decode_is_exact() {
        for v in [0.0f32, -1.5, 3.25, 255.0, f32::MIN_POSITIVE, f32::MAX, -123.456] {
            assert_eq!(decode_f32(v.to_le_bytes()), v);
        }
    }

    #[test]
    fn test_count_wraparound() {
        assert_eq!(decode_count([0xFF, 0xFF, 0xFF, 0x7F]), 0x7fff_ffff);
        assert_eq!(decode_count([0x00, 0x00, 0x00, 0x80]), -0x8000_0000);
        assert_eq!(decode_count([0xFF, 0xFF, 0xFF, 0xFF]), -1);
    }

    #[test]
    fn test_run_value_width() {
        assert_eq!(run_value(1900), vec![0x82, 0x6C, 0x07]);
        assert_eq!(run_value(0xffff), vec![0x83, 0xFF, 0xFF, 0x00, 0x00]);
    }

    #[test]
    fn test_signed_speed() {
        assert_eq!(signed_speed(50, false), 50);
        assert_eq!(signed_speed(50, true), 0xCE);
        assert_eq!(signed_speed(100, true), 0x9C);
    }

    #[test]
    fn test_tone_ops() {
        assert_eq!(
            tone_ops(440, 500),
            vec![0x94, 0x01, 0x81, 0x02, 0x82, 0xB8, 0x01, 0x82, 0xF4, 0x01]
        );
    }
}
