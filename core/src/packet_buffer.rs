//! Binary packet serialization.
//!
//! Every message on the wire is a length-prefixed run of little-endian
//! bytes: a `u16` total-size header (which includes itself), a `u16`
//! opcode, and an opaque payload. `PacketBuffer` is the payload
//! reader/writer; [`extract_frame`] reassembles frames from a raw stream
//! buffer.

use std::fmt;

/// Smallest legal frame: the size header plus the opcode.
pub const MIN_FRAME_SIZE: usize = 4;
/// Largest legal frame. Anything larger closes the stream.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Read/write cursor over a packet payload.
///
/// Reads never panic: reading past the end yields a zero value and latches
/// the `underrun` flag so the caller can log the frame as malformed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PacketBuffer {
    data: Vec<u8>,
    read_pos: usize,
    underrun: bool,
}

impl PacketBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            data,
            read_pos: 0,
            underrun: false,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.read_pos)
    }

    /// True once any read has run past the end of the payload.
    pub fn underrun(&self) -> bool {
        self.underrun
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.read_pos = 0;
        self.underrun = false;
    }

    // ------------------------------------------------------------------
    //  Writers
    // ------------------------------------------------------------------

    pub fn write_u8(&mut self, val: u8) {
        self.data.push(val);
    }

    pub fn write_i8(&mut self, val: i8) {
        self.write_u8(val as u8);
    }

    pub fn write_u16(&mut self, val: u16) {
        self.data.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_i16(&mut self, val: i16) {
        self.write_u16(val as u16);
    }

    pub fn write_u32(&mut self, val: u32) {
        self.data.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_i32(&mut self, val: i32) {
        self.write_u32(val as u32);
    }

    pub fn write_u64(&mut self, val: u64) {
        self.data.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_i64(&mut self, val: i64) {
        self.write_u64(val as u64);
    }

    pub fn write_f32(&mut self, val: f32) {
        self.write_u32(val.to_bits());
    }

    pub fn write_f64(&mut self, val: f64) {
        self.write_u64(val.to_bits());
    }

    pub fn write_bool(&mut self, val: bool) {
        self.write_u8(u8::from(val));
    }

    /// Strings go out as a `u16` byte length followed by the raw bytes.
    /// Longer strings are truncated at the length-field limit.
    pub fn write_str(&mut self, val: &str) {
        let bytes = val.as_bytes();
        let len = bytes.len().min(u16::MAX as usize);
        self.write_u16(len as u16);
        self.data.extend_from_slice(&bytes[..len]);
    }

    // ------------------------------------------------------------------
    //  Readers
    // ------------------------------------------------------------------

    fn take(&mut self, count: usize) -> Option<&[u8]> {
        if self.read_pos + count <= self.data.len() {
            let slice = &self.data[self.read_pos..self.read_pos + count];
            self.read_pos += count;
            Some(slice)
        } else {
            self.read_pos = self.data.len();
            self.underrun = true;
            None
        }
    }

    pub fn read_u8(&mut self) -> u8 {
        self.take(1).map(|b| b[0]).unwrap_or(0)
    }

    pub fn read_i8(&mut self) -> i8 {
        self.read_u8() as i8
    }

    pub fn read_u16(&mut self) -> u16 {
        self.take(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .unwrap_or(0)
    }

    pub fn read_i16(&mut self) -> i16 {
        self.read_u16() as i16
    }

    pub fn read_u32(&mut self) -> u32 {
        self.take(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .unwrap_or(0)
    }

    pub fn read_i32(&mut self) -> i32 {
        self.read_u32() as i32
    }

    pub fn read_u64(&mut self) -> u64 {
        self.take(8)
            .map(|b| u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .unwrap_or(0)
    }

    pub fn read_i64(&mut self) -> i64 {
        self.read_u64() as i64
    }

    pub fn read_f32(&mut self) -> f32 {
        f32::from_bits(self.read_u32())
    }

    pub fn read_f64(&mut self) -> f64 {
        f64::from_bits(self.read_u64())
    }

    pub fn read_bool(&mut self) -> bool {
        self.read_u8() != 0
    }

    pub fn read_string(&mut self) -> String {
        let len = self.read_u16() as usize;
        match self.take(len) {
            Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            None => String::new(),
        }
    }

    // ------------------------------------------------------------------
    //  Framing
    // ------------------------------------------------------------------

    /// Produce the on-wire frame for this payload: size header, opcode,
    /// payload bytes.
    pub fn into_frame(self, opcode: u16) -> Vec<u8> {
        let total = self.data.len() + MIN_FRAME_SIZE;
        debug_assert!(total <= MAX_FRAME_SIZE);
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&(total as u16).to_le_bytes());
        out.extend_from_slice(&opcode.to_le_bytes());
        out.extend_from_slice(&self.data);
        out
    }
}

/// Why a stream must be closed during frame extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Size header smaller than the header + opcode it must cover.
    TooShort(u16),
    /// Size header beyond the frame limit.
    TooLarge(u16),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::TooShort(size) => write!(f, "frame size {size} below minimum"),
            FrameError::TooLarge(size) => write!(f, "frame size {size} above maximum"),
        }
    }
}

/// Pull the next complete frame out of a stream reassembly buffer.
///
/// Returns `Ok(None)` while the buffer holds only a partial frame, and
/// `Ok(Some((opcode, payload)))` once one is complete, draining its bytes.
/// A size header outside `[MIN_FRAME_SIZE, MAX_FRAME_SIZE]` is a protocol
/// violation: the caller must drop the connection.
pub fn extract_frame(stream: &mut Vec<u8>) -> Result<Option<(u16, PacketBuffer)>, FrameError> {
    if stream.len() < 2 {
        return Ok(None);
    }

    let size = u16::from_le_bytes([stream[0], stream[1]]);
    if (size as usize) < MIN_FRAME_SIZE {
        return Err(FrameError::TooShort(size));
    }
    if size as usize > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(size));
    }
    if stream.len() < size as usize {
        return Ok(None);
    }

    let opcode = u16::from_le_bytes([stream[2], stream[3]]);
    let payload = stream[MIN_FRAME_SIZE..size as usize].to_vec();
    stream.drain(..size as usize);
    Ok(Some((opcode, PacketBuffer::from_bytes(payload))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_round_trip() {
        let mut buf = PacketBuffer::new();
        buf.write_u8(0xAB);
        buf.write_i8(-3);
        buf.write_u16(0xBEEF);
        buf.write_i16(-1234);
        buf.write_u32(0xDEADBEEF);
        buf.write_i32(-77_000);
        buf.write_u64(0x1122_3344_5566_7788);
        buf.write_i64(-9_000_000_000);
        buf.write_f32(3.5);
        buf.write_f64(-0.125);
        buf.write_bool(true);
        buf.write_str("Anna");

        let mut rd = PacketBuffer::from_bytes(buf.data().to_vec());
        assert_eq!(rd.read_u8(), 0xAB);
        assert_eq!(rd.read_i8(), -3);
        assert_eq!(rd.read_u16(), 0xBEEF);
        assert_eq!(rd.read_i16(), -1234);
        assert_eq!(rd.read_u32(), 0xDEADBEEF);
        assert_eq!(rd.read_i32(), -77_000);
        assert_eq!(rd.read_u64(), 0x1122_3344_5566_7788);
        assert_eq!(rd.read_i64(), -9_000_000_000);
        assert_eq!(rd.read_f32(), 3.5);
        assert_eq!(rd.read_f64(), -0.125);
        assert!(rd.read_bool());
        assert_eq!(rd.read_string(), "Anna");
        assert!(!rd.underrun());
        assert_eq!(rd.remaining(), 0);
    }

    #[test]
    fn values_are_little_endian() {
        let mut buf = PacketBuffer::new();
        buf.write_u16(0x0102);
        buf.write_u32(0x03040506);
        assert_eq!(buf.data(), &[0x02, 0x01, 0x06, 0x05, 0x04, 0x03]);
    }

    #[test]
    fn empty_string_round_trips() {
        let mut buf = PacketBuffer::new();
        buf.write_str("");
        let mut rd = PacketBuffer::from_bytes(buf.data().to_vec());
        assert_eq!(rd.read_string(), "");
        assert!(!rd.underrun());
    }

    #[test]
    fn underrun_reads_zero_and_latches() {
        let mut rd = PacketBuffer::from_bytes(vec![0x01]);
        assert_eq!(rd.read_u32(), 0);
        assert!(rd.underrun());
        // Further reads keep yielding zero.
        assert_eq!(rd.read_u16(), 0);
        assert_eq!(rd.read_string(), "");
    }

    #[test]
    fn truncated_string_is_underrun() {
        let mut buf = PacketBuffer::new();
        buf.write_u16(10);
        buf.write_u8(b'x');
        let mut rd = PacketBuffer::from_bytes(buf.data().to_vec());
        assert_eq!(rd.read_string(), "");
        assert!(rd.underrun());
    }

    #[test]
    fn frame_layout() {
        let mut buf = PacketBuffer::new();
        buf.write_u32(42);
        let frame = buf.into_frame(0x0063);
        assert_eq!(frame.len(), 8);
        assert_eq!(&frame[..2], &8u16.to_le_bytes());
        assert_eq!(&frame[2..4], &0x0063u16.to_le_bytes());
    }

    #[test]
    fn extract_partial_then_complete() {
        let mut buf = PacketBuffer::new();
        buf.write_str("hello");
        let frame = buf.into_frame(0x10);

        let mut stream = frame[..3].to_vec();
        assert_eq!(extract_frame(&mut stream), Ok(None));

        stream.extend_from_slice(&frame[3..]);
        let (opcode, mut payload) = extract_frame(&mut stream).unwrap().unwrap();
        assert_eq!(opcode, 0x10);
        assert_eq!(payload.read_string(), "hello");
        assert!(stream.is_empty());
    }

    #[test]
    fn extract_two_frames_in_order() {
        let mut stream = Vec::new();
        for op in [1u16, 2u16] {
            let mut buf = PacketBuffer::new();
            buf.write_u16(op * 100);
            stream.extend_from_slice(&buf.into_frame(op));
        }
        let (op1, _) = extract_frame(&mut stream).unwrap().unwrap();
        let (op2, _) = extract_frame(&mut stream).unwrap().unwrap();
        assert_eq!((op1, op2), (1, 2));
    }

    #[test]
    fn undersized_header_rejects_stream() {
        let mut stream = vec![0x03, 0x00, 0x00];
        assert_eq!(extract_frame(&mut stream), Err(FrameError::TooShort(3)));
    }

    #[test]
    fn max_size_frame_is_accepted() {
        // 64 KiB - 1 total size is the largest representable frame.
        let payload_len = (u16::MAX as usize) - MIN_FRAME_SIZE;
        let big = PacketBuffer::from_bytes(vec![0xEE; payload_len]);
        let mut stream = big.into_frame(0x5C);
        let (opcode, payload) = extract_frame(&mut stream).unwrap().unwrap();
        assert_eq!(opcode, 0x5C);
        assert_eq!(payload.len(), payload_len);
    }
}
