//! Wire encoding for the three protocol beacons plus the evaluation beacon,
//! all little-endian per the fixed layouts below. The upstream C structs are
//! `packed` and reinterpreted in place from raw buffers; this codec keeps the
//! same byte layout but goes through explicit `byteorder` reads/writes
//! instead of buffer reinterpretation, so a short or malformed frame is a
//! caught [`CodecError`] rather than undefined behavior.
//!
//! Grounded on `ftsp.h`/`gtsp.h` and `pulsesync.h` field layouts under
//! `examples/original_source/sys/net/include/`.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::error::CodecError;

/// One-byte protocol discriminator at payload offset 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DispatchMarker {
    Gtsp = 0x20,
    ClockSyncEval = 0x21,
    Ftsp = 0x23,
    PulseSync = 0x24,
}

impl DispatchMarker {
    pub fn from_byte(b: u8) -> Result<Self, CodecError> {
        match b {
            0x20 => Ok(DispatchMarker::Gtsp),
            0x21 => Ok(DispatchMarker::ClockSyncEval),
            0x23 => Ok(DispatchMarker::Ftsp),
            0x24 => Ok(DispatchMarker::PulseSync),
            other => Err(CodecError::UnknownDispatchMarker(other)),
        }
    }
}

/// FTSP / PulseSync beacon: 17 bytes on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeBeacon {
    pub id: u16,
    pub root: u16,
    pub seq_number: u16,
    pub global: i64,
}

pub const TREE_BEACON_LEN: usize = 1 + 2 + 2 + 2 + 8;

impl TreeBeacon {
    pub fn encode(&self, marker: DispatchMarker, buf: &mut Vec<u8>) {
        buf.push(marker as u8);
        buf.write_u16::<LittleEndian>(self.id).unwrap();
        buf.write_u16::<LittleEndian>(self.root).unwrap();
        buf.write_u16::<LittleEndian>(self.seq_number).unwrap();
        buf.write_i64::<LittleEndian>(self.global).unwrap();
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < TREE_BEACON_LEN {
            return Err(CodecError::Truncated { expected: TREE_BEACON_LEN, got: buf.len() });
        }
        let mut c = Cursor::new(&buf[1..]);
        let id = c.read_u16::<LittleEndian>().unwrap();
        let root = c.read_u16::<LittleEndian>().unwrap();
        let seq_number = c.read_u16::<LittleEndian>().unwrap();
        let global = c.read_i64::<LittleEndian>().unwrap();
        Ok(TreeBeacon { id, root, seq_number, global })
    }
}

/// GTSP beacon: 21 bytes on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GtspBeacon {
    pub local: u64,
    pub global: i64,
    pub relative_rate: f32,
}

pub const GTSP_BEACON_LEN: usize = 1 + 8 + 8 + 4;

impl GtspBeacon {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(DispatchMarker::Gtsp as u8);
        buf.write_u64::<LittleEndian>(self.local).unwrap();
        buf.write_i64::<LittleEndian>(self.global).unwrap();
        buf.write_f32::<LittleEndian>(self.relative_rate).unwrap();
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < GTSP_BEACON_LEN {
            return Err(CodecError::Truncated { expected: GTSP_BEACON_LEN, got: buf.len() });
        }
        let mut c = Cursor::new(&buf[1..]);
        let local = c.read_u64::<LittleEndian>().unwrap();
        let global = c.read_i64::<LittleEndian>().unwrap();
        let relative_rate = c.read_f32::<LittleEndian>().unwrap();
        Ok(GtspBeacon { local, global, relative_rate })
    }
}

/// Evaluation beacon (independent observer, not part of any sync protocol): 5 bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalBeacon {
    pub counter: u32,
}

pub const EVAL_BEACON_LEN: usize = 1 + 4;

impl EvalBeacon {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(DispatchMarker::ClockSyncEval as u8);
        buf.write_u32::<LittleEndian>(self.counter).unwrap();
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < EVAL_BEACON_LEN {
            return Err(CodecError::Truncated { expected: EVAL_BEACON_LEN, got: buf.len() });
        }
        let mut c = Cursor::new(&buf[1..]);
        let counter = c.read_u32::<LittleEndian>().unwrap();
        Ok(EvalBeacon { counter })
    }
}
