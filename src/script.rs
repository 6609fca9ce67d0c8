//! # Script Encoding
//!
//! Raw script bytes, a builder that always emits minimal pushes, and a parser
//! that turns bytes back into opcodes and data pushes.
//!
//! ## Push encoding
//! - Numbers `-1` and `0..=16` use `OP_1NEGATE`, `OP_0` and `OP_1..OP_16`.
//! - Other numbers are pushed as minimal little-endian script numbers with a
//!   sign bit, so a lock height of 1747851 becomes `03 8bab1a`.
//! - Data shorter than 76 bytes uses a direct length prefix, longer data uses
//!   `OP_PUSHDATA1/2/4`.

use crate::encode::Reader;
use crate::error::{LockError, LockResult};
use std::fmt;

/// Opcode byte values used by the templates in this crate.
pub mod opcodes {
    pub const OP_0: u8 = 0x00;
    pub const OP_PUSHDATA1: u8 = 0x4c;
    pub const OP_PUSHDATA2: u8 = 0x4d;
    pub const OP_PUSHDATA4: u8 = 0x4e;
    pub const OP_1NEGATE: u8 = 0x4f;
    pub const OP_1: u8 = 0x51;
    pub const OP_16: u8 = 0x60;
    pub const OP_NOP: u8 = 0x61;
    pub const OP_IF: u8 = 0x63;
    pub const OP_NOTIF: u8 = 0x64;
    pub const OP_ELSE: u8 = 0x67;
    pub const OP_ENDIF: u8 = 0x68;
    pub const OP_VERIFY: u8 = 0x69;
    pub const OP_RETURN: u8 = 0x6a;
    pub const OP_DROP: u8 = 0x75;
    pub const OP_DUP: u8 = 0x76;
    pub const OP_EQUAL: u8 = 0x87;
    pub const OP_EQUALVERIFY: u8 = 0x88;
    pub const OP_RIPEMD160: u8 = 0xa6;
    pub const OP_SHA256: u8 = 0xa8;
    pub const OP_HASH160: u8 = 0xa9;
    pub const OP_HASH256: u8 = 0xaa;
    pub const OP_CODESEPARATOR: u8 = 0xab;
    pub const OP_CHECKSIG: u8 = 0xac;
    pub const OP_CHECKSIGVERIFY: u8 = 0xad;
    pub const OP_CHECKMULTISIG: u8 = 0xae;
    pub const OP_CHECKLOCKTIMEVERIFY: u8 = 0xb1;
    pub const OP_CHECKSEQUENCEVERIFY: u8 = 0xb2;
}

use opcodes::*;

/// Largest script number CHECKLOCKTIMEVERIFY accepts, in bytes.
pub const MAX_LOCKTIME_NUM_LEN: usize = 5;

/// Canonical name of an opcode byte.
pub fn opcode_name(op: u8) -> String {
    let name = match op {
        OP_0 => "OP_0",
        OP_PUSHDATA1 => "OP_PUSHDATA1",
        OP_PUSHDATA2 => "OP_PUSHDATA2",
        OP_PUSHDATA4 => "OP_PUSHDATA4",
        OP_1NEGATE => "OP_1NEGATE",
        OP_1..=OP_16 => return format!("OP_{}", op - OP_1 + 1),
        OP_NOP => "OP_NOP",
        OP_IF => "OP_IF",
        OP_NOTIF => "OP_NOTIF",
        OP_ELSE => "OP_ELSE",
        OP_ENDIF => "OP_ENDIF",
        OP_VERIFY => "OP_VERIFY",
        OP_RETURN => "OP_RETURN",
        OP_DROP => "OP_DROP",
        OP_DUP => "OP_DUP",
        OP_EQUAL => "OP_EQUAL",
        OP_EQUALVERIFY => "OP_EQUALVERIFY",
        OP_RIPEMD160 => "OP_RIPEMD160",
        OP_SHA256 => "OP_SHA256",
        OP_HASH160 => "OP_HASH160",
        OP_HASH256 => "OP_HASH256",
        OP_CODESEPARATOR => "OP_CODESEPARATOR",
        OP_CHECKSIG => "OP_CHECKSIG",
        OP_CHECKSIGVERIFY => "OP_CHECKSIGVERIFY",
        OP_CHECKMULTISIG => "OP_CHECKMULTISIG",
        OP_CHECKLOCKTIMEVERIFY => "OP_CHECKLOCKTIMEVERIFY",
        OP_CHECKSEQUENCEVERIFY => "OP_CHECKSEQUENCEVERIFY",
        other => return format!("OP_UNKNOWN_0x{:02x}", other),
    };
    name.to_string()
}

/// Encode `n` as a minimal script number.
pub fn encode_script_num(n: i64) -> Vec<u8> {
    if n == 0 {
        return Vec::new();
    }

    let negative = n < 0;
    let mut abs = n.unsigned_abs();
    let mut out = Vec::with_capacity(9);
    while abs > 0 {
        out.push((abs & 0xff) as u8);
        abs >>= 8;
    }

    // the top bit of the last byte is the sign
    let last = out.len() - 1;
    if out[last] & 0x80 != 0 {
        out.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        out[last] |= 0x80;
    }
    out
}

/// Decode a minimally encoded script number of at most `max_len` bytes.
pub fn decode_script_num(bytes: &[u8], max_len: usize) -> LockResult<i64> {
    if bytes.len() > max_len {
        return Err(LockError::serialization(format!(
            "script number of {} bytes exceeds {}",
            bytes.len(),
            max_len
        )));
    }
    if bytes.is_empty() {
        return Ok(0);
    }

    let last = bytes[bytes.len() - 1];
    if last & 0x7f == 0 && (bytes.len() == 1 || bytes[bytes.len() - 2] & 0x80 == 0) {
        return Err(LockError::serialization(format!(
            "script number {} is not minimally encoded",
            hex::encode(bytes)
        )));
    }

    let mut value: i64 = 0;
    for (i, b) in bytes.iter().enumerate() {
        value |= i64::from(*b) << (8 * i);
    }
    if last & 0x80 != 0 {
        let sign_bit = 0x80_i64 << (8 * (bytes.len() - 1));
        Ok(-(value & !sign_bit))
    } else {
        Ok(value)
    }
}

/// One parsed element of a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// A non-push opcode, or one of the small-number opcodes.
    Op(u8),
    /// Data pushed by a direct or `OP_PUSHDATAn` push.
    Push(Vec<u8>),
}

impl Instruction {
    /// Numeric value of small-number opcodes and of short minimal pushes.
    pub fn as_number(&self) -> Option<i64> {
        match self {
            Instruction::Op(OP_0) => Some(0),
            Instruction::Op(OP_1NEGATE) => Some(-1),
            Instruction::Op(op @ OP_1..=OP_16) => Some(i64::from(op - OP_1 + 1)),
            Instruction::Push(data) if !data.is_empty() && data.len() <= 4 => {
                decode_script_num(data, 4).ok()
            }
            _ => None,
        }
    }

    fn token(&self) -> Token {
        if let Some(n) = self.as_number() {
            return Token::Number(n);
        }
        match self {
            Instruction::Op(op) => Token::Name(opcode_name(*op)),
            Instruction::Push(data) => Token::Name(hex::encode(data)),
        }
    }
}

enum Token {
    Number(i64),
    Name(String),
}

/// Serialized script bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Script(Vec<u8>);

impl Script {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> LockResult<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| LockError::serialization(format!("invalid script hex: {}", e)))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.clone()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse the bytes into instructions. Truncated pushes are an error.
    pub fn instructions(&self) -> LockResult<Vec<Instruction>> {
        let mut reader = Reader::new(&self.0);
        let mut out = Vec::new();

        while reader.remaining() > 0 {
            let op = reader.read_u8()?;
            let push_len = match op {
                0x01..=0x4b => usize::from(op),
                OP_PUSHDATA1 => usize::from(reader.read_u8()?),
                OP_PUSHDATA2 => usize::from(reader.read_u16_le()?),
                OP_PUSHDATA4 => reader.read_u32_le()? as usize,
                _ => {
                    out.push(Instruction::Op(op));
                    continue;
                }
            };
            let data = reader.read_bytes(push_len).map_err(|_| {
                LockError::serialization(format!(
                    "push of {} bytes runs past the end of the script",
                    push_len
                ))
            })?;
            out.push(Instruction::Push(data.to_vec()));
        }

        Ok(out)
    }

    /// Space separated listing in the style of `bitcoin-cli decodescript`.
    pub fn to_asm(&self) -> String {
        match self.instructions() {
            Ok(instructions) => instructions
                .iter()
                .map(|i| match i.token() {
                    Token::Number(n) => n.to_string(),
                    Token::Name(s) => s,
                })
                .collect::<Vec<_>>()
                .join(" "),
            Err(_) => format!("[error] {}", self.to_hex()),
        }
    }
}

/// Renders as a bracketed list: numbers bare, opcodes and data quoted.
impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let instructions = match self.instructions() {
            Ok(instructions) => instructions,
            Err(_) => return write!(f, "[error] {}", self.to_hex()),
        };
        write!(f, "[")?;
        for (i, instruction) in instructions.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match instruction.token() {
                Token::Number(n) => write!(f, "{}", n)?,
                Token::Name(s) => write!(f, "'{}'", s)?,
            }
        }
        write!(f, "]")
    }
}

/// Incremental script construction with minimal push encoding.
#[derive(Debug, Default)]
pub struct Builder(Vec<u8>);

impl Builder {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push_opcode(mut self, op: u8) -> Self {
        self.0.push(op);
        self
    }

    pub fn push_int(self, n: i64) -> Self {
        match n {
            0 => self.push_opcode(OP_0),
            -1 => self.push_opcode(OP_1NEGATE),
            1..=16 => self.push_opcode(OP_1 + (n as u8) - 1),
            _ => self.push_slice(&encode_script_num(n)),
        }
    }

    pub fn push_slice(mut self, data: &[u8]) -> Self {
        let len = data.len();
        if len < usize::from(OP_PUSHDATA1) {
            self.0.push(len as u8);
        } else if len <= 0xff {
            self.0.push(OP_PUSHDATA1);
            self.0.push(len as u8);
        } else if len <= 0xffff {
            self.0.push(OP_PUSHDATA2);
            self.0.extend_from_slice(&(len as u16).to_le_bytes());
        } else {
            self.0.push(OP_PUSHDATA4);
            self.0.extend_from_slice(&(len as u32).to_le_bytes());
        }
        self.0.extend_from_slice(data);
        self
    }

    pub fn into_script(self) -> Script {
        Script(self.0)
    }
}
