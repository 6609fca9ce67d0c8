//! # Transactions and Their Wire Format
//!
//! Legacy (non-witness) serialization:
//!
//! ```text
//! version(4) | varint n_in | n_in × (txid(32) vout(4) varint+scriptSig sequence(4))
//!            | varint n_out | n_out × (value(8) varint+scriptPubKey) | lock_time(4)
//! ```
//!
//! All integers are little-endian. Txids are stored in internal byte order
//! and displayed reversed, matching Bitcoin Core.

use crate::encode::{varint_len, Reader, Writer};
use crate::error::{LockError, LockResult};
use crate::hash::sha256d;
use crate::script::Script;
use std::fmt;
use std::str::FromStr;

/// Bytes after the version in a BIP144 serialization
const SEGWIT_MARKER: [u8; 2] = [0x00, 0x01];

/// Transaction id in internal byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Txid([u8; 32]);

impl Txid {
    pub fn from_byte_array(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn to_byte_array(self) -> [u8; 32] {
        self.0
    }
}

impl fmt::Display for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut display = self.0;
        display.reverse();
        write!(f, "{}", hex::encode(display))
    }
}

impl FromStr for Txid {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)
            .map_err(|e| LockError::serialization(format!("invalid txid {}: {}", s, e)))?;
        let mut array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| LockError::serialization(format!("txid must be 32 bytes: {}", s)))?;
        array.reverse();
        Ok(Self(array))
    }
}

/// Reference to an output of a previous transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    pub txid: Txid,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: Txid, vout: u32) -> Self {
        Self { txid, vout }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub previous_output: OutPoint,
    /// Empty until the input is signed.
    pub script_sig: Script,
    pub sequence: u32,
}

impl TxIn {
    fn write_to(&self, writer: &mut Writer) {
        writer.write_bytes(&self.previous_output.txid.to_byte_array());
        writer.write_u32_le(self.previous_output.vout);
        writer.write_var_bytes(self.script_sig.as_bytes());
        writer.write_u32_le(self.sequence);
    }

    fn read_from(reader: &mut Reader) -> LockResult<Self> {
        let txid = Txid::from_byte_array(reader.read_array()?);
        let vout = reader.read_u32_le()?;
        let script_sig = Script::from_bytes(reader.read_var_bytes()?.to_vec());
        let sequence = reader.read_u32_le()?;
        Ok(Self {
            previous_output: OutPoint::new(txid, vout),
            script_sig,
            sequence,
        })
    }

    fn size(&self) -> usize {
        32 + 4 + varint_len(self.script_sig.len() as u64) + self.script_sig.len() + 4
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    /// Value in satoshis.
    pub value: u64,
    pub script_pubkey: Script,
}

impl TxOut {
    fn write_to(&self, writer: &mut Writer) {
        writer.write_u64_le(self.value);
        writer.write_var_bytes(self.script_pubkey.as_bytes());
    }

    fn read_from(reader: &mut Reader) -> LockResult<Self> {
        let value = reader.read_u64_le()?;
        let script_pubkey = Script::from_bytes(reader.read_var_bytes()?.to_vec());
        Ok(Self {
            value,
            script_pubkey,
        })
    }

    fn size(&self) -> usize {
        8 + varint_len(self.script_pubkey.len() as u64) + self.script_pubkey.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub lock_time: u32,
    pub input: Vec<TxIn>,
    pub output: Vec<TxOut>,
}

impl Transaction {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::with_capacity(self.size());
        writer.write_i32_le(self.version);

        writer.write_varint(self.input.len() as u64);
        for input in &self.input {
            input.write_to(&mut writer);
        }

        writer.write_varint(self.output.len() as u64);
        for output in &self.output {
            output.write_to(&mut writer);
        }

        writer.write_u32_le(self.lock_time);
        writer.into_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Parse exactly one legacy transaction; trailing bytes are an error.
    pub fn from_bytes(bytes: &[u8]) -> LockResult<Self> {
        let mut reader = Reader::new(bytes);

        let version = reader.read_i32_le()?;
        if bytes.get(4..6) == Some(&SEGWIT_MARKER[..]) {
            return Err(LockError::serialization(
                "segwit serialization (marker 0x00, flag 0x01) is not supported",
            ));
        }

        let input_count = reader.read_varint()?;
        // every input takes at least 41 bytes
        if input_count > (reader.remaining() / 41) as u64 {
            return Err(LockError::serialization(format!(
                "input count {} exceeds available data",
                input_count
            )));
        }
        let mut input = Vec::with_capacity(input_count as usize);
        for _ in 0..input_count {
            input.push(TxIn::read_from(&mut reader)?);
        }

        let output_count = reader.read_varint()?;
        // every output takes at least 9 bytes
        if output_count > (reader.remaining() / 9) as u64 {
            return Err(LockError::serialization(format!(
                "output count {} exceeds available data",
                output_count
            )));
        }
        let mut output = Vec::with_capacity(output_count as usize);
        for _ in 0..output_count {
            output.push(TxOut::read_from(&mut reader)?);
        }

        let lock_time = reader.read_u32_le()?;

        if reader.remaining() != 0 {
            return Err(LockError::serialization(format!(
                "trailing {} bytes after transaction",
                reader.remaining()
            )));
        }

        Ok(Self {
            version,
            lock_time,
            input,
            output,
        })
    }

    pub fn from_hex(s: &str) -> LockResult<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| LockError::serialization(format!("invalid transaction hex: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Double SHA-256 of the serialization.
    pub fn txid(&self) -> Txid {
        Txid::from_byte_array(sha256d(&self.to_bytes()))
    }

    /// Serialized size in bytes, computed without serializing.
    pub fn size(&self) -> usize {
        4 + varint_len(self.input.len() as u64)
            + self.input.iter().map(TxIn::size).sum::<usize>()
            + varint_len(self.output.len() as u64)
            + self.output.iter().map(TxOut::size).sum::<usize>()
            + 4
    }

    pub fn total_output_value(&self) -> u64 {
        self.output.iter().map(|o| o.value).sum()
    }
}
