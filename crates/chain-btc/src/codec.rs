//! Raw transaction byte codec.
//!
//! ```text
//! Transaction:
//!   version              u32 LE
//!   [marker, flag]       0x00 0x01 (SegWit only)
//!   input_count          varint
//!   inputs[]             prev_txid(32) | vout u32 LE | script_sig varbytes | sequence u32 LE
//!   output_count         varint
//!   outputs[]            value u64 LE | script_pubkey varbytes
//!   [witnesses]          one stack per input: item_count varint | items varbytes (SegWit only)
//!   lock_time            u32 LE
//! ```
//!
//! Only the 1-byte and `0xfd`-prefixed 3-byte varint forms are decoded.
//! Transactions with more than 65535 inputs, outputs or witness items are
//! rejected with [`BtcError::UnsupportedVarInt`] rather than misread.

use crypto_utils::hash::sha256d;
use tracing::debug;

use crate::error::BtcError;

/// SegWit marker byte following the version.
pub const SEGWIT_MARKER: u8 = 0x00;

/// SegWit flag byte following the marker.
pub const SEGWIT_FLAG: u8 = 0x01;

/// Default sequence number (final, no relative lock-time, no RBF).
pub const DEFAULT_SEQUENCE: u32 = 0xFFFF_FFFF;

/// A transaction input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    /// Previous transaction id in wire (internal, little-endian) byte order.
    pub prev_txid: [u8; 32],
    pub vout: u32,
    /// Unlocking script. Empty for SegWit and Taproot spends.
    pub script_sig: Vec<u8>,
    pub sequence: u32,
    /// Witness stack. Only serialized when the transaction carries the
    /// SegWit marker; an empty stack encodes as a single `0x00`.
    pub witness: Vec<Vec<u8>>,
}

impl TxInput {
    /// Build an unsigned input from a display-order txid.
    pub fn new(txid_hex: &str, vout: u32) -> Result<Self, BtcError> {
        Ok(Self {
            prev_txid: parse_txid(txid_hex)?,
            vout,
            script_sig: Vec::new(),
            sequence: DEFAULT_SEQUENCE,
            witness: Vec::new(),
        })
    }

    /// Previous txid in display (big-endian) order.
    pub fn txid_hex(&self) -> String {
        let mut display = self.prev_txid;
        display.reverse();
        hex::encode(display)
    }
}

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    /// Value in satoshis.
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

impl TxOutput {
    /// Whether the locking script is a SegWit v1 (P2TR) program.
    pub fn is_p2tr(&self) -> bool {
        self.script_pubkey.len() == 34
            && self.script_pubkey[0] == 0x51
            && self.script_pubkey[1] == 0x20
    }
}

/// A decoded raw transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    pub version: u32,
    /// Whether the SegWit marker and flag are present on the wire.
    pub segwit: bool,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u32,
}

impl RawTransaction {
    /// Parse a transaction from its hex encoding.
    pub fn from_hex(tx_hex: &str) -> Result<Self, BtcError> {
        let bytes = hex::decode(tx_hex.trim()).map_err(|e| BtcError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Parse a transaction from raw bytes. The buffer must hold exactly one
    /// transaction.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BtcError> {
        let mut reader = TxReader::new(bytes);

        let version = reader.read_u32_le("version")?;

        let segwit = reader.peek(2) == Some(&[SEGWIT_MARKER, SEGWIT_FLAG][..]);
        if segwit {
            reader.skip(2, "segwit marker")?;
        }

        let input_count = reader.read_varint("input count")?;
        let mut inputs = Vec::with_capacity(input_count.min(1024));
        for _ in 0..input_count {
            let txid = reader.read_bytes(32, "input txid")?;
            let mut prev_txid = [0u8; 32];
            prev_txid.copy_from_slice(txid);
            inputs.push(TxInput {
                prev_txid,
                vout: reader.read_u32_le("input vout")?,
                script_sig: reader.read_var_bytes("input script")?.to_vec(),
                sequence: reader.read_u32_le("input sequence")?,
                witness: Vec::new(),
            });
        }

        let output_count = reader.read_varint("output count")?;
        let mut outputs = Vec::with_capacity(output_count.min(1024));
        for _ in 0..output_count {
            outputs.push(TxOutput {
                value: reader.read_u64_le("output value")?,
                script_pubkey: reader.read_var_bytes("output script")?.to_vec(),
            });
        }

        if segwit {
            for input in inputs.iter_mut() {
                let items = reader.read_varint("witness item count")?;
                let mut stack = Vec::with_capacity(items.min(64));
                for _ in 0..items {
                    stack.push(reader.read_var_bytes("witness item")?.to_vec());
                }
                input.witness = stack;
            }
        }

        let lock_time = reader.read_u32_le("lock time")?;

        if reader.remaining() != 0 {
            return Err(BtcError::MalformedTransaction(format!(
                "{} trailing bytes after lock time",
                reader.remaining()
            )));
        }

        debug!(
            inputs = inputs.len(),
            outputs = outputs.len(),
            segwit,
            "decoded raw transaction"
        );

        Ok(Self {
            version,
            segwit,
            inputs,
            outputs,
            lock_time,
        })
    }

    /// Serialize to wire bytes, including marker, flag and witnesses when
    /// `segwit` is set.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.serialize(self.segwit)
    }

    /// Serialize without marker, flag or witnesses (the txid preimage).
    pub fn to_bytes_without_witness(&self) -> Vec<u8> {
        self.serialize(false)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Transaction id in internal byte order.
    pub fn txid_bytes(&self) -> [u8; 32] {
        sha256d(&self.to_bytes_without_witness())
    }

    /// Transaction id in display order.
    pub fn txid(&self) -> String {
        let mut display = self.txid_bytes();
        display.reverse();
        hex::encode(display)
    }

    pub fn has_taproot_output(&self) -> bool {
        self.outputs.iter().any(TxOutput::is_p2tr)
    }

    fn serialize(&self, with_witness: bool) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(&self.version.to_le_bytes());

        if with_witness {
            buf.push(SEGWIT_MARKER);
            buf.push(SEGWIT_FLAG);
        }

        write_varint(&mut buf, self.inputs.len() as u64);
        for input in &self.inputs {
            buf.extend_from_slice(&input.prev_txid);
            buf.extend_from_slice(&input.vout.to_le_bytes());
            write_var_bytes(&mut buf, &input.script_sig);
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }

        write_varint(&mut buf, self.outputs.len() as u64);
        for output in &self.outputs {
            buf.extend_from_slice(&output.value.to_le_bytes());
            write_var_bytes(&mut buf, &output.script_pubkey);
        }

        if with_witness {
            for input in &self.inputs {
                write_witness(&mut buf, &input.witness);
            }
        }

        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        buf
    }
}

/// Decode a hex transaction.
pub fn decode(tx_hex: &str) -> Result<RawTransaction, BtcError> {
    RawTransaction::from_hex(tx_hex)
}

/// Encode a transaction to hex.
pub fn encode(tx: &RawTransaction) -> String {
    tx.to_hex()
}

/// Parse a hex txid string (display order) to internal byte order.
pub fn parse_txid(txid_hex: &str) -> Result<[u8; 32], BtcError> {
    let bytes = hex::decode(txid_hex).map_err(|e| BtcError::InvalidHex(format!("txid: {e}")))?;
    let mut result: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        BtcError::TransactionBuildError(format!("txid must be 32 bytes, got {}", bytes.len()))
    })?;
    result.reverse();
    Ok(result)
}

/// Write a Bitcoin-style CompactSize. The writer emits every form; the
/// reader accepts only the 1- and 3-byte ones.
pub fn write_varint(buf: &mut Vec<u8>, val: u64) {
    if val < 0xFD {
        buf.push(val as u8);
    } else if val <= 0xFFFF {
        buf.push(0xFD);
        buf.extend_from_slice(&(val as u16).to_le_bytes());
    } else if val <= 0xFFFF_FFFF {
        buf.push(0xFE);
        buf.extend_from_slice(&(val as u32).to_le_bytes());
    } else {
        buf.push(0xFF);
        buf.extend_from_slice(&val.to_le_bytes());
    }
}

/// Length-prefixed byte string.
pub fn write_var_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    write_varint(buf, data.len() as u64);
    buf.extend_from_slice(data);
}

/// Witness stack: item count followed by length-prefixed items.
pub fn write_witness(buf: &mut Vec<u8>, stack: &[Vec<u8>]) {
    write_varint(buf, stack.len() as u64);
    for item in stack {
        write_var_bytes(buf, item);
    }
}

/// Sequential cursor over a transaction buffer. Owned by a single decode
/// call.
struct TxReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> TxReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn peek(&self, len: usize) -> Option<&'a [u8]> {
        self.bytes.get(self.pos..self.pos + len)
    }

    fn read_bytes(&mut self, len: usize, field: &str) -> Result<&'a [u8], BtcError> {
        let end = self.pos.checked_add(len).filter(|&end| end <= self.bytes.len());
        match end {
            Some(end) => {
                let slice = &self.bytes[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(BtcError::MalformedTransaction(format!(
                "reading {field}: need {len} bytes at offset {}, {} left",
                self.pos,
                self.remaining()
            ))),
        }
    }

    fn skip(&mut self, len: usize, field: &str) -> Result<(), BtcError> {
        self.read_bytes(len, field).map(|_| ())
    }

    fn read_u8(&mut self, field: &str) -> Result<u8, BtcError> {
        Ok(self.read_bytes(1, field)?[0])
    }

    fn read_u32_le(&mut self, field: &str) -> Result<u32, BtcError> {
        let mut arr = [0u8; 4];
        arr.copy_from_slice(self.read_bytes(4, field)?);
        Ok(u32::from_le_bytes(arr))
    }

    fn read_u64_le(&mut self, field: &str) -> Result<u64, BtcError> {
        let mut arr = [0u8; 8];
        arr.copy_from_slice(self.read_bytes(8, field)?);
        Ok(u64::from_le_bytes(arr))
    }

    fn read_varint(&mut self, field: &str) -> Result<usize, BtcError> {
        match self.read_u8(field)? {
            n if n < 0xFD => Ok(n as usize),
            0xFD => {
                let mut arr = [0u8; 2];
                arr.copy_from_slice(self.read_bytes(2, field)?);
                let value = u16::from_le_bytes(arr);
                if value < 0xFD {
                    return Err(BtcError::MalformedTransaction(format!(
                        "non-canonical varint for {field}"
                    )));
                }
                Ok(value as usize)
            }
            prefix => Err(BtcError::UnsupportedVarInt(prefix)),
        }
    }

    fn read_var_bytes(&mut self, field: &str) -> Result<&'a [u8], BtcError> {
        let len = self.read_varint(field)?;
        self.read_bytes(len, field)
    }
}
