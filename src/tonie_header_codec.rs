use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::Error;

/// Decoded form of the outer tonie record: SHA-1 of the payload, payload
/// length, the Ogg serial number shared by every page, and the page number
/// at which each chapter begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TonieHeaderRecord {
    pub data_hash: Vec<u8>,
    pub data_length: u32,
    pub timestamp: u32,
    pub chapter_pages: Vec<u32>,
}

const TAG_DATA_HASH: u8 = (1 << 3) | 2;
const TAG_DATA_LENGTH: u8 = (2 << 3) | 0;
const TAG_TIMESTAMP: u8 = (3 << 3) | 0;
const TAG_CHAPTER_PAGES: u8 = (4 << 3) | 2;
const TAG_PADDING: u8 = (5 << 3) | 2;

const SLOT_SIZE: usize = 0x1000;
const HEADER_PADDING_TARGET: usize = 0xffc;
const PADDING_SLACK: usize = 0x100;

fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn read_varint<R: Read>(reader: &mut R) -> std::io::Result<u64> {
    let mut result = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = reader.read_u8()?;
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    Ok(result)
}

fn encode(record: &TonieHeaderRecord, padding_len: usize) -> Vec<u8> {
    let mut buf = Vec::new();

    buf.push(TAG_DATA_HASH);
    write_varint(&mut buf, record.data_hash.len() as u64);
    buf.extend_from_slice(&record.data_hash);

    buf.push(TAG_DATA_LENGTH);
    write_varint(&mut buf, record.data_length as u64);

    buf.push(TAG_TIMESTAMP);
    write_varint(&mut buf, record.timestamp as u64);

    let mut packed = Vec::new();
    for &page in &record.chapter_pages {
        write_varint(&mut packed, page as u64);
    }
    buf.push(TAG_CHAPTER_PAGES);
    write_varint(&mut buf, packed.len() as u64);
    buf.extend_from_slice(&packed);

    buf.push(TAG_PADDING);
    write_varint(&mut buf, padding_len as u64);
    buf.extend(std::iter::repeat(0u8).take(padding_len));

    buf
}

fn decode(bytes: &[u8]) -> Result<TonieHeaderRecord, Error> {
    let mut cursor = std::io::Cursor::new(bytes);
    let mut data_hash = None;
    let mut data_length = None;
    let mut timestamp = None;
    let mut chapter_pages = Vec::new();

    while (cursor.position() as usize) < bytes.len() {
        let tag = cursor.read_u8().map_err(|e| Error::HeaderDecodeError {
            reason: e.to_string(),
        })?;
        let wire_type = tag & 0x7;
        match tag {
            TAG_DATA_HASH => {
                let len = read_varint(&mut cursor).map_err(io_err)? as usize;
                let mut v = vec![0u8; len];
                cursor.read_exact(&mut v).map_err(io_err)?;
                data_hash = Some(v);
            }
            TAG_DATA_LENGTH => {
                data_length = Some(read_varint(&mut cursor).map_err(io_err)? as u32);
            }
            TAG_TIMESTAMP => {
                timestamp = Some(read_varint(&mut cursor).map_err(io_err)? as u32);
            }
            TAG_CHAPTER_PAGES => {
                let len = read_varint(&mut cursor).map_err(io_err)? as usize;
                let mut packed = vec![0u8; len];
                cursor.read_exact(&mut packed).map_err(io_err)?;
                let mut inner = std::io::Cursor::new(packed);
                while (inner.position() as usize) < len {
                    chapter_pages.push(read_varint(&mut inner).map_err(io_err)? as u32);
                }
            }
            TAG_PADDING => {
                let len = read_varint(&mut cursor).map_err(io_err)? as usize;
                cursor
                    .seek(SeekFrom::Current(len as i64))
                    .map_err(io_err)?;
            }
            _ => {
                // Skip unknown fields generically by wire type.
                match wire_type {
                    0 => {
                        read_varint(&mut cursor).map_err(io_err)?;
                    }
                    2 => {
                        let len = read_varint(&mut cursor).map_err(io_err)? as i64;
                        cursor.seek(SeekFrom::Current(len)).map_err(io_err)?;
                    }
                    other => {
                        return Err(Error::HeaderDecodeError {
                            reason: format!("unsupported wire type {other}"),
                        })
                    }
                }
            }
        }
    }

    Ok(TonieHeaderRecord {
        data_hash: data_hash.ok_or_else(|| Error::HeaderDecodeError {
            reason: "missing dataHash field".into(),
        })?,
        data_length: data_length.ok_or_else(|| Error::HeaderDecodeError {
            reason: "missing dataLength field".into(),
        })?,
        timestamp: timestamp.ok_or_else(|| Error::HeaderDecodeError {
            reason: "missing timestamp field".into(),
        })?,
        chapter_pages,
    })
}

fn io_err(e: std::io::Error) -> Error {
    Error::HeaderDecodeError {
        reason: e.to_string(),
    }
}

/// Reads and writes the 4096-byte header slot that precedes the Ogg payload
/// in a tonie container file.
pub struct TonieHeaderCodec;

impl TonieHeaderCodec {
    pub fn read<R: Read>(reader: &mut R) -> Result<TonieHeaderRecord, Error> {
        let len = reader.read_u32::<BigEndian>()?;
        let mut buf = vec![0u8; len as usize];
        reader.read_exact(&mut buf)?;
        decode(&buf)
    }

    /// Writes the header record, sized by the `0xFFC - L0 + 0x100` padding
    /// formula so the 4-byte length prefix plus record always fill exactly
    /// one 4096-byte slot. `L0` is measured with a provisional 0x100-byte
    /// padding field already in place, because 0x100 is the smallest value
    /// whose varint length prefix takes the same two bytes the real padding
    /// length will need — that keeps the two passes' framing overhead equal
    /// so the final size lands exactly on target.
    pub fn write<W: Write + Seek>(writer: &mut W, record: &TonieHeaderRecord) -> Result<(), Error> {
        let baseline = encode(record, PADDING_SLACK);
        let l0 = baseline.len();
        let padding_len = (HEADER_PADDING_TARGET + PADDING_SLACK)
            .checked_sub(l0)
            .ok_or_else(|| Error::HeaderDecodeError {
                reason: format!("tonie header record of {l0} bytes does not fit the 4096-byte slot"),
            })?;
        let bytes = encode(record, padding_len);

        let start = writer.stream_position()?;
        writer.write_u32::<BigEndian>(bytes.len() as u32)?;
        writer.write_all(&bytes)?;
        let written = (writer.stream_position()? - start) as usize;
        if written != SLOT_SIZE {
            return Err(Error::HeaderDecodeError {
                reason: format!("header slot came out to {written} bytes, expected {SLOT_SIZE}"),
            });
        }
        Ok(())
    }
}
