use byteorder::{LittleEndian, WriteBytesExt};

use crate::crc;
use crate::error::Error;
use crate::opus_packet::OpusPacket;

pub const OGG_MAGIC: &[u8; 4] = b"OggS";
pub const PAGE_HEADER_LEN: usize = 27;

const PAGE_TYPE_CONTINUATION: u8 = 0x01;
const PAGE_TYPE_BOS: u8 = 0x02;
const PAGE_TYPE_EOS: u8 = 0x04;

/// A single Ogg page: header fields plus the logical Opus packets it
/// carries. Packets are resegmented into 255-byte lacing chunks whenever the
/// page is serialized, never stored pre-chunked.
#[derive(Debug, Clone)]
pub struct OggPage {
    pub version: u8,
    pub page_type: u8,
    pub granule_position: u64,
    pub serial_no: u32,
    pub page_no: u32,
    pub packets: Vec<OpusPacket>,
}

impl OggPage {
    pub fn segment_table(&self) -> Vec<u8> {
        self.packets
            .iter()
            .flat_map(|p| p.segment_lengths())
            .collect()
    }

    pub fn segment_count(&self) -> usize {
        self.segment_table().len()
    }

    /// Total serialized size of this page in bytes, including the header.
    pub fn serialized_len(&self) -> usize {
        PAGE_HEADER_LEN
            + self.segment_count()
            + self.packets.iter().map(|p| p.data.len()).sum::<usize>()
    }

    /// Combined duration of every packet on this page, in samples. Header
    /// pages (page_no 0 and 1) carry no audio and report zero.
    pub fn duration(&self) -> Result<u64, Error> {
        if self.page_no < 2 {
            return Ok(0);
        }
        let mut total = 0u64;
        for (i, packet) in self.packets.iter().enumerate() {
            total += packet.duration_samples(self.page_no, i)?;
        }
        Ok(total)
    }

    fn header_bytes(&self, page_type: u8, granule_position: u64, page_no: u32) -> Vec<u8> {
        let table = self.segment_table();
        let mut out = Vec::with_capacity(PAGE_HEADER_LEN + table.len());
        out.extend_from_slice(OGG_MAGIC);
        out.push(self.version);
        out.push(page_type);
        out.write_u64::<LittleEndian>(granule_position).unwrap();
        out.write_u32::<LittleEndian>(self.serial_no).unwrap();
        out.write_u32::<LittleEndian>(page_no).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap(); // checksum placeholder
        out.push(table.len() as u8);
        out.extend_from_slice(&table);
        out
    }

    fn finish(&self, mut bytes: Vec<u8>) -> Vec<u8> {
        for packet in &self.packets {
            bytes.extend_from_slice(&packet.data);
        }
        let checksum = crc::crc32(&bytes);
        bytes[22..26].copy_from_slice(&checksum.to_le_bytes());
        bytes
    }

    /// Serializes this page with its header fields exactly as stored, for
    /// pages that must round-trip byte-for-byte unchanged.
    pub fn serialize_unchanged(&self) -> Vec<u8> {
        let header = self.header_bytes(self.page_type, self.granule_position, self.page_no);
        self.finish(header)
    }

    /// Serializes this page with a freshly computed page_type (continuation
    /// bit is never set by this re-framer), granule position and page
    /// number. Used when relabelling audio pages during compose.
    pub fn serialize_with(&self, is_last: bool, granule_position: u64, page_no: u32) -> Vec<u8> {
        let page_type = if is_last { PAGE_TYPE_EOS } else { 0 };
        let header = self.header_bytes(page_type, granule_position, page_no);
        self.finish(header)
    }

    fn overflow(&self, target_size: usize) -> Error {
        Error::PadOverflow {
            page_no: self.page_no,
            target: target_size,
            actual: self.serialized_len(),
        }
    }

    /// Pads this page to exactly `target_size` bytes using the canonical
    /// five-step ladder: three-pack the last packet, then the second-to-last,
    /// then pad the last packet with the remaining bytes, and finally a
    /// one-byte special case on the second-to-last packet when exactly one
    /// byte is still missing. A `missing` value of exactly 1 can never be
    /// expressed by padding the last packet alone (the length-byte minimum
    /// is one byte, which collides with the one byte actually needed), so
    /// that case always routes straight to the second-to-last packet.
    pub fn pad_page(&mut self, target_size: usize) -> Result<(), Error> {
        let page_no = self.page_no;
        let remaining = |page: &Self| target_size as i64 - page.serialized_len() as i64;

        if self.packets.is_empty() {
            return Err(self.overflow(target_size));
        }

        let missing = remaining(self);
        if missing == 0 {
            return Ok(());
        }
        if missing < 0 {
            return Err(self.overflow(target_size));
        }

        let last_idx = self.packets.len() - 1;
        let second_last_idx = if self.packets.len() >= 2 {
            Some(self.packets.len() - 2)
        } else {
            None
        };

        self.packets[last_idx].three_pack(page_no, last_idx)?;
        let missing = remaining(self);
        if missing == 0 {
            return Ok(());
        }

        if let Some(idx) = second_last_idx {
            self.packets[idx].three_pack(page_no, idx)?;
        }
        let missing = remaining(self);
        if missing == 0 {
            return Ok(());
        }
        if missing < 0 {
            return Err(self.overflow(target_size));
        }

        if missing != 1 {
            self.packets[last_idx].pad(missing as u32, page_no, last_idx)?;
            let missing = remaining(self);
            if missing == 0 {
                return Ok(());
            }
            if missing != 1 {
                return Err(self.overflow(target_size));
            }
        }

        if let Some(idx) = second_last_idx {
            self.packets[idx].pad(0, page_no, idx)?;
            if remaining(self) == 0 {
                return Ok(());
            }
        }

        Err(self.overflow(target_size))
    }
}

pub fn is_continuation(page_type: u8) -> bool {
    page_type & PAGE_TYPE_CONTINUATION != 0
}

pub fn is_bos(page_type: u8) -> bool {
    page_type & PAGE_TYPE_BOS != 0
}

pub fn is_eos(page_type: u8) -> bool {
    page_type & PAGE_TYPE_EOS != 0
}
