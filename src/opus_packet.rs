use crate::error::Error;

/// Per-config-group frame durations in samples at 48kHz, for CELT-only
/// (config 16..=31) encodings. Every tonie audio page uses this range; SILK
/// and Hybrid modes are not produced by the device encoder and are rejected.
fn frame_duration_samples(config: u8, page_no: u32, packet_index: usize) -> Result<u64, Error> {
    if !(16..=31).contains(&config) {
        return Err(Error::UnsupportedOpus {
            page_no,
            packet_index,
            reason: format!("config {config} is not a CELT-only (16..=31) encoding"),
        });
    }
    let ms = match config % 4 {
        0 => 2.5,
        1 => 5.0,
        2 => 10.0,
        3 => 20.0,
        _ => unreachable!(),
    };
    Ok((ms * 48.0) as u64)
}

/// The Opus TOC byte, decoded: `CCCCCSFF` (config, stereo, framepacking).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpusToc {
    pub config: u8,
    pub stereo: bool,
    pub framepacking: u8,
}

impl OpusToc {
    pub fn parse(byte: u8) -> Self {
        OpusToc {
            config: byte >> 3,
            stereo: (byte & 0b100) != 0,
            framepacking: byte & 0b11,
        }
    }
}

/// A logical Opus packet: TOC byte plus payload, held as the bytes that will
/// be resegmented into 255-byte Ogg lacing chunks at serialization time.
#[derive(Debug, Clone, Default)]
pub struct OpusPacket {
    pub data: Vec<u8>,
}

impl OpusPacket {
    pub fn new(data: Vec<u8>) -> Self {
        OpusPacket { data }
    }

    pub fn toc(&self) -> Option<OpusToc> {
        self.data.first().copied().map(OpusToc::parse)
    }

    pub fn framepacking(&self) -> Option<u8> {
        self.toc().map(|t| t.framepacking)
    }

    pub fn is_padded(&self) -> bool {
        self.framepacking() == Some(3) && self.data.get(1).is_some_and(|b| b & 0x40 != 0)
    }

    fn frame_count_raw(&self, page_no: u32, packet_index: usize) -> Result<u32, Error> {
        let fp = self.toc().ok_or_else(|| Error::UnsupportedOpus {
            page_no,
            packet_index,
            reason: "empty opus packet".into(),
        })?;
        match fp.framepacking {
            0 => Ok(1),
            1 | 2 => Ok(2),
            3 => {
                let byte = *self.data.get(1).ok_or_else(|| Error::MalformedOgg {
                    offset: 0,
                    reason: "code 3 packet missing frame-count byte".into(),
                })?;
                Ok((byte & 0x3f) as u32)
            }
            _ => unreachable!(),
        }
    }

    pub fn duration_samples(&self, page_no: u32, packet_index: usize) -> Result<u64, Error> {
        let toc = self.toc().ok_or_else(|| Error::UnsupportedOpus {
            page_no,
            packet_index,
            reason: "empty opus packet".into(),
        })?;
        let frame_count = self.frame_count_raw(page_no, packet_index)?;
        let per_frame = frame_duration_samples(toc.config, page_no, packet_index)?;
        Ok(per_frame * frame_count as u64)
    }

    /// Converts a code 0/1/2 packet to code 3 framepacking in place. No-op if
    /// already code 3. The packet grows by exactly one byte (the new
    /// frame-count byte) unless it was already code 3.
    pub fn three_pack(&mut self, page_no: u32, packet_index: usize) -> Result<(), Error> {
        let toc = self.toc().ok_or_else(|| Error::UnsupportedOpus {
            page_no,
            packet_index,
            reason: "empty opus packet".into(),
        })?;
        if toc.framepacking == 3 {
            return Ok(());
        }
        if toc.framepacking == 2 {
            let size1 = *self.data.get(1).ok_or_else(|| Error::MalformedOgg {
                offset: 0,
                reason: "code 2 packet missing length byte".into(),
            })?;
            if size1 >= 255 {
                return Err(Error::UnsupportedOpus {
                    page_no,
                    packet_index,
                    reason: "code 2 packet's first frame is too long to three-pack".into(),
                });
            }
        }
        let frame_count: u8 = match toc.framepacking {
            0 => 1,
            1 | 2 => 2,
            _ => unreachable!(),
        };
        let mut frame_count_byte = frame_count;
        if toc.framepacking == 2 {
            frame_count_byte |= 0x80;
        }
        let mut new_data = Vec::with_capacity(self.data.len() + 1);
        new_data.push(self.data[0] | 0b11);
        new_data.push(frame_count_byte);
        new_data.extend_from_slice(&self.data[1..]);
        self.data = new_data;
        Ok(())
    }

    /// Pads a code 3 packet with Opus padding. `pad_len` is the number of
    /// bytes this call adds to the packet (length bytes plus zero bytes).
    /// `pad_len == 0` is a special case: it inserts a single zero-valued
    /// length byte, contributing exactly one byte.
    pub fn pad(&mut self, pad_len: u32, page_no: u32, packet_index: usize) -> Result<(), Error> {
        let toc = self.toc().ok_or_else(|| Error::UnsupportedOpus {
            page_no,
            packet_index,
            reason: "empty opus packet".into(),
        })?;
        if toc.framepacking != 3 {
            return Err(Error::UnsupportedOpus {
                page_no,
                packet_index,
                reason: "pad requires a code 3 packet".into(),
            });
        }
        if self.is_padded() {
            return Err(Error::UnsupportedOpus {
                page_no,
                packet_index,
                reason: "packet is already padded".into(),
            });
        }
        let frame_count_byte = self.data[1] | 0x40;

        if pad_len == 0 {
            let mut new_data = Vec::with_capacity(self.data.len() + 1);
            new_data.push(self.data[0]);
            new_data.push(frame_count_byte);
            new_data.push(0);
            new_data.extend_from_slice(&self.data[2..]);
            self.data = new_data;
            return Ok(());
        }

        let packet_len = self.data.len() as u32;
        let last_seg_len = packet_len % 255;
        let zero_count = if last_seg_len + pad_len < 255 {
            pad_len - 1
        } else {
            let added_segs = (last_seg_len + pad_len) / 255;
            let added_pads = (pad_len / 255) + 1;
            pad_len - added_segs - added_pads
        };

        let full_255_count = zero_count / 255;
        let mut length_bytes = Vec::with_capacity(full_255_count as usize + 1);
        for _ in 0..full_255_count {
            length_bytes.push(255u8);
        }
        length_bytes.push((zero_count % 255) as u8);

        let mut new_data =
            Vec::with_capacity(self.data.len() + length_bytes.len() + zero_count as usize);
        new_data.push(self.data[0]);
        new_data.push(frame_count_byte);
        new_data.extend_from_slice(&length_bytes);
        new_data.extend_from_slice(&self.data[2..]);
        new_data.extend(std::iter::repeat(0u8).take(zero_count as usize));
        self.data = new_data;
        Ok(())
    }

    /// The Ogg lacing-value sequence this packet serializes to: chunks of
    /// 255, an empty terminator if the length is an exact multiple of 255,
    /// otherwise a final chunk shorter than 255.
    pub fn segment_lengths(&self) -> Vec<u8> {
        let mut lens = Vec::new();
        let mut remaining = self.data.len();
        loop {
            let chunk = remaining.min(255);
            lens.push(chunk as u8);
            remaining -= chunk;
            if chunk < 255 {
                break;
            }
            if remaining == 0 {
                lens.push(0);
                break;
            }
        }
        lens
    }

    /// Bytes this packet contributes to a page: its lacing values plus payload.
    pub fn serialized_len(&self) -> usize {
        self.segment_lengths().len() + self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code0(config: u8) -> OpusPacket {
        OpusPacket::new(vec![config << 3, 0xaa, 0xbb])
    }

    #[test]
    fn toc_parses_fields() {
        let toc = OpusToc::parse(0b10101_1_01);
        assert_eq!(toc.config, 0b10101);
        assert!(toc.stereo);
        assert_eq!(toc.framepacking, 0b01);
    }

    #[test]
    fn three_pack_code0_adds_one_byte() {
        let mut p = code0(20);
        let before = p.data.len();
        p.three_pack(2, 0).unwrap();
        assert_eq!(p.data.len(), before + 1);
        assert_eq!(p.toc().unwrap().framepacking, 3);
        assert_eq!(p.data[1] & 0x3f, 1);
    }

    #[test]
    fn three_pack_is_idempotent() {
        let mut p = code0(20);
        p.three_pack(2, 0).unwrap();
        let len_after_first = p.data.len();
        p.three_pack(2, 0).unwrap();
        assert_eq!(p.data.len(), len_after_first);
    }

    #[test]
    fn pad_zero_adds_single_byte() {
        let mut p = code0(20);
        p.three_pack(2, 0).unwrap();
        let before = p.data.len();
        p.pad(0, 2, 0).unwrap();
        assert_eq!(p.data.len(), before + 1);
        assert!(p.is_padded());
        assert_eq!(p.data[2], 0);
    }

    #[test]
    fn pad_adds_exact_byte_count_for_small_values() {
        let mut p = code0(20);
        p.three_pack(2, 0).unwrap();
        let before = p.data.len();
        p.pad(10, 2, 0).unwrap();
        assert_eq!(p.data.len(), before + 10);
    }

    #[test]
    fn pad_rejects_non_code3() {
        let mut p = code0(20);
        assert!(p.pad(5, 2, 0).is_err());
    }

    #[test]
    fn pad_rejects_double_pad() {
        let mut p = code0(20);
        p.three_pack(2, 0).unwrap();
        p.pad(5, 2, 0).unwrap();
        assert!(p.pad(1, 2, 0).is_err());
    }

    #[test]
    fn segment_lengths_under_255() {
        let p = OpusPacket::new(vec![0u8; 100]);
        assert_eq!(p.segment_lengths(), vec![100]);
    }

    #[test]
    fn segment_lengths_exact_multiple_of_255() {
        let p = OpusPacket::new(vec![0u8; 255]);
        assert_eq!(p.segment_lengths(), vec![255, 0]);
    }

    #[test]
    fn segment_lengths_spanning_two_chunks() {
        let p = OpusPacket::new(vec![0u8; 300]);
        assert_eq!(p.segment_lengths(), vec![255, 45]);
    }

    #[test]
    fn duration_samples_for_20ms_frame() {
        let p = code0(19); // 19 % 4 == 3 -> 20ms
        assert_eq!(p.duration_samples(2, 0).unwrap(), 960);
    }

    #[test]
    fn duration_rejects_non_celt_config() {
        let p = code0(0);
        assert!(p.duration_samples(2, 0).is_err());
    }
}
