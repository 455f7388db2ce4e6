use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::Error;
use crate::ogg_page::{OggPage, OGG_MAGIC, PAGE_HEADER_LEN};
use crate::opus_packet::OpusPacket;

/// Sequential Ogg page-stream reader. Pages must appear with strictly
/// monotonic, zero-based `page_no` values and no recovery is attempted on a
/// malformed header — this re-framer operates only on well-formed device
/// output, never on arbitrary or corrupted Ogg streams.
pub struct OggParser;

impl OggParser {
    pub fn parse_all<R: Read>(reader: &mut R) -> Result<Vec<OggPage>, Error> {
        let mut pages = Vec::new();
        let mut offset: u64 = 0;
        loop {
            let mut magic = [0u8; 4];
            match reader.read_exact(&mut magic) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof && offset == 0 => {
                    return Err(Error::MalformedOgg {
                        offset,
                        reason: "empty stream".into(),
                    })
                }
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(Error::Io(e)),
            }
            if &magic != OGG_MAGIC {
                return Err(Error::MalformedOgg {
                    offset,
                    reason: "missing OggS magic".into(),
                });
            }

            let version = reader.read_u8()?;
            let page_type = reader.read_u8()?;
            let granule_position = reader.read_u64::<LittleEndian>()?;
            let serial_no = reader.read_u32::<LittleEndian>()?;
            let page_no = reader.read_u32::<LittleEndian>()?;
            let _checksum = reader.read_u32::<LittleEndian>()?;
            let segment_count = reader.read_u8()? as usize;

            if page_no as usize != pages.len() {
                return Err(Error::MalformedOgg {
                    offset,
                    reason: format!(
                        "expected page_no {}, found {page_no}",
                        pages.len()
                    ),
                });
            }

            let mut lengths = vec![0u8; segment_count];
            reader.read_exact(&mut lengths)?;
            let payload_len: usize = lengths.iter().map(|&l| l as usize).sum();
            let mut payload = vec![0u8; payload_len];
            reader.read_exact(&mut payload)?;

            let packets = split_into_packets(&lengths, &payload, offset)?;

            pages.push(OggPage {
                version,
                page_type,
                granule_position,
                serial_no,
                page_no,
                packets,
            });

            offset += (PAGE_HEADER_LEN + segment_count + payload_len) as u64;
        }
        Ok(pages)
    }
}

fn split_into_packets(
    lengths: &[u8],
    payload: &[u8],
    offset: u64,
) -> Result<Vec<OpusPacket>, Error> {
    let mut packets = Vec::new();
    let mut current = Vec::new();
    let mut cursor = 0usize;
    for &len in lengths {
        let len = len as usize;
        current.extend_from_slice(&payload[cursor..cursor + len]);
        cursor += len;
        if len < 255 {
            packets.push(OpusPacket::new(std::mem::take(&mut current)));
        }
    }
    if !current.is_empty() {
        return Err(Error::MalformedOgg {
            offset,
            reason: "opus packet spans ogg pages; unsupported".into(),
        });
    }
    Ok(packets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ogg_page::OggPage;

    fn page_bytes(page: &OggPage) -> Vec<u8> {
        page.serialize_unchanged()
    }

    fn opus_packet(config: u8, payload_len: usize) -> OpusPacket {
        let mut data = vec![config << 3];
        data.extend(std::iter::repeat(0xaa).take(payload_len));
        OpusPacket::new(data)
    }

    #[test]
    fn parses_a_minimal_stream() {
        let p0 = OggPage {
            version: 0,
            page_type: 2,
            granule_position: 0,
            serial_no: 42,
            page_no: 0,
            packets: vec![OpusPacket::new(b"OpusHead".to_vec())],
        };
        let p1 = OggPage {
            version: 0,
            page_type: 0,
            granule_position: 0,
            serial_no: 42,
            page_no: 1,
            packets: vec![OpusPacket::new(b"OpusTags".to_vec())],
        };
        let mut bytes = Vec::new();
        bytes.extend(page_bytes(&p0));
        bytes.extend(page_bytes(&p1));

        let mut cursor = std::io::Cursor::new(bytes);
        let pages = OggParser::parse_all(&mut cursor).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].serial_no, 42);
        assert_eq!(pages[1].page_no, 1);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut cursor = std::io::Cursor::new(b"NOT_OGGS_HEADER_AT_ALL_LONGER".to_vec());
        assert!(OggParser::parse_all(&mut cursor).is_err());
    }

    #[test]
    fn rejects_out_of_order_page_no() {
        let mut p0 = OggPage {
            version: 0,
            page_type: 2,
            granule_position: 0,
            serial_no: 1,
            page_no: 5,
            packets: vec![opus_packet(20, 10)],
        };
        let bytes = page_bytes(&mut p0);
        let mut cursor = std::io::Cursor::new(bytes);
        assert!(OggParser::parse_all(&mut cursor).is_err());
    }

    #[test]
    fn reconstructs_multi_packet_pages() {
        let page = OggPage {
            version: 0,
            page_type: 0,
            granule_position: 0,
            serial_no: 7,
            page_no: 0,
            packets: vec![opus_packet(20, 10), opus_packet(20, 400)],
        };
        let bytes = page_bytes(&page);
        let mut cursor = std::io::Cursor::new(bytes);
        let pages = OggParser::parse_all(&mut cursor).unwrap();
        assert_eq!(pages[0].packets.len(), 2);
        assert_eq!(pages[0].packets[1].data.len(), 401);
    }
}
