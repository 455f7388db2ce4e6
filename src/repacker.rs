use crate::error::Error;
use crate::ogg_page::OggPage;
use crate::opus_packet::OpusPacket;

/// Fixed page size the device expects for every audio page beyond the
/// two-page Opus header preamble.
pub const PAGE_SIZE: usize = 4096;
pub const PAGE_HEADER_LEN: usize = 27;

/// Identity of the Ogg logical stream a repacked run of pages belongs to.
#[derive(Debug, Clone, Copy)]
pub struct PageTemplate {
    pub serial_no: u32,
}

/// Result of a repacking run: the closed, page-accurate pages produced so
/// far, plus the still-open working set of packets that has not yet been
/// closed into a page (the caller decides how to finalize it).
pub struct RepackOutput {
    pub pages: Vec<OggPage>,
    pub trailing_packets: Vec<OpusPacket>,
    pub next_page_no: u32,
    pub granule_position: u64,
}

/// Splits a flat run of Opus packets into fixed-size, page-accurate Ogg
/// pages, closing each page with [`OggPage::pad_page`] as soon as another
/// packet would overflow it.
pub struct Repacker;

impl Repacker {
    pub fn repack(
        packets: Vec<OpusPacket>,
        template: PageTemplate,
        start_page_no: u32,
        start_granule: u64,
    ) -> Result<RepackOutput, Error> {
        let mut pages = Vec::new();
        let mut working: Vec<OpusPacket> = Vec::new();
        let mut size = PAGE_HEADER_LEN;
        let mut segment_total = 0usize;
        let mut page_no = start_page_no;
        let mut granule = start_granule;

        for packet in packets {
            let seg_lens = packet.segment_lengths();
            let added = seg_lens.len() + packet.data.len();
            if added > PAGE_SIZE - PAGE_HEADER_LEN {
                return Err(Error::PacketTooLarge {
                    page_no,
                    size: added,
                    max: PAGE_SIZE - PAGE_HEADER_LEN,
                });
            }

            if !working.is_empty()
                && (size + added > PAGE_SIZE || segment_total + seg_lens.len() > 255)
            {
                let (page, new_granule) =
                    Self::close_page(template, std::mem::take(&mut working), page_no, granule, false)?;
                granule = new_granule;
                pages.push(page);
                page_no += 1;
                size = PAGE_HEADER_LEN;
                segment_total = 0;
            }

            size += added;
            segment_total += seg_lens.len();
            working.push(packet);
        }

        Ok(RepackOutput {
            pages,
            trailing_packets: working,
            next_page_no: page_no,
            granule_position: granule,
        })
    }

    /// Builds a page from `packets`, pads it to [`PAGE_SIZE`] (unless it is
    /// the final page of the whole stream, which is left for the caller to
    /// size and flag), and returns it with the updated granule position.
    pub fn close_page(
        template: PageTemplate,
        packets: Vec<OpusPacket>,
        page_no: u32,
        granule_base: u64,
        is_last: bool,
    ) -> Result<(OggPage, u64), Error> {
        let mut page = OggPage {
            version: 0,
            page_type: 0,
            granule_position: 0,
            serial_no: template.serial_no,
            page_no,
            packets,
        };
        if !is_last {
            page.pad_page(PAGE_SIZE)?;
        }
        let granule = granule_base + page.duration()?;
        page.granule_position = granule;
        Ok((page, granule))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opus_packet(config: u8, payload_len: usize) -> OpusPacket {
        let mut data = vec![config << 3];
        data.extend(std::iter::repeat(0xaa).take(payload_len));
        OpusPacket::new(data)
    }

    #[test]
    fn closes_full_pages_at_exactly_page_size() {
        let packets: Vec<OpusPacket> = (0..50).map(|_| opus_packet(19, 300)).collect();
        let template = PageTemplate { serial_no: 1 };
        let out = Repacker::repack(packets, template, 2, 0).unwrap();
        for page in &out.pages {
            assert_eq!(page.serialized_len(), PAGE_SIZE);
        }
    }

    #[test]
    fn trailing_packets_are_not_auto_closed() {
        let packets = vec![opus_packet(19, 50)];
        let template = PageTemplate { serial_no: 1 };
        let out = Repacker::repack(packets, template, 2, 0).unwrap();
        assert!(out.pages.is_empty());
        assert_eq!(out.trailing_packets.len(), 1);
    }

    #[test]
    fn oversized_packet_is_rejected() {
        let packets = vec![opus_packet(19, PAGE_SIZE)];
        let template = PageTemplate { serial_no: 1 };
        assert!(Repacker::repack(packets, template, 2, 0).is_err());
    }

    #[test]
    fn granule_position_accumulates_with_duration() {
        let packets: Vec<OpusPacket> = (0..200).map(|_| opus_packet(19, 300)).collect();
        let template = PageTemplate { serial_no: 1 };
        let out = Repacker::repack(packets, template, 2, 0).unwrap();
        let mut prev = 0;
        for page in &out.pages {
            assert!(page.granule_position >= prev);
            prev = page.granule_position;
        }
    }
}
