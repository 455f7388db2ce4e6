use std::io::{Read, Seek, SeekFrom};

use crate::error::Error;
use crate::ogg_page::OggPage;
use crate::ogg_parser::OggParser;
use crate::repacker::{PageTemplate, Repacker};
use crate::tonie_header_codec::{TonieHeaderCodec, TonieHeaderRecord};

const HEADER_SLOT_SIZE: u64 = 4096;

/// A parsed tonie container: the Ogg/Opus pages that follow the 4096-byte
/// header slot, plus the chapter boundaries recorded in that header.
pub struct TonieAudio {
    pub timestamp: u32,
    pub pages: Vec<OggPage>,
    pub chapter_start_pages: Vec<u32>,
}

impl TonieAudio {
    pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<Self, Error> {
        let header = TonieHeaderCodec::read(reader)?;
        reader.seek(SeekFrom::Start(HEADER_SLOT_SIZE))?;
        let pages = OggParser::parse_all(reader)?;

        for page in &pages {
            if page.serial_no != header.timestamp {
                return Err(Error::MalformedOgg {
                    offset: HEADER_SLOT_SIZE,
                    reason: format!(
                        "page {} has serial_no {} but header timestamp is {}",
                        page.page_no, page.serial_no, header.timestamp
                    ),
                });
            }
        }

        Ok(TonieAudio {
            timestamp: header.timestamp,
            pages,
            chapter_start_pages: header.chapter_pages,
        })
    }

    pub fn chapter_count(&self) -> usize {
        self.chapter_start_pages.len()
    }

    pub fn chapter_page_range(&self, chapter: usize) -> Result<(u32, u32), Error> {
        let start = *self
            .chapter_start_pages
            .get(chapter)
            .ok_or(Error::ChapterOutOfRange {
                index: chapter,
                count: self.chapter_start_pages.len(),
            })?;
        let end = self
            .chapter_start_pages
            .get(chapter + 1)
            .copied()
            .unwrap_or(self.pages.len() as u32);
        Ok((start, end))
    }

    /// Drops every existing chapter and all audio pages after the two Opus
    /// header pages, leaving a bare stream ready for fresh chapters to be
    /// appended via [`TonieAudio::append_chapter`].
    pub fn discard_chapters(&mut self) {
        self.pages.truncate(2);
        self.chapter_start_pages.clear();
    }

    /// Parses an external Ogg/Opus file, drops its two Opus header pages,
    /// splices its audio into page-accurate pages continuing this
    /// container's page and granule numbering, and records it as a new
    /// trailing chapter. Returns the new chapter's index.
    pub fn append_chapter<R: Read>(&mut self, reader: &mut R) -> Result<usize, Error> {
        let source_pages = OggParser::parse_all(reader)?;
        if source_pages.len() < 2 {
            return Err(Error::MalformedOgg {
                offset: 0,
                reason: "appended file has fewer than the two required Opus header pages".into(),
            });
        }

        let packets = source_pages[2..]
            .iter()
            .flat_map(|p| p.packets.clone())
            .collect();

        let template = PageTemplate {
            serial_no: self.timestamp,
        };
        let start_granule = self.pages.last().map(|p| p.granule_position).unwrap_or(0);
        let start_page_no = self.pages.len() as u32;

        let mut out = Repacker::repack(packets, template, start_page_no, start_granule)?;
        if !out.trailing_packets.is_empty() {
            let (page, granule) = Repacker::close_page(
                template,
                std::mem::take(&mut out.trailing_packets),
                out.next_page_no,
                out.granule_position,
                false,
            )?;
            out.granule_position = granule;
            out.pages.push(page);
        }

        let new_chapter_start = self.pages.len() as u32;
        self.pages.extend(out.pages);
        self.chapter_start_pages.push(new_chapter_start);
        Ok(self.chapter_start_pages.len() - 1)
    }

    pub fn header_record(&self, data_hash: Vec<u8>, data_length: u32) -> TonieHeaderRecord {
        TonieHeaderRecord {
            data_hash,
            data_length,
            timestamp: self.timestamp,
            chapter_pages: self.chapter_start_pages.clone(),
        }
    }
}
