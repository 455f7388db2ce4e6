use std::io::{Read, Seek, SeekFrom, Write};

use sha1::{Digest, Sha1};

use crate::error::Error;
use crate::tonie_audio::TonieAudio;
use crate::tonie_header_codec::TonieHeaderCodec;

const HEADER_SLOT_SIZE: u64 = 4096;

fn write_and_hash<W: Write>(
    writer: &mut W,
    hasher: &mut Option<&mut Sha1>,
    bytes: &[u8],
) -> Result<(), Error> {
    writer.write_all(bytes)?;
    if let Some(h) = hasher {
        h.update(bytes);
    }
    Ok(())
}

/// Builds the three compose operations a tonie file is edited with: export a
/// single chapter as a plain Ogg/Opus file, skip down to a subset/reorder of
/// chapters, and swap chapters wholesale for newly appended content.
pub struct ComposeEngine;

impl ComposeEngine {
    /// Emits chapter `chapter` of `audio` as a standalone Ogg/Opus file, with
    /// no outer tonie header slot. Page numbering always restarts at 2 for
    /// the chapter's own pages; this is unconditional, unlike the
    /// block-alignment rule `stream_chapters` applies for skip/swap.
    pub fn export_chapter<W: Write>(
        audio: &TonieAudio,
        chapter: usize,
        writer: &mut W,
    ) -> Result<(), Error> {
        let (start, end) = audio.chapter_page_range(chapter)?;

        writer.write_all(&audio.pages[0].serialize_unchanged())?;
        writer.write_all(&audio.pages[1].serialize_unchanged())?;

        let mut granule = 0u64;
        let mut page_no = 2u32;
        let total = end - start;
        for (i, idx) in (start..end).enumerate() {
            let page = &audio.pages[idx as usize];
            granule += page.duration()?;
            let is_last = i as u32 + 1 == total;
            writer.write_all(&page.serialize_with(is_last, granule, page_no))?;
            page_no += 1;
        }
        Ok(())
    }

    /// Streams the two Opus header pages followed by the requested chapters
    /// in the given order, relabelling page numbers and granule positions
    /// sequentially. When the first requested chapter is not chapter 0,
    /// source page 2 is emitted unchanged first as a block-alignment page,
    /// preserving the device's three-page preamble expectation. Returns the
    /// page number at which each requested chapter starts in the output.
    pub fn stream_chapters<W: Write>(
        audio: &TonieAudio,
        chapters: &[usize],
        writer: &mut W,
        mut hasher: Option<&mut Sha1>,
    ) -> Result<Vec<u32>, Error> {
        write_and_hash(writer, &mut hasher, &audio.pages[0].serialize_unchanged())?;
        write_and_hash(writer, &mut hasher, &audio.pages[1].serialize_unchanged())?;

        let mut next_page_no = 2u32;
        let mut granule = 0u64;
        if chapters.first() != Some(&0) {
            let page2 = &audio.pages[2];
            write_and_hash(writer, &mut hasher, &page2.serialize_unchanged())?;
            granule = page2.granule_position;
            next_page_no = 3;
        }

        let mut total_audio_pages = 0u32;
        for &chapter in chapters {
            let (start, end) = audio.chapter_page_range(chapter)?;
            total_audio_pages += end - start;
        }

        let mut output_chapter_starts = Vec::with_capacity(chapters.len());
        let mut emitted = 0u32;
        for &chapter in chapters {
            let (start, end) = audio.chapter_page_range(chapter)?;
            output_chapter_starts.push(next_page_no);
            for idx in start..end {
                let page = &audio.pages[idx as usize];
                granule += page.duration()?;
                emitted += 1;
                let is_last = emitted == total_audio_pages;
                write_and_hash(
                    writer,
                    &mut hasher,
                    &page.serialize_with(is_last, granule, next_page_no),
                )?;
                next_page_no += 1;
            }
        }

        Ok(output_chapter_starts)
    }

    /// Writes a full tonie container containing only the requested chapters,
    /// in the requested order. The 4096-byte header slot is written first as
    /// a zeroed placeholder, then backfilled once the payload's length and
    /// SHA-1 are known.
    pub fn skip<W: Write + Seek>(
        audio: &TonieAudio,
        chapters: &[usize],
        writer: &mut W,
    ) -> Result<(), Error> {
        writer.write_all(&[0u8; HEADER_SLOT_SIZE as usize])?;

        let mut hasher = Sha1::new();
        let chapter_starts = Self::stream_chapters(audio, chapters, writer, Some(&mut hasher))?;

        let end = writer.stream_position()?;
        let data_length = (end - HEADER_SLOT_SIZE) as u32;
        let data_hash = hasher.finalize().to_vec();

        let mut record = audio.header_record(data_hash, data_length);
        record.chapter_pages = chapter_starts;

        writer.seek(SeekFrom::Start(0))?;
        TonieHeaderCodec::write(writer, &record)?;
        writer.seek(SeekFrom::Start(end))?;
        Ok(())
    }

    /// Discards `audio`'s existing chapters, appends each of `opus_readers`
    /// as a new chapter in order, then writes out a container containing
    /// exactly those newly appended chapters. This is a CLI-level composite
    /// of append followed by skip, not a distinct core primitive.
    pub fn swap<R: Read, W: Write + Seek>(
        mut audio: TonieAudio,
        opus_readers: &mut [R],
        writer: &mut W,
    ) -> Result<(), Error> {
        audio.discard_chapters();
        let mut chapters = Vec::with_capacity(opus_readers.len());
        for reader in opus_readers.iter_mut() {
            chapters.push(audio.append_chapter(reader)?);
        }
        Self::skip(&audio, &chapters, writer)
    }
}
