use std::fs::File;
use std::io::{Cursor, Read};

use assert_fs::prelude::*;
use predicates::prelude::*;
use tempfile::NamedTempFile;

use crate::compose::ComposeEngine;
use crate::ogg_page::OggPage;
use crate::ogg_parser::OggParser;
use crate::opus_packet::OpusPacket;
use crate::repacker::{PageTemplate, Repacker};
use crate::tonie_audio::TonieAudio;

fn opus_packet(config: u8, payload_len: usize) -> OpusPacket {
    let mut data = vec![config << 3];
    data.extend(std::iter::repeat(0xaa).take(payload_len));
    OpusPacket::new(data)
}

fn build_tonie_file(serial_no: u32, n_chapters: usize, pages_per_chapter: usize) -> Vec<u8> {
    let page0 = OggPage {
        version: 0,
        page_type: 0x02,
        granule_position: 0,
        serial_no,
        page_no: 0,
        packets: vec![OpusPacket::new(b"OpusHeadSynthetic".to_vec())],
    };
    let page1 = OggPage {
        version: 0,
        page_type: 0,
        granule_position: 0,
        serial_no,
        page_no: 1,
        packets: vec![OpusPacket::new(b"OpusTagsSynthetic".to_vec())],
    };

    let mut audio = TonieAudio {
        timestamp: serial_no,
        pages: vec![page0, page1],
        chapter_start_pages: Vec::new(),
    };

    let template = PageTemplate { serial_no };
    let mut granule = 0u64;
    for _ in 0..n_chapters {
        let packets: Vec<OpusPacket> = (0..pages_per_chapter * 13)
            .map(|_| opus_packet(19, 300))
            .collect();
        let page_no = audio.pages.len() as u32;
        let out = Repacker::repack(packets, template, page_no, granule).unwrap();
        granule = out.granule_position;
        let chapter_start = audio.pages.len() as u32;
        audio.pages.extend(out.pages);
        audio.chapter_start_pages.push(chapter_start);
    }

    let mut out = Cursor::new(Vec::new());
    let all_chapters: Vec<usize> = (0..n_chapters).collect();
    ComposeEngine::skip(&audio, &all_chapters, &mut out).unwrap();
    out.into_inner()
}

/// Writes a synthetic tonie file to disk, runs `skip` through a real
/// filesystem temp file (mirroring the CLI's atomic-replace pattern), and
/// checks the result still parses with the requested chapters intact.
#[test]
fn skip_round_trips_through_a_real_file() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input_path = temp.child("input.taf");
    input_path
        .write_binary(&build_tonie_file(55, 3, 2))
        .unwrap();

    let mut input = File::open(input_path.path()).unwrap();
    let audio = TonieAudio::parse(&mut input).unwrap();

    let mut tmp = NamedTempFile::new_in(temp.path()).unwrap();
    ComposeEngine::skip(&audio, &[2, 0], &mut tmp).unwrap();
    let output_path = temp.child("output.taf");
    tmp.persist(output_path.path()).unwrap();
    output_path.assert(predicate::path::exists());
    output_path.assert(predicate::path::is_file());

    let mut output = File::open(output_path.path()).unwrap();
    let result = TonieAudio::parse(&mut output).unwrap();
    assert_eq!(result.chapter_count(), 2);
    assert_eq!(result.timestamp, 55);
}

#[test]
fn export_writes_one_ogg_file_per_chapter() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input_path = temp.child("input.taf");
    input_path
        .write_binary(&build_tonie_file(66, 2, 1))
        .unwrap();

    let mut input = File::open(input_path.path()).unwrap();
    let audio = TonieAudio::parse(&mut input).unwrap();

    for chapter in 0..audio.chapter_count() {
        let out_path = temp.child(format!("chapter{chapter}.ogg"));
        let mut out_file = File::create(out_path.path()).unwrap();
        ComposeEngine::export_chapter(&audio, chapter, &mut out_file).unwrap();

        let mut bytes = Vec::new();
        File::open(out_path.path())
            .unwrap()
            .read_to_end(&mut bytes)
            .unwrap();
        assert!(bytes.starts_with(b"OggS"));

        let mut cursor = Cursor::new(bytes);
        let pages = OggParser::parse_all(&mut cursor).unwrap();
        assert_eq!(pages[0].page_no, 0);
        assert!(pages.last().unwrap().page_type & 0x04 != 0);
    }
}
