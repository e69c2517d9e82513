//! Integration tests for attachment and MIME payloads through real XML documents.

use std::path::Path;
use std::sync::Arc;

use assert_fs::prelude::*;
use predicates::prelude::*;

use attachspool::codec::Base64ChunkDecoder;
use attachspool::error::{CodecError, SpoolError};
use attachspool::model::{
    read_attachments, write_attachments, ContentState, FileAttachment, MimeContent,
};
use attachspool::store::{ByteSource, FileSource, SharedSource, SpoolOptions};
use attachspool::version::ExchangeVersion;
use attachspool::xml::element_names::{ATTACHMENTS, FILE_ATTACHMENT, MIME_CONTENT};
use attachspool::xml::{ElementReader, XmlStreamReader, XmlStreamWriter, DEFAULT_TEXT_CHUNK};

const THRESHOLD: usize = 1024;

fn spool_options(dir: &Path) -> SpoolOptions {
    SpoolOptions {
        threshold: THRESHOLD,
        temp_dir: Some(dir.to_path_buf()),
    }
}

fn spool_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

/// Deterministic payload that is not all one byte value.
fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

fn write_attachment(attachment: &FileAttachment, version: ExchangeVersion) -> Vec<u8> {
    let mut writer = XmlStreamWriter::new(Vec::new(), version).with_chunk_size(300);
    writer.write_declaration().unwrap();
    attachment.write_to_xml(&mut writer).unwrap();
    writer.into_inner().unwrap()
}

fn read_attachment(xml: &[u8], dir: &Path) -> FileAttachment {
    let mut reader = XmlStreamReader::new(xml).with_spool_options(spool_options(dir));
    reader.read_start_element(FILE_ATTACHMENT).unwrap();
    FileAttachment::read_from_xml(&mut reader, ExchangeVersion::default()).unwrap()
}

fn roundtrip(len: usize, dir: &Path) -> FileAttachment {
    let data: SharedSource = Arc::new(payload(len));
    let attachment = FileAttachment::with_content(ExchangeVersion::default(), "data.bin", data);
    let xml = write_attachment(&attachment, ExchangeVersion::default());
    read_attachment(&xml, dir)
}

// ─── Test 1: Hello, World! encodes to its well-known base64 ─────────

#[test]
fn test_hello_world_document() {
    let source: SharedSource = Arc::new(b"Hello, World!".to_vec());
    let attachment = FileAttachment::with_content(ExchangeVersion::default(), "hello.txt", source);
    let xml = String::from_utf8(write_attachment(&attachment, ExchangeVersion::default())).unwrap();

    assert!(xml.starts_with("<?xml"));
    assert!(xml.contains("<t:Content>SGVsbG8sIFdvcmxkIQ==</t:Content>"));

    let tmp = assert_fs::TempDir::new().unwrap();
    let loaded = read_attachment(xml.as_bytes(), tmp.path());
    assert_eq!(loaded.name(), Some("hello.txt"));
    assert_eq!(loaded.content().unwrap().read_to_vec().unwrap(), b"Hello, World!");
}

// ─── Test 2: Empty payload round-trips as empty, not missing ────────

#[test]
fn test_empty_payload_roundtrip() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let loaded = roundtrip(0, tmp.path());

    assert_eq!(loaded.content_state(), ContentState::Populated);
    let content = loaded.content().unwrap();
    assert_eq!(content.size().unwrap(), 0);
    assert!(content.read_to_vec().unwrap().is_empty());
    assert_eq!(spool_files(tmp.path()), 0);
}

// ─── Test 3: Payload below the threshold stays in memory ────────────

#[test]
fn test_small_payload_stays_in_memory() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let loaded = roundtrip(THRESHOLD, tmp.path());

    let spool = loaded.spooled_content().unwrap();
    assert!(!spool.is_spilled());
    assert_eq!(spool.len(), THRESHOLD as u64);
    assert_eq!(loaded.content().unwrap().read_to_vec().unwrap(), payload(THRESHOLD));
    assert_eq!(spool_files(tmp.path()), 0);
}

// ─── Test 4: Payload above the threshold spills to disk ─────────────

#[test]
fn test_large_payload_spills_to_disk() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let len = THRESHOLD * 10 + 7;
    let loaded = roundtrip(len, tmp.path());

    let spool = loaded.spooled_content().unwrap();
    assert!(spool.is_spilled());
    assert_eq!(spool_files(tmp.path()), 1);
    let path = spool.temp_path().unwrap().to_path_buf();
    tmp.child(path.file_name().unwrap()).assert(predicate::path::exists());

    let content = loaded.content().unwrap();
    assert_eq!(content.size().unwrap(), len as u64);
    assert_eq!(content.read_to_vec().unwrap(), payload(len));
}

// ─── Test 5: Content can be read any number of times ────────────────

#[test]
fn test_content_is_rereadable() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let loaded = roundtrip(THRESHOLD * 3, tmp.path());
    let content = loaded.content().unwrap();

    let first = content.sha256().unwrap();
    let second = content.sha256().unwrap();
    assert_eq!(first, second);
    assert_eq!(content.read_to_vec().unwrap(), content.read_to_vec().unwrap());
}

// ─── Test 6: Closing removes the spool file and is idempotent ───────

#[test]
fn test_close_removes_spool_file() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let mut loaded = roundtrip(THRESHOLD * 4, tmp.path());
    let path = loaded.spooled_content().unwrap().temp_path().unwrap().to_path_buf();
    assert_eq!(spool_files(tmp.path()), 1);

    loaded.close();
    assert_eq!(spool_files(tmp.path()), 0);
    assert!(predicate::path::missing().eval(&path));
    assert!(loaded.content().is_none());

    loaded.close();
    assert_eq!(spool_files(tmp.path()), 0);
}

// ─── Test 7: Dropping a loaded attachment removes its spool file ────

#[test]
fn test_drop_removes_spool_file() {
    let tmp = assert_fs::TempDir::new().unwrap();
    {
        let _loaded = roundtrip(THRESHOLD * 2, tmp.path());
        assert_eq!(spool_files(tmp.path()), 1);
    }
    assert_eq!(spool_files(tmp.path()), 0);
}

// ─── Test 8: Version gating of IsContactPhoto ───────────────────────

#[test]
fn test_contact_photo_requires_exchange_2010() {
    let source: SharedSource = Arc::new(b"jpeg".to_vec());

    let mut legacy = FileAttachment::with_content(ExchangeVersion::Exchange2007Sp1, "a.jpg", source.clone());
    let err = legacy.set_is_contact_photo(true).unwrap_err();
    assert!(matches!(err, SpoolError::UnsupportedVersion { .. }));
    assert!(legacy.is_contact_photo().is_err());

    let mut modern = FileAttachment::with_content(ExchangeVersion::Exchange2010, "a.jpg", source);
    modern.set_is_contact_photo(true).unwrap();
    assert!(modern.is_contact_photo().unwrap());

    let old_server = String::from_utf8(write_attachment(&modern, ExchangeVersion::Exchange2007Sp1)).unwrap();
    assert!(!old_server.contains("IsContactPhoto"));
    let new_server = String::from_utf8(write_attachment(&modern, ExchangeVersion::Exchange2010)).unwrap();
    assert!(new_server.contains("<t:IsContactPhoto>true</t:IsContactPhoto>"));
}

// ─── Test 9: Missing content is reported with its index ─────────────

#[test]
fn test_missing_content_reports_index() {
    let source: SharedSource = Arc::new(b"ok".to_vec());
    let attachments = vec![
        FileAttachment::with_content(ExchangeVersion::default(), "first.txt", source),
        FileAttachment::new(ExchangeVersion::default()),
    ];

    let mut writer = XmlStreamWriter::new(Vec::new(), ExchangeVersion::default());
    let err = write_attachments(&mut writer, &attachments).unwrap_err();
    match err {
        SpoolError::Validation(message) => assert_eq!(
            message,
            "The content of the file attachment at index 1 must be set."
        ),
        other => panic!("expected validation error, got {other:?}"),
    }

    // Validation runs before anything is written
    assert!(writer.into_inner().unwrap().is_empty());
}

// ─── Test 10: Attachments collection round trip ─────────────────────

#[test]
fn test_attachments_collection_roundtrip() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let small: SharedSource = Arc::new(payload(10));
    let large: SharedSource = Arc::new(payload(THRESHOLD * 5));
    let attachments = vec![
        FileAttachment::with_content(ExchangeVersion::default(), "small.bin", small),
        FileAttachment::with_content(ExchangeVersion::default(), "large.bin", large),
    ];

    let mut writer = XmlStreamWriter::new(Vec::new(), ExchangeVersion::default());
    write_attachments(&mut writer, &attachments).unwrap();
    let xml = writer.into_inner().unwrap();

    let mut reader = XmlStreamReader::new(&xml[..]).with_spool_options(spool_options(tmp.path()));
    reader.read_start_element(ATTACHMENTS).unwrap();
    let loaded = read_attachments(&mut reader, ExchangeVersion::default()).unwrap();

    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].name(), Some("small.bin"));
    assert_eq!(loaded[1].name(), Some("large.bin"));
    assert_eq!(loaded[0].content().unwrap().read_to_vec().unwrap(), payload(10));
    assert_eq!(loaded[1].content().unwrap().read_to_vec().unwrap(), payload(THRESHOLD * 5));
    assert!(!loaded[1].is_new());
    assert_eq!(spool_files(tmp.path()), 1);
}

// ─── Test 11: Loaded attachments are read-only ──────────────────────

#[test]
fn test_loaded_attachment_rejects_new_content() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let mut loaded = roundtrip(16, tmp.path());
    let replacement: SharedSource = Arc::new(b"other".to_vec());
    assert!(matches!(loaded.set_content(replacement), Err(SpoolError::Validation(_))));
}

// ─── Test 12: Corrupt base64 fails cleanly and leaves no file ───────

#[test]
fn test_corrupt_content_leaves_no_spool_file() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let good = "QUJD".repeat(THRESHOLD);
    let doc = format!(
        "<t:FileAttachment xmlns:t=\"urn:t\"><t:Name>x</t:Name>\
         <t:Content>{good}<![CDATA[!!!!]]></t:Content></t:FileAttachment>"
    );
    let mut reader = XmlStreamReader::new(doc.as_bytes()).with_spool_options(spool_options(tmp.path()));
    reader.read_start_element(FILE_ATTACHMENT).unwrap();

    let err = FileAttachment::read_from_xml(&mut reader, ExchangeVersion::default()).unwrap_err();
    assert!(matches!(err, SpoolError::Deserialization { field: "Content", .. }));
    assert_eq!(spool_files(tmp.path()), 0);
}

// ─── Test 13: File-backed content streams from disk ─────────────────

#[test]
fn test_file_source_upload() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let input = tmp.child("report.pdf");
    input.write_binary(&payload(5000)).unwrap();

    let source: SharedSource = Arc::new(FileSource::new(input.path()));
    let attachment = FileAttachment::with_content(ExchangeVersion::default(), "report.pdf", source);
    let xml = write_attachment(&attachment, ExchangeVersion::default());

    let spool_dir = tmp.child("spool");
    spool_dir.create_dir_all().unwrap();
    let loaded = read_attachment(&xml, spool_dir.path());
    assert_eq!(
        loaded.content().unwrap().sha256().unwrap(),
        FileSource::new(input.path()).sha256().unwrap()
    );
}

// ─── Test 14: MIME content with a non-UTF-8 character set ───────────

#[test]
fn test_mime_content_roundtrip() {
    let message = b"From: PexTest <pex@example.com>\r\n\
                    Subject: R\xe9sum\xe9\r\n\
                    Content-Type: text/plain; charset=iso-8859-1\r\n\
                    \r\n\
                    Caf\xe9 au lait.\r\n"
        .to_vec();
    let source: SharedSource = Arc::new(message.clone());
    let mime = MimeContent::with_content("ISO-8859-1", source);

    let mut writer = XmlStreamWriter::new(Vec::new(), ExchangeVersion::default());
    mime.write_to_xml(&mut writer).unwrap();
    let xml = writer.into_inner().unwrap();

    let tmp = assert_fs::TempDir::new().unwrap();
    let mut reader = XmlStreamReader::new(&xml[..]).with_spool_options(spool_options(tmp.path()));
    reader.read_start_element(MIME_CONTENT).unwrap();
    let loaded = MimeContent::read_from_xml(&mut reader).unwrap();

    assert_eq!(loaded.character_set(), Some("ISO-8859-1"));
    assert_eq!(loaded.content().unwrap().read_to_vec().unwrap(), message);
    assert!(loaded.decode_text().unwrap().contains("Café au lait."));
    let summary = loaded.summary().unwrap();
    assert_eq!(summary.from.as_deref(), Some("pex@example.com"));
}

// ─── Test 15: Large content is read in bounded text chunks ──────────

#[test]
fn test_large_content_arrives_in_bounded_chunks() {
    let len = 4 * 1024 * 1024;
    let data: SharedSource = Arc::new(payload(len));
    let attachment = FileAttachment::with_content(ExchangeVersion::default(), "big.bin", data);
    let mut writer = XmlStreamWriter::new(Vec::new(), ExchangeVersion::default());
    attachment.write_to_xml(&mut writer).unwrap();
    let xml = writer.into_inner().unwrap();

    let mut reader = XmlStreamReader::new(&xml[..]);
    reader.read_start_element(FILE_ATTACHMENT).unwrap();
    while reader.next_child().unwrap() {
        if reader.local_name() == "Content" {
            break;
        }
        reader.skip_element().unwrap();
    }
    assert_eq!(reader.local_name(), "Content");

    let mut decoder = Base64ChunkDecoder::new();
    let mut decoded = Vec::with_capacity(len);
    let mut chunks = 0;
    let mut largest = 0;
    while let Some(chunk) = reader.next_base64_chunk().unwrap() {
        chunks += 1;
        largest = largest.max(chunk.len());
        decoder.push(chunk.as_bytes(), &mut decoded).unwrap();
    }
    decoder.finish().unwrap();

    assert!(largest <= DEFAULT_TEXT_CHUNK, "largest chunk {largest}");
    assert!(chunks >= (len / 3 * 4) / DEFAULT_TEXT_CHUNK);
    assert_eq!(decoded, payload(len));
    assert!(!reader.next_child().unwrap());
}

// ─── Test 16: A spill that cannot create its file is a clean error ──

#[test]
fn test_missing_spool_dir_fails_without_content() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let missing = tmp.child("gone");
    let source: SharedSource = Arc::new(payload(THRESHOLD * 2));
    let attachment = FileAttachment::with_content(ExchangeVersion::default(), "data.bin", source);
    let xml = write_attachment(&attachment, ExchangeVersion::default());

    let mut reader = XmlStreamReader::new(&xml[..]).with_spool_options(spool_options(missing.path()));
    reader.read_start_element(FILE_ATTACHMENT).unwrap();
    let mut loaded = FileAttachment::new(ExchangeVersion::default());
    let err = loaded.load_from_xml(&mut reader).unwrap_err();

    assert!(matches!(
        err,
        SpoolError::Deserialization {
            field: "Content",
            source: CodecError::Io(_),
        }
    ));
    assert_eq!(loaded.content_state(), ContentState::Empty);
    missing.assert(predicate::path::missing());
}

// ─── Test 17: Cancelling a load removes the partial spool ───────────

#[test]
fn test_cancelled_load_leaves_no_spool_file() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let source: SharedSource = Arc::new(payload(THRESHOLD * 8));
    let attachment = FileAttachment::with_content(ExchangeVersion::default(), "data.bin", source);
    let xml = write_attachment(&attachment, ExchangeVersion::default());

    let mut reader = XmlStreamReader::new(&xml[..])
        .with_spool_options(spool_options(tmp.path()))
        .with_text_chunk(400);
    reader.read_start_element(FILE_ATTACHMENT).unwrap();
    let err = FileAttachment::read_from_xml_with_progress(
        &mut reader,
        ExchangeVersion::default(),
        &|decoded| decoded < (THRESHOLD * 2) as u64,
    )
    .unwrap_err();

    assert!(matches!(
        err,
        SpoolError::Deserialization {
            source: CodecError::Cancelled,
            ..
        }
    ));
    assert_eq!(spool_files(tmp.path()), 0);
}
