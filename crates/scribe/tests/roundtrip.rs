//! Archive round trips across all three codecs.

use scribe::{
    ArchiveFormat, ArchiveReader, ArchiveWriter, BinaryArchiveReader, DecodeError, EncodeError,
    ErrorKind, ObjectKey, ObjectType, TextArchiveReader, Transcription, UNUSED_OBJECT_ID,
    XmlArchiveReader, XmlArchiveWriter, XmlWriteOptions, read_archive, write_archive,
};

const FORMATS: [ArchiveFormat; 3] = [ArchiveFormat::Binary, ArchiveFormat::Text, ArchiveFormat::Xml];

fn roundtrip(format: ArchiveFormat, transcriptions: &[Transcription]) -> Vec<Transcription> {
    let mut bytes = Vec::new();
    write_archive(format, &mut bytes, transcriptions).unwrap();
    let mut input = bytes.as_slice();
    let mut reader = format.create_reader(&mut input).unwrap();
    let decoded = (0..transcriptions.len())
        .map(|_| reader.read_transcription().unwrap())
        .collect();
    reader.close().unwrap();
    decoded
}

/// One record with `count = 42` and `name = "hello"`.
fn record() -> Transcription {
    let mut t = Transcription::new();
    let count = t.get_or_create_object_key("count", 0);
    let name = t.get_or_create_object_key("name", 0);
    let composite = t.add_composite_object(0).unwrap();
    composite.add_child(count, 1).unwrap();
    composite.add_child(name, 2).unwrap();
    t.add_unsigned_integer(1, 42).unwrap();
    t.add_string(2, "hello").unwrap();
    t
}

#[test]
fn test_record_in_every_format() {
    for format in FORMATS {
        let decoded = roundtrip(format, &[record()]).remove(0);
        assert_eq!(decoded, record(), "{}", format.name());

        let count = decoded.object_key("count", 0).unwrap();
        let name = decoded.object_key("name", 0).unwrap();
        let composite = decoded.composite_object(0).unwrap();
        assert_eq!(composite.num_keys(), 2);

        let count_id = composite.child(count, 0).unwrap();
        assert_eq!(decoded.unsigned_integer(count_id).unwrap(), 42);

        let name_id = composite.child(name, 0).unwrap();
        assert_eq!(decoded.object_type(name_id).unwrap(), ObjectType::String);
        assert_eq!(decoded.string(name_id).unwrap(), "hello");

        assert!(decoded.is_complete(UNUSED_OBJECT_ID, true));
    }
}

#[test]
fn test_every_primitive_type() {
    let mut t = Transcription::new();
    t.add_signed_integer(0, i32::MIN).unwrap();
    t.add_signed_integer(1, i32::MAX).unwrap();
    t.add_unsigned_integer(2, u32::MAX).unwrap();
    t.add_float(3, 3.25).unwrap();
    t.add_float(4, -1.0e-30).unwrap();
    t.add_double(5, std::f64::consts::PI).unwrap();
    t.add_double(6, -2.5e300).unwrap();
    t.add_string(7, "").unwrap();
    t.add_string(8, "unicode \u{e9}\u{4e2d}\u{1F600}").unwrap();

    for format in FORMATS {
        let decoded = roundtrip(format, &[t.clone()]).remove(0);
        assert_eq!(decoded, t, "{}", format.name());
        assert_eq!(decoded.signed_integer(0).unwrap(), i32::MIN);
        assert_eq!(decoded.unsigned_integer(2).unwrap(), u32::MAX);
    }
}

#[test]
fn test_non_finite_values_classify() {
    let mut t = Transcription::new();
    t.add_float(0, f32::INFINITY).unwrap();
    t.add_float(1, f32::NEG_INFINITY).unwrap();
    t.add_float(2, f32::NAN).unwrap();
    t.add_double(3, f64::INFINITY).unwrap();
    t.add_double(4, f64::NEG_INFINITY).unwrap();
    t.add_double(5, f64::NAN).unwrap();

    for format in FORMATS {
        let decoded = roundtrip(format, &[t.clone()]).remove(0);
        let name = format.name();
        assert!(decoded.float(0).unwrap().is_infinite() && decoded.float(0).unwrap() > 0.0, "{name}");
        assert!(decoded.float(1).unwrap().is_infinite() && decoded.float(1).unwrap() < 0.0, "{name}");
        assert!(decoded.float(2).unwrap().is_nan(), "{name}");
        assert_eq!(decoded.double(3).unwrap(), f64::INFINITY, "{name}");
        assert_eq!(decoded.double(4).unwrap(), f64::NEG_INFINITY, "{name}");
        assert!(decoded.double(5).unwrap().is_nan(), "{name}");
    }
}

#[test]
fn test_array_with_holes() {
    let mut t = Transcription::new();
    let items = t.get_or_create_object_key("items", 2);
    let composite = t.add_composite_object(0).unwrap();
    composite.set_child(items, 10, 0).unwrap();
    composite.set_child(items, 13, 3).unwrap();
    t.add_signed_integer(10, 1).unwrap();
    t.add_signed_integer(13, 4).unwrap();

    assert!(t.is_complete(UNUSED_OBJECT_ID, false));

    for format in FORMATS {
        let decoded = roundtrip(format, &[t.clone()]).remove(0);
        let composite = decoded.composite_object(0).unwrap();
        assert_eq!(composite.num_children_with_key(items).unwrap(), 4, "{}", format.name());
        assert_eq!(composite.has_valid_child(items, 0).unwrap(), Some(10));
        assert_eq!(composite.has_valid_child(items, 1).unwrap(), None);
        assert_eq!(composite.has_valid_child(items, 2).unwrap(), None);
        assert_eq!(composite.has_valid_child(items, 3).unwrap(), Some(13));
        assert_eq!(composite.key(0).unwrap(), ObjectKey::new(0, 2));
    }
}

#[test]
fn test_sparse_ids_form_separate_groups() {
    let mut t = Transcription::new();
    t.add_unsigned_integer(0, 1).unwrap();
    t.add_unsigned_integer(1, 2).unwrap();
    t.add_unsigned_integer(100, 3).unwrap();
    t.add_unsigned_integer(5000, 4).unwrap();

    for format in FORMATS {
        let decoded = roundtrip(format, &[t.clone()]).remove(0);
        assert_eq!(decoded, t, "{}", format.name());
        assert_eq!(decoded.num_used_object_ids(), 4);
        assert_eq!(decoded.object_type(50).unwrap(), ObjectType::Unused);
        assert_eq!(decoded.unsigned_integer(5000).unwrap(), 4);
    }
}

#[test]
fn test_interning_order_preserved() {
    let mut t = Transcription::new();
    // Intern in non-alphabetical order, with repeats.
    for (id, value) in ["zeta", "alpha", "zeta", "mid", "alpha"].into_iter().enumerate() {
        t.add_string(id as u32, value).unwrap();
    }
    let b = t.get_or_create_object_key("b", 0);
    let a = t.get_or_create_object_key("a", 0);
    assert_eq!(t.get_or_create_object_key("b", 0), b);
    let composite = t.add_composite_object(5).unwrap();
    composite.add_child(b, 0).unwrap();
    composite.add_child(a, 1).unwrap();

    assert_eq!(t.num_unique_strings(), 3);
    assert_eq!(t.num_object_tag_names(), 2);

    for format in FORMATS {
        let decoded = roundtrip(format, &[t.clone()]).remove(0);
        let strings: Vec<_> = (0..3).map(|i| decoded.unique_string(i).unwrap()).collect();
        assert_eq!(strings, ["zeta", "alpha", "mid"], "{}", format.name());
        assert_eq!(decoded.object_tag_name(0).unwrap(), "b");
        assert_eq!(decoded.object_tag_name(1).unwrap(), "a");
        assert_eq!(decoded.string_object(2).unwrap(), decoded.string_object(0).unwrap());
    }
}

#[test]
fn test_multiple_transcriptions_per_archive() {
    let mut second = Transcription::new();
    second.add_double(3, 0.5).unwrap();
    let batch = [record(), Transcription::new(), second];

    for format in FORMATS {
        let decoded = roundtrip(format, &batch);
        assert_eq!(decoded, batch, "{}", format.name());
    }
}

#[test]
fn test_read_archive_detects_format() {
    for format in FORMATS {
        let mut bytes = Vec::new();
        write_archive(format, &mut bytes, &[record()]).unwrap();
        assert_eq!(ArchiveFormat::detect(&bytes), Some(format));
        let decoded = read_archive(&mut bytes.as_slice(), 1).unwrap();
        assert_eq!(decoded[0], record());
    }
}

#[test]
fn test_reader_reports_versions() {
    let mut bytes = Vec::new();
    write_archive(ArchiveFormat::Binary, &mut bytes, &[]).unwrap();
    let mut input = bytes.as_slice();
    let reader = BinaryArchiveReader::new(&mut input).unwrap();
    assert_eq!(reader.format_version(), scribe::limits::BINARY_FORMAT_VERSION);
    assert_eq!(reader.scribe_version(), scribe::limits::SCRIBE_VERSION);

    let mut bytes = Vec::new();
    write_archive(ArchiveFormat::Xml, &mut bytes, &[]).unwrap();
    let mut input = bytes.as_slice();
    let mut reader = XmlArchiveReader::new(&mut input).unwrap();
    assert_eq!(reader.format_version(), scribe::limits::XML_FORMAT_VERSION);
    reader.close().unwrap();
}

#[test]
fn test_compact_xml_matches_indented() {
    let mut compact = Vec::new();
    let mut writer = XmlArchiveWriter::with_options(&mut compact, XmlWriteOptions { indent: None }).unwrap();
    writer.write_transcription(&record()).unwrap();
    writer.close().unwrap();
    assert!(!String::from_utf8(compact.clone()).unwrap().contains('\n'));

    let decoded = read_archive(&mut compact.as_slice(), 1).unwrap();
    assert_eq!(decoded[0], record());
}

#[test]
fn test_wrong_signature_for_each_reader() {
    let mut binary = Vec::new();
    write_archive(ArchiveFormat::Binary, &mut binary, &[record()]).unwrap();
    let mut text = Vec::new();
    write_archive(ArchiveFormat::Text, &mut text, &[record()]).unwrap();

    let Err(err) = TextArchiveReader::new(&mut binary.as_slice()) else {
        panic!("text reader accepted a binary archive");
    };
    assert!(matches!(err, DecodeError::InvalidSignature { format: "text" }));
    assert_eq!(err.kind(), ErrorKind::Format);

    let Err(err) = BinaryArchiveReader::new(&mut text.as_slice()) else {
        panic!("binary reader accepted a text archive");
    };
    assert!(matches!(err, DecodeError::InvalidSignature { format: "binary" }));

    let Err(err) = XmlArchiveReader::new(&mut text.as_slice()) else {
        panic!("xml reader accepted a text archive");
    };
    assert!(matches!(err, DecodeError::InvalidSignature { format: "xml" }));
}

#[test]
fn test_truncated_archives_fail() {
    for format in [ArchiveFormat::Binary, ArchiveFormat::Text] {
        let mut bytes = Vec::new();
        write_archive(format, &mut bytes, &[record()]).unwrap();
        bytes.truncate(bytes.len() - 3);

        let mut input = bytes.as_slice();
        let mut reader = format.create_reader(&mut input).unwrap();
        let err = reader.read_transcription().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Stream, "{}: {err}", format.name());
    }

    let mut bytes = Vec::new();
    write_archive(ArchiveFormat::Xml, &mut bytes, &[record()]).unwrap();
    let cut = bytes.len() / 2;
    let mut input = &bytes[..cut];
    let mut reader = ArchiveFormat::Xml.create_reader(&mut input).unwrap();
    assert!(reader.read_transcription().is_err());
}

#[test]
fn test_incomplete_transcription_is_readable_but_flagged() {
    let mut t = Transcription::new();
    let child = t.get_or_create_object_key("child", 0);
    t.add_composite_object(0).unwrap().add_child(child, 7).unwrap();
    assert!(!t.is_complete(UNUSED_OBJECT_ID, true));

    for format in FORMATS {
        let decoded = roundtrip(format, &[t.clone()]).remove(0);
        assert!(!decoded.is_complete(UNUSED_OBJECT_ID, false), "{}", format.name());
    }
}

#[test]
fn test_control_characters_need_binary_or_text() {
    let mut t = Transcription::new();
    t.add_string(0, "escape \u{1b}[0m and nul \u{0}").unwrap();

    for format in [ArchiveFormat::Binary, ArchiveFormat::Text] {
        assert_eq!(roundtrip(format, std::slice::from_ref(&t)), vec![t.clone()], "{}", format.name());
    }

    let mut bytes = Vec::new();
    let Err(err) = write_archive(ArchiveFormat::Xml, &mut bytes, std::slice::from_ref(&t)) else {
        panic!("xml archive accepted a control character");
    };
    assert!(matches!(err, EncodeError::InvalidXmlChar { ch: '\u{1b}', .. }));
    assert_eq!(err.kind(), ErrorKind::Format);
}
