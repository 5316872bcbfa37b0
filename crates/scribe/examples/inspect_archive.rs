//! Simple dumper to inspect Scribe archives of any format.
//!
//! Usage: `inspect_archive <path> [count]`

use std::fs::File;
use std::io::BufReader;

use scribe::{ArchiveFormat, ObjectType, Transcription, UNUSED_OBJECT_ID};

fn format_string(value: &str) -> String {
    let preview: String = value.chars().take(60).collect();
    if value.chars().count() > 60 {
        format!("{:?}...", preview)
    } else {
        format!("{:?}", preview)
    }
}

fn format_object(t: &Transcription, id: u32) -> Option<String> {
    let object_type = t.object_type(id).ok()?;
    let text = match object_type {
        ObjectType::SignedInteger => format!("signed {}", t.signed_integer(id).ok()?),
        ObjectType::UnsignedInteger => format!("unsigned {}", t.unsigned_integer(id).ok()?),
        ObjectType::Float => format!("float {}", t.float(id).ok()?),
        ObjectType::Double => format!("double {}", t.double(id).ok()?),
        ObjectType::String => format!("string {}", format_string(t.string(id).ok()?)),
        ObjectType::Composite => {
            let composite = t.composite_object(id).ok()?;
            let mut fields = Vec::new();
            for entry in composite.entries() {
                let (key, children) = entry.ok()?;
                let name = t.object_tag_name(key.tag_name_id).unwrap_or("?");
                let children: Vec<String> = children
                    .iter()
                    .map(|&child| {
                        if child == UNUSED_OBJECT_ID {
                            "-".to_string()
                        } else {
                            format!("#{}", child)
                        }
                    })
                    .collect();
                fields.push(format!("{}@{}: [{}]", name, key.tag_version, children.join(", ")));
            }
            format!("composite {{ {} }}", fields.join(", "))
        }
        ObjectType::Unused => return None,
    };
    Some(text)
}

fn main() {
    let mut args = std::env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "archive.scribe".to_string());
    let count: usize = args
        .next()
        .map(|s| s.parse().expect("count must be a number"))
        .unwrap_or(1);

    println!("Reading: {}", path);

    let file = File::open(&path).expect("Failed to open file");
    println!("File size: {} bytes", file.metadata().map(|m| m.len()).unwrap_or(0));
    let mut input = BufReader::new(file);

    let format = ArchiveFormat::detect_from(&mut input)
        .expect("Failed to read file")
        .expect("Unrecognized archive format");
    let mut reader = format.create_reader(&mut input).expect("Failed to read header");

    println!("\n=== Archive ===");
    println!("Format: {}", format.name());
    println!("Format version: {}", reader.format_version());
    println!("Scribe version: {}", reader.scribe_version());

    for index in 0..count {
        let t = match reader.read_transcription() {
            Ok(t) => t,
            Err(e) => {
                println!("\nTranscription {}: {} ({:?})", index, e, e.kind());
                return;
            }
        };

        println!("\n=== Transcription {} ===", index);
        println!(
            "Objects: {} used / {} ids",
            t.num_used_object_ids(),
            t.num_object_ids()
        );

        println!("Tag names ({}):", t.num_object_tag_names());
        for tag_id in 0..t.num_object_tag_names() as u32 {
            println!("  {}: {}", tag_id, t.object_tag_name(tag_id).unwrap_or("?"));
        }

        println!("Unique strings ({}):", t.num_unique_strings());
        for (shown, string_index) in (0..t.num_unique_strings() as u32).enumerate() {
            if shown == 20 {
                println!("  ... and {} more", t.num_unique_strings() - 20);
                break;
            }
            println!("  {}: {}", string_index, format_string(t.unique_string(string_index).unwrap_or("?")));
        }

        println!("Objects:");
        let mut counts = [0usize; 6];
        for id in 0..t.num_object_ids() as u32 {
            if let Some(text) = format_object(&t, id) {
                if let Some(code) = t.object_type(id).ok().and_then(|ty| ty.wire_code()) {
                    counts[code as usize] += 1;
                }
                println!("  #{}: {}", id, text);
            }
        }

        println!("\nType summary:");
        for (code, count) in counts.iter().enumerate() {
            if let Some(object_type) = ObjectType::from_wire_code(code as u32) {
                println!("  {:?}: {}", object_type, count);
            }
        }

        let complete = t.is_complete(UNUSED_OBJECT_ID, false);
        println!("Complete: {}", if complete { "yes" } else { "no" });
    }

    if let Err(e) = reader.close() {
        println!("\nTrailing data: {}", e);
    }
}
