//! Benchmark for Scribe archives using city data.
//!
//! Converts a JSON list of city records into one transcription (a root array
//! of city composites sharing state and country composites) and measures
//! size and encode/decode speed for each archive format.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use scribe::{ArchiveFormat, ObjectId, Transcription, UNUSED_OBJECT_ID, read_archive, write_archive};
use serde::Deserialize;

// =============================================================================
// JSON DATA STRUCTURES
// =============================================================================

#[derive(Debug, Deserialize)]
struct City {
    id: u32,
    name: String,
    state_id: u32,
    state_code: String,
    state_name: String,
    country_id: u32,
    country_code: String,
    country_name: String,
    latitude: String,
    longitude: String,
    native: Option<String>,
    population: Option<i64>,
    timezone: Option<String>,
    translations: Option<HashMap<String, String>>,
}

// =============================================================================
// CONVERSION TO A TRANSCRIPTION
// =============================================================================

/// Hands out object ids in order.
struct IdAllocator {
    next: ObjectId,
}

impl IdAllocator {
    fn next(&mut self) -> ObjectId {
        let id = self.next;
        self.next += 1;
        id
    }
}

fn add_string_field(
    t: &mut Transcription,
    ids: &mut IdAllocator,
    owner: ObjectId,
    field: &str,
    value: &str,
) {
    let key = t.get_or_create_object_key(field, 0);
    let id = ids.next();
    t.add_string(id, value).expect("Failed to add string");
    t.composite_object_mut(owner)
        .expect("owner is a composite")
        .add_child(key, id)
        .expect("Failed to add child");
}

fn add_region(
    t: &mut Transcription,
    ids: &mut IdAllocator,
    code: &str,
    name: &str,
) -> ObjectId {
    let id = ids.next();
    t.add_composite_object(id).expect("Failed to add region");
    add_string_field(t, ids, id, "code", code);
    add_string_field(t, ids, id, "name", name);
    id
}

fn convert_cities(cities: &[City]) -> Transcription {
    let mut t = Transcription::new();
    let mut ids = IdAllocator { next: 0 };

    let root = ids.next();
    t.add_composite_object(root).expect("Failed to add root");
    let cities_key = t.get_or_create_object_key("cities", 0);

    let mut states: HashMap<u32, ObjectId> = HashMap::new();
    let mut countries: HashMap<u32, ObjectId> = HashMap::new();

    for city in cities {
        let country = match countries.get(&city.country_id) {
            Some(&id) => id,
            None => {
                let id = add_region(&mut t, &mut ids, &city.country_code, &city.country_name);
                countries.insert(city.country_id, id);
                id
            }
        };
        let state = match states.get(&city.state_id) {
            Some(&id) => id,
            None => {
                let id = add_region(&mut t, &mut ids, &city.state_code, &city.state_name);
                let country_key = t.get_or_create_object_key("country", 0);
                t.composite_object_mut(id)
                    .expect("state is a composite")
                    .add_child(country_key, country)
                    .expect("Failed to add child");
                states.insert(city.state_id, id);
                id
            }
        };

        let id = ids.next();
        t.add_composite_object(id).expect("Failed to add city");
        t.composite_object_mut(root)
            .expect("root is a composite")
            .add_child(cities_key, id)
            .expect("Failed to add child");

        let source_id = ids.next();
        t.add_unsigned_integer(source_id, city.id).expect("Failed to add id");
        let key = t.get_or_create_object_key("source_id", 0);
        t.composite_object_mut(id).expect("city").add_child(key, source_id).expect("child");

        add_string_field(&mut t, &mut ids, id, "name", &city.name);
        if let Some(native) = city.native.as_deref().filter(|s| !s.is_empty()) {
            add_string_field(&mut t, &mut ids, id, "native", native);
        }
        if let Some(timezone) = city.timezone.as_deref() {
            add_string_field(&mut t, &mut ids, id, "timezone", timezone);
        }

        // Population was an i64 in the source; values beyond i32 are clamped.
        if let Some(population) = city.population {
            let value = population.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
            let pop_id = ids.next();
            t.add_signed_integer(pop_id, value).expect("Failed to add population");
            let key = t.get_or_create_object_key("population", 0);
            t.composite_object_mut(id).expect("city").add_child(key, pop_id).expect("child");
        }

        // Coordinates as an array of two doubles.
        let location_key = t.get_or_create_object_key("location", 0);
        for coordinate in [&city.latitude, &city.longitude] {
            let value: f64 = coordinate.parse().unwrap_or(f64::NAN);
            let coord_id = ids.next();
            t.add_double(coord_id, value).expect("Failed to add coordinate");
            t.composite_object_mut(id)
                .expect("city")
                .add_child(location_key, coord_id)
                .expect("child");
        }

        let state_key = t.get_or_create_object_key("state", 0);
        t.composite_object_mut(id).expect("city").add_child(state_key, state).expect("child");

        if let Some(translations) = &city.translations {
            let mut languages: Vec<_> = translations.iter().collect();
            languages.sort();
            for (language, text) in languages {
                add_string_field(&mut t, &mut ids, id, &format!("name_{}", language), text);
            }
        }
    }

    t
}

// =============================================================================
// BENCHMARK
// =============================================================================

const DECODE_ITERS: u32 = 10;

struct FormatResult {
    format: ArchiveFormat,
    size: usize,
    encode_time: Duration,
    decode_time: Duration,
}

fn bench_format(format: ArchiveFormat, t: &Transcription) -> (FormatResult, Vec<u8>) {
    let encode_start = Instant::now();
    let mut encoded = Vec::new();
    write_archive(format, &mut encoded, std::slice::from_ref(t)).expect("Failed to encode");
    let encode_time = encode_start.elapsed();

    // Warmup
    for _ in 0..3 {
        let _ = read_archive(&mut encoded.as_slice(), 1).expect("Failed to decode");
    }

    let decode_start = Instant::now();
    let mut decoded = Vec::new();
    for _ in 0..DECODE_ITERS {
        decoded = read_archive(&mut encoded.as_slice(), 1).expect("Failed to decode");
    }
    let decode_time = decode_start.elapsed() / DECODE_ITERS;
    assert!(decoded[0] == *t, "{} round trip changed the transcription", format.name());

    let result = FormatResult {
        format,
        size: encoded.len(),
        encode_time,
        decode_time,
    };
    (result, encoded)
}

fn main() {
    let data_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "../../../out/cities.json".to_string());

    println!("Loading cities from: {}", data_path);

    let json_data = fs::read_to_string(&data_path).expect("Failed to read cities.json");

    let parse_start = Instant::now();
    let cities: Vec<City> = serde_json::from_str(&json_data).expect("Failed to parse JSON");
    let parse_time = parse_start.elapsed();

    println!("Loaded {} cities in {:?}", cities.len(), parse_time);

    let convert_start = Instant::now();
    let transcription = convert_cities(&cities);
    let convert_time = convert_start.elapsed();

    println!(
        "Converted to {} objects in {:?}",
        transcription.num_used_object_ids(),
        convert_time
    );
    println!(
        "  - {} tag names, {} unique strings",
        transcription.num_object_tag_names(),
        transcription.num_unique_strings()
    );
    assert!(
        transcription.is_complete(UNUSED_OBJECT_ID, true),
        "Converted transcription is incomplete"
    );

    let input_path = Path::new(&data_path);
    let stem = input_path
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy();
    let parent = input_path.parent().unwrap_or(Path::new("."));

    let mut results = Vec::new();
    for (format, extension) in [
        (ArchiveFormat::Binary, "scb"),
        (ArchiveFormat::Text, "sct"),
        (ArchiveFormat::Xml, "scx"),
    ] {
        let (result, encoded) = bench_format(format, &transcription);

        println!("\n{}: {} bytes", format.name(), result.size);
        println!(
            "  Encode: {:?} ({:.2} MB/s)",
            result.encode_time,
            (result.size as f64 / 1_000_000.0) / result.encode_time.as_secs_f64()
        );
        println!(
            "  Decode: {:?} (avg of {} iterations, {:.2} MB/s)",
            result.decode_time,
            DECODE_ITERS,
            (result.size as f64 / 1_000_000.0) / result.decode_time.as_secs_f64()
        );

        let output = parent.join(format!("{}.{}", stem, extension));
        fs::write(&output, &encoded).expect("Failed to write archive");
        println!("  Written to {}", output.display());

        results.push(result);
    }

    // Summary
    println!("\n=== Summary ===");
    println!("Cities: {}", cities.len());
    println!(
        "JSON size: {} bytes ({:.1} MB)",
        json_data.len(),
        json_data.len() as f64 / 1_000_000.0
    );
    for result in &results {
        println!(
            "{:<6} {:>12} bytes ({:.1}% of JSON), encode {:?}, decode {:?}",
            result.format.name(),
            result.size,
            100.0 * result.size as f64 / json_data.len() as f64,
            result.encode_time,
            result.decode_time
        );
    }
}
