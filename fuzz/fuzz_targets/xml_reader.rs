#![no_main]

use libfuzzer_sys::fuzz_target;
use xml::{DtdProcessing, ReaderSettings, XmlReader};

fuzz_target!(|data: &[u8]| {
    let settings = ReaderSettings {
        dtd_processing: DtdProcessing::Parse,
        max_characters_in_document: Some(1 << 20),
        max_characters_from_entities: Some(1 << 16),
        buffer_size: 64,
        ..ReaderSettings::default()
    };
    let mut reader = XmlReader::from_bytes(data.to_vec(), settings);
    while let Ok(true) = reader.read() {
        if reader.has_value() && reader.value().is_err() {
            break;
        }
        for i in 0..reader.attribute_count() {
            let _ = reader.get_attribute_at(i);
        }
    }
});
