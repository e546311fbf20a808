#![no_main]

use libfuzzer_sys::fuzz_target;
use xml::{ReaderSettings, Step, XmlPushReader, XmlReader};

// The first byte picks the chunk size; the node stream must match a
// blocking read of the same bytes.
fuzz_target!(|data: &[u8]| {
    let Some((&size, input)) = data.split_first() else {
        return;
    };
    let chunk_size = usize::from(size % 16) + 1;
    let settings = ReaderSettings {
        buffer_size: 16,
        ..ReaderSettings::default()
    };

    let mut whole = Vec::new();
    let mut reader = XmlReader::from_bytes(input.to_vec(), settings.clone());
    loop {
        match reader.read() {
            Ok(true) => match reader.value() {
                Ok(value) => {
                    let value = value.to_string();
                    whole.push((reader.node_type(), reader.name().to_string(), value));
                }
                Err(_) => break,
            },
            _ => break,
        }
    }

    let mut pushed = Vec::new();
    let mut reader = XmlPushReader::new(settings);
    let mut chunks = input.chunks(chunk_size);
    'nodes: loop {
        match reader.read() {
            Ok(Step::Ready(true)) => loop {
                match reader.finish_value() {
                    Ok(Step::Ready(())) => {
                        pushed.push((
                            reader.node_type(),
                            reader.name().to_string(),
                            reader.value().to_string(),
                        ));
                        break;
                    }
                    Ok(Step::NeedMoreInput) => match chunks.next() {
                        Some(chunk) => {
                            let _ = reader.feed(chunk);
                        }
                        None => reader.finish(),
                    },
                    Err(_) => break 'nodes,
                }
            },
            Ok(Step::Ready(false)) | Err(_) => break,
            Ok(Step::NeedMoreInput) => match chunks.next() {
                Some(chunk) => {
                    let _ = reader.feed(chunk);
                }
                None => reader.finish(),
            },
        }
    }

    assert_eq!(whole, pushed);
});
