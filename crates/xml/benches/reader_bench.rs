use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use xml::{DtdProcessing, ReaderSettings, Step, XmlPushReader, XmlReader};

const SMALL_RECORDS: usize = 64;
const LARGE_RECORDS: usize = 20_000;

fn make_records(count: usize) -> String {
    let mut doc = String::with_capacity(count * 96 + 32);
    doc.push_str("<?xml version=\"1.0\"?>\n<catalog xmlns:c=\"urn:catalog\">\n");
    for i in 0..count {
        doc.push_str(&format!(
            "  <c:item id=\"{i}\" kind='book'><title>Title &amp; {i}</title><!-- note --><price>{}.99</price></c:item>\n",
            i % 90
        ));
    }
    doc.push_str("</catalog>\n");
    doc
}

fn make_entity_document(count: usize) -> String {
    let mut doc = String::from(
        "<!DOCTYPE r [<!ENTITY who \"world\"><!ATTLIST e kind CDATA \"plain\">]>\n<r>",
    );
    for _ in 0..count {
        doc.push_str("<e>hello &who;</e>");
    }
    doc.push_str("</r>");
    doc
}

fn make_long_text(bytes: usize) -> String {
    let mut doc = String::with_capacity(bytes + 16);
    doc.push_str("<r>");
    while doc.len() < bytes {
        doc.push_str("lorem ipsum dolor sit amet &lt; ");
    }
    doc.push_str("</r>");
    doc
}

fn count_nodes(reader: &mut XmlReader) -> usize {
    let mut nodes = 0;
    while reader.read().expect("benchmark input is well formed") {
        nodes += 1;
    }
    nodes
}

fn bench_read_small(c: &mut Criterion) {
    let input = make_records(SMALL_RECORDS);
    c.bench_function("bench_read_small", |b| {
        b.iter(|| {
            let mut reader = XmlReader::from_str(black_box(&input), ReaderSettings::default());
            black_box(count_nodes(&mut reader));
        });
    });
}

fn bench_read_large(c: &mut Criterion) {
    let input = make_records(LARGE_RECORDS);
    c.bench_function("bench_read_large", |b| {
        b.iter(|| {
            let mut reader = XmlReader::from_str(black_box(&input), ReaderSettings::default());
            black_box(count_nodes(&mut reader));
        });
    });
}

fn bench_read_large_bytes(c: &mut Criterion) {
    let input = make_records(LARGE_RECORDS).into_bytes();
    c.bench_function("bench_read_large_bytes", |b| {
        b.iter_batched(
            || input.clone(),
            |bytes| {
                let mut reader = XmlReader::from_bytes(bytes, ReaderSettings::default());
                black_box(count_nodes(&mut reader));
            },
            BatchSize::LargeInput,
        );
    });
}

fn bench_read_values(c: &mut Criterion) {
    let input = make_records(LARGE_RECORDS);
    c.bench_function("bench_read_values", |b| {
        b.iter(|| {
            let mut reader = XmlReader::from_str(black_box(&input), ReaderSettings::default());
            let mut total = 0usize;
            while reader.read().expect("benchmark input is well formed") {
                if reader.has_value() {
                    total += reader.value().expect("value").len();
                }
            }
            black_box(total);
        });
    });
}

fn bench_entities(c: &mut Criterion) {
    let input = make_entity_document(LARGE_RECORDS);
    let settings = ReaderSettings {
        dtd_processing: DtdProcessing::Parse,
        ..ReaderSettings::default()
    };
    c.bench_function("bench_entities", |b| {
        b.iter(|| {
            let mut reader = XmlReader::from_str(black_box(&input), settings.clone());
            black_box(count_nodes(&mut reader));
        });
    });
}

fn bench_long_text_small_buffer(c: &mut Criterion) {
    let input = make_long_text(1 << 20);
    let settings = ReaderSettings {
        buffer_size: 256,
        ..ReaderSettings::default()
    };
    c.bench_function("bench_long_text_small_buffer", |b| {
        b.iter(|| {
            let mut reader = XmlReader::from_str(black_box(&input), settings.clone());
            let mut chunk = String::with_capacity(4096);
            let mut total = 0usize;
            while reader.read().expect("benchmark input is well formed") {
                if reader.has_value() {
                    loop {
                        chunk.clear();
                        let n = reader
                            .read_value_chunk(&mut chunk, 4096)
                            .expect("value chunk");
                        if n == 0 {
                            break;
                        }
                        total += n;
                    }
                }
            }
            black_box(total);
        });
    });
}

fn drive_push(reader: &mut XmlPushReader, bytes: &[u8], chunk_sizes: &[usize]) -> usize {
    let mut nodes = 0usize;
    let mut offset = 0usize;
    let mut size_idx = 0usize;
    loop {
        match reader.read().expect("benchmark input is well formed") {
            Step::Ready(true) => nodes += 1,
            Step::Ready(false) => return nodes,
            Step::NeedMoreInput if offset < bytes.len() => {
                let size = chunk_sizes[size_idx % chunk_sizes.len()];
                let end = (offset + size).min(bytes.len());
                reader.feed(&bytes[offset..end]).expect("feed");
                offset = end;
                size_idx += 1;
            }
            Step::NeedMoreInput => reader.finish(),
        }
    }
}

fn bench_push_chunked(c: &mut Criterion) {
    let input = make_records(LARGE_RECORDS);
    let bytes = input.as_bytes();
    let chunk_sizes = [1usize, 2, 3, 7, 64, 128, 256, 1024];
    c.bench_function("bench_push_chunked", |b| {
        b.iter_batched(
            || XmlPushReader::new(ReaderSettings::default()),
            |mut reader| black_box(drive_push(&mut reader, bytes, &chunk_sizes)),
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    benches,
    bench_read_small,
    bench_read_large,
    bench_read_large_bytes,
    bench_read_values,
    bench_entities,
    bench_long_text_small_buffer,
    bench_push_chunked
);
criterion_main!(benches);
