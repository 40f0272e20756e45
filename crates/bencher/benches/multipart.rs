use std::hint::black_box;

use bencher::{MultipartInput, TestCase};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use micro_event_http::codec::multipart::{MultipartDecoder, MultipartEncoder, Part};

const BOUNDARY: &str = "----micro-event-bench-boundary";

fn create_test_cases() -> Vec<TestCase<MultipartInput>> {
    vec![
        TestCase::small("one_small_field", MultipartInput::new(1, 16)),
        TestCase::normal("ten_fields", MultipartInput::new(10, 1024)),
        TestCase::large("one_large_file", MultipartInput::new(1, 1024 * 1024)),
        TestCase::large("many_files", MultipartInput::new(64, 16 * 1024)),
    ]
}

fn encode(input: &MultipartInput) -> Vec<u8> {
    let mut encoder = MultipartEncoder::new(BOUNDARY);
    for index in 0..input.parts() {
        let part = Part::new()
            .with_name(format!("field{index}"))
            .with_filename(format!("file{index}.txt"))
            .with_content_type("text/plain")
            .with_payload(input.payload(index));
        encoder = encoder.part(part);
    }
    encoder.finish().to_vec()
}

fn benchmark_multipart_decoder(criterion: &mut Criterion) {
    let test_cases = create_test_cases();
    let mut group = criterion.benchmark_group("multipart_decoder");

    for case in test_cases {
        let body = encode(case.input());
        group.throughput(Throughput::Bytes(body.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(case.name()), &body, |b, body| {
            let decoder = MultipartDecoder::new(BOUNDARY);
            b.iter(|| {
                let parts = decoder.decode(black_box(body));
                black_box(parts);
            });
        });
    }

    group.finish();
}

criterion_group!(multipart, benchmark_multipart_decoder);
criterion_main!(multipart);
