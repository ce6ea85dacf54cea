use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flexgpt::core::frame_decoder::{FrameDecoder, FrameHandler};
use std::hint::black_box;

#[derive(Default)]
struct Sink {
    chars: usize,
}

impl FrameHandler for Sink {
    fn on_meta(&mut self, _conversation_id: String) {}

    fn on_chunk(&mut self, content: String) {
        self.chars += content.len();
    }

    fn on_done(&mut self) {}

    fn on_error(&mut self, _message: String) {}
}

fn make_body(frames: usize) -> Vec<u8> {
    let mut body = String::from("data: {\"type\":\"meta\",\"conversationId\":\"c-bench\"}\n\n");
    for i in 0..frames {
        body.push_str(&format!(
            "data: {{\"type\":\"chunk\",\"content\":\"token {i} lorem ipsum dolor sit amet ünïcödé\"}}\n\n"
        ));
    }
    body.push_str("data: {\"type\":\"done\"}\n\n");
    body.into_bytes()
}

fn decode_in_chunks(body: &[u8], chunk_size: usize) -> usize {
    let mut decoder = FrameDecoder::new();
    let mut sink = Sink::default();
    for chunk in body.chunks(chunk_size) {
        decoder.push(chunk, &mut sink);
    }
    decoder.finish();
    sink.chars
}

fn bench_frame_decoder(c: &mut Criterion) {
    for &frames in &[100usize, 1000usize] {
        let body = make_body(frames);

        let mut group = c.benchmark_group(format!("frame_decoder_frames{frames}"));
        group.throughput(Throughput::Bytes(body.len() as u64));

        // Network-sized reads, small reads, and the worst case of one byte at a time
        for &chunk_size in &[16 * 1024usize, 64, 1] {
            group.bench_function(BenchmarkId::new("chunk", chunk_size), |b| {
                b.iter(|| decode_in_chunks(black_box(&body), chunk_size))
            });
        }

        group.finish();
    }
}

criterion_group!(benches, bench_frame_decoder);
criterion_main!(benches);
