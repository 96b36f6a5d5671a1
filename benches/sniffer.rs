use divan::{black_box, Bencher};
use tonearm::FormatSniffer;

fn main() {
    divan::main();
}

fn sample_buffers() -> Vec<Vec<u8>> {
    let mut ts = vec![0u8; 376];
    ts[0] = 0x47;
    ts[188] = 0x47;

    let mut mp3 = b"ID3\x04\x00\x00\x00\x00\x00\x0A".to_vec();
    mp3.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x64]);
    mp3.resize(417, 0);

    vec![
        b"RIFF....WAVEfmt ".to_vec(),
        b"OggS\x00\x02page".to_vec(),
        ts,
        mp3,
        vec![0xA5; 512],
    ]
}

#[divan::bench]
fn classify_mixed_prefixes(bencher: Bencher) {
    let sniffer = FormatSniffer::new();
    let buffers = sample_buffers();
    bencher.bench_local(|| {
        for buffer in &buffers {
            black_box(sniffer.classify(black_box(buffer)));
        }
    });
}

#[divan::bench]
fn feed_steady_state(bencher: Bencher) {
    let mut sniffer = FormatSniffer::new();
    sniffer.feed(b"OggS\x00\x02page");
    let chunk = vec![0x5Au8; 1024];
    bencher.bench_local(|| black_box(sniffer.feed(black_box(&chunk))));
}
