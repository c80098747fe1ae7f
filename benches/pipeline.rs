use criterion::{criterion_group, criterion_main, Criterion};

use mailrelay::parser::mime::{collect_parts, parse_message, part_tree};
use mailrelay::split::Splitter;

fn long_text() -> String {
    (0..20_000)
        .map(|i| format!("line {i}, with a comma, and some more words\n"))
        .collect()
}

fn nested_message() -> String {
    let mut raw = String::from(
        "From: bench@example.com\nSubject: Bench\nMIME-Version: 1.0\n\
Content-Type: multipart/mixed; boundary=\"outer\"\n\n",
    );
    for i in 0..50 {
        raw.push_str(&format!(
            "--outer\nContent-Type: multipart/alternative; boundary=\"inner{i}\"\n\n\
--inner{i}\nContent-Type: text/plain\n\nplain {i}\n\
--inner{i}\nContent-Type: text/html\n\n<p>html {i}</p>\n\
--inner{i}--\n\
--outer\nContent-Type: application/pdf\n\
Content-Disposition: attachment; filename=\"file{i}.pdf\"\n\
Content-Transfer-Encoding: base64\n\nJVBERi0xLjQK\n"
        ));
    }
    raw.push_str("--outer--\n");
    raw
}

fn bench_split(c: &mut Criterion) {
    let text = long_text();
    let splitter = Splitter::default();
    c.bench_function("split_long_text", |b| b.iter(|| splitter.split(&text).len()));
}

fn bench_extract(c: &mut Criterion) {
    let raw = nested_message();
    c.bench_function("extract_nested_parts", |b| {
        b.iter(|| {
            let message = parse_message(raw.as_bytes(), 1).unwrap();
            let root = part_tree(&message);
            collect_parts(&root, 1).len()
        })
    });
}

criterion_group!(benches, bench_split, bench_extract);
criterion_main!(benches);
