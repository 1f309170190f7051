//! Benchmarks for sentence segmentation and ranking.

use askweb::ranking::{CandidateSentence, Ranker};
use askweb::text::segment;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const PARAGRAPH: &str = "TP. Hồ Chí Minh có diện tích khoảng 2.095 km². \
    Theo số liệu năm 2019, dân số là 8.993.082 người, v.v. và đang tăng nhanh! \
    GS. Nguyễn Văn A cho biết: \"Thành phố cần thêm 1,5 triệu căn hộ.\" \
    Xem chi tiết tại https://vi.wikipedia.org/wiki/Thành_phố_Hồ_Chí_Minh. \
    Ông J. Robert Oppenheimer là người đứng đầu Dự án Manhattan (1942 - 1946).";

fn segment_benchmark(c: &mut Criterion) {
    let long = PARAGRAPH.repeat(20);
    c.bench_function("segment_paragraph", |b| b.iter(|| segment(black_box(PARAGRAPH))));
    c.bench_function("segment_page", |b| b.iter(|| segment(black_box(&long))));
}

fn rank_benchmark(c: &mut Criterion) {
    let ranker = Ranker::default();
    let candidates: Vec<CandidateSentence> = segment(&PARAGRAPH.repeat(10))
        .into_iter()
        .map(|sentence| CandidateSentence::new(sentence, "vi.wikipedia.org"))
        .collect();

    c.bench_function("rank_page", |b| {
        b.iter(|| {
            ranker.rank(
                black_box("Ai chế tạo ra bom nguyên tử?"),
                Some("Dự án Manhattan"),
                black_box(&candidates),
            )
        })
    });
}

criterion_group!(benches, segment_benchmark, rank_benchmark);
criterion_main!(benches);
