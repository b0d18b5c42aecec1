//! Criterion benchmarks for the diff and merge pipeline on generated
//! documents of increasing size.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use scenedoc::merge::{MergeInput, MergeOptions, MergeTarget, diff, merge};
use scenedoc::model::document::{Artboard, Document};
use scenedoc::model::node::{Node, NodeHeader};
use scenedoc::{DiffOptions, DocumentId, NodeId, Rect};

/// A document with `frames` top-level frames of `texts` text nodes each.
fn generate(frames: usize, texts: usize) -> Document {
    let mut doc = Document::new(
        DocumentId::new("bench-doc").expect("valid id"),
        "Bench".to_owned(),
    );
    let mut board = Artboard::new(
        NodeId::new("ab-0").expect("valid id"),
        "Board".to_owned(),
        Rect::new(0.0, 0.0, 4000.0, 4000.0),
    );
    for f in 0..frames {
        let children = (0..texts)
            .map(|t| {
                Node::text(
                    NodeHeader::new(
                        NodeId::new(&format!("t-{f}-{t}")).expect("valid id"),
                        format!("Text {f}.{t}"),
                        Rect::new(0.0, 24.0 * t as f64, 200.0, 20.0),
                    ),
                    format!("content {f}.{t}"),
                )
            })
            .collect();
        board.children.push(Node::frame(
            NodeHeader::new(
                NodeId::new(&format!("f-{f}")).expect("valid id"),
                format!("Frame {f}"),
                Rect::new(0.0, 300.0 * f as f64, 400.0, 280.0),
            ),
            children,
        ));
    }
    doc.artboards.push(board);
    doc
}

/// A branch that renames every tenth text node and hides every seventh.
fn mutate(doc: &Document, salt: &str) -> Document {
    let mut out = doc.clone();
    for frame in &mut out.artboards[0].children {
        if let Some(children) = frame.children_mut() {
            for (i, child) in children.iter_mut().enumerate() {
                if i % 10 == 0 {
                    child.header_mut().name = format!("renamed-{salt}-{i}");
                }
                if i % 7 == 0 {
                    child.header_mut().visible = Some(false);
                }
            }
        }
    }
    out
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");
    for size in [10_usize, 50, 200] {
        let base = generate(size, 10);
        let next = mutate(&base, "x");
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| diff(&base, &next, &DiffOptions::default()).expect("diff succeeds"));
        });
    }
    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    for size in [10_usize, 50, 200] {
        let base = generate(size, 10);
        let local = mutate(&base, "local");
        let remote = mutate(&base, "remote");
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                merge(
                    MergeInput {
                        base: &base,
                        local: &local,
                        remote: &remote,
                        target: MergeTarget::Local,
                    },
                    &MergeOptions::default(),
                )
                .expect("merge succeeds")
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_diff, bench_merge);
criterion_main!(benches);
