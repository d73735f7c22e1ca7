use criterion::{black_box, criterion_group, criterion_main, Criterion};
use runme_core::{CellRef, Identity};
use runme_markdown::{parse, render};

const CELL_ID: &str = "01HEXJ9KWG7BYSFYCNKVF0VWR6";

fn notebook(cells: usize) -> String {
    let mut text = String::from("---\nshell: bash\ncwd: ./docs\n---\n\n# Runbook\n\n");
    for i in 0..cells {
        text.push_str(&format!(
            "Step {i} explains what happens next.\n\n```sh {{\"name\":\"step-{i}\",\"interactive\":false}}\necho {i}\n```\n\n"
        ));
    }
    text
}

fn bench_parse_render(c: &mut Criterion) {
    let text = notebook(64);

    c.bench_function("notebook/parse_64_cells", |b| {
        b.iter(|| {
            let doc = parse(black_box(&text)).expect("parse notebook");
            black_box(doc.cell_count());
        });
    });

    let doc = parse(&text).expect("parse notebook");
    c.bench_function("notebook/render_unmodified_64_cells", |b| {
        b.iter(|| {
            let out = render(black_box(&doc)).expect("render notebook");
            black_box(out.len());
        });
    });
}

fn bench_assign_and_render(c: &mut Criterion) {
    let text = notebook(64);
    let id: Identity = CELL_ID.parse().expect("valid ulid");

    c.bench_function("notebook/assign_render_64_cells", |b| {
        b.iter(|| {
            let mut doc = parse(black_box(&text)).expect("parse notebook");
            doc.assign_document_identity(&id);
            for idx in 0..doc.cell_count() {
                doc.assign_cell_identity(CellRef(idx), &id);
            }
            black_box(render(&doc).expect("render notebook").len());
        });
    });
}

criterion_group!(benches, bench_parse_render, bench_assign_and_render);
criterion_main!(benches);
