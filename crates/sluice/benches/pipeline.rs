use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use serde_json::{Value, json};
use sluice::chart::SankeyChart;
use sluice::render::{RenderOptions, SvgRenderOptions, render_pipeline, render_scene_svg};

/// A layered funnel: `layers` columns of `width` pages, every page linking to the next layer.
fn funnel(layers: usize, width: usize) -> Value {
    let name = |l: usize, i: usize| format!("L{l}P{i}");
    let nodes: Vec<Value> = (0..layers)
        .flat_map(|l| (0..width).map(move |i| json!({"name": name(l, i)})))
        .collect();
    let links: Vec<Value> = (0..layers.saturating_sub(1))
        .flat_map(|l| {
            (0..width).flat_map(move |i| {
                (0..width).map(move |j| {
                    json!({"source": name(l, i), "target": name(l + 1, j), "value": 1 + (i * 7 + j * 3) % 50})
                })
            })
        })
        .collect();
    json!({"nodes": nodes, "links": links, "entry_pages": {"L0P0": 100}})
}

fn fixtures() -> Vec<(&'static str, Value)> {
    vec![
        ("small", funnel(3, 3)),
        ("medium", funnel(6, 8)),
        ("large", funnel(10, 20)),
    ]
}

fn bench_render_pipeline(c: &mut Criterion) {
    let opts = RenderOptions::default();
    let mut group = c.benchmark_group("render_pipeline");
    for (name, payload) in fixtures() {
        group.bench_function(name, |b| {
            b.iter(|| render_pipeline(std::hint::black_box(&payload), &opts))
        });
    }
    group.finish();
}

fn bench_render_svg(c: &mut Criterion) {
    let opts = RenderOptions::default();
    let svg_opts = SvgRenderOptions::default();
    let mut group = c.benchmark_group("render_scene_svg");
    for (name, payload) in fixtures() {
        let scene = render_pipeline(&payload, &opts);
        group.bench_function(name, |b| {
            b.iter(|| render_scene_svg(std::hint::black_box(&scene), &svg_opts))
        });
    }
    group.finish();
}

fn bench_resize(c: &mut Criterion) {
    let mut group = c.benchmark_group("chart_resize");
    for (name, payload) in fixtures() {
        group.bench_function(name, |b| {
            b.iter_batched(
                || {
                    let mut chart = SankeyChart::default();
                    chart.set_data(&payload);
                    chart
                },
                |mut chart| {
                    chart.resize(1280.0, 720.0);
                    chart
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_render_pipeline,
    bench_render_svg,
    bench_resize
);
criterion_main!(benches);
