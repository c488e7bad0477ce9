use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sitecloner::{extract, prompt};

// Synthetic storefront page, large enough that extraction walks a real tree.
fn sample_page(products: usize) -> String {
    let mut html = String::from(
        r#"<!DOCTYPE html><html><head>
<meta charset="utf-8"><meta name="viewport" content="width=device-width">
<link rel="stylesheet" href="/css/reset.css">
<link rel="preload stylesheet" href="https://cdn.bench.test/theme.css">
<style>.card { border: 1px solid #ddd; }</style>
<script>window.dataLayer = [];</script>
</head><body><main>"#,
    );
    for i in 0..products {
        html.push_str(&format!(
            r#"<article class="card"><img src="img/p{i}.jpg" alt="Product {i}"><h2>Product {i}</h2><p>Lorem ipsum dolor sit amet.</p></article>"#
        ));
    }
    html.push_str("</main></body></html>");
    html
}

fn bench_extract(c: &mut Criterion) {
    let html = sample_page(200);

    c.bench_function("extract_200_products", |b| {
        b.iter(|| {
            let ctx = extract::extract(black_box(&html), "https://shop.bench.test/catalog/").unwrap();
            black_box(ctx.images.len());
        })
    });
}

fn bench_compose(c: &mut Criterion) {
    let html = sample_page(200);
    let mut ctx = extract::extract(&html, "https://shop.bench.test/catalog/").unwrap();
    ctx.screenshot = Some(vec![0u8; 64 * 1024]);

    c.bench_function("compose_prompt_200_products", |b| {
        b.iter(|| {
            let prompt = prompt::compose(black_box(&ctx.generation_context()));
            black_box(prompt.len());
        })
    });
}

criterion_group!(benches, bench_extract, bench_compose);
criterion_main!(benches);
