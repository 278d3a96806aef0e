//! Benchmarks for the pipeline stages.

use criterion::{criterion_group, criterion_main, Criterion};
use image::{Rgba, RgbaImage};
use nalgebra::{Isometry3, Translation3, Unit, UnitQuaternion, Vector3};
use unfurl::mesh::primitives::revolve;
use unfurl::prelude::*;

/// A bottle with a flared base, a straight body and a neck.
fn bottle(segments: usize, rings: usize) -> Mesh {
    let profile: Vec<(f64, f64)> = (0..=rings)
        .map(|i| {
            let t = i as f64 / rings as f64;
            let z = -6.0 + 12.0 * t;
            let r = if z < -4.0 {
                1.0 + 0.3 * (-4.0 - z)
            } else if z > 3.0 {
                1.0 - 0.2 * (z - 3.0)
            } else {
                1.0
            };
            (r, z)
        })
        .collect();
    revolve(&profile, segments, false).unwrap()
}

fn tilted_bottle() -> Mesh {
    let mut mesh = bottle(128, 120);
    let about = Unit::new_normalize(Vector3::new(1.0, 1.0, 0.0));
    let rot = UnitQuaternion::from_axis_angle(&about, 0.3);
    mesh.transform(&Isometry3::from_parts(Translation3::new(2.0, -1.0, 0.5), rot));
    mesh
}

fn bench_align(c: &mut Criterion) {
    let mesh = tilted_bottle();
    for (name, parallel) in [("align_parallel", true), ("align_sequential", false)] {
        let options = AlignOptions::default().with_parallel(parallel);
        c.bench_function(name, |b| {
            b.iter(|| {
                let mut m = mesh.clone();
                align(&mut m, &options).unwrap()
            })
        });
    }
}

fn bench_body_and_seam(c: &mut Criterion) {
    let mesh = bottle(128, 120);
    c.bench_function("extract_body", |b| {
        b.iter(|| extract_body(&mesh, &BodyOptions::default()).unwrap())
    });

    let body = extract_body(&mesh, &BodyOptions::default()).unwrap();
    for (name, parallel) in [("find_seam_parallel", true), ("find_seam_sequential", false)] {
        let options = SeamOptions::default().with_parallel(parallel);
        c.bench_function(name, |b| b.iter(|| find_seam(&body.mesh, &options).unwrap()));
    }
}

fn bench_resample(c: &mut Criterion) {
    let mesh = bottle(64, 40);
    let uvs = mesh.uvs().unwrap().clone();
    let mut flipped = uvs.clone();
    for uv in flipped.coords_mut() {
        uv.x = 1.0 - uv.x;
    }
    let source =
        RgbaImage::from_fn(512, 512, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 64, 255]));

    for (name, parallel) in [("resample_512_parallel", true), ("resample_512_sequential", false)] {
        let options = ResampleOptions::default().with_parallel(parallel);
        c.bench_function(name, |b| {
            b.iter(|| resample_texture(&source, &uvs, &flipped, &options).unwrap())
        });
    }
}

criterion_group!(benches, bench_align, bench_body_and_seam, bench_resample);
criterion_main!(benches);
