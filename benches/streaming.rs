use criterion::{criterion_group, criterion_main, Criterion, black_box};

use std::sync::Arc;

use glam::{IVec3, Mat4, Vec3};
use volseq::asset::descriptor::{
    FrameInfos, FrameRange, GridClass, GridInfo, Quantization, SequenceDescriptor, SequenceId,
};
use volseq::asset::source::DecodedGrid;
use volseq::playback::selector::FrameSelector;
use volseq::streaming::{FrameKey, GridRole, StreamingPool};

fn bench_descriptor(frame_count: u32) -> Arc<SequenceDescriptor> {
    let frames = (0..frame_count)
        .map(|i| FrameInfos {
            index_min: IVec3::splat(-32),
            index_max: IVec3::splat(32),
            bounds_min: Vec3::splat(-1.0),
            bounds_max: Vec3::splat(1.0),
            index_to_local: Mat4::IDENTITY,
            active_voxels: 10_000 + i as u64,
            memory_usage: 64 * 1024,
        })
        .collect();
    let ranges = (0..frame_count)
        .map(|i| FrameRange {
            offset: i as u64 * 65536,
            len: 65536,
        })
        .collect();

    Arc::new(SequenceDescriptor {
        id: SequenceId::next(),
        name: "bench".into(),
        grid_class: GridClass::FogVolume,
        quantization: Quantization::None,
        frame_rate: 30.0,
        voxel_size: 0.1,
        grids: vec![GridInfo {
            name: "density".into(),
            is_vector: false,
        }],
        frames,
        ranges,
    })
}

fn decoded_frame(frame: u32, bytes: usize) -> Vec<DecodedGrid> {
    vec![DecodedGrid {
        role: GridRole::Density,
        index_min: IVec3::splat(-32),
        index_size: IVec3::splat(64),
        index_to_local: Mat4::IDENTITY,
        bytes: vec![frame as u8; bytes],
    }]
}

fn bench_pool_try_get(c: &mut Criterion) {
    let descriptor = bench_descriptor(64);
    let pool = StreamingPool::new(64 * 64 * 1024);
    for frame in 0..64 {
        let key = FrameKey::new(descriptor.id, frame);
        pool.request_frame(key);
        pool.on_load_completed(key, decoded_frame(frame, 1024));
    }

    c.bench_function("pool_try_get_hit", |b| {
        let mut frame = 0u32;
        b.iter(|| {
            frame = (frame + 1) % 64;
            black_box(pool.try_get(black_box(FrameKey::new(descriptor.id, frame))))
        });
    });
}

fn bench_pool_request_churn(c: &mut Criterion) {
    let descriptor = bench_descriptor(1024);

    c.bench_function("pool_request_complete_evict", |b| {
        // Budget fits 8 frames; every completion past that evicts
        let pool = StreamingPool::new(8 * 1024);
        let mut frame = 0u32;
        b.iter(|| {
            frame = (frame + 1) % 1024;
            let key = FrameKey::new(descriptor.id, frame);
            if pool.request_frame(key) {
                pool.on_load_completed(key, decoded_frame(frame, 1024));
            }
        });
    });
}

fn bench_pool_pin_unpin(c: &mut Criterion) {
    let descriptor = bench_descriptor(16);
    let pool = StreamingPool::new(16 * 2048);
    for frame in 0..16 {
        let key = FrameKey::new(descriptor.id, frame);
        pool.request_frame(key);
        pool.on_load_completed(key, decoded_frame(frame, 1024));
    }

    c.bench_function("pool_pin_unpin", |b| {
        let mut frame = 0u32;
        b.iter(|| {
            frame = (frame + 1) % 16;
            let key = FrameKey::new(descriptor.id, frame);
            let snapshot = pool.pin(key);
            black_box(&snapshot);
            pool.unpin(key);
        });
    });
}

fn bench_frame_selection(c: &mut Criterion) {
    let selector = FrameSelector::new(bench_descriptor(900), 2);

    c.bench_function("selector_select_looping", |b| {
        let mut elapsed = 0.0f32;
        b.iter(|| {
            elapsed += 1.0 / 60.0;
            black_box(selector.select(black_box(elapsed), true))
        });
    });

    c.bench_function("selector_window", |b| {
        let mut frame = 0u32;
        b.iter(|| {
            frame = (frame + 1) % 900;
            black_box(selector.window(black_box(frame), true))
        });
    });
}

criterion_group!(
    benches,
    bench_pool_try_get,
    bench_pool_request_churn,
    bench_pool_pin_unpin,
    bench_frame_selection,
);
criterion_main!(benches);
