//! Benchmark scan integration performance.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use drishti_map::{MapperConfig, Pose, ScanBatch, ScanMapper};

/// Create a rectangular-room scan for benchmarking.
///
/// The robot sits at (robot_x, robot_y) meters inside a room_width x
/// room_height room; each beam carries the distance to the first wall.
fn room_scan(
    room_width: f64,
    room_height: f64,
    robot_x: f64,
    robot_y: f64,
    num_points: usize,
    pose: Pose,
) -> ScanBatch {
    let angle_step = 360.0 / num_points as f64;
    let max_range = (room_width * room_width + room_height * room_height).sqrt();

    let mut ranges = Vec::with_capacity(num_points);
    let mut angles_deg = Vec::with_capacity(num_points);

    for i in 0..num_points {
        let angle_deg = i as f64 * angle_step;
        angles_deg.push(angle_deg);

        let angle = angle_deg.to_radians();
        let cos_a = angle.cos();
        let sin_a = angle.sin();
        let mut range = max_range;

        // Simple room ray casting
        if cos_a > 0.0 {
            let t = (room_width - robot_x) / cos_a;
            if t > 0.0 && t < range {
                let y = robot_y + t * sin_a;
                if y >= 0.0 && y <= room_height {
                    range = t;
                }
            }
        }
        if cos_a < 0.0 {
            let t = -robot_x / cos_a;
            if t > 0.0 && t < range {
                let y = robot_y + t * sin_a;
                if y >= 0.0 && y <= room_height {
                    range = t;
                }
            }
        }
        if sin_a > 0.0 {
            let t = (room_height - robot_y) / sin_a;
            if t > 0.0 && t < range {
                let x = robot_x + t * cos_a;
                if x >= 0.0 && x <= room_width {
                    range = t;
                }
            }
        }
        if sin_a < 0.0 {
            let t = -robot_y / sin_a;
            if t > 0.0 && t < range {
                let x = robot_x + t * cos_a;
                if x >= 0.0 && x <= room_width {
                    range = t;
                }
            }
        }

        ranges.push(range.min(max_range));
    }

    ScanBatch {
        sequence: 0,
        timestamp_us: 0,
        ranges,
        angles_deg,
        pose,
    }
}

fn bench_scan_update(c: &mut Criterion) {
    let mut mapper = ScanMapper::new(MapperConfig::default());
    let batch = room_scan(6.0, 6.0, 3.0, 3.0, 360, mapper.pose());

    // Warm up
    for _ in 0..5 {
        mapper.update(&batch).unwrap();
    }

    c.bench_function("scan_update_360pts", |b| {
        b.iter(|| {
            let result = mapper.update(black_box(&batch));
            black_box(result)
        })
    });
}

fn bench_scan_update_sample_counts(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan_update_samples");

    for num_points in [180usize, 360, 720].iter() {
        let mut mapper = ScanMapper::new(MapperConfig::default());
        let batch = room_scan(6.0, 6.0, 3.0, 3.0, *num_points, mapper.pose());

        // Warm up
        for _ in 0..5 {
            mapper.update(&batch).unwrap();
        }

        group.bench_with_input(
            BenchmarkId::from_parameter(num_points),
            num_points,
            |b, _| {
                b.iter(|| {
                    let result = mapper.update(black_box(&batch));
                    black_box(result)
                })
            },
        );
    }

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut mapper = ScanMapper::new(MapperConfig::default());

    // Build up a map from several headings
    for i in 0..20 {
        let mut pose = mapper.pose();
        pose.theta = i as f64 * 0.2;
        let batch = room_scan(6.0, 6.0, 3.0, 3.0, 360, pose);
        mapper.update(&batch).unwrap();
    }

    c.bench_function("snapshot_400x400", |b| {
        b.iter(|| {
            let snapshot = mapper.snapshot();
            black_box(snapshot)
        })
    });
}

criterion_group!(
    benches,
    bench_scan_update,
    bench_scan_update_sample_counts,
    bench_snapshot
);
criterion_main!(benches);
