//! GPU kernels checked against the CPU references.
//!
//! Every test needs an adapter.  When none is available (headless CI
//! without a software rasterizer, for instance) the tests print a note
//! and return early instead of failing.

use std::sync::OnceLock;

use rand::{rngs::StdRng, Rng, SeedableRng};

use wgpu_dconv_hist::{
    convolve_gpu, convolve_reference, convolve_strided, histogram_gpu, histogram_reference,
    BinPolicy, DeviceConfig, Filter, GpuContext, HistogramImage, HistogramVariant, KernelError,
    Matrix, BIN_COUNT, TILE_SIDE,
};

fn gpu() -> Option<&'static GpuContext> {
    static CTX: OnceLock<Option<GpuContext>> = OnceLock::new();
    CTX.get_or_init(|| {
        let _ = env_logger::builder().is_test(true).try_init();
        let config = DeviceConfig::from_env().unwrap_or_default();
        match GpuContext::new_blocking(&config) {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                eprintln!("no GPU adapter, skipping: {e}");
                None
            }
        }
    })
    .as_ref()
}

fn random_matrix(rng: &mut StdRng, rows: usize, cols: usize) -> Matrix {
    let data = (0..rows * cols).map(|_| rng.gen_range(0..100)).collect();
    Matrix::new(rows, cols, data).unwrap()
}

fn random_filter(rng: &mut StdRng, side: usize) -> Filter {
    Filter::new((0..side * side).map(|_| rng.gen_range(0..100)).collect()).unwrap()
}

#[test]
fn identity_scenario() {
    let Some(ctx) = gpu() else { return };
    let m = Matrix::from_rows(&[[1, 2, 3], [4, 5, 6], [7, 8, 9]]).unwrap();
    let f = Filter::new(vec![0, 0, 0, 0, 1, 0, 0, 0, 0]).unwrap();
    assert_eq!(convolve_gpu(ctx, &m, &f, 1).unwrap(), m);
}

#[test]
fn gpu_matches_references() {
    let Some(ctx) = gpu() else { return };
    let mut rng = StdRng::seed_from_u64(7);
    // Shapes that are not multiples of the workgroup side exercise masking.
    for &(rows, cols) in &[(1, 1), (10, 15), (37, 53), (100, 200)] {
        for side in 1..=4 {
            for dilation in [1u32, 2, 3, 7] {
                let m = random_matrix(&mut rng, rows, cols);
                let f = random_filter(&mut rng, side);
                let gpu_out = convolve_gpu(ctx, &m, &f, dilation).unwrap();
                let strided = convolve_strided(&m, &f, dilation).unwrap();
                assert_eq!(gpu_out, strided, "{rows}x{cols} side {side} d {dilation}");
                assert_eq!(strided, convolve_reference(&m, &f, dilation).unwrap());
            }
        }
    }
}

#[test]
fn centred_one_is_identity_for_any_dilation() {
    let Some(ctx) = gpu() else { return };
    let mut rng = StdRng::seed_from_u64(11);
    let m = random_matrix(&mut rng, 33, 65);
    let f = Filter::centered_identity(5).unwrap();
    for d in 1..=12 {
        assert_eq!(convolve_gpu(ctx, &m, &f, d).unwrap(), m, "dilation {d}");
    }
}

#[test]
fn repeated_configuration_reuses_kernel() {
    let Some(ctx) = gpu() else { return };
    let mut rng = StdRng::seed_from_u64(3);
    // Shape unique to this test so other tests cannot have compiled it.
    let f = random_filter(&mut rng, 3);
    let a = random_matrix(&mut rng, 29, 31);
    let b = random_matrix(&mut rng, 29, 31);
    convolve_gpu(ctx, &a, &f, 5).unwrap();
    let hits = ctx.cache_stats().hits;
    convolve_gpu(ctx, &b, &f, 5).unwrap();
    assert!(ctx.cache_stats().hits > hits);
    assert!(ctx.compiled_kernels() >= 1);
}

#[test]
fn invalid_dilation_is_rejected() {
    let Some(ctx) = gpu() else { return };
    let m = Matrix::from_rows(&[[1]]).unwrap();
    let f = Filter::new(vec![1]).unwrap();
    assert!(matches!(
        convolve_gpu(ctx, &m, &f, 0),
        Err(KernelError::InvalidArgument(_))
    ));
}

#[test]
fn dilation_beyond_i32_is_an_error() {
    let Some(ctx) = gpu() else { return };
    let m = Matrix::from_rows(&[[1, 2, 3], [4, 5, 6], [7, 8, 9]]).unwrap();
    let f = Filter::new(vec![2]).unwrap();
    for d in [i32::MAX as u32 + 1, 3_000_000_000, u32::MAX] {
        assert!(
            matches!(convolve_gpu(ctx, &m, &f, d), Err(KernelError::InvalidArgument(_))),
            "dilation {d}"
        );
    }
    // The largest accepted dilation still compiles and runs.
    let d = i32::MAX as u32;
    assert_eq!(
        convolve_gpu(ctx, &m, &f, d).unwrap(),
        convolve_strided(&m, &f, d).unwrap()
    );
}

#[test]
fn overflow_wraps_like_the_cpu() {
    let Some(ctx) = gpu() else { return };
    let m = Matrix::from_rows(&[
        [i32::MAX, i32::MIN, -1, 7],
        [i32::MIN, i32::MAX, 1, -7],
        [1_000_000_007, -3, i32::MAX, i32::MIN],
    ])
    .unwrap();
    let f = Filter::new(vec![i32::MAX, i32::MIN, 3, -1, i32::MAX, 65_537, 2, i32::MIN, -5]).unwrap();
    for d in [1u32, 2] {
        let strided = convolve_strided(&m, &f, d).unwrap();
        assert_eq!(strided, convolve_reference(&m, &f, d).unwrap());
        assert_eq!(convolve_gpu(ctx, &m, &f, d).unwrap(), strided, "dilation {d}");
    }
}

#[test]
fn concurrent_launches_return_their_own_results() {
    let Some(ctx) = gpu() else { return };
    let f = Filter::new(vec![1, 0, 2, 0, 3, 0, 4, 0, 5]).unwrap();
    std::thread::scope(|s| {
        for seed in 0..4u64 {
            let f = &f;
            s.spawn(move || {
                let mut rng = StdRng::seed_from_u64(100 + seed);
                for _ in 0..4 {
                    let m = random_matrix(&mut rng, 40, 24);
                    let d = 1 + seed as u32;
                    assert_eq!(
                        convolve_gpu(ctx, &m, f, d).unwrap(),
                        convolve_strided(&m, f, d).unwrap()
                    );
                }
            });
        }
    });
}

#[test]
fn uniform_tile_histogram() {
    let Some(ctx) = gpu() else { return };
    let image = HistogramImage::filled(TILE_SIDE, 5).unwrap();
    let mut expected = vec![0u32; BIN_COUNT];
    expected[0] = 1_048_576;
    for variant in [HistogramVariant::Naive, HistogramVariant::Optimized] {
        let hist = histogram_gpu(ctx, &image, variant, BinPolicy::Reject).unwrap();
        assert_eq!(hist.as_slice(), expected.as_slice(), "{variant:?}");
    }
}

#[test]
fn variants_agree_with_reference() {
    let Some(ctx) = gpu() else { return };
    let mut rng = StdRng::seed_from_u64(42);
    let side = 2 * TILE_SIDE;
    let data = (0..side * side).map(|_| rng.gen_range(0..100)).collect();
    let image = HistogramImage::new(side, data).unwrap();

    let cpu = histogram_reference(&image, BinPolicy::Reject).unwrap();
    let naive = histogram_gpu(ctx, &image, HistogramVariant::Naive, BinPolicy::Reject).unwrap();
    let opt = histogram_gpu(ctx, &image, HistogramVariant::Optimized, BinPolicy::Reject).unwrap();
    assert_eq!(naive.len(), 72);
    assert_eq!(cpu, naive);
    assert_eq!(cpu, opt);
    for t in 0..opt.tile_count() {
        let total: u64 = opt.tile(t).iter().map(|&b| u64::from(b)).sum();
        assert_eq!(total, (TILE_SIDE * TILE_SIDE) as u64);
    }
}

#[test]
fn out_of_range_values_follow_policy() {
    let Some(ctx) = gpu() else { return };
    let mut data = vec![12u16; TILE_SIDE * TILE_SIDE];
    data[100] = 180;
    data[200] = 65_000;
    let image = HistogramImage::new(TILE_SIDE, data).unwrap();

    for variant in [HistogramVariant::Naive, HistogramVariant::Optimized] {
        assert!(matches!(
            histogram_gpu(ctx, &image, variant, BinPolicy::Reject),
            Err(KernelError::ValueOutOfRange { index: 100, value: 180 })
        ));
        let clamped = histogram_gpu(ctx, &image, variant, BinPolicy::ClampToLast).unwrap();
        assert_eq!(
            clamped,
            histogram_reference(&image, BinPolicy::ClampToLast).unwrap()
        );
        assert_eq!(clamped.tile(0)[17], 2);
    }
}
