//! Dilated convolution on the CPU versus the GPU.
//!
//! Sweeps the dilation factor, the matrix size and the filter size, checks
//! that the GPU output equals the CPU output for every configuration, and
//! prints the run times as a table.  GPU times include uploading the
//! inputs and reading back the result.
//!
//! The adapter is picked from the `DCONV_*` environment variables, e.g.
//! `DCONV_ADAPTER=nvidia cargo run --release --example dilated_conv`.

use rand::Rng;
use wgpu_dconv_hist::{
    convolve_gpu, convolve_reference, convolve_strided, timed, DeviceConfig, Filter, GpuContext,
    Matrix, Result,
};

fn random_matrix(rows: usize, cols: usize) -> Result<Matrix> {
    let mut rng = rand::thread_rng();
    Matrix::new(rows, cols, (0..rows * cols).map(|_| rng.gen_range(0..100)).collect())
}

fn random_filter(side: usize, high: i32) -> Result<Filter> {
    let mut rng = rand::thread_rng();
    Filter::new((0..side * side).map(|_| rng.gen_range(0..high)).collect())
}

/// Time both paths on one configuration and fail if they disagree.
fn compare(ctx: &GpuContext, m: &Matrix, f: &Filter, d: u32) -> Result<(f64, f64)> {
    let (gpu, gpu_time) = timed(|| convolve_gpu(ctx, m, f, d)).transpose()?.into_parts();
    let (cpu, cpu_time) = timed(|| convolve_strided(m, f, d)).transpose()?.into_parts();
    assert_eq!(gpu, cpu, "GPU and CPU disagree for {}x{} d={d}", m.rows(), m.cols());
    Ok((cpu_time.as_secs_f64(), gpu_time.as_secs_f64()))
}

fn print_row(label: &str, (cpu, gpu): (f64, f64)) {
    println!("{label:>16} | {cpu:>10.2e} | {gpu:>10.2e}");
}

fn main() -> Result<()> {
    env_logger::init();
    let ctx = GpuContext::new_blocking(&DeviceConfig::from_env()?)?;
    println!("adapter: {}", ctx.adapter_name());

    // The two CPU versions against each other on small inputs.
    for d in 1..4u32 {
        let m = random_matrix(10 * d as usize, 15 * d as usize)?;
        let f = random_filter(3, 9)?;
        let (exhaustive, t_exhaustive) = timed(|| convolve_reference(&m, &f, d)).transpose()?.into_parts();
        let (strided, t_strided) = timed(|| convolve_strided(&m, &f, d)).transpose()?.into_parts();
        println!(
            "d={d}: exhaustive == strided: {} ({:.2e}s vs {:.2e}s)",
            exhaustive == strided,
            t_exhaustive.as_secs_f64(),
            t_strided.as_secs_f64()
        );
    }

    println!("\n{:>16} | {:>10} | {:>10}", "dilation", "cpu (s)", "gpu (s)");
    for d in [1u32, 2, 5, 10, 25, 50, 100] {
        let m = random_matrix(100, 200)?;
        let f = random_filter(3, 100)?;
        print_row(&d.to_string(), compare(&ctx, &m, &f, d)?);
    }

    println!("\n{:>16} | {:>10} | {:>10}", "matrix", "cpu (s)", "gpu (s)");
    for i in 1..=10usize {
        let (rows, cols) = (25 * i, 35 * i);
        let m = random_matrix(rows, cols)?;
        let f = random_filter(3, 100)?;
        print_row(&format!("{rows}x{cols}"), compare(&ctx, &m, &f, 2)?);
    }

    println!("\n{:>16} | {:>10} | {:>10}", "filter", "cpu (s)", "gpu (s)");
    for side in 3..13usize {
        let m = random_matrix(100, 200)?;
        let f = random_filter(side, 100)?;
        print_row(&format!("{side}x{side}"), compare(&ctx, &m, &f, 2)?);
    }

    let stats = ctx.cache_stats();
    println!(
        "\n{} kernels compiled, {} cache hits",
        ctx.compiled_kernels(),
        stats.hits
    );
    Ok(())
}
