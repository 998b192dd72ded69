//! Tiled histograms on the CPU versus the naive and optimized GPU kernels.
//!
//! Usage: `cargo run --release --example histogram -- <data file> [max mode]`
//!
//! The data file holds a 2^15 × 2^15 array of little-endian `u16`.  Modes
//! 0, 1 and 2 use its 2^10, 2^13 and 2^15 square prefixes; the optional
//! second argument stops after the given mode.  Timing and speed-up
//! tables are printed once all three modes have run.

use std::time::Duration;

use wgpu_dconv_hist::report::{format_histogram, format_timings, histograms_equal, speedups};
use wgpu_dconv_hist::{
    histogram_gpu, histogram_reference, load_hist_data, timed, BinPolicy, DataMode,
    DeviceConfig, GpuContext, HistogramVariant, KernelError, Result,
};

fn main() -> Result<()> {
    env_logger::init();
    let mut args = std::env::args().skip(1);
    let path = args
        .next()
        .ok_or_else(|| KernelError::InvalidArgument("missing data file path".into()))?;
    let max_mode = match args.next() {
        Some(m) => m
            .parse::<u8>()
            .map_err(|e| KernelError::InvalidArgument(format!("max mode: {e}")))?,
        None => 2,
    };
    let max_mode = DataMode::try_from(max_mode)?;

    let ctx = GpuContext::new_blocking(&DeviceConfig::from_env()?)?;
    println!("adapter: {}", ctx.adapter_name());

    let mut cpu_times = Vec::new();
    let mut naive_times = Vec::new();
    let mut opt_times = Vec::new();
    for mode in DataMode::ALL {
        let side = mode.side();
        println!("Working on {side} x {side} input:");
        let image = load_hist_data(&path, mode)?;

        let (cpu, t_cpu) = timed(|| histogram_reference(&image, BinPolicy::Reject))
            .transpose()?
            .into_parts();
        let (naive, t_naive) =
            timed(|| histogram_gpu(&ctx, &image, HistogramVariant::Naive, BinPolicy::Reject))
                .transpose()?
                .into_parts();
        let (opt, t_opt) =
            timed(|| histogram_gpu(&ctx, &image, HistogramVariant::Optimized, BinPolicy::Reject))
                .transpose()?
                .into_parts();
        println!(
            "cpu {:.2e}s, naive {:.2e}s, optimized {:.2e}s",
            t_cpu.as_secs_f64(),
            t_naive.as_secs_f64(),
            t_opt.as_secs_f64()
        );

        let agreement = histograms_equal(cpu.as_slice(), naive.as_slice(), opt.as_slice())?;
        if !agreement.cpu_matches_naive {
            println!("Cpu != Naive");
        }
        if !agreement.cpu_matches_opt {
            println!("Cpu != Opt");
        }
        if agreement.all_equal() {
            println!("All the histograms are equal");
        }
        println!("First tile:\n{}", format_histogram(opt.tile(0))?);
        println!("------------------------------------------------------");

        cpu_times.push(t_cpu);
        naive_times.push(t_naive);
        opt_times.push(t_opt);
        if mode == max_mode {
            break;
        }
    }

    if cpu_times.len() == 3 {
        print_summary(&cpu_times, &naive_times, &opt_times)?;
    }
    Ok(())
}

fn print_summary(cpu: &[Duration], naive: &[Duration], opt: &[Duration]) -> Result<()> {
    println!("Time taken by kernels (s):\n{}", format_timings(cpu, naive, opt)?);
    let ratios = speedups(naive, opt)?;
    println!(
        "Speedup (naive/optimized): {}",
        ratios
            .iter()
            .map(|r| format!("{r:.2}"))
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}
