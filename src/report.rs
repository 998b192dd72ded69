//! Plain-text tables for benchmark output.

use std::fmt::Write;
use std::time::Duration;

use crate::error::{KernelError, Result};
use crate::histogram::BIN_COUNT;

/// Column headers of the three timing columns.
pub const SIZE_HEADERS: [&str; 3] = ["small_image", "medium_image", "large_image"];

/// Render one tile histogram as a two-row table.
pub fn format_histogram(bins: &[u32]) -> Result<String> {
    if bins.len() != BIN_COUNT {
        return Err(KernelError::invalid(format!(
            "length of the histogram must be {BIN_COUNT}, got {}",
            bins.len()
        )));
    }
    let widths: Vec<usize> = bins
        .iter()
        .enumerate()
        .map(|(i, b)| i.to_string().len().max(b.to_string().len()))
        .collect();
    let mut out = String::new();
    for (i, w) in widths.iter().enumerate() {
        let _ = write!(out, "| {i:>w$} ");
    }
    out.push_str("|\n");
    for (b, w) in bins.iter().zip(&widths) {
        let _ = write!(out, "| {b:>w$} ");
    }
    out.push('|');
    Ok(out)
}

/// Render CPU, naive and optimized run times for the three image sizes.
pub fn format_timings(cpu: &[Duration], naive: &[Duration], opt: &[Duration]) -> Result<String> {
    if cpu.len() != 3 || naive.len() != 3 || opt.len() != 3 {
        return Err(KernelError::invalid(format!(
            "all timing lists must have length 3, got {}, {}, {}",
            cpu.len(),
            naive.len(),
            opt.len()
        )));
    }
    let mut out = format!("{:<6}", "");
    for h in SIZE_HEADERS {
        let _ = write!(out, "{h:>14}");
    }
    for (name, row) in [("Cpu", cpu), ("Naive", naive), ("Opt", opt)] {
        let _ = write!(out, "\n{name:<6}");
        for t in row {
            let _ = write!(out, "{:>14.3e}", t.as_secs_f64());
        }
    }
    Ok(out)
}

/// Naive over optimized run time, per image size.
pub fn speedups(naive: &[Duration], opt: &[Duration]) -> Result<Vec<f64>> {
    if naive.len() != opt.len() || naive.len() != 3 {
        return Err(KernelError::invalid(format!(
            "naive and optimized timings must both have length 3, got {}, {}",
            naive.len(),
            opt.len()
        )));
    }
    Ok(naive
        .iter()
        .zip(opt)
        .map(|(n, o)| n.as_secs_f64() / o.as_secs_f64())
        .collect())
}

/// Outcome of comparing the CPU histogram with both GPU variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistogramAgreement {
    pub cpu_matches_naive: bool,
    pub cpu_matches_opt: bool,
}

impl HistogramAgreement {
    pub fn all_equal(&self) -> bool {
        self.cpu_matches_naive && self.cpu_matches_opt
    }
}

/// Compare three flat histogram buffers of equal length.
pub fn histograms_equal(cpu: &[u32], naive: &[u32], opt: &[u32]) -> Result<HistogramAgreement> {
    if cpu.len() != naive.len() || cpu.len() != opt.len() {
        return Err(KernelError::invalid(format!(
            "all lengths must be equal, got {}, {}, {}",
            cpu.len(),
            naive.len(),
            opt.len()
        )));
    }
    Ok(HistogramAgreement {
        cpu_matches_naive: cpu == naive,
        cpu_matches_opt: cpu == opt,
    })
}
