//! Printing correlation and power results to stdout.

use std::io::{self, BufWriter, Write};

use anyhow::Result;
use serde::Serialize;
use xcorr_core::{peak, power::IntervalPower};

#[derive(Debug, Serialize)]
struct LagValue {
    lag: usize,
    seconds: f64,
    value: f32,
}

fn lag_value(lag: usize, value: f32, sample_rate: f64) -> LagValue {
    LagValue {
        lag,
        seconds: lag as f64 / sample_rate,
        value,
    }
}

/// Digits kept when printing power profiles.
const POWER_PRECISION: usize = 10;

/// Formats `value` with `digits` significant digits, like C's `%g`.
///
/// Fixed notation is used for exponents in `-4..digits`, scientific otherwise,
/// and trailing zeros are dropped in both.
fn significant(value: f64, digits: usize) -> String {
    if value == 0.0 || !value.is_finite() {
        return value.to_string();
    }
    let digits = digits.max(1);
    // Rounding to `digits` first settles the exponent (9.99999 may become 10).
    let scientific = format!("{:.*e}", digits - 1, value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= digits as i32 {
        format!("{}e{exponent}", trim_fraction(mantissa))
    } else {
        let decimals = (digits as i32 - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{value:.decimals$}")).to_string()
    }
}

fn trim_fraction(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

/// Prints every lag (or just the strongest one) as `seconds value` lines or JSON.
pub fn correlation(output: &[f32], sample_rate: f64, peak_only: bool, json: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if peak_only {
        match peak(output) {
            Some((lag, value)) => {
                let best = lag_value(lag, value, sample_rate);
                if json {
                    serde_json::to_writer(&mut out, &best)?;
                    writeln!(out)?;
                } else {
                    writeln!(out, "{} {} {}", best.seconds, best.value, best.lag)?;
                }
            }
            None => tracing::warn!("no finite correlation values to report"),
        }
    } else if json {
        let lags: Vec<LagValue> = output
            .iter()
            .enumerate()
            .map(|(lag, &value)| lag_value(lag, value, sample_rate))
            .collect();
        serde_json::to_writer(&mut out, &lags)?;
        writeln!(out)?;
    } else {
        for (lag, value) in output.iter().enumerate() {
            writeln!(out, "{} {}", lag as f64 / sample_rate, value)?;
        }
    }

    out.flush()?;
    Ok(())
}

/// Prints `seconds power I_power Q_power` per interval, or JSON.
pub fn power(profile: &[IntervalPower], sample_rate: f64, json: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if json {
        serde_json::to_writer(&mut out, profile)?;
        writeln!(out)?;
    } else {
        for entry in profile {
            writeln!(
                out,
                "{} {} {} {}",
                significant(entry.center as f64 / sample_rate, POWER_PRECISION),
                significant(entry.power, POWER_PRECISION),
                significant(entry.i_power, POWER_PRECISION),
                significant(entry.q_power, POWER_PRECISION)
            )?;
        }
    }

    out.flush()?;
    Ok(())
}
