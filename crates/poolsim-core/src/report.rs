//! CSV and JSON input/output.
//!
//! # Arrival CSV
//!
//! ```csv
//! t,cls
//! 0.512345,1
//! 0.871002,3
//! ```
//!
//! The first line is a header and is always skipped. Rows that are blank,
//! short, unparsable or name a class outside 1..=3 are skipped and counted.
//! Rows are returned in file order; ordering is checked by the orchestrator.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use crate::arrival::{Arrival, JobClass};
use crate::error::Result;
use crate::orchestrator::{IntervalRecord, RunReport, SliSummary};

/// Header of the per-interval CSV.
pub const INTERVALS_HEADER: &str = "t_start,t_end,pool_now,target_tot,eff_change_time,arrivals,rejections,rejection_rate,idle_mean_interval,pred_rej_at_target,pred_n,lambda1,lambda2,lambda3,offered_load,closed_by";

/// Header of the summary CSV.
pub const SUMMARY_HEADER: &str = "total_time_s,arrivals,rejections,rejection_rate,idle_mean";

/// Arrivals read from CSV plus the number of rows that were dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrivalLoad {
    pub arrivals: Vec<Arrival>,
    pub skipped: usize,
}

/// Parse an arrival CSV from any buffered reader.
pub fn read_arrivals<R: BufRead>(reader: R) -> io::Result<ArrivalLoad> {
    let mut load = ArrivalLoad::default();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line_num == 0 {
            continue;
        }
        match parse_arrival(line.trim()) {
            Some(arrival) => load.arrivals.push(arrival),
            None => {
                tracing::debug!(line = line_num + 1, "skipping arrival row");
                load.skipped += 1;
            }
        }
    }
    Ok(load)
}

fn parse_arrival(line: &str) -> Option<Arrival> {
    let mut parts = line.split(',');
    let time: f64 = parts
        .next()?
        .trim()
        .parse()
        .ok()
        .filter(|t: &f64| t.is_finite())?;
    let class_id: u8 = parts.next()?.trim().parse().ok()?;
    let class = JobClass::from_id(class_id)?;
    Some(Arrival::new(time, class))
}

/// Read an arrival CSV file.
pub fn load_arrivals(path: &Path) -> Result<ArrivalLoad> {
    let file = File::open(path)?;
    let load = read_arrivals(BufReader::new(file))?;
    if load.skipped > 0 {
        tracing::warn!(
            path = %path.display(),
            skipped = load.skipped,
            kept = load.arrivals.len(),
            "malformed arrival rows skipped"
        );
    }
    Ok(load)
}

/// Write arrivals as `t,cls` with six decimals.
pub fn write_arrivals<W: Write>(mut writer: W, arrivals: &[Arrival]) -> io::Result<()> {
    writeln!(writer, "t,cls")?;
    for arrival in arrivals {
        writeln!(writer, "{:.6},{}", arrival.time, arrival.class)?;
    }
    writer.flush()
}

/// Write one row per interval under [`INTERVALS_HEADER`].
///
/// Values not yet known (no decision taken) are left empty; a missing
/// prediction is written as `NaN`.
pub fn write_intervals_csv<W: Write>(mut writer: W, records: &[IntervalRecord]) -> io::Result<()> {
    writeln!(writer, "{INTERVALS_HEADER}")?;
    for r in records {
        let target = r.target_total_chosen.map_or_else(String::new, |t| t.to_string());
        let epoch = r
            .epoch_time
            .map_or_else(String::new, |t| format!("{t:.3}"));
        let predicted = r.predicted_rejection_rate.unwrap_or(f64::NAN);
        let (l1, l2, l3) = r.estimated_rates.map_or_else(
            || (String::new(), String::new(), String::new()),
            |rates| {
                (
                    format!("{:.6}", rates.lambda1),
                    format!("{:.6}", rates.lambda2),
                    format!("{:.6}", rates.lambda3),
                )
            },
        );
        let load = r
            .offered_load
            .map_or_else(String::new, |v| format!("{v:.3}"));
        writeln!(
            writer,
            "{:.3},{:.3},{},{},{},{},{},{:.6},{:.3},{:.6},{},{},{},{},{},{}",
            r.interval_start,
            r.interval_end,
            r.pool_at_end,
            target,
            epoch,
            r.arrivals_in_interval,
            r.rejections_in_interval,
            r.rejection_rate_in_interval,
            r.mean_idle_in_interval,
            predicted,
            r.prediction_sample_count,
            l1,
            l2,
            l3,
            load,
            r.closed_by,
        )?;
    }
    writer.flush()
}

/// Write the one-row summary under [`SUMMARY_HEADER`].
pub fn write_summary_csv<W: Write>(mut writer: W, summary: &SliSummary) -> io::Result<()> {
    writeln!(writer, "{SUMMARY_HEADER}")?;
    writeln!(
        writer,
        "{:.3},{},{},{:.6},{:.3}",
        summary.total_simulated_seconds,
        summary.total_arrivals,
        summary.total_rejections,
        summary.rejection_rate,
        summary.mean_idle_pool
    )?;
    writer.flush()
}

/// Serialize the whole report as pretty JSON.
pub fn write_report_json<W: Write>(mut writer: W, report: &RunReport) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, report)?;
    writeln!(writer)?;
    Ok(())
}
