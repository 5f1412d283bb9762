//! Demo, run, benchmark, and stress runners for the highrise CLI.

use std::fmt;
use std::io::{self, Write};
use std::time::Instant;

use highrise::{
    AuditReport, BuildReport, BuildingConfig, Event, EventKind, Result, audit, run,
    run_with_sink,
};

/// `println!` that tolerates a closed stdout, e.g. when piped into `head`.
macro_rules! out {
    ($($arg:tt)*) => {
        write_stdout(format_args!($($arg)*))
    };
}

/// Returns false once stdout can no longer be written.
fn write_stdout(args: fmt::Arguments<'_>) -> bool {
    let mut stdout = io::stdout().lock();
    match writeln!(stdout, "{args}") {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!(error = %err, "stdout closed");
            false
        }
    }
}

/// Best-effort CPU user/system time snapshot (seconds) on Unix platforms.
#[cfg(unix)]
fn cpu_times_seconds() -> Option<(f64, f64)> {
    // SAFETY: an all-zero rusage is a valid value and getrusage only writes into it.
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
    if rc != 0 {
        return None;
    }
    let user = usage.ru_utime.tv_sec as f64 + (usage.ru_utime.tv_usec as f64 / 1_000_000.0);
    let sys = usage.ru_stime.tv_sec as f64 + (usage.ru_stime.tv_usec as f64 / 1_000_000.0);
    Some((user, sys))
}

/// Stub on non-Unix platforms.
#[cfg(not(unix))]
fn cpu_times_seconds() -> Option<(f64, f64)> {
    None
}

/// Human-readable line for one event.
pub fn render(event: &Event) -> String {
    let stamp = format!("[#{:04} +{:.3}s]", event.seq, event.elapsed.as_secs_f64());
    match &event.kind {
        EventKind::FoundationLaid => format!("{stamp} foundation laid"),
        EventKind::FloorStarted { floor } => format!(
            "=======================================\n{stamp} FLOOR {} construction started",
            floor + 1
        ),
        EventKind::FloorFinished { floor } => format!(
            "{stamp} FLOOR {} complete\n=======================================",
            floor + 1
        ),
        EventKind::UnitAssigned { unit, task, .. } => {
            format!("{stamp} unit {unit}: construction started, final task {task}")
        }
        EventKind::UnitStageStarted { unit, stage, .. } => {
            format!("{stamp} unit {unit}: {} started", stage.label())
        }
        EventKind::UnitStageFinished { unit, stage, .. } => {
            format!("{stamp} unit {unit}: {} finished", stage.label())
        }
    }
}

fn print_summary(title: &str, report: &BuildReport, audit: &AuditReport) {
    out!("{title}");
    out!("floors_completed={}", report.floors_completed);
    out!("units_completed={}", report.units_completed());
    out!("peak_crane={}", report.peak_holders.crane);
    out!("peak_electricity={}", report.peak_holders.electricity);
    out!("peak_water={}", report.peak_holders.water);
    out!("capacity_violation={}", audit.has_capacity_violation());
    out!("floor_overlap={}", audit.has_floor_overlap());
    for violation in &audit.violations {
        eprintln!("# violation,{violation}");
    }
}

/// Run with live text rendering followed by a summary block.
pub fn run_demo(config: &BuildingConfig) -> Result<()> {
    tracing::info!(floors = config.floors, units = config.units_per_floor, "demo start");
    out!("Laying the foundation...");
    let report = run_with_sink(config, |event: &Event| {
        out!("{}", render(event));
    })?;
    let audit = audit(&report.events, config);
    print_summary("DEMO SUMMARY", &report, &audit);
    Ok(())
}

/// Run once, streaming text or JSON lines unless `quiet`.
pub fn run_once(config: &BuildingConfig, json: bool, quiet: bool) -> Result<()> {
    let report = if quiet {
        run(config)?
    } else if json {
        run_with_sink(config, |event: &Event| {
            match serde_json::to_string(event) {
                Ok(line) => {
                    out!("{line}");
                }
                Err(err) => tracing::warn!(error = %err, "failed to encode event"),
            }
        })?
    } else {
        run_with_sink(config, |event: &Event| {
            out!("{}", render(event));
        })?
    };
    let audit = audit(&report.events, config);
    if !json {
        print_summary("RUN SUMMARY", &report, &audit);
    }
    Ok(())
}

const CSV_HEADER: &str = "floors,units_per_floor,electricity,total_units,elapsed_ms,units_per_s,cpu_user_s,cpu_sys_s,peak_crane,peak_electricity,peak_water,clean";

/// Aggregated metrics from a single benchmark run.
struct BenchResult {
    floors: u64,
    units_per_floor: u64,
    electricity: usize,
    total_units: usize,
    elapsed_ms: f64,
    throughput: f64,
    cpu_user_s: Option<f64>,
    cpu_sys_s: Option<f64>,
    audit: AuditReport,
}

impl BenchResult {
    fn csv_row(&self) -> String {
        let cpu_user = self
            .cpu_user_s
            .map(|v| format!("{v:.4}"))
            .unwrap_or_else(|| "NA".to_string());
        let cpu_sys = self
            .cpu_sys_s
            .map(|v| format!("{v:.4}"))
            .unwrap_or_else(|| "NA".to_string());
        let peaks = self.audit.peaks();
        format!(
            "{},{},{},{},{:.2},{:.2},{},{},{},{},{},{}",
            self.floors,
            self.units_per_floor,
            self.electricity,
            self.total_units,
            self.elapsed_ms,
            self.throughput,
            cpu_user,
            cpu_sys,
            peaks.crane,
            peaks.electricity,
            peaks.water,
            self.audit.is_clean()
        )
    }
}

fn benchmark_once(config: &BuildingConfig) -> Result<BenchResult> {
    let cpu_start = cpu_times_seconds();
    let start = Instant::now();
    let report = run(config)?;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    let total_units = report.units_completed();
    let throughput = if elapsed_ms > 0.0 {
        total_units as f64 / (elapsed_ms / 1000.0)
    } else {
        0.0
    };
    let (cpu_user_s, cpu_sys_s) = match (cpu_start, cpu_times_seconds()) {
        (Some((user_start, sys_start)), Some((user_end, sys_end))) => {
            (Some(user_end - user_start), Some(sys_end - sys_start))
        }
        _ => (None, None),
    };
    Ok(BenchResult {
        floors: config.floors,
        units_per_floor: config.units_per_floor,
        electricity: config.capacity.electricity,
        total_units,
        elapsed_ms,
        throughput,
        cpu_user_s,
        cpu_sys_s,
        audit: audit(&report.events, config),
    })
}

fn report_violations(result: &BenchResult) {
    for violation in &result.audit.violations {
        eprintln!("# violation,{violation}");
    }
}

/// Run a single benchmark and print one CSV row.
pub fn run_benchmark(config: &BuildingConfig) -> Result<()> {
    let result = benchmark_once(config)?;
    out!("{CSV_HEADER}");
    out!("{}", result.csv_row());
    report_violations(&result);
    Ok(())
}

/// Sweep floor/unit/electricity combinations and print CSV output.
pub fn run_stress(
    base: &BuildingConfig,
    floor_sets: &[u64],
    unit_sets: &[u64],
    electricity_sets: &[usize],
) -> Result<()> {
    out!("{CSV_HEADER}");
    for &floors in floor_sets {
        for &units_per_floor in unit_sets {
            for &electricity in electricity_sets {
                let mut config = base.clone();
                config.floors = floors;
                config.units_per_floor = units_per_floor;
                config.capacity.electricity = electricity;
                let result = benchmark_once(&config)?;
                out!("{}", result.csv_row());
                report_violations(&result);
            }
        }
    }
    io::stdout().flush().ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use highrise::Stage;
    use std::time::Duration;

    #[test]
    fn render_uses_one_based_floors() {
        let event = Event {
            seq: 12,
            elapsed: Duration::from_millis(1500),
            kind: EventKind::FloorFinished { floor: 0 },
        };
        let line = render(&event);
        assert!(line.starts_with("[#0012 +1.500s] FLOOR 1 complete"));
    }

    #[test]
    fn render_names_the_stage() {
        let event = Event {
            seq: 3,
            elapsed: Duration::ZERO,
            kind: EventKind::UnitStageStarted {
                floor: 0,
                unit: 2,
                stage: Stage::Plumbing,
            },
        };
        assert_eq!(render(&event), "[#0003 +0.000s] unit 2: plumbing started");
    }
}
