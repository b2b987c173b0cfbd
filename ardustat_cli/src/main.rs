use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use ardustat::{
    analyze_file, AnalysisResult, ColumnLayout, CycleKind, Trace, DEFAULT_CURRENT_INDEX,
    DEFAULT_TIME_INDEX, DEFAULT_VOLTAGE_INDEX,
};
use clap::{ArgAction, Parser, Subcommand, ValueHint};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod plot;

use plot::{all_charts, chart_path, render_chart_guard, ChartKind};

#[derive(Parser, Debug)]
#[command(author, version, about = "Ardustat charge/discharge cycle analysis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split a log into half-cycles and report capacity and energy per cycle
    Analyze(AnalyzeArgs),
    /// Summarise the columns of one or more logs to help choose column positions
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
struct AnalyzeArgs {
    /// Space-delimited Ardustat log
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// JSON file with `time_index`, `voltage_index` and `current_index` (missing keys keep defaults)
    #[arg(long, value_hint = ValueHint::FilePath)]
    layout: Option<PathBuf>,

    /// Column holding elapsed time (ms) [default: 0]
    #[arg(long)]
    time_col: Option<usize>,

    /// Column holding voltage (V) [default: 5]
    #[arg(long)]
    voltage_col: Option<usize>,

    /// Column holding current (mA) [default: 8]
    #[arg(long)]
    current_col: Option<usize>,

    /// Output CSV path for the cycle table (`-` for stdout)
    #[arg(short, long, default_value = "-", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Write every half-cycle, samples included, as JSON
    #[arg(long, value_hint = ValueHint::FilePath)]
    json: Option<PathBuf>,

    /// Directory to render the voltage, current, capacity and power charts into
    #[arg(long, value_hint = ValueHint::DirPath)]
    plot_dir: Option<PathBuf>,

    /// Render charts as SVG instead of PNG
    #[arg(long, action = ArgAction::SetTrue)]
    svg: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// Logs to inspect
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Report path (`-` for stdout)
    #[arg(short, long, default_value = "-", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Rows to sample from the top of each file
    #[arg(long, default_value_t = 200)]
    rows: usize,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

impl AnalyzeArgs {
    /// Layout file (or defaults) with any explicit column flags applied on top.
    fn layout(&self) -> Result<ColumnLayout> {
        let mut layout = match self.layout.as_ref() {
            Some(path) => load_layout(path)?,
            None => ColumnLayout::default(),
        };
        if let Some(idx) = self.time_col {
            layout.time_index = idx;
        }
        if let Some(idx) = self.voltage_col {
            layout.voltage_index = idx;
        }
        if let Some(idx) = self.current_col {
            layout.current_index = idx;
        }
        Ok(layout)
    }
}

fn load_layout(path: &Path) -> Result<ColumnLayout> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read layout {}", path.display()))?;
    let layout: ColumnLayout = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a valid column layout", path.display()))?;
    Ok(layout)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Analyze(args) => args.verbose,
        Command::Inspect(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Analyze(args) => handle_analyze(args),
        Command::Inspect(args) => handle_inspect(args),
    }
}

fn handle_analyze(args: AnalyzeArgs) -> Result<()> {
    let layout = args.layout()?;
    debug!(?layout, "column layout");

    let (trace, result) = analyze_file(&args.input, &layout)
        .with_context(|| format!("failed to analyze {}", args.input.display()))?;

    info!(
        "Loaded {} samples spanning {:.3} h",
        trace.len(),
        trace.duration_hours()
    );
    info!(
        "Found {} half-cycles ({} charge, {} discharge)",
        result.cycle_count(),
        result.charge.len(),
        result.discharge.len()
    );
    if result.discarded_samples > 0 {
        warn!(
            "{} trailing samples follow the last sign change and belong to no cycle",
            result.discarded_samples
        );
    }

    if args.output.as_os_str() == "-" {
        write_cycle_stdout(&result)?;
    } else {
        write_cycle_csv(&result, &args.output)?;
        info!("Wrote cycle CSV: {}", args.output.display());
    }

    if let Some(path) = args.json.as_ref() {
        write_json(&result, path)?;
        info!("Wrote cycle JSON: {}", path.display());
    }

    if let Some(dir) = args.plot_dir.as_ref() {
        let kind = if args.svg { ChartKind::Svg } else { ChartKind::Png };
        render_plots(&trace, &result, &args.input, dir, kind)?;
    }

    Ok(())
}

fn render_plots(
    trace: &Trace,
    result: &AnalysisResult,
    input: &Path,
    dir: &Path,
    kind: ChartKind,
) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("trace");
    let source = input.display().to_string();

    for spec in all_charts(trace, result, &source) {
        if spec.is_empty() {
            warn!("Skipping {} chart: nothing to plot", spec.name);
            continue;
        }
        let path = chart_path(dir, stem, spec.name, kind);
        match render_chart_guard(&spec, &path, kind) {
            Ok(()) => info!("Wrote plot: {}", path.display()),
            Err(err) => warn!("Skipping plot render ({}): {}", path.display(), err),
        }
    }
    Ok(())
}

fn write_cycle_stdout(result: &AnalysisResult) -> Result<()> {
    let stdout = io::stdout();
    let handle = stdout.lock();
    let mut writer = csv::Writer::from_writer(handle);
    write_cycle_rows(result, &mut writer)
}

fn write_cycle_csv(result: &AnalysisResult, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    write_cycle_rows(result, &mut writer)
}

fn write_cycle_rows<W: Write>(result: &AnalysisResult, writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record([
        "kind",
        "cycle",
        "start_index",
        "samples",
        "start_h",
        "end_h",
        "capacity_mah",
        "power_mwh",
    ])?;

    let mut charge_idx = 0usize;
    let mut discharge_idx = 0usize;
    for cycle in result.cycles() {
        let ordinal = match cycle.kind {
            CycleKind::Charge => {
                charge_idx += 1;
                charge_idx - 1
            }
            CycleKind::Discharge => {
                discharge_idx += 1;
                discharge_idx - 1
            }
        };
        writer.write_record([
            cycle.kind.label().to_string(),
            ordinal.to_string(),
            cycle.start_index.to_string(),
            cycle.len().to_string(),
            format!("{:.6}", cycle.start_time()),
            format!("{:.6}", cycle.end_time()),
            format!("{:.6}", cycle.capacity),
            format!("{:.6}", cycle.power),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json(result: &AnalysisResult, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, result)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[derive(Clone, Debug, Default)]
struct ColumnStats {
    count: usize,
    numeric: usize,
    min: Option<f64>,
    max: Option<f64>,
}

#[derive(Debug, Default)]
struct FileSummary {
    rows: usize,
    field_counts: BTreeMap<usize, usize>,
    columns: BTreeMap<usize, ColumnStats>,
}

fn summarize_rows<R: BufRead>(reader: R, max_rows: usize) -> Result<FileSummary> {
    let mut summary = FileSummary::default();
    for line in reader.lines() {
        if summary.rows >= max_rows {
            break;
        }
        let line = line?;
        let row = line.trim_end_matches('\r');
        if row.trim().is_empty() {
            continue;
        }
        summary.rows += 1;
        let fields: Vec<&str> = row.split(' ').collect();
        *summary.field_counts.entry(fields.len()).or_insert(0) += 1;
        for (idx, field) in fields.iter().enumerate() {
            let entry = summary.columns.entry(idx).or_default();
            entry.count += 1;
            if let Ok(val) = field.trim().parse::<f64>() {
                entry.numeric += 1;
                entry.min = Some(entry.min.map_or(val, |m| m.min(val)));
                entry.max = Some(entry.max.map_or(val, |m| m.max(val)));
            }
        }
    }
    Ok(summary)
}

fn column_role(idx: usize) -> &'static str {
    match idx {
        DEFAULT_TIME_INDEX => " [default time]",
        DEFAULT_VOLTAGE_INDEX => " [default voltage]",
        DEFAULT_CURRENT_INDEX => " [default current]",
        _ => "",
    }
}

fn format_summary(name: &str, summary: &FileSummary) -> String {
    let mut report = String::new();
    report.push_str(&format!("FILE: {}\n", name));
    report.push_str(&format!("  rows_sampled: {}\n", summary.rows));
    if !summary.field_counts.is_empty() {
        let counts: Vec<String> = summary
            .field_counts
            .iter()
            .map(|(fields, rows)| format!("{}x{}", fields, rows))
            .collect();
        report.push_str(&format!("  fields_per_row: {}\n", counts.join(", ")));
    }
    if !summary.columns.is_empty() {
        report.push_str("  columns:\n");
        for (idx, stats) in &summary.columns {
            report.push_str(&format!(
                "    - {}{}: count={}, numeric={}, min={}, max={}\n",
                idx,
                column_role(*idx),
                stats.count,
                stats.numeric,
                stats.min.map_or("n/a".into(), |v| format!("{:.3}", v)),
                stats.max.map_or("n/a".into(), |v| format!("{:.3}", v))
            ));
        }
    }
    report.push('\n');
    report
}

fn handle_inspect(args: InspectArgs) -> Result<()> {
    if args.rows == 0 {
        return Err(anyhow!("--rows must be > 0"));
    }
    let mut report = String::new();
    for path in &args.inputs {
        let file = File::open(path).with_context(|| format!("failed to read {}", path.display()))?;
        let summary = summarize_rows(BufReader::new(file), args.rows)
            .with_context(|| format!("failed to read {}", path.display()))?;
        report.push_str(&format_summary(&path.display().to_string(), &summary));
    }

    if args.output.as_os_str() == "-" {
        io::stdout().lock().write_all(report.as_bytes())?;
    } else {
        fs::write(&args.output, report)
            .with_context(|| format!("failed to write {}", args.output.display()))?;
        info!("Inspection report written: {}", args.output.display());
    }
    Ok(())
}
