//! edfview - build one page of an EDF/BDF recording and report on it
//!
//! # Usage
//!
//! ```bash
//! # First signal channel, 10 s page from the start
//! edfview recording.bdf
//!
//! # Bipolar derivation with a 0.5 Hz highpass, 20 s into the recording
//! edfview recording.edf --channel C3 --minus C4 --highpass 0.5 --view 20
//!
//! # Composition loaded from a JSON file, memory mapped
//! edfview recording.edf --composition montage.json --mmap
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use edfview::clock::{format_offset, seconds_to_ticks, ticks_to_datetime};
use edfview::composition::CompositionSpec;
use edfview::filters::FilterSpec;
use edfview::settings::ViewSettings;
use edfview::viewbuf::RenderContext;

/// Materialize a page of an EDF/BDF recording
#[derive(Parser, Debug)]
#[command(name = "edfview")]
#[command(author, version, about = "EDF/BDF view-buffer inspector", long_about = None)]
struct Cli {
    /// Recording to open
    path: PathBuf,

    /// Channel label to display (defaults to the first signal channel)
    #[arg(short, long)]
    channel: Option<String>,

    /// Channel label subtracted from the displayed channel
    #[arg(long)]
    minus: Option<String>,

    /// First-order highpass cutoff in Hz
    #[arg(long)]
    highpass: Option<f64>,

    /// First-order lowpass cutoff in Hz
    #[arg(long)]
    lowpass: Option<f64>,

    /// JSON composition file; replaces the channel and filter options
    #[arg(long, conflicts_with_all = ["channel", "minus", "highpass", "lowpass"])]
    composition: Option<PathBuf>,

    /// View time in seconds from the recording start; may be negative
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    view: f64,

    /// Page duration in seconds (defaults to the saved settings)
    #[arg(long)]
    page: Option<f64>,

    /// Read the recording through a memory map
    #[arg(long)]
    mmap: bool,

    /// Number of filtered samples to print
    #[arg(long, default_value = "10")]
    show: usize,

    /// Print the frame summary as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let settings = ViewSettings::load();
    let page_time = match cli.page {
        Some(seconds) => seconds_to_ticks(seconds),
        None => settings.default_page_time,
    };
    let mut ctx = RenderContext::new(settings);

    let recording = if cli.mmap {
        ctx.open_mapped(&cli.path)
    } else {
        ctx.open_file(&cli.path)
    }
    .with_context(|| format!("Failed to open {}", cli.path.display()))?;

    let header = ctx.header(recording)?;
    info!(
        "{:?} recording starting {}, {} records, duration {}",
        header.format,
        ticks_to_datetime(header.start_time),
        header.total_records(),
        format_offset(header.duration())
    );

    let spec = match &cli.composition {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str::<CompositionSpec>(&text)
                .with_context(|| format!("Invalid composition in {}", path.display()))?
        }
        None => {
            let find = |label: &str| {
                header
                    .find_channel(label)
                    .with_context(|| format!("No channel labelled '{}'", label))
            };
            let channel = match &cli.channel {
                Some(label) => find(label)?,
                None => match header.signal_channels().next() {
                    Some((index, _)) => index,
                    None => bail!("Recording has no signal channels"),
                },
            };
            let mut spec = CompositionSpec::single(header.channels[channel].label.trim(), channel);
            if let Some(label) = &cli.minus {
                spec = spec.with_term(find(label)?, -1.0);
            }
            if let Some(cutoff_hz) = cli.highpass {
                spec = spec.with_filter(FilterSpec::FirstOrder {
                    highpass: true,
                    cutoff_hz,
                });
            }
            if let Some(cutoff_hz) = cli.lowpass {
                spec = spec.with_filter(FilterSpec::FirstOrder {
                    highpass: false,
                    cutoff_hz,
                });
            }
            spec
        }
    };

    let composition = ctx.add_composition(recording, spec)?;
    let summary = ctx.materialize_at(seconds_to_ticks(cli.view), page_time, None)?;
    let trace = ctx.filtered_trace(composition)?;
    let frame = ctx.composition(composition)?.frame().clone();

    if cli.json {
        let report = serde_json::json!({
            "summary": summary,
            "frame": frame,
            "prefilter_time": ctx.prefilter_time(recording)?,
            "trace": trace,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let label = ctx.composition(composition)?.label().to_string();
    println!("{}", label);
    println!("  page:        {}", format_offset(summary.page_time));
    println!("  warm-up:     {}", format_offset(ctx.prefilter_time(recording)?));
    println!(
        "  samples:     {} on screen, data at {}..{}",
        frame.samples_on_screen, frame.sample_start, frame.sample_stop
    );
    println!(
        "  offset:      {} + {:.4} samples",
        frame.sample_timeoffset, frame.sample_timeoffset_part
    );
    println!("  buffer:      {} bytes in {} read(s)", summary.bytes, summary.reads);

    if !trace.is_empty() {
        let min = trace.values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = trace.values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = trace.values.iter().sum::<f64>() / trace.len() as f64;
        println!("  range:       {:.3} .. {:.3} (mean {:.3})", min, max, mean);
        for position in trace.positions().take(cli.show) {
            if let Some(v) = trace.get(position) {
                println!("  [{:>6}] {:.4}", position, v);
            }
        }
    }

    Ok(())
}
