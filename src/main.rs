mod affinity;
mod cli;
mod config;
mod counter;
mod error;
mod histogram;
mod logging;
mod outliers;
mod report;
mod sampler;
mod session;
mod stats;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::process;

use clap::Parser;

use cli::{Cli, SamplingArgs};
use config::SamplingConfig;
use error::Error;
use report::Report;
use session::Session;

/// Build a SamplingConfig by layering: defaults → TOML file → CLI overrides.
fn build_config(config_file: Option<&Path>, args: &SamplingArgs) -> Result<SamplingConfig, Error> {
    let mut cfg = config::load_config(config_file)?.sampling;
    apply_overrides(&mut cfg, args);
    cfg.validate()?;
    Ok(cfg)
}

// Apply CLI overrides (only if explicitly set)
fn apply_overrides(cfg: &mut SamplingConfig, args: &SamplingArgs) {
    if let Some(v) = args.bins {
        cfg.bins = v;
    }
    if let Some(v) = args.knee {
        cfg.knee = v;
    }
    if let Some(v) = args.min {
        cfg.min = v;
    }
    if let Some(v) = args.outbuf {
        cfg.outbuf = v;
    }
    if let Some(v) = args.pause {
        cfg.pause = v;
    }
    if let Some(v) = args.runtime {
        cfg.runtime = v;
    }
    if let Some(v) = args.width {
        cfg.width = v;
    }
    if let Some(ref v) = args.outfile {
        cfg.outfile = Some(v.clone());
    }
    if let Some(ref v) = args.cpu {
        cfg.cpu = Some(v.clone());
    }
}

fn pin_cpus(list: &str) -> Result<(), Error> {
    let cpus = affinity::parse_cpu_list(list)?;
    match affinity::set_affinity(&cpus) {
        Ok(()) => log::info!("pinned to cpus {:?}", cpus),
        Err(e) => log::warn!("{}; continuing unpinned", e),
    }
    Ok(())
}

fn open_outfile(path: &Path) -> Result<BufWriter<File>, Error> {
    File::create(path).map(BufWriter::new).map_err(|e| {
        Error::Io(io::Error::new(
            e.kind(),
            format!("cannot open outlier file {}: {}", path.display(), e),
        ))
    })
}

fn run(cfg: &SamplingConfig) -> Result<(), Error> {
    if let Some(ref list) = cfg.cpu {
        pin_cpus(list)?;
    }

    // Open the sink before sampling so a bad path fails fast.
    let mut outfile = match cfg.outfile {
        Some(ref path) if cfg.capture_enabled() => Some(open_outfile(path)?),
        _ => None,
    };

    let mut session = Session::new(cfg)?;
    log::info!("cycle counter: {}", counter::NATIVE_COUNTER_NAME);

    let timing = session.run(counter::native());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    Report::new(&session, &timing).write(&mut out)?;
    out.flush()?;

    if let (Some(file), Some(buf)) = (outfile.as_mut(), session.outliers_mut()) {
        if buf.is_empty() {
            log::info!("no deltas above the knee of {} ticks", cfg.knee);
        } else {
            log::info!("writing {} outliers", buf.len());
        }
        let drained = buf.drain();
        outliers::write_log(&drained, timing.start_ticks, timing.ticks_per_ns(), file)?;
        file.flush()?;
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();
    logging::init(&cli.log);

    let cfg = match build_config(cli.config_file.as_deref(), &cli.sampling) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run(&cfg) {
        log::error!("{}", e);
        process::exit(1);
    }
}
