use clap::Parser;
use log::LevelFilter;
use std::path::{Path, PathBuf};

use pipl_core::{check_host_platform, dump, run, validate_input, PatchSettings, RunStatus, RunSummary};

#[derive(Debug, Parser)]
#[command(
    name = "support-mfr",
    version,
    about = "Upgrade After Effects plugin PiPL metadata to declare multi-frame rendering support"
)]
struct Args {
    /// Plugin to patch (.aex), or a directory to search for plugins. In a
    /// directory run a corrupt plugin is reported and the rest are still
    /// patched; the exit status is then non-zero.
    input: PathBuf,

    /// Report what would change without writing `<name>_mfr.aex`.
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Print the run summary as JSON instead of text.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Only list the decoded PiPL records of a single plugin.
    #[arg(long, default_value_t = false)]
    dump: bool,

    /// Allow running on hosts other than Windows.
    #[arg(long, default_value_t = false)]
    skip_platform_check: bool,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn print_summary(summary: &RunSummary) {
    println!("{}", summary.input_path.display());
    for record in &summary.report.records {
        println!("  {record}");
    }
    for applied in &summary.report.applied {
        println!(
            "  patched {} at 0x{:08X}: {:02X?} -> {:02X?}",
            applied.field, applied.offset, applied.before, applied.after
        );
    }
    match summary.status {
        RunStatus::MarkerNotFound => println!("PiPL cannot be found"),
        RunStatus::NoPatchNeeded => println!("No patch needed"),
        RunStatus::Patched => match &summary.output_path {
            Some(out) => println!("Patched: {}", out.display()),
            None => println!("Patch needed (dry run, nothing written)"),
        },
    }
}

fn dump_plugin(path: &Path) -> pipl_core::Result<()> {
    validate_input(path)?;
    let bytes = std::fs::read(path)?;
    match dump(&bytes) {
        Ok(records) => {
            for record in records {
                println!("{record}");
            }
        }
        Err(pipl_core::PatchError::MarkerNotFound) => println!("PiPL cannot be found"),
        Err(source) => {
            return Err(pipl_core::PiplError::Patch {
                path: path.to_path_buf(),
                source,
            })
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    init_logger(args.verbose);

    if !args.skip_platform_check && !args.dump {
        if let Err(err) = check_host_platform() {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }

    if args.dump {
        if let Err(err) = dump_plugin(&args.input) {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
        return;
    }

    let settings = PatchSettings {
        input_path: args.input,
        dry_run: args.dry_run,
    };

    match run(&settings) {
        Ok(report) => {
            if args.json {
                match serde_json::to_string_pretty(&report) {
                    Ok(text) => println!("{text}"),
                    Err(err) => {
                        eprintln!("Error: {err}");
                        std::process::exit(1);
                    }
                }
            } else {
                for summary in &report.summaries {
                    print_summary(summary);
                }
            }
            for failure in &report.failures {
                eprintln!("Error: {}", failure.error);
            }
            if report.has_failures() {
                std::process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    }
}
