// memsim: memory model simulator with a time-travel trace viewer

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use memsim::config::SimConfig;
use memsim::interpreter::Simulator;
use memsim::program::{parse_listing, Program};
use memsim::ui::App;

/// memsim - run a pointer program against a simulated address space and
/// report every memory-safety violation
#[derive(Debug, Parser)]
#[command(name = "memsim", version, about, long_about = None)]
struct Cli {
    /// Program to run: a `.json` instruction array or a text listing.
    #[arg(value_name = "FILE")]
    program: PathBuf,

    /// JSON configuration file; flags below override it.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Stack region size in bytes.
    #[arg(long, value_name = "BYTES")]
    stack_capacity: Option<usize>,

    /// Heap region size in bytes.
    #[arg(long, value_name = "BYTES")]
    heap_capacity: Option<usize>,

    /// Keep running after a fatal finding (capacity faults still halt).
    #[arg(long)]
    keep_going: bool,

    /// Do not report reads of never-written memory.
    #[arg(long, conflicts_with = "strict_uninit")]
    no_uninit_reads: bool,

    /// Treat reads of never-written memory as fatal.
    #[arg(long)]
    strict_uninit: bool,

    /// Emit the report as JSON instead of text.
    #[arg(long, conflicts_with = "tui")]
    json: bool,

    /// Step through the recorded history in a terminal UI.
    #[arg(long)]
    tui: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<SimConfig> {
        let mut config = match &self.config {
            Some(path) => SimConfig::from_json_file(path)?,
            None => SimConfig::default(),
        };
        if let Some(bytes) = self.stack_capacity {
            config.stack_capacity_bytes = bytes;
        }
        if let Some(bytes) = self.heap_capacity {
            config.heap_capacity_bytes = bytes;
        }
        if self.keep_going {
            config.halt_on_first_fatal = false;
        }
        if self.no_uninit_reads {
            config.report_uninitialized_reads = false;
        }
        if self.strict_uninit {
            config.uninitialized_reads_fatal = true;
        }
        // The trace viewer needs the history
        if self.tui {
            config.record_history = true;
        }
        Ok(config)
    }
}

fn load_program(path: &Path) -> anyhow::Result<Program> {
    let source =
        fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    let program = if path.extension().is_some_and(|ext| ext == "json") {
        Program::from_json(&source).with_context(|| format!("invalid program {}", path.display()))?
    } else {
        parse_listing(&source)?
    };
    Ok(program)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Info on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.json {
        let level = if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("memsim", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    let config = cli.load_config()?;
    let program = load_program(&cli.program)?;

    let mut histogram: Vec<_> = program.histogram().into_iter().collect();
    histogram.sort();
    log::debug!("{} instructions: {:?}", program.len(), histogram);

    let mut simulator = Simulator::new(program, config)?;
    let report = simulator.run();
    let failed = report.has_fatal();

    if cli.tui {
        run_tui(App::new(simulator, report))?;
    } else if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

fn run_tui(mut app: App) -> anyhow::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = app.run(&mut terminal);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res?;
    print!("{}", app.report);
    Ok(())
}
