use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use color_print::cprintln;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wos_controller::{AdbController, Controller};
use wos_core::{
    automaton::{Automaton, AutomatonPipeline, Condition},
    config::AutomationConfig,
    resource::{Load, LocalResource},
    scheduler::{tick_budget, Pipeline, RunStats, Scheduler},
    tracker::CodeTracker,
    vision::{
        utils::{draw_box, save_timestamped},
        Matcher, Region,
    },
    CachedScreenCapper, Config,
};

/// Gift code tracker and screen automaton for Whiteout Survival
#[derive(Debug, Parser)]
#[command(name = "wos", version)]
struct Cli {
    /// Configuration file, the defaults are used if it does not exist
    #[arg(short, long, global = true, default_value = "wos.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Poll the code page and mail new codes
    Track {
        /// Check once and exit
        #[arg(long)]
        once: bool,
    },
    /// Drive the game through adb
    Automate {
        /// Stop after this many ticks
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        ticks: Option<u64>,
    },
    /// Save a screenshot of the device, for making templates
    Capture {
        /// Defaults to a timestamped file under `screenshots/`
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Match one signature against the current screen
    #[command(after_help = "\
Examples:
  wos check help_button --region 1004,2230,140,90
  wos check online_rewards --variants 5 -o found.png")]
    Check {
        signature: String,
        /// x,y,width,height
        #[arg(long)]
        region: Option<Region>,
        /// Try `<signature>_1` to `<signature>_<N>`
        #[arg(long)]
        variants: Option<u32>,
        /// Save the screen with the match boxed
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the loaded actions and dispatch entries
    Tasks,
}

fn main() -> anyhow::Result<()> {
    init_logger();

    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Track { once } => track(&config, once),
        Commands::Automate { ticks } => automate(&config.automation, ticks),
        Commands::Capture { output } => capture(&config.automation, output),
        Commands::Check {
            signature,
            region,
            variants,
            output,
        } => {
            let mut condition = Condition::new(signature);
            condition.region = region;
            condition.variants = variants;
            check(&config.automation, &condition, output)
        }
        Commands::Tasks => tasks(&config.automation),
    }
}

fn init_logger() {
    let filter_layer = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Tick forever, or `ticks` times
fn run<P: Pipeline>(scheduler: &Scheduler, pipeline: &mut P, ticks: Option<u64>) -> RunStats {
    match ticks {
        Some(ticks) => scheduler.run(pipeline, tick_budget(ticks as usize)),
        None => scheduler.run(pipeline, || true),
    }
}

// MARK: Tracker

fn track(config: &Config, once: bool) -> anyhow::Result<()> {
    let mut tracker = CodeTracker::from_config(&config.tracker)?;
    info!(
        "tracking {} every {}s, history in {:?}",
        config.tracker.url, config.tracker.interval_secs, config.tracker.history_file
    );

    let stats = run(&config.tracker.scheduler(), &mut tracker, once.then_some(1));
    if stats.errors > 0 && once {
        anyhow::bail!("the check failed, see the log above");
    }
    Ok(())
}

// MARK: Automaton

fn connect(config: &AutomationConfig) -> anyhow::Result<AdbController> {
    AdbController::connect(&config.adb, &config.serial)
        .with_context(|| format!("failed to connect to {}", config.serial))
}

fn load_automaton(config: &AutomationConfig) -> anyhow::Result<Automaton<AdbController>> {
    let resource = LocalResource::load(&config.resource_dir)
        .with_context(|| format!("failed to load resources from {:?}", config.resource_dir))?;
    let controller = connect(config)?;

    let mut matcher = Matcher::new(config.method);
    if let Some(dir) = &config.debug_crop_dir {
        matcher = matcher.with_debug_crop_dir(dir);
    }
    Ok(Automaton::new(controller, resource, matcher, config.pacing()))
}

fn automate(config: &AutomationConfig, ticks: Option<u64>) -> anyhow::Result<()> {
    let mut pipeline = AutomatonPipeline::new(load_automaton(config)?);
    run(&config.scheduler(), &mut pipeline, ticks);
    Ok(())
}

fn capture(config: &AutomationConfig, output: Option<PathBuf>) -> anyhow::Result<()> {
    let controller = connect(config)?;
    let screen = controller.screencap()?;
    let path = match output {
        Some(path) => {
            screen
                .save(&path)
                .with_context(|| format!("failed to save {path:?}"))?;
            path
        }
        None => save_timestamped(&screen, "screenshots", "screen")?,
    };
    cprintln!(
        "<g>saved</g> {}x{} screenshot to {:?}",
        screen.width(),
        screen.height(),
        path
    );
    Ok(())
}

fn check(
    config: &AutomationConfig,
    condition: &Condition,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let automaton = load_automaton(config)?;
    let res = automaton.check(condition)?;

    match &res {
        Some(res) => cprintln!(
            "<g><s>found</s></g> {} at {:?} (confidence {:.4}, area {})",
            res.name,
            res.location,
            res.confidence,
            res.area
        ),
        None => cprintln!("<r><s>not found</s></r>: {}", condition.signature),
    }

    if let Some(path) = output {
        let mut screen = automaton.screen_cache_or_cap()?;
        if let Some(region) = condition.region {
            draw_box(&mut screen, region);
        }
        if let Some(res) = &res {
            draw_box(&mut screen, res.area);
        }
        screen
            .save(&path)
            .with_context(|| format!("failed to save {path:?}"))?;
        info!("annotated screen saved to {path:?}");
    }
    Ok(())
}

fn tasks(config: &AutomationConfig) -> anyhow::Result<()> {
    let resource = LocalResource::load(&config.resource_dir)?;

    cprintln!("<s>signatures</s>:");
    for name in resource.signatures.names() {
        println!("  {name}");
    }

    cprintln!("<s>actions</s>:");
    for name in resource.actions.names() {
        match resource.actions.get(name).and_then(|action| action.desc.as_deref()) {
            Some(desc) => println!("  {name}: {desc}"),
            None => println!("  {name}"),
        }
    }

    cprintln!("<s>dispatch order</s>:");
    for (i, entry) in resource.entries.iter().enumerate() {
        let condition = match &entry.condition {
            Some(condition) => {
                let region = condition
                    .region
                    .map(|region: Region| format!(" in {region}"))
                    .unwrap_or_default();
                format!("{}{region}", condition.signature)
            }
            None => "always".to_string(),
        };
        println!("  {}. {} [{condition}] -> {}", i + 1, entry.name, entry.action);
    }
    Ok(())
}
