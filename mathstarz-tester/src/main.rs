mod live;
mod logic;
mod scenario;
mod util;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use mathstarz_client::config::ENV_BACKEND_URL;
use mathstarz_client::{ClientConfig, FileWorldLoader};
use mathstarz_game::{UserId, WorldLoader};
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::time::Instant;

use logic::{LogicTester, ScenarioResult};
use scenario::{ScenarioCtx, get_scenario, list_scenarios};
use util::{parse_seeds, split_csv};

#[derive(Debug, Parser)]
#[command(name = "mathstarz-tester", version)]
#[command(about = "Automated QA for the MathStarz progression engine")]
struct Args {
    /// Scenarios to run (comma-separated keys, or `all`)
    #[arg(long, default_value = "smoke")]
    scenarios: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Seeds to run (comma-separated, decimal or 0x-hex)
    #[arg(long, default_value = "1337")]
    seeds: String,

    /// Number of iterations per scenario and seed
    #[arg(long, default_value_t = 10)]
    iterations: usize,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console"])]
    report: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// World JSON to test against instead of the bundled one
    #[arg(long)]
    world: Option<PathBuf>,

    /// Translations JSON to use instead of the bundled one
    #[arg(long)]
    translations: Option<PathBuf>,

    /// Language for NPC chat and deferral messages
    #[arg(long)]
    language: Option<String>,

    /// Also run the read-only check against a live backend
    #[arg(long)]
    live: bool,

    /// Client config file used by the live check
    #[arg(long)]
    config: Option<PathBuf>,

    /// Backend base URL; implies --live and overrides config and environment
    #[arg(long)]
    backend: Option<String>,

    /// User id for the live check
    #[arg(long, default_value_t = 7)]
    user: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if maybe_list_scenarios(&args)? {
        return Ok(());
    }

    announce_banner();

    let start_time = Instant::now();
    let scenarios = expand_scenarios(&args.scenarios);
    let seeds = parse_seeds(&split_csv(&args.seeds))?;
    let ctx = load_context(&args)?;

    let mut all_results = run_logic_scenarios(&args, &scenarios, &seeds, &ctx);
    if args.live || args.backend.is_some() {
        all_results.push(run_live(&args, &ctx).await?);
    }

    write_reports(&args, &all_results, start_time)?;

    if all_results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }

    Ok(())
}

fn maybe_list_scenarios(args: &Args) -> Result<bool> {
    if !args.list_scenarios {
        return Ok(false);
    }
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Available scenarios:")?;
    for (key, description) in list_scenarios() {
        writeln!(output_target.writer(), "  {key:18} - {description}")?;
    }
    output_target.flush_inner()?;
    Ok(true)
}

fn announce_banner() {
    println!("{}", "⭐ MathStarz Automated Tester".bright_cyan().bold());
    println!("{}", "=============================".cyan());
}

fn expand_scenarios(scenarios_arg: &str) -> Vec<String> {
    let mut scenarios = split_csv(scenarios_arg);
    if scenarios.iter().any(|s| s == "all") {
        scenarios.retain(|s| s != "all");
        scenarios.extend(list_scenarios().into_iter().map(|(key, _)| key.to_string()));
    }
    scenarios
}

fn load_context(args: &Args) -> Result<ScenarioCtx> {
    let mut loader = FileWorldLoader::new();
    if let Some(path) = &args.world {
        loader = loader.with_world(path);
    }
    if let Some(path) = &args.translations {
        loader = loader.with_translations(path);
    }
    let world = loader.load_world_data().context("loading world data")?;
    let mut translations = loader.load_translations().context("loading translations")?;
    if let Some(language) = &args.language {
        translations.set_language(language);
    }
    log::debug!(
        "Testing {} NPCs in {}",
        world.npcs.len(),
        translations.current_language()
    );
    Ok(ScenarioCtx::new(world, translations))
}

fn run_logic_scenarios(
    args: &Args,
    scenarios: &[String],
    seeds: &[u64],
    ctx: &ScenarioCtx,
) -> Vec<ScenarioResult> {
    let mut results = Vec::new();

    println!("{}", "🧠 Running Logic Tests".bright_yellow().bold());
    println!("{}", "-".repeat(30).yellow());

    let logic_tester = LogicTester::new(ctx.clone(), args.verbose);

    for scenario_name in scenarios {
        if let Some(scenario) = get_scenario(scenario_name) {
            results.extend(logic_tester.run_scenario(&scenario, seeds, args.iterations));
        } else {
            eprintln!("⚠️  Unknown scenario: {}", scenario_name.yellow());
        }
    }

    results
}

async fn run_live(args: &Args, ctx: &ScenarioCtx) -> Result<ScenarioResult> {
    let mut config =
        ClientConfig::load(args.config.as_deref()).context("loading client config")?;
    if let Some(url) = &args.backend {
        config = config.with_overrides(|name| (name == ENV_BACKEND_URL).then(|| url.clone()))?;
    }

    println!("{}", "🌐 Running Live Backend Check".bright_blue().bold());
    println!("{}", "-".repeat(30).blue());
    let result = live::run_live_check(ctx, &config, UserId(args.user)).await;
    if result.passed {
        println!("✅ {} ({})", config.base_url().green(), live::LIVE_SCENARIO_NAME);
    } else {
        eprintln!("❌ {} ({})", config.base_url().red(), live::LIVE_SCENARIO_NAME);
    }
    Ok(result)
}

fn write_reports(args: &Args, results: &[ScenarioResult], start_time: Instant) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;
    match args.report.as_str() {
        "json" => logic::reports::generate_json_report(&mut output_target, results)?,
        "markdown" => {
            if results.is_empty() {
                writeln!(
                    &mut output_target,
                    "# MathStarz Logic Test Results\n\n_No scenarios executed._"
                )?;
            } else {
                logic::reports::generate_markdown_report(&mut output_target, results)?;
            }
        }
        _ => {
            if results.is_empty() {
                writeln!(&mut output_target, "No scenarios executed.")?;
            } else {
                logic::reports::generate_console_report(
                    &mut output_target,
                    results,
                    start_time.elapsed(),
                )?;
            }
            let duration = start_time.elapsed();
            writeln!(&mut output_target)?;
            writeln!(&mut output_target, "🏁 Total time: {duration:?}")?;
        }
    }
    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}
