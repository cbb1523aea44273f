//! E2E test harness entry point
//!
//! This file is the test binary that runs the browser suites.
//! Run with: E2E_BASE_URL=http://127.0.0.1:4242 cargo test --package devon-farm-e2e --test e2e
//!
//! Without a base URL or server binary it lists the suites and exits cleanly.

use std::path::PathBuf;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use devon_farm_e2e::playwright::Browser;
use devon_farm_e2e::{suites, E2eConfig, E2eResult, Selection, SuiteSpec, TestRunner};

#[derive(Parser, Debug)]
#[command(name = "devon-farm-e2e")]
#[command(about = "Browser E2E suites for Devon Farm Sales")]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "E2E_CONFIG")]
    config: Option<PathBuf>,

    /// URL of a running application
    #[arg(long, env = "E2E_BASE_URL")]
    base_url: Option<String>,

    /// Application binary to spawn when no base URL is given
    #[arg(long, env = "E2E_SERVER_BINARY")]
    server_binary: Option<PathBuf>,

    /// Directory with extra YAML suites
    #[arg(short, long, env = "E2E_SPECS")]
    specs: Option<PathBuf>,

    /// Skip the built-in suites
    #[arg(long)]
    no_builtin: bool,

    /// Run only tests matching this tag
    #[arg(short, long)]
    tag: Option<String>,

    /// Run only tests whose name contains this text
    #[arg(short, long)]
    name: Option<String>,

    /// Run only this suite
    #[arg(long)]
    suite: Option<String>,

    /// Browser to use (chromium, firefox, webkit)
    #[arg(long, env = "E2E_BROWSER")]
    browser: Option<String>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Maximum number of tests in flight
    #[arg(short, long, env = "E2E_WORKERS")]
    workers: Option<usize>,

    /// Output directory for results
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the selected tests and exit
    #[arg(long)]
    list: bool,

    /// Print the suites as YAML and exit
    #[arg(long)]
    dump_yaml: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Name filter forwarded by `cargo test <filter>`
    #[arg(hide = true)]
    filter: Option<String>,

    #[arg(long, hide = true)]
    nocapture: bool,

    #[arg(long, short = 'q', hide = true)]
    quiet: bool,
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
    let result = rt.block_on(async_main(args));

    match result {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

async fn async_main(args: Args) -> E2eResult<bool> {
    let mut config = E2eConfig::load(args.config.as_deref())?;

    if let Some(base_url) = args.base_url {
        config.base_url = Some(base_url);
    }
    if let Some(binary) = args.server_binary {
        config.server.get_or_insert_with(Default::default).binary = binary;
    }
    if let Some(specs) = args.specs {
        config.specs_dir = Some(specs);
    }
    if args.no_builtin {
        config.include_builtin = false;
    }
    if let Some(browser) = args.browser {
        config.browser = browser.parse::<Browser>()?;
    }
    if args.headed {
        config.headless = false;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(output) = args.output {
        config.output_dir = output;
    }
    config.validate()?;

    let mut all: Vec<SuiteSpec> = Vec::new();
    if config.include_builtin {
        all.extend(suites::builtin(&config.fixtures));
    }
    if let Some(dir) = &config.specs_dir {
        all.extend(SuiteSpec::load_all(dir)?);
    }

    let selection = Selection {
        tag: args.tag,
        name: args.name.or(args.filter),
        suite: args.suite,
    };

    if args.dump_yaml {
        for suite in &all {
            println!("---\n{}", suite.to_yaml()?);
        }
        return Ok(true);
    }

    let Some(target) = config.target() else {
        warn!("No E2E_BASE_URL or E2E_SERVER_BINARY configured; nothing will run");
        print_selection(&all, &selection);
        return Ok(true);
    };

    if args.list {
        print_selection(&all, &selection);
        return Ok(true);
    }

    let mut runner = TestRunner::with_config(config.runner_config(target));
    let results = runner.run_suites(&all, &selection).await?;
    runner.write_results(&results)?;
    runner.stop_server()?;

    Ok(results.success())
}

fn print_selection(suites: &[SuiteSpec], selection: &Selection) {
    for suite in suites {
        for test in suite.tests.iter().filter(|t| selection.matches(suite, t)) {
            match &test.skip {
                Some(reason) => info!("{} › {} [skipped: {}]", suite.name, test.name, reason),
                None => info!("{} › {}", suite.name, test.name),
            }
        }
    }
}
