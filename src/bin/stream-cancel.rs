#[path = "stream_cancel/cli.rs"]
mod cli;

use std::process::ExitCode;

use clap::Parser;
use stream_cancel::{Driver, FIXTURE_ROUTES, ServerConfig};

use cli::{Cli, Command, ProbeArgs, ServeArgs};

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    stream_cancel::logging::init_tracing(cli.json_logs)?;

    match cli.command {
        Command::Serve(args) => {
            run_serve(args).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Probe(args) => run_probe(args).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match args.config.as_ref() {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen.to_string();
    }

    stream_cancel::serve(config).await?;
    Ok(())
}

async fn run_probe(args: ProbeArgs) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let driver = Driver::new(&args.base_url)?;
    let routes: Vec<&str> = if args.routes.is_empty() {
        FIXTURE_ROUTES.to_vec()
    } else {
        args.routes.iter().map(String::as_str).collect()
    };

    let reports = driver.probe_all(routes).await?;
    let failed = reports.iter().filter(|report| !report.within(args.max)).count();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            let verdict = if report.within(args.max) { "ok" } else { "FAIL" };
            println!("{verdict:>4}  {:<16} {}", report.route, report.value);
        }
    }

    if failed > 0 {
        eprintln!("{failed} route(s) kept streaming past {}", args.max);
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
