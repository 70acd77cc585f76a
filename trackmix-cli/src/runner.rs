use std::path::PathBuf;

use clap::ArgMatches;
use log::info;

use crate::cli;
use crate::cli::render::RenderError;
use crate::cli::session::SessionConfig;

pub fn run(args: &ArgMatches) -> Result<i32, RenderError> {
    info!("Starting trackmix CLI");
    if let Some(code) = cli::bench::maybe_run_bench(args)? {
        return Ok(code);
    }

    match args.subcommand() {
        Some(("render", sub)) => run_render(sub),
        Some(("create", sub)) => run_create(sub),
        _ => {
            cli::args::build_cli().print_help()?;
            Ok(2)
        }
    }
}

fn run_render(args: &ArgMatches) -> Result<i32, RenderError> {
    let session_path = args
        .get_one::<String>("SESSION")
        .map(PathBuf::from)
        .ok_or_else(|| RenderError::Input("missing session path".to_string()))?;
    let out = args
        .get_one::<String>("out")
        .map(PathBuf::from)
        .ok_or_else(|| RenderError::Input("missing --out".to_string()))?;

    let mut session = cli::render::load_session(&session_path)?;
    if let Some(aux) = args.get_one::<String>("aux-out") {
        session.aux_out = Some(PathBuf::from(aux));
    }
    if let Some(seconds) = args.get_one::<String>("seconds") {
        let seconds = seconds
            .parse::<f32>()
            .map_err(|_| RenderError::Input(format!("invalid --seconds value \"{}\"", seconds)))?;
        session.max_seconds = Some(seconds);
    }

    let summary = cli::render::render(&session, &out)?;
    if !args.get_flag("quiet") {
        println!(
            "Rendered {} frames at {} Hz from {} track(s) to {}",
            summary.frames,
            summary.sample_rate,
            summary.tracks,
            out.display()
        );
    }
    Ok(0)
}

fn run_create(args: &ArgMatches) -> Result<i32, RenderError> {
    match args.subcommand() {
        Some(("session-json", _)) => {
            let json = serde_json::to_string_pretty(&SessionConfig::example())?;
            println!("{}", json);
            Ok(0)
        }
        _ => {
            eprintln!("Unknown create target. Try `tmix create session-json`.");
            Ok(2)
        }
    }
}
