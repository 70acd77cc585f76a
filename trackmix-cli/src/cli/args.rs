//! CLI argument definitions for `tmix`.

use clap::{Arg, ArgAction, Command};

/// Build the CLI argument parser and command definitions.
pub fn build_cli() -> Command {
    Command::new("tmix")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Render multi-track mixes offline with the trackmix engine")
        .arg_required_else_help(true)
        .arg(
            Arg::new("bench-mix")
                .long("bench-mix")
                .action(ArgAction::SetTrue)
                .help("Run a synthetic mixing benchmark and exit"),
        )
        .arg(
            Arg::new("bench-tracks")
                .long("bench-tracks")
                .value_name("COUNT")
                .default_value("8")
                .help("Stereo tracks at the engine rate in the mixing benchmark"),
        )
        .arg(
            Arg::new("bench-resampled")
                .long("bench-resampled")
                .value_name("COUNT")
                .default_value("4")
                .help("Resampled mono tracks in the mixing benchmark"),
        )
        .arg(
            Arg::new("bench-frames")
                .long("bench-frames")
                .value_name("FRAMES")
                .default_value("256")
                .help("Frames per block for the mixing benchmark"),
        )
        .arg(
            Arg::new("bench-seconds")
                .long("bench-seconds")
                .value_name("SECONDS")
                .default_value("2.0")
                .help("Output length in seconds for the mixing benchmark"),
        )
        .arg(
            Arg::new("bench-iterations")
                .long("bench-iterations")
                .value_name("COUNT")
                .default_value("5")
                .help("Number of iterations for the mixing benchmark"),
        )
        .arg(
            Arg::new("bench-float")
                .long("bench-float")
                .action(ArgAction::SetTrue)
                .help("Benchmark the float engine instead of the fixed-point one"),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Suppress all console output"),
        )
        .subcommand(
            Command::new("render")
                .about("Mix the tracks of a session file into a WAV file")
                .arg(
                    Arg::new("SESSION")
                        .help("Path to the session JSON file")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("out")
                        .long("out")
                        .short('o')
                        .value_name("PATH")
                        .required(true)
                        .help("WAV file receiving the main bus"),
                )
                .arg(
                    Arg::new("aux-out")
                        .long("aux-out")
                        .value_name("PATH")
                        .help("Mono WAV file receiving the aux bus, overriding the session"),
                )
                .arg(
                    Arg::new("seconds")
                        .long("seconds")
                        .value_name("SECONDS")
                        .help("Stop after this many seconds of output"),
                ),
        )
        .subcommand(
            Command::new("create")
                .about("Emit default JSON payloads")
                .subcommand(
                    Command::new("session-json").about("Print an example session JSON payload"),
                ),
        )
}
