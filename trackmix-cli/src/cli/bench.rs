use clap::ArgMatches;

use super::render::RenderError;

pub fn maybe_run_bench(args: &ArgMatches) -> Result<Option<i32>, RenderError> {
    // Dispatches the mixer benchmark and returns an exit code if handled.
    if args.get_flag("bench-mix") {
        return run_mix_bench(args);
    }
    Ok(None)
}

fn run_mix_bench(_args: &ArgMatches) -> Result<Option<i32>, RenderError> {
    #[cfg(not(feature = "bench"))]
    {
        eprintln!("Benchmarking requires the `bench` feature.");
        return Ok(Some(1));
    }
    #[cfg(feature = "bench")]
    {
        use trackmix_lib::diagnostics::bench::{bench_mixer, MixBenchConfig};

        let args = _args;
        let config = MixBenchConfig {
            frame_count: parse_arg(args, "bench-frames")?,
            tracks: parse_arg(args, "bench-tracks")?,
            resampled_tracks: parse_arg(args, "bench-resampled")?,
            input_seconds: parse_arg(args, "bench-seconds")?,
            iterations: parse_arg(args, "bench-iterations")?,
            fixed_point: !args.get_flag("bench-float"),
            ..MixBenchConfig::default()
        };
        let result = bench_mixer(config)?;

        println!(
            "Mix bench (tracks={} resampled={} frames={} {}s iters={} {}): avg {:.2}ms (min {:.2}ms max {:.2}ms), audio {:.2}ms, rt {:.4}x, blocks {}",
            config.tracks,
            config.resampled_tracks,
            config.frame_count,
            config.input_seconds,
            config.iterations,
            if config.fixed_point { "fixed" } else { "float" },
            result.avg_ms,
            result.min_ms,
            result.max_ms,
            result.audio_time_ms,
            result.rt_factor,
            result.blocks
        );

        return Ok(Some(0));
    }
}

#[cfg(feature = "bench")]
fn parse_arg<T: std::str::FromStr>(args: &ArgMatches, id: &str) -> Result<T, RenderError> {
    let value = args
        .get_one::<String>(id)
        .ok_or_else(|| RenderError::Input(format!("missing --{}", id)))?;
    value
        .parse::<T>()
        .map_err(|_| RenderError::Input(format!("invalid --{} value \"{}\"", id, value)))
}
