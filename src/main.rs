mod cli;

use fraglift::{config, extract, inspect};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "fraglift=trace,fraglift_media=trace".to_string()
        } else {
            "fraglift=warn,fraglift_media=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Extract {
            input,
            output,
            track_id,
            handler,
            mode,
        } => {
            let request = extract::ExtractRequest {
                input,
                output,
                track_id,
                handler,
                mode,
            };
            extract_file(&request, cli.config.as_deref())
        }
        Commands::Dump { input, json } => dump_file(&input, json),
        Commands::Tracks { input, json } => list_tracks(&input, json),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("fraglift {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn extract_file(request: &extract::ExtractRequest, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let report = extract::run_extract(request, &config)?;

    println!(
        "Extracted track {} ({}) to {}: {} samples, {} bytes, {} fragments",
        report.track_id,
        report.mode,
        report.output.display(),
        report.stats.samples_extracted,
        report.stats.bytes_written,
        report.stats.fragments
    );
    if report.stats.tracks_found > 1 {
        println!(
            "Note: {} tracks matched, extracted the first",
            report.stats.tracks_found
        );
    }
    Ok(())
}

fn dump_file(input: &Path, json: bool) -> Result<()> {
    let file = extract::open_file(input)?;

    if json {
        let json_str = serde_json::to_string_pretty(&inspect::box_tree(&file))?;
        println!("{}", json_str);
    } else {
        print!("{}", inspect::render_tree(&file));
    }
    Ok(())
}

fn list_tracks(input: &Path, json: bool) -> Result<()> {
    let presentation = extract::open_presentation(input)?;
    let tracks = inspect::track_summaries(&presentation);

    if json {
        println!("{}", serde_json::to_string_pretty(&tracks)?);
    } else if tracks.is_empty() {
        println!("No tracks");
    } else {
        print!("{}", inspect::render_tracks(&tracks));
    }
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("  Handler: {}", config.extract.handler);
    println!("  Mode: {}", config.extract.mode);
    println!(
        "  ADTS defaults: profile={} sample_rate_index={} channel_config={}",
        config.adts.profile, config.adts.sample_rate_index, config.adts.channel_config
    );
    Ok(())
}
