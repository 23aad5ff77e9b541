mod cli;

use rangeprobe::config;
use rangeprobe_media::source::{self, HttpOptions};
use rangeprobe_media::tree::NodeSummary;
use rangeprobe_media::{parse_media, DimensionPolicy, Field, ParseResult};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "rangeprobe=debug,rangeprobe_media=debug".to_string()
        } else {
            "rangeprobe=info,rangeprobe_media=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Probe {
            source,
            fields,
            json,
            policy,
            block_size,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe(
                &source,
                cli.config.as_deref(),
                ProbeArgs {
                    fields,
                    json,
                    policy,
                    block_size,
                },
            ))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
    }
}

struct ProbeArgs {
    fields: Option<String>,
    json: bool,
    policy: Option<DimensionPolicy>,
    block_size: Option<u64>,
}

async fn probe(
    identifier: &str,
    config_path: Option<&std::path::Path>,
    args: ProbeArgs,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    let mut options = config.parse_options(args.fields.as_deref())?;
    if let Some(policy) = args.policy {
        options.dimension_policy = policy;
    }
    if let Some(block_size) = args.block_size {
        options.block_size = block_size;
    }

    let http: &HttpOptions = &config.http;
    let source = source::open(identifier, http)
        .with_context(|| format!("Cannot open {identifier}"))?;

    tracing::debug!("Probing {} with {:?}", identifier, options.request.fields());
    let result = parse_media(source, options)
        .await
        .with_context(|| format!("Failed to probe {identifier}"))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(identifier, &result);
    }
    Ok(())
}

fn show<T: std::fmt::Display>(label: &str, field: &Option<Field<T>>, unit: &str) {
    match field {
        Some(Field::Value(value)) => println!("{label}: {value}{unit}"),
        Some(Field::Unavailable(reason)) => println!("{label}: unavailable ({reason})"),
        None => {}
    }
}

fn print_summary(identifier: &str, result: &ParseResult) {
    println!("Source: {}", identifier);
    show("Container", &result.container, "");
    show("Duration", &result.duration_in_seconds, " s");
    show("Dimensions", &result.dimensions, "");
    show("Frame rate", &result.fps, " fps");
    show("Rotation", &result.rotation, "°");
    show("Video codec", &result.video_codec, "");
    show("Audio codec", &result.audio_codec, "");

    match &result.tracks {
        Some(Field::Value(tracks)) => {
            println!("\nTracks: {}", tracks.len());
            for (i, track) in tracks.iter().enumerate() {
                print!("  [{}] #{} {:?}", i, track.track_id, track.media_type);
                if let Some(codec) = track.codec() {
                    print!(" {}", codec);
                }
                if let Some(dims) = track.dimensions {
                    print!(" {}", dims);
                }
                if let Some(ref lang) = track.language {
                    print!(" ({})", lang);
                }
                println!();
            }
        }
        Some(Field::Unavailable(reason)) => println!("\nTracks: unavailable ({reason})"),
        None => {}
    }

    if let Some(Field::Value(nodes)) = &result.structure {
        println!("\nStructure:");
        print_nodes(nodes, 1);
    }

    println!(
        "\n{} fetch(es), {} bytes read",
        result.stats.fetches, result.stats.bytes_fetched
    );
}

fn print_nodes(nodes: &[NodeSummary], depth: usize) {
    for node in nodes {
        let size = node
            .size
            .map_or_else(|| "unknown size".to_string(), |size| format!("{size} bytes"));
        println!(
            "{:indent$}{} @{} {} ({:?})",
            "",
            node.kind,
            node.offset,
            size,
            node.state,
            indent = depth * 2
        );
        print_nodes(&node.children, depth + 1);
    }
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            let warnings = config::validate_config(&config)?;
            println!("✓ Configuration is valid");
            println!("  Block size: {} bytes", config.fetch.block_size);
            println!("  Max leaf size: {} bytes", config.fetch.max_leaf_size);
            println!("  HTTP timeout: {}s", config.http.timeout_secs);
            println!("  Dimension policy: {:?}", config.parse.dimension_policy);
            println!("  Default fields: {}", config.parse.fields.len());
            for warning in warnings {
                println!("  warning: {}", warning);
            }
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Block size: {} bytes", config.fetch.block_size);
            println!("  HTTP timeout: {}s", config.http.timeout_secs);
        }
    }

    Ok(())
}
