use std::path::PathBuf;
use std::process;

use libcoverart::api::CoverExtractorBuilder;
use libcoverart::manifest::{CoverSource, Manifest};
use libcoverart::player::{PlayerContext, PlayerSettings};
use libcoverart::transport::AutoTransport;

enum Mode {
    Single { locator: String, out: Option<PathBuf> },
    Manifest { locator: String },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let mut locator: Option<String> = None;
    let mut out: Option<PathBuf> = None;
    let mut manifest: Option<String> = None;
    let mut timeout: Option<u64> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--out" => match args.next() {
                Some(val) => out = Some(PathBuf::from(val)),
                None => {
                    eprintln!("Expected a path after --out");
                    print_usage_and_exit();
                }
            },
            "--manifest" => match args.next() {
                Some(val) => manifest = Some(val),
                None => {
                    eprintln!("Expected a locator after --manifest");
                    print_usage_and_exit();
                }
            },
            "--timeout" => match args.next().and_then(|v| v.parse::<u64>().ok()) {
                Some(secs) => timeout = Some(secs),
                None => {
                    eprintln!("--timeout needs a number of seconds");
                    print_usage_and_exit();
                }
            },
            "-h" | "--help" => print_usage_and_exit(),
            _ if arg.starts_with("--") => {
                eprintln!("Unknown argument: {}", arg);
                print_usage_and_exit();
            }
            _ if locator.is_none() => locator = Some(arg),
            _ => {
                eprintln!("Unexpected argument: {}", arg);
                print_usage_and_exit();
            }
        }
    }

    let mode = match (locator, manifest) {
        (Some(locator), None) => Mode::Single { locator, out },
        (None, Some(locator)) => Mode::Manifest { locator },
        _ => {
            eprintln!("Give either an audio locator or --manifest <locator>");
            print_usage_and_exit();
        }
    };

    let mut builder = CoverExtractorBuilder::new();
    if let Some(secs) = timeout {
        builder = builder.timeout_seconds(secs);
    }
    let extractor = builder.build();

    match mode {
        Mode::Single { locator, out } => {
            let cover = match extractor.try_extract_cover(&locator).await {
                Ok(Some(cover)) => cover,
                Ok(None) => {
                    eprintln!("No embedded cover in {}", locator);
                    process::exit(1);
                }
                Err(e) => {
                    eprintln!("Could not read {}: {}", locator, e);
                    process::exit(1);
                }
            };
            let path = out.unwrap_or_else(|| PathBuf::from(format!("cover.{}", cover.file_extension())));
            if let Err(e) = std::fs::write(&path, &cover.bytes) {
                eprintln!("Failed to write {}: {}", path.display(), e);
                process::exit(1);
            }
            println!("Media type: {}", cover.media_type);
            println!("Picture type: {}", cover.picture_type);
            println!("Wrote {} bytes to {}", cover.len(), path.display());
        }
        Mode::Manifest { locator } => {
            let manifest = Manifest::load(&AutoTransport::new(), &locator, None).await;
            if manifest.is_empty() {
                eprintln!("No tracks in {}", locator);
                process::exit(1);
            }
            let (mut player, _events) = PlayerContext::new(manifest, PlayerSettings::default(), extractor);
            let resolved = player.resolve_all_covers().await;
            for (i, track) in player.tracks().iter().enumerate() {
                let cover = match &track.cover {
                    CoverSource::Url(url) => url.clone(),
                    CoverSource::Embedded(c) => format!("embedded {} ({} bytes)", c.media_type, c.len()),
                };
                println!("{:3}. {} - {} [{}] {}", i + 1, track.artist, track.title, track.src, cover);
            }
            println!("Resolved {} embedded covers", resolved);
        }
    }
}

fn print_usage_and_exit() -> ! {
    eprintln!("Usage: coverdump <audio_locator> [--out <path>] [--timeout <secs>]");
    eprintln!("       coverdump --manifest <tracks.json locator> [--timeout <secs>]");
    process::exit(1);
}
