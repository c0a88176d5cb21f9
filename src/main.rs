use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use flume::Receiver;
use tracing::info;
use tracing_subscriber::EnvFilter;

use photowall::models::{SortKey, SortOrder};
use photowall::scanner::TreeScanner;
use photowall::session::{ChannelRenderer, FillOutcome, RenderEvent, ViewSession, Viewport};
use photowall::thumbnails::FsThumbnailFetcher;
use photowall::WallConfig;

const USAGE: &str = "\
Usage: photowall <DIR> [options]

Options:
  --album <PATH>        Album to open, relative to DIR (default: root)
  --width <PX>          Viewport width (default: 1280)
  --height <PX>         Viewport height (default: 800)
  --row-height <PX>     Natural row height
  --concurrency <N>     Maximum concurrent thumbnail loads
  --timeout-ms <MS>     Per-thumbnail fetch timeout (0 = none)
  --sort <name|date>    Sort key for images
  --desc                Sort images in descending order
  --all                 Keep scrolling until the album is exhausted";

#[derive(Debug)]
struct CliArgs {
    root: PathBuf,
    album: String,
    width: f32,
    height: f32,
    scroll_all: bool,
}

fn parse_args(config: &mut WallConfig) -> Result<CliArgs> {
    let mut root: Option<PathBuf> = None;
    let mut album = String::new();
    let mut width: f32 = 1280.0;
    let mut height: f32 = 800.0;
    let mut scroll_all = false;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            "--album" => {
                let value = args.next().context("Missing value for --album")?;
                album = format!("/{}", value.trim_matches('/'));
                if album == "/" {
                    album.clear();
                }
            }
            "--width" => {
                let value = args.next().context("Missing value for --width")?;
                width = value
                    .parse::<f32>()
                    .context("Failed to parse --width as a number")?;
            }
            "--height" => {
                let value = args.next().context("Missing value for --height")?;
                height = value
                    .parse::<f32>()
                    .context("Failed to parse --height as a number")?;
            }
            "--row-height" => {
                let value = args.next().context("Missing value for --row-height")?;
                config.row_height = value
                    .parse::<f32>()
                    .context("Failed to parse --row-height as a number")?;
            }
            "--concurrency" => {
                let value = args.next().context("Missing value for --concurrency")?;
                config.concurrency_limit = value
                    .parse::<usize>()
                    .context("Failed to parse --concurrency as a positive integer")?;
            }
            "--timeout-ms" => {
                let value = args.next().context("Missing value for --timeout-ms")?;
                let ms = value
                    .parse::<u64>()
                    .context("Failed to parse --timeout-ms as a non-negative integer")?;
                config.fetch_timeout = (ms > 0).then(|| Duration::from_millis(ms));
            }
            "--sort" => {
                let value = args.next().context("Missing value for --sort")?;
                config.sort.key = SortKey::parse(&value)
                    .with_context(|| format!("Unknown sort key {value:?}"))?;
            }
            "--desc" => config.sort.order = SortOrder::Desc,
            "--all" => scroll_all = true,
            _ if arg.starts_with('-') => bail!("Unknown option {arg}\n\n{USAGE}"),
            _ => {
                if root.is_some() {
                    bail!("Unexpected argument {arg}\n\n{USAGE}");
                }
                root = Some(PathBuf::from(arg));
            }
        }
    }

    let Some(root) = root else {
        bail!("Missing directory\n\n{USAGE}");
    };
    if width <= 0.0 || height <= 0.0 {
        bail!("Viewport must have a positive size");
    }

    Ok(CliArgs {
        root,
        album,
        width,
        height,
        scroll_all,
    })
}

async fn print_events(events: Receiver<RenderEvent>) {
    let mut row_index = 0usize;
    while let Ok(event) = events.recv_async().await {
        match event {
            RenderEvent::AlbumEntered { path, generation } => {
                row_index = 0;
                let shown = if path.is_empty() { "/" } else { path.as_str() };
                println!("== {shown} (generation {generation})");
            }
            RenderEvent::Row {
                height, items, state, ..
            } => {
                let tiles: Vec<String> = items
                    .iter()
                    .map(|item| {
                        let marker = if item.is_album { "/" } else { "" };
                        format!(
                            "{}{} {:.0}x{:.0}@{:.0}",
                            item.display_name,
                            marker,
                            item.placement.display_w,
                            item.placement.display_h,
                            item.x
                        )
                    })
                    .collect();
                println!(
                    "row {:>3} [{:?}] h={:.1}: {}",
                    row_index,
                    state,
                    height,
                    tiles.join("  ")
                );
                row_index += 1;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("photowall=info".parse()?),
        )
        .init();

    let mut config = WallConfig::from_env();
    let args = parse_args(&mut config)?;

    let tree = Arc::new(
        TreeScanner::new()
            .scan(&args.root, &config.sort)
            .await
            .with_context(|| format!("Failed to scan {:?}", args.root))?,
    );
    let fetcher = FsThumbnailFetcher::from_tree(&args.root, &tree);
    info!(images = fetcher.len(), "Thumbnail sources indexed");
    let cache = config.cache_builder().build(Arc::new(fetcher));

    let (renderer, events) = ChannelRenderer::new();
    let printer = tokio::spawn(print_events(events));

    let session = ViewSession::new(
        Arc::clone(&tree),
        cache.clone(),
        Arc::new(renderer),
        &config,
        Viewport::new(args.width, args.height),
    );

    let mut outcome = session.enter_album(&args.album)?.await?;
    let mut scroll_top = 0.0;
    while args.scroll_all && outcome == FillOutcome::Satisfied {
        scroll_top += args.height;
        outcome = session.on_scroll(scroll_top).await?;
    }

    let snapshot = session.snapshot();
    let stats = cache.stats();
    info!(
        ?outcome,
        rows = snapshot.rows,
        content_height = snapshot.content_height,
        loaded = stats.loaded,
        failed = stats.failed,
        "Wall filled"
    );

    drop(session);
    printer.await.context("Render printer panicked")?;
    Ok(())
}
