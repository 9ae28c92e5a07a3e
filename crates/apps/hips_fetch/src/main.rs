use std::time::Instant;

use catalog::SurveyRegistry;
use clap::{Args as ClapArgs, Parser, Subcommand};
use foundation::math::ProjectionKind;
use foundation::time::Time;
use futures_util::future::{FutureExt, LocalBoxFuture};
use reqwest::Client;
use streaming::{FetchError, RawBytes, TileLoader, TileLookup, TileSource};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use view::{SkyView, ViewerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Resolve and fetch HiPS tiles for a sky view")]
struct Args {
    /// Survey list (JSON array) to load on top of the built-in surveys: URL or file path
    #[arg(long)]
    feed: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List known surveys
    Surveys,

    /// Print the tiles a view needs, coarse fallbacks first
    Resolve {
        #[command(flatten)]
        view: ViewArgs,

        /// Print the view's WCS header as JSON instead of tile URLs
        #[arg(long)]
        wcs: bool,
    },

    /// Fetch every tile a view needs and report what came back
    Prefetch {
        #[command(flatten)]
        view: ViewArgs,
    },
}

#[derive(ClapArgs, Debug)]
struct ViewArgs {
    /// Viewer config (JSON); flags below override it
    #[arg(long)]
    config: Option<String>,

    /// View center, e.g. "83.63 +22.01" or "05 34 31.9 +22 00 52"
    #[arg(long)]
    target: Option<String>,

    /// Frame the target is given in (J2000, GAL)
    #[arg(long)]
    frame: Option<String>,

    /// Survey id
    #[arg(long)]
    survey: Option<String>,

    /// Horizontal field of view in degrees
    #[arg(long)]
    fov: Option<f64>,

    /// sin or aitoff
    #[arg(long)]
    projection: Option<String>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,
}

impl ViewArgs {
    async fn viewer_config(&self) -> Result<ViewerConfig, Box<dyn std::error::Error>> {
        let mut cfg = match &self.config {
            Some(path) => ViewerConfig::from_json(&tokio::fs::read_to_string(path).await?)?,
            None => ViewerConfig::default(),
        };
        if let Some(target) = &self.target {
            cfg.target = target.clone();
        }
        if let Some(frame) = &self.frame {
            cfg.frame = frame.parse()?;
        }
        if let Some(survey) = &self.survey {
            cfg.survey = survey.clone();
        }
        if let Some(fov) = self.fov {
            cfg.fov_deg = fov;
        }
        if let Some(projection) = &self.projection {
            cfg.projection = ProjectionKind::parse_or_default(projection);
        }
        if let Some(width) = self.width {
            cfg.screen_width = width;
        }
        if let Some(height) = self.height {
            cfg.screen_height = height;
        }
        Ok(cfg)
    }
}

/// Plain HTTP GET tile source.
struct HttpTileSource {
    client: Client,
}

impl TileSource for HttpTileSource {
    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, FetchError>> {
        let client = self.client.clone();
        let url = url.to_string();
        async move {
            let resp = client
                .get(&url)
                .send()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(FetchError::from_status(resp.status().as_u16()));
            }
            let bytes = resp
                .bytes()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;
            Ok(bytes.to_vec())
        }
        .boxed_local()
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let client = Client::new();

    let mut registry = SurveyRegistry::with_defaults();
    if let Some(feed) = &args.feed {
        let json = read_feed(&client, feed).await?;
        let report = registry.refresh_from_json(&json)?;
        info!(
            added = report.added.len(),
            removed = report.removed.len(),
            "loaded survey feed"
        );
    }

    match args.command {
        Command::Surveys => list_surveys(&registry),
        Command::Resolve { view, wcs } => {
            let sky = SkyView::<Vec<u8>>::new(view.viewer_config().await?, registry)?;
            resolve(sky, wcs)?
        }
        Command::Prefetch { view } => {
            let sky = SkyView::<Vec<u8>>::new(view.viewer_config().await?, registry)?;
            prefetch(sky, client).await
        }
    }

    Ok(())
}

async fn read_feed(client: &Client, location: &str) -> Result<String, Box<dyn std::error::Error>> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let resp = client.get(location).send().await?;
        if !resp.status().is_success() {
            return Err(format!("survey feed at {location} returned HTTP {}", resp.status()).into());
        }
        return Ok(resp.text().await?);
    }
    Ok(tokio::fs::read_to_string(location).await?)
}

fn list_surveys(registry: &SurveyRegistry) {
    for survey in registry.list() {
        println!(
            "{}\t{}\t{}\tmax_order={}\t{}",
            survey.id, survey.name, survey.frame, survey.max_order, survey.root_url
        );
    }
}

fn resolve(mut sky: SkyView<Vec<u8>>, wcs: bool) -> Result<(), Box<dyn std::error::Error>> {
    if wcs {
        println!("{}", serde_json::to_string_pretty(&sky.view_wcs())?);
        return Ok(());
    }
    let frame = sky.frame(Time(0.0));
    info!(order = frame.order, tiles = frame.tiles.len(), "resolved view");
    for (tile, _) in &frame.tiles {
        println!("{tile}\t{}", sky.registry().tile_url(tile)?);
    }
    Ok(())
}

async fn prefetch(mut sky: SkyView<Vec<u8>>, client: Client) {
    let started = Instant::now();
    let now = || Time(started.elapsed().as_secs_f64() * 1_000.0);

    let wanted = sky.frame(now());
    let mut loader = TileLoader::for_cache(HttpTileSource { client }, RawBytes, sky.cache());
    sky.dispatch(&mut loader);
    while let Some(completion) = loader.next_completion::<Vec<u8>>().await {
        if let Err(err) = &completion.result {
            warn!(tile = %completion.ticket.tile, %err, "tile fetch failed");
        }
        sky.on_fetch_complete(completion, now());
        sky.dispatch(&mut loader);
    }

    let done = sky.frame(now());
    let failed = done
        .tiles
        .iter()
        .filter(|(_, lookup)| matches!(lookup, TileLookup::Unavailable))
        .count();
    let stats = sky.cache_stats();
    println!(
        "order {}: {} tiles wanted, {} loaded ({} bytes), {} failed in {:.1}s",
        wanted.order,
        wanted.tiles.len(),
        stats.loaded,
        stats.loaded_bytes,
        failed,
        started.elapsed().as_secs_f64()
    );
}
