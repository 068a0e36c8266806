use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use eudr_gfc::collect::global_variables::{DATASET_VERSION_DEFAULT, DEFAULT_HANSEN_URL_TEMPLATE};
use eudr_gfc::collect::hansen::{
    HansenBootstrap, HttpFetchConfig, HttpFetcher, ObjectCache, TilesManifest,
};
use eudr_gfc::{compute_aoi_geodesic_area_ha, load_aoi, BootstrapConfig, ObjectCacheConfig};

#[derive(Parser, Debug)]
#[command(name = "eudr-gfc", version)]
#[command(about = "Hansen GFC tile bootstrap and forest statistics for EUDR evidence")]
struct Cli {
    /// Root of the local data plane
    #[arg(long, env = "EUDR_DMI_DATA_ROOT", default_value = "data", global = true)]
    data_root: PathBuf,

    /// Hansen GFC dataset version
    #[arg(long, env = "EUDR_DMI_HANSEN_DATASET_VERSION", default_value = DATASET_VERSION_DEFAULT, global = true)]
    dataset_version: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ensure Hansen tiles for an AOI are available locally and write the tiles manifest
    EnsureTiles(EnsureTilesArgs),
    /// Geodesic area of an AOI in hectares
    AoiArea {
        #[arg(long)]
        aoi_geojson: PathBuf,
    },
    /// Forest cover and loss statistics over the local Hansen tiles
    #[cfg(feature = "gdal")]
    ForestStats(ForestStatsArgs),
}

#[derive(Args, Debug)]
struct EnsureTilesArgs {
    #[arg(long)]
    aoi_id: String,

    #[arg(long)]
    aoi_geojson: PathBuf,

    /// Comma-separated layer names
    #[arg(long, value_delimiter = ',', default_value = "treecover2000,lossyear")]
    layers: Vec<String>,

    /// Download missing tiles (default)
    #[arg(long, overrides_with = "no_download")]
    download: bool,

    /// Never download; fail when a tile is missing locally and in the cache
    #[arg(long, overrides_with = "download")]
    no_download: bool,

    /// Use the MinIO object cache (requires the MINIO_* settings)
    #[arg(long)]
    minio_cache: bool,

    /// Forbid any network download
    #[arg(long)]
    offline: bool,

    /// Also print the local path of every tile layer
    #[arg(long)]
    print_paths: bool,

    #[arg(long, env = "EUDR_DMI_HANSEN_URL_TEMPLATE", default_value = DEFAULT_HANSEN_URL_TEMPLATE)]
    url_template: String,

    #[command(flatten)]
    minio: MinioArgs,
}

#[derive(Args, Debug)]
struct MinioArgs {
    #[arg(long, env = "MINIO_ENDPOINT")]
    minio_endpoint: Option<String>,

    #[arg(long, env = "MINIO_ACCESS_KEY", hide_env_values = true)]
    minio_access_key: Option<String>,

    #[arg(long, env = "MINIO_SECRET_KEY", hide_env_values = true)]
    minio_secret_key: Option<String>,

    #[arg(long, env = "MINIO_BUCKET")]
    minio_bucket: Option<String>,

    #[arg(long, env = "MINIO_SECURE", default_value_t = true, action = ArgAction::Set)]
    minio_secure: bool,
}

#[cfg(feature = "gdal")]
#[derive(Args, Debug)]
struct ForestStatsArgs {
    #[arg(long)]
    aoi_geojson: PathBuf,

    /// Parcel FeatureCollection; reports per-parcel statistics as well
    #[arg(long)]
    parcels_geojson: Option<PathBuf>,

    /// Property holding the parcel id
    #[arg(long, default_value = "parcel_id")]
    parcel_id_property: String,

    /// Tile directory laid out as <tile_id>/<layer>.tif (defaults to the data plane)
    #[arg(long)]
    tiles_dir: Option<PathBuf>,

    /// Minimum treecover2000 percentage counted as forest
    #[arg(long, default_value_t = 30)]
    threshold: i32,

    #[arg(long, default_value_t = 2021)]
    start_year: i32,

    #[arg(long, default_value_t = 2024)]
    end_year: i32,

    /// Count only pixels whose centre lies inside the zone
    #[arg(long)]
    centers_only: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ERROR: {:#}", err);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::EnsureTiles(args) => ensure_tiles(&cli.data_root, &cli.dataset_version, args),
        Command::AoiArea { aoi_geojson } => aoi_area(&aoi_geojson),
        #[cfg(feature = "gdal")]
        Command::ForestStats(args) => forest_stats(&cli.data_root, &cli.dataset_version, args),
    }
}

fn ensure_tiles(data_root: &Path, dataset_version: &str, args: EnsureTilesArgs) -> Result<()> {
    let cache_config = if args.minio_cache {
        Some(ObjectCacheConfig::from_parts(
            args.minio.minio_endpoint,
            args.minio.minio_access_key,
            args.minio.minio_secret_key,
            args.minio.minio_bucket,
            args.minio.minio_secure,
        )?)
    } else {
        None
    };

    let config = BootstrapConfig {
        data_root: data_root.to_path_buf(),
        dataset_version: dataset_version.to_string(),
        url_template: args.url_template,
        download: args.download || !args.no_download,
        offline: args.offline,
        cache: cache_config,
    };
    config.validate()?;

    let cache = open_cache(&config)?;
    let fetcher = HttpFetcher::new(HttpFetchConfig::default())?;
    let bootstrap = HansenBootstrap::new(&config, &fetcher, cache.as_deref())?;

    let aoi = load_aoi(&args.aoi_geojson)
        .with_context(|| format!("loading AOI {}", args.aoi_geojson.display()))?;
    let manifest_path = bootstrap.ensure_for_aoi(&args.aoi_id, &aoi, args.layers.as_slice())?;

    println!("manifest_path={}", manifest_path.display());
    if args.print_paths {
        let manifest = TilesManifest::load(&manifest_path)?;
        for entry in &manifest.entries {
            println!(
                "tile_path={} tile_id={} layer={} status={}",
                entry.local_path,
                entry.tile_id,
                entry.layer,
                entry.status
            );
        }
    }
    Ok(())
}

#[cfg(feature = "s3")]
fn open_cache(config: &BootstrapConfig) -> Result<Option<Box<dyn ObjectCache>>> {
    use eudr_gfc::collect::hansen::S3Cache;

    match &config.cache {
        Some(cache_config) => {
            info!(endpoint = %cache_config.endpoint, bucket = %cache_config.bucket, "using MinIO object cache");
            Ok(Some(Box::new(S3Cache::new(cache_config)?)))
        }
        None => Ok(None),
    }
}

#[cfg(not(feature = "s3"))]
fn open_cache(config: &BootstrapConfig) -> Result<Option<Box<dyn ObjectCache>>> {
    if config.cache.is_some() {
        anyhow::bail!("--minio-cache requires eudr-gfc to be built with the `s3` feature");
    }
    Ok(None)
}

fn aoi_area(aoi_geojson: &Path) -> Result<()> {
    let aoi = load_aoi(aoi_geojson)
        .with_context(|| format!("loading AOI {}", aoi_geojson.display()))?;
    let (area_ha, method) = compute_aoi_geodesic_area_ha(&aoi);
    info!(area_ha, method, "computed AOI area");
    println!("aoi_area_ha={:.4}", area_ha);
    println!("method={}", method);
    Ok(())
}

#[cfg(feature = "gdal")]
fn forest_stats(data_root: &Path, dataset_version: &str, args: ForestStatsArgs) -> Result<()> {
    use eudr_gfc::collect::raster::{GdalRasterReader, LocalTileSource};
    use eudr_gfc::commons::data_plane::DataPlane;
    use eudr_gfc::commons::determinism::canonical_json_bytes;
    use eudr_gfc::geometric::forest_stats::load_parcels;
    use eudr_gfc::{compute_aoi_forest_stats, compute_parcel_forest_stats, ForestParams};

    let params = ForestParams {
        canopy_threshold_percent: args.threshold,
        loss_start_year: args.start_year,
        end_year: args.end_year,
        all_touched: !args.centers_only,
    };
    params.validate()?;

    let tiles_dir = args
        .tiles_dir
        .unwrap_or_else(|| DataPlane::new(data_root).tiles_root(dataset_version));
    let tiles = LocalTileSource::new(&tiles_dir).tile_pairs()?;
    info!(tiles = tiles.len(), dir = %tiles_dir.display(), "computing forest statistics");

    let aoi = load_aoi(&args.aoi_geojson)
        .with_context(|| format!("loading AOI {}", args.aoi_geojson.display()))?;
    let reader = GdalRasterReader;
    let aoi_stats = compute_aoi_forest_stats(&aoi, &tiles, &reader, &params)?;

    let parcel_stats = match &args.parcels_geojson {
        Some(path) => {
            let parcels = load_parcels(path, &args.parcel_id_property)
                .with_context(|| format!("loading parcels {}", path.display()))?;
            Some(compute_parcel_forest_stats(&parcels, &tiles, &reader, &params)?)
        }
        None => None,
    };

    let (aoi_area_ha, method) = compute_aoi_geodesic_area_ha(&aoi);
    let report = serde_json::json!({
        "aoi_area_ha": aoi_area_ha,
        "aoi_area_method": method,
        "params": params,
        "aoi": aoi_stats,
        "parcels": parcel_stats,
    });
    let bytes = canonical_json_bytes(&report)?;
    println!("{}", String::from_utf8(bytes)?);
    Ok(())
}
