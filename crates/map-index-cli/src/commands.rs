//! Subcommand implementations
//!
//! Every command writes its report to `out`; logs go through `tracing`.

use anyhow::{Context, bail};
use geo::Rect;
use map_index_lib::reader::{self, MapDocument};
use map_index_lib::search::{
    IndexSearchBackend, SearchEvent, SearchModeController, SearchQuery, SearchResult,
};
use map_index_lib::{Classificator, MapFeature, MultiSourceIndex, scales};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::Command;
use crate::config::AppConfig;

/// Run one subcommand
pub fn run(command: &Command, config: &AppConfig, out: &mut impl Write) -> anyhow::Result<()> {
    match command {
        Command::Info { maps } => info(config, maps, out),
        Command::Features {
            maps,
            rect,
            center,
            scale,
            tile_drawing,
        } => {
            let rect = match (rect, center, scale) {
                (Some(rect), _, _) => *rect,
                (None, Some(center), Some(scale)) => scales::rect_for_scale(*center, *scale),
                _ => bail!("features needs --rect, or --center together with --scale"),
            };
            features(config, maps, rect, *scale, *tile_drawing, out)
        }
        Command::Search {
            maps,
            query,
            viewport,
            locale,
            min_results,
            no_fallback,
        } => {
            let mut config = config.clone();
            if let Some(locale) = locale {
                config.locale = locale.clone();
            }
            if let Some(min_results) = min_results {
                config.search.min_viewport_results = *min_results;
            }
            if *no_fallback {
                config.search.everywhere_fallback = false;
            }

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime.block_on(search(&config, maps, query, *viewport, out))
        }
        Command::Pack {
            input,
            output,
            format_version,
        } => pack(input, output, *format_version, out),
    }
}

/// Build an index over `maps`; fails only when none of them loads
#[profiling::function]
pub fn load_index(
    config: &AppConfig,
    maps: &[PathBuf],
) -> anyhow::Result<Arc<MultiSourceIndex>> {
    let classificator = Arc::new(Classificator::with_types(
        config.types.iter().map(|(k, v)| (k.as_str(), v.as_str())),
    ));
    let index = MultiSourceIndex::new(classificator, config.index.clone());

    let mut first_error = None;
    for (path, result) in maps.iter().zip(index.add_maps(maps)) {
        if let Err(e) = result {
            tracing::error!("Skipping {}: {e}", path.display());
            if first_error.is_none() {
                first_error = Some((path.clone(), e));
            }
        }
    }

    if index.map_count() == 0 {
        match first_error {
            Some((path, e)) => {
                return Err(e).with_context(|| format!("Failed to load {}", path.display()));
            }
            None => bail!("No maps given"),
        }
    }
    Ok(Arc::new(index))
}

#[profiling::function]
fn info(config: &AppConfig, maps: &[PathBuf], out: &mut impl Write) -> anyhow::Result<()> {
    let index = load_index(config, maps)?;

    for map in index.maps() {
        writeln!(
            out,
            "{}\tv{}\t{} features\t{}",
            map.name,
            map.version,
            map.feature_count,
            map.bounding_box.map_or_else(|| "empty".to_string(), format_rect)
        )?;
    }
    match index.world_rect() {
        Some(rect) => writeln!(out, "world\t{}", format_rect(rect))?,
        None => writeln!(out, "world\tempty")?,
    }
    Ok(())
}

#[profiling::function]
fn features(
    config: &AppConfig,
    maps: &[PathBuf],
    rect: Rect<f64>,
    scale: Option<u8>,
    tile_drawing: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let index = load_index(config, maps)?;
    let scale = scale.unwrap_or_else(|| scales::scale_level(rect));
    tracing::info!("Enumerating features at scale {scale}");

    let mut lines = Vec::new();
    let mut visit = |feature: &MapFeature| lines.push(format_feature(feature, &config.locale));
    if tile_drawing {
        index.for_each_feature_tile_drawing(rect, scale, &mut visit);
    } else {
        index.for_each_feature_at_scale(rect, scale, &mut visit);
    }

    for line in &lines {
        writeln!(out, "{line}")?;
    }
    writeln!(out, "{} features at scale {scale}", lines.len())?;
    Ok(())
}

async fn search(
    config: &AppConfig,
    maps: &[PathBuf],
    query: &str,
    viewport: Rect<f64>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let index = load_index(config, maps)?;
    let controller = SearchModeController::new(
        Arc::new(IndexSearchBackend::new(index)),
        config.search.clone(),
    );

    let mut handle = controller.start(SearchQuery::new(query, config.locale.clone(), viewport));
    while let Some(event) = handle.next_event().await {
        match event {
            SearchEvent::Started => writeln!(out, "started\t{query:?}")?,
            SearchEvent::ModeChanged { from, to } => {
                writeln!(out, "mode\t{from:?} -> {to:?}")?;
            }
            SearchEvent::Results { batch, .. } => {
                for result in &batch {
                    writeln!(out, "{}", format_result(result))?;
                }
            }
            SearchEvent::Finished { mode, total } => {
                writeln!(out, "finished\t{mode:?}\t{total} results")?;
                break;
            }
            SearchEvent::Cancelled => {
                writeln!(out, "cancelled")?;
                break;
            }
            SearchEvent::Failed(e) => return Err(e).context("Search failed"),
        }
    }
    Ok(())
}

#[profiling::function]
fn pack(input: &Path, output: &Path, version: u16, out: &mut impl Write) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let document: MapDocument = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse {}", input.display()))?;
    reader::write_map_file(output, version, &document)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    tracing::info!(
        "Packed {} features into {}",
        document.features.len(),
        output.display()
    );
    writeln!(
        out,
        "{}\tv{version}\t{} features",
        output.display(),
        document.features.len()
    )?;
    Ok(())
}

fn format_rect(rect: Rect<f64>) -> String {
    format!(
        "{:.6},{:.6},{:.6},{:.6}",
        rect.min().x,
        rect.min().y,
        rect.max().x,
        rect.max().y
    )
}

fn format_feature(feature: &MapFeature, locale: &str) -> String {
    let center = feature.center();
    format!(
        "{}\t{:?}\t{}\t{:.6},{:.6}",
        feature.id(),
        feature.kind(),
        feature.name(locale).unwrap_or("-"),
        center.x,
        center.y
    )
}

fn format_result(result: &SearchResult) -> String {
    format!(
        "{}\t{}\t{:.2}\t{:.6}\t{:.1}",
        result.feature,
        result.name,
        result.score,
        result.distance,
        result.bearing.to_degrees()
    )
}
