//! Batch orchestration: paired tiling, band splitting, training-mask
//! generation and mask vectorization over many items.
//!
//! Every batch follows the same failure policy. A recoverable error
//! ([`PrepError::is_recoverable`]) is logged with the item's identity and
//! recorded in the [`BatchReport`]; the batch carries on. Structural errors
//! abort only the job that depends on them (for example one raster pair
//! whose extents do not overlap).

use crate::config::{NamingConfig, PipelineConfig};
use crate::core::band_split::BandSplitter;
use crate::core::georef::{PixelSpace, PolygonFeature, PolygonGeoreferencer, WorldSpace};
use crate::core::mask::MaskEncoder;
use crate::core::rescale::rescale_stack_u8;
use crate::core::tiling::{tile_name, PairedTiler, TilePlan, TileSpec};
use crate::core::vectorize::ContourVectorizer;
use crate::io::aux_xml::{read_aux_xml, write_aux_xml};
use crate::io::catalog::CatalogSink;
use crate::io::geojson::{read_footprints, write_feature_collection};
use crate::io::mask_image::{encode_jpeg, encode_mask_png, read_mask_png, JPEG_QUALITY};
use crate::io::output::write_atomic;
use crate::io::raster::{RasterOpener, RasterSink, RasterSource};
use crate::types::{ClassMask, GeoTransform, PrepError, PrepResult};
use regex::Regex;
use std::path::{Path, PathBuf};

/// Items that completed and items that were skipped, with the cause
#[derive(Debug)]
pub struct BatchReport<T> {
    pub processed: Vec<T>,
    pub skipped: Vec<(String, PrepError)>,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            processed: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<T> BatchReport<T> {
    /// Sort per-item results into a report, logging every failure
    pub fn collect(job: &str, results: Vec<(String, PrepResult<T>)>) -> Self {
        let mut report = Self::default();
        for (item, result) in results {
            match result {
                Ok(value) => report.processed.push(value),
                Err(e) => {
                    if e.is_recoverable() {
                        log::warn!("{}: skipping {}: {}", job, item, e);
                    } else {
                        log::error!("{}: {} failed: {}", job, item, e);
                    }
                    report.skipped.push((item, e));
                }
            }
        }
        log::info!(
            "{}: {} processed, {} skipped",
            job,
            report.processed.len(),
            report.skipped.len()
        );
        report
    }

    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Paths of one co-registered tile pair
#[derive(Debug, Clone, PartialEq)]
pub struct TilePair {
    pub spec: TileSpec,
    pub before: PathBuf,
    pub after: PathBuf,
}

/// Result of tiling one raster pair
#[derive(Debug)]
pub struct PairedTiles {
    /// The one plan both rasters were cut with
    pub plan: TilePlan,
    pub report: BatchReport<TilePair>,
}

/// Class mask for one tile of a plan
#[derive(Debug, Clone)]
pub struct TileMask {
    pub spec: TileSpec,
    pub geo_transform: GeoTransform,
    pub mask: ClassMask,
}

/// A footprint file and the imagery it annotates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetPair {
    pub id: String,
    pub vector: PathBuf,
    pub raster: PathBuf,
}

/// Files written for one training item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingItem {
    pub id: String,
    pub mask: PathBuf,
    pub image: PathBuf,
}

/// Run `f` over `items`, in parallel when the `parallel` feature is on.
/// Output order follows input order.
pub fn map_items<T, R, F>(items: &[T], f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        items.par_iter().map(f).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        items.iter().map(f).collect()
    }
}

/// Pair every `{vector_prefix}{id}.geojson` in `vector_dir` with
/// `{raster_prefix}{id}.{raster_extension}` in `raster_dir`.
///
/// Footprint files without imagery come back as `MissingPair` entries.
pub fn pair_dataset<P: AsRef<Path>, Q: AsRef<Path>>(
    naming: &NamingConfig,
    vector_dir: P,
    raster_dir: Q,
) -> PrepResult<(Vec<DatasetPair>, Vec<(String, PrepError)>)> {
    let pattern = Regex::new(&format!(
        r"(?i)^{}(?P<id>.+)\.geojson$",
        regex::escape(&naming.vector_prefix)
    ))
    .map_err(|e| PrepError::InvalidConfig(format!("vector_prefix: {}", e)))?;

    let mut vectors: Vec<(String, PathBuf)> = std::fs::read_dir(vector_dir.as_ref())?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?.to_string();
            let id = pattern.captures(&name)?.name("id")?.as_str().to_string();
            Some((id, path))
        })
        .collect();
    vectors.sort();

    let mut pairs = Vec::new();
    let mut missing = Vec::new();
    for (id, vector) in vectors {
        let raster = raster_dir.as_ref().join(format!(
            "{}{}.{}",
            naming.raster_prefix, id, naming.raster_extension
        ));
        if raster.is_file() {
            pairs.push(DatasetPair { id, vector, raster });
        } else {
            log::warn!("No imagery for footprints {}: expected {}", vector.display(), raster.display());
            missing.push((
                id.clone(),
                PrepError::MissingPair {
                    item: id,
                    expected: raster,
                },
            ));
        }
    }
    log::info!("Paired {} footprint files ({} without imagery)", pairs.len(), missing.len());
    Ok((pairs, missing))
}

/// Configured components plus the worker pool they run on
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    tiler: PairedTiler,
    splitter: BandSplitter,
    encoder: MaskEncoder,
    vectorizer: ContourVectorizer,
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
}

impl Pipeline {
    /// Validate `config` once and build every component from it.
    pub fn new(config: PipelineConfig) -> PrepResult<Self> {
        config.validate()?;

        #[cfg(feature = "parallel")]
        let pool = match config.workers {
            Some(n) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| PrepError::InvalidConfig(format!("worker pool: {}", e)))?,
            ),
            None => None,
        };

        Ok(Self {
            tiler: PairedTiler::new(config.tiling)?,
            splitter: BandSplitter::new(config.naming.raster_extension.clone()),
            encoder: MaskEncoder::new(config.mask)?,
            vectorizer: ContourVectorizer::new(config.vectorize)?,
            #[cfg(feature = "parallel")]
            pool,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn tiler(&self) -> &PairedTiler {
        &self.tiler
    }

    pub fn encoder(&self) -> &MaskEncoder {
        &self.encoder
    }

    pub fn vectorizer(&self) -> &ContourVectorizer {
        &self.vectorizer
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        #[cfg(feature = "parallel")]
        if let Some(pool) = &self.pool {
            return pool.install(op);
        }
        op()
    }

    /// Cut `before` and `after` along one shared plan and write every tile
    /// pair through `sink`, reporting paths to `catalog`.
    ///
    /// The plan is computed once, before any tile is cut. An empty overlap
    /// fails the whole pair with `NoOverlap`; a failed tile is skipped.
    pub fn tile_pair(
        &self,
        before: &dyn RasterSource,
        after: &dyn RasterSource,
        sink: &dyn RasterSink,
        catalog: Option<&dyn CatalogSink>,
    ) -> PrepResult<PairedTiles> {
        log::info!("Tiling pair {} / {}", before.name(), after.name());
        let plan = self.tiler.plan_sources(before, after)?;

        let results = self.install(|| {
            map_items(plan.tiles(), |spec| {
                let result = self.write_tile_pair(&plan, spec, before, after, sink, catalog);
                (format!("tile {}", spec.index), result)
            })
        });

        Ok(PairedTiles {
            report: BatchReport::collect("paired tiling", results),
            plan,
        })
    }

    fn write_tile_pair(
        &self,
        plan: &TilePlan,
        spec: &TileSpec,
        before: &dyn RasterSource,
        after: &dyn RasterSource,
        sink: &dyn RasterSink,
        catalog: Option<&dyn CatalogSink>,
    ) -> PrepResult<TilePair> {
        let write_one = |source: &dyn RasterSource| -> PrepResult<PathBuf> {
            let tile = self.tiler.cut_tile(source, plan, spec)?;
            let id = tile_name(source.name(), spec);
            let name = format!("{}.{}", id, self.config.naming.raster_extension);
            let path = sink.write(&name, &tile.data)?;
            if let Some(catalog) = catalog {
                catalog.record(&id, &path)?;
            }
            Ok(path)
        };
        Ok(TilePair {
            spec: *spec,
            before: write_one(before)?,
            after: write_one(after)?,
        })
    }

    /// Split every source into single-band rasters named after its identity
    pub fn split_bands(
        &self,
        sources: &[&dyn RasterSource],
        sink: &dyn RasterSink,
        catalog: Option<&dyn CatalogSink>,
    ) -> BatchReport<PathBuf> {
        let per_source = self.install(|| {
            map_items(sources, |source| {
                (source.name().to_string(), self.splitter.split(*source, source.name(), sink))
            })
        });

        let mut results = Vec::new();
        for (name, outcome) in per_source {
            match outcome {
                Ok(report) => {
                    for path in report.written {
                        if let Some(catalog) = catalog {
                            let id = path
                                .file_stem()
                                .map(|s| s.to_string_lossy().into_owned())
                                .unwrap_or_else(|| name.clone());
                            if let Err(e) = catalog.record(&id, &path) {
                                results.push((id, Err(e)));
                                continue;
                            }
                        }
                        results.push((name.clone(), Ok(path)));
                    }
                    for (band, e) in report.failed {
                        results.push((format!("{} band {}", name, band), Err(e)));
                    }
                }
                Err(e) => results.push((name, Err(e))),
            }
        }
        BatchReport::collect("band split", results)
    }

    /// Encode a class mask for every tile of `plan` from world footprints.
    ///
    /// `projection` is the CRS of the plan's rasters, used to measure
    /// metre contact spacing.
    pub fn encode_tile_masks(
        &self,
        plan: &TilePlan,
        footprints: &[PolygonFeature<WorldSpace>],
        projection: Option<&str>,
    ) -> BatchReport<TileMask> {
        let encoder = self.encoder.for_projection(projection);
        let results = self.install(|| {
            map_items(plan.tiles(), |spec| {
                let geo_transform = plan.tile_geo_transform(spec);
                let result = encoder
                    .encode_world(footprints, &geo_transform)
                    .map(|mask| TileMask {
                        spec: *spec,
                        geo_transform,
                        mask,
                    });
                (format!("tile {}", spec.index), result)
            })
        });
        BatchReport::collect("tile masks", results)
    }

    /// Build training masks for every footprint file in `vector_dir` that
    /// has matching imagery in `raster_dir`.
    ///
    /// Writes `{out_dir}/masks/{id}.png` and `{out_dir}/images/{id}.jpg`,
    /// each with a PAM sidecar carrying the imagery's georeferencing.
    pub fn build_training_masks<P: AsRef<Path>, Q: AsRef<Path>, R: AsRef<Path>>(
        &self,
        vector_dir: P,
        raster_dir: Q,
        out_dir: R,
        opener: &dyn RasterOpener,
    ) -> PrepResult<BatchReport<TrainingItem>> {
        let (pairs, missing) = pair_dataset(&self.config.naming, vector_dir, raster_dir)?;
        let out_dir = out_dir.as_ref();
        log::info!("Building {} training masks into {}", pairs.len(), out_dir.display());

        let mut results: Vec<(String, PrepResult<TrainingItem>)> = missing
            .into_iter()
            .map(|(id, e)| (id, Err(e)))
            .collect();
        results.extend(self.install(|| {
            map_items(&pairs, |pair| (pair.id.clone(), self.training_item(pair, out_dir, opener)))
        }));
        Ok(BatchReport::collect("training masks", results))
    }

    fn training_item(&self, pair: &DatasetPair, out_dir: &Path, opener: &dyn RasterOpener) -> PrepResult<TrainingItem> {
        let footprints = read_footprints(&pair.vector)?;
        let raster = opener.open(&pair.raster)?;
        let gt = raster.geo_transform()?;
        let projection = raster.projection();

        // Both images are encoded before either file is written, so a failed
        // item leaves nothing behind.
        let mask = self
            .encoder
            .for_projection(projection.as_deref())
            .encode_world(&footprints, &gt)?;
        let mask_png = encode_mask_png(&mask)?;
        let bands = raster.read_window(raster.full_window()?)?;
        let pixels = rescale_stack_u8(&bands, raster.nodata(), 3);
        let image_jpeg = encode_jpeg(&pixels, JPEG_QUALITY)?;

        let (rows, cols) = mask.dim();
        let mask_path = write_atomic(out_dir.join("masks").join(format!("{}.png", pair.id)), &mask_png)?;
        write_aux_xml(&mask_path, &gt.with_size(cols, rows), projection.as_deref())?;
        let image_path = write_atomic(out_dir.join("images").join(format!("{}.jpg", pair.id)), &image_jpeg)?;
        write_aux_xml(&image_path, &gt, projection.as_deref())?;

        log::debug!(
            "Training item {}: {} footprints, mask {}",
            pair.id,
            footprints.len(),
            mask_path.display()
        );
        Ok(TrainingItem {
            id: pair.id.clone(),
            mask: mask_path,
            image: image_path,
        })
    }

    /// Vectorize a mask and lift its polygons into world space
    pub fn vectorize_to_world(
        &self,
        mask: &ClassMask,
        gt: &GeoTransform,
    ) -> PrepResult<Vec<PolygonFeature<WorldSpace>>> {
        let georef = PolygonGeoreferencer::new(*gt)?;
        let pixel: Vec<PolygonFeature<PixelSpace>> = self.vectorizer.vectorize(mask);
        Ok(pixel.iter().map(|p| georef.to_world(p)).collect())
    }

    /// Convert mask images (each with a PAM sidecar) to GeoJSON files in `out_dir`.
    ///
    /// A mask whose sidecar is missing or unusable is excluded with a
    /// `CoordinateTransform` entry.
    pub fn masks_to_geojson<P: AsRef<Path>>(&self, masks: &[PathBuf], out_dir: P) -> BatchReport<PathBuf> {
        let out_dir = out_dir.as_ref();
        let results = self.install(|| {
            map_items(masks, |mask_path| {
                let result = self.mask_to_geojson(mask_path, out_dir);
                (mask_path.display().to_string(), result)
            })
        });
        BatchReport::collect("mask vectorization", results)
    }

    fn mask_to_geojson(&self, mask_path: &Path, out_dir: &Path) -> PrepResult<PathBuf> {
        let mask = read_mask_png(mask_path)?;
        let (rows, cols) = mask.dim();
        let pam = read_aux_xml(mask_path, cols, rows).map_err(|e| match e {
            PrepError::Io(io) => PrepError::CoordinateTransform(format!(
                "no georeferencing sidecar for {}: {}",
                mask_path.display(),
                io
            )),
            other => other,
        })?;

        let polygons = self.vectorize_to_world(&mask, &pam.geo_transform)?;
        let stem = mask_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        log::debug!("{}: {} polygons", mask_path.display(), polygons.len());
        write_feature_collection(out_dir.join(format!("{}.geojson", stem)), &polygons)
    }
}
