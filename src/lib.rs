mod assets;
mod compose;
mod config;
mod error;
mod font;
mod grid;
mod header;
mod metrics;
mod pagination;
mod source;

use assets::{AssetRequest, SharedAssets, spawn_loader};
pub use compose::{JPEG_QUALITY, PageGeometry, draw_element, encode_jpeg, margin_px};
use compose::{PageJob, RenderedPage, render_page};
pub use config::{MergeOptions, MergerConfig, ResolvedOptions};
use config::validate_element_size;
pub use error::{DrawError, FontError, LoadError, MergeError, Result};
pub use font::{HeaderFont, measure_text};
pub use grid::Grid;
pub use header::{RenderedHeader, fit_font_size, header_text, render_header};
pub use metrics::{MergeMetrics, PageMetrics};
pub use pagination::{PagePlan, plan_pages};
use rayon::prelude::*;
pub use source::{ImageSource, Slot, load_all};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
pub use tiny_skia::Pixmap;

/// Tiles same-size elements into one or more JPEG pages.
///
/// Background and font are loaded in the background after construction;
/// merges issued before they arrive simply render without them.
#[derive(Clone)]
pub struct Merger {
    config: MergerConfig,
    assets: Arc<SharedAssets>,
}

/// Encoded pages plus what it took to produce them.
#[derive(Debug, Clone)]
pub struct MergeOutput {
    pub pages: Vec<Vec<u8>>,
    pub metrics: MergeMetrics,
}

impl Merger {
    pub fn builder() -> MergerBuilder {
        MergerBuilder::new()
    }

    /// Validates `config` and starts loading its background and font.
    pub fn new(config: MergerConfig) -> Result<Self> {
        config.defaults().validate()?;
        let assets = SharedAssets::new();
        spawn_loader(
            assets.clone(),
            AssetRequest {
                background: config.background_source.clone(),
                font: config.font_source.clone(),
            },
        );
        Ok(Self { config, assets })
    }

    pub fn config(&self) -> &MergerConfig {
        &self.config
    }

    /// True once the background and font loads have finished, successfully
    /// or not.
    pub fn assets_settled(&self) -> bool {
        self.assets.is_settled()
    }

    /// Waits for the background and font loads. `merge` never does this.
    pub async fn wait_for_assets(&self) {
        self.assets.wait_settled().await
    }

    pub fn has_background(&self) -> bool {
        self.assets.background().is_some()
    }

    pub async fn merge<I, S>(
        &self,
        elements: I,
        element_width: f64,
        element_height: f64,
        options: &MergeOptions,
    ) -> Result<Vec<Vec<u8>>>
    where
        I: IntoIterator<Item = S>,
        S: Into<ImageSource>,
    {
        let output = self
            .merge_with_metrics(elements, element_width, element_height, options)
            .await?;
        Ok(output.pages)
    }

    /// Loads every element, plans the pages and renders them in page order.
    ///
    /// Elements that fail to load keep their position and leave a blank
    /// cell. Fails with [`MergeError::NoItems`] when nothing could be loaded.
    pub async fn merge_with_metrics<I, S>(
        &self,
        elements: I,
        element_width: f64,
        element_height: f64,
        options: &MergeOptions,
    ) -> Result<MergeOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<ImageSource>,
    {
        let resolved = self.config.resolve(options);
        resolved.validate()?;
        validate_element_size(element_width, element_height)?;

        let start = Instant::now();
        let sources: Vec<ImageSource> = elements.into_iter().map(Into::into).collect();
        tracing::info!(elements = sources.len(), "merge started");

        let slots = load_all(sources).await;
        let loaded = slots.iter().filter(|slot| slot.is_some()).count();
        if loaded == 0 {
            return Err(MergeError::NoItems);
        }
        let failed_loads = slots.len() - loaded;

        let plan = plan_pages(
            slots.len(),
            element_width,
            element_height,
            resolved.trigger_split_count,
            resolved.max_pages_count,
        );
        let header = resolved.header_text().map(str::to_owned);
        let request = RenderRequest {
            element_width,
            element_height,
            element_margin: margin_px(resolved.el_margin, element_width, element_height),
            outer_margin: margin_px(resolved.outer_margin, element_width, element_height),
            max_out: resolved.max_out_dimension,
            header_coef: header.as_ref().map(|_| resolved.header_coef),
            background: if resolved.add_background {
                self.assets.background()
            } else {
                None
            },
            font: header.as_ref().and_then(|_| self.assets.font()),
            header,
        };

        let rendered = tokio::task::spawn_blocking(move || render_pages(&plan, &slots, &request))
            .await
            .map_err(|e| MergeError::Task(e.to_string()))??;

        let mut pages = Vec::with_capacity(rendered.len());
        let mut page_metrics = Vec::with_capacity(rendered.len());
        for page in rendered {
            pages.push(page.bytes);
            page_metrics.push(page.metrics);
        }
        let metrics = MergeMetrics::from_pages(page_metrics, failed_loads);
        tracing::info!(
            pages = pages.len(),
            failed_loads,
            bytes = metrics.total_bytes,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "merge finished"
        );
        Ok(MergeOutput { pages, metrics })
    }
}

struct RenderRequest {
    element_width: f64,
    element_height: f64,
    element_margin: f64,
    outer_margin: f64,
    max_out: f64,
    header_coef: Option<f64>,
    background: Option<Arc<Pixmap>>,
    header: Option<String>,
    font: Option<HeaderFont>,
}

// Pages share nothing mutable, so they render in parallel; collect keeps order.
fn render_pages(
    plan: &PagePlan,
    slots: &[Slot],
    request: &RenderRequest,
) -> Result<Vec<RenderedPage>> {
    let offsets = plan.page_offsets();
    let page_count = plan.len();
    plan.pages
        .par_iter()
        .zip(offsets.par_iter())
        .enumerate()
        .map(|(index, (grid, &offset))| {
            let geometry = PageGeometry::compute(
                grid,
                request.element_width,
                request.element_height,
                request.element_margin,
                request.outer_margin,
                request.max_out,
                request.header_coef,
            );
            render_page(&PageJob {
                index,
                page_count,
                grid: *grid,
                geometry,
                slots: &slots[offset..offset + grid.element_count],
                background: request.background.as_deref(),
                header: request.header.as_deref(),
                font: request.font.as_ref(),
            })
        })
        .collect()
}

/// Fluent construction of a [`Merger`].
#[derive(Debug, Clone, Default)]
pub struct MergerBuilder {
    config: MergerConfig,
}

impl MergerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: MergerConfig) -> Self {
        Self { config }
    }

    pub fn add_background(mut self, enabled: bool) -> Self {
        self.config.add_background = enabled;
        self
    }

    pub fn max_pages_count(mut self, count: usize) -> Self {
        self.config.max_pages_count = count;
        self
    }

    // Minimum elements per page; wins over max_pages_count.
    pub fn trigger_split_count(mut self, count: usize) -> Self {
        self.config.trigger_split_count = count;
        self
    }

    pub fn max_out_dimension(mut self, pixels: f64) -> Self {
        self.config.max_out_dimension = pixels;
        self
    }

    pub fn header_coef(mut self, coef: f64) -> Self {
        self.config.header_coef = coef;
        self
    }

    pub fn el_margin(mut self, fraction: f64) -> Self {
        self.config.el_margin = fraction;
        self
    }

    pub fn outer_margin(mut self, fraction: f64) -> Self {
        self.config.outer_margin = fraction;
        self
    }

    pub fn header(mut self, text: impl Into<String>) -> Self {
        self.config.header = Some(text.into());
        self
    }

    // Path, URL or data URI.
    pub fn background(mut self, source: impl Into<String>) -> Self {
        self.config.background_source = Some(source.into());
        self.config.add_background = true;
        self
    }

    pub fn font(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.font_source = Some(path.into());
        self
    }

    pub fn build(self) -> Result<Merger> {
        Merger::new(self.config)
    }
}
