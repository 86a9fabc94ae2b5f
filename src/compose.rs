use crate::error::{DrawError, MergeError};
use crate::font::HeaderFont;
use crate::grid::Grid;
use crate::header::{header_text, render_header};
use crate::metrics::PageMetrics;
use crate::source::Slot;
use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;
use std::time::Instant;
use tiny_skia::{FilterQuality, Pixmap, PixmapPaint, Transform};

pub const JPEG_QUALITY: u8 = 85;

/// Converts a margin given as a fraction of the average element dimension
/// into whole pixels.
pub fn margin_px(fraction: f64, element_width: f64, element_height: f64) -> f64 {
    ((element_width + element_height) / 2.0 * fraction).ceil()
}

/// Scaled layout of one page. All values are output pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f64,
    pub height: f64,
    pub element_width: f64,
    pub element_height: f64,
    pub element_margin: f64,
    pub outer_margin: f64,
    /// Top edge of the element area, below the header band if any.
    pub area_top: f64,
    pub header_height: Option<f64>,
}

impl PageGeometry {
    /// Scales the unscaled page box so its larger side equals `max_out`, then
    /// reserves `header_coef * (width + height) / 2` on top when a header is
    /// requested. Margins are already in unscaled pixels.
    pub fn compute(
        grid: &Grid,
        element_width: f64,
        element_height: f64,
        element_margin: f64,
        outer_margin: f64,
        max_out: f64,
        header_coef: Option<f64>,
    ) -> Self {
        let pre_width =
            outer_margin * 2.0 + grid.columns as f64 * (element_width + element_margin * 2.0);
        let pre_height =
            outer_margin * 2.0 + grid.rows as f64 * (element_height + element_margin * 2.0);
        let aspect = pre_width / pre_height;
        let (width, mut height) = if aspect >= 1.0 {
            (max_out, max_out / aspect)
        } else {
            (max_out * aspect, max_out)
        };
        let mult = width / pre_width;
        let scaled_outer = mult * outer_margin;

        let header_height = header_coef.map(|coef| (width + height) / 2.0 * coef);
        let mut area_top = scaled_outer;
        if let Some(extra) = header_height {
            area_top += extra;
            height += extra;
        }

        Self {
            width,
            height,
            element_width: mult * element_width,
            element_height: mult * element_height,
            element_margin: mult * element_margin,
            outer_margin: scaled_outer,
            area_top,
            header_height,
        }
    }

    /// Surface size in whole pixels, never zero.
    pub fn pixel_size(&self) -> (u32, u32) {
        (to_px(self.width), to_px(self.height))
    }

    /// Top-left corner of the element drawn at `column`, `row`.
    pub fn cell_origin(&self, column: usize, row: usize) -> (f64, f64) {
        let x = self.outer_margin
            + column as f64 * (self.element_width + self.element_margin * 2.0)
            + self.element_margin;
        let y = self.area_top
            + row as f64 * (self.element_height + self.element_margin * 2.0)
            + self.element_margin;
        (x, y)
    }

    /// Vertical offset of the header band.
    pub fn header_top(&self) -> f64 {
        (self.outer_margin + self.element_margin) / 2.0
    }
}

fn to_px(value: f64) -> u32 {
    if value.is_finite() && value >= 1.0 {
        // absorb float noise such as 499.99999999999994
        (value + 1e-6).floor().min(u32::MAX as f64) as u32
    } else {
        1
    }
}

/// Everything needed to paint one page.
pub struct PageJob<'a> {
    pub index: usize,
    pub page_count: usize,
    pub grid: Grid,
    pub geometry: PageGeometry,
    /// The slots placed on this page, in row-major order.
    pub slots: &'a [Slot],
    pub background: Option<&'a Pixmap>,
    pub header: Option<&'a str>,
    pub font: Option<&'a HeaderFont>,
}

pub struct RenderedPage {
    pub bytes: Vec<u8>,
    pub metrics: PageMetrics,
}

pub fn render_page(job: &PageJob<'_>) -> Result<RenderedPage, MergeError> {
    let start = Instant::now();
    let geometry = &job.geometry;
    let (px_w, px_h) = geometry.pixel_size();
    let mut canvas = Pixmap::new(px_w, px_h).ok_or_else(|| {
        MergeError::invalid(format!("invalid page size {px_w}x{px_h}"))
    })?;

    if let Some(background) = job.background {
        draw_stretched(&mut canvas, background);
    }

    if let (Some(header), Some(band)) = (job.header, geometry.header_height) {
        let text = header_text(header, job.index, job.page_count);
        if let Some(rendered) = render_header(&text, geometry.width as f32, band as f32, job.font) {
            canvas.draw_pixmap(
                0,
                0,
                rendered.pixmap.as_ref(),
                &PixmapPaint::default(),
                Transform::from_translate(0.0, geometry.header_top() as f32),
                None,
            );
        }
    }

    let mut drawn = 0usize;
    let mut blank = 0usize;
    for (offset, slot) in job.slots.iter().enumerate().take(job.grid.element_count) {
        let (column, row) = job.grid.cell(offset);
        let Some(element) = slot else {
            blank += 1;
            continue;
        };
        let (x, y) = geometry.cell_origin(column, row);
        match draw_element(
            &mut canvas,
            element,
            x as f32,
            y as f32,
            geometry.element_width as f32,
            geometry.element_height as f32,
        ) {
            Ok(()) => drawn += 1,
            Err(err) => {
                tracing::warn!(page = job.index + 1, column, row, error = %err, "error drawing element; its cell will be blank");
                blank += 1;
            }
        }
    }

    let bytes = encode_jpeg(&canvas, JPEG_QUALITY)?;
    let metrics = PageMetrics {
        page_number: job.index + 1,
        columns: job.grid.columns,
        rows: job.grid.rows,
        width: px_w,
        height: px_h,
        drawn,
        blank,
        render_ms: start.elapsed().as_secs_f64() * 1000.0,
        bytes: bytes.len(),
    };
    tracing::debug!(
        page = metrics.page_number,
        columns = metrics.columns,
        rows = metrics.rows,
        width = px_w,
        height = px_h,
        drawn,
        blank,
        "page rendered"
    );
    Ok(RenderedPage { bytes, metrics })
}

/// Paints `element` scaled into the `width` x `height` box at `x`, `y`.
pub fn draw_element(
    canvas: &mut Pixmap,
    element: &Pixmap,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
) -> Result<(), DrawError> {
    let valid = [x, y, width, height].iter().all(|v| v.is_finite()) && width > 0.0 && height > 0.0;
    if !valid {
        return Err(DrawError::InvalidPlacement {
            x,
            y,
            width,
            height,
        });
    }
    let src_w = element.width() as f32;
    let src_h = element.height() as f32;
    if src_w <= 0.0 || src_h <= 0.0 {
        return Err(DrawError::EmptySurface);
    }
    let transform = Transform::from_row(width / src_w, 0.0, 0.0, height / src_h, x, y);
    let paint = PixmapPaint {
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };
    canvas.draw_pixmap(0, 0, element.as_ref(), &paint, transform, None);
    Ok(())
}

fn draw_stretched(canvas: &mut Pixmap, background: &Pixmap) {
    let sx = canvas.width() as f32 / background.width() as f32;
    let sy = canvas.height() as f32 / background.height() as f32;
    let paint = PixmapPaint {
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };
    canvas.draw_pixmap(
        0,
        0,
        background.as_ref(),
        &paint,
        Transform::from_scale(sx, sy),
        None,
    );
}

/// Encodes the surface as baseline JPEG. Premultiplied colour is already the
/// colour composited over black, so transparent areas come out black.
pub fn encode_jpeg(canvas: &Pixmap, quality: u8) -> Result<Vec<u8>, MergeError> {
    let mut rgb = Vec::with_capacity(canvas.width() as usize * canvas.height() as usize * 3);
    for px in canvas.data().chunks_exact(4) {
        rgb.extend_from_slice(&px[..3]);
    }
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode(&rgb, canvas.width(), canvas.height(), ExtendedColorType::Rgb8)
        .map_err(|e| MergeError::Encode(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Pixmap {
        let mut pixmap = Pixmap::new(width, height).unwrap();
        pixmap.fill(tiny_skia::Color::from_rgba8(rgba[0], rgba[1], rgba[2], rgba[3]));
        pixmap
    }

    #[test]
    fn margins_round_up_from_average_dimension() {
        assert_eq!(margin_px(0.0, 100.0, 100.0), 0.0);
        assert_eq!(margin_px(0.5, 100.0, 60.0), 40.0);
        assert_eq!(margin_px(0.03, 100.0, 100.0), 3.0);
        assert_eq!(margin_px(0.031, 100.0, 100.0), 4.0);
    }

    #[test]
    fn landscape_page_fills_max_width() {
        let grid = Grid::solve(10, 100.0, 100.0);
        let geo = PageGeometry::compute(&grid, 100.0, 100.0, 0.0, 0.0, 500.0, None);
        assert_eq!(geo.pixel_size(), (500, 375));
        assert!((geo.element_width - 125.0).abs() < 1e-9);
        assert_eq!(geo.cell_origin(3, 2), (375.0, 250.0));
        assert_eq!(geo.header_height, None);
    }

    #[test]
    fn portrait_page_fills_max_height() {
        let grid = Grid::solve(6, 100.0, 300.0);
        // aspect 1/3: ceil(sqrt(18)) = 5 columns, 2 rows -> 500 x 600 unscaled
        assert_eq!((grid.columns, grid.rows), (5, 2));
        let geo = PageGeometry::compute(&grid, 100.0, 300.0, 0.0, 0.0, 600.0, None);
        assert_eq!(geo.pixel_size(), (500, 600));
    }

    #[test]
    fn margins_scale_with_the_page() {
        let grid = Grid::solve(4, 100.0, 100.0);
        // 2x2, element margin 10, outer margin 20 -> 2*20 + 2*(100+20) = 280
        let geo = PageGeometry::compute(&grid, 100.0, 100.0, 10.0, 20.0, 560.0, None);
        assert!((geo.element_width - 200.0).abs() < 1e-9);
        assert!((geo.element_margin - 20.0).abs() < 1e-9);
        assert!((geo.outer_margin - 40.0).abs() < 1e-9);
        assert_eq!(geo.cell_origin(1, 1), (40.0 + 240.0 + 20.0, 40.0 + 240.0 + 20.0));
    }

    #[test]
    fn header_band_extends_height() {
        let grid = Grid::solve(10, 100.0, 100.0);
        let geo = PageGeometry::compute(&grid, 100.0, 100.0, 0.0, 0.0, 500.0, Some(0.1));
        // (500 + 375) / 2 * 0.1 = 43.75
        let band = geo.header_height.unwrap();
        assert!((band - 43.75).abs() < 1e-9);
        assert_eq!(geo.pixel_size(), (500, 418));
        let (x, y) = geo.cell_origin(0, 0);
        assert_eq!(x, 0.0);
        assert!((y - 43.75).abs() < 1e-9);
    }

    #[test]
    fn draw_element_rejects_degenerate_boxes() {
        let mut canvas = Pixmap::new(10, 10).unwrap();
        let element = solid(2, 2, [255, 0, 0, 255]);
        assert!(matches!(
            draw_element(&mut canvas, &element, 0.0, 0.0, 0.0, 5.0),
            Err(DrawError::InvalidPlacement { .. })
        ));
        assert!(matches!(
            draw_element(&mut canvas, &element, f32::NAN, 0.0, 5.0, 5.0),
            Err(DrawError::InvalidPlacement { .. })
        ));
        assert!(canvas.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn draw_element_scales_into_cell() {
        let mut canvas = Pixmap::new(10, 10).unwrap();
        let element = solid(2, 2, [255, 0, 0, 255]);
        draw_element(&mut canvas, &element, 2.0, 2.0, 6.0, 6.0).unwrap();
        let inside = canvas.pixel(5, 5).unwrap();
        assert_eq!((inside.red(), inside.alpha()), (255, 255));
        assert_eq!(canvas.pixel(0, 0).unwrap().alpha(), 0);
        assert_eq!(canvas.pixel(9, 9).unwrap().alpha(), 0);
    }

    #[test]
    fn render_page_leaves_unresolved_slots_blank() {
        let element = Arc::new(solid(10, 10, [0, 0, 255, 255]));
        let slots: Vec<Slot> = vec![
            Some(element.clone()),
            None,
            Some(element.clone()),
            Some(element.clone()),
            Some(element),
        ];
        let grid = Grid::solve(slots.len(), 10.0, 10.0);
        let geometry = PageGeometry::compute(&grid, 10.0, 10.0, 0.0, 0.0, 120.0, None);
        let page = render_page(&PageJob {
            index: 0,
            page_count: 1,
            grid,
            geometry,
            slots: &slots,
            background: None,
            header: None,
            font: None,
        })
        .unwrap();
        assert_eq!(page.metrics.drawn, 4);
        assert_eq!(page.metrics.blank, 1);
        let decoded = image::load_from_memory(&page.bytes).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (120, 80));
        // second cell (column 1, row 0) stays black, first is blue
        let blank = decoded.get_pixel(60, 20).0;
        let filled = decoded.get_pixel(20, 20).0;
        assert!(blank.iter().all(|&c| c < 30), "{blank:?}");
        assert!(filled[2] > 200, "{filled:?}");
    }

    #[test]
    fn background_fills_the_whole_page() {
        let background = solid(3, 3, [0, 255, 0, 255]);
        let slots: Vec<Slot> = vec![None];
        let grid = Grid::solve(1, 10.0, 10.0);
        let geometry = PageGeometry::compute(&grid, 10.0, 10.0, 0.0, 1.0, 64.0, None);
        let page = render_page(&PageJob {
            index: 0,
            page_count: 1,
            grid,
            geometry,
            slots: &slots,
            background: Some(&background),
            header: None,
            font: None,
        })
        .unwrap();
        let decoded = image::load_from_memory(&page.bytes).unwrap().to_rgb8();
        let corner = decoded.get_pixel(1, 1).0;
        assert!(corner[1] > 200 && corner[0] < 40, "{corner:?}");
    }

    #[test]
    fn encoded_output_is_jpeg() {
        let canvas = solid(8, 4, [10, 20, 30, 255]);
        let bytes = encode_jpeg(&canvas, JPEG_QUALITY).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(
            image::guess_format(&bytes).unwrap(),
            image::ImageFormat::Jpeg
        );
    }
}
