use crate::font::{HeaderFont, measure_text};
use tiny_skia::{Color, FillRule, Paint, Pixmap, PixmapPaint, Transform};

pub(crate) const START_SIZE_RATIO: f32 = 0.7;
pub(crate) const WIDTH_BUDGET_RATIO: f32 = 0.8;
pub(crate) const SIZE_STEP: f32 = 2.0;
pub(crate) const MIN_FONT_SIZE: f32 = 4.0;
const BASELINE_RATIO: f32 = 0.35;
const SHADOW_BLUR_RATIO: f32 = 1.0 / 12.0;

/// Shrinks from `0.7 * box_height` in steps of 2 until the measured width
/// fits `0.8 * box_width`, never going below the floor of 4.
///
/// A start size already at or under the floor is returned unchanged.
pub fn fit_font_size(box_width: f32, box_height: f32, measure: impl Fn(f32) -> f32) -> f32 {
    let budget = WIDTH_BUDGET_RATIO * box_width;
    let mut size = START_SIZE_RATIO * box_height;
    while size > MIN_FONT_SIZE && measure(size) > budget {
        size = (size - SIZE_STEP).max(MIN_FONT_SIZE);
    }
    size
}

/// Text of the header band for `page_index` (0-based) out of `page_count`.
pub fn header_text(header: &str, page_index: usize, page_count: usize) -> String {
    if page_count > 1 {
        format!("{header} [{}/{}]", page_index + 1, page_count)
    } else {
        header.to_string()
    }
}

/// Rendered header band.
pub struct RenderedHeader {
    pub pixmap: Pixmap,
    pub font_size: f32,
}

/// Draws `text` centred in a `width` x `height` transparent surface: white
/// fill over a soft black shadow. Returns `None` only if the box has no
/// pixels.
pub fn render_header(
    text: &str,
    width: f32,
    height: f32,
    font: Option<&HeaderFont>,
) -> Option<RenderedHeader> {
    let px_w = width.floor().max(1.0) as u32;
    let px_h = height.floor().max(1.0) as u32;
    let mut pixmap = Pixmap::new(px_w, px_h)?;

    let font_size = fit_font_size(width, height, |size| measure_text(font, text, size));
    let Some(font) = font else {
        tracing::debug!(text, "no header font available; band left without text");
        return Some(RenderedHeader { pixmap, font_size });
    };

    let run = font.shape(text, font_size);
    let Some(path) = font.outline(&run) else {
        return Some(RenderedHeader { pixmap, font_size });
    };

    // condense horizontally like canvas fillText with a max width
    let max_width = width * WIDTH_BUDGET_RATIO;
    let squeeze = if run.advance > max_width && run.advance > 0.0 {
        max_width / run.advance
    } else {
        1.0
    };
    let left = width / 2.0 - run.advance * squeeze / 2.0;
    let baseline = height / 2.0 + font_size * BASELINE_RATIO;
    let transform = Transform::from_row(squeeze, 0.0, 0.0, 1.0, left, baseline);

    let blur = font_size * SHADOW_BLUR_RATIO;
    if let Some(mut shadow) = Pixmap::new(px_w, px_h) {
        shadow.fill_path(&path, &solid(Color::BLACK), FillRule::Winding, transform, None);
        box_blur(&mut shadow, blur / 2.0);
        pixmap.draw_pixmap(
            0,
            0,
            shadow.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }
    pixmap.fill_path(&path, &solid(Color::WHITE), FillRule::Winding, transform, None);

    Some(RenderedHeader { pixmap, font_size })
}

fn solid(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(color);
    paint.anti_alias = true;
    paint
}

/// Approximates a gaussian of `sigma` with three box passes per axis.
fn box_blur(pixmap: &mut Pixmap, sigma: f32) {
    let radius = sigma.ceil() as usize;
    if radius == 0 {
        return;
    }
    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let data = pixmap.data_mut();
    let mut scratch = vec![0u8; data.len()];
    for _ in 0..3 {
        blur_pass(data, &mut scratch, width, height, radius, true);
        blur_pass(&scratch, data, width, height, radius, false);
    }
}

fn blur_pass(
    src: &[u8],
    dst: &mut [u8],
    width: usize,
    height: usize,
    radius: usize,
    horizontal: bool,
) {
    let (lines, len) = if horizontal {
        (height, width)
    } else {
        (width, height)
    };
    let index = |line: usize, pos: usize| -> usize {
        if horizontal {
            (line * width + pos) * 4
        } else {
            (pos * width + line) * 4
        }
    };
    let window = (2 * radius + 1) as u32;
    for line in 0..lines {
        for channel in 0..4 {
            let mut sum: u32 = 0;
            for offset in 0..=radius {
                if offset < len {
                    sum += src[index(line, offset) + channel] as u32;
                }
            }
            for pos in 0..len {
                dst[index(line, pos) + channel] = (sum / window) as u8;
                let add = pos + radius + 1;
                if add < len {
                    sum += src[index(line, add) + channel] as u32;
                }
                if pos >= radius {
                    sum -= src[index(line, pos - radius) + channel] as u32;
                }
            }
        }
    }
}
