use crate::error::FontError;
use rustybuzz::{Direction as HbDirection, Face as HbFace, UnicodeBuffer};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tiny_skia::{Path as SkPath, PathBuilder};
use ttf_parser::{GlyphId, OutlineBuilder};

// Width estimate per character when no font program is available.
const FALLBACK_CHAR_WIDTH: f32 = 0.6;

/// A parsed font program used to measure and outline header text.
#[derive(Debug, Clone)]
pub struct HeaderFont {
    name: String,
    data: Arc<Vec<u8>>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct GlyphPlacement {
    pub glyph_id: u16,
    pub x: f32,
    pub y: f32,
}

/// Shaped run at a given size: glyph pen positions relative to the baseline
/// origin plus the total advance.
#[derive(Debug, Clone, Default)]
pub(crate) struct ShapedRun {
    pub glyphs: Vec<GlyphPlacement>,
    pub advance: f32,
    pub scale: f32,
}

impl HeaderFont {
    pub fn from_bytes(data: Vec<u8>, source: &str) -> Result<Self, FontError> {
        let Ok(face) = ttf_parser::Face::parse(&data, 0) else {
            return Err(FontError::Invalid(source.to_string()));
        };
        let name = family_name(&face).unwrap_or_else(|| source.to_string());
        Ok(Self {
            name,
            data: Arc::new(data),
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FontError> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        Self::from_bytes(data, &path.display().to_string())
    }

    /// First usable sans-serif font found in the platform font directories.
    /// Looked up once per process.
    pub fn system_default() -> Option<Self> {
        static SYSTEM_DEFAULT: OnceLock<Option<HeaderFont>> = OnceLock::new();
        SYSTEM_DEFAULT
            .get_or_init(load_system_sans)
            .as_ref()
            .cloned()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn measure(&self, text: &str, font_size: f32) -> f32 {
        self.shape(text, font_size).advance
    }

    pub(crate) fn shape(&self, text: &str, font_size: f32) -> ShapedRun {
        let Some(face) = HbFace::from_slice(&self.data, 0) else {
            return self.shape_unshaped(text, font_size);
        };
        let units = face.units_per_em().max(1) as f32;
        let scale = font_size / units;
        let mut buffer = UnicodeBuffer::new();
        buffer.set_direction(detect_direction(text));
        buffer.push_str(text);
        let output = rustybuzz::shape(&face, &[], buffer);
        let infos = output.glyph_infos();
        let positions = output.glyph_positions();
        if infos.len() != positions.len() {
            return self.shape_unshaped(text, font_size);
        }

        let mut run = ShapedRun {
            glyphs: Vec::with_capacity(infos.len()),
            advance: 0.0,
            scale,
        };
        for (info, pos) in infos.iter().zip(positions.iter()) {
            let gid = info.glyph_id as u16;
            if gid != 0 {
                run.glyphs.push(GlyphPlacement {
                    glyph_id: gid,
                    x: run.advance + pos.x_offset as f32 * scale,
                    y: pos.y_offset as f32 * scale,
                });
            }
            run.advance += pos.x_advance as f32 * scale;
        }
        run
    }

    fn shape_unshaped(&self, text: &str, font_size: f32) -> ShapedRun {
        let Ok(face) = ttf_parser::Face::parse(&self.data, 0) else {
            return ShapedRun {
                advance: estimate_width(text, font_size),
                ..ShapedRun::default()
            };
        };
        let units = face.units_per_em().max(1) as f32;
        let scale = font_size / units;
        let mut run = ShapedRun {
            scale,
            ..ShapedRun::default()
        };
        for ch in text.chars() {
            let gid = face.glyph_index(ch).map(|id| id.0).unwrap_or(0);
            if gid == 0 {
                run.advance += font_size * 0.5;
                continue;
            }
            run.glyphs.push(GlyphPlacement {
                glyph_id: gid,
                x: run.advance,
                y: 0.0,
            });
            let mut adv = face.glyph_hor_advance(GlyphId(gid)).unwrap_or(0) as f32 * scale;
            if adv <= 0.0 {
                adv = font_size * 0.5;
            }
            run.advance += adv;
        }
        run
    }

    /// Outlines of a shaped run in y-down space, baseline at y = 0.
    pub(crate) fn outline(&self, run: &ShapedRun) -> Option<SkPath> {
        let face = ttf_parser::Face::parse(&self.data, 0).ok()?;
        let mut builder = GlyphPathBuilder::new(PathBuilder::new(), run.scale);
        for glyph in &run.glyphs {
            builder.origin_x = glyph.x;
            builder.origin_y = -glyph.y;
            face.outline_glyph(GlyphId(glyph.glyph_id), &mut builder);
        }
        builder.builder.finish()
    }
}

/// Width of `text` at `font_size`, estimated when no font is present.
pub fn measure_text(font: Option<&HeaderFont>, text: &str, font_size: f32) -> f32 {
    match font {
        Some(font) => font.measure(text, font_size),
        None => estimate_width(text, font_size),
    }
}

fn estimate_width(text: &str, font_size: f32) -> f32 {
    (font_size * FALLBACK_CHAR_WIDTH).max(1.0) * text.chars().count() as f32
}

fn family_name(face: &ttf_parser::Face<'_>) -> Option<String> {
    face.names()
        .into_iter()
        .filter(|name| {
            name.name_id == ttf_parser::name_id::FULL_NAME
                || name.name_id == ttf_parser::name_id::FAMILY
        })
        .find_map(|name| name.to_string())
        .filter(|name| !name.trim().is_empty())
}

fn detect_direction(text: &str) -> HbDirection {
    for ch in text.chars() {
        let code = ch as u32;
        let rtl = matches!(
            code,
            0x0590..=0x08FF | 0xFB1D..=0xFDFF | 0xFE70..=0xFEFF | 0x1EE00..=0x1EEFF
        );
        if rtl {
            return HbDirection::RightToLeft;
        }
    }
    HbDirection::LeftToRight
}

struct GlyphPathBuilder {
    builder: PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(builder: PathBuilder, scale: f32) -> Self {
        Self {
            builder,
            origin_x: 0.0,
            origin_y: 0.0,
            scale,
        }
    }

    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        // font units are y-up, the surface is y-down
        (self.origin_x + x * self.scale, self.origin_y - y * self.scale)
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

const SANS_CANDIDATES: &[&str] = &[
    "DejaVuSans.ttf",
    "LiberationSans-Regular.ttf",
    "NotoSans-Regular.ttf",
    "arial.ttf",
    "Arial.ttf",
    "segoeui.ttf",
    "Helvetica.ttc",
    "FreeSans.ttf",
];

fn load_system_sans() -> Option<HeaderFont> {
    let files = collect_font_files(&system_font_dirs(), 3);
    for candidate in SANS_CANDIDATES {
        for path in &files {
            let matches = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.eq_ignore_ascii_case(candidate));
            if !matches {
                continue;
            }
            if let Ok(font) = HeaderFont::from_file(path) {
                tracing::debug!(font = font.name(), path = %path.display(), "using system header font");
                return Some(font);
            }
        }
    }
    None
}

fn collect_font_files(dirs: &[PathBuf], depth: usize) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for dir in dirs {
        let Ok(entries) = std::fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if depth > 0 {
                    out.extend(collect_font_files(&[path], depth - 1));
                }
            } else if path.is_file() {
                out.push(path);
            }
        }
    }
    out
}

fn system_font_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(extra) = std::env::var("TILEMERGE_FONT_DIR") {
        for path in std::env::split_paths(&extra) {
            if !path.as_os_str().is_empty() {
                dirs.push(path);
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        dirs.push(PathBuf::from(r"C:\Windows\Fonts"));
        if let Ok(windir) = std::env::var("WINDIR") {
            dirs.push(PathBuf::from(windir).join("Fonts"));
        }
    }

    #[cfg(target_os = "linux")]
    {
        dirs.push(PathBuf::from("/usr/share/fonts"));
        dirs.push(PathBuf::from("/usr/local/share/fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join(".fonts"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        dirs.push(PathBuf::from("/System/Library/Fonts"));
        dirs.push(PathBuf::from("/Library/Fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join("Library/Fonts"));
        }
    }

    dirs
}
