use crate::error::LoadError;
use base64::Engine;
use futures::future::join_all;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tiny_skia::Pixmap;

/// Anything `merge` can place into a cell: a reference still to be
/// resolved, or a surface that is already drawable.
#[derive(Clone)]
pub enum ImageSource {
    Path(PathBuf),
    Url(String),
    Encoded(Vec<u8>),
    Surface(Arc<Pixmap>),
}

impl ImageSource {
    pub fn is_resolved(&self) -> bool {
        matches!(self, ImageSource::Surface(_))
    }

    /// Reads, fetches and decodes the source into a premultiplied surface.
    pub async fn resolve(self) -> Result<Arc<Pixmap>, LoadError> {
        let bytes = match self {
            ImageSource::Surface(pixmap) => return Ok(pixmap),
            ImageSource::Path(path) => tokio::fs::read(&path).await?,
            ImageSource::Url(url) => fetch(&url).await?,
            ImageSource::Encoded(bytes) => bytes,
        };
        let pixmap = tokio::task::spawn_blocking(move || decode_image_to_pixmap(&bytes))
            .await
            .map_err(|e| LoadError::Decode(format!("decode task failed: {e}")))??;
        Ok(Arc::new(pixmap))
    }
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Path(path) => write!(f, "Path({})", path.display()),
            ImageSource::Url(url) => write!(f, "Url({url})"),
            ImageSource::Encoded(bytes) => write!(f, "Encoded({} bytes)", bytes.len()),
            ImageSource::Surface(pixmap) => {
                write!(f, "Surface({}x{})", pixmap.width(), pixmap.height())
            }
        }
    }
}

impl From<&str> for ImageSource {
    fn from(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with("data:") {
            return match parse_data_uri(trimmed) {
                Some((_mime, data)) => ImageSource::Encoded(data),
                // undecodable payloads fail later at the decode step
                None => ImageSource::Encoded(Vec::new()),
            };
        }
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return ImageSource::Url(trimmed.to_string());
        }
        ImageSource::Path(PathBuf::from(trimmed))
    }
}

impl From<String> for ImageSource {
    fn from(raw: String) -> Self {
        ImageSource::from(raw.as_str())
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::Path(path)
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        ImageSource::Encoded(bytes)
    }
}

impl From<Pixmap> for ImageSource {
    fn from(pixmap: Pixmap) -> Self {
        ImageSource::Surface(Arc::new(pixmap))
    }
}

impl From<Arc<Pixmap>> for ImageSource {
    fn from(pixmap: Arc<Pixmap>) -> Self {
        ImageSource::Surface(pixmap)
    }
}

/// One input position after the load phase. `None` renders as a blank cell.
pub type Slot = Option<Arc<Pixmap>>;

/// Resolves every source concurrently. A failed source is logged and leaves
/// its slot empty; it never cancels its siblings.
pub async fn load_all(sources: Vec<ImageSource>) -> Vec<Slot> {
    let futures = sources.into_iter().enumerate().map(|(index, source)| async move {
        let label = format!("{source:?}");
        match source.resolve().await {
            Ok(pixmap) => Some(pixmap),
            Err(err) => {
                tracing::warn!(slot = index, source = %label, error = %err, "element failed to load; its cell will be blank");
                None
            }
        }
    });
    join_all(futures).await
}

#[cfg(feature = "remote")]
async fn fetch(url: &str) -> Result<Vec<u8>, LoadError> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| LoadError::Remote(e.to_string()))?
        .error_for_status()
        .map_err(|e| LoadError::Remote(e.to_string()))?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| LoadError::Remote(e.to_string()))?;
    Ok(bytes.to_vec())
}

#[cfg(not(feature = "remote"))]
async fn fetch(_url: &str) -> Result<Vec<u8>, LoadError> {
    Err(LoadError::RemoteUnsupported)
}

pub(crate) fn decode_image_to_pixmap(data: &[u8]) -> Result<Pixmap, LoadError> {
    let decoded = image::load_from_memory(data).map_err(|e| LoadError::Decode(e.to_string()))?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut pixmap = Pixmap::new(width, height).ok_or(LoadError::EmptySurface)?;
    let src = rgba.as_raw();
    let dst = pixmap.data_mut();
    for (src_px, dst_px) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        let a = src_px[3];
        dst_px[0] = premul_u8(src_px[0], a);
        dst_px[1] = premul_u8(src_px[1], a);
        dst_px[2] = premul_u8(src_px[2], a);
        dst_px[3] = a;
    }
    Ok(pixmap)
}

fn premul_u8(channel: u8, alpha: u8) -> u8 {
    let prod = (channel as u16) * (alpha as u16) + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}

fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let (header, payload) = uri.strip_prefix("data:")?.split_once(',')?;
    let mime = header
        .split(';')
        .next()
        .filter(|v| !v.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = if header.contains(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .ok()?
    } else {
        payload.as_bytes().to_vec()
    };
    Some((mime, data))
}
