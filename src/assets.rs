use crate::font::HeaderFont;
use crate::source::ImageSource;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tiny_skia::Pixmap;
use tokio::sync::watch;

/// Background and header font shared by every merge of one merger.
///
/// Filled at most once by a detached loader. Readers only ever peek, so an
/// asset that is still loading looks exactly like one that failed.
#[derive(Debug)]
pub(crate) struct SharedAssets {
    background: OnceLock<Arc<Pixmap>>,
    font: OnceLock<HeaderFont>,
    settled: watch::Sender<bool>,
}

impl SharedAssets {
    pub fn new() -> Arc<Self> {
        let (settled, _) = watch::channel(false);
        Arc::new(Self {
            background: OnceLock::new(),
            font: OnceLock::new(),
            settled,
        })
    }

    pub fn background(&self) -> Option<Arc<Pixmap>> {
        self.background.get().cloned()
    }

    /// Configured font if it loaded, otherwise the platform's default sans.
    pub fn font(&self) -> Option<HeaderFont> {
        self.font.get().cloned().or_else(HeaderFont::system_default)
    }

    pub fn is_settled(&self) -> bool {
        *self.settled.borrow()
    }

    pub async fn wait_settled(&self) {
        let mut rx = self.settled.subscribe();
        // the sender lives in self, so the channel cannot close while we wait
        let _ = rx.wait_for(|settled| *settled).await;
    }

    fn mark_settled(&self) {
        self.settled.send_replace(true);
    }
}

/// What the detached loader should fetch.
#[derive(Debug, Clone, Default)]
pub(crate) struct AssetRequest {
    pub background: Option<String>,
    pub font: Option<PathBuf>,
}

/// Starts loading without waiting for it. Uses the ambient tokio runtime when
/// there is one, otherwise a private runtime on a helper thread.
pub(crate) fn spawn_loader(assets: Arc<SharedAssets>, request: AssetRequest) {
    if request.background.is_none() && request.font.is_none() {
        assets.mark_settled();
        return;
    }
    let task = load_assets(assets.clone(), request);
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(task);
        }
        Err(_) => {
            let fallback = assets.clone();
            let spawned = std::thread::Builder::new()
                .name("tilemerge-assets".to_string())
                .spawn(move || {
                    match tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                    {
                        Ok(runtime) => runtime.block_on(task),
                        Err(err) => {
                            tracing::warn!(error = %err, "could not start asset loader runtime");
                            assets.mark_settled();
                        }
                    }
                });
            if let Err(err) = spawned {
                tracing::warn!(error = %err, "could not start asset loader thread");
                fallback.mark_settled();
            }
        }
    }
}

async fn load_assets(assets: Arc<SharedAssets>, request: AssetRequest) {
    if let Some(source) = request.background {
        match ImageSource::from(source.as_str()).resolve().await {
            Ok(pixmap) => {
                let _ = assets.background.set(pixmap);
            }
            Err(err) => tracing::warn!(source = %source, error = %err, "could not load background"),
        }
    }

    if let Some(path) = request.font {
        let loaded = tokio::task::spawn_blocking({
            let path = path.clone();
            move || HeaderFont::from_file(&path)
        })
        .await;
        match loaded {
            Ok(Ok(font)) => {
                tracing::debug!(font = font.name(), "header font registered");
                let _ = assets.font.set(font);
            }
            Ok(Err(err)) => {
                tracing::warn!(path = %path.display(), error = %err, "could not load font")
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "could not load font")
            }
        }
    }

    assets.mark_settled();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn nothing_requested_settles_immediately() {
        let assets = SharedAssets::new();
        spawn_loader(assets.clone(), AssetRequest::default());
        assert!(assets.is_settled());
        assert!(assets.background().is_none());
    }

    #[tokio::test]
    async fn failed_loads_settle_without_assets() {
        let assets = SharedAssets::new();
        spawn_loader(
            assets.clone(),
            AssetRequest {
                background: Some("/nonexistent/bg.png".to_string()),
                font: Some(PathBuf::from("/nonexistent/font.ttf")),
            },
        );
        assets.wait_settled().await;
        assert!(assets.background().is_none());
        assert!(assets.font.get().is_none());
    }

    #[test]
    fn loads_without_an_ambient_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bg.png");
        image::RgbaImage::from_pixel(2, 3, image::Rgba([9, 9, 9, 255]))
            .save(&path)
            .unwrap();
        let assets = SharedAssets::new();
        spawn_loader(
            assets.clone(),
            AssetRequest {
                background: Some(path.display().to_string()),
                font: None,
            },
        );
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(assets.wait_settled());
        let background = assets.background().unwrap();
        assert_eq!((background.width(), background.height()), (2, 3));
    }
}
