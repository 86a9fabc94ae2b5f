#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetrics {
    pub page_number: usize,
    pub columns: usize,
    pub rows: usize,
    pub width: u32,
    pub height: u32,
    pub drawn: usize,
    pub blank: usize,
    pub render_ms: f64,
    pub bytes: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeMetrics {
    pub pages: Vec<PageMetrics>,
    pub failed_loads: usize,
    pub total_render_ms: f64,
    pub total_bytes: usize,
}

impl MergeMetrics {
    pub(crate) fn from_pages(pages: Vec<PageMetrics>, failed_loads: usize) -> Self {
        let total_render_ms = pages.iter().map(|p| p.render_ms).sum();
        let total_bytes = pages.iter().map(|p| p.bytes).sum();
        Self {
            pages,
            failed_loads,
            total_render_ms,
            total_bytes,
        }
    }

    pub fn drawn(&self) -> usize {
        self.pages.iter().map(|p| p.drawn).sum()
    }

    pub fn blank(&self) -> usize {
        self.pages.iter().map(|p| p.blank).sum()
    }
}
