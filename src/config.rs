use crate::error::{MergeError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Construction-time defaults of a [`Merger`](crate::Merger).
///
/// Deserializes from JSON with every field optional:
///
/// ```json
/// { "max_pages_count": 4, "header": "Holiday", "background_source": "bg.jpg" }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MergerConfig {
    pub add_background: bool,
    /// Soft upper bound on the number of pages.
    pub max_pages_count: usize,
    /// Minimum number of elements a full page holds.
    pub trigger_split_count: usize,
    /// Larger side of a page before the header band is added, in pixels.
    pub max_out_dimension: f64,
    /// Header band height as a fraction of the page's average side.
    pub header_coef: f64,
    /// Space around each element, as a fraction of the average element side.
    pub el_margin: f64,
    /// Space around the whole grid, as a fraction of the average element side.
    pub outer_margin: f64,
    pub header: Option<String>,
    /// Path, URL or data URI of the background image.
    pub background_source: Option<String>,
    /// TrueType/OpenType file used for headers.
    pub font_source: Option<PathBuf>,
}

impl Default for MergerConfig {
    fn default() -> Self {
        Self {
            add_background: false,
            max_pages_count: 1,
            trigger_split_count: 1,
            max_out_dimension: 2048.0,
            header_coef: 0.1,
            el_margin: 0.0,
            outer_margin: 0.0,
            header: None,
            background_source: None,
            font_source: None,
        }
    }
}

impl MergerConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: MergerConfig = serde_json::from_str(raw)?;
        config.defaults().validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Applies per-call overrides on top of these defaults.
    pub fn resolve(&self, options: &MergeOptions) -> ResolvedOptions {
        ResolvedOptions {
            add_background: options.add_background.unwrap_or(self.add_background),
            max_pages_count: options.max_pages_count.unwrap_or(self.max_pages_count),
            trigger_split_count: options
                .trigger_split_count
                .unwrap_or(self.trigger_split_count),
            max_out_dimension: options.max_out_dimension.unwrap_or(self.max_out_dimension),
            header_coef: options.header_coef.unwrap_or(self.header_coef),
            el_margin: options.el_margin.unwrap_or(self.el_margin),
            outer_margin: options.outer_margin.unwrap_or(self.outer_margin),
            header: match &options.header {
                Some(header) => header.clone(),
                None => self.header.clone(),
            },
        }
    }

    pub(crate) fn defaults(&self) -> ResolvedOptions {
        self.resolve(&MergeOptions::default())
    }
}

/// Per-call overrides; `None` keeps the merger's default.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    pub add_background: Option<bool>,
    pub max_pages_count: Option<usize>,
    pub trigger_split_count: Option<usize>,
    pub max_out_dimension: Option<f64>,
    pub header_coef: Option<f64>,
    pub el_margin: Option<f64>,
    pub outer_margin: Option<f64>,
    /// `Some(None)` removes a default header for this call.
    #[serde(deserialize_with = "explicit_option")]
    pub header: Option<Option<String>>,
}

impl MergeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_background(mut self, enabled: bool) -> Self {
        self.add_background = Some(enabled);
        self
    }

    pub fn max_pages_count(mut self, count: usize) -> Self {
        self.max_pages_count = Some(count);
        self
    }

    pub fn trigger_split_count(mut self, count: usize) -> Self {
        self.trigger_split_count = Some(count);
        self
    }

    pub fn max_out_dimension(mut self, pixels: f64) -> Self {
        self.max_out_dimension = Some(pixels);
        self
    }

    pub fn header_coef(mut self, coef: f64) -> Self {
        self.header_coef = Some(coef);
        self
    }

    pub fn el_margin(mut self, fraction: f64) -> Self {
        self.el_margin = Some(fraction);
        self
    }

    pub fn outer_margin(mut self, fraction: f64) -> Self {
        self.outer_margin = Some(fraction);
        self
    }

    pub fn header(mut self, text: impl Into<String>) -> Self {
        self.header = Some(Some(text.into()));
        self
    }

    pub fn without_header(mut self) -> Self {
        self.header = Some(None);
        self
    }
}

// Distinguishes a present `null` from an absent field.
fn explicit_option<'de, D>(deserializer: D) -> std::result::Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Options in effect for one merge call.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOptions {
    pub add_background: bool,
    pub max_pages_count: usize,
    pub trigger_split_count: usize,
    pub max_out_dimension: f64,
    pub header_coef: f64,
    pub el_margin: f64,
    pub outer_margin: f64,
    pub header: Option<String>,
}

impl ResolvedOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_pages_count == 0 {
            return Err(MergeError::invalid("max_pages_count must be at least 1"));
        }
        if self.trigger_split_count == 0 {
            return Err(MergeError::invalid("trigger_split_count must be at least 1"));
        }
        if !self.max_out_dimension.is_finite() || self.max_out_dimension <= 0.0 {
            return Err(MergeError::invalid(format!(
                "max_out_dimension must be positive, got {}",
                self.max_out_dimension
            )));
        }
        for (name, value) in [
            ("header_coef", self.header_coef),
            ("el_margin", self.el_margin),
            ("outer_margin", self.outer_margin),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(MergeError::invalid(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Header text, if one should be drawn. Empty text counts as none.
    pub fn header_text(&self) -> Option<&str> {
        self.header.as_deref().filter(|text| !text.is_empty())
    }
}

pub(crate) fn validate_element_size(width: f64, height: f64) -> Result<()> {
    let valid = |v: f64| v.is_finite() && v > 0.0;
    if !valid(width) || !valid(height) {
        return Err(MergeError::invalid(format!(
            "element size must be positive, got {width}x{height}"
        )));
    }
    Ok(())
}
