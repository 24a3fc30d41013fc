//! Persistence of collected links
//!
//! Two formats are written side by side:
//! - CSV with one post URL per row plus collection time and method
//! - pretty-printed JSON carrying run metadata and the ordered link list

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::{DateFilter, OutputSettings};

/// Timestamp layout used in both output formats
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors from writing result files
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Value recorded for a filter that did not take effect
pub const FILTER_NOT_APPLIED: &str = "None";

/// Filters that took effect during the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiltersApplied {
    pub content_filter: String,
    pub date_filter: String,
}

impl FiltersApplied {
    /// `date_filter` is `None` when no date option was selected
    pub fn new(posts_filter: bool, date_filter: Option<DateFilter>) -> Self {
        Self {
            content_filter: if posts_filter { "Posts" } else { FILTER_NOT_APPLIED }.to_string(),
            date_filter: date_filter
                .map(|f| f.label())
                .unwrap_or(FILTER_NOT_APPLIED)
                .to_string(),
        }
    }
}

/// Header block of the JSON export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeMetadata {
    pub total_posts: usize,
    pub collection_timestamp: String,
    pub collection_method: String,
    pub user_agent: String,
    pub filters_applied: FiltersApplied,
}

/// Everything written for one finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostExport {
    pub scraping_metadata: ScrapeMetadata,
    pub post_links: Vec<String>,
}

impl PostExport {
    pub fn new(
        links: Vec<String>,
        collection_method: &str,
        user_agent: &str,
        filters_applied: FiltersApplied,
        collected_at: DateTime<Local>,
    ) -> Self {
        Self {
            scraping_metadata: ScrapeMetadata {
                total_posts: links.len(),
                collection_timestamp: collected_at.format(TIMESTAMP_FORMAT).to_string(),
                collection_method: collection_method.to_string(),
                user_agent: user_agent.to_string(),
                filters_applied,
            },
            post_links: links,
        }
    }

    pub fn links(&self) -> &[String] {
        &self.post_links
    }
}

/// Files produced by a save; `None` when the format was not requested
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPaths {
    pub csv: Option<PathBuf>,
    pub json: Option<PathBuf>,
}

impl OutputSettings {
    /// File paths for a run, suffixed with [`file_suffix`] when a keyword is given
    pub fn paths_for(&self, keyword: Option<&str>) -> OutputPaths {
        let suffix = keyword
            .map(|k| format!("_{}", file_suffix(k)))
            .unwrap_or_default();

        OutputPaths {
            csv: self
                .format
                .writes_csv()
                .then(|| self.dir.join(format!("{}{}.csv", self.csv_stem, suffix))),
            json: self
                .format
                .writes_json()
                .then(|| self.dir.join(format!("{}{}.json", self.json_stem, suffix))),
        }
    }
}

/// Lowercase alphanumerics with single underscores between words
pub fn slugify(s: &str) -> String {
    let mut slug = String::with_capacity(s.len());
    for c in s.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('_') && !slug.is_empty() {
            slug.push('_');
        }
    }
    slug.trim_end_matches('_').to_string()
}

/// File name suffix for a keyword, distinct for distinct keywords.
///
/// Keywords whose slug is the keyword itself use the slug. Any other
/// keyword gets `<slug>-<hash>`, or `kw-<hash>` when the slug is empty;
/// slugs never contain `-`, so the two forms cannot meet.
pub fn file_suffix(keyword: &str) -> String {
    let key = keyword.trim().to_lowercase();
    let slug = slugify(&key);
    if slug == key && !slug.is_empty() {
        return slug;
    }

    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let hash = format!("{:x}", hasher.finalize())[..16].to_string();

    if slug.is_empty() {
        format!("kw-{}", hash)
    } else {
        format!("{}-{}", slug, hash)
    }
}

/// Write the CSV file: header row, then one row per link
pub fn save_csv(path: &Path, export: &PostExport) -> Result<(), OutputError> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["Post_URL", "Collected_At", "Collection_Method"])?;

    let meta = &export.scraping_metadata;
    for link in &export.post_links {
        writer.write_record([
            link.as_str(),
            meta.collection_timestamp.as_str(),
            meta.collection_method.as_str(),
        ])?;
    }
    writer.flush().map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    info!("Saved {} posts to {}", export.post_links.len(), path.display());
    Ok(())
}

/// Write the JSON export, pretty-printed
pub fn save_json(path: &Path, export: &PostExport) -> Result<(), OutputError> {
    ensure_parent(path)?;
    let file = File::create(path).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::to_writer_pretty(file, export)?;

    info!("Saved {} posts to {}", export.post_links.len(), path.display());
    Ok(())
}

/// Write every format requested by `settings`
pub fn save_all(
    settings: &OutputSettings,
    keyword: Option<&str>,
    export: &PostExport,
) -> Result<OutputPaths, OutputError> {
    let paths = settings.paths_for(keyword);
    if let Some(csv_path) = &paths.csv {
        save_csv(csv_path, export)?;
    }
    if let Some(json_path) = &paths.json {
        save_json(json_path, export)?;
    }
    Ok(paths)
}

/// Read a JSON export back
pub fn load_json(path: &Path) -> Result<PostExport, OutputError> {
    let content = fs::read_to_string(path).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

fn ensure_parent(path: &Path) -> Result<(), OutputError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|source| OutputError::Io {
                path: parent.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}
