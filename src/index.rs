//! # Layer Index
//!
//! The layer index maps a layer's short name to the remote that hosts it and
//! the subdirectory it lives in. Entries come from the public OpenEmbedded
//! layer index (or a local YAML file), and are backed by two built-in tables:
//!
//! - **aliases** fold common nicknames onto canonical names (`oe-core`,
//!   `meta` and `core` all mean `openembedded-core`),
//! - **defaults** provide entries that are never published in the index,
//!   such as the build tooling itself.
//!
//! An index is a plain value. It is built once at startup, wrapped in an
//! `Arc` and attached to every [`LayerCollection`](crate::layers::LayerCollection)
//! that needs it, so tests can attach a hand-built index instead.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::process::ProcessRunner;

/// Base URL of the public layer index.
pub const DEFAULT_INDEX_URL: &str = "http://layers.openembedded.org/layerindex/branch";

/// Name of the build tooling layer every collection must contain.
pub const TOOLING_LAYER: &str = "bitbake";

const ALIASES: &[(&str, &str)] = &[
    ("oe-core", "openembedded-core"),
    ("meta", "openembedded-core"),
    ("core", "openembedded-core"),
    ("meta-oe", "meta-openembedded"),
];

const DEFAULT_REMOTES: &[(&str, &str)] = &[(TOOLING_LAYER, "git://git.openembedded.org/bitbake")];

/// One published layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub shortname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub remote: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subpath: Option<String>,
}

impl IndexEntry {
    pub fn new(shortname: &str, remote: &str, subpath: Option<&str>) -> Self {
        Self {
            shortname: shortname.to_string(),
            description: None,
            remote: Some(remote.to_string()),
            subpath: subpath.map(str::to_string),
        }
    }
}

/// Short name lookup over cached entries, aliases and built-in defaults.
#[derive(Debug, Clone)]
pub struct LayerIndex {
    entries: BTreeMap<String, IndexEntry>,
    aliases: BTreeMap<String, String>,
    defaults: BTreeMap<String, IndexEntry>,
}

impl Default for LayerIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerIndex {
    /// An index with no cached entries, only the built-in tables.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            aliases: ALIASES
                .iter()
                .map(|(alias, name)| (alias.to_string(), name.to_string()))
                .collect(),
            defaults: DEFAULT_REMOTES
                .iter()
                .map(|(name, remote)| (name.to_string(), IndexEntry::new(name, remote, None)))
                .collect(),
        }
    }

    /// Build an index from fetched entries. Duplicate short names are an error.
    pub fn from_entries(entries: impl IntoIterator<Item = IndexEntry>) -> Result<Self> {
        let mut index = Self::new();
        for entry in entries {
            index.insert(entry)?;
        }
        Ok(index)
    }

    pub fn insert(&mut self, entry: IndexEntry) -> Result<()> {
        if self.entries.contains_key(&entry.shortname) {
            return Err(Error::IndexParse {
                message: format!("duplicate entry '{}' in layer index", entry.shortname),
            });
        }
        debug!(
            "index: adding '{}' @ {:?} {{{:?}}}",
            entry.shortname, entry.remote, entry.subpath
        );
        self.entries.insert(entry.shortname.clone(), entry);
        Ok(())
    }

    /// Canonical name an alias folds onto.
    pub fn alias(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }

    /// Look `name` up, trying the name and then its alias target, first among
    /// cached entries and then among the built-in defaults.
    pub fn find(&self, name: &str) -> Option<&IndexEntry> {
        let names: Vec<&str> = std::iter::once(name).chain(self.alias(name)).collect();
        names
            .iter()
            .find_map(|n| self.entries.get(*n))
            .or_else(|| names.iter().find_map(|n| self.defaults.get(*n)))
    }

    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fetch entries for `branch`. A failed fetch yields an index holding only
    /// the built-in tables.
    pub fn fetch(fetcher: &dyn IndexFetcher, branch: &str) -> Self {
        match fetcher.fetch(branch).and_then(|entries| Self::from_entries(entries)) {
            Ok(index) => {
                info!("layer index: {} entries for branch '{}'", index.len(), branch);
                index
            }
            Err(e) => {
                warn!("Failed to fetch layer index for '{}': {}", branch, e);
                Self::new()
            }
        }
    }

    /// Read a cache file written by [`LayerIndex::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let entries: Vec<IndexEntry> = serde_yaml::from_str(&content)?;
        Self::from_entries(entries)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let entries: Vec<&IndexEntry> = self.entries.values().collect();
        fs::write(path, serde_yaml::to_string(&entries)?)?;
        Ok(())
    }
}

/// Retrieves the published layer table for a branch.
pub trait IndexFetcher: Send + Sync {
    fn fetch(&self, branch: &str) -> Result<Vec<IndexEntry>>;
}

/// Reads entries from a YAML list on disk, in the format
/// [`LayerIndex::save`] writes.
#[derive(Debug, Clone)]
pub struct FileIndexFetcher {
    path: PathBuf,
}

impl FileIndexFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl IndexFetcher for FileIndexFetcher {
    fn fetch(&self, _branch: &str) -> Result<Vec<IndexEntry>> {
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

/// Scrapes the layer table from the public layer index web page.
///
/// The page is retrieved with `curl` through the process runner.
pub struct HttpIndexFetcher<'a> {
    runner: &'a dyn ProcessRunner,
    base_url: String,
}

impl<'a> HttpIndexFetcher<'a> {
    pub fn new(runner: &'a dyn ProcessRunner) -> Self {
        Self {
            runner,
            base_url: DEFAULT_INDEX_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn url(&self, branch: &str) -> String {
        format!("{}/{}/layers/", self.base_url.trim_end_matches('/'), branch)
    }
}

impl IndexFetcher for HttpIndexFetcher<'_> {
    fn fetch(&self, branch: &str) -> Result<Vec<IndexEntry>> {
        let url = self.url(branch);
        info!("Updating layer index from {}", url);
        let argv: Vec<String> = ["curl", "-fsSL", url.as_str()]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let output = self.runner.run(&argv, None, &[])?;
        if !output.success() {
            return Err(Error::Process {
                command: argv.join(" "),
                message: format!("exited with {}: {}", output.status, output.stderr.trim()),
            });
        }
        parse_layer_table(&output.stdout, Some(branch))
    }
}

/// Parse the `layerstable` HTML table of a layer index page.
///
/// Each row yields the short name (link text of the first cell), the
/// description (second cell), the remote (first line of the fourth cell) and
/// the subdirectory (second link of the fourth cell, relative to the first).
pub fn parse_layer_table(html: &str, branch: Option<&str>) -> Result<Vec<IndexEntry>> {
    let table = Regex::new(
        r#"(?s)<table class=".*?layerstable.*?">.*?<tbody>(.*?)</tbody>.*?</table>"#,
    )?;
    let row = Regex::new(r#"(?s)<tr class="layertype_.">(.*?)</tr>"#)?;
    let cell = Regex::new(r"(?s)<td.*?>(.*?)</td>")?;
    let link_text = Regex::new(r"(?s)<a.*?>(.*?)</a>")?;
    let href = Regex::new(r#"(?s)<a.*?href="(.*?)">"#)?;

    let Some(body) = table.captures(html).and_then(|c| c.get(1)) else {
        return Ok(Vec::new());
    };

    let mut entries: Vec<IndexEntry> = Vec::new();
    for row in row.captures_iter(body.as_str()) {
        let cells: Vec<&str> = cell
            .captures_iter(&row[1])
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();

        let Some(shortname) = cells
            .first()
            .and_then(|c| link_text.captures(c))
            .map(|c| c[1].trim().to_string())
        else {
            continue;
        };

        let description = cells.get(1).map(|c| c.trim().to_string());
        let (remote, subpath) = match cells.get(3) {
            Some(repo) => {
                let remote = repo
                    .lines()
                    .map(str::trim)
                    .find(|line| !line.is_empty())
                    .map(str::to_string);
                let links: Vec<&str> = href
                    .captures_iter(repo)
                    .filter_map(|c| c.get(1).map(|m| m.as_str()))
                    .collect();
                let subpath = match (links.first(), links.get(1)) {
                    (Some(web), Some(tree)) => strip_subdirectory(web, tree, branch),
                    _ => None,
                };
                (remote, subpath)
            }
            None => (None, None),
        };

        if entries.iter().any(|e| e.shortname == shortname) {
            return Err(Error::IndexParse {
                message: format!("duplicate entry '{}' in layer index", shortname),
            });
        }
        entries.push(IndexEntry {
            shortname,
            description,
            remote,
            subpath,
        });
    }
    Ok(entries)
}

/// Reduce a repository web link to a subdirectory: drop the repository
/// prefix, a leading `tree/<branch>/` or `tree/`, and any query string.
pub fn strip_subdirectory(web_repo: &str, tree_path: &str, branch: Option<&str>) -> Option<String> {
    let replaced = tree_path.replace(web_repo, "");
    let mut cut = replaced.trim_start_matches('/').to_string();
    if let Some(branch) = branch {
        let prefix = format!("tree/{}/", branch);
        if let Some(rest) = cut.strip_prefix(&prefix) {
            cut = rest.to_string();
        }
    }
    if let Some(rest) = cut.strip_prefix("tree/") {
        cut = rest.to_string();
    }
    if let Some((path, _query)) = cut.split_once('?') {
        cut = path.to_string();
    }
    let cut = cut.trim_matches('/');
    (!cut.is_empty()).then(|| cut.to_string())
}
