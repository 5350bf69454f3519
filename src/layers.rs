//! # Layers and Layer Collections
//!
//! A [`Layer`] is one directory tree contributed to a build, identified by a
//! short name and an optional subpath inside its source. A
//! [`LayerCollection`] is the ordered, name-unique set of layers a build
//! uses.
//!
//! ## Resolution
//!
//! Users name layers loosely: `meta-oe/meta-networking`, `poky/meta=daisy`,
//! `bitbake`. Turning such a specifier into a concrete source happens in
//! three steps:
//!
//! 1. [`split_name`] divides the key into repository hint, layer name and
//!    subpath.
//! 2. [`parse_revision`] turns the optional path and ref into a
//!    [`SourceDescriptor`], possibly without a remote.
//! 3. [`LayerCollection::resolve`] completes the descriptor. A layer already
//!    in the collection wins, a fetchable descriptor is used as-is, and
//!    anything else is looked up in the attached [`LayerIndex`]es in order.
//!
//! A layer that cannot be located is a fatal [`Error::Resolution`]. The one
//! repair the collection makes on its own is inserting the build tooling
//! layer during [`LayerCollection::validate`].
//!
//! ## Identity
//!
//! [`LayerCollection::hash`] fingerprints a layer set independently of
//! registration order, so two configurations naming the same layers at the
//! same revisions produce the same hash.

use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::LayerSpec;
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::index::{IndexEntry, LayerIndex, TOOLING_LAYER};
use crate::source::{GitSource, SourceDescriptor};

/// Ref used when the tooling layer has to be inserted.
const TOOLING_DEFAULT_REF: &str = "master";

/// The ref string that marks a layer as local.
pub const LOCAL_REF: &str = "local";

/// One contributed directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subpath: Option<String>,
    pub source: Option<SourceDescriptor>,
}

impl Layer {
    pub fn new(
        name: impl Into<String>,
        subpath: Option<String>,
        source: Option<SourceDescriptor>,
    ) -> Self {
        Self {
            name: name.into(),
            subpath: subpath.filter(|s| !s.is_empty()),
            source,
        }
    }

    /// `name/subpath`, or just `name`.
    pub fn full_name(&self) -> String {
        match &self.subpath {
            Some(subpath) => format!("{}/{}", self.name, subpath),
            None => self.name.clone(),
        }
    }

    pub fn is_tooling(&self) -> bool {
        self.name == TOOLING_LAYER
    }

    pub fn git_source(&self) -> Option<&GitSource> {
        self.source.as_ref().and_then(SourceDescriptor::as_git)
    }

    /// Root of the layer's source: the clone, or the local directory.
    pub fn root_source_path(&self, env: &Environment) -> Option<PathBuf> {
        self.source.as_ref().and_then(|s| s.resolve_path(env))
    }

    /// The layer's own directory, the source root joined with the subpath.
    pub fn source_path(&self, env: &Environment) -> Option<PathBuf> {
        let root = self.root_source_path(env)?;
        Some(match &self.subpath {
            Some(subpath) => root.join(subpath),
            None => root,
        })
    }
}

/// The parts of a `repo/.../layer` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerName {
    /// First segment, the repository hint.
    pub repo: String,
    /// Last segment, the layer's short name.
    pub layer: String,
    /// Segments between the two, if any.
    pub subpath: Option<String>,
}

/// Split a `repo/layer/sub...` key into repository hint, layer name and
/// subpath.
///
/// A single-segment key names both the repository and the layer.
pub fn split_name(input: &str) -> LayerName {
    let parts: Vec<&str> = input.split('/').collect();
    let repo = parts.first().copied().unwrap_or_default();
    let layer = parts.last().copied().unwrap_or_default();
    let middle = if parts.len() > 2 {
        parts[1..parts.len() - 1].join("/")
    } else {
        String::new()
    };

    LayerName {
        repo: repo.to_string(),
        layer: layer.to_string(),
        subpath: (!middle.is_empty()).then_some(middle),
    }
}

/// Turn a specifier's path and ref into a source descriptor.
///
/// - ref `local` with a name gives a local source at `remote_or_path`,
/// - any other non-empty ref gives a git source,
/// - no ref falls back to `default_ref`,
/// - with neither, there is nothing to go on and the index decides.
pub fn parse_revision(
    name: Option<&str>,
    remote_or_path: Option<&str>,
    r#ref: Option<&str>,
    default_ref: Option<&str>,
) -> Option<SourceDescriptor> {
    let r#ref = r#ref.filter(|r| !r.is_empty());
    match (name, r#ref) {
        (Some(name), Some(LOCAL_REF)) => {
            Some(SourceDescriptor::local(name, remote_or_path.map(PathBuf::from)))
        }
        (_, Some(r#ref)) => Some(SourceDescriptor::git(remote_or_path, Some(r#ref))),
        (_, None) => default_ref.map(|d| SourceDescriptor::git(remote_or_path, Some(d))),
    }
}

/// Fingerprint a set of layers.
///
/// Each layer's full name and `ref@remote` string are hashed on their own;
/// the per-layer digests are then combined in full-name order. The result is
/// the first 16 hex digits.
pub fn hash_layers<'a>(layers: impl IntoIterator<Item = &'a Layer>) -> String {
    let mut digests: Vec<(String, String)> = layers
        .into_iter()
        .map(|layer| {
            let full_name = layer.full_name();
            let rev = layer.git_source().map(GitSource::rev_string).unwrap_or_default();
            let mut hasher = Sha256::new();
            hasher.update(full_name.as_bytes());
            hasher.update(rev.as_bytes());
            (full_name, hex::encode(hasher.finalize()))
        })
        .collect();
    digests.sort();

    let mut hasher = Sha256::new();
    for (_, digest) in &digests {
        hasher.update(digest.as_bytes());
    }
    let mut hash = hex::encode(hasher.finalize());
    hash.truncate(16);
    hash
}

/// An ordered set of layers, unique by name.
#[derive(Debug, Clone, Default)]
pub struct LayerCollection {
    layers: Vec<Layer>,
    default_version: Option<String>,
    indexes: Vec<Arc<LayerIndex>>,
}

impl LayerCollection {
    pub fn new(default_version: Option<&str>) -> Self {
        Self {
            layers: Vec::new(),
            default_version: default_version.map(str::to_string),
            indexes: Vec::new(),
        }
    }

    /// An empty collection sharing this one's default version and indexes.
    pub fn empty_like(&self) -> Self {
        Self {
            layers: Vec::new(),
            default_version: self.default_version.clone(),
            indexes: self.indexes.clone(),
        }
    }

    pub fn default_version(&self) -> Option<&str> {
        self.default_version.as_deref()
    }

    /// Attach an index. Indexes are searched in the order they were added.
    pub fn add_index(&mut self, index: Arc<LayerIndex>) {
        self.indexes.push(index);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Layer> {
        self.layers.iter()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// Resolve and add every `(key, entry)` pair from a layer file, in order.
    pub fn parse<'a>(
        &mut self,
        layers: impl IntoIterator<Item = &'a (String, LayerSpec)>,
    ) -> Result<()> {
        for (key, spec) in layers {
            let names = split_name(key);
            let revision = parse_revision(
                Some(&names.repo),
                spec.path.as_deref(),
                spec.r#ref.as_deref(),
                self.default_version.as_deref(),
            );
            let layer = self.resolve(&names, revision)?;
            self.push(layer);
        }
        Ok(())
    }

    /// Resolve `name` and add it. Without a `version` the collection's
    /// default version is requested.
    pub fn add(&mut self, name: &str, version: Option<SourceDescriptor>) -> Result<Layer> {
        let names = split_name(name);
        let revision = version.unwrap_or_else(|| {
            SourceDescriptor::git(None, self.default_version.as_deref())
        });
        let layer = self.resolve(&names, Some(revision))?;
        self.push(layer.clone());
        Ok(layer)
    }

    /// Add an already-resolved layer unless one with the same name exists.
    pub fn push(&mut self, layer: Layer) -> bool {
        if self.get(&layer.name).is_some() {
            return false;
        }
        debug!("layers: adding {} ({:?})", layer.full_name(), layer.source);
        self.layers.push(layer);
        true
    }

    /// Find the first attached index entry for `name`.
    pub fn search(&self, name: &str) -> Option<&IndexEntry> {
        self.indexes.iter().find_map(|index| index.find(name))
    }

    /// Complete a layer from its name parts and requested revision.
    pub fn resolve(&self, names: &LayerName, revision: Option<SourceDescriptor>) -> Result<Layer> {
        if let Some(existing) = self.get(&names.layer) {
            return Ok(existing.clone());
        }

        if let Some(revision) = revision.as_ref().filter(|r| r.can_fetch()) {
            return Ok(Layer::new(
                &names.layer,
                names.subpath.clone(),
                Some(revision.clone()),
            ));
        }

        let unresolved = |message: &str| {
            warn!("Unable to fill in source information for layer '{}'.", names.layer);
            Error::Resolution {
                layer: names.layer.clone(),
                message: message.to_string(),
            }
        };

        let entry = self
            .search(&names.layer)
            .ok_or_else(|| unresolved("no layer index entry and no remote given"))?;
        let remote = entry
            .remote
            .as_deref()
            .ok_or_else(|| unresolved("layer index entry has no remote"))?;

        let source = match revision {
            None => SourceDescriptor::git(Some(remote), None),
            Some(SourceDescriptor::Git(git)) => {
                SourceDescriptor::git(Some(remote), git.r#ref.as_deref())
            }
            Some(SourceDescriptor::Local(_)) => {
                return Err(unresolved("local source without a path"));
            }
        };
        let subpath = entry.subpath.clone().or_else(|| names.subpath.clone());
        Ok(Layer::new(&names.layer, subpath, Some(source)))
    }

    /// Ensure the build tooling layer is present, inserting it from the
    /// index when it is missing.
    ///
    /// Dependencies between layers are not checked.
    pub fn validate(&mut self) -> Result<()> {
        if self.layers.iter().any(Layer::is_tooling) {
            return Ok(());
        }

        warn!("BitBake is missing from the described layers, adding BitBake.");
        let revision = SourceDescriptor::git(None, Some(TOOLING_DEFAULT_REF));
        match self.resolve(&split_name(TOOLING_LAYER), Some(revision)) {
            Ok(layer) => {
                self.push(layer);
                Ok(())
            }
            Err(e) => {
                error!("Could not find BitBake");
                Err(e)
            }
        }
    }

    /// Order-independent fingerprint of the collection.
    pub fn hash(&self) -> String {
        hash_layers(&self.layers)
    }

    /// The ref a git layer should be checked out at: its own, or the
    /// collection's default version.
    pub fn effective_ref(&self, layer: &Layer) -> Result<String> {
        layer
            .git_source()
            .and_then(|git| git.r#ref.clone())
            .or_else(|| self.default_version.clone())
            .ok_or_else(|| Error::Resolution {
                layer: layer.full_name(),
                message: "no ref given and no default version".to_string(),
            })
    }
}

impl<'a> IntoIterator for &'a LayerCollection {
    type Item = &'a Layer;
    type IntoIter = std::slice::Iter<'a, Layer>;

    fn into_iter(self) -> Self::IntoIter {
        self.layers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexEntry;
    use log::Level;
    use serial_test::serial;

    fn index() -> Arc<LayerIndex> {
        Arc::new(
            LayerIndex::from_entries(vec![
                IndexEntry::new("meta-openembedded", "r", None),
                IndexEntry::new(
                    "meta-networking",
                    "git://git.openembedded.org/meta-openembedded",
                    Some("meta-networking"),
                ),
                IndexEntry::new(
                    "openembedded-core",
                    "git://git.openembedded.org/openembedded-core",
                    Some("meta"),
                ),
            ])
            .unwrap(),
        )
    }

    fn collection(default: Option<&str>) -> LayerCollection {
        let mut layers = LayerCollection::new(default);
        layers.add_index(index());
        layers
    }

    #[test]
    fn test_split_name_two_segments() {
        assert_eq!(
            split_name("meta-oe/meta-networking"),
            LayerName {
                repo: "meta-oe".to_string(),
                layer: "meta-networking".to_string(),
                subpath: None,
            }
        );
    }

    #[test]
    fn test_split_name_single_and_nested() {
        let single = split_name("bitbake");
        assert_eq!(single.repo, "bitbake");
        assert_eq!(single.layer, "bitbake");
        assert_eq!(single.subpath, None);

        let nested = split_name("meta-intel/common/bsp/meta-x");
        assert_eq!(nested.repo, "meta-intel");
        assert_eq!(nested.layer, "meta-x");
        assert_eq!(nested.subpath.as_deref(), Some("common/bsp"));
    }

    #[test]
    fn test_parse_revision_rules() {
        assert_eq!(
            parse_revision(Some("meta-xilinx"), Some("/src/x"), Some("local"), Some("daisy")),
            Some(SourceDescriptor::local("meta-xilinx", Some(PathBuf::from("/src/x"))))
        );
        assert_eq!(
            parse_revision(None, Some("git://a/x"), Some("dora"), Some("daisy")),
            Some(SourceDescriptor::git(Some("git://a/x"), Some("dora")))
        );
        assert_eq!(
            parse_revision(None, None, Some(""), Some("daisy")),
            Some(SourceDescriptor::git(None, Some("daisy")))
        );
        assert_eq!(parse_revision(Some("x"), None, None, None), None);
    }

    #[test]
    fn test_resolve_through_alias_uses_default_version() {
        let mut layers = collection(Some("daisy"));
        layers
            .parse(&[("meta-oe".to_string(), LayerSpec::default())])
            .unwrap();

        let layer = layers.get("meta-oe").unwrap();
        assert_eq!(layer.subpath, None);
        assert_eq!(
            layer.source,
            Some(SourceDescriptor::git(Some("r"), Some("daisy")))
        );
    }

    #[test]
    fn test_resolve_explicit_ref_adopts_index_remote_and_subpath() {
        let mut layers = collection(Some("master"));
        layers
            .parse(&[(
                "meta-oe/meta-networking".to_string(),
                LayerSpec::new(None, Some("dora")),
            )])
            .unwrap();

        let layer = layers.get("meta-networking").unwrap();
        assert_eq!(layer.full_name(), "meta-networking/meta-networking");
        assert_eq!(
            layer.source,
            Some(SourceDescriptor::git(
                Some("git://git.openembedded.org/meta-openembedded"),
                Some("dora")
            ))
        );
    }

    #[test]
    fn test_resolve_without_revision_leaves_ref_empty() {
        let layers = collection(None);
        let layer = layers.resolve(&split_name("meta"), None).unwrap();
        assert_eq!(layer.subpath.as_deref(), Some("meta"));
        assert_eq!(
            layer.git_source().and_then(|g| g.r#ref.clone()),
            None
        );
        assert!(layers.effective_ref(&layer).is_err());
        assert_eq!(
            LayerCollection::new(Some("daisy")).effective_ref(&layer).unwrap(),
            "daisy"
        );
    }

    #[test]
    fn test_resolve_fetchable_revision_skips_index() {
        let layers = LayerCollection::new(None);
        let layer = layers
            .resolve(
                &split_name("meta-custom"),
                Some(SourceDescriptor::git(Some("git://example.com/meta-custom"), Some("main"))),
            )
            .unwrap();
        assert_eq!(layer.name, "meta-custom");
        assert!(layer.source.unwrap().can_fetch());
    }

    #[test]
    fn test_resolve_unknown_layer_fails() {
        let layers = collection(Some("master"));
        let result = layers.resolve(
            &split_name("meta-unknown"),
            Some(SourceDescriptor::git(None, Some("master"))),
        );
        assert!(matches!(result, Err(Error::Resolution { .. })));
    }

    #[test]
    fn test_collection_prefers_existing_layer() {
        let mut layers = collection(Some("master"));
        layers
            .parse(&[
                ("meta-oe".to_string(), LayerSpec::new(None, Some("daisy"))),
                ("meta-oe".to_string(), LayerSpec::new(None, Some("master"))),
            ])
            .unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(
            layers.get("meta-oe").and_then(|l| l.git_source()).and_then(|g| g.r#ref.as_deref()),
            Some("daisy")
        );
    }

    #[test]
    fn test_add_uses_default_version() {
        let mut layers = collection(Some("daisy"));
        let core = layers.add("oe-core/meta", None).unwrap();
        assert_eq!(core.full_name(), "meta/meta");
        assert_eq!(layers.len(), 1);

        let added = layers.add("meta-oe", None).unwrap();
        assert_eq!(
            added.git_source().and_then(|g| g.r#ref.as_deref()),
            Some("daisy")
        );
        assert!(layers.get("meta-oe").is_some());
    }

    #[test]
    #[serial]
    fn test_validate_inserts_tooling_layer_with_warning() {
        testing_logger::setup();
        let mut layers = collection(Some("daisy"));
        layers
            .parse(&[("meta-oe".to_string(), LayerSpec::default())])
            .unwrap();
        layers.validate().unwrap();

        let tooling = layers.get("bitbake").unwrap();
        assert_eq!(
            tooling.source,
            Some(SourceDescriptor::git(
                Some("git://git.openembedded.org/bitbake"),
                Some("master")
            ))
        );
        testing_logger::validate(|captured| {
            assert!(captured
                .iter()
                .any(|log| log.level == Level::Warn && log.body.contains("BitBake is missing")));
        });
    }

    #[test]
    fn test_validate_keeps_existing_tooling_layer() {
        let mut layers = collection(Some("daisy"));
        layers
            .parse(&[("bitbake".to_string(), LayerSpec::new(None, Some("1.22")))])
            .unwrap();
        layers.validate().unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(
            layers.get("bitbake").and_then(|l| l.git_source()).and_then(|g| g.r#ref.as_deref()),
            Some("1.22")
        );
    }

    #[test]
    fn test_validate_without_index_still_finds_builtin_default() {
        let mut layers = LayerCollection::new(None);
        layers.add_index(Arc::new(LayerIndex::new()));
        layers.validate().unwrap();
        assert!(layers.get("bitbake").is_some());
    }

    #[test]
    fn test_validate_fails_without_any_index() {
        let mut layers = LayerCollection::new(None);
        assert!(matches!(layers.validate(), Err(Error::Resolution { .. })));
    }

    #[test]
    fn test_hash_is_order_independent() {
        let a = Layer::new("meta", Some("meta".to_string()), Some(SourceDescriptor::git(Some("git://a/poky"), Some("daisy"))));
        let b = Layer::new("bitbake", None, Some(SourceDescriptor::git(Some("git://a/bitbake"), Some("1.22"))));
        let c = Layer::new("meta-xilinx", None, Some(SourceDescriptor::local("meta-xilinx", None)));

        let forward = hash_layers([&a, &b, &c]);
        let reverse = hash_layers([&c, &b, &a]);
        assert_eq!(forward, reverse);
        assert_eq!(forward.len(), 16);
    }

    #[test]
    fn test_hash_changes_with_ref() {
        let a = Layer::new("bitbake", None, Some(SourceDescriptor::git(Some("git://a/bitbake"), Some("1.22"))));
        let b = Layer::new("bitbake", None, Some(SourceDescriptor::git(Some("git://a/bitbake"), Some("1.24"))));
        assert_ne!(hash_layers([&a]), hash_layers([&b]));
    }

    #[test]
    fn test_source_path_joins_subpath() {
        let env = Environment::new("/work");
        let layer = Layer::new(
            "meta-networking",
            Some("meta-networking".to_string()),
            Some(SourceDescriptor::git(Some("git://git.openembedded.org/meta-openembedded"), None)),
        );
        assert_eq!(
            layer.root_source_path(&env),
            Some(PathBuf::from("/work/repos/meta-openembedded"))
        );
        assert_eq!(
            layer.source_path(&env),
            Some(PathBuf::from("/work/repos/meta-openembedded/meta-networking"))
        );
    }
}
