//! # Layer Configuration
//!
//! This module defines the `hopper.yaml` layer file and the command-line
//! layer specifier syntax. Both produce the same thing: an ordered list of
//! layer keys, each with an optional path (or remote) and an optional ref.
//!
//! ## Layer file
//!
//! ```yaml
//! version: daisy                 # default ref for layers without one
//! mirror: /srv/mirror            # optional object-store mirror root
//! local-layers: ~/src/layers     # optional directory of local layers
//! threads: 4
//! layers:
//!   poky/meta: {}
//!   meta-oe/meta-networking: master
//!   meta-xilinx:
//!     ref: local
//!     path: /src/meta-xilinx
//! ```
//!
//! Layer order is preserved. A layer's value may be null or empty (use the
//! defaults), a string (shorthand for `ref`), or a mapping with `path` and
//! `ref` keys.
//!
//! ## Specifiers
//!
//! `KEY[=REF][@PATH]`, e.g. `meta-oe/meta-networking=daisy` or
//! `meta-xilinx=local@/src/meta-xilinx`. Everything after the first `@` is
//! the path, so scp-style remotes such as `git@host:repo` are accepted.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Location and revision requested for one layer key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSpec {
    /// Remote URI for git layers, or a filesystem path for local ones.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default, rename = "ref")]
    pub r#ref: Option<String>,
}

impl LayerSpec {
    pub fn new(path: Option<&str>, r#ref: Option<&str>) -> Self {
        Self {
            path: path.map(str::to_string),
            r#ref: r#ref.map(str::to_string),
        }
    }
}

/// Parsed `hopper.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerFile {
    pub version: Option<String>,
    pub layers: Vec<(String, LayerSpec)>,
    pub mirror: Option<PathBuf>,
    pub local_layers: Option<PathBuf>,
    pub threads: Option<usize>,
}

/// Parse a layer file from a YAML string.
pub fn parse(yaml: &str) -> Result<LayerFile> {
    let value: serde_yaml::Value = serde_yaml::from_str(yaml)?;
    let mut root = match value {
        serde_yaml::Value::Mapping(map) => map,
        serde_yaml::Value::Null => return Ok(LayerFile::default()),
        _ => {
            return Err(Error::ConfigParse {
                message: "Layer file must be a YAML mapping".to_string(),
                hint: Some("Start the file with 'layers:'".to_string()),
            })
        }
    };

    let mut file = LayerFile {
        version: take_string(&mut root, "version")?,
        mirror: take_string(&mut root, "mirror")?.map(PathBuf::from),
        local_layers: take_string(&mut root, "local-layers")?.map(PathBuf::from),
        ..Default::default()
    };

    if let Some(threads) = root.remove("threads") {
        file.threads = match threads {
            serde_yaml::Value::Null => None,
            serde_yaml::Value::Number(n) => match n.as_u64() {
                Some(n) if n > 0 => Some(n as usize),
                _ => return Err(threads_error()),
            },
            _ => return Err(threads_error()),
        };
    }

    match root.remove("layers") {
        None | Some(serde_yaml::Value::Null) => {}
        Some(serde_yaml::Value::Mapping(layers)) => {
            for (key, value) in layers {
                let key = key.as_str().ok_or_else(|| Error::ConfigParse {
                    message: "Layer key must be a string".to_string(),
                    hint: None,
                })?;
                file.layers.push((key.to_string(), parse_layer_value(key, value)?));
            }
        }
        Some(_) => {
            return Err(Error::ConfigParse {
                message: "'layers' must be a mapping".to_string(),
                hint: Some("Use 'layers: { meta-oe/meta-networking: {} }'".to_string()),
            })
        }
    }

    if let Some(key) = root.keys().next() {
        return Err(Error::ConfigParse {
            message: format!("Unknown key {:?} in layer file", key),
            hint: Some("Valid keys are version, layers, mirror, local-layers, threads".to_string()),
        });
    }

    Ok(file)
}

/// Read and parse a layer file from disk.
pub fn load(path: &Path) -> Result<LayerFile> {
    let content = fs::read_to_string(path)?;
    parse(&content)
}

fn take_string(map: &mut serde_yaml::Mapping, key: &str) -> Result<Option<String>> {
    match map.remove(key) {
        None | Some(serde_yaml::Value::Null) => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(Error::ConfigParse {
            message: format!("'{}' must be a string", key),
            hint: None,
        }),
    }
}

fn parse_layer_value(key: &str, value: serde_yaml::Value) -> Result<LayerSpec> {
    match value {
        serde_yaml::Value::Null => Ok(LayerSpec::default()),
        serde_yaml::Value::String(r#ref) => Ok(LayerSpec::new(None, Some(&r#ref))),
        serde_yaml::Value::Mapping(_) => {
            serde_yaml::from_value(value).map_err(|e| Error::ConfigParse {
                message: format!("Invalid entry for layer '{}': {}", key, e),
                hint: Some("Layer entries take 'path' and 'ref' keys".to_string()),
            })
        }
        _ => Err(Error::ConfigParse {
            message: format!("Invalid entry for layer '{}'", key),
            hint: Some("Use a ref string or a mapping with 'path' and 'ref'".to_string()),
        }),
    }
}

/// Parse a `KEY[=REF][@PATH]` command-line layer specifier.
pub fn parse_layer_specifier(specifier: &str) -> Result<(String, LayerSpec)> {
    let (left, path) = match specifier.split_once('@') {
        Some((left, path)) => (left, Some(path)),
        None => (specifier, None),
    };
    let (key, r#ref) = match left.split_once('=') {
        Some((key, r#ref)) => (key, Some(r#ref)),
        None => (left, None),
    };

    let key = key.trim();
    if key.is_empty() {
        return Err(Error::ConfigParse {
            message: format!("Layer specifier '{}' has no layer name", specifier),
            hint: Some("Use KEY[=REF][@PATH], e.g. meta-oe/meta-networking=daisy".to_string()),
        });
    }

    fn non_empty(s: Option<&str>) -> Option<&str> {
        s.map(str::trim).filter(|s| !s.is_empty())
    }
    Ok((
        key.to_string(),
        LayerSpec::new(non_empty(path), non_empty(r#ref)),
    ))
}

fn threads_error() -> Error {
    Error::ConfigParse {
        message: "'threads' must be a positive integer".to_string(),
        hint: None,
    }
}
