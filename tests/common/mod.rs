//! Shared test utilities for integration and E2E tests.
//!
//! This module provides common fixtures, helper functions, and macros
//! to reduce duplication across test files.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new().with_config(configs::POKY);
//!     // ... test code
//! }
//! ```

use assert_fs::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::configs;
    #[allow(unused_imports)]
    pub use super::GitRemote;
    pub use super::TestFixture;
}

/// Layer files and index caches used across tests.
#[allow(dead_code)]
pub mod configs {
    /// Poky layers plus BitBake, all with explicit remotes.
    pub const POKY: &str = r#"
version: kirkstone
layers:
  poky/meta:
    path: git://git.yoctoproject.org/poky
  poky/meta-poky:
    path: git://git.yoctoproject.org/poky
  bitbake:
    path: git://git.openembedded.org/bitbake
    ref: "2.0"
"#;

    /// Two layers of one clone asking for different refs.
    pub const CONFLICT: &str = r#"
layers:
  poky/meta:
    path: git://git.yoctoproject.org/poky
    ref: master
  poky/meta-yocto-bsp:
    path: git://git.yoctoproject.org/poky
    ref: kirkstone
  bitbake:
    path: git://git.openembedded.org/bitbake
"#;

    /// A layer that only the index can complete.
    pub const FROM_INDEX: &str = r#"
layers:
  meta-oe/meta-networking: dunfell
  bitbake:
    path: git://git.openembedded.org/bitbake
"#;

    /// Index cache with one entry, in the format `hopper index update` writes.
    pub const INDEX: &str = r#"
- shortname: meta-networking
  description: Networking layer
  remote: git://git.openembedded.org/meta-openembedded
  subpath: meta-networking
"#;

    /// Invalid YAML for error testing.
    pub const INVALID_YAML: &str = "invalid: yaml: content:";
}

/// A test fixture that provides a temporary directory with optional config.
///
/// Commands created from the fixture run inside the directory and read the
/// layer index cache from `index.yaml` in it, never the user's own cache.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    /// Create a new test fixture with an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Add a `hopper.yaml` layer file with the given content.
    pub fn with_config(self, content: &str) -> Self {
        self.with_file("hopper.yaml", content)
    }

    /// Add a layer index cache with the given content.
    #[allow(dead_code)]
    pub fn with_index(self, content: &str) -> Self {
        self.with_file("index.yaml", content)
    }

    /// Add a file with the given path and content.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Get the path to the config file.
    pub fn config_path(&self) -> PathBuf {
        self.temp_dir.path().join("hopper.yaml")
    }

    /// Create a child path in the temp directory.
    #[allow(dead_code)]
    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    /// Create a command configured to run in this fixture's directory.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("hopper");
        cmd.current_dir(self.path())
            .env("HOPPER_INDEX_CACHE", self.path().join("index.yaml"))
            .env_remove("HOPPER_CONFIG")
            .env_remove("HOPPER_MIRROR")
            .env_remove("HOPPER_LOCAL")
            .env_remove("RUST_LOG");
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Run git in `dir`, panicking with its stderr on failure.
#[allow(dead_code)]
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "hopper")
        .env("GIT_AUTHOR_EMAIL", "hopper@example.com")
        .env("GIT_COMMITTER_NAME", "hopper")
        .env("GIT_COMMITTER_EMAIL", "hopper@example.com")
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A bare repository on the local filesystem standing in for a remote,
/// with a seed clone used to push new commits to it.
#[allow(dead_code)]
pub struct GitRemote {
    bare: PathBuf,
    seed: PathBuf,
}

#[allow(dead_code)]
impl GitRemote {
    /// Create `<root>/remotes/<name>.git` with one commit on `master`.
    pub fn new(root: &Path, name: &str) -> Self {
        let bare = root.join("remotes").join(format!("{}.git", name));
        let seed = root.join("seeds").join(name);
        std::fs::create_dir_all(&bare).expect("Failed to create bare dir");
        std::fs::create_dir_all(&seed).expect("Failed to create seed dir");

        git(&bare, &["init", "--bare", "--quiet"]);
        git(&bare, &["symbolic-ref", "HEAD", "refs/heads/master"]);
        git(&seed, &["init", "--quiet"]);
        git(&seed, &["checkout", "--quiet", "-b", "master"]);
        git(&seed, &["remote", "add", "origin", bare.to_str().expect("utf-8 path")]);

        let remote = Self { bare, seed };
        remote.commit("conf/layer.conf", "BBPATH .= \":${LAYERDIR}\"\n");
        remote
    }

    /// The URI clones use.
    pub fn url(&self) -> String {
        self.bare.display().to_string()
    }

    /// Commit `path` with `content` on the current seed branch, push it, and
    /// return the new commit sha.
    pub fn commit(&self, path: &str, content: &str) -> String {
        let file = self.seed.join(path);
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent");
        }
        std::fs::write(&file, content).expect("Failed to write file");
        git(&self.seed, &["add", path]);
        git(&self.seed, &["commit", "--quiet", "-m", path]);
        git(&self.seed, &["push", "--quiet", "origin", "HEAD"]);
        git(&self.seed, &["rev-parse", "HEAD"])
    }

    /// Create and push branch `name` at the seed's current commit.
    pub fn branch(&self, name: &str) {
        git(&self.seed, &["push", "--quiet", "origin", &format!("HEAD:refs/heads/{}", name)]);
    }

    /// Create and push a lightweight tag at the seed's current commit.
    pub fn tag(&self, name: &str) {
        git(&self.seed, &["tag", name]);
        git(&self.seed, &["push", "--quiet", "origin", &format!("refs/tags/{}", name)]);
    }

    /// Commit of `refspec` in the remote.
    pub fn rev(&self, refspec: &str) -> String {
        git(&self.bare, &["rev-parse", refspec])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creates_temp_dir() {
        let fixture = TestFixture::new();
        assert!(fixture.path().exists());
    }

    #[test]
    fn test_fixture_with_config() {
        let fixture = TestFixture::new().with_config(configs::POKY);
        assert!(fixture.config_path().exists());
    }

    #[test]
    fn test_configs_are_valid_yaml() {
        for config in [configs::POKY, configs::CONFLICT, configs::FROM_INDEX, configs::INDEX] {
            serde_yaml::from_str::<serde_yaml::Value>(config).expect("Config should be valid YAML");
        }
    }

    #[test]
    fn test_invalid_yaml_is_actually_invalid() {
        let result = serde_yaml::from_str::<serde_yaml::Value>(configs::INVALID_YAML);
        assert!(result.is_err(), "INVALID_YAML should not parse");
    }
}
