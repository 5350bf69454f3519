//! # Remote Watcher
//!
//! The watcher polls the remotes of one or more layer collections and, when
//! a watched branch moves, publishes a *pinned* copy of the collection in
//! which every git ref is replaced by the commit observed on the remote.
//!
//! ## Structure
//!
//! - [`WatchGroup`]: one collection plus the ref state last seen for the
//!   `(remote, refs/heads/<ref>)` pairs its git layers use.
//! - [`WatcherCore`]: the groups and the poll cycle. It is synchronous and
//!   owns no thread, so a single poll can be driven directly (and tested).
//! - [`RemoteWatcher`]: a background thread owning a `WatcherCore`. Polls are
//!   driven by a ticker or by [`RemoteWatcher::trigger`]; pinned snapshots
//!   are delivered over a bounded channel. Only the thread touches the
//!   groups, so polls never overlap.
//!
//! ## Poll cycle
//!
//! Every distinct remote is queried once with `git ls-remote`. If any query
//! fails the whole cycle is abandoned and no group is updated; the next
//! cycle starts over. Otherwise each group compares the fresh values with
//! its cache, records them, and reports a change when a triggered poll saw
//! any watched pair or a previously seen commit differs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Receiver, SendTimeoutError, Sender};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::git;
use crate::layers::{Layer, LayerCollection};
use crate::process::ProcessRunner;
use crate::source::SourceDescriptor;

/// `remote -> ref name -> commit`.
pub type RemoteRefs = BTreeMap<String, BTreeMap<String, String>>;

/// Pending snapshots held before the watcher thread blocks.
const SNAPSHOT_CAPACITY: usize = 16;

/// How often a blocked send rechecks the stop flag.
const SEND_RETRY: Duration = Duration::from_millis(100);

/// A collection and the remote state it was last compared against.
#[derive(Debug, Clone)]
pub struct WatchGroup {
    layers: LayerCollection,
    state: RemoteRefs,
}

impl WatchGroup {
    pub fn new(layers: LayerCollection) -> Self {
        Self {
            layers,
            state: RemoteRefs::new(),
        }
    }

    pub fn layers(&self) -> &LayerCollection {
        &self.layers
    }

    /// Last recorded state.
    pub fn state(&self) -> &RemoteRefs {
        &self.state
    }

    /// `(remote, refs/heads/<ref>)` for every fetchable git layer.
    pub fn ref_pairs(&self) -> Vec<(String, String)> {
        self.layers
            .iter()
            .filter_map(|layer| {
                let remote = layer.git_source()?.remote.clone()?;
                Some((remote, self.branch_ref(layer)?))
            })
            .collect()
    }

    fn branch_ref(&self, layer: &Layer) -> Option<String> {
        self.layers
            .effective_ref(layer)
            .ok()
            .map(|r| format!("refs/heads/{}", r))
    }

    /// Narrow a full ref table to the pairs this group watches.
    pub fn filter(&self, refs: &RemoteRefs) -> RemoteRefs {
        let mut filtered = RemoteRefs::new();
        for (remote, name) in self.ref_pairs() {
            if let Some(sha) = refs.get(&remote).and_then(|table| table.get(&name)) {
                filtered
                    .entry(remote)
                    .or_default()
                    .insert(name, sha.clone());
            }
        }
        filtered
    }

    /// Record `refs` as the group's state and report whether it changed.
    ///
    /// A pair seen for the first time is recorded but is not a change on its
    /// own. With `trigger`, any observed pair counts as a change.
    pub fn update(&mut self, refs: &RemoteRefs, trigger: bool) -> bool {
        let fresh = self.filter(refs);
        let mut changed = false;

        for (remote, name) in self.ref_pairs() {
            let Some(sha) = fresh.get(&remote).and_then(|t| t.get(&name)) else {
                continue;
            };
            debug!("remote: {}, ref: {}, value = {}", remote, name, sha);
            if trigger {
                changed = true;
            }
            if let Some(old) = self.state.get(&remote).and_then(|t| t.get(&name)) {
                if old != sha {
                    changed = true;
                }
            }
        }

        self.state = fresh;
        changed
    }

    /// Copy of the group's collection with each git ref replaced by the
    /// commit observed in `refs`, or cleared when the branch was not seen.
    pub fn pin(&self, refs: &RemoteRefs) -> LayerCollection {
        let fresh = self.filter(refs);
        let mut pinned = self.layers.empty_like();
        for layer in &self.layers {
            let source = match &layer.source {
                Some(SourceDescriptor::Git(git)) => {
                    let commit = git.remote.as_ref().and_then(|remote| {
                        let name = self.branch_ref(layer)?;
                        fresh.get(remote)?.get(&name).cloned()
                    });
                    Some(SourceDescriptor::git(git.remote.as_deref(), commit.as_deref()))
                }
                other => other.clone(),
            };
            pinned.push(Layer::new(layer.name.clone(), layer.subpath.clone(), source));
        }
        pinned
    }
}

/// A collection pinned to the commits observed at `observed_at`.
#[derive(Debug, Clone)]
pub struct PinnedSnapshot {
    pub original: LayerCollection,
    pub pinned: LayerCollection,
    pub observed_at: DateTime<Utc>,
}

impl PinnedSnapshot {
    pub fn document(&self) -> PinDocument {
        PinDocument {
            observed_at: self.observed_at,
            hash: self.pinned.hash(),
            original_hash: self.original.hash(),
            layers: self.pinned.iter().cloned().collect(),
        }
    }
}

/// Serializable form of a [`PinnedSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinDocument {
    pub observed_at: DateTime<Utc>,
    pub hash: String,
    pub original_hash: String,
    pub layers: Vec<Layer>,
}

/// The watch groups and a synchronous poll cycle over them.
#[derive(Debug, Default)]
pub struct WatcherCore {
    groups: Vec<WatchGroup>,
}

impl WatcherCore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_layers(&mut self, layers: LayerCollection) {
        self.groups.push(WatchGroup::new(layers));
    }

    pub fn groups(&self) -> &[WatchGroup] {
        &self.groups
    }

    /// Distinct remotes across all groups, in first-seen order.
    pub fn remotes(&self) -> Vec<String> {
        let mut remotes: Vec<String> = Vec::new();
        for (remote, _) in self.groups.iter().flat_map(WatchGroup::ref_pairs) {
            if !remotes.contains(&remote) {
                remotes.push(remote);
            }
        }
        remotes
    }

    /// Query every remote and return a snapshot for each group that changed.
    ///
    /// A failed query returns [`Error::RemoteQuery`] and leaves every group
    /// as it was.
    pub fn poll(&mut self, runner: &dyn ProcessRunner, trigger: bool) -> Result<Vec<PinnedSnapshot>> {
        let remotes = self.remotes();
        debug!("need to update for the following remotes -> {:?}", remotes);

        let mut refs = RemoteRefs::new();
        for remote in remotes {
            info!("Grabbing refs from remote for {}", remote);
            let output = runner.run(&git::git_argv(&["ls-remote", remote.as_str()]), None, &[])?;
            if !output.success() {
                return Err(Error::RemoteQuery {
                    remote,
                    stderr: output.stderr.trim().to_string(),
                });
            }
            refs.insert(remote, git::parse_ls_remote(&output.stdout));
        }

        let observed_at = Utc::now();
        let mut snapshots = Vec::new();
        for group in &mut self.groups {
            if group.update(&refs, trigger) {
                info!("Changes have happened since last check, pinning");
                snapshots.push(PinnedSnapshot {
                    original: group.layers.clone(),
                    pinned: group.pin(&refs),
                    observed_at,
                });
            }
        }
        Ok(snapshots)
    }
}

enum Command {
    Trigger,
    Stop,
}

/// A [`WatcherCore`] polled on a background thread.
pub struct RemoteWatcher {
    commands: Sender<Command>,
    snapshots: Receiver<PinnedSnapshot>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl RemoteWatcher {
    /// Start polling every `interval`.
    pub fn spawn(
        mut core: WatcherCore,
        runner: Arc<dyn ProcessRunner>,
        interval: Duration,
    ) -> Result<Self> {
        let (command_tx, command_rx) = channel::unbounded::<Command>();
        let (snapshot_tx, snapshot_rx) = channel::bounded::<PinnedSnapshot>(SNAPSHOT_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let thread = std::thread::Builder::new()
            .name("hopper-watcher".to_string())
            .spawn(move || {
                let ticker = channel::tick(interval);
                loop {
                    if thread_stop.load(Ordering::Relaxed) {
                        break;
                    }

                    let trigger = crossbeam::select! {
                        recv(command_rx) -> msg => match msg {
                            Ok(Command::Trigger) => true,
                            Ok(Command::Stop) | Err(_) => break,
                        },
                        recv(ticker) -> _ => false,
                    };

                    let snapshots = match core.poll(runner.as_ref(), trigger) {
                        Ok(snapshots) => snapshots,
                        Err(e) => {
                            error!("{}", e);
                            continue;
                        }
                    };
                    for snapshot in snapshots {
                        if !deliver(&snapshot_tx, snapshot, &thread_stop) {
                            return;
                        }
                    }
                }
                debug!("watcher stopped");
            })?;

        Ok(Self {
            commands: command_tx,
            snapshots: snapshot_rx,
            stop,
            thread: Some(thread),
        })
    }

    /// Request an immediate poll that reports every watched group as changed.
    pub fn trigger(&self) {
        // The thread may already have exited; nothing to trigger then.
        let _ = self.commands.send(Command::Trigger);
    }

    /// Block until the next snapshot. `None` once the watcher has stopped.
    pub fn next(&self) -> Option<PinnedSnapshot> {
        self.snapshots.recv().ok()
    }

    /// A pending snapshot, without blocking.
    pub fn try_next(&self) -> Option<PinnedSnapshot> {
        self.snapshots.try_recv().ok()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<PinnedSnapshot> {
        self.snapshots.recv_timeout(timeout).ok()
    }

    pub fn is_alive(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop polling and wait for the thread. An in-flight query is allowed
    /// to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.commands.send(Command::Stop);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("watcher thread panicked");
            }
        }
    }
}

impl Drop for RemoteWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Send `snapshot`, giving up when the consumer is gone or a stop was
/// requested while the channel was full.
fn deliver(tx: &Sender<PinnedSnapshot>, mut snapshot: PinnedSnapshot, stop: &AtomicBool) -> bool {
    loop {
        match tx.send_timeout(snapshot, SEND_RETRY) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(returned)) => {
                if stop.load(Ordering::Relaxed) {
                    return false;
                }
                snapshot = returned;
            }
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::mock::MockRunner;
    use crate::process::ProcessOutput;

    const REMOTE: &str = "git://example.com/poky";

    fn group_layers() -> LayerCollection {
        let mut layers = LayerCollection::new(Some("master"));
        layers.push(Layer::new(
            "meta",
            Some("meta".to_string()),
            Some(SourceDescriptor::git(Some(REMOTE), Some("master"))),
        ));
        layers.push(Layer::new(
            "meta-xilinx",
            None,
            Some(SourceDescriptor::local("meta-xilinx", None)),
        ));
        layers
    }

    fn core() -> WatcherCore {
        let mut core = WatcherCore::new();
        core.add_layers(group_layers());
        core
    }

    fn ls_remote(sha: &str) -> ProcessOutput {
        ProcessOutput::ok(format!(
            "{sha}\tHEAD\n{sha}\trefs/heads/master\n999\trefs/heads/daisy\n"
        ))
    }

    #[test]
    fn test_ref_pairs_use_branch_refs() {
        let core = core();
        assert_eq!(
            core.groups()[0].ref_pairs(),
            vec![(REMOTE.to_string(), "refs/heads/master".to_string())]
        );
        assert_eq!(core.remotes(), vec![REMOTE.to_string()]);
    }

    #[test]
    fn test_identical_polls_enqueue_nothing() {
        let runner = MockRunner::new().on(&["ls-remote"], ls_remote("aaa"));
        let mut core = core();

        assert!(core.poll(&runner, false).unwrap().is_empty());
        assert!(core.poll(&runner, false).unwrap().is_empty());
        assert_eq!(runner.count("ls-remote"), 2);
        assert_eq!(core.groups()[0].state()[REMOTE]["refs/heads/master"], "aaa");
    }

    #[test]
    fn test_moved_branch_produces_one_pinned_snapshot() {
        let runner = MockRunner::new()
            .once(&["ls-remote"], ls_remote("aaa"))
            .once(&["ls-remote"], ls_remote("bbb"));
        let mut core = core();

        assert!(core.poll(&runner, false).unwrap().is_empty());
        let snapshots = core.poll(&runner, false).unwrap();
        assert_eq!(snapshots.len(), 1);

        let pinned = &snapshots[0].pinned;
        assert_eq!(
            pinned.get("meta").and_then(|l| l.git_source()).and_then(|g| g.r#ref.as_deref()),
            Some("bbb")
        );
        assert_eq!(
            pinned.get("meta-xilinx").and_then(|l| l.source.clone()),
            Some(SourceDescriptor::local("meta-xilinx", None))
        );
        assert_eq!(
            snapshots[0].original.get("meta").and_then(|l| l.git_source()).and_then(|g| g.r#ref.as_deref()),
            Some("master")
        );
    }

    #[test]
    fn test_trigger_forces_snapshot() {
        let runner = MockRunner::new().on(&["ls-remote"], ls_remote("aaa"));
        let mut core = core();
        let snapshots = core.poll(&runner, true).unwrap();
        assert_eq!(snapshots.len(), 1);
        let document = snapshots[0].document();
        assert_eq!(document.layers.len(), 2);
        assert_ne!(document.hash, document.original_hash);
    }

    #[test]
    fn test_failed_query_leaves_state_untouched() {
        let runner = MockRunner::new()
            .once(&["ls-remote"], ls_remote("aaa"))
            .once(&["ls-remote"], ProcessOutput::failed(128, "fatal: unable to access"))
            .once(&["ls-remote"], ls_remote("bbb"));
        let mut core = core();

        core.poll(&runner, false).unwrap();
        let err = core.poll(&runner, false).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(core.groups()[0].state()[REMOTE]["refs/heads/master"], "aaa");

        // The retry still compares against the last good state.
        assert_eq!(core.poll(&runner, false).unwrap().len(), 1);
    }

    #[test]
    fn test_background_watcher_delivers_triggered_snapshot() {
        let runner: Arc<dyn ProcessRunner> =
            Arc::new(MockRunner::new().on(&["ls-remote"], ls_remote("aaa")));
        let watcher = RemoteWatcher::spawn(core(), runner, Duration::from_secs(3600)).unwrap();
        assert!(watcher.try_next().is_none());

        watcher.trigger();
        let snapshot = watcher.wait_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(
            snapshot.pinned.get("meta").and_then(|l| l.git_source()).and_then(|g| g.r#ref.as_deref()),
            Some("aaa")
        );
        assert!(watcher.is_alive());
        watcher.stop();
    }

    #[test]
    fn test_pin_document_serializes() {
        let snapshot = PinnedSnapshot {
            original: group_layers(),
            pinned: group_layers(),
            observed_at: Utc::now(),
        };
        let yaml = serde_yaml::to_string(&snapshot.document()).unwrap();
        assert!(yaml.contains("observed_at"));
        assert!(yaml.contains("original_hash"));
        let back: PinDocument = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.layers.len(), 2);
    }
}
