//! Watches for configuration written by the earlier installer screens.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use installflow_core::bridge::LoopSender;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::Controller;

#[derive(Clone, Debug)]
pub struct HandoffTargets {
    pub postinstall_config: PathBuf,
    pub network_source: Option<PathBuf>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Handoff {
    PostinstallConfig,
    NetworkConfig(PathBuf),
}

impl HandoffTargets {
    fn watched_dirs(&self) -> HashSet<PathBuf> {
        std::iter::once(&self.postinstall_config)
            .chain(self.network_source.as_ref())
            .filter_map(|path| path.parent())
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .collect()
    }

    /// Hand-offs signalled by a filesystem event.
    pub fn classify(&self, event: &Event) -> Vec<Handoff> {
        if !(event.kind.is_create() || event.kind.is_modify()) {
            return Vec::new();
        }
        let mut found = Vec::new();
        for path in &event.paths {
            if path == &self.postinstall_config && !found.contains(&Handoff::PostinstallConfig) {
                found.push(Handoff::PostinstallConfig);
            }
            if self.network_source.as_ref() == Some(path) {
                let handoff = Handoff::NetworkConfig(path.clone());
                if !found.contains(&handoff) {
                    found.push(handoff);
                }
            }
        }
        found
    }
}

/// Forward hand-offs to the event loop from a watcher thread.
///
/// Returns once the watches are registered, so files that exist by then are
/// either already on disk or will be reported.
pub fn start_handoff_watcher(targets: HandoffTargets, loop_tx: LoopSender<Controller>) {
    let dirs = targets.watched_dirs();
    let (ready_tx, ready_rx) = mpsc::sync_channel::<()>(1);
    let spawned = thread::Builder::new()
        .name("installflow-handoff".to_string())
        .spawn(move || {
            let (event_tx, event_rx) = mpsc::channel::<notify::Result<Event>>();
            let mut watcher = match RecommendedWatcher::new(
                move |res| {
                    let _ = event_tx.send(res);
                },
                notify::Config::default(),
            ) {
                Ok(watcher) => watcher,
                Err(err) => {
                    warn!(?err, "failed to create hand-off watcher");
                    return;
                }
            };

            for dir in &dirs {
                if let Err(err) = std::fs::create_dir_all(dir) {
                    warn!(?err, dir = %dir.display(), "failed to create hand-off directory");
                }
                if let Err(err) = watcher.watch(dir, RecursiveMode::NonRecursive) {
                    warn!(?err, dir = %dir.display(), "failed to watch hand-off directory");
                }
            }
            let _ = ready_tx.send(());

            while let Ok(event) = event_rx.recv() {
                let Ok(event) = event else {
                    continue;
                };
                for handoff in targets.classify(&event) {
                    if deliver(&loop_tx, handoff).is_err() {
                        debug!("event loop closed; stopping hand-off watcher");
                        return;
                    }
                }
            }
        });
    match spawned {
        // A watcher that failed to start drops the sender; the sweep still runs.
        Ok(_) => {
            if ready_rx.recv().is_err() {
                debug!("hand-off watcher exited before registering watches");
            }
        }
        Err(err) => warn!(?err, "failed to spawn hand-off watcher thread"),
    }
}

fn deliver(
    loop_tx: &LoopSender<Controller>,
    handoff: Handoff,
) -> Result<(), installflow_core::EngineError> {
    info!(?handoff, "configuration handed off");
    match handoff {
        Handoff::PostinstallConfig => {
            loop_tx.call_from_thread(|controller: &mut Controller| {
                controller.postinstall_config_written()
            })
        }
        Handoff::NetworkConfig(source) => {
            loop_tx.call_from_thread(move |controller: &mut Controller| {
                controller.network_config_written(&source)
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use installflow_core::bridge::loop_channel;
    use notify::event::{AccessKind, CreateKind, EventKind, ModifyKind};

    fn targets() -> HandoffTargets {
        HandoffTargets {
            postinstall_config: PathBuf::from("/tmp/installflow/60_postinstall.yaml"),
            network_source: Some(PathBuf::from("/run/installflow/network.yaml")),
        }
    }

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |event, path| event.add_path(PathBuf::from(path)))
    }

    #[test]
    fn watches_each_parent_once() {
        let dirs = targets().watched_dirs();
        assert_eq!(dirs.len(), 2);
        assert!(dirs.contains(Path::new("/tmp/installflow")));
        assert!(dirs.contains(Path::new("/run/installflow")));
    }

    #[test]
    fn creating_the_postinstall_config_is_a_handoff() {
        let found = targets().classify(&event(
            EventKind::Create(CreateKind::File),
            &["/tmp/installflow/60_postinstall.yaml"],
        ));
        assert_eq!(found, vec![Handoff::PostinstallConfig]);
    }

    #[test]
    fn network_writes_carry_the_source_path() {
        let found = targets().classify(&event(
            EventKind::Modify(ModifyKind::Any),
            &["/run/installflow/network.yaml", "/run/installflow/network.yaml"],
        ));
        assert_eq!(
            found,
            vec![Handoff::NetworkConfig(PathBuf::from(
                "/run/installflow/network.yaml"
            ))]
        );
    }

    #[test]
    fn unrelated_files_and_reads_are_ignored() {
        let targets = targets();
        assert!(targets
            .classify(&event(
                EventKind::Create(CreateKind::File),
                &["/tmp/installflow/70_preserved.yaml"],
            ))
            .is_empty());
        assert!(targets
            .classify(&event(
                EventKind::Access(AccessKind::Any),
                &["/tmp/installflow/60_postinstall.yaml"],
            ))
            .is_empty());
    }

    #[tokio::test]
    async fn writes_right_after_start_are_delivered() {
        let dir = tempfile::tempdir().expect("temp dir");
        let handoff_dir = dir.path().join("handoff");
        let targets = HandoffTargets {
            postinstall_config: handoff_dir.join("60_postinstall.yaml"),
            network_source: None,
        };
        let (loop_tx, mut callbacks) = loop_channel::<Controller>();

        start_handoff_watcher(targets.clone(), loop_tx);
        assert!(handoff_dir.is_dir());
        std::fs::write(&targets.postinstall_config, "postinstall: {}\n").expect("hand off");

        let delivered = tokio::time::timeout(Duration::from_secs(10), callbacks.next())
            .await
            .expect("hand-off within timeout");
        assert!(delivered.is_some());
    }
}
