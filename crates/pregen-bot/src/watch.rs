//! Development-mode source watcher.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{error, info};

use pregen_engine::{Engine, Session};

/// Whether a filesystem event should trigger a reload. Events that only
/// touch ignored directories (build output, the cache itself) do not.
fn is_relevant(event: &notify::Event, ignored: &[PathBuf]) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    ) && event
        .paths
        .iter()
        .any(|path| !ignored.iter().any(|dir| path.starts_with(dir)))
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Watch `root` recursively and dry-run the handlers again on change.
///
/// Handler code is compiled in, so edits to it still need a rebuild. A reload
/// refreshes static snapshots that depend on files under `root`, such as the
/// text `/about` serves. The watcher lives inside the returned task; reloads
/// go through the engine's reload coordinator, so bursts collapse into one.
pub fn spawn<S: Session>(
    engine: Arc<Engine<S>>,
    root: &Path,
    ignored: &[&Path],
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let root = absolute(root)?;
    let ignored = ignored
        .iter()
        .map(|dir| absolute(dir))
        .collect::<std::io::Result<Vec<_>>>()?;

    let (event_tx, mut event_rx) = mpsc::channel::<()>(16);
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                if is_relevant(&event, &ignored) {
                    let _ = event_tx.try_send(());
                }
            }
            Err(err) => {
                error!(%err, "source watcher error");
            }
        },
        notify::Config::default(),
    )?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    info!(root = %root.display(), "watching sources");

    let debounce = engine.reload_coordinator().debounce();
    Ok(tokio::spawn(async move {
        let _watcher = watcher;
        while event_rx.recv().await.is_some() {
            tokio::time::sleep(debounce).await;
            while event_rx.try_recv().is_ok() {}

            match engine.reload().await {
                Ok(Some(report)) => info!("files changed, snapshots refreshed\n{report}"),
                Ok(None) => {}
                Err(e) => error!(error = %e, "reload failed"),
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};

    fn event(kind: EventKind, path: &str) -> notify::Event {
        notify::Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn cache_writes_are_ignored() {
        let ignored = vec![PathBuf::from("/bot/.pregen"), PathBuf::from("/bot/target")];
        assert!(!is_relevant(
            &event(EventKind::Create(CreateKind::File), "/bot/.pregen/commands/greet.json"),
            &ignored
        ));
        assert!(!is_relevant(
            &event(EventKind::Modify(ModifyKind::Any), "/bot/target/debug/pregen"),
            &ignored
        ));
        assert!(is_relevant(
            &event(EventKind::Modify(ModifyKind::Any), "/bot/src/handlers.rs"),
            &ignored
        ));
    }

    #[test]
    fn reads_are_ignored() {
        assert!(!is_relevant(
            &event(EventKind::Access(AccessKind::Any), "/bot/src/handlers.rs"),
            &[]
        ));
    }
}
