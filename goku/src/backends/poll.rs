use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{unbounded, Sender};
use log::{debug, info};
use notify::{Config, Event, EventKind, RecursiveMode, Watcher};
use std::{
    fs,
    path::{Component, Path},
    time::Duration,
};

use crate::{
    models::{ChangeEvent, ChangeKind},
    services::{ChangeStream, ChangeWatcher},
};

/// Polls a directory tree for changes. Every change is forwarded as its own
/// event, bursts are not coalesced.
pub struct PollWatcher {
    interval: Duration,
}

impl PollWatcher {
    pub fn new(interval: Duration) -> PollWatcher {
        PollWatcher { interval }
    }
}

impl ChangeWatcher for PollWatcher {
    fn watch(&self, path: &Path) -> Result<ChangeStream> {
        fs::metadata(path).with_context(|| format!("could not watch {:?}", path))?;

        let (sender, receiver) = unbounded();
        let root = path.to_path_buf();

        let handler = move |result: notify::Result<Event>| forward(&root, &sender, result);
        let config = Config::default().with_poll_interval(self.interval);
        let mut watcher = notify::PollWatcher::new(handler, config)
            .context("could not create file watcher")?;

        watcher
            .watch(path, RecursiveMode::Recursive)
            .with_context(|| format!("could not watch {:?}", path))?;
        info!("watching {:?} for changes", path);

        Ok(ChangeStream::new(receiver, watcher))
    }
}

fn forward(root: &Path, sender: &Sender<Result<ChangeEvent>>, result: notify::Result<Event>) {
    let item = match result {
        Ok(event) => match change_event(root, event) {
            Some(event) => Ok(event),
            None => return,
        },
        Err(err) => Err(anyhow!("file watcher failed: {}", err)),
    };

    // The receiver is gone once its watch task has stopped.
    let _ = sender.send(item);
}

fn change_event(root: &Path, event: Event) -> Option<ChangeEvent> {
    let kind = match event.kind {
        EventKind::Access(_) => return None,
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Modify(_) => ChangeKind::Modified,
        EventKind::Remove(_) => ChangeKind::Removed,
        _ => ChangeKind::Other,
    };

    let paths = event
        .paths
        .into_iter()
        .filter(|path| !is_hidden(root, path))
        .collect::<Vec<_>>();
    if paths.is_empty() {
        debug!("ignoring change to hidden files");
        return None;
    }

    Some(ChangeEvent { kind, paths })
}

/// True if any component below `root` starts with a dot.
fn is_hidden(root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.components().any(|component| match component {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    #[test]
    fn hidden_entries_are_detected_below_root() {
        let root = Path::new("/work/.project/src");
        assert!(!is_hidden(root, Path::new("/work/.project/src/main.rs")));
        assert!(is_hidden(root, Path::new("/work/.project/src/.git/index")));
        assert!(is_hidden(root, Path::new("/work/.project/src/.main.rs.swp")));
    }

    #[test]
    fn hidden_only_events_are_dropped() {
        let root = Path::new("/src");
        let dropped = change_event(root, event(EventKind::Create(CreateKind::File), &["/src/.cache"]));
        assert_eq!(dropped, None);

        let kept = change_event(
            root,
            event(
                EventKind::Modify(ModifyKind::Any),
                &["/src/.cache", "/src/app.py"],
            ),
        );
        assert_eq!(
            kept,
            Some(ChangeEvent {
                kind: ChangeKind::Modified,
                paths: vec![PathBuf::from("/src/app.py")],
            })
        );
    }

    #[test]
    fn access_events_are_ignored() {
        let root = Path::new("/src");
        let access = event(EventKind::Access(AccessKind::Any), &["/src/app.py"]);
        assert_eq!(change_event(root, access), None);
    }

    #[test]
    fn watcher_errors_are_forwarded() {
        let (sender, receiver) = unbounded();
        forward(
            Path::new("/src"),
            &sender,
            Err(notify::Error::generic("poll failed")),
        );
        let item = receiver.try_recv().unwrap();
        assert!(item.unwrap_err().to_string().contains("poll failed"));
    }

    #[test]
    fn reports_file_writes() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app.py"), "print(1)\n").unwrap();

        let watcher = PollWatcher::new(Duration::from_millis(20));
        let stream = watcher.watch(dir.path()).unwrap();

        fs::write(dir.path().join("new.py"), "print(2)\n").unwrap();

        // The directory itself is reported as modified too.
        let created = stream
            .map(|event| event.unwrap())
            .find(|event| event.paths.iter().any(|path| path.ends_with("new.py")));
        assert_eq!(created.map(|event| event.kind), Some(ChangeKind::Created));
    }

    #[test]
    fn missing_path_fails_to_watch() {
        let dir = TempDir::new().unwrap();
        let watcher = PollWatcher::new(Duration::from_millis(20));
        assert!(watcher.watch(&dir.path().join("absent")).is_err());
    }
}
