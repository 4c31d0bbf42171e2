use anyhow::Result;
use crossbeam_channel::Receiver;
use std::path::Path;

use crate::models::{ChangeEvent, ImageBuildSpec, ImageTag, Project, ReleaseName, ValueOverrides};

pub trait ProjectFrontend {
    fn project(&mut self, config_path: &Path) -> Result<Project>;
}

pub trait ContainerBackend: Send + Sync {
    /// Builds `spec` and applies every tag in `tags` to the result.
    fn build_image(&self, spec: &ImageBuildSpec, tags: &[ImageTag]) -> Result<()>;
}

pub trait ReleaseBackend: Send + Sync {
    /// Returns the releases whose name is exactly `name`.
    fn list_releases(&self, name: &ReleaseName) -> Result<Vec<ReleaseName>>;

    fn install_release(
        &self,
        name: &ReleaseName,
        chart_path: &Path,
        values: &ValueOverrides,
    ) -> Result<()>;

    fn upgrade_release(
        &self,
        name: &ReleaseName,
        chart_path: &Path,
        values: &ValueOverrides,
    ) -> Result<()>;
}

pub trait ChangeWatcher: Send + Sync {
    fn watch(&self, path: &Path) -> Result<ChangeStream>;
}

/// Change events for one watched path.
///
/// The iterator ends when the watcher closes. An `Err` item is a watcher
/// failure.
pub struct ChangeStream {
    events: Receiver<Result<ChangeEvent>>,
    _guard: Box<dyn Send>,
}

impl ChangeStream {
    /// `guard` is kept alive for as long as the stream is, watchers that stop
    /// on drop go here.
    pub fn new<G: Send + 'static>(events: Receiver<Result<ChangeEvent>>, guard: G) -> ChangeStream {
        ChangeStream {
            events,
            _guard: Box::new(guard),
        }
    }
}

impl Iterator for ChangeStream {
    type Item = Result<ChangeEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        self.events.recv().ok()
    }
}
