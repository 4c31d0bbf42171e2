use anyhow::{anyhow, Error, Result};
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use log::{error, info, warn};
use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
};

use crate::{
    builder::ImageBuilder,
    deployer::ChartDeployer,
    models::{ChartSpec, ImageSpec, ImageTag, Project, ReleaseOperation, ValueOverrides},
    services::{ChangeStream, ChangeWatcher},
};

/// A chart's release together with the value overrides every watch task of
/// that chart writes to.
struct ChartRelease {
    name: String,
    path: PathBuf,
    overrides: Mutex<ValueOverrides>,
}

impl ChartRelease {
    /// Stores `tag` under `value_name` and deploys the chart. The lock is held
    /// until the deploy returns, so deploys of one chart never overlap and each
    /// one sees the overrides exactly as its own write left them.
    fn record_and_deploy(
        &self,
        deployer: &ChartDeployer,
        value_name: &str,
        tag: ImageTag,
    ) -> Result<ReleaseOperation> {
        let mut overrides = self
            .overrides
            .lock()
            .map_err(|_| anyhow!("value overrides of chart {} are poisoned", self.name))?;

        overrides.insert(value_name.to_owned(), tag);
        deployer.deploy(&self.name, &self.path, &overrides)
    }
}

pub struct Controller {
    project: Project,
    builder: ImageBuilder,
    deployer: ChartDeployer,
    watcher: Arc<dyn ChangeWatcher>,
}

impl Controller {
    pub fn init<W>(
        project: Project,
        builder: ImageBuilder,
        deployer: ChartDeployer,
        watcher: W,
    ) -> Controller
    where
        W: 'static + ChangeWatcher,
    {
        Controller {
            project,
            builder,
            deployer,
            watcher: Arc::new(watcher),
        }
    }

    /// Builds, deploys and starts watching every chart, then blocks until
    /// `shutdown` fires or a watch task fails.
    pub fn run(&self, shutdown: &Receiver<()>) -> Result<()> {
        self.start()?.wait(shutdown)
    }

    /// Charts are handled in order. Each chart's images are built one after
    /// the other, the chart is deployed once with all of their tags, and then
    /// one watch task per image is started.
    pub fn start(&self) -> Result<Watching> {
        let (failures, failed) = unbounded();
        let mut handles = Vec::new();

        for chart in self.project.charts.iter() {
            let release = self.bootstrap_chart(chart)?;

            for image in chart.images.iter() {
                let handle = self.spawn_watch(release.clone(), image.clone(), failures.clone())?;
                handles.push(handle);
            }
        }

        Ok(Watching { handles, failed })
    }

    fn bootstrap_chart(&self, chart: &ChartSpec) -> Result<Arc<ChartRelease>> {
        let mut overrides = ValueOverrides::new();
        for image in chart.images.iter() {
            let tag = self.builder.build(&image.build)?;
            overrides.insert(image.value_name.clone(), tag);
        }

        self.deployer.deploy(&chart.name, &chart.path, &overrides)?;

        Ok(Arc::new(ChartRelease {
            name: chart.name.clone(),
            path: chart.path.clone(),
            overrides: Mutex::new(overrides),
        }))
    }

    fn spawn_watch(
        &self,
        release: Arc<ChartRelease>,
        image: ImageSpec,
        failures: Sender<Error>,
    ) -> Result<JoinHandle<()>> {
        let stream = self.watcher.watch(&image.watch_path)?;
        let builder = self.builder.clone();
        let deployer = self.deployer.clone();

        let handle = thread::Builder::new()
            .name(format!("watch-{}", image.build.name.0))
            .spawn(move || {
                if let Err(err) = watch_image(&release, &image, &builder, &deployer, stream) {
                    let err = err.context(format!(
                        "watch of {:?} for chart {} failed",
                        image.watch_path, release.name
                    ));
                    // Nobody is listening once the controller has stopped.
                    let _ = failures.send(err);
                }
            })?;

        Ok(handle)
    }
}

fn watch_image(
    release: &ChartRelease,
    image: &ImageSpec,
    builder: &ImageBuilder,
    deployer: &ChartDeployer,
    stream: ChangeStream,
) -> Result<()> {
    for event in stream {
        let event = event?;
        info!("{}: {}", image.build.name.0, event);

        let tag = builder.build(&image.build)?;
        release.record_and_deploy(deployer, &image.value_name, tag)?;
    }

    warn!(
        "stopped watching {:?}, the other images of chart {} are still watched",
        image.watch_path, release.name
    );
    Ok(())
}

/// The running watch tasks.
pub struct Watching {
    handles: Vec<JoinHandle<()>>,
    failed: Receiver<Error>,
}

impl Watching {
    /// Blocks until `shutdown` fires, a watch task fails, or every watch task
    /// has ended on its own. A failure in any task stops all of them, the
    /// error is returned and the process is expected to exit.
    pub fn wait(self, shutdown: &Receiver<()>) -> Result<()> {
        info!("watching {} image(s) for changes", self.handles.len());

        select! {
            recv(shutdown) -> _ => {
                info!("shutting down");
                Ok(())
            }
            recv(self.failed) -> failure => match failure {
                Ok(err) => {
                    error!("{:#}, stopping every watcher", err);
                    Err(err)
                }
                Err(_) => {
                    for handle in self.handles {
                        let _ = handle.join();
                    }
                    warn!("every watcher has stopped, nothing left to watch");
                    Ok(())
                }
            },
        }
    }
}
