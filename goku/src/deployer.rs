use anyhow::{anyhow, Context, Result};
use log::info;
use std::{path::Path, sync::Arc};

use crate::{
    models::{ReleaseName, ReleaseOperation, ValueOverrides},
    services::ReleaseBackend,
};

/// Installs or upgrades the `goku-<chart>` release of a chart.
#[derive(Clone)]
pub struct ChartDeployer {
    backend: Arc<dyn ReleaseBackend>,
}

impl ChartDeployer {
    pub fn new<B>(backend: B) -> ChartDeployer
    where
        B: 'static + ReleaseBackend,
    {
        ChartDeployer {
            backend: Arc::new(backend),
        }
    }

    /// Replaces the release's values with `overrides`, installing the release
    /// first if it doesn't exist yet.
    pub fn deploy(
        &self,
        chart_name: &str,
        chart_path: &Path,
        overrides: &ValueOverrides,
    ) -> Result<ReleaseOperation> {
        let release = ReleaseName::for_chart(chart_name);

        let existing = self
            .backend
            .list_releases(&release)
            .with_context(|| format!("could not look up release {}", release))?;

        let operation = match existing.len() {
            0 => ReleaseOperation::Install,
            1 => ReleaseOperation::Upgrade,
            count => {
                return Err(anyhow!(
                    "found {} releases named {}, refusing to pick one",
                    count,
                    release
                ))
            }
        };

        match operation {
            ReleaseOperation::Install => {
                info!("installing release {} from {:?}", release, chart_path);
                self.backend
                    .install_release(&release, chart_path, overrides)
                    .with_context(|| format!("failed to install release {}", release))?;
            }
            ReleaseOperation::Upgrade => {
                info!("upgrading release {} from {:?}", release, chart_path);
                self.backend
                    .upgrade_release(&release, chart_path, overrides)
                    .with_context(|| format!("failed to upgrade release {}", release))?;
            }
        }

        Ok(operation)
    }
}
