use anyhow::{anyhow, Context, Result};
use log::debug;
use serde::Deserialize;
use std::{
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use tempfile::NamedTempFile;

use crate::{
    models::{ReleaseName, ValueOverrides},
    services::ReleaseBackend,
};

#[derive(Clone, Debug, Deserialize)]
struct ListedRelease {
    name: String,
}

/// Manages releases through the helm CLI.
pub struct HelmBackend {
    helm: PathBuf,
    namespace: String,
    kube_context: Option<String>,
}

impl HelmBackend {
    pub fn new<P, N>(helm: P, namespace: N, kube_context: Option<String>) -> HelmBackend
    where
        P: Into<PathBuf>,
        N: Into<String>,
    {
        HelmBackend {
            helm: helm.into(),
            namespace: namespace.into(),
            kube_context,
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.helm);
        command.arg("--namespace").arg(&self.namespace);
        if let Some(kube_context) = &self.kube_context {
            command.arg("--kube-context").arg(kube_context);
        }
        command
    }

    /// Runs `helm <action> <release> <chart> --values <file>`, letting helm
    /// print straight to the terminal.
    fn apply(
        &self,
        action: &str,
        name: &ReleaseName,
        chart_path: &Path,
        values: &ValueOverrides,
    ) -> Result<()> {
        let values_file = write_values(values)?;

        let mut command = self.command();
        command
            .arg(action)
            .arg(&name.0)
            .arg(chart_path)
            .arg("--values")
            .arg(values_file.path());

        debug!("running {:?}", command);
        let status = command
            .status()
            .with_context(|| format!("could not run {:?}", self.helm))?;
        if !status.success() {
            return Err(anyhow!("helm {} exited with {}", action, status));
        }

        Ok(())
    }
}

impl ReleaseBackend for HelmBackend {
    fn list_releases(&self, name: &ReleaseName) -> Result<Vec<ReleaseName>> {
        let mut command = self.command();
        command
            .arg("list")
            .arg("--all")
            .arg("--output")
            .arg("json")
            .arg("--filter")
            .arg(format!("^{}$", name.0))
            .stderr(Stdio::inherit());

        debug!("running {:?}", command);
        let output = command
            .output()
            .with_context(|| format!("could not run {:?}", self.helm))?;
        if !output.status.success() {
            return Err(anyhow!("helm list exited with {}", output.status));
        }

        parse_release_list(&output.stdout, name)
    }

    fn install_release(
        &self,
        name: &ReleaseName,
        chart_path: &Path,
        values: &ValueOverrides,
    ) -> Result<()> {
        self.apply("install", name, chart_path, values)
    }

    fn upgrade_release(
        &self,
        name: &ReleaseName,
        chart_path: &Path,
        values: &ValueOverrides,
    ) -> Result<()> {
        self.apply("upgrade", name, chart_path, values)
    }
}

/// Keeps exact name matches only, the filter is a regex on helm's side.
fn parse_release_list(output: &[u8], name: &ReleaseName) -> Result<Vec<ReleaseName>> {
    if output.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Vec::new());
    }

    let releases: Vec<ListedRelease> =
        serde_json::from_slice(output).context("could not parse helm list output")?;

    Ok(releases
        .into_iter()
        .filter(|release| release.name == name.0)
        .map(|release| ReleaseName(release.name))
        .collect())
}

fn write_values(values: &ValueOverrides) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("goku-values-")
        .suffix(".yaml")
        .tempfile()?;
    serde_yaml::to_writer(&mut file, values).context("could not serialize value overrides")?;
    file.flush()?;
    Ok(file)
}
