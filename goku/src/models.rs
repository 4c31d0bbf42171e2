use serde::Serialize;
use std::{collections::BTreeMap as Map, fmt, path::PathBuf};

const RELEASE_PREFIX: &str = "goku-";

#[derive(Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub struct ImageName(pub String);

/// A fully qualified image reference, `name:tag`.
#[derive(Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ImageTag(pub String);

impl ImageTag {
    /// Tags are only unique per second, two builds of one image within the
    /// same second get the same tag.
    pub fn timestamped(name: &ImageName, unix_seconds: u64) -> ImageTag {
        ImageTag(format!("{}:{}", name.0, unix_seconds))
    }
}

impl fmt::Display for ImageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub struct ReleaseName(pub String);

impl ReleaseName {
    pub fn for_chart(chart_name: &str) -> ReleaseName {
        ReleaseName(format!("{}{}", RELEASE_PREFIX, chart_name))
    }
}

impl fmt::Display for ReleaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Chart value names mapped to the image tag most recently built for them.
pub type ValueOverrides = Map<String, ImageTag>;

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ImageBuildSpec {
    pub name: ImageName,
    pub context: PathBuf,
    /// Relative to `context`.
    pub dockerfile: PathBuf,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageSpec {
    /// The value name the chart templates substitute the image tag into.
    pub value_name: String,
    pub watch_path: PathBuf,
    pub build: ImageBuildSpec,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartSpec {
    pub name: String,
    pub path: PathBuf,
    pub images: Vec<ImageSpec>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Project {
    /// Directory of the config file, every other path is resolved against it.
    pub base_dir: PathBuf,
    pub charts: Vec<ChartSpec>,
    pub tools: Map<String, Map<String, String>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReleaseOperation {
    Install,
    Upgrade,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub paths: Vec<PathBuf>,
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        for path in self.paths.iter() {
            write!(f, " {}", path.display())?;
        }
        Ok(())
    }
}
