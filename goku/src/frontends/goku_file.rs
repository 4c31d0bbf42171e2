use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::{
    collections::BTreeMap as Map,
    fs::File,
    path::{Component, Path, PathBuf},
};

use crate::{
    models::{ChartSpec, ImageBuildSpec, ImageName, ImageSpec, Project},
    services::ProjectFrontend,
};

const DEFAULT_DOCKERFILE: &str = "Dockerfile";

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GokuFile {
    #[serde(default)]
    pub charts: Vec<Chart>,

    /// Download locations of external tools, per platform.
    #[serde(default)]
    pub tools: Map<String, Map<String, String>>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Chart {
    pub name: String,

    pub path: String,

    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Image {
    pub image_value_name: String,

    pub name: String,

    /// Watched for changes, also the build context unless `context_path` is set.
    pub path: String,

    #[serde(default)]
    pub tags: Vec<String>,

    pub context_path: Option<String>,

    /// Relative to the build context.
    pub dockerfile: Option<String>,
}

pub struct GokuFileFrontend;

impl GokuFileFrontend {
    pub fn new() -> GokuFileFrontend {
        GokuFileFrontend
    }

    fn resolve(file: GokuFile, base_dir: &Path) -> Result<Project> {
        let mut charts = Vec::new();
        for Chart { name, path, images } in file.charts {
            let images = images
                .into_iter()
                .map(|image| resolve_image(image, base_dir))
                .collect::<Result<Vec<_>>>()
                .with_context(|| format!("invalid image in chart {}", name))?;

            charts.push(ChartSpec {
                name,
                path: base_dir.join(path),
                images,
            });
        }

        Ok(Project {
            base_dir: base_dir.to_path_buf(),
            charts,
            tools: file.tools,
        })
    }
}

fn resolve_image(image: Image, base_dir: &Path) -> Result<ImageSpec> {
    let watch_path = base_dir.join(&image.path);
    let context = match image.context_path {
        Some(context_path) => base_dir.join(context_path),
        None => watch_path.clone(),
    };

    let dockerfile = match image.dockerfile {
        Some(dockerfile) if !dockerfile.is_empty() => PathBuf::from(dockerfile),
        _ => PathBuf::from(DEFAULT_DOCKERFILE),
    };
    let inside_context = dockerfile
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    if !inside_context {
        return Err(anyhow!(
            "dockerfile {:?} of image {} must be a relative path inside its build context",
            dockerfile,
            image.name
        ));
    }

    Ok(ImageSpec {
        value_name: image.image_value_name,
        watch_path,
        build: ImageBuildSpec {
            name: ImageName(image.name),
            context,
            dockerfile,
            tags: image.tags,
        },
    })
}

/// The directory a config file lives in, `.` for a bare file name.
fn base_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

impl ProjectFrontend for GokuFileFrontend {
    fn project(&mut self, config_path: &Path) -> Result<Project> {
        let config_file = File::open(config_path)
            .with_context(|| format!("could not read {}", config_path.display()))?;

        let file: GokuFile = serde_yaml::from_reader(config_file)
            .with_context(|| format!("could not parse {}", config_path.display()))?;

        GokuFileFrontend::resolve(file, &base_dir(config_path))
    }
}
