use anyhow::{Context, Result};
use log::info;
use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::{
    models::{ImageBuildSpec, ImageTag},
    services::ContainerBackend,
};

type Clock = dyn Fn() -> Result<u64> + Send + Sync;

/// Builds images and hands out a fresh timestamped tag for every build.
#[derive(Clone)]
pub struct ImageBuilder {
    backend: Arc<dyn ContainerBackend>,
    clock: Arc<Clock>,
}

impl ImageBuilder {
    pub fn new<B>(backend: B) -> ImageBuilder
    where
        B: 'static + ContainerBackend,
    {
        ImageBuilder::with_clock(backend, unix_seconds)
    }

    pub fn with_clock<B, C>(backend: B, clock: C) -> ImageBuilder
    where
        B: 'static + ContainerBackend,
        C: 'static + Fn() -> Result<u64> + Send + Sync,
    {
        ImageBuilder {
            backend: Arc::new(backend),
            clock: Arc::new(clock),
        }
    }

    pub fn build(&self, spec: &ImageBuildSpec) -> Result<ImageTag> {
        let tag = ImageTag::timestamped(&spec.name, (self.clock)()?);

        let mut tags = spec
            .tags
            .iter()
            .map(|extra| ImageTag(extra.clone()))
            .collect::<Vec<_>>();
        tags.push(tag.clone());

        info!("building {} from {:?}", tag, spec.context);
        self.backend
            .build_image(spec, &tags)
            .with_context(|| format!("unable to build image {}", tag))?;

        Ok(tag)
    }
}

fn unix_seconds() -> Result<u64> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before the unix epoch")?;
    Ok(now.as_secs())
}
