use anyhow::{anyhow, Context, Result};
use crossterm::{
    style::{Color, Print, ResetColor, SetForegroundColor},
    QueueableCommand,
};
use ignore::WalkBuilder;
use log::debug;
use number_prefix::NumberPrefix;
use std::{
    fs::{File, OpenOptions},
    io::{stdout, BufRead, BufReader, Read, Write},
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use tar::Builder as TarBuilder;
use tempfile::TempDir;

use crate::{
    models::{ImageBuildSpec, ImageTag},
    services::ContainerBackend,
};

/// Builds images with the docker CLI, sending the context as a tar stream.
pub struct DockerBackend {
    docker: PathBuf,
}

impl DockerBackend {
    pub fn new<P: Into<PathBuf>>(docker: P) -> DockerBackend {
        DockerBackend {
            docker: docker.into(),
        }
    }
}

impl ContainerBackend for DockerBackend {
    fn build_image(&self, spec: &ImageBuildSpec, tags: &[ImageTag]) -> Result<()> {
        let temp_dir = TempDir::new()?;
        let temp_context_path = temp_dir.path().join("context.tar");
        let temp_context = {
            let mut options = OpenOptions::new();
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            options.write(true).create(true).open(&temp_context_path)?
        };

        let context_size = archive_context(&spec.context, temp_context)
            .with_context(|| format!("could not archive build context {:?}", spec.context))?;

        match NumberPrefix::binary(context_size as f32) {
            NumberPrefix::Standalone(bytes) => println!("Archived build context ({} bytes)", bytes),
            NumberPrefix::Prefixed(prefix, n) => {
                println!("Archived build context ({:.1} {}B)", n, prefix)
            }
        };

        let mut command = Command::new(&self.docker);
        command
            .arg("build")
            .arg("--rm")
            .arg("--file")
            .arg(slash_path(&spec.dockerfile)?);
        for tag in tags {
            command.arg("--tag").arg(&tag.0);
        }
        command
            .arg("-")
            .stdin(Stdio::from(File::open(&temp_context_path)?))
            .stdout(Stdio::piped());

        debug!("running {:?}", command);
        let mut child = command
            .spawn()
            .with_context(|| format!("could not run {:?}", self.docker))?;

        if let Some(output) = child.stdout.take() {
            print_build_output(output)?;
        }

        let status = child.wait()?;
        if !status.success() {
            return Err(anyhow!("docker build exited with {}", status));
        }

        temp_dir.close()?;

        Ok(())
    }
}

/// Writes every regular file under `context` to a tar stream, named relative
/// to `context` with `/` separators. Returns the total size of the files.
///
/// Nothing is filtered here. The daemon applies `.dockerignore` to the context
/// it receives.
pub(crate) fn archive_context<W: Write>(context: &Path, writer: W) -> Result<u64> {
    let mut tar = TarBuilder::new(writer);
    let walk = WalkBuilder::new(context).standard_filters(false).build();

    let mut context_size = 0;
    for result in walk {
        let result = result?;
        if !result.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }

        let relative = result.path().strip_prefix(context)?;
        if relative.as_os_str().is_empty() {
            continue;
        }

        tar.append_path_with_name(result.path(), slash_path(relative)?)?;
        context_size += result.metadata()?.len();
    }

    tar.finish()?;

    Ok(context_size)
}

fn slash_path(path: &Path) -> Result<String> {
    let parts = path
        .components()
        .map(|component| {
            component
                .as_os_str()
                .to_str()
                .ok_or_else(|| anyhow!("path {:?} is not valid utf-8", path))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(parts.join("/"))
}

fn print_build_output<R: Read>(output: R) -> Result<()> {
    let stdout = stdout();
    for line in BufReader::new(output).lines() {
        let line = line?;
        stdout
            .lock()
            .queue(SetForegroundColor(Color::Cyan))?
            .queue(Print(line))?
            .queue(ResetColor)?
            .queue(Print("\n"))?
            .flush()?;
    }

    Ok(())
}
