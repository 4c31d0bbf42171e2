use anyhow::{anyhow, Result};
use crossbeam_channel::bounded;
use crossterm::{
    style::{self, Colorize, Styler},
    QueueableCommand,
};
use log::info;
use std::{
    env,
    io::{stdout, Write},
    path::{Path, PathBuf},
    time::Duration,
};
use structopt::StructOpt;

use backends::{DockerBackend, HelmBackend, PollWatcher};
use builder::ImageBuilder;
use controller::Controller;
use deployer::ChartDeployer;
use frontends::GokuFileFrontend;
use models::Project;
use services::ProjectFrontend;

mod backends;
mod builder;
mod controller;
mod deployer;
mod frontends;
mod models;
mod services;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "goku",
    about = "Rebuilds images and redeploys their helm charts to a local kubernetes cluster whenever their sources change."
)]
enum Opt {
    /// Builds and deploys every chart in goku.yaml, then rebuilds and
    /// redeploys on every change until interrupted.
    Watch {
        /// Path to goku.yaml. Looked up in the current directory and its
        /// parents when not given.
        #[structopt(parse(from_os_str))]
        config: Option<PathBuf>,

        #[structopt(long, default_value = "default")]
        /// Namespace releases are installed into.
        namespace: String,

        #[structopt(long, default_value = "helm", parse(from_os_str))]
        helm: PathBuf,

        #[structopt(long)]
        kube_context: Option<String>,

        #[structopt(long, default_value = "docker", parse(from_os_str))]
        docker: PathBuf,

        #[structopt(long, default_value = "100")]
        /// Milliseconds between scans of the watched directories.
        poll_interval: u64,
    },
    /// Prints the parsed goku.yaml with every path resolved.
    Config {
        #[structopt(parse(from_os_str))]
        config: Option<PathBuf>,
    },
    /// Prints the goku version.
    Version,
}

fn find_config_file<P: AsRef<Path>>(path: P) -> Option<PathBuf> {
    for path in path.as_ref().ancestors() {
        let config_file_path = path.join("goku.yaml");
        if config_file_path.exists() {
            return Some(config_file_path);
        }

        let config_file_path = path.join("goku.yml");
        if config_file_path.exists() {
            return Some(config_file_path);
        }
    }

    None
}

fn load_project(config: Option<PathBuf>) -> Result<Project> {
    let config_path = match config {
        Some(config_path) => config_path,
        None => {
            let current_dir = env::current_dir()?;
            find_config_file(current_dir).ok_or_else(|| {
                anyhow!("Couldn't find a goku.yaml file in the current working directory or any of its parents.")
            })?
        }
    };
    info!("found config file {:?}", config_path);

    let mut frontend = GokuFileFrontend::new();
    let project = frontend.project(&config_path)?;
    info!("parsed {} chart(s)", project.charts.len());

    Ok(project)
}

fn main() -> Result<()> {
    pretty_env_logger::init_custom_env("GOKU_LOG");

    let opt = Opt::from_args();

    let mut stdout = stdout();

    match opt {
        Opt::Watch {
            config,
            namespace,
            helm,
            kube_context,
            docker,
            poll_interval,
        } => {
            let project = load_project(config)?;

            let (shutdown_tx, shutdown) = bounded(1);
            ctrlc::set_handler(move || {
                let _ = shutdown_tx.try_send(());
            })?;

            let builder = ImageBuilder::new(DockerBackend::new(docker));
            let deployer = ChartDeployer::new(HelmBackend::new(helm, namespace, kube_context));
            let watcher = PollWatcher::new(Duration::from_millis(poll_interval));

            print_info(
                &mut stdout,
                "a failed build or deploy stops every watcher, not just the one that failed.\n",
            )?;

            let controller = Controller::init(project, builder, deployer, watcher);
            controller.run(&shutdown)?;
        }
        Opt::Config { config } => {
            let project = load_project(config)?;
            println!("{:#?}", project);
        }
        Opt::Version => {
            println!("goku v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn print_info(stdout: &mut impl Write, message: &str) -> Result<()> {
    stdout
        .queue(style::PrintStyledContent("INFO: ".cyan().bold()))?
        .queue(style::Print(message))?
        .flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn finds_config_in_parent_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("goku.yaml"), "charts: []\n").unwrap();
        let nested = dir.path().join("services/web/src");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_config_file(&nested), Some(dir.path().join("goku.yaml")));
    }

    #[test]
    fn nearest_config_wins() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("goku.yaml"), "charts: []\n").unwrap();
        let nested = dir.path().join("web");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("goku.yml"), "charts: []\n").unwrap();

        assert_eq!(find_config_file(&nested), Some(nested.join("goku.yml")));
    }

    #[test]
    fn explicit_config_path_is_loaded() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("dev.yaml");
        fs::write(
            &config_path,
            "charts:\n  - name: web\n    path: chart\n    images:\n      - imageValueName: imageTag\n        name: web\n        path: src\n",
        )
        .unwrap();

        let project = load_project(Some(config_path)).unwrap();
        assert_eq!(project.charts[0].images[0].watch_path, dir.path().join("src"));
    }

    #[test]
    fn watch_defaults() {
        let opt = Opt::from_iter(vec!["goku", "watch"]);
        match opt {
            Opt::Watch {
                config,
                namespace,
                poll_interval,
                ..
            } => {
                assert_eq!(config, None);
                assert_eq!(namespace, "default");
                assert_eq!(poll_interval, 100);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
