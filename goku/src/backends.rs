mod docker;
mod helm;
mod poll;

pub use docker::DockerBackend;
pub use helm::HelmBackend;
pub use poll::PollWatcher;
