mod progress;
mod styling;
mod summary;
mod tables;

pub use progress::PhaseProgress;
pub use styling::{dim, magenta_bold};
pub use summary::print_summary;

/// Prints the `kfp-lifecycle` banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🧪 kfp-lifecycle"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("TFX template lifecycle harness for Kubeflow Pipelines")
    );
}
