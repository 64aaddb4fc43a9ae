//! # qmtile-runner
//!
//! The terrain tiling pipeline: configuration, tile storage, the
//! `layer.json` descriptor, block assembly and the per-depth orchestrator.
//!
//! ```no_run
//! use qmtile_runner::{Tiler, TilerConfig};
//!
//! let config = TilerConfig::from_file("tiler.yaml")?;
//! let report = Tiler::new(config)?.run()?;
//! report.log_summary();
//! # Ok::<(), qmtile_runner::TilerError>(())
//! ```

pub mod assembler;
pub mod cli;
mod config;
mod error;
pub mod layer;
pub mod pipeline;
mod storage;

pub use assembler::{AssembledBlock, BlockReport, SeedOrigin, TileMatrixAssembler};
pub use cli::{init_logging, CliArgs};
pub use config::TilerConfig;
pub use error::TilerError;
pub use layer::{AvailabilitySink, AvailableRange, LayerDescriptor, LAYER_FILE};
pub use pipeline::{RunReport, Tiler};
pub use storage::{TileStore, TERRAIN_EXTENSION};

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, TilerError>;
