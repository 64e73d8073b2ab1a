//! indirect-core: Core types for indirect inelastic data reduction.
//!
//! This crate provides the workspace model (spectra sharing an axis plus run
//! metadata), the run-scoped store replacing a global workspace registry,
//! detector grouping, reduction configuration and the collaborator traits
//! used to load raw runs and persist results.
//!

pub mod config;
pub mod error;
pub mod grouping;
pub mod metadata;
pub mod services;
pub mod store;
pub mod workspace;

pub use config::{Analyser, FacilityConfig, OutputNames, Reflection, ReductionConfig, UnmirrorOption};
pub use error::{Error, Result};
pub use grouping::{DetectorGroup, DetectorGrouping};
pub use metadata::{LogValue, RunMetadata, RunNumber};
pub use services::{LoadRequest, ResultSink, RunSource};
pub use store::{GroupSnapshot, Phase, RunContext, SpectrumStore, WorkspaceId};
pub use workspace::{AxisUnit, Spectrum, Workspace};
