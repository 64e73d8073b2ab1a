//! indirect-algorithms: Unmirroring and energy-transfer reduction.
//!
//! This crate turns grouped time-channel spectra of a mirrored Doppler
//! acquisition into energy-transfer spectra:
//! - **Energy conversion** - affine time channel to energy transfer mapping
//! - **Monitor range** - valid plateau between the two monitor peaks
//! - **Mirror splitting** - crop, normalise, mask and convert one half
//! - **Peak alignment** - Gaussian EPP fit and circular shifting
//! - **Unmirroring** - combination policies 0 to 4
//! - **Batches** - per-run reduction and output selection
//!
#![warn(missing_docs)]

pub mod batch;
pub mod energy;
pub mod epp;
pub mod monitor;
pub mod reducer;
pub mod shifter;
pub mod splitter;
pub mod unmirror;

pub use batch::{BatchController, OutputEntry, ReductionOutput};
pub use energy::{convert_to_energy_transfer, EnergySource, EnergyTransfer};
pub use epp::{find_epp, peak_maximum_position, GaussianPeak, PeakSearch};
pub use monitor::{monitor_range, MonitorRange};
pub use reducer::RunReducer;
pub use shifter::{circular_shift, peak_positions, shift_spectra};
pub use splitter::{ExtractedHalf, MirrorSplitter};
pub use unmirror::{UnmirrorEngine, UnmirrorOutput};
