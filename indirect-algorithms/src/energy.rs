//! Time channel to energy transfer conversion.
//!
//! The Doppler drive logs give the maximum energy transfer `E`; the axis of
//! `npt` values is mapped affinely by `x -> (x - imid) * dele` with
//! `imid = floor(npt / 2) + 1` and `dele = 2 E / (npt - 1)`.
#![allow(clippy::cast_precision_loss)]

use indirect_core::metadata::{LOG_DELTA_ENERGY, LOG_MAXIMUM_DELTA_ENERGY, LOG_VELOCITY_PROFILE};
use indirect_core::{AxisUnit, Error, Result, RunMetadata, Workspace};

/// Where the maximum energy transfer came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnergySource {
    /// `Doppler.maximum_delta_energy` with a sinusoidal velocity profile.
    MaximumDeltaEnergy(f64),
    /// `Doppler.delta_energy`; the drive was not in its nominal mode.
    DeltaEnergy(f64),
    /// No usable log: the axis collapses onto zero energy.
    Undetermined,
}

impl EnergySource {
    /// Reads the Doppler drive logs.
    #[must_use]
    pub fn from_metadata(metadata: &RunMetadata) -> Self {
        if metadata.has_log(LOG_MAXIMUM_DELTA_ENERGY) {
            let sinusoidal = metadata
                .log_f64(LOG_VELOCITY_PROFILE)
                .is_some_and(|profile| profile == 0.0);
            match metadata.log_f64(LOG_MAXIMUM_DELTA_ENERGY) {
                Some(energy) if sinusoidal => {
                    log::info!("Doppler max energy: {energy}");
                    return Self::MaximumDeltaEnergy(energy);
                }
                _ => log::warn!(
                    "check operation mode of Doppler drive: velocity profile 0 (sinusoidal) required"
                ),
            }
        }
        if let Some(energy) = metadata.log_f64(LOG_DELTA_ENERGY) {
            log::warn!("Doppler delta energy used: {energy}");
            return Self::DeltaEnergy(energy);
        }
        log::warn!("no Doppler energy log found, energy transfer range is 0");
        Self::Undetermined
    }

    /// Maximum energy transfer.
    #[must_use]
    pub fn energy(self) -> f64 {
        match self {
            Self::MaximumDeltaEnergy(energy) | Self::DeltaEnergy(energy) => energy,
            Self::Undetermined => 0.0,
        }
    }

    /// True unless the energy came from the nominal sinusoidal mode.
    #[must_use]
    pub fn has_caveat(self) -> bool {
        !matches!(self, Self::MaximumDeltaEnergy(_))
    }
}

/// Affine time channel to energy transfer mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyTransfer {
    /// Channel mapped onto zero energy.
    pub imid: f64,
    /// Energy width of one channel.
    pub dele: f64,
    /// Origin of the maximum energy transfer.
    pub source: EnergySource,
}

impl EnergyTransfer {
    /// Mapping for an axis of `npt` values.
    ///
    /// # Errors
    /// Returns a data error if `npt < 2`, where `dele` is undefined.
    pub fn new(npt: usize, source: EnergySource) -> Result<Self> {
        if npt < 2 {
            return Err(Error::Data(format!(
                "energy transfer needs at least 2 axis values, got {npt}"
            )));
        }
        Ok(Self {
            imid: (npt / 2 + 1) as f64,
            dele: 2.0 * source.energy() / (npt - 1) as f64,
            source,
        })
    }

    /// Mapping for a workspace, reading its Doppler logs.
    pub fn for_workspace(workspace: &Workspace) -> Result<Self> {
        Self::new(
            workspace.x().len(),
            EnergySource::from_metadata(&workspace.metadata),
        )
    }

    /// Maps one axis value.
    #[inline]
    #[must_use]
    pub fn apply(&self, x: f64) -> f64 {
        (x - self.imid) * self.dele
    }

    /// Formula text, e.g. `(x-513.000000)*0.058651`.
    #[must_use]
    pub fn formula(&self) -> String {
        format!("(x-{:.6})*{:.6}", self.imid, self.dele)
    }
}

/// Retargets the x-axis of `workspace` to energy transfer.
///
/// A missing energy log is not an error: the result then has a zero-width
/// axis, which callers can detect through [`EnergySource::Undetermined`].
pub fn convert_to_energy_transfer(workspace: &Workspace) -> Result<(Workspace, EnergyTransfer)> {
    let transfer = EnergyTransfer::for_workspace(workspace)?;
    let converted = workspace.convert_axis(|x| transfer.apply(x), AxisUnit::DeltaE);
    if let (Some(first), Some(last)) = (converted.x().first(), converted.x().last()) {
        log::info!("energy range: {first} to {last} ({})", transfer.formula());
    }
    Ok((converted, transfer))
}
