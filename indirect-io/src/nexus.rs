//! NeXus (HDF5) files: IN16B raw runs and processed workspaces.
//!
//! Raw runs follow the ILL layout:
//!
//! ```text
//! entry0/run_number                         (1,)
//! entry0/instrument/name                    (1,)
//! entry0/instrument/Doppler/<log>           (1,)
//! entry0/monitor/data                       (1, 1, nch) or (nch,)
//! entry0/data/data                          (ndet, 1, nch) or (ndet, nch)
//! ```
//!
//! Loading yields a histogram workspace over channel edges `0..=nch` with the
//! monitor as spectrum 0 at workspace index 0 and detectors numbered from 1.
//!
//! Processed workspaces are written under `mantid_workspace_1` with values,
//! errors, bin masks, both axes, detector lists, sample logs and instrument
//! parameters, and can be read back losslessly.
#![allow(clippy::cast_precision_loss)]

use std::path::Path;
use std::str::FromStr;

use hdf5::types::{H5Type, TypeDescriptor, VarLenUnicode};
use hdf5::{Dataset, File, Group};
use indirect_core::{AxisUnit, LogValue, RunMetadata, Spectrum, Workspace};
use ndarray::{ArrayView, ArrayView1};

use crate::{Error, Result};

const FORMAT_VERSION: &str = "0.1";
const RAW_ENTRY: &str = "entry0";
const DOPPLER_GROUP: &str = "Doppler";
const DOPPLER_LOG_PREFIX: &str = "Doppler.";
const PROCESSED_ENTRY: &str = "mantid_workspace_1";

/// Options for processed workspace files.
#[derive(Clone, Copy, Debug)]
pub struct NexusWriteOptions {
    /// Deflate level for the 2-D datasets.
    pub compression: Option<u8>,
    /// Enable the shuffle filter.
    pub shuffle: bool,
}

impl Default for NexusWriteOptions {
    fn default() -> Self {
        Self {
            compression: Some(4),
            shuffle: true,
        }
    }
}

/// Reads an IN16B raw run.
///
/// # Errors
/// Returns an error if HDF5 I/O fails, a required dataset is missing or the
/// monitor and detector channel counts differ.
pub fn read_raw_run<P: AsRef<Path>>(path: P) -> Result<Workspace> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let entry = file.group(RAW_ENTRY)?;
    let instrument = entry.group("instrument")?;

    let run_number = read_first::<i64>(&entry, "run_number")?;
    let run_number = u32::try_from(run_number)
        .map_err(|_| Error::InvalidFormat(format!("invalid run number {run_number}")))?;
    let name = read_first::<VarLenUnicode>(&instrument, "name")?.to_string();
    let mut metadata = RunMetadata::new(run_number, name.trim());

    if let Ok(doppler) = instrument.group(DOPPLER_GROUP) {
        for log in doppler.member_names()? {
            if let Ok(Some(value)) = read_first_opt::<f64>(&doppler, &log) {
                metadata.set_log(&format!("{DOPPLER_LOG_PREFIX}{log}"), LogValue::Number(value));
            }
        }
    }

    let monitor = read_dataset_vec::<f64>(&entry.group("monitor")?, "data")?;
    let nch = monitor.len();
    if nch == 0 {
        return Err(Error::InvalidFormat("monitor has no channels".to_string()));
    }
    let detectors = read_dataset_vec::<f64>(&entry.group("data")?, "data")?;
    if detectors.len() % nch != 0 {
        return Err(Error::InvalidFormat(format!(
            "detector data of {} values is not a multiple of {nch} channels",
            detectors.len()
        )));
    }

    let mut spectra = Vec::with_capacity(detectors.len() / nch + 1);
    spectra.push(Spectrum::counts(0, monitor));
    for (index, channels) in detectors.chunks(nch).enumerate() {
        let spectrum_no = u32::try_from(index + 1)
            .map_err(|_| Error::InvalidFormat("too many detector spectra".to_string()))?;
        spectra.push(Spectrum::counts(spectrum_no, channels.to_vec()));
    }

    let edges = (0..=nch).map(|i| i as f64).collect();
    let ws = Workspace::new(edges, spectra, AxisUnit::TimeChannel, metadata)?;
    log::info!(
        "loaded run {} from {}: {} detectors, {} channels",
        ws.metadata.run_number,
        path.display(),
        ws.num_spectra() - 1,
        nch
    );
    Ok(ws)
}

/// Writes a workspace (monitor at index 0) in the IN16B raw layout.
///
/// Only numeric `Doppler.*` sample logs are kept; detector spectra are
/// written in workspace order.
///
/// # Errors
/// Returns an error if HDF5 I/O fails or the workspace has no detectors.
pub fn write_raw_run<P: AsRef<Path>>(path: P, ws: &Workspace) -> Result<()> {
    let (monitor, detectors) = ws
        .spectra()
        .split_first()
        .ok_or_else(|| Error::InvalidFormat("workspace has no spectra".to_string()))?;
    if detectors.is_empty() {
        return Err(Error::InvalidFormat(
            "raw runs need at least one detector spectrum".to_string(),
        ));
    }
    let nch = ws.num_bins();

    let file = File::create(path)?;
    let entry = file.create_group(RAW_ENTRY)?;
    set_attr_str_group(&entry, "NX_class", "NXentry")?;
    write_slice(&entry, "run_number", &[i64::from(ws.metadata.run_number.as_u32())])?;

    let instrument = entry.create_group("instrument")?;
    set_attr_str_group(&instrument, "NX_class", "NXinstrument")?;
    write_slice(&instrument, "name", &[to_var_len_unicode(&ws.metadata.instrument)?])?;
    let doppler = instrument.create_group(DOPPLER_GROUP)?;
    for (name, value) in &ws.metadata.logs {
        if let (Some(log), LogValue::Number(v)) = (name.strip_prefix(DOPPLER_LOG_PREFIX), value) {
            write_slice(&doppler, log, &[*v])?;
        }
    }

    let monitor_group = entry.create_group("monitor")?;
    let ds = create_fixed_dataset::<f64, _>(&monitor_group, "data", (1, 1, nch), None, None, false)?;
    ds.write(view3(&monitor.y, (1, 1, nch))?)?;

    let data_group = entry.create_group("data")?;
    let flat: Vec<f64> = detectors.iter().flat_map(|s| s.y.iter().copied()).collect();
    let shape = (detectors.len(), 1, nch);
    let ds = create_fixed_dataset::<f64, _>(&data_group, "data", shape, None, None, false)?;
    ds.write(view3(&flat, shape)?)?;
    Ok(())
}

/// Writes a processed workspace.
///
/// # Errors
/// Returns an error if HDF5 I/O fails.
pub fn write_processed<P: AsRef<Path>>(
    path: P,
    title: &str,
    ws: &Workspace,
    options: &NexusWriteOptions,
) -> Result<()> {
    let nspec = ws.num_spectra();
    let nbins = ws.num_bins();

    let file = File::create(path)?;
    set_attr_str_file(&file, "indirect_format_version", FORMAT_VERSION)?;

    let entry = file.create_group(PROCESSED_ENTRY)?;
    set_attr_str_group(&entry, "NX_class", "NXentry")?;
    write_slice(&entry, "title", &[to_var_len_unicode(title)?])?;
    write_slice(&entry, "run_number", &[ws.metadata.run_number.as_u32()])?;

    let instrument = entry.create_group("instrument")?;
    set_attr_str_group(&instrument, "NX_class", "NXinstrument")?;
    write_slice(&instrument, "name", &[to_var_len_unicode(&ws.metadata.instrument)?])?;
    let counts = ws
        .spectra()
        .iter()
        .map(|s| {
            u32::try_from(s.detector_ids.len())
                .map_err(|_| Error::InvalidFormat("detector list too long".to_string()))
        })
        .collect::<Result<Vec<u32>>>()?;
    let detectors: Vec<u32> = ws
        .spectra()
        .iter()
        .flat_map(|s| s.detector_ids.iter().copied())
        .collect();
    write_slice(&instrument, "detector_count", &counts)?;
    write_slice(&instrument, "detector_list", &detectors)?;
    let parameters = instrument.create_group("parameters")?;
    for (name, value) in &ws.metadata.parameters {
        set_attr_str_group(&parameters, name, value)?;
    }

    let logs = entry.create_group("logs")?;
    set_attr_str_group(&logs, "NX_class", "NXcollection")?;
    for (name, value) in &ws.metadata.logs {
        let log = logs.create_group(name)?;
        set_attr_str_group(&log, "NX_class", "NXlog")?;
        match value {
            LogValue::Number(v) => write_slice(&log, "value", &[*v])?,
            LogValue::Text(text) => write_slice(&log, "value", &[to_var_len_unicode(text)?])?,
        }
    }

    let data = entry.create_group("workspace")?;
    set_attr_str_group(&data, "NX_class", "NXdata")?;
    set_attr_str_group(&data, "signal", "values")?;

    let chunk = Some([1, nbins.max(1)]);
    let values: Vec<f64> = ws.spectra().iter().flat_map(|s| s.y.iter().copied()).collect();
    let errors: Vec<f64> = ws.spectra().iter().flat_map(|s| s.e.iter().copied()).collect();
    let masks: Vec<u8> = ws
        .spectra()
        .iter()
        .flat_map(|s| s.mask.iter().map(|&m| u8::from(m)))
        .collect();

    let values_ds = create_fixed_dataset::<f64, _>(
        &data,
        "values",
        (nspec, nbins),
        chunk,
        options.compression,
        options.shuffle,
    )?;
    set_dataset_units(&values_ds, "Counts")?;
    values_ds.write(view2(&values, (nspec, nbins))?)?;

    let errors_ds = create_fixed_dataset::<f64, _>(
        &data,
        "errors",
        (nspec, nbins),
        chunk,
        options.compression,
        options.shuffle,
    )?;
    errors_ds.write(view2(&errors, (nspec, nbins))?)?;

    let mask_ds = create_fixed_dataset::<u8, _>(
        &data,
        "masked_bins",
        (nspec, nbins),
        chunk,
        options.compression,
        options.shuffle,
    )?;
    mask_ds.write(view2(&masks, (nspec, nbins))?)?;

    let unit = ws.unit();
    let axis1 = create_fixed_dataset::<f64, _>(&data, "axis1", (ws.x().len(),), None, None, false)?;
    set_dataset_units(&axis1, unit.id())?;
    set_attr_str_dataset(&axis1, "caption", unit.caption())?;
    axis1.write(ArrayView1::from(ws.x()))?;

    let numbers: Vec<u32> = ws.spectra().iter().map(|s| s.spectrum_no).collect();
    let axis2 = create_fixed_dataset::<u32, _>(&data, "axis2", (nspec,), None, None, false)?;
    set_dataset_units(&axis2, "SpectraNumber")?;
    axis2.write(ArrayView1::from(numbers.as_slice()))?;
    Ok(())
}

/// Reads a processed workspace written by [`write_processed`].
///
/// # Errors
/// Returns an error if HDF5 I/O fails or the datasets are inconsistent.
pub fn read_processed<P: AsRef<Path>>(path: P) -> Result<Workspace> {
    let file = File::open(path)?;
    let entry = file.group(PROCESSED_ENTRY)?;
    let data = entry.group("workspace")?;

    let values_ds = data.dataset("values")?;
    let shape = values_ds.shape();
    if shape.len() != 2 {
        return Err(Error::InvalidFormat(
            "values dataset must be 2-D (spectrum, bin)".to_string(),
        ));
    }
    let (nspec, nbins) = (shape[0], shape[1]);
    let values = values_ds.read_raw::<f64>()?;
    let errors = read_dataset_vec::<f64>(&data, "errors")?;
    let masks = read_dataset_vec::<u8>(&data, "masked_bins")?;
    let numbers = read_dataset_vec::<u32>(&data, "axis2")?;
    if errors.len() != values.len() || masks.len() != values.len() || numbers.len() != nspec {
        return Err(Error::InvalidFormat(
            "workspace datasets have inconsistent sizes".to_string(),
        ));
    }

    let axis1 = data.dataset("axis1")?;
    let x = axis1.read_raw::<f64>()?;
    let unit_id = read_attr_opt_string(&axis1, "units")?.unwrap_or_default();
    let unit = AxisUnit::from_id(&unit_id)
        .ok_or_else(|| Error::InvalidFormat(format!("unknown axis unit '{unit_id}'")))?;

    let instrument = entry.group("instrument")?;
    let counts = read_dataset_vec::<u32>(&instrument, "detector_count")?;
    let detectors = read_dataset_vec::<u32>(&instrument, "detector_list")?;
    if counts.len() != nspec || counts.iter().map(|&c| c as usize).sum::<usize>() != detectors.len()
    {
        return Err(Error::InvalidFormat(
            "detector lists do not match the spectra".to_string(),
        ));
    }

    let mut spectra = Vec::with_capacity(nspec);
    let mut offset = 0;
    for (i, (&spectrum_no, &count)) in numbers.iter().zip(&counts).enumerate() {
        let bins = i * nbins..(i + 1) * nbins;
        let mut spectrum = Spectrum::with_errors(
            spectrum_no,
            values[bins.clone()].to_vec(),
            errors[bins.clone()].to_vec(),
        );
        spectrum.mask = masks[bins].iter().map(|&m| m != 0).collect();
        spectrum.detector_ids = detectors[offset..offset + count as usize].to_vec();
        offset += count as usize;
        spectra.push(spectrum);
    }

    let run_number = read_first::<u32>(&entry, "run_number")?;
    let name = read_first::<VarLenUnicode>(&instrument, "name")?.to_string();
    let mut metadata = RunMetadata::new(run_number, name);
    if let Ok(parameters) = instrument.group("parameters") {
        for key in parameters.attr_names()? {
            if let Some(value) = read_attr_opt_string(&parameters, &key)? {
                metadata.parameters.insert(key, value);
            }
        }
    }
    if let Ok(logs) = entry.group("logs") {
        for name in logs.member_names()? {
            let value = logs.group(&name)?.dataset("value")?;
            let log = match value.dtype()?.to_descriptor()? {
                TypeDescriptor::VarLenUnicode => {
                    LogValue::Text(first(value.read_raw::<VarLenUnicode>()?, &name)?.to_string())
                }
                _ => LogValue::Number(first(value.read_raw::<f64>()?, &name)?),
            };
            metadata.set_log(&name, log);
        }
    }

    Ok(Workspace::new(x, spectra, unit, metadata)?)
}

fn view2<T>(data: &[T], shape: (usize, usize)) -> Result<ArrayView<'_, T, ndarray::Ix2>> {
    ArrayView::from_shape(shape, data)
        .map_err(|e| Error::InvalidFormat(format!("dataset shape mismatch: {e}")))
}

fn view3<T>(
    data: &[T],
    shape: (usize, usize, usize),
) -> Result<ArrayView<'_, T, ndarray::Ix3>> {
    ArrayView::from_shape(shape, data)
        .map_err(|e| Error::InvalidFormat(format!("dataset shape mismatch: {e}")))
}

fn create_fixed_dataset<T: H5Type, S>(
    group: &Group,
    name: &str,
    shape: S,
    chunk: Option<[usize; 2]>,
    compression: Option<u8>,
    shuffle: bool,
) -> Result<Dataset>
where
    S: Into<hdf5::Extents>,
{
    let mut builder = group.new_dataset::<T>().shape(shape);

    if let Some(chunk_shape) = chunk {
        builder = builder.chunk(chunk_shape);
    }

    if let Some(level) = compression {
        builder = builder.deflate(level);
    }

    if shuffle {
        builder = builder.shuffle();
    }

    Ok(builder.create(name)?)
}

fn write_slice<T: H5Type>(group: &Group, name: &str, data: &[T]) -> Result<()> {
    let ds = create_fixed_dataset::<T, _>(group, name, (data.len(),), None, None, false)?;
    ds.write(ArrayView1::from(data))?;
    Ok(())
}

fn first<T>(values: Vec<T>, name: &str) -> Result<T> {
    values
        .into_iter()
        .next()
        .ok_or_else(|| Error::InvalidFormat(format!("dataset {name} is empty")))
}

fn read_first<T: H5Type>(group: &Group, name: &str) -> Result<T> {
    first(read_dataset_vec::<T>(group, name)?, name)
}

fn read_first_opt<T: H5Type>(group: &Group, name: &str) -> Result<Option<T>> {
    match group.dataset(name) {
        Ok(dataset) => Ok(dataset.read_raw::<T>()?.into_iter().next()),
        Err(_) => Ok(None),
    }
}

fn read_dataset_vec<T: H5Type>(group: &Group, name: &str) -> Result<Vec<T>> {
    let dataset = group.dataset(name)?;
    Ok(dataset.read_raw::<T>()?)
}

fn read_attr_opt_string(location: &hdf5::Location, name: &str) -> Result<Option<String>> {
    match location.attr(name) {
        Ok(attr) => {
            let value: VarLenUnicode = attr.read_scalar()?;
            Ok(Some(value.to_string()))
        }
        Err(_) => Ok(None),
    }
}

fn set_dataset_units(dataset: &Dataset, units: &str) -> Result<()> {
    set_attr_str_dataset(dataset, "units", units)
}

fn set_attr_str_dataset(dataset: &Dataset, name: &str, value: &str) -> Result<()> {
    let value = to_var_len_unicode(value)?;
    dataset
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn set_attr_str_file(file: &File, name: &str, value: &str) -> Result<()> {
    let value = to_var_len_unicode(value)?;
    file.new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn set_attr_str_group(group: &Group, name: &str, value: &str) -> Result<()> {
    let value = to_var_len_unicode(value)?;
    group
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode> {
    VarLenUnicode::from_str(value)
        .map_err(|e| Error::InvalidFormat(format!("invalid utf-8 attribute: {e}")))
}
