//! Plain-text spectrum export.

use crate::Result;
use indirect_core::Workspace;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writer for workspace spectra as CSV.
///
/// One row per bin: the bin centre (points are written as-is), then the
/// counts and uncertainty of every spectrum. Masked bins are written as
/// empty fields.
pub struct SpectrumCsvWriter {
    writer: BufWriter<File>,
}

impl SpectrumCsvWriter {
    /// Creates a new file writer.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        Ok(Self { writer })
    }

    /// Writes every spectrum of `ws` side by side.
    pub fn write_workspace(&mut self, ws: &Workspace) -> Result<()> {
        let mut header = vec![ws.unit().id().to_string()];
        for spectrum in ws.spectra() {
            header.push(format!("y{}", spectrum.spectrum_no));
            header.push(format!("e{}", spectrum.spectrum_no));
        }
        writeln!(self.writer, "{}", header.join(","))?;

        for (bin, x) in ws.bin_centres().iter().enumerate() {
            write!(self.writer, "{x}")?;
            for spectrum in ws.spectra() {
                if spectrum.mask[bin] {
                    write!(self.writer, ",,")?;
                } else {
                    write!(self.writer, ",{},{}", spectrum.y[bin], spectrum.e[bin])?;
                }
            }
            writeln!(self.writer)?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Flushes the writer.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
