//! Loading raw I/Q capture files from disk.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::info;
use xcorr_core::{iq, Signal};

/// Reads and decodes a whole capture file.
pub fn load(path: &Path) -> Result<Signal> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let signal = iq::decode(&bytes).with_context(|| format!("decoding {}", path.display()))?;
    info!("Opened {} with {} IQ samples.", path.display(), signal.len());
    Ok(signal)
}

/// Loads a reference and a data capture, checking the reference fits inside the data.
pub fn load_pair(reference: &Path, data: &Path) -> Result<(Signal, Signal)> {
    let reference = load(reference)?;
    let data = load(data)?;
    if reference.len() > data.len() {
        bail!(
            "reference length ({} samples) is longer than received data ({} samples)",
            reference.len(),
            data.len()
        );
    }
    Ok((reference, data))
}
