//! Per-chip catalog output.
//!
//! One CSV file per chip, named after the chip id. Writing is
//! whole-file and idempotent: rerunning a chip replaces its catalog
//! rather than appending to it. Unmatched PSF fields keep their
//! sentinel values in the output (`-1` for the independent id, `nan`
//! for measurements).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use catalog::{DetectionStatus, ReconciledRecord};

use crate::chip::ChipId;

const HEADER: &str = "id,x,y,mag,mag_err,pass,status,psf_id,x_psf,y_psf,mag_psf,mag_err_psf,sky,niter,chi,sharp,ra,dec";

/// Output path for one chip's catalog under `dir`.
pub fn catalog_path(dir: &Path, id: &ChipId) -> PathBuf {
    dir.join(format!("{id}_meas.csv"))
}

fn status_label(status: DetectionStatus) -> &'static str {
    match status {
        DetectionStatus::Unique => "unique",
        DetectionStatus::Superseded => "superseded",
        DetectionStatus::Confirmed => "confirmed",
    }
}

fn float(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        format!("{value:.4}")
    }
}

/// Write one chip's reconciled records to `path`, replacing any
/// previous catalog at that location.
pub fn write_catalog(path: &Path, records: &[ReconciledRecord]) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);
    writeln!(out, "{HEADER}")?;
    for record in records {
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            record.id,
            float(record.x),
            float(record.y),
            float(record.mag),
            float(record.mag_err),
            record.pass,
            status_label(record.status),
            record.psf_id,
            float(record.x_psf),
            float(record.y_psf),
            float(record.mag_psf),
            float(record.mag_err_psf),
            float(record.sky),
            float(record.niter),
            float(record.chi),
            float(record.sharp),
            float(record.ra),
            float(record.dec),
        )?;
    }
    out.flush()?;
    log::info!("wrote {} records to {}", records.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::Detection;

    fn record(id: u64) -> ReconciledRecord {
        ReconciledRecord::from_detection(&Detection {
            id,
            x: 10.5,
            y: 20.25,
            mag: 17.125,
            mag_err: 0.05,
            pass: 1,
            status: DetectionStatus::Unique,
        })
    }

    #[test]
    fn test_header_and_row_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = catalog_path(dir.path(), &ChipId::new("exp", 3));
        write_catalog(&path, &[record(1)]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert_eq!(header.split(',').count(), 18);
        let row = lines.next().unwrap();
        let fields: Vec<&str> = row.split(',').collect();
        assert_eq!(fields.len(), 18);
        assert_eq!(fields[0], "1");
        assert_eq!(fields[6], "unique");
        // Sentinel PSF fields survive as written.
        assert_eq!(fields[7], "-1");
        assert_eq!(fields[10], "nan");
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_rewrite_replaces_previous_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = catalog_path(dir.path(), &ChipId::new("exp", 3));
        write_catalog(&path, &[record(1), record(2), record(3)]).unwrap();
        write_catalog(&path, &[record(9)]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().nth(1).unwrap().starts_with("9,"));
    }

    #[test]
    fn test_path_uses_chip_id() {
        let path = catalog_path(Path::new("/out"), &ChipId::new("c4d_0401", 62));
        assert_eq!(path, PathBuf::from("/out/c4d_0401_62_meas.csv"));
    }
}
