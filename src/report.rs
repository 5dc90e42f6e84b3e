//! Machine-readable run summary (`--json-report`), grounded in the
//! teacher's `serde`/`serde_json`-based report context.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::Serialize;

use crate::error::{EngineError, Result};
use crate::types::OptimizeMode;

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub optimize_mode: OptimizeMode,
    pub total_clusters: u64,
    pub bytes_per_cluster: u64,
    pub items_analyzed: u64,
    pub items_moved: u64,
    pub moves_issued: u64,
    pub items_marked_unmovable: u64,
    pub disk_full_events: u64,
    pub cancelled: bool,
    pub zones: [u64; 4],
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self).map_err(|e| EngineError::Config(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes_to_json() {
        let report = RunReport {
            optimize_mode: OptimizeMode::AnalyzeFixupFastOpt,
            total_clusters: 1000,
            bytes_per_cluster: 4096,
            items_analyzed: 10,
            items_moved: 3,
            moves_issued: 4,
            items_marked_unmovable: 1,
            disk_full_events: 0,
            cancelled: false,
            zones: [0, 100, 200, 1000],
            elapsed_ms: 42,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"items_moved\":3"));
    }
}
