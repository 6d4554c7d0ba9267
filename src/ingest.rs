//! Reconciles parsed spreadsheet rows and manifest entries into the store.
//!
//! Order matters: manifests are matched against metadata that must already
//! be ingested, so the metadata pass always runs first.

use std::path::Path;

use crate::error::{IngestError, Result};
use crate::manifest::{read_manifest, FileEntry};
use crate::models::{NewAmpliconFile, NewAmpliconMetadata, Table};
use crate::sample::SampleId;
use crate::samplesheet::{read_metadata, AmpliconRow};
use crate::store::Store;
use crate::walker::{find_files, MANIFEST_EXTENSIONS, METADATA_EXTENSIONS};

/// Collects what happened during an ingestion run. Skipped records are
/// logged as they happen and kept for the summary.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub metadata_files: usize,
    pub manifest_files: usize,
    pub rows: usize,
    pub metadata_upserted: usize,
    pub invalid_ids: usize,
    pub entries: usize,
    pub missing_metadata: usize,
    pub files_created: usize,
    pub skipped: Vec<String>,
}

impl IngestReport {
    fn skip(&mut self, reason: String) {
        warn!("{}", reason);
        self.skipped.push(reason);
    }

    pub fn log_summary(&self) {
        info!(
            "Metadata: {} files, {} rows, {} records upserted, {} invalid ids",
            self.metadata_files, self.rows, self.metadata_upserted, self.invalid_ids
        );
        info!(
            "Manifests: {} files, {} entries, {} file records created, {} without metadata",
            self.manifest_files, self.entries, self.files_created, self.missing_metadata
        );
        if !self.skipped.is_empty() {
            warn!("{} records were skipped", self.skipped.len());
        }
    }
}

fn new_metadata(
    row: &AmpliconRow,
    sample_id: i32,
    facility_id: Option<i32>,
) -> NewAmpliconMetadata {
    NewAmpliconMetadata {
        sample_id,
        target: row.target.clone(),
        sample_extraction_id: row.sample_extraction_id.clone(),
        facility_id,
        index: row.merged_index(),
        pcr_1_to_10: row.pcr_1_to_10.clone(),
        pcr_1_to_100: row.pcr_1_to_100.clone(),
        pcr_neat: row.pcr_neat.clone(),
        dilution: row.dilution.to_uppercase(),
        sequencing_run_number: row.sequencing_run_number.clone(),
        flow_cell_id: row.flow_cell_id.clone(),
        reads: row.reads,
        name: row.name.clone(),
        analysis_software_version: row.analysis_software_version.clone(),
        comments: row.comments.clone(),
        debug_note: serde_json::to_string(row).unwrap_or_else(|e| e.to_string()),
    }
}

/// Upsert one metadata record per row, keyed by (sample, target).
///
/// Rows with an invalid sample id are skipped. Any store failure aborts.
pub fn add_metadata<S: Store>(
    store: &mut S,
    rows: &[AmpliconRow],
    report: &mut IngestReport,
) -> Result<()> {
    for row in rows {
        report.rows += 1;

        let bpa_id = match SampleId::parse(row.bpa_id.as_deref().unwrap_or("")) {
            Ok(id) => id,
            Err(reason) => {
                report.invalid_ids += 1;
                report.skip(format!(
                    "Could not add entry in {}, row {}, BPA ID invalid: {}",
                    row.file_name, row.row, reason
                ));
                continue;
            }
        };

        let sample = store.get_or_create_sample(&bpa_id)?;

        // older sheets name the facility, newer ones leave that to the md5 files
        let facility_id = match row.sequencing_facility.as_deref() {
            Some(name) => Some(store.get_or_create_facility(name)?.id),
            None => None,
        };

        if let Err(e) = store.upsert_metadata(new_metadata(row, sample.id, facility_id)) {
            error!("{}: row {}: {}", row.file_name, row.row, e);
            error!("{:?}", row);
            return Err(e);
        }
        report.metadata_upserted += 1;
    }
    Ok(())
}

/// Attach manifest entries to previously ingested metadata.
///
/// Entries without matching metadata are skipped. No de-duplication is done,
/// so ingesting a manifest twice yields duplicate file records.
pub fn add_files<S: Store>(
    store: &mut S,
    entries: &[FileEntry],
    report: &mut IngestReport,
) -> Result<()> {
    for entry in entries {
        report.entries += 1;

        let bpa_id = match SampleId::from_extraction_id(&entry.extraction_id) {
            Ok(id) => id,
            Err(reason) => {
                report.invalid_ids += 1;
                report.skip(format!("Ignoring {}: {}", entry.filename, reason));
                continue;
            }
        };

        let metadata = match store.get_metadata(&entry.extraction_id, &entry.target) {
            Ok(m) => m,
            Err(e @ IngestError::NotFound(_)) | Err(e @ IngestError::Ambiguous(_)) => {
                report.missing_metadata += 1;
                report.skip(format!(
                    "No Amplicon Metadata for {} {} ({})",
                    entry.extraction_id, entry.target, e
                ));
                continue;
            }
            Err(e) => return Err(e),
        };

        // the sequencing facility was dropped from later metadata sheets
        let facility = store.get_or_create_facility(&entry.vendor)?;
        store.set_metadata_facility(metadata.id, facility.id)?;

        let sample = store.get_or_create_sample(&bpa_id)?;
        let mut run = store.get_or_create_run(sample.id)?;
        run.facility_id = Some(facility.id);
        run.flow_cell_id = Some(entry.well.clone());
        store.update_run(&run)?;

        store.create_file(NewAmpliconFile {
            sample_id: sample.id,
            metadata_id: metadata.id,
            run_id: run.id,
            filename: entry.filename.clone(),
            md5: entry.md5.clone(),
            analysed: true,
        })?;
        report.files_created += 1;
    }
    Ok(())
}

/// Ingest all metadata spreadsheets found below `datadir`
pub fn do_metadata<S: Store>(
    store: &mut S,
    datadir: &Path,
    report: &mut IngestReport,
) -> Result<()> {
    info!("Ingesting BASE Amplicon metadata from {}", datadir.display());
    for path in find_files(datadir, METADATA_EXTENSIONS)? {
        info!("Processing BASE Amplicon metadata file {}", path.display());
        let rows = read_metadata(&path)?;
        report.metadata_files += 1;
        add_metadata(store, &rows, report)?;
    }
    Ok(())
}

/// Ingest all md5 manifests found below `datadir`
pub fn do_manifests<S: Store>(
    store: &mut S,
    datadir: &Path,
    report: &mut IngestReport,
) -> Result<()> {
    info!("Ingesting BASE Amplicon md5 file information from {}", datadir.display());
    for path in find_files(datadir, MANIFEST_EXTENSIONS)? {
        info!("Processing BASE Amplicon md5 file {}", path.display());
        let entries = read_manifest(&path)?;
        report.manifest_files += 1;
        add_files(store, &entries, report)?;
    }
    Ok(())
}

/// A full reload: truncate (unless told not to), then metadata, then manifests
pub fn run<S: Store>(store: &mut S, datadir: &Path, truncate: bool) -> Result<IngestReport> {
    if truncate {
        info!("Truncating amplicon tables");
        store.truncate(&Table::RELOADED)?;
    }

    let mut report = IngestReport::default();
    do_metadata(store, datadir, &mut report)?;
    do_manifests(store, datadir, &mut report)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::parse_line;
    use crate::models::{AmpliconFile, AmpliconMetadata, AmpliconRun, Facility, Sample};
    use crate::store::MemoryStore;
    use std::fs;

    fn row(bpa_id: &str, extraction_id: &str, target: &str) -> AmpliconRow {
        AmpliconRow {
            file_name: String::from("BASE_amplicons.xlsx"),
            row: 5,
            bpa_id: Some(bpa_id.to_string()),
            sample_extraction_id: Some(extraction_id.to_string()),
            sequencing_facility: None,
            target: target.to_string(),
            index: Some(String::from("ACGTGTACCCAA")),
            index1: None,
            index2: None,
            pcr_1_to_10: String::from("P"),
            pcr_1_to_100: String::from("P"),
            pcr_neat: String::new(),
            dilution: String::from("1:10"),
            sequencing_run_number: Some(String::from("3")),
            flow_cell_id: Some(String::from("A810W")),
            reads: Some(12_345),
            name: Some(format!("{}_{}", extraction_id, target)),
            analysis_software_version: None,
            comments: None,
        }
    }

    fn entry(filename: &str) -> FileEntry {
        parse_line(&format!("cea407dac3f3e7b9afd21b1c096619b7 {}", filename)).unwrap()
    }

    const FASTQ: &str = "9486_1_16S_AGRF_ACGTGTACCCAA_A810W_S43_L001_R2_001.fastq.gz";

    /// Delegates to a [`MemoryStore`] but fails the n-th metadata upsert and,
    /// if asked to, every metadata lookup
    #[derive(Default)]
    struct FailingStore {
        inner: MemoryStore,
        fail_upsert_at: Option<usize>,
        fail_lookup: bool,
        upserts: usize,
    }

    fn broken() -> IngestError {
        IngestError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset",
        ))
    }

    impl Store for FailingStore {
        fn get_or_create_facility(&mut self, name: &str) -> Result<Facility> {
            self.inner.get_or_create_facility(name)
        }

        fn get_or_create_sample(&mut self, bpa_id: &SampleId) -> Result<Sample> {
            self.inner.get_or_create_sample(bpa_id)
        }

        fn upsert_metadata(&mut self, m: NewAmpliconMetadata) -> Result<AmpliconMetadata> {
            self.upserts += 1;
            if self.fail_upsert_at == Some(self.upserts) {
                return Err(broken());
            }
            self.inner.upsert_metadata(m)
        }

        fn get_metadata(&mut self, extraction_id: &str, target: &str) -> Result<AmpliconMetadata> {
            if self.fail_lookup {
                return Err(broken());
            }
            self.inner.get_metadata(extraction_id, target)
        }

        fn set_metadata_facility(&mut self, metadata_id: i32, facility_id: i32) -> Result<()> {
            self.inner.set_metadata_facility(metadata_id, facility_id)
        }

        fn get_or_create_run(&mut self, sample_id: i32) -> Result<AmpliconRun> {
            self.inner.get_or_create_run(sample_id)
        }

        fn update_run(&mut self, run: &AmpliconRun) -> Result<()> {
            self.inner.update_run(run)
        }

        fn create_file(&mut self, f: NewAmpliconFile) -> Result<AmpliconFile> {
            self.inner.create_file(f)
        }

        fn truncate(&mut self, tables: &[Table]) -> Result<()> {
            self.inner.truncate(tables)
        }
    }

    #[test]
    fn failed_upsert_stops_the_metadata_pass() {
        let mut store = FailingStore {
            fail_upsert_at: Some(2),
            ..Default::default()
        };
        let mut report = IngestReport::default();
        let rows = [
            row("9486", "9486_1", "16S"),
            row("9487", "9487_1", "16S"),
            row("9488", "9488_1", "16S"),
        ];

        let res = add_metadata(&mut store, &rows, &mut report);
        assert!(matches!(res, Err(IngestError::Io(_))));
        assert_eq!(store.upserts, 2);
        assert_eq!(store.inner.metadata.len(), 1);
        assert_eq!(store.inner.metadata[0].sample_extraction_id.as_deref(), Some("9486_1"));
        assert_eq!(report.metadata_upserted, 1);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn store_failure_aborts_the_run() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join("AGRF_A810W.md5"),
            format!("cea407dac3f3e7b9afd21b1c096619b7  {}\n", FASTQ),
        )?;

        let mut store = FailingStore {
            fail_lookup: true,
            ..Default::default()
        };
        let mut report = IngestReport::default();
        add_metadata(&mut store, &[row("9486", "9486_1", "16S")], &mut report)?;

        let res = run(&mut store, dir.path(), false);
        assert!(matches!(res, Err(IngestError::Io(_))));
        assert!(store.inner.files.is_empty());
        assert!(store.inner.runs.is_empty());
        Ok(())
    }

    #[test]
    fn metadata_upsert_is_idempotent_last_write_wins() -> Result<()> {
        let mut store = MemoryStore::new();
        let mut report = IngestReport::default();

        add_metadata(&mut store, &[row("9486", "9486_1", "16S")], &mut report)?;
        let mut second = row("102.100.100.9486", "9486_1", "16S");
        second.reads = Some(99);
        second.dilution = String::from("neat");
        second.comments = Some(String::from("rerun"));
        add_metadata(&mut store, &[second], &mut report)?;

        assert_eq!(store.metadata.len(), 1);
        let m = &store.metadata[0];
        assert_eq!(m.reads, Some(99));
        assert_eq!(m.dilution, "NEAT");
        assert_eq!(m.comments.as_deref(), Some("rerun"));
        assert_eq!(report.metadata_upserted, 2);
        assert_eq!(store.samples.len(), 1);
        Ok(())
    }

    #[test]
    fn one_record_per_target() -> Result<()> {
        let mut store = MemoryStore::new();
        let mut report = IngestReport::default();
        add_metadata(
            &mut store,
            &[row("9486", "9486_1", "16S"), row("9486", "9486_1", "ITS")],
            &mut report,
        )?;
        assert_eq!(store.metadata.len(), 2);
        assert_eq!(store.samples.len(), 1);
        Ok(())
    }

    #[test]
    fn invalid_sample_ids_are_skipped() -> Result<()> {
        let mut store = MemoryStore::new();
        let mut report = IngestReport::default();
        let mut blank = row("", "1_1", "16S");
        blank.bpa_id = None;
        add_metadata(
            &mut store,
            &[row("soil", "1_1", "16S"), blank, row("9486", "9486_1", "16S")],
            &mut report,
        )?;
        assert_eq!(store.metadata.len(), 1);
        assert_eq!(report.invalid_ids, 2);
        assert_eq!(report.skipped.len(), 2);
        assert!(report.skipped[0].contains("row 5"));
        Ok(())
    }

    #[test]
    fn merged_index_and_facility() -> Result<()> {
        let mut store = MemoryStore::new();
        let mut report = IngestReport::default();
        let mut r = row("9486", "9486_1", "A16S");
        r.index = None;
        r.index1 = Some(String::from("GTCGTAGT"));
        r.index2 = Some(String::from("CTCTCTAT"));
        r.sequencing_facility = Some(String::from("UNSW"));
        add_metadata(&mut store, &[r], &mut report)?;

        let m = &store.metadata[0];
        assert_eq!(m.index, "GTCGTAGT, CTCTCTAT");
        assert_eq!(m.facility_id, Some(store.facilities[0].id));
        assert!(m.debug_note.contains("\"row\":5"));

        // a later sheet without facility keeps the recorded one
        add_metadata(&mut store, &[row("9486", "9486_1", "A16S")], &mut report)?;
        assert_eq!(store.metadata[0].facility_id, Some(store.facilities[0].id));
        Ok(())
    }

    #[test]
    fn manifest_entries_attach_to_metadata() -> Result<()> {
        let mut store = MemoryStore::new();
        let mut report = IngestReport::default();
        add_metadata(&mut store, &[row("9486", "9486_1", "16S")], &mut report)?;
        add_files(&mut store, &[entry(FASTQ)], &mut report)?;

        assert_eq!(store.files.len(), 1);
        assert_eq!(store.runs.len(), 1);
        let f = &store.files[0];
        let run = &store.runs[0];
        let agrf = store.facilities.iter().find(|f| f.name == "AGRF").unwrap();
        assert_eq!(f.metadata_id, store.metadata[0].id);
        assert_eq!(f.run_id, run.id);
        assert_eq!(f.sample_id, run.sample_id);
        assert_eq!(f.md5, "cea407dac3f3e7b9afd21b1c096619b7");
        assert!(f.analysed);
        assert_eq!(run.flow_cell_id.as_deref(), Some("A810W"));
        assert_eq!(run.facility_id, Some(agrf.id));
        assert_eq!(store.metadata[0].facility_id, Some(agrf.id));
        Ok(())
    }

    #[test]
    fn manifest_ingest_twice_duplicates_files() -> Result<()> {
        let mut store = MemoryStore::new();
        let mut report = IngestReport::default();
        add_metadata(&mut store, &[row("9486", "9486_1", "16S")], &mut report)?;
        add_files(&mut store, &[entry(FASTQ)], &mut report)?;
        add_files(&mut store, &[entry(FASTQ)], &mut report)?;

        assert_eq!(store.files.len(), 2);
        assert!(store.files.iter().all(|f| f.filename == FASTQ));
        assert_eq!(store.runs.len(), 1);
        Ok(())
    }

    #[test]
    fn manifest_without_metadata_is_skipped() -> Result<()> {
        let mut store = MemoryStore::new();
        let mut report = IngestReport::default();
        add_metadata(&mut store, &[row("9486", "9486_1", "ITS")], &mut report)?;
        add_files(
            &mut store,
            &[entry(FASTQ), entry("9487_1_16S_AGRF_ACGTGTACCCAA_A810W_S44_L001_R1_001.fastq.gz")],
            &mut report,
        )?;

        assert!(store.files.is_empty());
        assert!(store.runs.is_empty());
        assert_eq!(report.missing_metadata, 2);
        assert_eq!(report.files_created, 0);
        Ok(())
    }

    #[test]
    fn reload_from_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join("AGRF_A810W.md5"),
            format!(
                "cea407dac3f3e7b9afd21b1c096619b7  {}\n\n\
                 d41d8cd98f00b204e9800998ecf8427e  sample_16S_x_y_z_a_b_c\n",
                FASTQ
            ),
        )?;

        let mut store = MemoryStore::new();
        let mut report = IngestReport::default();
        add_metadata(&mut store, &[row("9486", "9486_1", "16S")], &mut report)?;
        do_manifests(&mut store, dir.path(), &mut report)?;
        do_manifests(&mut store, dir.path(), &mut report)?;
        assert_eq!(report.manifest_files, 2);
        assert_eq!(store.files.len(), 2);

        // a full run truncates first; without spreadsheets nothing matches
        let report = run(&mut store, dir.path(), true)?;
        assert!(store.metadata.is_empty());
        assert!(store.files.is_empty());
        assert_eq!(report.entries, 1);
        assert_eq!(report.missing_metadata, 1);
        Ok(())
    }
}
