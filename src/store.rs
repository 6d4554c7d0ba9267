//! Repository interface the ingestion logic persists through, plus an
//! in-memory implementation used for dry runs and tests.

use crate::error::{IngestError, Result};
use crate::models::*;
use crate::sample::SampleId;

pub trait Store {
    fn get_or_create_facility(&mut self, name: &str) -> Result<Facility>;

    fn get_or_create_sample(&mut self, bpa_id: &SampleId) -> Result<Sample>;

    /// Insert or update the metadata keyed by (sample, target). All fields
    /// are overwritten, except the facility when the new one is `None`.
    fn upsert_metadata(&mut self, m: NewAmpliconMetadata) -> Result<AmpliconMetadata>;

    /// Look up metadata by extraction id and target. Fails with
    /// [`IngestError::NotFound`] or [`IngestError::Ambiguous`].
    fn get_metadata(&mut self, extraction_id: &str, target: &str) -> Result<AmpliconMetadata>;

    fn set_metadata_facility(&mut self, metadata_id: i32, facility_id: i32) -> Result<()>;

    fn get_or_create_run(&mut self, sample_id: i32) -> Result<AmpliconRun>;

    fn update_run(&mut self, run: &AmpliconRun) -> Result<()>;

    /// Always creates a new file entry, there is no uniqueness on filenames
    fn create_file(&mut self, f: NewAmpliconFile) -> Result<AmpliconFile>;

    /// Empty the given tables, cascading to dependent file entries
    fn truncate(&mut self, tables: &[Table]) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    next_id: i32,
    pub facilities: Vec<Facility>,
    pub samples: Vec<Sample>,
    pub metadata: Vec<AmpliconMetadata>,
    pub runs: Vec<AmpliconRun>,
    pub files: Vec<AmpliconFile>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Default::default()
    }

    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

impl Store for MemoryStore {
    fn get_or_create_facility(&mut self, name: &str) -> Result<Facility> {
        if let Some(f) = self.facilities.iter().find(|f| f.name == name) {
            return Ok(f.clone());
        }
        let f = Facility {
            id: self.next_id(),
            name: name.to_string(),
        };
        self.facilities.push(f.clone());
        Ok(f)
    }

    fn get_or_create_sample(&mut self, bpa_id: &SampleId) -> Result<Sample> {
        if let Some(s) = self.samples.iter().find(|s| &s.bpa_id == bpa_id) {
            return Ok(s.clone());
        }
        let s = Sample {
            id: self.next_id(),
            bpa_id: bpa_id.clone(),
        };
        self.samples.push(s.clone());
        Ok(s)
    }

    fn upsert_metadata(&mut self, m: NewAmpliconMetadata) -> Result<AmpliconMetadata> {
        let existing = self
            .metadata
            .iter()
            .position(|e| e.sample_id == m.sample_id && e.target == m.target);

        match existing {
            Some(idx) => {
                let e = &mut self.metadata[idx];
                let facility_id = m.facility_id.or(e.facility_id);
                *e = m.into_metadata(e.id);
                e.facility_id = facility_id;
                Ok(e.clone())
            }
            None => {
                let id = self.next_id();
                let e = m.into_metadata(id);
                self.metadata.push(e.clone());
                Ok(e)
            }
        }
    }

    fn get_metadata(&mut self, extraction_id: &str, target: &str) -> Result<AmpliconMetadata> {
        let mut found = self.metadata.iter().filter(|m| {
            m.target == target && m.sample_extraction_id.as_deref() == Some(extraction_id)
        });
        let what = || format!("amplicon metadata {} {}", extraction_id, target);
        match (found.next(), found.next()) {
            (Some(m), None) => Ok(m.clone()),
            (None, _) => Err(IngestError::NotFound(what())),
            (Some(_), Some(_)) => Err(IngestError::Ambiguous(what())),
        }
    }

    fn set_metadata_facility(&mut self, metadata_id: i32, facility_id: i32) -> Result<()> {
        let m = self
            .metadata
            .iter_mut()
            .find(|m| m.id == metadata_id)
            .ok_or_else(|| IngestError::NotFound(format!("amplicon metadata #{}", metadata_id)))?;
        m.facility_id = Some(facility_id);
        Ok(())
    }

    fn get_or_create_run(&mut self, sample_id: i32) -> Result<AmpliconRun> {
        if let Some(r) = self.runs.iter().find(|r| r.sample_id == sample_id) {
            return Ok(r.clone());
        }
        let r = AmpliconRun {
            id: self.next_id(),
            sample_id,
            facility_id: None,
            flow_cell_id: None,
        };
        self.runs.push(r.clone());
        Ok(r)
    }

    fn update_run(&mut self, run: &AmpliconRun) -> Result<()> {
        let r = self
            .runs
            .iter_mut()
            .find(|r| r.id == run.id)
            .ok_or_else(|| IngestError::NotFound(format!("amplicon run #{}", run.id)))?;
        *r = run.clone();
        Ok(())
    }

    fn create_file(&mut self, f: NewAmpliconFile) -> Result<AmpliconFile> {
        let file = AmpliconFile {
            id: self.next_id(),
            sample_id: f.sample_id,
            metadata_id: f.metadata_id,
            run_id: f.run_id,
            filename: f.filename,
            md5: f.md5,
            analysed: f.analysed,
        };
        self.files.push(file.clone());
        Ok(file)
    }

    fn truncate(&mut self, tables: &[Table]) -> Result<()> {
        for t in tables {
            match t {
                Table::Metadata => {
                    self.metadata.clear();
                    self.files.clear();
                }
                Table::Run => {
                    self.runs.clear();
                    self.files.clear();
                }
                Table::File => self.files.clear(),
            }
        }
        Ok(())
    }
}
