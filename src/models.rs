use serde::Serialize;

use crate::sample::SampleId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Facility {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sample {
    pub id: i32,
    pub bpa_id: SampleId,
}

/// Amplicon sequencing metadata of one (sample, target) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmpliconMetadata {
    pub id: i32,
    pub sample_id: i32,
    pub target: String,
    pub sample_extraction_id: Option<String>,
    pub facility_id: Option<i32>,
    pub index: String,
    pub pcr_1_to_10: String,
    pub pcr_1_to_100: String,
    pub pcr_neat: String,
    pub dilution: String,
    pub sequencing_run_number: Option<String>,
    pub flow_cell_id: Option<String>,
    pub reads: Option<i64>,
    pub name: Option<String>,
    pub analysis_software_version: Option<String>,
    pub comments: Option<String>,
    pub debug_note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct NewAmpliconMetadata {
    pub sample_id: i32,
    pub target: String,
    pub sample_extraction_id: Option<String>,
    /// `None` keeps whatever facility is already recorded
    pub facility_id: Option<i32>,
    pub index: String,
    pub pcr_1_to_10: String,
    pub pcr_1_to_100: String,
    pub pcr_neat: String,
    pub dilution: String,
    pub sequencing_run_number: Option<String>,
    pub flow_cell_id: Option<String>,
    pub reads: Option<i64>,
    pub name: Option<String>,
    pub analysis_software_version: Option<String>,
    pub comments: Option<String>,
    pub debug_note: String,
}

impl NewAmpliconMetadata {
    pub fn into_metadata(self, id: i32) -> AmpliconMetadata {
        AmpliconMetadata {
            id,
            sample_id: self.sample_id,
            target: self.target,
            sample_extraction_id: self.sample_extraction_id,
            facility_id: self.facility_id,
            index: self.index,
            pcr_1_to_10: self.pcr_1_to_10,
            pcr_1_to_100: self.pcr_1_to_100,
            pcr_neat: self.pcr_neat,
            dilution: self.dilution,
            sequencing_run_number: self.sequencing_run_number,
            flow_cell_id: self.flow_cell_id,
            reads: self.reads,
            name: self.name,
            analysis_software_version: self.analysis_software_version,
            comments: self.comments,
            debug_note: self.debug_note,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmpliconRun {
    pub id: i32,
    pub sample_id: i32,
    pub facility_id: Option<i32>,
    pub flow_cell_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmpliconFile {
    pub id: i32,
    pub sample_id: i32,
    pub metadata_id: i32,
    pub run_id: i32,
    pub filename: String,
    pub md5: String,
    pub analysed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewAmpliconFile {
    pub sample_id: i32,
    pub metadata_id: i32,
    pub run_id: i32,
    pub filename: String,
    pub md5: String,
    pub analysed: bool,
}

/// Tables wiped by a full reload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Metadata,
    Run,
    File,
}

impl Table {
    pub const RELOADED: [Table; 3] = [Table::Metadata, Table::Run, Table::File];

    pub fn name(self) -> &'static str {
        match self {
            Table::Metadata => "amplicon_metadata",
            Table::Run => "amplicon_run",
            Table::File => "amplicon_file",
        }
    }
}
