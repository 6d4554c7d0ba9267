use crate::error::{IngestError, Result};
use crate::models::*;
use crate::sample::SampleId;
use crate::store::Store;

const METADATA_COLUMNS: &str = "id, sample_id, target, sample_extraction_id, facility_id, \
    \"index\", pcr_1_to_10, pcr_1_to_100, pcr_neat, dilution, sequencing_run_number, \
    flow_cell_id, reads, name, analysis_software_version, comments, debug_note";

struct Statements {
    upsert_metadata: postgres::Statement,
    select_metadata: postgres::Statement,
    insert_file: postgres::Statement,
}

/// PostgreSQL backed [`Store`]
pub struct Database {
    client: postgres::Client,
    statements: Statements,
}

impl Database {
    pub fn new(connstr: &str, initialize: bool) -> Result<Self> {
        let mut client = postgres::Client::connect(connstr, postgres::NoTls)?;

        if initialize {
            let drop_sql = include_str!("../db/drop.sql");
            let init_sql = include_str!("../db/initialize.sql");
            client.batch_execute(drop_sql)?;
            client.batch_execute(init_sql)?;
            info!("Database schema (re)created");
        }

        let statements = Statements {
            upsert_metadata: client.prepare(
                "INSERT INTO amplicon_metadata (sample_id, target, sample_extraction_id, \
                    facility_id, \"index\", pcr_1_to_10, pcr_1_to_100, pcr_neat, dilution, \
                    sequencing_run_number, flow_cell_id, reads, name, analysis_software_version, \
                    comments, debug_note) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16) \
                 ON CONFLICT (sample_id, target) DO UPDATE SET \
                    sample_extraction_id = EXCLUDED.sample_extraction_id, \
                    facility_id = COALESCE(EXCLUDED.facility_id, amplicon_metadata.facility_id), \
                    \"index\" = EXCLUDED.\"index\", \
                    pcr_1_to_10 = EXCLUDED.pcr_1_to_10, \
                    pcr_1_to_100 = EXCLUDED.pcr_1_to_100, \
                    pcr_neat = EXCLUDED.pcr_neat, \
                    dilution = EXCLUDED.dilution, \
                    sequencing_run_number = EXCLUDED.sequencing_run_number, \
                    flow_cell_id = EXCLUDED.flow_cell_id, \
                    reads = EXCLUDED.reads, \
                    name = EXCLUDED.name, \
                    analysis_software_version = EXCLUDED.analysis_software_version, \
                    comments = EXCLUDED.comments, \
                    debug_note = EXCLUDED.debug_note \
                 RETURNING id, facility_id",
            )?,
            select_metadata: client.prepare(&format!(
                "SELECT {} FROM amplicon_metadata WHERE sample_extraction_id=$1 AND target=$2",
                METADATA_COLUMNS
            ))?,
            insert_file: client.prepare(
                "INSERT INTO amplicon_file \
                 (sample_id, metadata_id, run_id, filename, md5, analysed) \
                 VALUES ($1,$2,$3,$4,$5,$6) RETURNING id",
            )?,
        };

        Ok(Database { client, statements })
    }
}

fn metadata_from_row(row: &postgres::Row) -> AmpliconMetadata {
    AmpliconMetadata {
        id: row.get("id"),
        sample_id: row.get("sample_id"),
        target: row.get("target"),
        sample_extraction_id: row.get("sample_extraction_id"),
        facility_id: row.get("facility_id"),
        index: row.get("index"),
        pcr_1_to_10: row.get("pcr_1_to_10"),
        pcr_1_to_100: row.get("pcr_1_to_100"),
        pcr_neat: row.get("pcr_neat"),
        dilution: row.get("dilution"),
        sequencing_run_number: row.get("sequencing_run_number"),
        flow_cell_id: row.get("flow_cell_id"),
        reads: row.get("reads"),
        name: row.get("name"),
        analysis_software_version: row.get("analysis_software_version"),
        comments: row.get("comments"),
        debug_note: row.get("debug_note"),
    }
}

impl Store for Database {
    fn get_or_create_facility(&mut self, name: &str) -> Result<Facility> {
        self.client.execute(
            "INSERT INTO facility (name) VALUES ($1) ON CONFLICT (name) DO NOTHING",
            &[&name],
        )?;
        let row = self
            .client
            .query_one("SELECT id FROM facility WHERE name=$1", &[&name])?;
        Ok(Facility {
            id: row.get("id"),
            name: name.to_string(),
        })
    }

    fn get_or_create_sample(&mut self, bpa_id: &SampleId) -> Result<Sample> {
        self.client.execute(
            "INSERT INTO sample (bpa_id) VALUES ($1) ON CONFLICT (bpa_id) DO NOTHING",
            &[&bpa_id.as_str()],
        )?;
        let row = self
            .client
            .query_one("SELECT id FROM sample WHERE bpa_id=$1", &[&bpa_id.as_str()])?;
        Ok(Sample {
            id: row.get("id"),
            bpa_id: bpa_id.clone(),
        })
    }

    fn upsert_metadata(&mut self, m: NewAmpliconMetadata) -> Result<AmpliconMetadata> {
        let row = self.client.query_one(
            &self.statements.upsert_metadata,
            &[
                &m.sample_id,
                &m.target,
                &m.sample_extraction_id,
                &m.facility_id,
                &m.index,
                &m.pcr_1_to_10,
                &m.pcr_1_to_100,
                &m.pcr_neat,
                &m.dilution,
                &m.sequencing_run_number,
                &m.flow_cell_id,
                &m.reads,
                &m.name,
                &m.analysis_software_version,
                &m.comments,
                &m.debug_note,
            ],
        )?;
        let facility_id: Option<i32> = row.get("facility_id");
        let mut metadata = m.into_metadata(row.get("id"));
        metadata.facility_id = facility_id;
        Ok(metadata)
    }

    fn get_metadata(&mut self, extraction_id: &str, target: &str) -> Result<AmpliconMetadata> {
        let mut rows = self
            .client
            .query(&self.statements.select_metadata, &[&extraction_id, &target])?;
        let what = || format!("amplicon metadata {} {}", extraction_id, target);
        match rows.len() {
            0 => Err(IngestError::NotFound(what())),
            1 => Ok(metadata_from_row(&rows.remove(0))),
            _ => Err(IngestError::Ambiguous(what())),
        }
    }

    fn set_metadata_facility(&mut self, metadata_id: i32, facility_id: i32) -> Result<()> {
        let n = self.client.execute(
            "UPDATE amplicon_metadata SET facility_id=$2 WHERE id=$1",
            &[&metadata_id, &facility_id],
        )?;
        if n == 0 {
            return Err(IngestError::NotFound(format!("amplicon metadata #{}", metadata_id)));
        }
        Ok(())
    }

    fn get_or_create_run(&mut self, sample_id: i32) -> Result<AmpliconRun> {
        self.client.execute(
            "INSERT INTO amplicon_run (sample_id) VALUES ($1) ON CONFLICT (sample_id) DO NOTHING",
            &[&sample_id],
        )?;
        let row = self.client.query_one(
            "SELECT id, sample_id, facility_id, flow_cell_id FROM amplicon_run WHERE sample_id=$1",
            &[&sample_id],
        )?;
        Ok(AmpliconRun {
            id: row.get("id"),
            sample_id: row.get("sample_id"),
            facility_id: row.get("facility_id"),
            flow_cell_id: row.get("flow_cell_id"),
        })
    }

    fn update_run(&mut self, run: &AmpliconRun) -> Result<()> {
        self.client.execute(
            "UPDATE amplicon_run SET facility_id=$2, flow_cell_id=$3 WHERE id=$1",
            &[&run.id, &run.facility_id, &run.flow_cell_id],
        )?;
        Ok(())
    }

    fn create_file(&mut self, f: NewAmpliconFile) -> Result<AmpliconFile> {
        let row = self.client.query_one(
            &self.statements.insert_file,
            &[&f.sample_id, &f.metadata_id, &f.run_id, &f.filename, &f.md5, &f.analysed],
        )?;
        Ok(AmpliconFile {
            id: row.get("id"),
            sample_id: f.sample_id,
            metadata_id: f.metadata_id,
            run_id: f.run_id,
            filename: f.filename,
            md5: f.md5,
            analysed: f.analysed,
        })
    }

    fn truncate(&mut self, tables: &[Table]) -> Result<()> {
        for t in tables {
            debug!("Truncating {}", t.name());
            self.client
                .batch_execute(&format!("TRUNCATE TABLE \"{}\" CASCADE", t.name()))?;
        }
        Ok(())
    }
}
