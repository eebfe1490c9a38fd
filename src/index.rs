use std::collections::BTreeMap;
use std::fs;
use std::io::BufRead;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{Accession, Domain, GenomeId, GenomeJob, MalformedRecordPolicy, parse_assembly};
use crate::error::PipelineError;
use crate::project::Project;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    #[serde(rename = "GCA", with = "assembly_json")]
    pub assembly: Option<Accession>,
    #[serde(rename = "DOM")]
    pub domain: Domain,
}

/// A missing assembly is stored as the integer `-1`, like the upstream file.
mod assembly_json {
    use serde::{Deserialize, Deserializer, Serializer, de};

    use crate::domain::{Accession, parse_assembly};

    pub fn serialize<S: Serializer>(
        value: &Option<Accession>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(accession) => serializer.serialize_str(accession.as_str()),
            None => serializer.serialize_i64(-1),
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Accession>, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Number(-1) => Ok(None),
            Raw::Number(other) => Err(de::Error::custom(format!("invalid assembly: {other}"))),
            Raw::Text(text) => parse_assembly(&text).map_err(de::Error::custom),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessionIndex {
    entries: BTreeMap<GenomeId, IndexRecord>,
}

impl AccessionIndex {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, genome_id: &GenomeId) -> Option<&IndexRecord> {
        self.entries.get(genome_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GenomeId, &IndexRecord)> {
        self.entries.iter()
    }

    pub fn jobs(&self, project: &Project) -> Vec<GenomeJob> {
        self.entries
            .iter()
            .map(|(genome_id, record)| GenomeJob {
                genome_id: genome_id.clone(),
                assembly: record.assembly.clone(),
                domain: record.domain,
                project_root: project.root().to_path_buf(),
            })
            .collect()
    }

    pub fn read(path: &Utf8Path) -> Result<Self, PipelineError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| PipelineError::IndexUnavailable(format!("{path}: {err}")))?;
        serde_json::from_str(&content)
            .map_err(|err| PipelineError::IndexUnavailable(format!("{path}: {err}")))
    }

    pub fn write(&self, path: &Utf8Path) -> Result<(), PipelineError> {
        let content = serde_json::to_vec_pretty(self)
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        Project::write_bytes_atomic(path, &content)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedRecord {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexSummary {
    pub index_path: String,
    pub genomes: usize,
    pub skipped: Vec<SkippedRecord>,
    pub loaded: bool,
}

pub struct AccessionIndexLoader {
    policy: MalformedRecordPolicy,
    domains: Vec<Domain>,
}

impl AccessionIndexLoader {
    pub fn new(policy: MalformedRecordPolicy, domains: Vec<Domain>) -> Self {
        Self { policy, domains }
    }

    pub fn parse<R: BufRead>(
        &self,
        reader: R,
    ) -> Result<(AccessionIndex, Vec<SkippedRecord>), PipelineError> {
        let mut index = AccessionIndex::default();
        let mut skipped = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.map_err(|err| PipelineError::Filesystem(err.to_string()))?;
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.trim().is_empty() || trimmed.trim_start().starts_with('#') {
                continue;
            }

            let parsed = self
                .parse_record(trimmed)
                .and_then(|(genome_id, record)| {
                    if index.entries.contains_key(&genome_id) {
                        Err(format!("duplicate genome id {genome_id}"))
                    } else {
                        Ok((genome_id, record))
                    }
                });

            match parsed {
                Ok((genome_id, record)) => {
                    index.entries.insert(genome_id, record);
                }
                Err(message) => match self.policy {
                    MalformedRecordPolicy::Abort => {
                        return Err(PipelineError::Parse {
                            line: line_no,
                            message,
                        });
                    }
                    MalformedRecordPolicy::Skip => {
                        warn!(line = line_no, reason = %message, "skipping index record");
                        skipped.push(SkippedRecord {
                            line: line_no,
                            reason: message,
                        });
                    }
                },
            }
        }

        Ok((index, skipped))
    }

    fn parse_record(&self, line: &str) -> Result<(GenomeId, IndexRecord), String> {
        let columns: Vec<&str> = if line.contains('\t') {
            line.split('\t').map(str::trim).collect()
        } else {
            line.split_whitespace().collect()
        };
        if columns.len() < 3 {
            return Err(format!("expected 3 columns, found {}", columns.len()));
        }

        let genome_id: GenomeId = columns[0].parse().map_err(|err: PipelineError| err.to_string())?;
        let assembly = parse_assembly(columns[1]).map_err(|err| err.to_string())?;
        let domain: Domain = columns[2].parse().map_err(|err: PipelineError| err.to_string())?;
        if !self.domains.contains(&domain) {
            return Err(format!("domain {domain} is not configured for this project"));
        }

        Ok((genome_id, IndexRecord { assembly, domain }))
    }

    pub fn load_file(
        &self,
        path: &Utf8Path,
    ) -> Result<(AccessionIndex, Vec<SkippedRecord>), PipelineError> {
        let file = fs::File::open(path.as_std_path())
            .map_err(|err| PipelineError::IndexUnavailable(format!("{path}: {err}")))?;
        self.parse(std::io::BufReader::new(file))
    }

    /// Produces the project's index file unless it already exists, in which
    /// case the file on disk is taken as complete and read back.
    pub fn ensure(
        &self,
        upid_file: &Utf8Path,
        project: &Project,
        force: bool,
    ) -> Result<(AccessionIndex, IndexSummary), PipelineError> {
        let index_path = project.index_path();
        if !force && index_path.as_std_path().exists() {
            info!(path = %index_path, "index already present, loader not re-run");
            let index = AccessionIndex::read(&index_path)?;
            let summary = IndexSummary {
                index_path: index_path.to_string(),
                genomes: index.len(),
                skipped: Vec::new(),
                loaded: false,
            };
            return Ok((index, summary));
        }

        let (index, skipped) = self.load_file(upid_file)?;
        index.write(&index_path)?;
        info!(
            genomes = index.len(),
            skipped = skipped.len(),
            path = %index_path,
            "wrote accession index"
        );
        let summary = IndexSummary {
            index_path: index_path.to_string(),
            genomes: index.len(),
            skipped,
            loaded: true,
        };
        Ok((index, summary))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const SAMPLE: &str = "UP000005640\tGCA_000001405\tEukaryota\n\
                          # comment\n\
                          \n\
                          UP000000625\tGCA_000005845\tbacteria\textra\n";

    fn loader(policy: MalformedRecordPolicy) -> AccessionIndexLoader {
        AccessionIndexLoader::new(policy, Domain::ALL.to_vec())
    }

    #[test]
    fn parse_tab_separated() {
        let (index, skipped) = loader(MalformedRecordPolicy::Abort)
            .parse(SAMPLE.as_bytes())
            .unwrap();
        assert!(skipped.is_empty());
        assert_eq!(index.len(), 2);
        let ecoli = index.get(&"UP000000625".parse().unwrap()).unwrap();
        assert_eq!(ecoli.domain, Domain::Bacteria);
        assert_eq!(ecoli.assembly.as_ref().unwrap().as_str(), "GCA_000005845");
    }

    #[test]
    fn skip_policy_records_bad_lines() {
        let input = "UP1\tGCA_1\tArchaea\nUP2\t\tArchaea\nUP3 GCA_3\nUP1\tGCA_9\tArchaea\n";
        let (index, skipped) = loader(MalformedRecordPolicy::Skip)
            .parse(input.as_bytes())
            .unwrap();
        assert_eq!(index.len(), 1);
        let lines: Vec<usize> = skipped.iter().map(|s| s.line).collect();
        assert_eq!(lines, vec![2, 3, 4]);
        assert_eq!(
            index.get(&"UP1".parse().unwrap()).unwrap().assembly.as_ref().unwrap().as_str(),
            "GCA_1"
        );
    }

    #[test]
    fn abort_policy_fails_on_first_bad_line() {
        let input = "UP1\tGCA_1\tArchaea\nUP2\tGCA/2\tArchaea\n";
        let err = loader(MalformedRecordPolicy::Abort)
            .parse(input.as_bytes())
            .unwrap_err();
        assert_matches!(err, PipelineError::Parse { line: 2, .. });
    }

    #[test]
    fn unconfigured_domain_is_malformed() {
        let loader = AccessionIndexLoader::new(MalformedRecordPolicy::Skip, vec![Domain::Bacteria]);
        let (index, skipped) = loader.parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(skipped.len(), 1);
    }

    #[test]
    fn json_uses_upstream_keys() {
        let (index, _) = loader(MalformedRecordPolicy::Abort)
            .parse("UP000005640 GCA_000001405 Eukaryota\n".as_bytes())
            .unwrap();
        let value = serde_json::to_value(&index).unwrap();
        assert_eq!(value["UP000005640"]["GCA"], "GCA_000001405");
        assert_eq!(value["UP000005640"]["DOM"], "Eukaryota");
    }

    #[test]
    fn missing_assembly_kept_as_minus_one() {
        let (index, skipped) = loader(MalformedRecordPolicy::Abort)
            .parse("UP000464024\t-1\tViruses\n".as_bytes())
            .unwrap();
        assert!(skipped.is_empty());
        let upid: GenomeId = "UP000464024".parse().unwrap();
        assert_eq!(index.get(&upid).unwrap().assembly, None);

        let json = serde_json::to_string(&index).unwrap();
        assert_eq!(json, r#"{"UP000464024":{"GCA":-1,"DOM":"Viruses"}}"#);
        let back: AccessionIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(back, index);
    }
}
