//! Per-file pipeline and run loop
//!
//! [`XmlProcessor::evaluate`] is the pure part: bytes in, [`Evaluation`] out,
//! covering parse, repair, lookup, substitution and classification. The
//! effectful part hands that result to the [`FileOrganizer`]. Files are handled
//! one after another; a run interrupted midway leaves already moved files where
//! they were moved.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use roxmltree::Document;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::classify::{Outcome, ParseStatus, RepairStatus, classify};
use crate::config::ProcessingConfig;
use crate::error::{ParseFailure, Result};
use crate::file_discovery::FileDiscovery;
use crate::locator::{LocateKind, Located, locate};
use crate::organizer::{Disposition, FileOrganizer};
use crate::parser::{SourceText, XmlParser};
use crate::repair::{RepairMethod, XmlRepairer};
use crate::substitute::rewrite_element;

/// Everything decided about one document before any filesystem action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub outcome: Outcome,
    pub parse: ParseStatus,
    pub repair: RepairStatus,
    pub located: LocateKind,
    pub replacements: usize,
    pub repair_method: Option<RepairMethod>,
    /// Why the document could not be used, for `Failed`
    pub reason: Option<String>,
    /// New file content, present only for modifications
    pub rewritten: Option<Vec<u8>>,
}

impl Evaluation {
    /// A substitution whose result would not parse is never written back
    fn rejected(
        parse: ParseStatus,
        repair: RepairStatus,
        applied: &Applied,
        failure: ParseFailure,
    ) -> Self {
        error!(reason = %failure.reason, "Substituted document is not well-formed");
        Self {
            outcome: Outcome::Failed,
            parse,
            repair,
            located: applied.located,
            replacements: 0,
            repair_method: None,
            reason: Some(format!("substitution would produce malformed XML: {}", failure.reason)),
            rewritten: None,
        }
    }

    fn failed(parse: ParseStatus, repair: RepairStatus, reason: String) -> Self {
        Self {
            outcome: classify(parse, repair, LocateKind::Absent, 0),
            parse,
            repair,
            located: LocateKind::Absent,
            replacements: 0,
            repair_method: None,
            reason: Some(reason),
            rewritten: None,
        }
    }
}

/// Transient state of the file currently going through the pipeline
#[derive(Debug)]
pub struct FileRecord {
    pub path: PathBuf,
    pub raw: Vec<u8>,
    pub evaluation: Evaluation,
}

/// What happened to one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: Outcome,
    pub disposition: Disposition,
    pub replacements: usize,
    pub repair_method: Option<RepairMethod>,
    pub reason: Option<String>,
    pub duration: Duration,
}

/// Per-outcome tallies for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub modified: usize,
    pub repaired_and_modified: usize,
    pub value_absent: usize,
    pub element_empty: usize,
    pub failed: usize,
    /// Files whose content came from a repair
    pub repaired: usize,
    /// Substitutions made across all files
    pub replacements: usize,
    /// Files left in place because a destination was taken
    pub warnings: usize,
    /// Files whose backup, write or move failed
    pub errors: usize,
}

impl RunSummary {
    pub fn record(&mut self, report: &FileReport) {
        self.total += 1;
        match report.outcome {
            Outcome::Modified => self.modified += 1,
            Outcome::RepairedAndModified => self.repaired_and_modified += 1,
            Outcome::UnchangedValueAbsent => self.value_absent += 1,
            Outcome::UnchangedElementEmpty => self.element_empty += 1,
            Outcome::Failed => self.failed += 1,
        }
        if report.repair_method.is_some() {
            self.repaired += 1;
        }
        self.replacements += report.replacements;
        if report.disposition.is_warning() {
            self.warnings += 1;
        }
        if report.disposition.is_error() {
            self.errors += 1;
        }
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        match outcome {
            Outcome::Modified => self.modified,
            Outcome::RepairedAndModified => self.repaired_and_modified,
            Outcome::UnchangedValueAbsent => self.value_absent,
            Outcome::UnchangedElementEmpty => self.element_empty,
            Outcome::Failed => self.failed,
        }
    }

    /// Files rewritten in place, repaired or not
    pub fn total_modified(&self) -> usize {
        self.modified + self.repaired_and_modified
    }
}

/// Reports and totals of a finished run
#[derive(Debug, Clone)]
pub struct RunResults {
    pub summary: RunSummary,
    pub file_reports: Vec<FileReport>,
    pub total_duration: Duration,
}

/// Progress callback invoked after each file
pub type ProgressCallback = Arc<dyn Fn(&FileReport) + Send + Sync>;

struct Applied {
    located: LocateKind,
    replacements: usize,
    content: String,
}

/// Drives discovery, evaluation and organization for one configuration
pub struct XmlProcessor {
    config: ProcessingConfig,
    parser: XmlParser,
    repairer: XmlRepairer,
    discovery: FileDiscovery,
}

impl XmlProcessor {
    pub fn new(config: ProcessingConfig) -> Self {
        Self {
            config,
            parser: XmlParser::new(),
            repairer: XmlRepairer::new(),
            discovery: FileDiscovery::new(),
        }
    }

    pub fn with_discovery(mut self, discovery: FileDiscovery) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_repairer(mut self, repairer: XmlRepairer) -> Self {
        self.repairer = repairer;
        self
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Decide what should happen to a document without touching disk
    pub fn evaluate(&self, raw: &[u8]) -> Evaluation {
        let failure = match self.parser.decode(raw) {
            Ok(source) => match self.parser.parse(&source.body) {
                Ok(doc) => return self.evaluate_well_formed(&source, &doc),
                Err(failure) => failure,
            },
            Err(failure) => failure,
        };

        warn!(reason = %failure.reason, "Document is not well-formed");
        if !self.config.try_repair() {
            return Evaluation::failed(
                ParseStatus::Malformed,
                RepairStatus::Disabled,
                failure.to_string(),
            );
        }

        let repaired = match self.repairer.repair(raw) {
            Ok(repaired) => repaired,
            Err(e) => {
                warn!(error = %e, "Repair failed");
                return Evaluation::failed(
                    ParseStatus::Malformed,
                    RepairStatus::Failed,
                    format!("{}; {}", failure, e),
                );
            }
        };

        let doc = match self.parser.parse(&repaired.content) {
            Ok(doc) => doc,
            Err(e) => {
                return Evaluation::failed(
                    ParseStatus::Malformed,
                    RepairStatus::Failed,
                    format!("{}; repaired text rejected: {}", failure, e),
                );
            }
        };
        let applied = self.apply(&doc);
        if let Err(e) = self.parser.check(&applied.content) {
            return Evaluation::rejected(ParseStatus::Malformed, RepairStatus::Succeeded, &applied, e);
        }
        let outcome = classify(
            ParseStatus::Malformed,
            RepairStatus::Succeeded,
            applied.located,
            applied.replacements,
        );

        Evaluation {
            outcome,
            parse: ParseStatus::Malformed,
            repair: RepairStatus::Succeeded,
            located: applied.located,
            replacements: applied.replacements,
            repair_method: Some(repaired.method),
            reason: None,
            rewritten: Some(applied.content.into_bytes()),
        }
    }

    fn evaluate_well_formed(&self, source: &SourceText<'_>, doc: &Document<'_>) -> Evaluation {
        let applied = self.apply(doc);
        let outcome = classify(
            ParseStatus::WellFormed,
            RepairStatus::NotNeeded,
            applied.located,
            applied.replacements,
        );

        let rewritten = if outcome.is_modification() {
            if let Err(e) = self.parser.check(&applied.content) {
                return Evaluation::rejected(
                    ParseStatus::WellFormed,
                    RepairStatus::NotNeeded,
                    &applied,
                    e,
                );
            }
            Some(source.encode(&applied.content))
        } else {
            None
        };

        Evaluation {
            outcome,
            parse: ParseStatus::WellFormed,
            repair: RepairStatus::NotNeeded,
            located: applied.located,
            replacements: applied.replacements,
            repair_method: None,
            reason: None,
            rewritten,
        }
    }

    /// Locate the target and substitute inside it; `content` is the full new source
    fn apply(&self, doc: &Document<'_>) -> Applied {
        let source = doc.input_text();
        match locate(doc, self.config.target_element()) {
            Located::Present(element) => {
                let rewrite = rewrite_element(
                    source,
                    &element,
                    self.config.old_value(),
                    self.config.new_value(),
                );
                debug!(
                    element = self.config.target_element(),
                    replacements = rewrite.count,
                    "Substituted"
                );
                Applied {
                    located: LocateKind::Present,
                    replacements: rewrite.count,
                    content: rewrite.content,
                }
            }
            other => Applied {
                located: other.kind(),
                replacements: 0,
                content: source.to_string(),
            },
        }
    }

    /// Run one file through the whole pipeline, organizing it relative to its own folder
    pub async fn process_file(&self, path: &Path) -> FileReport {
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let organizer = FileOrganizer::new(root, &self.config);
        self.process_with(&organizer, path).await
    }

    async fn process_with(&self, organizer: &FileOrganizer, path: &Path) -> FileReport {
        let start = Instant::now();

        let record = match tokio::fs::read(path).await {
            Ok(raw) => {
                let evaluation = self.evaluate(&raw);
                FileRecord {
                    path: path.to_path_buf(),
                    raw,
                    evaluation,
                }
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Cannot read file");
                FileRecord {
                    path: path.to_path_buf(),
                    raw: Vec::new(),
                    evaluation: Evaluation::failed(
                        ParseStatus::Malformed,
                        RepairStatus::Failed,
                        format!("cannot read file: {}", e),
                    ),
                }
            }
        };

        let evaluation = &record.evaluation;
        let disposition = organizer
            .organize(
                &record.path,
                &record.raw,
                evaluation.rewritten.as_deref(),
                evaluation.outcome,
            )
            .await;

        debug!(
            file = %record.path.display(),
            outcome = %evaluation.outcome,
            replacements = evaluation.replacements,
            "Processed file"
        );

        FileReport {
            path: record.path.clone(),
            outcome: evaluation.outcome,
            disposition,
            replacements: evaluation.replacements,
            repair_method: evaluation.repair_method.clone(),
            reason: evaluation.reason.clone(),
            duration: start.elapsed(),
        }
    }

    /// Process every candidate file in `directory`
    pub async fn run(&self, directory: &Path) -> Result<RunResults> {
        self.run_with_progress(directory, None).await
    }

    /// Process every candidate file in `directory`, reporting each file as it finishes
    pub async fn run_with_progress(
        &self,
        directory: &Path,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<RunResults> {
        let start = Instant::now();
        let files = self.discovery.discover_files(directory).await?;
        info!(
            dir = %directory.display(),
            files = files.len(),
            dry_run = self.config.dry_run(),
            "Starting run"
        );

        let organizer = FileOrganizer::new(directory, &self.config);
        let mut summary = RunSummary::default();
        let mut file_reports = Vec::with_capacity(files.len());

        for path in &files {
            let report = self.process_with(&organizer, path).await;
            summary.record(&report);
            if let Some(callback) = &progress_callback {
                callback(&report);
            }
            file_reports.push(report);
        }

        info!(
            total = summary.total,
            modified = summary.total_modified(),
            failed = summary.failed,
            "Run finished"
        );

        Ok(RunResults {
            summary,
            file_reports,
            total_duration: start.elapsed(),
        })
    }
}
