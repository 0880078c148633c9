//! # subst-xml Library
//!
//! Batch substitution inside one XML element across a directory of documents.
//! Each file is parsed strictly, repaired when it is malformed, edited in the
//! target element only, classified into exactly one [`Outcome`], and then
//! rewritten in place (with a backup) or moved into a bucket folder.

pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod file_discovery;
pub mod libxml2;
pub mod locator;
pub mod organizer;
pub mod output;
pub mod parser;
pub mod processor;
pub mod repair;
pub mod substitute;

pub use classify::{Bucket, Outcome, ParseStatus, RepairStatus, classify};
pub use cli::{Cli, OutputFormat, VerbosityLevel};
pub use config::{
    Config, ConfigError, ConfigManager, EnvProvider, FolderNames, LogLevel, ProcessingConfig,
    SystemEnvProvider,
};
pub use error::{OrganizeError, ParseFailure, RepairFailure, Result, SubstError};
pub use file_discovery::FileDiscovery;
pub use libxml2::LibXml2Wrapper;
pub use locator::{ElementText, LocateKind, Located, locate};
pub use organizer::{Disposition, FileOrganizer};
pub use output::Output;
pub use parser::{SourceText, XmlParser};
pub use processor::{
    Evaluation, FileRecord, FileReport, ProgressCallback, RunResults, RunSummary, XmlProcessor,
};
pub use repair::{LenientReparse, RepairMethod, RepairStrategy, Repaired, TextualFixes, XmlRepairer};
pub use substitute::{Rewrite, Substitution, escape_text, rewrite_element, substitute};
