//! Console output
//!
//! Per-file status lines and the end-of-run summary. These are user-facing
//! results written to stdout; diagnostics go through `tracing` on stderr.

use std::time::Duration;

use crate::classify::Outcome;
use crate::cli::VerbosityLevel;
use crate::organizer::Disposition;
use crate::processor::{FileReport, RunSummary};
use crate::repair::RepairMethod;

/// Simple output formatter for human-readable results
pub struct Output {
    verbosity: VerbosityLevel,
    show_colors: bool,
}

fn outcome_color(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Modified => "32",
        Outcome::RepairedAndModified => "36",
        Outcome::UnchangedValueAbsent | Outcome::UnchangedElementEmpty => "33",
        Outcome::Failed => "31",
    }
}

impl Output {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            show_colors: atty::is(atty::Stream::Stdout),
        }
    }

    /// Disable ANSI colors regardless of the terminal
    pub fn without_colors(mut self) -> Self {
        self.show_colors = false;
        self
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    /// One status line for a processed file, `None` when the verbosity hides it
    pub fn format_file_report(&self, report: &FileReport) -> Option<String> {
        let problem = report.disposition.is_warning() || report.disposition.is_error();
        if self.verbosity == VerbosityLevel::Quiet && !problem {
            return None;
        }

        let name = report
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| report.path.display().to_string());
        let outcome = report.outcome;

        let mut line = match &report.disposition {
            Disposition::Collision { destination } => format!(
                "{} {} - {}, destination exists: {}",
                self.colorize("⚠", "33"),
                name,
                outcome,
                destination.display()
            ),
            Disposition::Aborted { reason } => format!(
                "{} {} - {}, aborted: {}",
                self.colorize("⚠", "31"),
                name,
                outcome,
                reason
            ),
            _ if outcome.is_modification() => format!(
                "{} {} - {} replacement{}",
                self.colorize(outcome.symbol(), outcome_color(outcome)),
                name,
                report.replacements,
                if report.replacements == 1 { "" } else { "s" }
            ),
            _ => format!(
                "{} {} - {}",
                self.colorize(outcome.symbol(), outcome_color(outcome)),
                name,
                outcome
            ),
        };

        if self.verbosity >= VerbosityLevel::Verbose {
            if let Some(method) = &report.repair_method {
                line.push_str(&format!("\n    repaired: {}", format_repair_method(method)));
            }
            if let Some(reason) = &report.reason {
                line.push_str(&format!("\n    reason: {}", reason));
            }
            match &report.disposition {
                Disposition::Rewritten {
                    backup: Some(backup),
                } => line.push_str(&format!("\n    backup: {}", backup.display())),
                Disposition::Relocated { destination } => {
                    line.push_str(&format!("\n    moved to: {}", destination.display()))
                }
                _ => {}
            }
            line.push_str(&format!("\n    took {}", format_duration(report.duration)));
        }

        Some(line)
    }

    pub fn format_summary(&self, summary: &RunSummary, dry_run: bool) -> String {
        let mut output = String::new();
        if dry_run {
            output.push_str(&self.colorize("Dry run: no files were changed\n", "36"));
        }
        output.push_str("Summary:\n");
        output.push_str(&format!(
            "  {} {}\n",
            self.colorize("✓ Modified:", "32"),
            summary.total_modified()
        ));
        output.push_str(&format!(
            "  ○ Value not found: {}\n",
            summary.count(Outcome::UnchangedValueAbsent)
        ));
        output.push_str(&format!(
            "  ⊘ Element absent or empty: {}\n",
            summary.count(Outcome::UnchangedElementEmpty)
        ));
        output.push_str(&format!("  🔧 Repaired: {}\n", summary.repaired));

        if summary.failed > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("✗ Failed:", "31"),
                summary.failed
            ));
        }
        if summary.warnings > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("⚠ Collisions:", "33"),
                summary.warnings
            ));
        }
        if summary.errors > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("⚠ Aborted:", "31"),
                summary.errors
            ));
        }

        if self.verbosity >= VerbosityLevel::Verbose {
            output.push_str(&format!("  Replacements: {}\n", summary.replacements));
        }
        output.push_str(&format!("  Total processed: {}\n", summary.total));

        output
    }

    /// The summary as pretty-printed JSON
    pub fn format_json(&self, summary: &RunSummary) -> serde_json::Result<String> {
        serde_json::to_string_pretty(summary)
    }
}

fn format_repair_method(method: &RepairMethod) -> String {
    match method {
        RepairMethod::Lenient => "lenient re-parse".to_string(),
        RepairMethod::Textual { fixes } => format!("textual fixes ({})", fixes.join(", ")),
    }
}

fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs_f64();
    if total_secs < 1.0 {
        format!("{:.0}ms", duration.as_millis())
    } else {
        format!("{:.2}s", total_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn report(outcome: Outcome, disposition: Disposition) -> FileReport {
        FileReport {
            path: PathBuf::from("/work/nota.xml"),
            outcome,
            disposition,
            replacements: 2,
            repair_method: None,
            reason: None,
            duration: Duration::from_millis(3),
        }
    }

    #[test]
    fn test_file_line_normal() {
        let output = Output::new(VerbosityLevel::Normal).without_colors();

        let line = output
            .format_file_report(&report(
                Outcome::Modified,
                Disposition::Rewritten { backup: None },
            ))
            .unwrap();
        assert_eq!(line, "✓ nota.xml - 2 replacements");

        let line = output
            .format_file_report(&report(
                Outcome::UnchangedValueAbsent,
                Disposition::Relocated {
                    destination: PathBuf::from("/work/xmls_nao_alterados/nota.xml"),
                },
            ))
            .unwrap();
        assert_eq!(line, "○ nota.xml - value not found");
    }

    #[test]
    fn test_file_line_collision_shown_when_quiet() {
        let output = Output::new(VerbosityLevel::Quiet).without_colors();

        assert!(
            output
                .format_file_report(&report(Outcome::Failed, Disposition::Relocated {
                    destination: PathBuf::from("x"),
                }))
                .is_none()
        );

        let line = output
            .format_file_report(&report(
                Outcome::Failed,
                Disposition::Collision {
                    destination: PathBuf::from("/work/Arquivos_NOT_alterados/nota.xml"),
                },
            ))
            .unwrap();
        assert!(line.starts_with("⚠ nota.xml"));
        assert!(line.contains("destination exists"));
    }

    #[test]
    fn test_file_line_verbose_details() {
        let output = Output::new(VerbosityLevel::Verbose).without_colors();
        let mut repaired = report(
            Outcome::RepairedAndModified,
            Disposition::Rewritten {
                backup: Some(PathBuf::from("/work/Backup_XML/nota.xml")),
            },
        );
        repaired.repair_method = Some(RepairMethod::Textual {
            fixes: vec!["escape-bare-ampersands".to_string()],
        });

        let line = output.format_file_report(&repaired).unwrap();
        assert!(line.starts_with("🔧 nota.xml"));
        assert!(line.contains("textual fixes (escape-bare-ampersands)"));
        assert!(line.contains("backup: /work/Backup_XML/nota.xml"));
    }

    #[test]
    fn test_output_summary() {
        let output = Output::new(VerbosityLevel::Normal).without_colors();
        let summary = RunSummary {
            total: 5,
            modified: 2,
            repaired_and_modified: 1,
            value_absent: 1,
            failed: 1,
            repaired: 1,
            warnings: 1,
            ..RunSummary::default()
        };

        let formatted = output.format_summary(&summary, false);
        assert!(formatted.contains("Summary:"));
        assert!(formatted.contains("✓ Modified: 3"));
        assert!(formatted.contains("○ Value not found: 1"));
        assert!(formatted.contains("⊘ Element absent or empty: 0"));
        assert!(formatted.contains("🔧 Repaired: 1"));
        assert!(formatted.contains("✗ Failed: 1"));
        assert!(formatted.contains("⚠ Collisions: 1"));
        assert!(formatted.contains("Total processed: 5"));
        assert!(!formatted.contains("Dry run"));

        assert!(output.format_summary(&summary, true).starts_with("Dry run"));
    }

    #[test]
    fn test_json_summary() {
        let output = Output::new(VerbosityLevel::Normal);
        let summary = RunSummary {
            total: 1,
            modified: 1,
            replacements: 2,
            ..RunSummary::default()
        };

        let json: serde_json::Value =
            serde_json::from_str(&output.format_json(&summary).unwrap()).unwrap();
        assert_eq!(json["total"], 1);
        assert_eq!(json["modified"], 1);
        assert_eq!(json["replacements"], 2);
    }
}
