// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Offline checks of a sample manifest and layout.
//!
//! Playback decodes leniently: malformed text silently turns into wrong bytes.
//! Verification runs the same load pipeline and also checks every payload
//! strictly, so bad entries show up before anyone plays them.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::assets::AssetSource;
use crate::audio::AudioContext;
use crate::codec::{self, DATA_URI_HEADER_LEN};
use crate::layout::Layout;
use crate::samples::{LoadError, SampleBank};

/// Severity level for a verification issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A single verification issue found during checking.
#[derive(Debug, Clone)]
pub struct Issue {
    pub severity: Severity,
    pub category: &'static str,
    /// The note the issue is about, or the asset path for issues that aren't
    /// about one note.
    pub subject: String,
    pub message: String,
}

/// A sample that decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSummary {
    pub note: String,
    pub frames: usize,
    pub duration: Duration,
}

/// Result of verifying a manifest.
#[derive(Debug, Clone, Default)]
pub struct VerificationReport {
    pub issues: Vec<Issue>,
    pub samples: Vec<SampleSummary>,
}

impl VerificationReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    /// Merge another report into this one.
    pub fn merge(&mut self, other: VerificationReport) {
        self.issues.extend(other.issues);
        self.samples.extend(other.samples);
    }
}

/// Checks every manifest entry's payload against the strict radix-64 rules.
pub fn check_encoding(manifest: &BTreeMap<String, String>) -> Vec<Issue> {
    let mut issues = Vec::new();
    for (note, entry) in manifest {
        if entry.len() < DATA_URI_HEADER_LEN {
            issues.push(Issue {
                severity: Severity::Warning,
                category: "encoding",
                subject: note.clone(),
                message: format!(
                    "entry is shorter than the {} character header",
                    DATA_URI_HEADER_LEN
                ),
            });
            continue;
        }
        if let Err(e) = codec::validate(codec::strip_header(entry)) {
            issues.push(Issue {
                severity: Severity::Warning,
                category: "encoding",
                subject: note.clone(),
                message: e.to_string(),
            });
        }
    }
    issues
}

/// Checks that every note the layout plays has a sample.
pub fn check_layout(layout: &Layout, notes: &BTreeSet<&str>) -> Vec<Issue> {
    let mut missing: BTreeSet<&str> = BTreeSet::new();
    for (_, note) in layout.rows().iter().flatten() {
        if !notes.contains(note.as_str()) {
            missing.insert(note);
        }
    }
    missing
        .into_iter()
        .map(|note| Issue {
            severity: Severity::Warning,
            category: "layout",
            subject: note.to_string(),
            message: "layout plays a note with no sample".to_string(),
        })
        .collect()
}

/// Loads the manifest through the full pipeline on the given context and checks
/// its entries and, if given, the layout against it.
pub async fn verify(
    assets: &dyn AssetSource,
    manifest_path: &str,
    layout: Option<&Layout>,
    context: &dyn AudioContext,
) -> VerificationReport {
    let mut report = VerificationReport::default();

    let manifest: BTreeMap<String, String> = match assets.fetch(manifest_path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(manifest) => manifest,
            Err(e) => {
                report.issues.push(manifest_error(manifest_path, e.to_string()));
                return report;
            }
        },
        Err(e) => {
            report.issues.push(manifest_error(manifest_path, e.to_string()));
            return report;
        }
    };
    report.issues.extend(check_encoding(&manifest));

    let mut bank = SampleBank::new(manifest_path);
    if let Err(e) = bank.load(assets, context).await {
        report.issues.push(match e {
            LoadError::Decode { ref note, .. } => Issue {
                severity: Severity::Error,
                category: "decode",
                subject: note.clone(),
                message: e.to_string(),
            },
            e => manifest_error(manifest_path, e.to_string()),
        });
    }

    for (note, _) in bank.entries() {
        if let Some(sample) = bank.get(note) {
            report.samples.push(SampleSummary {
                note: note.to_string(),
                frames: sample.frame_count(),
                duration: sample.duration(),
            });
        }
    }

    if let Some(layout) = layout {
        let notes: BTreeSet<&str> = manifest.keys().map(String::as_str).collect();
        report.issues.extend(check_layout(layout, &notes));
    }
    report
}

fn manifest_error(path: &str, message: String) -> Issue {
    Issue {
        severity: Severity::Error,
        category: "manifest",
        subject: path.to_string(),
        message,
    }
}

/// Prints a verification report grouped by subject.
pub fn print_report(report: &VerificationReport) {
    for sample in &report.samples {
        println!(
            "{:>6} {:>9} frames {:>8.3}s",
            sample.note,
            sample.frames,
            sample.duration.as_secs_f64()
        );
    }

    if report.is_clean() {
        println!(
            "\n\u{2705} All {} sample(s) passed verification.",
            report.samples.len()
        );
        return;
    }

    let mut by_subject: BTreeMap<&str, Vec<&Issue>> = BTreeMap::new();
    for issue in &report.issues {
        by_subject.entry(&issue.subject).or_default().push(issue);
    }

    println!();
    for (subject, issues) in &by_subject {
        let has_errors = issues.iter().any(|i| i.severity == Severity::Error);
        let icon = if has_errors {
            "\u{274c}"
        } else {
            "\u{26a0}\u{fe0f} "
        };
        println!("{} {}", icon, subject);
        for issue in issues {
            println!("   [{}] {}", issue.category, issue.message);
        }
    }

    println!(
        "\nSummary: {} issue(s) found across {} subject(s).",
        report.issues.len(),
        by_subject.len()
    );
}
