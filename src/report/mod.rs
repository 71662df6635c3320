//! Report aggregation
//!
//! A [`ReportAggregator`] is fed decoded console records for the whole run and
//! finished once into an immutable [`Report`].

mod ignore;
mod render;
pub mod webhook;

use serde::Serialize;
use tracing::{debug, error};

use crate::bridge::{BadPatch, BadStart, ConsoleLine, ConsoleRecord, VerificationRecord};
use crate::config::Channel;

pub use ignore::{is_host_error, IgnoreList};
pub use render::{code_block, render_text};
pub use webhook::WebhookPayload;

/// Everything a run found
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    pub channel: Channel,
    pub bad_patches: Vec<BadPatch>,
    pub bad_webpack_finds: Vec<String>,
    pub bad_starts: Vec<BadStart>,
    pub other_errors: Vec<String>,
    pub ignored_errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
}

impl Report {
    pub fn has_failures(&self) -> bool {
        !self.bad_patches.is_empty()
            || !self.bad_webpack_finds.is_empty()
            || !self.bad_starts.is_empty()
            || !self.other_errors.is_empty()
    }

    /// 1 on any failure or fatal error, 0 otherwise
    pub fn exit_code(&self) -> u8 {
        if self.has_failures() || self.fatal.is_some() {
            1
        } else {
            0
        }
    }

    /// Total number of failure entries
    pub fn failure_count(&self) -> usize {
        self.bad_patches.len()
            + self.bad_webpack_finds.len()
            + self.bad_starts.len()
            + self.other_errors.len()
    }
}

/// Collects records into a [`Report`]
#[derive(Debug)]
pub struct ReportAggregator {
    report: Report,
    ignore: IgnoreList,
    done: bool,
}

impl ReportAggregator {
    pub fn new(channel: Channel, ignore: IgnoreList) -> Self {
        Self {
            report: Report {
                channel,
                ..Default::default()
            },
            ignore,
            done: false,
        }
    }

    /// Decode and ingest one raw line. Returns `true` once the run is done.
    pub fn consume(&mut self, line: &ConsoleLine) -> bool {
        self.ingest(ConsoleRecord::decode(line));
        self.done
    }

    pub fn ingest(&mut self, record: ConsoleRecord) {
        match record {
            ConsoleRecord::Verification(record) => self.add(record),
            ConsoleRecord::Fatal(err) => self.record_fatal(err),
            ConsoleRecord::Debug(message) => debug!("[page] {}", message),
            ConsoleRecord::Done => self.done = true,
            ConsoleRecord::Noise => {}
        }
    }

    pub fn add(&mut self, record: VerificationRecord) {
        match record {
            VerificationRecord::BadPatch(patch) => self.report.bad_patches.push(patch),
            VerificationRecord::BadWebpackFind { description } => {
                self.report.bad_webpack_finds.push(description)
            }
            VerificationRecord::BadStart(start) => self.report.bad_starts.push(start),
            VerificationRecord::OtherError { text } => {
                if !is_host_error(&text) {
                    return;
                }
                if self.ignore.is_ignored(&text) {
                    self.report.ignored_errors.push(text);
                } else {
                    self.report.other_errors.push(text);
                }
            }
        }
    }

    /// The first fatal error wins; later ones are only logged
    pub fn record_fatal(&mut self, err: impl Into<String>) {
        let err = err.into();
        error!("Fatal error: {}", err);
        if self.report.fatal.is_none() {
            self.report.fatal = Some(err);
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn finish(self) -> Report {
        self.report
    }
}
