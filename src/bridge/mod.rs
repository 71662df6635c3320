//! Console bridge
//!
//! Everything the page (and the in-process replayer) has to say reaches the
//! controlling process as a [`ConsoleLine`]: a log level plus the JSON values
//! of the console call's arguments. The first argument is a tag from a small
//! fixed vocabulary; [`ConsoleRecord::decode`] turns tagged lines into a closed
//! set of typed records at this boundary so nothing downstream matches on
//! strings.

mod record;
mod transcript;

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

pub use record::{BadPatch, BadStart, VerificationRecord, ANONYMOUS_IDENT, IDENT_PLACEHOLDER};
pub use transcript::{read_transcript, Transcript};

static PATCH_FAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Patch by (.+?) \(?(had no effect|errored|found no module)\)? \(Module id is (.+?)\): ((?s).+)")
        .expect("patch failure pattern is valid")
});

static START_FAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Failed to start (.+)").expect("start failure pattern is valid"));

/// Console API level of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Debug,
    Info,
    Warning,
    Error,
    Other,
}

/// One console call, as relayed from the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleLine {
    pub level: ConsoleLevel,
    pub args: Vec<Value>,
}

impl ConsoleLine {
    pub fn new(level: ConsoleLevel, args: Vec<Value>) -> Self {
        Self { level, args }
    }

    /// The arguments rendered the way the console would print them
    pub fn text(&self) -> String {
        join_text(&self.args)
    }

    fn arg_str(&self, index: usize) -> Option<&str> {
        self.args.get(index).and_then(Value::as_str)
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn join_text(values: &[Value]) -> String {
    values.iter().map(value_text).collect::<Vec<_>>().join(" ")
}

/// Leading tag of a console line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// Output of the client mod's own loggers
    Mod,
    /// Reporter debug chatter
    Debug,
    /// A module search that no longer resolves
    WebpackFindFail,
    /// End of the test run
    Done,
}

impl Tag {
    pub const ALL: [Tag; 4] = [Tag::Mod, Tag::Debug, Tag::WebpackFindFail, Tag::Done];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::Mod => "[Vencord]",
            Tag::Debug => "[PUP_DEBUG]",
            Tag::WebpackFindFail => "[PUP_WEBPACK_FIND_FAIL]",
            Tag::Done => "[PUPPETEER_TEST_DONE_SIGNAL]",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secondary tags of `[Vencord]` lines
const WEBPACK_INTERCEPTOR: &str = "WebpackInterceptor:";
const PLUGIN_MANAGER: &str = "PluginManager:";
const REPORTER: &str = "Reporter:";

const FATAL_MESSAGE: &str = "A fatal error occurred:";
const FIND_FAIL_MESSAGE: &str = "Webpack Find Fail:";

/// A decoded console line
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleRecord {
    /// A reportable finding
    Verification(VerificationRecord),
    /// Debug chatter, logged but not reported
    Debug(String),
    /// The page-side runtime (or the driver) hit a fatal error
    Fatal(String),
    /// End-of-test signal
    Done,
    /// Nothing actionable
    Noise,
}

impl ConsoleRecord {
    /// Decode one line by its leading tag
    pub fn decode(line: &ConsoleLine) -> Self {
        let tag = line.arg_str(0).and_then(Tag::parse);

        match tag {
            Some(Tag::Done) => ConsoleRecord::Done,
            Some(Tag::Debug) => ConsoleRecord::Debug(join_text(&line.args[1..])),
            Some(Tag::WebpackFindFail) => {
                ConsoleRecord::Verification(VerificationRecord::BadWebpackFind {
                    description: join_text(&line.args[1..]),
                })
            }
            Some(Tag::Mod) => Self::decode_mod(line),
            None if line.level == ConsoleLevel::Error => {
                ConsoleRecord::Verification(VerificationRecord::OtherError { text: line.text() })
            }
            None => ConsoleRecord::Noise,
        }
    }

    /// `["[Vencord]", "<Secondary:>", message, cause?]`
    fn decode_mod(line: &ConsoleLine) -> Self {
        let message = line.arg_str(2).unwrap_or_default();
        let cause = line.args.get(3).map(value_text);

        match line.arg_str(1) {
            Some(WEBPACK_INTERCEPTOR) => match PATCH_FAIL_REGEX.captures(message) {
                Some(cap) => ConsoleRecord::Verification(VerificationRecord::BadPatch(
                    BadPatch::new(&cap[1], &cap[2], &cap[3], &cap[4], cause),
                )),
                None => ConsoleRecord::Noise,
            },
            Some(PLUGIN_MANAGER) => match START_FAIL_REGEX.captures(message) {
                Some(cap) => ConsoleRecord::Verification(VerificationRecord::BadStart(BadStart {
                    plugin: cap[1].to_string(),
                    error: cause.unwrap_or_else(|| "Unknown error".to_string()),
                })),
                None => ConsoleRecord::Noise,
            },
            Some(REPORTER) => match message {
                FATAL_MESSAGE => ConsoleRecord::Fatal(cause.unwrap_or_else(|| "unknown".to_string())),
                FIND_FAIL_MESSAGE => {
                    ConsoleRecord::Verification(VerificationRecord::BadWebpackFind {
                        description: cause.unwrap_or_default(),
                    })
                }
                _ => ConsoleRecord::Debug(join_text(&line.args[1..])),
            },
            _ => ConsoleRecord::Noise,
        }
    }
}

/// Receiving half of the bridge
pub type BridgeReceiver = mpsc::UnboundedReceiver<ConsoleLine>;

/// Sending half of the bridge, shared by the page pump and in-process emitters
#[derive(Debug, Clone)]
pub struct BridgeSender {
    tx: mpsc::UnboundedSender<ConsoleLine>,
}

/// Create a bridge channel
pub fn channel() -> (BridgeSender, BridgeReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (BridgeSender { tx }, rx)
}

impl BridgeSender {
    /// Relay a raw line. Lines sent after the receiver is gone are dropped.
    pub fn send(&self, line: ConsoleLine) {
        let _ = self.tx.send(line);
    }

    pub fn webpack_find_fail(&self, description: impl Into<String>) {
        self.send(ConsoleLine::new(
            ConsoleLevel::Log,
            vec![Tag::WebpackFindFail.as_str().into(), Value::String(description.into())],
        ));
    }

    /// A patch failure in the same shape the patch system logs them
    pub fn bad_patch(&self, plugin: &str, kind: &str, id: &str, match_text: &str) {
        self.send(ConsoleLine::new(
            ConsoleLevel::Warning,
            vec![
                Tag::Mod.as_str().into(),
                WEBPACK_INTERCEPTOR.into(),
                format!("Patch by {plugin} {kind} (Module id is {id}): {match_text}").into(),
            ],
        ));
    }

    pub fn fatal(&self, error: impl fmt::Display) {
        self.send(ConsoleLine::new(
            ConsoleLevel::Error,
            vec![
                Tag::Mod.as_str().into(),
                REPORTER.into(),
                FATAL_MESSAGE.into(),
                error.to_string().into(),
            ],
        ));
    }

    pub fn done(&self) {
        self.send(ConsoleLine::new(ConsoleLevel::Log, vec![Tag::Done.as_str().into()]));
    }
}
