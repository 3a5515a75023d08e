// src/progress/source.rs

use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::ChildStdout;
use tokio::sync::mpsc;
use tracing::debug;

use crate::progress::ProgressEvent;

/// Boundary between a child's stdout stream and the supervisor's event
/// channel.
///
/// Implementations are fire-and-forget: `spawn` hands off the stdout pipe to
/// a background Tokio task that emits [`ProgressEvent`]s until the stream
/// closes. Dropping the sender closes the channel, which the supervisor
/// treats as "no more events" (the run continues until process exit).
pub trait ProgressSource: Send + 'static {
    fn spawn(self: Box<Self>, stdout: ChildStdout, events: mpsc::Sender<ProgressEvent>);
}

/// Line-oriented reference source.
///
/// Recognizes the filter markers of the common XML progress dialect when they
/// appear one per line:
///
/// ```text
/// <filter-start>
/// <filter-name>Smoothing</filter-name>
/// <filter-comment>gaussian pass</filter-comment>
/// </filter-start>
/// <filter-progress>0.42</filter-progress>
/// <filter-end>
/// <filter-name>Smoothing</filter-name>
/// </filter-end>
/// ```
///
/// A full streaming XML parser is a separate concern; this subset is enough
/// for programs that emit markers line-by-line, and for the demo binary.
/// Unrecognized lines are logged at debug and ignored.
pub struct LineProgressSource;

impl ProgressSource for LineProgressSource {
    fn spawn(self: Box<Self>, stdout: ChildStdout, events: mpsc::Sender<ProgressEvent>) {
        tokio::spawn(async move {
            let reader = BufReader::new(stdout);
            let mut lines = reader.lines();
            let mut parser = LineParser::new();

            while let Ok(Some(line)) = lines.next_line().await {
                debug!("stdout: {}", line);
                if let Some(event) = parser.feed(&line) {
                    if events.send(event).await.is_err() {
                        // Supervisor is gone; keep draining so the pipe
                        // doesn't fill up.
                        continue;
                    }
                }
            }

            debug!("progress source ended (stdout closed)");
        });
    }
}

/// Which marker block the parser is currently inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    None,
    Start,
    End,
}

struct LineParser {
    block: Block,
    name: String,
    comment: String,
    re_name: Regex,
    re_comment: Regex,
    re_progress: Regex,
}

impl LineParser {
    fn new() -> Self {
        // These patterns are fixed and known-good, so constructing them
        // cannot fail at runtime.
        Self {
            block: Block::None,
            name: String::new(),
            comment: String::new(),
            re_name: Regex::new(r"<filter-name>(.*)</filter-name>").unwrap(),
            re_comment: Regex::new(r"<filter-comment>(.*)</filter-comment>").unwrap(),
            re_progress: Regex::new(r"<filter-progress>\s*(\S+)\s*</filter-progress>").unwrap(),
        }
    }

    fn feed(&mut self, line: &str) -> Option<ProgressEvent> {
        let line = line.trim();

        if let Some(caps) = self.re_progress.captures(line) {
            let raw = &caps[1];
            return match raw.parse::<f32>() {
                Ok(fraction) => Some(ProgressEvent::Progress { fraction }),
                Err(_) => Some(ProgressEvent::Error {
                    message: format!("invalid filter-progress value '{raw}'"),
                }),
            };
        }

        match line {
            "<filter-start>" => {
                self.block = Block::Start;
                self.name.clear();
                self.comment.clear();
                None
            }
            "</filter-start>" => {
                self.block = Block::None;
                Some(ProgressEvent::Started {
                    name: std::mem::take(&mut self.name),
                    comment: std::mem::take(&mut self.comment),
                })
            }
            "<filter-end>" => {
                self.block = Block::End;
                self.name.clear();
                None
            }
            "</filter-end>" => {
                self.block = Block::None;
                Some(ProgressEvent::Finished {
                    name: std::mem::take(&mut self.name),
                })
            }
            _ => {
                if self.block != Block::None {
                    if let Some(caps) = self.re_name.captures(line) {
                        self.name = caps[1].to_string();
                    } else if let Some(caps) = self.re_comment.captures(line) {
                        self.comment = caps[1].to_string();
                    }
                }
                None
            }
        }
    }
}
