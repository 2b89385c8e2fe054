//! Credential rewriting over the replay frame stream
//!
//! Replayed responses teach the engine the newest session cookie, bearer
//! token and problem id per user; requests for that user are rewritten to
//! carry them.

mod engine;
mod lesson;

pub use engine::RewriteEngine;
pub use lesson::problem_form_body;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, info};

use crate::Result;

/// Counters for one run over an input stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Lines read
    pub lines: usize,
    /// Frames written back out
    pub emitted: usize,
}

/// Process frames from `reader` in arrival order, writing rewritten requests
/// to `writer`, until end of input.
///
/// # Errors
///
/// Returns the first I/O or cache backend failure
pub async fn run<R, W>(engine: &RewriteEngine, mut reader: R, mut writer: W) -> Result<RunStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut stats = RunStats::default();
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        stats.lines += 1;

        match engine.process_line(&line).await {
            Ok(Some(out)) => {
                writer.write_all(&out).await?;
                writer.flush().await?;
                stats.emitted += 1;
            }
            Ok(None) => {}
            Err(e) => {
                error!("Aborting at line {}: {}", stats.lines, e);
                return Err(e);
            }
        }
    }

    info!(
        "Input closed: {} lines read, {} frames emitted",
        stats.lines, stats.emitted
    );
    Ok(stats)
}
