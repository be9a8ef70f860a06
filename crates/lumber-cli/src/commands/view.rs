//! View command implementation.
//!
//! Prints one page of a log file through a [`QueryActor`], then optionally
//! follows the file until stopped.

use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use lumber_logs::{LogError, LogStore, Page, PrettyFormatter, QueryActor, QueryHandle};
use tracing::{debug, info, warn};

use crate::cli::ViewArgs;
use crate::error::CliError;

/// Most lines printed per poll while following.
pub const FOLLOW_PAGE_LINES: usize = 1000;

/// Handler for the view command.
pub struct ViewCommand<'a> {
    args: &'a ViewArgs,
}

impl<'a> ViewCommand<'a> {
    /// Creates a new view command handler.
    #[must_use]
    pub const fn new(args: &'a ViewArgs) -> Self {
        Self { args }
    }

    /// Executes the view command.
    ///
    /// With `--follow`, keeps printing new lines until `stop` resolves.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or, without `--follow`,
    /// if the requested page is empty or out of range.
    pub async fn execute<W, F>(&self, out: &mut W, stop: F) -> Result<(), CliError>
    where
        W: Write,
        F: Future<Output = ()>,
    {
        let formatter = PrettyFormatter::new().with_color(!self.args.no_color);
        let (handle, task) = QueryActor::spawn(LogStore::new(Arc::new(formatter)));

        let result = self.show(&handle, out, stop).await;

        handle.shutdown();
        if let Err(e) = task.await {
            warn!(error = %e, "query actor task failed");
        }
        result
    }

    async fn show<W, F>(&self, handle: &QueryHandle, out: &mut W, stop: F) -> Result<(), CliError>
    where
        W: Write,
        F: Future<Output = ()>,
    {
        let args = self.args;
        handle.open(&args.path).await?;

        let offset = to_i64(args.offset, "offset")?;
        let lines = to_i64(args.lines, "lines")?;
        match handle.get(offset, lines, args.level).await {
            Ok(page) => write_page(out, &page)?,
            Err(e @ (LogError::NoRecords(_) | LogError::RangeExhausted)) if args.follow => {
                info!(error = %e, "nothing to show yet, following");
            }
            Err(e) => return Err(e.into()),
        }

        if !args.follow {
            return Ok(());
        }

        let interval = Duration::from_millis(args.interval_ms.max(1));
        let mut pages = handle.follow(args.level, FOLLOW_PAGE_LINES, interval);
        tokio::pin!(stop);

        loop {
            tokio::select! {
                page = pages.recv() => match page {
                    Some(Ok(page)) => write_page(out, &page)?,
                    Some(Err(LogError::ActorStopped)) | None => break,
                    Some(Err(e)) => warn!(error = %e, "follow poll failed"),
                },
                () = &mut stop => {
                    debug!("follow stopped");
                    break;
                }
            }
        }

        Ok(())
    }
}

fn to_i64(value: usize, name: &str) -> Result<i64, CliError> {
    i64::try_from(value).map_err(|_| CliError::InvalidArgument(format!("{name} too large")))
}

fn write_page<W: Write>(out: &mut W, page: &Page) -> Result<(), CliError> {
    if !page.body.is_empty() {
        out.write_all(&page.body)?;
        writeln!(out)?;
        out.flush()?;
    }
    Ok(())
}
