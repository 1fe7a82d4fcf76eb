//! Application UI: progress bars, status lines and interactive questions.
//!
//! This is adapted from `substudy` by Eric Kidd, which is licensed under
//! Apache-2.0 OR MIT. Used with permission.

use std::{borrow::Cow, io, sync::Arc, time::Duration};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncWrite, AsyncWriteExt as _, Lines};

use crate::prelude::*;

/// Application UI state.
#[derive(Clone)]
pub struct Ui {
    /// Our progress bars.
    multi_progress: Arc<MultiProgress>,
}

impl Ui {
    /// Create a new UI.
    pub fn init() -> Ui {
        let multi_progress = Arc::new(MultiProgress::new());
        Ui { multi_progress }
    }

    /// Create a new UI for unit tests.
    #[cfg(test)]
    pub fn init_for_tests() -> Ui {
        let multi_progress =
            Arc::new(MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden()));
        Ui { multi_progress }
    }

    /// Get a writer than can be used to write to stderr, for use with `tracing`
    /// and other output code.
    pub fn get_stderr_writer(&self) -> SafeStderrWriter {
        SafeStderrWriter { ui: self.clone() }
    }

    /// Get a reference to our progress bars.
    pub fn multi_progress(&self) -> &MultiProgress {
        &self.multi_progress
    }

    /// Print a one-line status message without disturbing progress bars.
    pub fn display_message(&self, emoji: &str, msg: &str) {
        self.multi_progress.suspend(|| eprintln!("{emoji} {msg}"));
    }

    /// Create a new progress bar with default settings.
    pub fn new_progress_bar(&self, config: &ProgressConfig<'_>, len: u64) -> ProgressBar {
        let pb = ProgressBar::new(len).with_style(default_progress_style());
        let pb = self.multi_progress.add(pb);
        #[cfg(test)]
        pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
        pb.set_prefix(config.emoji.to_owned());
        pb.set_message(config.msg.to_owned());
        pb.enable_steady_tick(Duration::from_millis(250));
        pb.with_finish(indicatif::ProgressFinish::WithMessage(Cow::Owned(
            config.done_msg.to_owned(),
        )))
    }
}

/// Configuration for a progress bar.
pub struct ProgressConfig<'a> {
    /// Emoji to display in the progress bar.
    pub emoji: &'a str,
    /// Message to display in a running progress bar.
    pub msg: &'a str,
    /// Message to display in a progress bar when it is done.
    pub done_msg: &'a str,
}

fn default_progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  {prefix:3}{msg:25} {pos:>4}/{len:4} {elapsed_precise} {wide_bar:.cyan/blue} {eta_precise}")
        .expect("bad progress bar template")
}

/// Asks questions on one stream and reads one-line answers from another.
///
/// This is generic so that tests can script the answers.
pub struct Questioner<R, W> {
    answers: Lines<R>,
    out: W,
}

impl<R, W> Questioner<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Create a questioner reading answers from `input`.
    pub fn new(input: R, out: W) -> Self {
        Self {
            answers: input.lines(),
            out,
        }
    }

    /// Print a line of text.
    pub async fn say(&mut self, text: &str) -> Result<()> {
        self.out.write_all(text.as_bytes()).await?;
        self.out.write_all(b"\n").await?;
        self.out.flush().await?;
        Ok(())
    }

    /// Ask `question` and return the trimmed answer.
    ///
    /// An empty answer falls back to `default`. An empty answer with no
    /// default is an error.
    pub async fn ask(&mut self, question: &str, default: Option<&str>) -> Result<String> {
        self.ask_showing(question, default, default).await
    }

    /// Like [`Questioner::ask`], but the default is a secret. The prompt
    /// shows `[from <source>]` instead of the value.
    pub async fn ask_secret(
        &mut self,
        question: &str,
        default: Option<&str>,
        source: &str,
    ) -> Result<String> {
        let label = default.map(|_| format!("from {source}"));
        self.ask_showing(question, label.as_deref(), default).await
    }

    /// Ask `question`, printing `label` where the default goes.
    async fn ask_showing(
        &mut self,
        question: &str,
        label: Option<&str>,
        default: Option<&str>,
    ) -> Result<String> {
        let prompt = match label {
            Some(label) => format!("{question} [{label}]: "),
            None => format!("{question}: "),
        };
        self.out.write_all(prompt.as_bytes()).await?;
        self.out.flush().await?;

        let answer = self
            .answers
            .next_line()
            .await
            .context("failed to read answer")?
            .ok_or_else(|| anyhow!("no answer given to {question:?}"))?;
        let answer = answer.trim();
        match (answer.is_empty(), default) {
            (false, _) => Ok(answer.to_owned()),
            (true, Some(default)) => Ok(default.to_owned()),
            (true, None) => Err(anyhow!("a value is required for {question:?}")),
        }
    }

    /// Give back the output stream.
    #[cfg(test)]
    pub fn into_output(self) -> W {
        self.out
    }
}

/// A writer which can used to write to `stderr`. It will hide and show progress
/// bars as needed, so that they don't interfere with the output.
#[derive(Clone)]
pub struct SafeStderrWriter {
    ui: Ui,
}

// The `tracing-indicatif` crate suggests that we should implement the following
// methods.
impl io::Write for SafeStderrWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ui.multi_progress().suspend(|| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.ui.multi_progress().suspend(|| io::stderr().flush())
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.ui
            .multi_progress()
            .suspend(|| io::stderr().write_all(buf))
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SafeStderrWriter {
    type Writer = SafeStderrWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
