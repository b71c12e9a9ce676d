use crate::core::message::{Message, Role};
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Plain-text transcript of a console session, appended message by message.
///
/// Each entry is written as its lines followed by one blank line. User input
/// is prefixed with `You: `, tool results and tool requests with `## `, and
/// system messages are not recorded.
#[derive(Debug, Clone)]
pub struct TranscriptLog {
    path: PathBuf,
}

impl TranscriptLog {
    /// Opens (creating if needed) the transcript at `path`, failing early
    /// when it cannot be written.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.flush()?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, message: &Message) -> io::Result<()> {
        match message.role {
            Role::System => Ok(()),
            Role::User => self.write_entry(&format!("You: {}", message.content)),
            Role::Assistant => {
                if !message.content.is_empty() {
                    self.write_entry(&message.content)?;
                }
                for call in &message.tool_calls {
                    self.write_entry(&format!("## tool call {}({})", call.name, call.arguments))?;
                }
                Ok(())
            }
            Role::Tool => self.write_entry(&format!("## tool result: {}", message.content)),
        }
    }

    fn write_entry(&self, content: &str) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::with_capacity(64 * 1024, file);

        for line in content.lines() {
            writeln!(writer, "{line}")?;
        }
        writeln!(writer)?;

        writer.flush()
    }
}
