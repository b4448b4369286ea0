use std::io::{self, Write};

use streamchat_core::model::{Message, MessageStatus, Role};
use streamchat_core::Transcript;

/// Prints transcript growth as it happens: each new entry gets a label, then its content is
/// written incrementally until the entry leaves `Running` or a newer entry appears.
#[derive(Debug, Default)]
pub struct LiveRenderer {
    idx: usize,
    /// Bytes of the current entry already written; `None` until its label is out.
    printed: Option<usize>,
}

impl LiveRenderer {
    /// Start rendering at entry `idx`, skipping everything before it.
    pub fn starting_at(idx: usize) -> Self {
        Self { idx, printed: None }
    }

    pub fn render<W: Write>(&mut self, t: &Transcript, out: &mut W) -> io::Result<()> {
        while let Some(m) = t.messages.get(self.idx) {
            if m.role == Role::User {
                self.advance();
                continue;
            }
            let done = match self.printed {
                Some(n) => n,
                None => {
                    write!(out, "{}", label(m))?;
                    0
                }
            };
            out.write_all(m.content[done..].as_bytes())?;
            self.printed = Some(m.content.len());

            let is_last = self.idx + 1 == t.messages.len();
            if m.is_running() && is_last {
                break;
            }
            if m.status == MessageStatus::Error {
                write!(out, " [error]")?;
            }
            writeln!(out)?;
            self.advance();
        }
        out.flush()
    }

    fn advance(&mut self) {
        self.idx += 1;
        self.printed = None;
    }
}

fn label(m: &Message) -> String {
    match m.role {
        Role::Tool => format!("[{}] ", m.tool_name.as_deref().unwrap_or("tool")),
        Role::Assistant => "assistant: ".to_string(),
        Role::User => "you: ".to_string(),
    }
}

/// Whole-transcript dump, one entry per line.
pub fn print_transcript<W: Write>(t: &Transcript, out: &mut W) -> io::Result<()> {
    for m in &t.messages {
        let status = match m.status {
            MessageStatus::Complete => "",
            MessageStatus::Running => " [running]",
            MessageStatus::Error => " [error]",
        };
        writeln!(out, "{}{}{}", label(m), m.content, status)?;
    }
    Ok(())
}
