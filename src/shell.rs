//! Presentation contract.
//!
//! A shell only ever sees `RenderProps` and reports one intent, toggling
//! the recording. `TerminalShell` streams the transcript to a terminal.

use crate::error::Result;
use crate::session::transcript::Speaker;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender: Speaker,
    pub text: String,
}

/// Everything a shell needs to draw one frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderProps {
    pub messages: Vec<ChatMessage>,
    pub is_recording: bool,
    pub status: String,
    /// The toggle should not be offered right now.
    pub disabled: bool,
}

pub trait Shell {
    fn render(&mut self, props: &RenderProps) -> Result<()>;
}

/// Shell that keeps every frame it was asked to render, for tests.
#[derive(Debug, Clone, Default)]
pub struct CollectingShell {
    frames: Arc<Mutex<Vec<RenderProps>>>,
}

impl CollectingShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<RenderProps> {
        self.frames.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<RenderProps> {
        self.frames().pop()
    }
}

impl Shell for CollectingShell {
    fn render(&mut self, props: &RenderProps) -> Result<()> {
        if let Ok(mut frames) = self.frames.lock() {
            frames.push(props.clone());
        }
        Ok(())
    }
}

#[cfg(feature = "cli")]
pub use terminal::TerminalShell;

#[cfg(feature = "cli")]
mod terminal {
    use super::{RenderProps, Shell};
    use crate::error::Result;
    use crate::session::transcript::Speaker;
    use owo_colors::OwoColorize;
    use std::io::Write;

    /// Append-only terminal renderer.
    ///
    /// New messages start a labelled line; growth of the newest message is
    /// streamed as it arrives. Status changes are printed as dim lines.
    pub struct TerminalShell<W: Write> {
        out: W,
        color: bool,
        shown_messages: usize,
        shown_bytes: usize,
        mid_line: bool,
        last_status: Option<(String, bool)>,
    }

    impl TerminalShell<std::io::Stdout> {
        pub fn stdout(color: bool) -> Self {
            Self::new(std::io::stdout(), color)
        }
    }

    impl<W: Write> TerminalShell<W> {
        pub fn new(out: W, color: bool) -> Self {
            Self {
                out,
                color,
                shown_messages: 0,
                shown_bytes: 0,
                mid_line: false,
                last_status: None,
            }
        }

        pub fn into_inner(self) -> W {
            self.out
        }

        fn label(&self, sender: Speaker) -> String {
            let label = match sender {
                Speaker::User => "you",
                Speaker::Assistant => "gemini",
            };
            match (self.color, sender) {
                (false, _) => format!("{}: ", label),
                (true, Speaker::User) => format!("{} ", format!("{}:", label).cyan().bold()),
                (true, Speaker::Assistant) => {
                    format!("{} ", format!("{}:", label).green().bold())
                }
            }
        }

        fn end_line(&mut self) -> std::io::Result<()> {
            if self.mid_line {
                writeln!(self.out)?;
                self.mid_line = false;
            }
            Ok(())
        }

        fn render_messages(&mut self, props: &RenderProps) -> std::io::Result<()> {
            let start = self.shown_messages.saturating_sub(1);
            for (index, message) in props.messages.iter().enumerate().skip(start) {
                if index + 1 == self.shown_messages {
                    let Some(suffix) = message.text.get(self.shown_bytes..) else {
                        continue;
                    };
                    if suffix.is_empty() {
                        continue;
                    }
                    if !self.mid_line {
                        write!(self.out, "  ")?;
                    }
                    write!(self.out, "{}", suffix)?;
                    self.shown_bytes = message.text.len();
                    self.mid_line = true;
                } else {
                    self.end_line()?;
                    let label = self.label(message.sender);
                    write!(self.out, "{}{}", label, message.text)?;
                    self.shown_messages = index + 1;
                    self.shown_bytes = message.text.len();
                    self.mid_line = true;
                }
            }
            Ok(())
        }

        fn render_status(&mut self, props: &RenderProps) -> std::io::Result<()> {
            let current = (props.status.clone(), props.is_recording);
            if self.last_status.as_ref() == Some(&current) {
                return Ok(());
            }
            self.end_line()?;
            let marker = if props.is_recording { "●" } else { "○" };
            if self.color {
                if props.is_recording {
                    writeln!(self.out, "{} {}", marker.red(), props.status.dimmed())?;
                } else {
                    writeln!(self.out, "{} {}", marker.dimmed(), props.status.dimmed())?;
                }
            } else {
                writeln!(self.out, "{} {}", marker, props.status)?;
            }
            self.last_status = Some(current);
            Ok(())
        }
    }

    impl<W: Write> Shell for TerminalShell<W> {
        fn render(&mut self, props: &RenderProps) -> Result<()> {
            self.render_messages(props)?;
            self.render_status(props)?;
            self.out.flush()?;
            Ok(())
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_shell_keeps_frames_in_order() {
        let mut shell = CollectingShell::new();
        let observer = shell.clone();
        shell.render(&RenderProps::default()).unwrap();
        shell
            .render(&RenderProps {
                status: "Listening".to_string(),
                ..RenderProps::default()
            })
            .unwrap();

        let frames = observer.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(observer.last().unwrap().status, "Listening");
    }
}
