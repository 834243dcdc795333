//! Chat application composition root.
//!
//! One event loop owns the `Controller` and consumes a single queue fed by
//! the keyboard, the remote connection task and the output clock.
//! Every event is followed by a re-render.

use crate::audio::clock::{EndedNotifier, SourceId};
use crate::error::Result;
use crate::session::controller::Controller;
use crate::session::events::{RemoteEvent, RemoteEventSink, SessionId};
use crate::shell::Shell;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The user pressed the record button.
    Toggle,
    Remote {
        session: SessionId,
        event: RemoteEvent,
    },
    PlaybackEnded(SourceId),
    Quit,
}

pub type AppSender = mpsc::UnboundedSender<AppEvent>;

/// Route remote events into the app queue.
pub fn remote_sink(tx: AppSender) -> RemoteEventSink {
    Arc::new(move |session, event| {
        // The loop has exited; nothing left to update.
        let _ = tx.send(AppEvent::Remote { session, event });
    })
}

/// Route playback-ended notices into the app queue.
pub fn ended_notifier(tx: AppSender) -> EndedNotifier {
    Arc::new(move |source| {
        let _ = tx.send(AppEvent::PlaybackEnded(source));
    })
}

pub struct App<S: Shell> {
    controller: Controller,
    shell: S,
    events: mpsc::UnboundedReceiver<AppEvent>,
}

impl<S: Shell> App<S> {
    pub fn new(
        controller: Controller,
        shell: S,
        events: mpsc::UnboundedReceiver<AppEvent>,
    ) -> Self {
        Self {
            controller,
            shell,
            events,
        }
    }

    /// Apply one event. Returns `false` when the app should exit.
    pub fn handle(&mut self, event: AppEvent) -> bool {
        match event {
            AppEvent::Toggle => {
                if self.controller.render_props().disabled {
                    tracing::debug!("toggle ignored while closing");
                } else {
                    // Show Connecting before the devices are opened
                    let shell = &mut self.shell;
                    self.controller.toggle_with(|props| {
                        if let Err(e) = shell.render(props) {
                            tracing::warn!(error = %e, "render failed");
                        }
                    });
                }
            }
            AppEvent::Remote { session, event } => self.controller.handle_remote(session, event),
            AppEvent::PlaybackEnded(source) => self.controller.playback_ended(source),
            AppEvent::Quit => return false,
        }
        true
    }

    fn render(&mut self) {
        if let Err(e) = self.shell.render(&self.controller.render_props()) {
            tracing::warn!(error = %e, "render failed");
        }
    }

    /// Run until `Quit` or until every sender is gone, then stop any session.
    pub async fn run(mut self) -> Result<Controller> {
        self.render();
        while let Some(event) = self.events.recv().await {
            if !self.handle(event) {
                break;
            }
            self.render();
        }
        self.controller.stop();
        self.render();
        Ok(self.controller)
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }
}

/// Map one line of keyboard input to an intent.
pub fn parse_key_line(line: &str) -> AppEvent {
    match line.trim() {
        "q" | "quit" | "exit" => AppEvent::Quit,
        _ => AppEvent::Toggle,
    }
}

#[cfg(all(feature = "cpal-audio", feature = "cli"))]
pub use live::run_chat;

#[cfg(all(feature = "cpal-audio", feature = "cli"))]
mod live {
    use super::*;
    use crate::audio::capture::{CpalMicrophone, suppress_audio_warnings};
    use crate::audio::output::CpalClockFactory;
    use crate::config::Config;
    use crate::credential::{EnvOverride, FileCredentialStore};
    use crate::remote::client::LiveConnector;
    use crate::shell::TerminalShell;
    use tokio::io::{AsyncBufReadExt, BufReader};

    fn spawn_keyboard(tx: AppSender) {
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(parse_key_line(&line)).is_err() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to read stdin");
                        break;
                    }
                }
            }
            let _ = tx.send(AppEvent::Quit);
        });
    }

    fn spawn_ctrl_c(tx: AppSender) {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(AppEvent::Quit);
            }
        });
    }

    /// Run an interactive chat on the default (or configured) devices.
    pub async fn run_chat(config: Config, color: bool) -> Result<()> {
        suppress_audio_warnings();

        let (tx, rx) = mpsc::unbounded_channel();
        let credentials = EnvOverride::new(FileCredentialStore::new(
            FileCredentialStore::default_path()?,
        ));
        let controller = Controller::new(
            Box::new(CpalMicrophone::new(config.audio.input_device.as_deref())),
            Box::new(LiveConnector::new(remote_sink(tx.clone()))),
            Box::new(CpalClockFactory::new(
                config.audio.output_device.as_deref(),
                ended_notifier(tx.clone()),
            )),
            Box::new(credentials),
            config.session_settings(),
        );

        spawn_keyboard(tx.clone());
        spawn_ctrl_c(tx);

        App::new(controller, TerminalShell::stdout(color), rx)
            .run()
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_lines_map_to_intents() {
        assert_eq!(parse_key_line(""), AppEvent::Toggle);
        assert_eq!(parse_key_line("  "), AppEvent::Toggle);
        assert_eq!(parse_key_line("q"), AppEvent::Quit);
        assert_eq!(parse_key_line("quit\n"), AppEvent::Quit);
    }

    #[tokio::test]
    async fn test_sinks_forward_into_queue() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let remote = remote_sink(tx.clone());
        let ended = ended_notifier(tx);

        remote(SessionId(2), RemoteEvent::TurnComplete);
        ended(SourceId(9));

        assert_eq!(
            rx.recv().await,
            Some(AppEvent::Remote {
                session: SessionId(2),
                event: RemoteEvent::TurnComplete
            })
        );
        assert_eq!(rx.recv().await, Some(AppEvent::PlaybackEnded(SourceId(9))));
    }
}
