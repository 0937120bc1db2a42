use std::time::Duration;

use color_eyre::eyre::Result;
use futures::stream::StreamExt;
use ratatui::{Terminal, prelude::Backend};
use tokio::{sync::mpsc, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    application::Application,
    command::{Action, Command},
    subscription::SubscriptionManager,
};

/// Drives an [`Application`]: renders it, feeds it messages and keeps its
/// subscriptions in sync with its state.
pub struct Runtime<A: Application> {
    app: A,
    init: Option<Command<A::Message>>,
    tx: mpsc::UnboundedSender<A::Message>,
    rx: mpsc::UnboundedReceiver<A::Message>,
    subscription_manager: SubscriptionManager<A::Message>,
    quit: CancellationToken,
}

impl<A: Application> Runtime<A> {
    pub fn new(flags: A::Flags) -> Self {
        let (app, init) = A::new(flags);
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription_manager = SubscriptionManager::new(tx.clone());

        Self {
            app,
            init: Some(init),
            tx,
            rx,
            subscription_manager,
            quit: CancellationToken::new(),
        }
    }

    #[must_use]
    pub const fn app(&self) -> &A {
        &self.app
    }

    /// A token that stops the event loop when cancelled.
    #[must_use]
    pub fn quit_token(&self) -> CancellationToken {
        self.quit.clone()
    }

    /// Spawns `cmd` and forwards every action it yields.
    fn execute(&self, cmd: Command<A::Message>) {
        let Some(mut stream) = cmd.stream else {
            return;
        };
        let tx = self.tx.clone();
        let quit = self.quit.clone();

        tokio::spawn(async move {
            loop {
                let action = tokio::select! {
                    biased;
                    () = quit.cancelled() => break,
                    action = stream.next() => action,
                };
                match action {
                    Some(Action::Message(msg)) => {
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Some(Action::Quit) => {
                        debug!("quit requested");
                        quit.cancel();
                        break;
                    }
                    None => break,
                }
            }
        });
    }

    fn dispatch(&mut self, msg: A::Message) {
        let cmd = self.app.update(msg);
        self.execute(cmd);
        self.subscription_manager.update(self.app.subscriptions());
    }

    /// Handles every message that is already queued.
    fn process_messages(&mut self) {
        while let Ok(msg) = self.rx.try_recv() {
            self.dispatch(msg);
        }
    }

    /// Runs the event loop until the application quits.
    ///
    /// The view is redrawn after every batch of messages and at least once per
    /// frame. Quitting never waits for the next frame.
    ///
    /// # Errors
    ///
    /// Returns an error if drawing to the terminal fails.
    pub async fn run<B: Backend>(mut self, terminal: &mut Terminal<B>, frame_rate: u32) -> Result<()> {
        let frame_duration = Duration::from_secs(1) / frame_rate.max(1);
        info!(frame_rate, "runtime started");

        if let Some(init) = self.init.take() {
            self.execute(init);
        }
        self.subscription_manager.update(self.app.subscriptions());

        let result = loop {
            if let Err(err) = terminal.draw(|frame| self.app.view(frame)) {
                break Err(err.into());
            }

            tokio::select! {
                biased;
                () = self.quit.cancelled() => break Ok(()),
                Some(msg) = self.rx.recv() => {
                    self.dispatch(msg);
                    self.process_messages();
                }
                () = sleep(frame_duration) => {}
            }
        };

        self.quit.cancel();
        self.subscription_manager.shutdown().await;
        info!("runtime stopped");
        result
    }
}
