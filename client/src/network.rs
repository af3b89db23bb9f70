//! Client network layer: one TCP connection to the server, driven together
//! with terminal input and the engine's fall timer.

use crate::controller::ClientController;
use crate::display::{Display, TerminalDisplay};
use crate::engine::{EngineOptions, TetrisEngine};
use crate::input::InputManager;
use log::{debug, info};
use shared::crypt::{encode_registration, key_bytes};
use shared::transport::{read_line, write_line};
use std::io::Stdout;
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What the reader task reports from the server socket.
#[derive(Debug)]
enum ServerEvent {
    Line(String),
    Closed,
    Failed(std::io::Error),
}

/// How to reach the server and how to play.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub nick: String,
    pub server: String,
    pub port: u16,
    pub engine: EngineOptions,
    /// Send the registration line in clear text.
    pub plain: bool,
    /// Print the own field after every change.
    pub draw_fields: bool,
}

pub struct Client<D: Display> {
    reader: JoinHandle<()>,
    server_rx: mpsc::UnboundedReceiver<ServerEvent>,
    writer: OwnedWriteHalf,
    controller: ClientController<D>,
    input_manager: InputManager,
}

impl Client<TerminalDisplay<Stdout>> {
    pub async fn connect(options: &ClientOptions) -> Result<Self, Box<dyn std::error::Error>> {
        let display = TerminalDisplay::new(std::io::stdout(), options.draw_fields);
        Self::with_display(options, display).await
    }
}

impl<D: Display> Client<D> {
    /// Connects and sends the registration line.
    pub async fn with_display(
        options: &ClientOptions,
        display: D,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Connecting to {}:{}...", options.server, options.port);
        let stream = TcpStream::connect((options.server.as_str(), options.port)).await?;
        let server_ip = stream.peer_addr()?.ip();
        let (read_half, mut writer) = stream.into_split();

        let engine = TetrisEngine::new(options.engine);
        let controller = ClientController::new(&options.nick, engine, display);

        let registration = controller.registration().to_string();
        let hello = if options.plain {
            registration
        } else {
            encode_registration(&registration, key_bytes(server_ip))
        };
        write_line(&mut writer, &hello).await?;
        info!("Registered as {}", options.nick);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let reader = spawn_reader(read_half, server_tx);

        Ok(Client {
            reader,
            server_rx,
            writer,
            controller,
            input_manager: InputManager::new(),
        })
    }

    pub fn controller(&self) -> &ClientController<D> {
        &self.controller
    }

    async fn flush(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        for line in self.controller.take_outgoing() {
            debug!("-> {}", line);
            write_line(&mut self.writer, &line).await?;
        }
        Ok(())
    }

    /// Plays with the terminal as input until the player quits.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let stdin = BufReader::new(tokio::io::stdin());
        self.run_with_input(stdin).await
    }

    /// Main client loop. Losing the server ends it with an error.
    pub async fn run_with_input<I>(&mut self, input: I) -> Result<(), Box<dyn std::error::Error>>
    where
        I: AsyncBufRead + Unpin,
    {
        let mut input_lines = input.lines();
        let mut input_open = true;

        loop {
            let deadline = self.controller.deadline();
            let timer = async move {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                event = self.server_rx.recv() => {
                    match event {
                        Some(ServerEvent::Line(line)) => {
                            debug!("<- {}", line);
                            self.controller.handle_line(&line, Instant::now());
                        }
                        Some(ServerEvent::Failed(e)) => return Err(e.into()),
                        Some(ServerEvent::Closed) | None => {
                            return Err("Server closed the connection".into())
                        }
                    }
                },

                typed = input_lines.next_line(), if input_open => {
                    match typed? {
                        Some(line) => {
                            self.input_manager.set_in_game(self.controller.in_game());
                            for action in self.input_manager.parse_line(&line) {
                                if !self.controller.handle_input(action, Instant::now()) {
                                    info!("Quitting");
                                    self.flush().await?;
                                    return Ok(());
                                }
                            }
                        }
                        None => {
                            debug!("Input closed");
                            input_open = false;
                        }
                    }
                },

                _ = timer => {
                    self.controller.tick(Instant::now());
                },
            }

            self.flush().await?;
            if let Some(reason) = self.controller.refused() {
                return Err(format!("Server refused connection: {}", reason).into());
            }
        }
    }
}

impl<D: Display> Drop for Client<D> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Spawns task that forwards each server line to the client loop
fn spawn_reader(read_half: OwnedReadHalf, server_tx: mpsc::UnboundedSender<ServerEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(read_half);
        loop {
            let event = match read_line(&mut reader).await {
                Ok(Some(line)) => ServerEvent::Line(line),
                Ok(None) => ServerEvent::Closed,
                Err(e) => ServerEvent::Failed(e),
            };
            let last = !matches!(event, ServerEvent::Line(_));
            if server_tx.send(event).is_err() || last {
                break;
            }
        }
    })
}
