//! Integration tests for the server session and clients together
//!
//! The table tests wire real `ClientController`s to a real `Session` in
//! memory, routing every line both ways. The last test runs the same over
//! loopback TCP.

use client::controller::ClientController;
use client::display::{TerminalDisplay, TextBuffer};
use client::engine::{EngineOptions, EngineState, TetrisEngine};
use rand::rngs::StdRng;
use rand::SeedableRng;
use server::session::{Disposition, Session};
use server::store::ServerSettings;
use std::collections::BTreeMap;
use std::time::Instant;

type Controller = ClientController<TerminalDisplay<Vec<u8>>, StdRng>;

/// A server session with in-memory clients seated around it.
struct Table {
    session: Session,
    clients: BTreeMap<u8, Controller>,
    now: Instant,
    seed: u64,
}

impl Table {
    fn new(settings: ServerSettings) -> Self {
        Self {
            session: Session::new(settings),
            clients: BTreeMap::new(),
            now: Instant::now(),
            seed: 1,
        }
    }

    /// Connects and registers a client. Returns its slot if the server
    /// kept the connection.
    fn join(&mut self, nick: &str) -> Option<u8> {
        let slot = self.session.connect([127, 0, 0, 1])?;
        self.seed += 1;
        let engine = TetrisEngine::with_rng(EngineOptions::default(), StdRng::seed_from_u64(self.seed));
        let controller = ClientController::new(nick, engine, TerminalDisplay::new(Vec::new(), false));
        let hello = controller.registration().to_string();
        self.clients.insert(slot, controller);

        let disposition = self.session.handle_line(slot, &hello);
        self.deliver();
        if disposition == Disposition::Close {
            self.session.disconnect(slot);
            self.pump();
            return None;
        }
        self.pump();
        Some(slot)
    }

    fn deliver(&mut self) -> bool {
        let outbound = self.session.drain_outbox();
        let moved = !outbound.is_empty();
        for out in outbound {
            if let Some(client) = self.clients.get_mut(&out.slot) {
                client.handle_line(&out.line, self.now);
            }
        }
        moved
    }

    /// Routes lines both ways until everyone is quiet.
    fn pump(&mut self) {
        loop {
            let mut moved = self.deliver();
            let slots: Vec<u8> = self.clients.keys().copied().collect();
            for slot in slots {
                let lines = match self.clients.get_mut(&slot) {
                    Some(client) => client.take_outgoing(),
                    None => continue,
                };
                for line in lines {
                    moved = true;
                    if self.session.handle_line(slot, &line) == Disposition::Close {
                        self.session.disconnect(slot);
                        self.clients.remove(&slot);
                        break;
                    }
                }
            }
            if !moved {
                break;
            }
        }
    }

    fn client(&self, slot: u8) -> &Controller {
        &self.clients[&slot]
    }

    fn say(&mut self, slot: u8, text: &str) {
        if let Some(client) = self.clients.get_mut(&slot) {
            client.partyline_enter(text);
        }
        self.pump();
    }

    /// Sends a line as if the client at `slot` had typed it raw.
    fn raw(&mut self, slot: u8, line: &str) {
        if self.session.handle_line(slot, line) == Disposition::Close {
            self.session.disconnect(slot);
            self.clients.remove(&slot);
        }
        self.pump();
    }

    fn last(&self, slot: u8, buffer: TextBuffer) -> Option<&str> {
        self.client(slot).history(buffer).back().map(String::as_str)
    }
}

/// SESSION AND CLIENT TESTS
mod table_tests {
    use super::*;

    #[test]
    fn test_players_see_each_other() {
        let mut table = Table::new(ServerSettings::default());
        assert_eq!(table.join("alice"), Some(1));
        assert_eq!(table.join("bob"), Some(2));

        assert_eq!(table.client(1).player(2), Some("bob"));
        assert_eq!(table.client(2).player(1), Some("alice"));
        assert_eq!(table.last(1, TextBuffer::Partyline), Some("*** bob is Now Playing"));

        table.say(2, "hi alice");
        assert_eq!(table.last(1, TextBuffer::Partyline), Some("<bob> hi alice"));
        assert_eq!(table.last(2, TextBuffer::Partyline), Some("<bob> hi alice"));
    }

    #[test]
    fn test_two_player_game_scoring() {
        let mut table = Table::new(ServerSettings::default());
        table.join("alice");
        table.join("bob");

        table.say(1, "/start");
        assert!(table.client(1).in_game());
        assert!(table.client(2).in_game());

        table.raw(2, "playerlost 2");
        assert!(!table.session.is_playing());
        for slot in [1, 2] {
            let client = table.client(slot);
            assert_eq!(client.engine().state(), EngineState::Idle);
            let entries = client.winlist().entries();
            assert_eq!(entries[0].name, "alice");
            assert_eq!(entries[0].points, 3);
            assert_eq!(entries[1].name, "bob");
            assert_eq!(entries[1].points, 2);
        }
        let saved = &table.session.settings().winlist;
        assert_eq!(saved.get("alice", false).map(|e| e.games), Some(1));
        assert_eq!(saved.get("bob", false).map(|e| e.games), Some(1));
        assert!(table.session.take_save_request());
    }

    #[test]
    fn test_only_first_player_starts() {
        let mut table = Table::new(ServerSettings::default());
        table.join("alice");
        table.join("bob");
        table.say(2, "/start");
        assert!(!table.session.is_playing());
        assert!(!table.client(2).in_game());
    }

    #[test]
    fn test_special_travels_between_clients() {
        let mut table = Table::new(ServerSettings::default());
        table.join("alice");
        table.join("bob");
        table.say(1, "/start");

        table.raw(2, "sb 1 a 2");
        let alice = table.client(1);
        assert!(!alice.engine().own_field().is_empty());
        assert_eq!(
            table.last(1, TextBuffer::AttDef),
            Some("Add Line on alice by bob")
        );
        // Alice's field update reached bob.
        assert_eq!(
            table.client(2).engine().field(1),
            Some(table.client(1).engine().own_field())
        );
    }

    #[test]
    fn test_duplicate_nick_refused() {
        let mut table = Table::new(ServerSettings::default());
        table.join("alice");
        assert_eq!(table.join("ALICE"), None);
        assert_eq!(
            table.client(2).refused(),
            Some("Nickname already exists on server!")
        );
        assert_eq!(table.session.roster().len(), 1);
        assert_eq!(table.client(1).player(2), None);
    }

    #[test]
    fn test_bad_frequencies_reported() {
        let mut settings = ServerSettings::default();
        settings.config.piece_freq[0] -= 1;
        let mut table = Table::new(settings);
        table.join("alice");
        table.say(1, "/start");
        assert!(!table.session.is_playing());
        assert!(!table.client(1).in_game());
        assert_eq!(
            table.last(1, TextBuffer::Partyline),
            Some("* Server cannot start game: Piece frequencies do not total 100 percent!")
        );
    }

    #[test]
    fn test_lost_player_specials_dropped() {
        let mut table = Table::new(ServerSettings::default());
        table.join("alice");
        table.join("bob");
        table.join("carol");
        table.say(1, "/start");

        table.raw(3, "playerlost 3");
        assert!(table.session.is_playing());
        table.raw(3, "sb 1 a 3");
        assert!(table.client(1).engine().own_field().is_empty());
        assert!(table.client(1).history(TextBuffer::AttDef).is_empty());
    }

    #[test]
    fn test_team_win_end_to_end() {
        let mut table = Table::new(ServerSettings::default());
        table.join("alice");
        table.join("bob");
        table.join("carol");
        table.say(1, "/team red");
        table.say(2, "/team Red");
        assert_eq!(table.client(3).team(1), Some("red"));
        table.say(1, "/start");

        // Line attacks between teammates do nothing.
        table.raw(2, "sb 0 cs4 2");
        assert!(table.client(1).engine().own_field().is_empty());
        assert!(!table.client(3).engine().own_field().is_empty());

        table.raw(3, "playerlost 3");
        assert!(!table.session.is_playing());
        let entries = table.client(3).winlist().entries();
        assert_eq!(entries[0].name, "red");
        assert!(entries[0].team);
        assert_eq!(entries[0].points, 3);
        assert_eq!(entries[1].name, "carol");
        assert_eq!(entries[1].points, 2);
    }

    #[test]
    fn test_late_joiner_spectates() {
        let mut table = Table::new(ServerSettings::default());
        table.join("alice");
        table.join("bob");
        table.say(1, "/start");
        table.join("carol");

        assert_eq!(table.client(3).engine().state(), EngineState::Spectating);
        assert_eq!(table.session.lost_rank(3), 1);
        let seen = table.client(1).engine().field(3).unwrap();
        assert_eq!(seen, table.client(3).engine().own_field());
        assert_eq!(seen.block_count(), shared::FIELD_WIDTH * shared::FIELD_HEIGHT);
    }

    #[test]
    fn test_pause_round_trip() {
        let mut table = Table::new(ServerSettings::default());
        table.join("alice");
        table.join("bob");
        table.say(2, "/pause");
        assert!(!table.session.is_paused());
        table.say(1, "/start");
        table.say(2, "/pause");
        assert!(table.session.is_paused());
        assert!(table.client(1).engine().is_paused());
        table.say(1, "/unpause");
        assert!(!table.client(2).engine().is_paused());
    }
}

/// NETWORK TESTS
mod network_tests {
    use client::network::{Client, ClientOptions};
    use server::network::Server;
    use server::store::{ConfigStore, ServerSettings};
    use client::display::TerminalDisplay;
    use client::engine::EngineOptions;
    use shared::transport::{read_line, write_line};
    use std::time::Duration;
    use tokio::io::BufReader;
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn test_loopback_session() {
        let path = std::env::temp_dir().join(format!("tetrinet-it-{}", std::process::id()));
        let store = ConfigStore::new(&path);
        let mut server = Server::new("127.0.0.1:0", store, ServerSettings::default())
            .await
            .unwrap();
        let port = server.local_addr().unwrap().port();
        let handle = server.handle();
        let server_task = tokio::spawn(async move {
            server.run().await.unwrap();
        });

        // A bare client registering in plain text.
        let bob = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let (bob_read, mut bob_write) = bob.into_split();
        let mut bob_read = BufReader::new(bob_read);
        write_line(&mut bob_write, "tetrisstart bob 1.13").await.unwrap();
        assert_eq!(read_line(&mut bob_read).await.unwrap().unwrap(), "playernum 1");
        assert_eq!(read_line(&mut bob_read).await.unwrap().unwrap(), "winlist ");

        // The real client, with the obfuscated registration.
        let options = ClientOptions {
            nick: "alice".to_string(),
            server: "127.0.0.1".to_string(),
            port,
            engine: EngineOptions::default(),
            plain: false,
            draw_fields: false,
        };
        let mut alice = Client::with_display(&options, TerminalDisplay::new(Vec::new(), false))
            .await
            .unwrap();
        let input = tokio_test::io::Builder::new()
            .wait(Duration::from_millis(300))
            .read(b"hi bob\n/quit\n")
            .build();
        alice.run_with_input(BufReader::new(input)).await.unwrap();
        assert_eq!(alice.controller().slot(), Some(2));
        assert_eq!(alice.controller().player(1), Some("bob"));

        assert_eq!(read_line(&mut bob_read).await.unwrap().unwrap(), "playerjoin 2 alice");
        assert_eq!(read_line(&mut bob_read).await.unwrap().unwrap(), "team 2 ");
        assert_eq!(read_line(&mut bob_read).await.unwrap().unwrap(), "pline 2 hi bob");

        drop(alice);
        handle.shutdown();
        server_task.await.unwrap();
        let _ = std::fs::remove_file(&path);
    }
}
