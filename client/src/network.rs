use crate::game::ClientGameState;
use crate::input::{BotView, InputManager, SequencedCommand};
use log::{debug, error, info, warn};
use shared::{timestamp_ms, Packet, MAX_PACKET_SIZE, PROTOCOL_VERSION, REASON_TIMED_OUT};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::{interval, interval_at, sleep};

const INPUT_PERIOD: Duration = Duration::from_millis(50);
const HEARTBEAT_PERIOD: Duration = Duration::from_secs(1);
/// Heartbeat periods without any packet before the session counts as lost
const SILENT_HEARTBEATS: u32 = 5;
/// Stand-in for "forever" when no run time is given
const FOREVER: Duration = Duration::from_secs(365 * 24 * 60 * 60);

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    client_id: Option<u32>,
    connected: bool,
    /// Set when the session was lost in a way a fresh Connect can repair
    rejoin: bool,

    game_state: ClientGameState,
    input_manager: InputManager,

    ping_ms: u64,
    fake_ping_ms: u64,
    last_packet_time: Instant,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        fake_ping_ms: u64,
        seed: u64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            client_id: None,
            connected: false,
            rejoin: false,
            game_state: ClientGameState::new(),
            input_manager: InputManager::new(seed),
            ping_ms: 0,
            fake_ping_ms,
            last_packet_time: Instant::now(),
        })
    }

    pub fn game_state(&self) -> &ClientGameState {
        &self.game_state
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server {}...", self.server_addr);

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        self.send_packet(&packet).await?;

        Ok(())
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let data = packet.encode()?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet) {
        self.last_packet_time = Instant::now();

        match packet {
            Packet::Connected { client_id, player } => {
                info!("Connected! Client ID: {}, player {}", client_id, player);
                self.client_id = Some(client_id);
                self.connected = true;
                self.rejoin = false;
                self.game_state.on_connected(client_id, player);
            }

            Packet::Spawn {
                entity,
                kind,
                owner,
            } => {
                self.game_state.on_spawn(entity, kind, owner);
            }

            Packet::Despawn { entity } => {
                self.game_state.on_despawn(entity);
            }

            Packet::StateUpdate {
                tick,
                timestamp,
                last_processed,
                changes,
            } => {
                if timestamp > 0 {
                    self.ping_ms = timestamp_ms().saturating_sub(timestamp);
                }
                self.game_state
                    .apply_state_update(tick, &last_processed, changes);
            }

            Packet::Notify { notification } => {
                self.game_state.on_notification(&notification);
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.drop_session(reason == REASON_TIMED_OUT);
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
    }

    fn drop_session(&mut self, rejoin: bool) {
        self.connected = false;
        self.client_id = None;
        self.rejoin = rejoin;
        self.game_state.reset();
    }

    /// True once a connected session has heard nothing from the server for
    /// several heartbeat periods
    fn server_went_silent(&self) -> bool {
        self.connected && self.last_packet_time.elapsed() > HEARTBEAT_PERIOD * SILENT_HEARTBEATS
    }

    async fn send_commands(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let Some(client_id) = self.client_id.filter(|_| self.connected) else {
            return Ok(());
        };

        let view = BotView {
            dead: self.game_state.is_dead(),
            position: self.game_state.own_position(),
            yaw: self.game_state.own_yaw(),
        };

        for SequencedCommand { sequence, command } in self.input_manager.update(view) {
            debug!("Sending {} #{}", command.name(), sequence);
            let packet = Packet::Command {
                client_id,
                sequence,
                command,
            };
            self.send_packet(&packet).await?;
        }

        Ok(())
    }

    /// Runs until Ctrl-C, the server disconnects us, or `duration` elapses
    pub async fn run(
        &mut self,
        duration: Option<Duration>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut input_interval = interval(INPUT_PERIOD);
        let mut heartbeat_interval = interval_at(
            tokio::time::Instant::now() + HEARTBEAT_PERIOD,
            HEARTBEAT_PERIOD,
        );
        let deadline = sleep(duration.unwrap_or(FOREVER));
        tokio::pin!(deadline);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let mut was_connected = false;

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if self.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
                            }

                            match Packet::decode(&buffer[..len]) {
                                Ok(packet) => self.handle_packet(packet),
                                Err(e) => warn!("Malformed packet from server: {}", e),
                            }

                            if was_connected && !self.connected && !self.rejoin {
                                break;
                            }
                            was_connected = self.connected;
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = input_interval.tick() => {
                    if let Err(e) = self.send_commands().await {
                        error!("Error sending commands: {}", e);
                    }
                },

                _ = heartbeat_interval.tick() => {
                    if self.server_went_silent() {
                        warn!("Server {} went silent, reconnecting", self.server_addr);
                        self.drop_session(true);
                    }

                    let packet = if self.connected {
                        Packet::Heartbeat
                    } else {
                        Packet::Connect { client_version: PROTOCOL_VERSION }
                    };
                    if let Err(e) = self.send_packet(&packet).await {
                        error!("Error sending heartbeat: {}", e);
                    }

                    if self.connected {
                        debug!(
                            "Tick {}, ping {}ms, health {:?}, {} entities, acked #{}",
                            self.game_state.tick,
                            self.ping_ms,
                            self.game_state.own_health(),
                            self.game_state.entity_count(),
                            self.game_state.last_acked()
                        );
                    } else if self.last_packet_time.elapsed() > HEARTBEAT_PERIOD * SILENT_HEARTBEATS {
                        warn!("No answer from {}, retrying", self.server_addr);
                    }
                },

                _ = &mut deadline => {
                    info!("Run time elapsed");
                    break;
                },

                _ = &mut ctrl_c => {
                    info!("Ctrl-C received");
                    break;
                },
            }
        }

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
            self.connected = false;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::EntityId;

    async fn connected_client() -> Client {
        let mut client = Client::new("127.0.0.1:9", 0, 1).await.unwrap();
        client.handle_packet(Packet::Connected {
            client_id: 3,
            player: EntityId(4),
        });
        client
    }

    #[tokio::test]
    async fn test_timed_out_reply_schedules_rejoin() {
        let mut client = connected_client().await;
        assert!(client.is_connected());

        client.handle_packet(Packet::Disconnected {
            reason: REASON_TIMED_OUT.to_string(),
        });
        assert!(!client.is_connected());
        assert!(client.rejoin);
        assert_eq!(client.game_state().player, None);

        client.handle_packet(Packet::Connected {
            client_id: 5,
            player: EntityId(9),
        });
        assert!(client.is_connected());
        assert!(!client.rejoin);
        assert_eq!(client.game_state().client_id, Some(5));
    }

    #[tokio::test]
    async fn test_other_disconnects_end_the_session() {
        let mut client = connected_client().await;
        client.handle_packet(Packet::Disconnected {
            reason: "Server shutting down".to_string(),
        });
        assert!(!client.is_connected());
        assert!(!client.rejoin);
    }

    #[tokio::test]
    async fn test_silent_server_is_detected() {
        let mut client = connected_client().await;
        assert!(!client.server_went_silent());

        let Some(long_ago) =
            Instant::now().checked_sub(HEARTBEAT_PERIOD * (SILENT_HEARTBEATS + 1))
        else {
            return;
        };
        client.last_packet_time = long_ago;
        assert!(client.server_went_silent());

        client.drop_session(true);
        assert!(!client.server_went_silent());
        assert!(client.rejoin);
    }
}
