//! End-to-end room flow over real WebSocket connections.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use tower_duel::game::collapse::CollapseConfig;
use tower_duel::network::protocol::{ErrorCode, ServerError, ServerMessage};
use tower_duel::{GameConfig, GameServer, RoomCode, Seat, ServerConfig};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server(game: GameConfig) -> (Arc<GameServer>, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(GameServer::new(ServerConfig {
        bind_addr: addr,
        rng_seed: Some(42),
        game,
        ..Default::default()
    }));

    let running = server.clone();
    tokio::spawn(async move { running.serve(listener).await });
    (server, addr)
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    ws
}

async fn send(ws: &mut Client, json: &str) {
    ws.send(Message::Text(json.to_string())).await.unwrap();
}

async fn recv(ws: &mut Client) -> ServerMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("connection closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return ServerMessage::from_json(&text).unwrap();
        }
    }
}

/// Never collapses except on the structural rule, which always fires.
fn structural_only() -> GameConfig {
    GameConfig {
        collapse: CollapseConfig {
            structural_probability: 1.0,
            ..CollapseConfig::never()
        },
        collapse_broadcast_delay: Duration::from_millis(20),
        ..GameConfig::default()
    }
}

async fn open_room(addr: SocketAddr) -> (Client, Client, RoomCode) {
    let mut ann = connect(addr).await;
    let mut ben = connect(addr).await;

    send(&mut ann, r#"{"type":"create-room","name":"Ann"}"#).await;
    let code = match recv(&mut ann).await {
        ServerMessage::RoomCreated(assignment) => {
            assert_eq!(assignment.player_number, Seat::One);
            assignment.room_code
        }
        other => panic!("expected room-created, got {other:?}"),
    };

    let join = format!(
        r#"{{"type":"join-room","name":"Ben","roomCode":" {} "}}"#,
        code.as_str().to_lowercase()
    );
    send(&mut ben, &join).await;

    match recv(&mut ben).await {
        ServerMessage::RoomJoined(assignment) => {
            assert_eq!(assignment.room_code, code);
            assert_eq!(assignment.player_number, Seat::Two);
        }
        other => panic!("expected room-joined, got {other:?}"),
    }
    for ws in [&mut ann, &mut ben] {
        match recv(ws).await {
            ServerMessage::RoomState(state) => {
                assert!(state.game_started);
                assert_eq!(state.current_turn, Seat::One);
                assert_eq!(state.players.len(), 2);
                assert_eq!(state.blocks.len(), 54);
            }
            other => panic!("expected room-state, got {other:?}"),
        }
        match recv(ws).await {
            ServerMessage::GameStart(notice) => {
                assert_eq!(notice.message, "Game started! Ann goes first.");
            }
            other => panic!("expected game-start, got {other:?}"),
        }
    }

    (ann, ben, code)
}

#[tokio::test]
async fn test_full_game_over_websocket() {
    let (server, addr) = start_server(structural_only()).await;
    let (mut ann, mut ben, _code) = open_room(addr).await;

    // Out of turn: only Ben hears about it.
    send(&mut ben, r#"{"type":"remove-block","blockId":0}"#).await;
    match recv(&mut ben).await {
        ServerMessage::Error(ServerError { code, message }) => {
            assert_eq!(code, ErrorCode::NotYourTurn);
            assert_eq!(message, "Not your turn!");
        }
        other => panic!("expected error, got {other:?}"),
    }

    // Garbage is dropped without a reply.
    send(&mut ann, "not json").await;
    send(&mut ann, r#"{"type":"remove-block","blockId":0}"#).await;
    for ws in [&mut ann, &mut ben] {
        match recv(ws).await {
            ServerMessage::BlockRemoved(info) => {
                assert_eq!(info.block_id, 0);
                assert_eq!(info.removed_by, Seat::One);
                assert_eq!(info.player_name, "Ann");
            }
            other => panic!("expected block-removed, got {other:?}"),
        }
        match recv(ws).await {
            ServerMessage::RoomState(state) => {
                assert_eq!(state.current_turn, Seat::Two);
                assert_eq!(state.players[0].score, 10);
            }
            other => panic!("expected room-state, got {other:?}"),
        }
    }

    // Pulling the middle block leaves one block under a loaded layer.
    send(&mut ben, r#"{"type":"remove-block","blockId":1}"#).await;
    for ws in [&mut ann, &mut ben] {
        assert!(matches!(recv(ws).await, ServerMessage::BlockRemoved(_)));
        match recv(ws).await {
            ServerMessage::TowerCollapsed(info) => {
                assert_eq!(info.collapsed_by, Seat::Two);
                assert_eq!(info.winner, Some(Seat::One));
                assert_eq!(info.winner_name, "Ann");
                assert_eq!(info.scores.len(), 2);
            }
            other => panic!("expected tower-collapsed, got {other:?}"),
        }
    }

    // Moves are refused once the game is over.
    send(&mut ann, r#"{"type":"remove-block","blockId":3}"#).await;
    match recv(&mut ann).await {
        ServerMessage::Error(err) => {
            assert_eq!(err.code, ErrorCode::GameNotActive);
            assert_eq!(err.message, "Game is over or has not started!");
        }
        other => panic!("expected error, got {other:?}"),
    }

    send(&mut ben, r#"{"type":"restart"}"#).await;
    for ws in [&mut ann, &mut ben] {
        assert_eq!(recv(ws).await, ServerMessage::GameRestart);
        match recv(ws).await {
            ServerMessage::RoomState(state) => {
                assert!(state.game_started);
                assert!(!state.game_over);
                assert!(state.winner.is_none());
                assert!(state.blocks.iter().all(|b| !b.removed));
                assert!(state.players.iter().all(|p| p.score == 0));
            }
            other => panic!("expected room-state, got {other:?}"),
        }
    }

    server.shutdown();
}

#[tokio::test]
async fn test_join_unknown_room() {
    let (server, addr) = start_server(structural_only()).await;
    let mut ws = connect(addr).await;

    send(&mut ws, r#"{"type":"join-room","name":"Cat","roomCode":"0000"}"#).await;
    match recv(&mut ws).await {
        ServerMessage::Error(err) => {
            assert_eq!(err.code, ErrorCode::RoomNotFound);
            assert_eq!(err.message, "Room not found!");
        }
        other => panic!("expected error, got {other:?}"),
    }

    server.shutdown();
}

#[tokio::test]
async fn test_third_player_is_turned_away() {
    let (server, addr) = start_server(structural_only()).await;
    let (_ann, _ben, code) = open_room(addr).await;
    let mut cat = connect(addr).await;

    let join = format!(r#"{{"type":"join-room","name":"Cat","roomCode":"{}"}}"#, code);
    send(&mut cat, &join).await;
    match recv(&mut cat).await {
        ServerMessage::Error(err) => {
            assert_eq!(err.code, ErrorCode::RoomFull);
            assert_eq!(err.message, "Room is full!");
        }
        other => panic!("expected error, got {other:?}"),
    }

    server.shutdown();
}

#[tokio::test]
async fn test_disconnect_notifies_opponent() {
    let (server, addr) = start_server(structural_only()).await;
    let (mut ann, mut ben, code) = open_room(addr).await;

    ben.close(None).await.unwrap();
    match recv(&mut ann).await {
        ServerMessage::PlayerLeft(notice) => assert_eq!(notice.message, "Opponent disconnected!"),
        other => panic!("expected player-left, got {other:?}"),
    }

    // The room survives with one seat open.
    let sessions = server.sessions();
    let guard = sessions.lock().await;
    let room = guard.room(&code).expect("room should remain");
    assert_eq!(room.players().len(), 1);
    assert!(!room.game_started());
    drop(guard);

    server.shutdown();
}
