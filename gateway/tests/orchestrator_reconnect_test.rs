//! Exercises the reconnect-with-backoff supervisor against a real TCP
//! listener: a dropped connection must not be fatal, and the next
//! connection attempt must replay `session_open` before anything else.

use std::net::TcpListener;
use std::time::Duration;

use gateway::orchestrator::{EventSink, OrchestratorClient};
use gateway_protocol::{Connection, InboundCommand, OutboundEvent};

fn accept_one(listener: &TcpListener) -> Connection<std::net::TcpStream> {
    let (stream, _) = listener.accept().unwrap();
    let write_half = stream.try_clone().unwrap();
    Connection::new(stream, write_half)
}

#[test]
fn reconnects_and_replays_session_open_after_a_dropped_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let client = OrchestratorClient::connect(
        addr,
        "sess-1".to_string(),
        "room://test".to_string(),
    );

    let mut conn = accept_one(&listener);
    let first_open: OutboundEvent = conn.read_message().unwrap();
    assert_eq!(
        first_open,
        OutboundEvent::SessionOpen {
            session_id: "sess-1".to_string(),
            room_url: "room://test".to_string(),
        }
    );

    // Ask the session to arm barge-in, then drop the connection entirely to
    // force the supervisor's reconnect path.
    conn.write_message(&InboundCommand::ArmBargeIn {
        guard_ms: 500,
        min_rms: 100.0,
    })
    .unwrap();
    drop(conn);

    let mut saw_arm = false;
    for _ in 0..200 {
        if let Some(cmd) = client.try_recv_command() {
            assert_eq!(
                cmd,
                InboundCommand::ArmBargeIn {
                    guard_ms: 500,
                    min_rms: 100.0,
                }
            );
            saw_arm = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(saw_arm, "expected the arm_barge_in command to be delivered");

    let mut reconnected = accept_one(&listener);
    let replayed_open: OutboundEvent = reconnected.read_message().unwrap();
    assert_eq!(
        replayed_open,
        OutboundEvent::SessionOpen {
            session_id: "sess-1".to_string(),
            room_url: "room://test".to_string(),
        }
    );

    // The audio/feature path keeps working across the reconnect: emitting
    // after the drop and before the new connection was accepted must not
    // panic or be lost forever (it queues until the writer is live again).
    client.emit(OutboundEvent::Feature { rms: 42.0 });
    let feature: OutboundEvent = reconnected.read_message().unwrap();
    assert_eq!(feature, OutboundEvent::Feature { rms: 42.0 });
}
