//! Full sessions over real sockets: TcpTransport against a scripted mock
//! receiver, UdpListener fed from a local socket.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;

use netsdr::commands;
use netsdr::{ClientOptions, ConnectionState, NetSdrClient, SampleFormat, SessionEvent};
use netsdr_core::Error;
use netsdr_test_harness::MockTcpServer;
use netsdr_transport::{TcpTransport, UdpListener};

fn script_handshake(server: &mut MockTcpServer, sample_rate: u32) {
    for command in commands::handshake_commands(sample_rate).unwrap() {
        server.expect(&command, &command);
    }
}

async fn client_for(server: &MockTcpServer) -> (NetSdrClient, UdpListener) {
    let listener = UdpListener::bind("127.0.0.1:0").await.unwrap();
    let options = ClientOptions {
        command_timeout: Duration::from_secs(1),
        ..Default::default()
    };
    let client = NetSdrClient::new(
        Box::new(TcpTransport::new(server.addr())),
        Arc::new(listener.clone()),
        options,
    );
    (client, listener)
}

fn data_item(seq: u16, body: &[u8]) -> Vec<u8> {
    let len = (4 + body.len()) as u16;
    let mut out = Vec::new();
    out.extend_from_slice(&(len | (4 << 13)).to_le_bytes());
    out.extend_from_slice(&seq.to_le_bytes());
    out.extend_from_slice(body);
    out
}

#[tokio::test]
async fn connect_tune_stream_and_stop() {
    let mut server = MockTcpServer::new().await.unwrap();
    script_handshake(&mut server, 100_000);

    let tune = commands::cmd_set_frequency(1, 1_000_000).unwrap();
    assert_eq!(&tune[4..], &[0x01, 0x40, 0x42, 0x0F, 0x00, 0x00]);
    server.expect(&tune, &tune);

    let start = commands::cmd_start_iq(SampleFormat::Bits16).unwrap();
    server.expect(&start, &start);
    let stop = commands::cmd_stop_iq().unwrap();
    server.expect(&stop, &stop);
    server.start();

    let (client, listener) = client_for(&server).await;
    let mut events = client.subscribe();
    let mut packets = client.iq_stream().unwrap();

    client.connect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);

    client.change_frequency(1_000_000, 1).await.unwrap();
    client.start_iq().await.unwrap();
    assert!(client.is_streaming());

    let device = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    device
        .send_to(&data_item(1, &[0x10, 0x00, 0xF0, 0xFF]), listener.local_addr())
        .await
        .unwrap();
    device
        .send_to(&data_item(2, &[0x01, 0x80]), listener.local_addr())
        .await
        .unwrap();

    let first = tokio::time::timeout(Duration::from_secs(2), packets.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.sequence, 1);
    assert_eq!(first.samples, vec![16, -16]);
    let second = tokio::time::timeout(Duration::from_secs(2), packets.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.samples, vec![-32767]);

    client.stop_iq().await.unwrap();
    assert!(!client.is_streaming());
    assert_eq!(client.stream_stats().packets, 2);

    client.disconnect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);
    server.wait().await.unwrap();

    let seen: Vec<SessionEvent> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert_eq!(
        seen,
        vec![
            SessionEvent::Connected,
            SessionEvent::FrequencyChanged {
                channel: 1,
                frequency_hz: 1_000_000
            },
            SessionEvent::StreamingStarted,
            SessionEvent::StreamingStopped,
            SessionEvent::Disconnected,
        ]
    );
}

#[tokio::test]
async fn handshake_reply_split_across_reads() {
    let mut server = MockTcpServer::new().await.unwrap();
    let [rate, filter, ad] = commands::handshake_commands(100_000).unwrap();
    server.expect_chunked(&rate, &[&rate[..3], &rate[3..]]);
    server.expect_chunked(&filter, &[&filter[..1], &filter[1..]]);
    server.expect(&ad, &ad);
    server.start();

    let (client, _listener) = client_for(&server).await;
    client.connect().await.unwrap();
    assert!(client.is_connected());

    client.disconnect().await.unwrap();
    server.wait().await.unwrap();
}

#[tokio::test]
async fn handshake_without_reply_times_out() {
    let mut server = MockTcpServer::new().await.unwrap();
    let [rate, _, _] = commands::handshake_commands(100_000).unwrap();
    server.expect(&rate, &[]);
    server.start();

    let listener = UdpListener::bind("127.0.0.1:0").await.unwrap();
    let options = ClientOptions {
        command_timeout: Duration::from_millis(100),
        ..Default::default()
    };
    let client = NetSdrClient::new(
        Box::new(TcpTransport::new(server.addr())),
        Arc::new(listener),
        options,
    );

    assert!(matches!(client.connect().await, Err(Error::Timeout)));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    server.wait().await.unwrap();
}

#[tokio::test]
async fn receiver_hangup_is_reported() {
    let mut server = MockTcpServer::new().await.unwrap();
    script_handshake(&mut server, 100_000);
    let query =
        commands::cmd_request_item(netsdr::ControlItemCode::ReceiverState, &[0x00]).unwrap();
    server.expect(&query, &query);
    server.close_after_script();
    server.start();

    let (client, _listener) = client_for(&server).await;
    client.connect().await.unwrap();
    let mut events = client.subscribe();

    // The receiver answers, then hangs up.
    assert!(client.send_request(&query).await.unwrap().is_some());

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event, SessionEvent::ConnectionLost);
    assert!(!client.is_connected());
    server.wait().await.unwrap();

    // Requests are no-ops again until the next connect.
    assert!(client.send_request(&query).await.unwrap().is_none());
}

#[tokio::test]
async fn connect_refused_surfaces_transport_error() {
    let listener = UdpListener::bind("127.0.0.1:0").await.unwrap();
    let client = NetSdrClient::new(
        Box::new(TcpTransport::with_timeout("127.0.0.1:1", Duration::from_millis(500))),
        Arc::new(listener),
        ClientOptions::default(),
    );

    let err = client.connect().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Transport(_) | Error::Io(_) | Error::Timeout
    ));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}
