#![allow(clippy::unwrap_used)]

//! End-to-end sessions through one and two relay hops.

use hopwire_core::Relayer;
use hopwire_relay::http::HttpProxyFrontend;
use hopwire_relay::socks5::Socks5Frontend;
use hopwire_relay::tcp::TcpBackend;
use hopwire_relay::wrap::{WrapBackend, WrapFrontend};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn listen() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    (listener, addr)
}

/// Echoes every byte back until the client stops sending.
async fn spawn_echo_server() -> SocketAddr {
    let (listener, addr) = listen().await;

    tokio::spawn(async move {
        loop {
            let (mut stream, _) = listener.accept().await.unwrap();

            tokio::spawn(async move {
                let mut buf = [0u8; 8192];
                loop {
                    let n = stream.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    stream.write_all(&buf[..n]).await.unwrap();
                }
            });
        }
    });

    addr
}

/// A SOCKS5 proxy in front of a direct TCP egress.
async fn spawn_terminal_socks_relay() -> SocketAddr {
    let (listener, addr) = listen().await;

    tokio::spawn(async move {
        Relayer::new(Socks5Frontend::new(listener), TcpBackend)
            .run()
            .await
    });

    addr
}

/// A two-hop chain: SOCKS5 ingress on the first relay, wrapped link to the
/// second, direct TCP egress there. Returns the SOCKS5 address.
async fn spawn_two_hop_chain() -> SocketAddr {
    let (exit_listener, exit_addr) = listen().await;
    tokio::spawn(async move {
        Relayer::new(WrapFrontend::new(exit_listener), TcpBackend)
            .run()
            .await
    });

    let (entry_listener, entry_addr) = listen().await;
    tokio::spawn(async move {
        Relayer::new(
            Socks5Frontend::new(entry_listener),
            WrapBackend::new(exit_addr.to_string()),
        )
        .run()
        .await
    });

    entry_addr
}

/// Completes a SOCKS5 CONNECT to `dest` and returns the tunnel stream.
async fn socks5_connect(proxy: SocketAddr, dest: SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(proxy).await.unwrap();

    stream.write_all(&[5, 1, 0]).await.unwrap();
    let mut selected = [0u8; 2];
    stream.read_exact(&mut selected).await.unwrap();
    assert_eq!(selected, [5, 0]);

    let SocketAddr::V4(dest) = dest else {
        panic!("tests use ipv4 destinations");
    };
    let mut request = vec![5, 1, 0, 1];
    request.extend_from_slice(&dest.ip().octets());
    request.extend_from_slice(&dest.port().to_be_bytes());
    stream.write_all(&request).await.unwrap();

    let mut reply = [0u8; 10];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 0, "connect was refused");

    stream
}

#[tokio::test]
async fn socks5_connect_reaches_a_direct_echo() {
    let echo = spawn_echo_server().await;
    let proxy = spawn_terminal_socks_relay().await;

    let mut stream = socks5_connect(proxy, echo).await;

    stream.write_all(b"hello").await.unwrap();
    let mut reply = [0u8; 5];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"hello");

    stream.shutdown().await.unwrap();
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn two_hops_carry_a_large_transfer_intact() {
    let echo = spawn_echo_server().await;
    let proxy = spawn_two_hop_chain().await;

    let mut stream = socks5_connect(proxy, echo).await;

    let payload: Vec<u8> = (0..1024 * 1024).map(|_| rand::random()).collect();

    let (mut read_half, mut write_half) = stream.split();
    let sent = payload.clone();
    let (received, ()) = tokio::join!(
        async move {
            let mut received = Vec::with_capacity(sent.len());
            read_half
                .read_to_end(&mut received)
                .await
                .map(|_| received)
                .unwrap()
        },
        async {
            write_half.write_all(&payload).await.unwrap();
            write_half.shutdown().await.unwrap();
        },
    );

    assert_eq!(received.len(), 1024 * 1024);
    assert_eq!(received, payload);
}

/// The link between the relays must look like HTTP POST traffic.
#[tokio::test]
async fn inter_relay_traffic_is_shaped_as_http_posts() {
    let echo = spawn_echo_server().await;

    let (exit_listener, exit_addr) = listen().await;
    tokio::spawn(async move {
        Relayer::new(WrapFrontend::new(exit_listener), TcpBackend)
            .run()
            .await
    });

    // A sniffing forwarder between the two relays, recording the entry-side
    // byte stream.
    let (sniffer_listener, sniffer_addr) = listen().await;
    let recorded = Arc::new(Mutex::new(Vec::new()));
    let log = recorded.clone();
    tokio::spawn(async move {
        let (mut inbound, _) = sniffer_listener.accept().await.unwrap();
        let mut outbound = TcpStream::connect(exit_addr).await.unwrap();

        let (mut inbound_read, mut inbound_write) = inbound.split();
        let (mut outbound_read, mut outbound_write) = outbound.split();

        let record = async {
            let mut buf = [0u8; 8192];
            loop {
                let n = inbound_read.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                log.lock().unwrap().extend_from_slice(&buf[..n]);
                outbound_write.write_all(&buf[..n]).await.unwrap();
            }
            let _ = outbound_write.shutdown().await;
        };
        let reflect = async {
            let _ = tokio::io::copy(&mut outbound_read, &mut inbound_write).await;
            let _ = inbound_write.shutdown().await;
        };
        tokio::join!(record, reflect);
    });

    let (entry_listener, entry_addr) = listen().await;
    tokio::spawn(async move {
        Relayer::new(
            Socks5Frontend::new(entry_listener),
            WrapBackend::new(sniffer_addr.to_string()),
        )
        .run()
        .await
    });

    let mut stream = socks5_connect(entry_addr, echo).await;
    stream.write_all(b"fingerprint me").await.unwrap();
    let mut reply = [0u8; 14];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"fingerprint me");
    stream.shutdown().await.unwrap();
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.unwrap();

    let wire = recorded.lock().unwrap().clone();
    let text = String::from_utf8_lossy(&wire);
    assert!(text.starts_with("POST / HTTP/1.1\r\n"), "{text}");
    assert!(text.contains("User-Agent: Mozilla/5.0\r\n"), "{text}");
}

#[tokio::test]
async fn half_close_does_not_tear_down_the_reverse_direction() {
    // A server that consumes the whole request before replying; the reply
    // only works if the client's FIN left the reverse path open.
    let (listener, server_addr) = listen().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let mut request = Vec::new();
        stream.read_to_end(&mut request).await.unwrap();
        assert_eq!(request, b"ping");

        stream.write_all(b"pong").await.unwrap();
    });

    let proxy = spawn_two_hop_chain().await;
    let mut stream = socks5_connect(proxy, server_addr).await;

    stream.write_all(b"ping").await.unwrap();
    stream.shutdown().await.unwrap();

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    assert_eq!(reply, b"pong");
}

#[tokio::test]
async fn oversized_frames_are_rejected_at_the_wrap_ingress() {
    let (listener, addr) = listen().await;
    tokio::spawn(async move {
        Relayer::new(WrapFrontend::new(listener), TcpBackend)
            .run()
            .await
    });

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"POST / HTTP/1.1\r\nContent-Length: 100000000\r\n\r\n")
        .await
        .unwrap();

    // The relay answers with its cover response and drops the connection.
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    assert!(reply.starts_with(b"HTTP/1.1 500 Internal Server Error\r\n"));
}

#[tokio::test]
async fn unsupported_socks5_commands_are_refused() {
    let proxy = spawn_terminal_socks_relay().await;

    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream.write_all(&[5, 1, 0]).await.unwrap();
    let mut selected = [0u8; 2];
    stream.read_exact(&mut selected).await.unwrap();

    // BIND to 0.0.0.0:80.
    stream
        .write_all(&[5, 2, 0, 1, 0, 0, 0, 0, 0, 80])
        .await
        .unwrap();

    let mut reply = [0u8; 10];
    stream.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 7, "expected command-not-supported");

    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn http_connect_tunnels_through_the_relay() {
    let echo = spawn_echo_server().await;

    let (listener, proxy) = listen().await;
    tokio::spawn(async move {
        Relayer::new(HttpProxyFrontend::new(listener), TcpBackend)
            .run()
            .await
    });

    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream
        .write_all(format!("CONNECT {echo} HTTP/1.1\r\nHost: {echo}\r\n\r\n").as_bytes())
        .await
        .unwrap();

    let mut established = [0u8; 19];
    stream.read_exact(&mut established).await.unwrap();
    assert_eq!(&established, b"HTTP/1.1 200 OK\r\n\r\n");

    stream.write_all(b"tunnel me").await.unwrap();
    let mut echoed = [0u8; 9];
    stream.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"tunnel me");
}

#[tokio::test]
async fn http_forward_replays_the_request_through_the_relay() {
    // A one-shot origin that checks the rewritten head and answers.
    let (listener, origin) = listen().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let mut head = vec![0u8; 4096];
        let mut read = 0;
        loop {
            let n = stream.read(&mut head[read..]).await.unwrap();
            read += n;
            if n == 0 || head[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }

        let head = String::from_utf8_lossy(&head[..read]).to_string();
        assert!(head.starts_with("GET /hello HTTP/1.1\r\n"), "{head}");
        assert!(head.contains("Connection: close\r\n"), "{head}");
        assert!(!head.contains("Proxy-Connection"), "{head}");

        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
            .await
            .unwrap();
    });

    let (listener, proxy) = listen().await;
    tokio::spawn(async move {
        Relayer::new(HttpProxyFrontend::new(listener), TcpBackend)
            .run()
            .await
    });

    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream
        .write_all(
            format!(
                "GET http://{origin}/hello HTTP/1.1\r\nHost: {origin}\r\nProxy-Connection: keep-alive\r\n\r\n"
            )
            .as_bytes(),
        )
        .await
        .unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();

    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "{text}");
    assert!(text.ends_with("ok"), "{text}");
}
