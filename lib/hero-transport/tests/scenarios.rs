use hero_proto::{decode_command, encode_command};
use hero_transport::{HeroClient, HeroServer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn spawn_server<F>(mut server: HeroServer, mut handler: F) -> (Arc<AtomicBool>, thread::JoinHandle<HeroServer>)
where
    F: FnMut(&hero_proto::Packet, &str, u16, &mut hero_transport::ReplyHandle) + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let stop_handle = stop.clone();

    let handle = thread::spawn(move || {
        while !stop_handle.load(Ordering::Relaxed) {
            server.poll(&mut handler);
            thread::sleep(Duration::from_millis(5));
        }
        server
    });

    (stop, handle)
}

#[test]
fn test_echo() {
    let server = HeroServer::start(0).unwrap();
    let port = server.local_port().unwrap();

    let (stop, handle) = spawn_server(server, |packet, host, from_port, reply| {
        let mut message = b"Echo: ".to_vec();
        message.extend_from_slice(&packet.payload);
        reply.reply(&message);
        let _ = (host, from_port);
    });

    let mut client = HeroClient::new().unwrap();
    assert!(client.connect("127.0.0.1", port, &[1, 2, 3, 4]));
    assert!(client.send_text("hello"));

    let reply = client.receive(Duration::from_secs(2)).expect("echo reply");
    assert_eq!(reply.payload, b"Echo: hello");

    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn test_large_payload_fragments_and_reassembles() {
    let received_len = Arc::new(std::sync::Mutex::new(None));
    let received_len_handler = received_len.clone();

    let server = HeroServer::start(0).unwrap();
    let port = server.local_port().unwrap();

    let (stop, handle) = spawn_server(server, move |packet, _host, _port, _reply| {
        let mut guard = received_len_handler.lock().unwrap();
        *guard = Some((packet.payload.len(), packet.payload.iter().all(|&b| b == 0x41)));
    });

    let mut client = HeroClient::new().unwrap();
    assert!(client.connect("127.0.0.1", port, &[1, 2, 3, 4]));

    let payload = vec![0x41u8; 250_000];
    assert!(client.send(&payload, None));

    let mut seen = None;
    for _ in 0..200 {
        if let Some(result) = *received_len.lock().unwrap() {
            seen = Some(result);
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }

    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap();

    let (len, all_bytes_match) = seen.expect("server should have reassembled the payload");
    assert_eq!(len, 250_000);
    assert!(all_bytes_match);
}

#[test]
fn test_two_clients_broadcast() {
    let server = HeroServer::start(0).unwrap();
    let port = server.local_port().unwrap();
    let (stop, handle) = spawn_server(server, |_packet, _host, _port, _reply| {});

    let mut client_a = HeroClient::new().unwrap();
    let mut client_b = HeroClient::new().unwrap();
    assert!(client_a.connect("127.0.0.1", port, &[1, 2, 3, 4]));
    assert!(client_b.connect("127.0.0.1", port, &[1, 2, 3, 4]));

    // Give the server a moment to register both peers before broadcasting.
    thread::sleep(Duration::from_millis(50));

    let mut server = handle_stop_and_take(stop, handle);
    assert_eq!(server.client_count(), 2);
    assert!(server.broadcast(b"tick:1"));

    let (stop, handle) = spawn_server(server, |_packet, _host, _port, _reply| {});

    let reply_a = client_a.receive(Duration::from_secs(2)).expect("client a reply");
    let reply_b = client_b.receive(Duration::from_secs(2)).expect("client b reply");

    assert_eq!(reply_a.payload, b"tick:1");
    assert_eq!(reply_b.payload, b"tick:1");

    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}

fn handle_stop_and_take(stop: Arc<AtomicBool>, handle: thread::JoinHandle<HeroServer>) -> HeroServer {
    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap()
}

#[test]
fn test_keepalive_updates_rtt() {
    let server = HeroServer::start(0).unwrap();
    let port = server.local_port().unwrap();
    let (stop, handle) = spawn_server(server, |_packet, _host, _port, _reply| {});

    let mut client = HeroClient::new().unwrap();
    assert!(client.connect("127.0.0.1", port, &[1, 2, 3, 4]));

    assert!(client.ping());
    let rtt = client.ping_ms().expect("rtt should be set after a successful ping");
    assert!(rtt <= 1000);

    stop.store(true, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn test_graceful_stop_drops_peer_count() {
    let server = HeroServer::start(0).unwrap();
    let port = server.local_port().unwrap();
    let (stop, handle) = spawn_server(server, |_packet, _host, _port, _reply| {});

    let mut client = HeroClient::new().unwrap();
    assert!(client.connect("127.0.0.1", port, &[1, 2, 3, 4]));
    thread::sleep(Duration::from_millis(20));

    let mut server = handle_stop_and_take(stop, handle);
    assert_eq!(server.client_count(), 1);

    client.disconnect();
    thread::sleep(Duration::from_millis(20));
    server.poll(|_packet, _host, _port, _reply| {});

    assert_eq!(server.client_count(), 0);
}

#[test]
fn test_command_codec() {
    let encoded = encode_command("MV", &["100.5", "250.3"]);
    assert_eq!(encoded, b"MV|100.5;250.3;".to_vec());

    let (mnemonic, args) = decode_command(&encoded);
    assert_eq!(mnemonic, "MV");
    assert_eq!(args, vec!["100.5".to_string(), "250.3".to_string()]);
}
