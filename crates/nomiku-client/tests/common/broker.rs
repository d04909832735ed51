//! Single-connection MQTT 3.1.1 broker speaking just enough of the protocol
//! to drive one client round trip and record what the client sent.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const CONNECT: u8 = 1;
const PUBLISH: u8 = 3;
const SUBSCRIBE: u8 = 8;
const PINGREQ: u8 = 12;
const DISCONNECT: u8 = 14;

/// A client packet as seen by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Connect {
        username: Option<String>,
        password: Option<String>,
    },
    Publish {
        topic: String,
        payload: String,
    },
    Subscribe {
        topic: String,
    },
    Disconnect,
}

pub struct FakeBroker {
    pub port: u16,
    handle: JoinHandle<Vec<Seen>>,
}

impl FakeBroker {
    /// Accept one client. Once it subscribes, send each of `messages`
    /// (topic, payload) in order.
    pub async fn spawn(messages: Vec<(&str, &str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake broker");
        let port = listener.local_addr().expect("Failed to read broker address").port();
        let messages: Vec<(String, String)> = messages
            .into_iter()
            .map(|(t, p)| (t.to_string(), p.to_string()))
            .collect();

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("No client connected");
            serve(stream, messages).await
        });

        Self { port, handle }
    }

    /// Packets seen until the client disconnected or closed the socket.
    pub async fn finish(self) -> Vec<Seen> {
        tokio::time::timeout(Duration::from_secs(2), self.handle)
            .await
            .expect("Client never disconnected")
            .expect("Fake broker panicked")
    }
}

async fn serve(mut stream: TcpStream, messages: Vec<(String, String)>) -> Vec<Seen> {
    let mut seen = Vec::new();

    while let Some((header, body)) = read_packet(&mut stream).await {
        match header >> 4 {
            CONNECT => {
                seen.push(parse_connect(&body));
                stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();
            }
            PUBLISH => {
                let qos = (header >> 1) & 0x03;
                let mut pos = 0;
                let topic = read_str(&body, &mut pos);
                if qos > 0 {
                    pos += 2;
                }
                let payload = String::from_utf8_lossy(&body[pos..]).into_owned();
                seen.push(Seen::Publish { topic, payload });
            }
            SUBSCRIBE => {
                let mut pos = 2;
                let topic = read_str(&body, &mut pos);
                seen.push(Seen::Subscribe { topic });

                stream
                    .write_all(&[0x90, 0x03, body[0], body[1], 0x00])
                    .await
                    .unwrap();
                for (topic, payload) in &messages {
                    stream.write_all(&publish_packet(topic, payload)).await.unwrap();
                }
            }
            PINGREQ => {
                stream.write_all(&[0xD0, 0x00]).await.unwrap();
            }
            DISCONNECT => {
                seen.push(Seen::Disconnect);
                break;
            }
            _ => {}
        }
    }

    seen
}

/// Fixed header byte and body, `None` once the client has gone.
async fn read_packet(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
    let header = stream.read_u8().await.ok()?;

    let mut len = 0usize;
    let mut shift = 0;
    loop {
        let byte = stream.read_u8().await.ok()?;
        len |= ((byte & 0x7F) as usize) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }

    let mut body = vec![0; len];
    stream.read_exact(&mut body).await.ok()?;
    Some((header, body))
}

fn read_str(buf: &[u8], pos: &mut usize) -> String {
    let len = u16::from_be_bytes([buf[*pos], buf[*pos + 1]]) as usize;
    let start = *pos + 2;
    *pos = start + len;
    String::from_utf8_lossy(&buf[start..start + len]).into_owned()
}

fn parse_connect(body: &[u8]) -> Seen {
    let mut pos = 0;
    let _protocol = read_str(body, &mut pos);
    let _level = body[pos];
    let flags = body[pos + 1];
    // level, flags, keep-alive
    pos += 4;

    let _client_id = read_str(body, &mut pos);
    if flags & 0x04 != 0 {
        let _will_topic = read_str(body, &mut pos);
        let _will_message = read_str(body, &mut pos);
    }
    let username = (flags & 0x80 != 0).then(|| read_str(body, &mut pos));
    let password = (flags & 0x40 != 0).then(|| read_str(body, &mut pos));

    Seen::Connect { username, password }
}

fn publish_packet(topic: &str, payload: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&(topic.len() as u16).to_be_bytes());
    body.extend_from_slice(topic.as_bytes());
    body.extend_from_slice(payload.as_bytes());

    let mut packet = vec![0x30];
    let mut len = body.len();
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        packet.push(byte);
        if len == 0 {
            break;
        }
    }
    packet.extend(body);
    packet
}
