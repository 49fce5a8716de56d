//! One MQTT client connection: a read loop that parses just enough of
//! CONNECT/SUBSCRIBE/UNSUBSCRIBE/PINGREQ/DISCONNECT to drive the data
//! model, and a [`Subscriber`] impl that queues outgoing PUBLISH packets
//! for a separate write-drain task, so a slow client can never stall the
//! data model's change-notification dispatch, since individual
//! subscriber `publish` calls must stay non-blocking.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::datamodel::node::Node;
use crate::datamodel::subscriber::Subscriber;
use crate::error::Result;

use super::codec::{
    self, CONNACK, CONNECT, DISCONNECT, PINGREQ, PINGRESP, PUBLISH, SUBACK, SUBSCRIBE, UNSUBACK, UNSUBSCRIBE,
};

const CLIENT_QUEUE_DEPTH: usize = 32;

/// The [`Subscriber`] side of a connected client: publishes are encoded
/// and queued for the write-drain task, dropped (and counted) rather than
/// blocking if that client is too far behind.
pub struct MqttClient {
    id: u64,
    tx: mpsc::Sender<Vec<u8>>,
    dropped: Arc<AtomicU32>,
}

#[async_trait]
impl Subscriber for MqttClient {
    fn subscriber_id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        "mqttClient"
    }

    async fn publish(&self, topic: &str, payload: &str, _retained: bool) {
        let packet = codec::encode_packet(PUBLISH, 0, &codec::publish_body(topic, payload));
        if self.tx.try_send(packet).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Reads the CONNECT packet and replies CONNACK; any other first packet
/// or a malformed CONNECT is a protocol error, and the connection is
/// dropped without a reply, matching a minimal broker's right to refuse
/// a client that doesn't speak MQTT 3.1.1.
async fn handshake(reader: &mut (impl tokio::io::AsyncRead + Unpin), tx: &mpsc::Sender<Vec<u8>>) -> Result<bool> {
    let Some(header) = codec::read_fixed_header(reader).await? else {
        return Ok(false);
    };
    if header.packet_type != CONNECT {
        log::warn!("MQTT client's first packet was not CONNECT (type {})", header.packet_type);
        return Ok(false);
    }

    let body = codec::read_exact(reader, header.remaining_length).await?;
    let mut pos = 0;
    let Some(protocol_name) = codec::read_mqtt_string(&body, &mut pos) else {
        log::warn!("malformed MQTT CONNECT: missing protocol name");
        return Ok(false);
    };
    if protocol_name != "MQTT" && protocol_name != "MQIsdp" {
        log::warn!("unsupported MQTT protocol name '{protocol_name}'");
        return Ok(false);
    }
    // Protocol level, connect flags, and keep-alive are read only to skip
    // past them; they're not enforced. Will/username/password payload
    // fields are unsupported (the full MQTT packet codec beyond the
    // data-model interaction is explicitly out of scope), so a client
    // that sets those flags still gets a clean session with no will.
    pos += 4;
    let client_id = codec::read_mqtt_string(&body, &mut pos).unwrap_or_default();
    log::debug!("MQTT client '{client_id}' connected");

    let _ = tx.send(codec::encode_packet(CONNACK, 0, &[0x00, 0x00])).await;
    Ok(true)
}

/// Drives one client's lifetime: handshake, then read and dispatch
/// protocol packets until the client disconnects or the socket errors.
/// PUBLISH delivery to this client happens independently, through the
/// writer task draining the [`Subscriber`] queue.
pub async fn run(socket: tokio::net::TcpStream, id: u64, root: Arc<Node>) -> Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);

    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(CLIENT_QUEUE_DEPTH);
    let dropped = Arc::new(AtomicU32::new(0));

    let writer_task = tokio::spawn(async move {
        while let Some(packet) = rx.recv().await {
            if write_half.write_all(&packet).await.is_err() {
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let result = run_session(&mut reader, id, &root, tx, &dropped).await;
    root.unsubscribe_everywhere(id).await;
    let _ = writer_task.await;
    result
}

async fn run_session(
    reader: &mut (impl tokio::io::AsyncRead + Unpin),
    id: u64,
    root: &Arc<Node>,
    tx: mpsc::Sender<Vec<u8>>,
    dropped: &Arc<AtomicU32>,
) -> Result<()> {
    if !handshake(reader, &tx).await? {
        return Ok(());
    }

    let client: Arc<dyn Subscriber> = Arc::new(MqttClient { id, tx: tx.clone(), dropped: Arc::clone(dropped) });
    let mut cookie: u32 = 0;

    loop {
        let Some(header) = codec::read_fixed_header(reader).await? else {
            return Ok(());
        };
        let body = codec::read_exact(reader, header.remaining_length).await?;

        match header.packet_type {
            SUBSCRIBE => handle_subscribe(&body, root, &client, &mut cookie, &tx).await,
            UNSUBSCRIBE => handle_unsubscribe(&body, root, &client, &tx).await,
            PINGREQ => {
                let _ = tx.send(codec::encode_packet(PINGRESP, 0, &[])).await;
            }
            DISCONNECT => return Ok(()),
            other => {
                log::debug!("ignoring unsupported MQTT packet type {other}");
            }
        }
    }
}

/// Subscribes to each filter in the packet and replies SUBACK with one
/// grant-or-failure code per filter, in request order, per MQTT 3.1.1
/// section 3.8.4. This broker has no notion of QoS, so every successful
/// match is granted at QoS 0.
async fn handle_subscribe(body: &[u8], root: &Arc<Node>, client: &Arc<dyn Subscriber>, cookie: &mut u32, tx: &mpsc::Sender<Vec<u8>>) {
    if body.len() < 2 {
        return;
    }
    let packet_id = u16::from_be_bytes([body[0], body[1]]);
    let mut pos = 2;

    let mut granted = Vec::new();
    while pos < body.len() {
        let Some(filter) = codec::read_mqtt_string(body, &mut pos) else {
            break;
        };
        if pos >= body.len() {
            break;
        }
        let _requested_qos = body[pos];
        pos += 1;

        *cookie += 1;
        let matched = root.subscribe(&filter, Arc::clone(client), *cookie).await;
        granted.push(if matched > 0 { 0x00u8 } else { 0x80u8 });
    }

    let mut ack_body = packet_id.to_be_bytes().to_vec();
    ack_body.extend_from_slice(&granted);
    let _ = tx.send(codec::encode_packet(SUBACK, 0, &ack_body)).await;
}

async fn handle_unsubscribe(body: &[u8], root: &Arc<Node>, client: &Arc<dyn Subscriber>, tx: &mpsc::Sender<Vec<u8>>) {
    if body.len() < 2 {
        return;
    }
    let packet_id = u16::from_be_bytes([body[0], body[1]]);
    let mut pos = 2;

    while pos < body.len() {
        let Some(filter) = codec::read_mqtt_string(body, &mut pos) else {
            break;
        };
        root.unsubscribe(&filter, client.subscriber_id()).await;
    }

    let _ = tx.send(codec::encode_packet(UNSUBACK, 0, &packet_id.to_be_bytes())).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn a_dropped_publish_is_counted() {
        let (tx, _rx) = mpsc::channel::<Vec<u8>>(1);
        let dropped = Arc::new(AtomicU32::new(0));
        let client = MqttClient { id: 1, tx, dropped: Arc::clone(&dropped) };

        // The receiver is held without draining, so the channel fills
        // after the first publish and every subsequent one is dropped.
        client.publish("gps/time", "12:00:00", false).await;
        client.publish("gps/time", "12:00:01", false).await;
        client.publish("gps/time", "12:00:02", false).await;

        assert!(dropped.load(Ordering::Relaxed) >= 1);
    }

    #[test]
    fn subscriber_id_matches_assigned_id() {
        let (tx, _rx) = mpsc::channel::<Vec<u8>>(1);
        let client = MqttClient { id: 42, tx, dropped: Arc::new(AtomicU32::new(0)) };
        assert_eq!(client.subscriber_id(), 42);
    }
}
