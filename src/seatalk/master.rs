//! The SeaTalk "master" write side: commands we originate rather than
//! decode, grounded on `SeaTalkMaster.cpp`.

use async_trait::async_trait;

use super::command::SeaTalkCommand;
use super::datagram::SeaTalkDatagram;

/// Something that can take a built datagram and put it on the wire,
/// encoding the command byte's 9th framing bit. Implemented by the
/// soft-UART and `$STALK` transports.
#[async_trait]
pub trait SeaTalkSink: Send + Sync {
    async fn send_datagram(&self, bytes: &[u8]);
}

fn build_datagram(command: SeaTalkCommand, attribute: u8, args: &[u8]) -> SeaTalkDatagram {
    let mut datagram = SeaTalkDatagram::new();
    datagram.append(command.byte());
    datagram.append(attribute);
    for &b in args {
        datagram.append(b);
    }
    datagram
}

/// Sends commands onto a SeaTalk bus. Currently only lamp intensity, the
/// only master command the original issues.
pub struct SeaTalkMaster<S: SeaTalkSink> {
    sink: S,
}

impl<S: SeaTalkSink> SeaTalkMaster<S> {
    pub fn new(sink: S) -> Self {
        SeaTalkMaster { sink }
    }

    pub async fn set_lamp_intensity(&self, intensity: super::command::SeaTalkLampIntensity) {
        let datagram = build_datagram(SeaTalkCommand::SetLampIntensity, 0x00, &[intensity.byte()]);
        self.sink.send_datagram(datagram.as_bytes()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl SeaTalkSink for RecordingSink {
        async fn send_datagram(&self, bytes: &[u8]) {
            self.sent.lock().unwrap().push(bytes.to_vec());
        }
    }

    #[tokio::test]
    async fn set_lamp_intensity_builds_a_three_byte_datagram() {
        let sink = RecordingSink::default();
        let master = SeaTalkMaster::new(sink);

        master.set_lamp_intensity(super::super::command::SeaTalkLampIntensity::L2).await;

        let sent = master.sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], vec![0x30, 0x00, 0x02]);
    }
}
