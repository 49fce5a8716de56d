//! AIS bit-stream decoding: 6-bit armoring, fragment
//! reassembly, message dispatch, and the contact table.

pub mod armor;
pub mod bitreader;
pub mod contact;
pub mod dump;
pub mod message;
pub mod reassembly;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Duration;

use crate::datamodel::leaf::{LeafExt, LeafHandle};
use crate::datamodel::node::Node;
use crate::nmea0183::messages::{parse_vdm_vdo, VdmVdoMessage};
use crate::nmea0183::source::LineHandler;
use crate::nmea0183::tag::Talker;
use crate::stats::{StatCounter, StatsHolder};

use contact::ContactTable;
use message::DecodedMessage;
use reassembly::Reassembler;

/// Ties the reassembler, message dispatcher and contact table together
/// as a registered NMEA 0183 line handler for VDM/VDO sentences,
/// grounded on the relationship between `NMEALineSource`,
/// `NMEAVDMMsg`/`NMEAVDOMsg` and `AISContacts` in the original.
pub struct AisDecoder {
    reassembler: AsyncMutex<Reassembler>,
    contacts: Arc<ContactTable>,

    messages_counter: AsyncMutex<StatCounter>,
    messages_leaf: LeafHandle,
    message_rate_leaf: LeafHandle,
    unhandled_types_leaf: LeafHandle,
    unhandled_types: AsyncMutex<u32>,
    decode_errors_leaf: LeafHandle,
    decode_errors: AsyncMutex<u32>,
    contact_count_leaf: LeafHandle,
}

impl AisDecoder {
    pub async fn new(ais_node: &Arc<Node>, max_contacts: usize, contacts_lock_timeout: Duration) -> Arc<Self> {
        let decoder = AisDecoder {
            reassembler: AsyncMutex::new(Reassembler::new()),
            contacts: Arc::new(ContactTable::new(max_contacts, contacts_lock_timeout)),
            messages_counter: AsyncMutex::new(StatCounter::new()),
            messages_leaf: ais_node.add_u32_leaf("messages").await,
            message_rate_leaf: ais_node.add_u32_leaf("messageRate").await,
            unhandled_types_leaf: ais_node.add_u32_leaf("unhandledTypeMsgs").await,
            unhandled_types: AsyncMutex::new(0),
            decode_errors_leaf: ais_node.add_u32_leaf("decodeErrors").await,
            decode_errors: AsyncMutex::new(0),
            contact_count_leaf: ais_node.add_u32_leaf("contactCount").await,
        };
        Arc::new(decoder)
    }

    pub fn contacts(&self) -> &Arc<ContactTable> {
        &self.contacts
    }

    async fn handle_vdm_vdo(&self, vdm: VdmVdoMessage) {
        self.messages_counter.lock().await.increment();

        let reassembled = {
            let mut reassembler = self.reassembler.lock().await;
            reassembler.feed(
                vdm.radio_channel,
                vdm.total_fragments,
                vdm.fragment_number,
                vdm.sequential_message_id,
                &vdm.payload,
                vdm.fill_bits,
            )
        };
        let Some((payload, fill_bits)) = reassembled else { return };

        let Some(bits) = armor::unarmor(&payload, fill_bits) else {
            *self.decode_errors.lock().await += 1;
            log::warn!("AIS payload failed to unarmor");
            return;
        };

        let Some(decoded) = message::decode(&bits) else {
            *self.decode_errors.lock().await += 1;
            return;
        };

        self.apply(decoded, vdm.own_ship).await;
    }

    async fn apply(&self, decoded: DecodedMessage, own_ship: bool) {
        if own_ship {
            return;
        }

        match decoded {
            DecodedMessage::StaticAndVoyageData { mmsi, name, ship_type, dimensions } => {
                self.contacts
                    .update(mmsi, |c| {
                        c.name = Some(name);
                        c.ship_or_aid_type = Some(ship_type);
                        if dimensions.length_m != 0 && dimensions.width_m != 0 {
                            c.dimensions = Some(dimensions);
                        }
                    })
                    .await
                    .ok();
            }
            DecodedMessage::AidToNavigation { mmsi, nav_aid_type, name, position, dimensions } => {
                self.contacts
                    .update(mmsi, |c| {
                        c.name = Some(name);
                        c.ship_or_aid_type = Some(nav_aid_type);
                        if position.is_valid() {
                            c.position = Some(position);
                        }
                        if dimensions.length_m != 0 && dimensions.width_m != 0 {
                            c.dimensions = Some(dimensions);
                        }
                    })
                    .await
                    .ok();
            }
            DecodedMessage::StaticDataReportPartA { mmsi, name } => {
                self.contacts.update(mmsi, |c| c.name = Some(name)).await.ok();
            }
            DecodedMessage::StaticDataReportPartB { mmsi, ship_type, dimensions } => {
                self.contacts
                    .update(mmsi, |c| {
                        c.ship_or_aid_type = Some(ship_type);
                        if dimensions.length_m != 0 && dimensions.width_m != 0 {
                            c.dimensions = Some(dimensions);
                        }
                    })
                    .await
                    .ok();
            }
            DecodedMessage::Unhandled { msg_type } => {
                log::debug!("ignoring AIS message type {msg_type}");
                *self.unhandled_types.lock().await += 1;
            }
        }
    }
}

#[async_trait]
impl LineHandler for AisDecoder {
    async fn handle_line(&self, _talker: &Talker, msg_type: &str, _body: &str, fields: &[&str]) {
        let own_ship = match msg_type {
            "VDO" => true,
            "VDM" => false,
            _ => return,
        };
        let Some(vdm) = parse_vdm_vdo(own_ship, fields) else {
            return;
        };
        self.handle_vdm_vdo(vdm).await;
    }
}

#[async_trait]
impl StatsHolder for AisDecoder {
    async fn export_stats(&self, ms_elapsed: u32) {
        self.messages_counter.lock().await.update(&self.messages_leaf, &self.message_rate_leaf, ms_elapsed).await;
        self.unhandled_types_leaf.set_u32(*self.unhandled_types.lock().await).await;
        self.decode_errors_leaf.set_u32(*self.decode_errors.lock().await).await;
        self.contact_count_leaf.set_u32(self.contacts.len().await as u32).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ignores_own_ship_messages_for_contact_table() {
        let root = Node::new_root();
        let ais_node = root.add_node("ais").await;
        let decoder = AisDecoder::new(&ais_node, 10, Duration::from_secs(1)).await;

        decoder
            .apply(
                DecodedMessage::StaticDataReportPartA { mmsi: 123456789, name: "OWNSHIP".to_string() },
                true,
            )
            .await;
        assert_eq!(decoder.contacts().len().await, 0);
    }

    #[tokio::test]
    async fn records_contact_from_static_data_report() {
        let root = Node::new_root();
        let ais_node = root.add_node("ais").await;
        let decoder = AisDecoder::new(&ais_node, 10, Duration::from_secs(1)).await;

        decoder
            .apply(DecodedMessage::StaticDataReportPartA { mmsi: 987654321, name: "SEA BREEZE".to_string() }, false)
            .await;
        assert_eq!(decoder.contacts().len().await, 1);
        let snapshot = decoder.contacts().snapshot().await;
        assert_eq!(snapshot[0].name.as_deref(), Some("SEA BREEZE"));
    }

    #[tokio::test]
    async fn unhandled_types_are_counted() {
        let root = Node::new_root();
        let ais_node = root.add_node("ais").await;
        let decoder = AisDecoder::new(&ais_node, 10, Duration::from_secs(1)).await;
        decoder.apply(DecodedMessage::Unhandled { msg_type: 1 }, false).await;
        assert_eq!(*decoder.unhandled_types.lock().await, 1);
    }
}
