//! The AIS contact table, grounded on
//! `components/AIS/AISContacts.cpp`, `AISContact.cpp`, `AISDimensions.cpp`
//! and `AISPosition.cpp`.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio::time::Duration;

use crate::error::LunaMonError;

pub const LARGE_VESSEL_LENGTH_M: u16 = 511;
pub const LARGE_VESSEL_WIDTH_M: u8 = 63;

/// Combined bow+stern / port+starboard dimensions with the "511/63 or
/// greater" sentinel collapsed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShipDimensions {
    pub length_m: u16,
    pub width_m: u8,
}

impl ShipDimensions {
    pub fn from_raw(to_bow: u16, to_stern: u16, to_port: u8, to_starboard: u8) -> Self {
        let length_m = if to_bow == 0 || to_stern == 0 {
            0
        } else if to_bow == LARGE_VESSEL_LENGTH_M || to_stern == LARGE_VESSEL_LENGTH_M {
            LARGE_VESSEL_LENGTH_M
        } else {
            to_bow + to_stern
        };

        let width_m = if to_port == 0 || to_starboard == 0 {
            0
        } else if to_port == LARGE_VESSEL_WIDTH_M || to_starboard == LARGE_VESSEL_WIDTH_M {
            LARGE_VESSEL_WIDTH_M
        } else {
            to_port + to_starboard
        };

        ShipDimensions { length_m, width_m }
    }
}

pub const LONGITUDE_UNKNOWN: i32 = 0x6791AC0u32 as i32;
pub const LATITUDE_UNKNOWN: i32 = 0x3412140;

/// A position in ten-thousandths of an arc-minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub longitude_ten_thousandths_minute: i32,
    pub latitude_ten_thousandths_minute: i32,
}

impl Position {
    pub fn from_raw(longitude_raw: i32, latitude_raw: i32) -> Self {
        Position { longitude_ten_thousandths_minute: longitude_raw, latitude_ten_thousandths_minute: latitude_raw }
    }

    pub fn is_valid(&self) -> bool {
        self.longitude_ten_thousandths_minute != LONGITUDE_UNKNOWN && self.latitude_ten_thousandths_minute != LATITUDE_UNKNOWN
    }

    pub fn longitude_degrees(&self) -> f64 {
        self.longitude_ten_thousandths_minute as f64 / (10_000.0 * 60.0)
    }

    pub fn latitude_degrees(&self) -> f64 {
        self.latitude_ten_thousandths_minute as f64 / (10_000.0 * 60.0)
    }

    /// Great-circle distance in nautical miles via the spherical law of
    /// cosines/haversine, Earth radius 3440 NM. Explicitly approximate,
    /// not spheroidal.
    pub fn distance_nm(&self, other: &Position) -> f64 {
        const EARTH_RADIUS_NM: f64 = 3440.0;

        let lat1 = self.latitude_degrees().to_radians();
        let lat2 = other.latitude_degrees().to_radians();
        let delta_lat = (other.latitude_degrees() - self.latitude_degrees()).to_radians();
        let delta_lon = (other.longitude_degrees() - self.longitude_degrees()).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_NM * c
    }
}

pub const AUXILIARY_CRAFT_MMSI_MIN: u32 = 980_000_000;
pub const AUXILIARY_CRAFT_MMSI_MAX: u32 = 990_000_000;

pub fn is_auxiliary_craft_mmsi(mmsi: u32) -> bool {
    (AUXILIARY_CRAFT_MMSI_MIN..AUXILIARY_CRAFT_MMSI_MAX).contains(&mmsi)
}

/// One tracked vessel or aid-to-navigation, updated in place as
/// successive messages about the same MMSI arrive: the contact's name,
/// ship/aid type, and dimensions are updated in place.
#[derive(Debug, Clone, Default)]
pub struct Contact {
    pub mmsi: u32,
    pub name: Option<String>,
    pub ship_or_aid_type: Option<u8>,
    pub dimensions: Option<ShipDimensions>,
    pub position: Option<Position>,
}

impl Contact {
    fn new(mmsi: u32) -> Self {
        Contact { mmsi, ..Default::default() }
    }
}

/// Fixed-capacity contact table keyed by MMSI. New contacts beyond
/// `max_contacts` are rejected rather than evicting an existing one:
/// when the pool is full, the message is counted and dropped.
pub struct ContactTable {
    contacts: Mutex<HashMap<u32, Contact>>,
    max_contacts: usize,
    lock_timeout: Duration,
    dropped_full_pool: Mutex<u32>,
}

impl ContactTable {
    pub fn new(max_contacts: usize, lock_timeout: Duration) -> Self {
        ContactTable {
            contacts: Mutex::new(HashMap::new()),
            max_contacts,
            lock_timeout,
            dropped_full_pool: Mutex::new(0),
        }
    }

    /// Applies `update` to the contact for `mmsi`, creating it if the
    /// pool has room. The 60-second mutex ceiling is implemented as a
    /// fatal error rather than silently proceeding, since exceeding it
    /// indicates a stuck holder.
    pub async fn update<F>(&self, mmsi: u32, update: F) -> Result<(), LunaMonError>
    where
        F: FnOnce(&mut Contact),
    {
        let mut contacts = tokio::time::timeout(self.lock_timeout, self.contacts.lock())
            .await
            .map_err(|_| LunaMonError::Hardware("AIS contact table lock timed out".into()))?;

        if let Some(contact) = contacts.get_mut(&mmsi) {
            update(contact);
            return Ok(());
        }

        if contacts.len() >= self.max_contacts {
            drop(contacts);
            *self.dropped_full_pool.lock().await += 1;
            log::warn!("AIS contact pool full, dropping update for mmsi {mmsi}");
            return Ok(());
        }

        let mut contact = Contact::new(mmsi);
        update(&mut contact);
        contacts.insert(mmsi, contact);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.contacts.lock().await.len()
    }

    pub async fn snapshot(&self) -> Vec<Contact> {
        self.contacts.lock().await.values().cloned().collect()
    }

    pub async fn dropped_full_pool_count(&self) -> u32 {
        *self.dropped_full_pool.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_apply_sentinel() {
        let d = ShipDimensions::from_raw(511, 20, 10, 10);
        assert_eq!(d.length_m, LARGE_VESSEL_LENGTH_M);
        let d2 = ShipDimensions::from_raw(100, 20, 0, 10);
        assert_eq!(d2.width_m, 0);
        let d3 = ShipDimensions::from_raw(100, 20, 10, 20);
        assert_eq!(d3.length_m, 120);
        assert_eq!(d3.width_m, 30);
    }

    #[test]
    fn auxiliary_mmsi_range() {
        assert!(is_auxiliary_craft_mmsi(985_123_456));
        assert!(!is_auxiliary_craft_mmsi(990_000_000));
        assert!(!is_auxiliary_craft_mmsi(123_456_789));
    }

    #[test]
    fn distance_between_same_point_is_zero() {
        let p = Position::from_raw(1_000_000, 1_000_000);
        assert!(p.distance_nm(&p) < 1e-6);
    }

    #[tokio::test]
    async fn pool_exhaustion_is_counted_not_panicked() {
        let table = ContactTable::new(1, Duration::from_secs(1));
        table.update(111, |c| c.name = Some("A".into())).await.unwrap();
        table.update(222, |c| c.name = Some("B".into())).await.unwrap();
        assert_eq!(table.len().await, 1);
        assert_eq!(table.dropped_full_pool_count().await, 1);
    }

    #[tokio::test]
    async fn update_in_place_is_idempotent_on_identity() {
        let table = ContactTable::new(10, Duration::from_secs(1));
        table.update(111, |c| c.name = Some("First".into())).await.unwrap();
        table.update(111, |c| c.name = Some("Updated".into())).await.unwrap();
        assert_eq!(table.len().await, 1);
        let snapshot = table.snapshot().await;
        assert_eq!(snapshot[0].name.as_deref(), Some("Updated"));
    }
}
