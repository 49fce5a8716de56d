//! Periodic AIS contact-table dump task, grounded on
//! `AISContacts::task()`'s `dumpContacts()` loop.

use std::sync::Arc;
use std::time::Duration;

use super::contact::ContactTable;

/// Runs forever, logging a one-line summary of each tracked contact
/// every `period`. The original only dumps when debug logging is
/// enabled for the AIS module; this keeps that by logging at debug
/// level so the task is cheap to leave running.
pub async fn run(contacts: Arc<ContactTable>, period: Duration) {
    loop {
        tokio::time::sleep(period).await;

        if !log::log_enabled!(log::Level::Debug) {
            continue;
        }

        let snapshot = contacts.snapshot().await;
        log::debug!("AIS contacts: {} tracked", snapshot.len());
        for contact in &snapshot {
            let name = contact.name.as_deref().unwrap_or("?");
            let position = contact
                .position
                .map(|p| format!("{:.4},{:.4}", p.latitude_degrees(), p.longitude_degrees()))
                .unwrap_or_else(|| "?".to_string());
            log::debug!("  mmsi {} name {} position {}", contact.mmsi, name, position);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test]
    async fn dump_task_runs_without_panicking() {
        let contacts = Arc::new(ContactTable::new(10, Duration::from_secs(1)));
        contacts.update(123456789, |c| c.name = Some("TEST".to_string())).await.unwrap();

        let result = timeout(Duration::from_millis(50), run(contacts, Duration::from_millis(10))).await;
        assert!(result.is_err(), "dump task should run forever, not return");
    }
}
