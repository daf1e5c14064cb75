#![allow(dead_code)]

use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use serde_json::Value;
use summary_core::{Envelope, SettingKey};
use summary_relay::{MemorySettings, Port, RelayConfig, SenderInfo, TabOpener};

pub const EXTENSION_ID: &str = "summary-relay-test";
pub const TEST_UID: &str = "uid-0001";

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(relay_logging::initialize_for_tests);
}

pub fn config(base_url: &str) -> RelayConfig {
    init_logging();
    RelayConfig {
        base_url: base_url.to_string(),
        extension_id: EXTENSION_ID.to_string(),
        extension_version: "9.9.9".to_string(),
        retry_delay: Duration::from_millis(20),
        ..RelayConfig::default()
    }
}

pub fn extension() -> SenderInfo {
    SenderInfo::new(EXTENSION_ID)
}

pub fn settings_with_uid() -> Arc<MemorySettings> {
    Arc::new(MemorySettings::with_values([(
        SettingKey::Uid,
        TEST_UID.to_string(),
    )]))
}

#[derive(Default)]
pub struct RecordingTabs {
    opened: Mutex<Vec<String>>,
}

impl RecordingTabs {
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl TabOpener for RecordingTabs {
    fn open_tab(&self, url: &str) {
        self.opened.lock().unwrap().push(url.to_string());
    }
}

/// Encodes `(event, data)` pairs as a `text/event-stream` body.
pub fn sse_body(events: &[(&str, &str)]) -> String {
    events
        .iter()
        .map(|(event, data)| format!("event: {event}\ndata: {data}\n\n"))
        .collect()
}

pub fn chapter_json(cid: &str, start: f64, summary: &str) -> Value {
    serde_json::json!({
        "cid": cid,
        "vid": "videoABC",
        "slicer": "default",
        "style": "markdown",
        "start": start,
        "lang": "en",
        "chapter": format!("Chapter {cid}"),
        "summary": summary,
    })
}

/// Drains a port until it disconnects, decoding every frame.
pub async fn collect(port: &mut Port) -> Vec<Envelope> {
    let mut envelopes = Vec::new();
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), port.recv())
            .await
            .expect("port did not close in time");
        match frame {
            Some(frame) => envelopes.push(Envelope::from_value(frame).expect("valid envelope")),
            None => return envelopes,
        }
    }
}
