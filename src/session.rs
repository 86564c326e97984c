//! Session context: the capture-time system snapshot.
//!
//! The capture shell exports the machine state at screenshot time as
//! `SCRIBE_*` environment variables (active app, battery, network, displays,
//! timestamps, optional location). This module reads that snapshot once per
//! batch and turns it into the prompt-context fields and the synthesized
//! `timestamp` / `location` / `system_metadata` sections of a record.
//!
//! The snapshot is taken once and shared read-only across workers, so every
//! item in a batch sees identical session facts and the metadata merge stays
//! idempotent.

use chrono::{Datelike, Local, Timelike, Utc};
use serde_json::{json, Value};
use std::env;

/// A read-only snapshot of the capture-time environment.
///
/// Every field has a defensive default so a bare environment (for example in
/// tests, or when re-analyzing old screenshots on another machine) still
/// produces a complete record.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub active_app: String,
    pub opened_apps: Vec<String>,
    pub battery_status: String,
    pub battery_percent: i64,
    pub is_plugged: bool,
    pub volume: i64,
    pub audio_muted: bool,
    pub audio_inputs: Value,
    pub audio_outputs: Value,
    pub video_sources: Value,
    pub ram_total: i64,
    pub ram_used: i64,
    pub ram_free: i64,
    pub storage_total: i64,
    pub storage_used: i64,
    pub storage_free: i64,
    pub cpu_cores: i64,
    pub cpu_used: f64,
    pub cpu_idle: f64,
    pub network_connected: bool,
    pub network_type: String,
    pub network_ssid: String,
    pub network_local_ip: String,
    pub network_signal: i64,
    pub network_link_speed: i64,
    pub network_rx_bytes: i64,
    pub network_tx_bytes: i64,
    pub network_channel: i64,
    pub network_bssid: String,
    pub brightness: i64,
    pub dark_mode: bool,
    pub external_displays: Value,
    pub idle_seconds: f64,
    pub timestamp_iso: String,
    pub timestamp_unix_ms: i64,
    pub timezone: String,
    pub day_of_week: String,
    pub time_of_day: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_name: Option<String>,
}

fn env_str(key: &str, default: &str) -> String {
    env::var(key).ok().filter(|s| !s.is_empty()).unwrap_or_else(|| default.to_string())
}

fn env_i64(key: &str) -> i64 {
    env::var(key).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(0)
}

fn env_f64(key: &str) -> f64 {
    env::var(key).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(0.0)
}

fn env_bool(key: &str) -> bool {
    env::var(key).map(|s| s == "true").unwrap_or(false)
}

fn env_json_array(key: &str) -> Value {
    env::var(key)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .filter(Value::is_array)
        .unwrap_or_else(|| json!([]))
}

/// Bucket an hour-of-day the way the capture shell does.
fn time_of_day_for_hour(hour: u32) -> &'static str {
    match hour {
        5..=11 => "morning",
        12..=16 => "afternoon",
        17..=20 => "evening",
        _ => "night",
    }
}

impl Default for SessionContext {
    /// A snapshot with nothing reported, as when re-analyzing old captures
    /// outside the capture shell.
    fn default() -> Self {
        Self {
            active_app: "Unknown".to_string(),
            opened_apps: Vec::new(),
            battery_status: "Unknown".to_string(),
            battery_percent: 0,
            is_plugged: false,
            volume: 0,
            audio_muted: false,
            audio_inputs: json!([]),
            audio_outputs: json!([]),
            video_sources: json!([]),
            ram_total: 0,
            ram_used: 0,
            ram_free: 0,
            storage_total: 0,
            storage_used: 0,
            storage_free: 0,
            cpu_cores: 0,
            cpu_used: 0.0,
            cpu_idle: 0.0,
            network_connected: false,
            network_type: "unknown".to_string(),
            network_ssid: String::new(),
            network_local_ip: String::new(),
            network_signal: 0,
            network_link_speed: 0,
            network_rx_bytes: 0,
            network_tx_bytes: 0,
            network_channel: 0,
            network_bssid: String::new(),
            brightness: -1,
            dark_mode: false,
            external_displays: json!([]),
            idle_seconds: 0.0,
            timestamp_iso: String::new(),
            timestamp_unix_ms: 0,
            timezone: String::new(),
            day_of_week: String::new(),
            time_of_day: "unknown".to_string(),
            latitude: None,
            longitude: None,
            location_name: None,
        }
    }
}

impl SessionContext {
    /// Snapshot the `SCRIBE_*` environment, synthesizing time facts from the
    /// local clock where the capture shell did not provide them.
    pub fn from_env() -> Self {
        let now_local = Local::now();
        let now_utc = Utc::now();

        let opened_apps: Vec<String> = env::var("SCRIBE_OPENED_APPS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        let latitude = env::var("SCRIBE_LATITUDE").ok().and_then(|s| s.trim().parse().ok());
        let longitude = env::var("SCRIBE_LONGITUDE").ok().and_then(|s| s.trim().parse().ok());
        let location_name = env::var("SCRIBE_LOCATION_NAME")
            .or_else(|_| env::var("SCRIBE_LOCATION"))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Self {
            active_app: env_str("SCRIBE_ACTIVE_APP", "Unknown"),
            opened_apps,
            battery_status: env_str("SCRIBE_BATTERY", "Unknown"),
            battery_percent: env_i64("SCRIBE_BATTERY_PERCENT"),
            is_plugged: env_bool("SCRIBE_IS_PLUGGED"),
            volume: env_i64("SCRIBE_VOLUME"),
            audio_muted: env_bool("SCRIBE_AUDIO_MUTED"),
            audio_inputs: env_json_array("SCRIBE_AUDIO_INPUTS"),
            audio_outputs: env_json_array("SCRIBE_AUDIO_OUTPUTS"),
            video_sources: env_json_array("SCRIBE_VIDEO_SOURCES"),
            ram_total: env_i64("SCRIBE_RAM_TOTAL"),
            ram_used: env_i64("SCRIBE_RAM_USED"),
            ram_free: env_i64("SCRIBE_RAM_FREE"),
            storage_total: env_i64("SCRIBE_STORAGE_TOTAL"),
            storage_used: env_i64("SCRIBE_STORAGE_USED"),
            storage_free: env_i64("SCRIBE_STORAGE_FREE"),
            cpu_cores: env_i64("SCRIBE_CPU_CORES"),
            cpu_used: env_f64("SCRIBE_CPU_USED"),
            cpu_idle: env_f64("SCRIBE_CPU_IDLE"),
            network_connected: env_bool("SCRIBE_NETWORK_CONNECTED"),
            network_type: env_str("SCRIBE_NETWORK_TYPE", "unknown"),
            network_ssid: env::var("SCRIBE_NETWORK_SSID").unwrap_or_default(),
            network_local_ip: env::var("SCRIBE_NETWORK_LOCAL_IP").unwrap_or_default(),
            network_signal: env_i64("SCRIBE_NETWORK_SIGNAL"),
            network_link_speed: env_i64("SCRIBE_NETWORK_LINK_SPEED"),
            network_rx_bytes: env_i64("SCRIBE_NETWORK_RX_BYTES"),
            network_tx_bytes: env_i64("SCRIBE_NETWORK_TX_BYTES"),
            network_channel: env_i64("SCRIBE_NETWORK_CHANNEL"),
            network_bssid: env::var("SCRIBE_NETWORK_BSSID").unwrap_or_default(),
            brightness: env::var("SCRIBE_BRIGHTNESS")
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(-1),
            dark_mode: env_bool("SCRIBE_DARK_MODE"),
            external_displays: env_json_array("SCRIBE_EXTERNAL_DISPLAYS"),
            idle_seconds: env_f64("SCRIBE_IDLE_SECONDS"),
            timestamp_iso: env_str(
                "SCRIBE_TIMESTAMP_ISO",
                &now_utc.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            ),
            timestamp_unix_ms: {
                let v = env_i64("SCRIBE_TIMESTAMP_UNIX");
                if v > 0 { v } else { now_utc.timestamp_millis() }
            },
            timezone: env_str("SCRIBE_TIMEZONE", &now_local.offset().to_string()),
            day_of_week: env_str("SCRIBE_DAY_OF_WEEK", &now_local.weekday().to_string()),
            time_of_day: env_str(
                "SCRIBE_TIME_OF_DAY",
                time_of_day_for_hour(now_local.hour()),
            ),
            latitude,
            longitude,
            location_name,
        }
    }

    /// The `timestamp` section of a freshly analyzed record.
    pub fn timestamp_value(&self) -> Value {
        json!({
            "iso": self.timestamp_iso,
            "unix_ms": self.timestamp_unix_ms,
            "timezone": self.timezone,
            "day_of_week": self.day_of_week,
            "time_of_day": self.time_of_day,
        })
    }

    /// The `location` section, if the capture shell knew where it was.
    pub fn location_value(&self) -> Option<Value> {
        let (lat, lon) = (self.latitude?, self.longitude?);
        let mut loc = json!({ "latitude": lat, "longitude": lon });
        if let Some(ref name) = self.location_name {
            loc["name"] = json!(name);
        }
        Some(loc)
    }

    /// The full `system_metadata` section of a freshly analyzed record.
    pub fn system_metadata_value(&self) -> Value {
        let mut network = json!({
            "connected": self.network_connected,
            "type": self.network_type,
            "local_ip": self.network_local_ip,
            "rx_bytes": self.network_rx_bytes,
            "tx_bytes": self.network_tx_bytes,
        });
        if !self.network_ssid.is_empty() {
            network["ssid"] = json!(self.network_ssid);
        }
        if self.network_signal != 0 {
            network["signal_strength"] = json!(self.network_signal);
        }
        if self.network_link_speed > 0 {
            network["link_speed"] = json!(self.network_link_speed);
        }
        if self.network_channel > 0 {
            network["channel"] = json!(self.network_channel);
        }
        if !self.network_bssid.is_empty() {
            network["bssid"] = json!(self.network_bssid);
        }

        let mut display = json!({
            "dark_mode": self.dark_mode,
            "external_displays": self.external_displays,
        });
        if self.brightness >= 0 {
            display["brightness"] = json!(self.brightness);
        }

        json!({
            "active_app": self.active_app,
            "opened_apps": self.opened_apps,
            "audio": {
                "volume": self.volume,
                "is_muted": self.audio_muted,
                "inputs": self.audio_inputs,
                "outputs": self.audio_outputs,
            },
            "video": { "sources": self.video_sources },
            "stats": {
                "battery": {
                    "percentage": self.battery_percent,
                    "isPlugged": self.is_plugged,
                },
                "ram": { "total": self.ram_total, "used": self.ram_used, "free": self.ram_free },
                "storage": {
                    "total": self.storage_total,
                    "used": self.storage_used,
                    "free": self.storage_free,
                },
                "cpu": { "cores": self.cpu_cores, "used": self.cpu_used, "idle": self.cpu_idle },
                "network": network,
                "display": display,
                "input": { "idle_seconds": self.idle_seconds },
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_context() -> SessionContext {
        SessionContext {
            active_app: "Terminal".into(),
            opened_apps: vec!["Terminal".into(), "Firefox".into()],
            battery_status: "Discharging".into(),
            battery_percent: 73,
            is_plugged: false,
            volume: 40,
            audio_muted: false,
            audio_inputs: json!([]),
            audio_outputs: json!([]),
            video_sources: json!([]),
            ram_total: 32,
            ram_used: 17,
            ram_free: 15,
            storage_total: 1000,
            storage_used: 512,
            storage_free: 488,
            cpu_cores: 10,
            cpu_used: 21.5,
            cpu_idle: 78.5,
            network_connected: true,
            network_type: "wifi".into(),
            network_ssid: String::new(),
            network_local_ip: "192.168.1.4".into(),
            network_signal: 0,
            network_link_speed: 0,
            network_rx_bytes: 0,
            network_tx_bytes: 0,
            network_channel: 0,
            network_bssid: String::new(),
            brightness: -1,
            dark_mode: true,
            external_displays: json!([]),
            idle_seconds: 3.2,
            timestamp_iso: "2026-08-30T10:15:00.000Z".into(),
            timestamp_unix_ms: 1787825700000,
            timezone: "Europe/Berlin".into(),
            day_of_week: "Sunday".into(),
            time_of_day: "morning".into(),
            latitude: None,
            longitude: None,
            location_name: None,
        }
    }

    #[test]
    fn timestamp_value_shape() {
        let ts = bare_context().timestamp_value();
        assert_eq!(ts["iso"], "2026-08-30T10:15:00.000Z");
        assert_eq!(ts["unix_ms"], 1787825700000i64);
        assert_eq!(ts["day_of_week"], "Sunday");
    }

    #[test]
    fn location_absent_without_coordinates() {
        assert!(bare_context().location_value().is_none());
    }

    #[test]
    fn location_includes_optional_name() {
        let mut ctx = bare_context();
        ctx.latitude = Some(52.52);
        ctx.longitude = Some(13.405);
        ctx.location_name = Some("Berlin".into());
        let loc = ctx.location_value().unwrap();
        assert_eq!(loc["latitude"], 52.52);
        assert_eq!(loc["name"], "Berlin");
    }

    #[test]
    fn system_metadata_omits_unset_optionals() {
        let meta = bare_context().system_metadata_value();
        assert_eq!(meta["active_app"], "Terminal");
        assert_eq!(meta["stats"]["battery"]["percentage"], 73);
        // No ssid, no brightness when the shell did not report them.
        assert!(meta["stats"]["network"].get("ssid").is_none());
        assert!(meta["stats"]["display"].get("brightness").is_none());
    }

    #[test]
    fn time_of_day_buckets() {
        assert_eq!(time_of_day_for_hour(6), "morning");
        assert_eq!(time_of_day_for_hour(13), "afternoon");
        assert_eq!(time_of_day_for_hour(19), "evening");
        assert_eq!(time_of_day_for_hour(2), "night");
        assert_eq!(time_of_day_for_hour(23), "night");
    }
}
