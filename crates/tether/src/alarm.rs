use std::fmt;

use chrono::{DateTime, Utc};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// An alarm reported by a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    /// Identifier of the reporting device.
    pub device_id: String,
    /// Alarm type.
    pub alarm_type: String,
    /// Alarm details.
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub alarm_info: JsonValue,
    /// Report time, in milliseconds since the Unix epoch.
    pub report_time: i64,
}

impl Alarm {
    /// Creates an [`Alarm`] reported now.
    #[must_use]
    pub fn new(device_id: &str, alarm_type: &str, alarm_info: JsonValue) -> Self {
        Self {
            device_id: device_id.into(),
            alarm_type: alarm_type.into(),
            alarm_info,
            report_time: Utc::now().timestamp_millis(),
        }
    }

    /// Returns the report time.
    ///
    /// Out of range timestamps are reported as `None`.
    #[must_use]
    pub fn reported_at(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.report_time)
    }
}

impl fmt::Display for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Device: \"{}\"", self.device_id)?;
        writeln!(f, "Type: \"{}\"", self.alarm_type)?;
        if !self.alarm_info.is_null() {
            writeln!(f, "Info: {}", self.alarm_info)?;
        }
        match self.reported_at() {
            Some(time) => writeln!(f, "Reported: {}", time.to_rfc3339()),
            None => writeln!(f, "Reported: {}", self.report_time),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{deserialize, serialize};

    use super::Alarm;

    #[test]
    fn alarm_format() {
        let alarm = Alarm {
            device_id: "d1".into(),
            alarm_type: "overheat".into(),
            alarm_info: json!({ "temperature": 80.5 }),
            report_time: 1_000,
        };

        assert_eq!(
            serialize(&alarm),
            json!({
                "deviceId": "d1",
                "alarmType": "overheat",
                "alarmInfo": { "temperature": 80.5 },
                "reportTime": 1_000,
            })
        );
        assert_eq!(deserialize::<Alarm>(serialize(&alarm)), alarm);
        assert_eq!(
            alarm.reported_at().map(|time| time.timestamp_millis()),
            Some(1_000)
        );
    }
}
