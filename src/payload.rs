//! The outbound JSON envelope posted to the sink (§4.8).

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Payload {
    pub from_ip: String,
    pub tty: String,
    pub file_path: String,
    pub change_type: String,
    pub username: String,
    pub timestamp: String,
    pub checksum: String,
    pub file_size: i64,
    pub before_size: i64,
    pub after_size: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_exact_wire_field_names() {
        let payload = Payload {
            from_ip: "10.0.0.1".into(),
            tty: "None".into(),
            file_path: "/tmp/w/a.txt".into(),
            change_type: "CREATE".into(),
            username: "root".into(),
            timestamp: "2026-07-27 01:02:03 PM".into(),
            checksum: "dummy".into(),
            file_size: 42,
            before_size: 0,
            after_size: 42,
        };
        let json = serde_json::to_value(&payload).unwrap();
        for field in [
            "from_ip",
            "tty",
            "file_path",
            "change_type",
            "username",
            "timestamp",
            "checksum",
            "file_size",
            "before_size",
            "after_size",
        ] {
            assert!(json.get(field).is_some(), "missing field {field}");
        }
    }
}
