//! Wuzapi (WhatsApp gateway) schema. Field names are PascalCase upstream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WuzapiSendText {
    #[serde(rename = "Phone")]
    pub phone: String,
    #[serde(rename = "Body")]
    pub body: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WuzapiResponse {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_text_uses_upstream_field_names() {
        let v = serde_json::to_value(WuzapiSendText {
            phone: "5511999999999".to_string(),
            body: "published".to_string(),
        })
        .unwrap();
        assert_eq!(v["Phone"], "5511999999999");
        assert_eq!(v["Body"], "published");
    }
}
