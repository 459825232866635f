use serde::{Deserialize, Serialize};
use sonic_rs::Value;

/// Screen names used by the two Flows.
pub mod screen {
    pub const REGISTER: &str = "REGISTER";
    pub const CONFIRM: &str = "CONFIRM";
    pub const VALIDATION: &str = "VALIDATION";
    pub const RESET_PIN: &str = "RESET_PIN";
    pub const CONFIRMATION: &str = "CONFIRMATION";
    pub const DONE: &str = "DONE";
    pub const UNKNOWN: &str = "UNKNOWN";
}

/// The raw encrypted Flow exchange as posted by the platform. Field names
/// are the wire format, do not rename.
#[derive(Deserialize, Debug)]
pub struct EncryptedFlowRequest {
    pub encrypted_flow_data: String,
    pub encrypted_aes_key: String,
    pub initial_vector: String,
}

/// The action carried by a decrypted Flow request.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlowAction {
    Ping,
    DataExchange,
    Navigate,
    Complete,
    #[serde(other)]
    #[default]
    Other,
}

/// A decrypted Flow request. The platform tracks no server-side screen
/// state: the current screen always arrives on the request.
#[derive(Deserialize, Debug)]
pub struct FlowRequest {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub screen: String,
    #[serde(default)]
    pub action: FlowAction,
    #[serde(default)]
    pub flow_token: String,
    #[serde(default)]
    pub data: Value,
}

/// The plaintext response envelope, encrypted before it leaves the process.
#[derive(Serialize, Debug)]
pub struct FlowResponse {
    pub version: String,
    pub screen: String,
    pub action: String,
    pub data: Value,
}

/// Which logical Flow an exchange belongs to. Closed set; a token matching
/// neither is rejected before any business logic runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowIdentity {
    Activation,
    ResetPin,
}

/// The configured flow_token values, one per Flow.
#[derive(Clone)]
pub struct FlowTokens {
    pub activation: String,
    pub reset_pin: String,
}

impl FlowTokens {
    /// Resolves a wire flow_token to its Flow, or `None` for an unknown or
    /// empty token.
    pub fn identify(&self, token: &str) -> Option<FlowIdentity> {
        if token.is_empty() {
            return None;
        }
        if token == self.activation {
            Some(FlowIdentity::Activation)
        } else if token == self.reset_pin {
            Some(FlowIdentity::ResetPin)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> FlowTokens {
        FlowTokens {
            activation: "tok-activate".to_string(),
            reset_pin: "tok-reset".to_string(),
        }
    }

    #[test]
    fn identify_matches_exactly_one_flow() {
        let t = tokens();
        assert_eq!(t.identify("tok-activate"), Some(FlowIdentity::Activation));
        assert_eq!(t.identify("tok-reset"), Some(FlowIdentity::ResetPin));
        assert_eq!(t.identify("tok-other"), None);
        assert_eq!(t.identify(""), None);
    }

    #[test]
    fn action_deserializes_from_wire_strings() {
        let req: FlowRequest = sonic_rs::from_str(
            r#"{"version":"3.0","screen":"REGISTER","action":"data_exchange","flow_token":"t","data":{}}"#,
        )
        .unwrap();
        assert_eq!(req.action, FlowAction::DataExchange);

        let ping: FlowRequest =
            sonic_rs::from_str(r#"{"action":"ping","screen":"X"}"#).unwrap();
        assert_eq!(ping.action, FlowAction::Ping);
        assert_eq!(ping.screen, "X");

        // Unknown actions fold into Other instead of failing the exchange.
        let other: FlowRequest = sonic_rs::from_str(r#"{"action":"back"}"#).unwrap();
        assert_eq!(other.action, FlowAction::Other);
    }
}
