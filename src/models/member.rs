use serde::{Deserialize, Serialize};

/// Response codes the loyalty backend is known to return. Anything outside
/// this vocabulary maps to a generic "try again" message and is logged as an
/// anomaly.
pub mod response_code {
    /// Success.
    pub const OK: &str = "00";
    /// Auth token expired; re-login and retry.
    pub const TOKEN_EXPIRED: &str = "E004";
    /// Phone number already registered as a member.
    pub const ALREADY_REGISTERED: &str = "E050";
    /// Phone number is not a member.
    pub const NOT_A_MEMBER: &str = "E073";
    /// New PIN equals the previous PIN.
    pub const PIN_REUSED: &str = "E094";
    /// Terms and conditions not yet accepted.
    pub const TNC_NOT_ACCEPTED: &str = "E110";
}

/// One loyalty-backend reply. Read-mostly reference data scoped to a single
/// state-machine step; never cached.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct MemberRecord {
    #[serde(default)]
    pub response_code: String,
    #[serde(default)]
    pub card_number: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

impl MemberRecord {
    pub fn is_ok(&self) -> bool {
        self.response_code == response_code::OK
    }
}

/// The member-activation payload assembled from the REGISTER/CONFIRM
/// screens. All fields ride along even when empty; the backend's checksum
/// covers every one of them in this order.
#[derive(Serialize, Debug, Clone, Default)]
pub struct ActivationData {
    pub name: String,
    pub birth_date: String,
    pub phone_number: String,
    pub email: String,
    pub card_number: String,
    pub gender: String,
    pub marital: String,
    pub address: String,
}
