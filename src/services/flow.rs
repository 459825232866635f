use sonic_rs::{JsonValueTrait, Value, json};

use crate::error::Result;
use crate::models::flow::{
    FlowAction, FlowIdentity, FlowRequest, FlowResponse, FlowTokens, screen,
};
use crate::models::member::{ActivationData, response_code};
use crate::services::pin_policy::{parse_birth_date, validate_pin};
use crate::services::plms::MembershipApi;

/// Flow data API version answered when the request carries none.
const DEFAULT_VERSION: &str = "3.0";

/// User-facing messages, one per rejection cause.
mod msg {
    pub const NAME_REQUIRED: &str = "Nama wajib diisi";
    pub const BIRTH_DATE_REQUIRED: &str = "Tanggal lahir wajib diisi";
    pub const PHONE_REQUIRED: &str = "Nomor telepon wajib diisi";
    pub const NOT_A_MEMBER: &str = "Nomor Anda belum terdaftar sebagai member";
    pub const BIRTH_DATE_MISMATCH: &str = "Tanggal lahir tidak sesuai dengan data member";
    pub const PIN_REUSED: &str = "PIN tidak boleh sama dengan PIN sebelumnya";
    pub const TNC_NOT_ACCEPTED: &str = "Anda belum mensetujui syarat dan ketentuan member.";
    pub const GENERIC_RETRY: &str = "Terjadi gangguan. Mohon coba lagi.";
    pub const UNKNOWN_FLOW: &str = "Flow tidak dikenali";
    pub const ACTIVATION_DONE: &str = "Pendaftaran member berhasil.";
    pub const PIN_RESET_DONE: &str = "PIN Anda berhasil diubah.";
}

/// The outcome of one screen submission. Exactly one `*_error` field is
/// populated on `Reject`; `Advance` carries the data the next screen needs
/// (the platform holds no server-side state between turns).
enum ScreenOutcome {
    Advance { screen: &'static str, data: Value },
    Reject { screen: &'static str, data: Value },
    Done { data: Value },
    Unknown,
}

impl ScreenOutcome {
    fn into_response(self, version: String) -> FlowResponse {
        match self {
            ScreenOutcome::Advance { screen, data } | ScreenOutcome::Reject { screen, data } => {
                FlowResponse {
                    version,
                    screen: screen.to_string(),
                    action: "update".to_string(),
                    data,
                }
            }
            ScreenOutcome::Done { data } => FlowResponse {
                version,
                screen: screen::DONE.to_string(),
                action: "complete".to_string(),
                data,
            },
            ScreenOutcome::Unknown => FlowResponse {
                version,
                screen: screen::UNKNOWN.to_string(),
                action: "error".to_string(),
                data: json!({ "error_message": msg::UNKNOWN_FLOW }),
            },
        }
    }
}

/// Extracts a string field from screen form data, empty when absent.
fn field<'a>(data: &'a Value, key: &str) -> &'a str {
    data.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

/// Pure decision logic for both Flows. Stateless between calls: the current
/// screen arrives on every request and never assumes continuity it was not
/// handed.
#[derive(Clone)]
pub struct FlowEngine<M: MembershipApi> {
    api: M,
    tokens: FlowTokens,
}

impl<M: MembershipApi> FlowEngine<M> {
    pub fn new(api: M, tokens: FlowTokens) -> Self {
        Self { api, tokens }
    }

    /// Maps one decrypted request to its response envelope.
    pub async fn handle(&self, req: FlowRequest) -> Result<FlowResponse> {
        let version = if req.version.is_empty() {
            DEFAULT_VERSION.to_string()
        } else {
            req.version.clone()
        };

        // Health pings come in without a business token, so this check must
        // precede token validation.
        if req.action == FlowAction::Ping {
            return Ok(FlowResponse {
                version,
                screen: req.screen,
                action: "ping".to_string(),
                data: json!({ "status": "active" }),
            });
        }

        let Some(identity) = self.tokens.identify(&req.flow_token) else {
            tracing::warn!("Rejected exchange with unknown flow_token");
            return Ok(ScreenOutcome::Unknown.into_response(version));
        };

        let outcome = match (identity, req.screen.as_str()) {
            (FlowIdentity::Activation, screen::REGISTER) => self.register(&req.data),
            (FlowIdentity::Activation, screen::CONFIRM) => {
                self.commit_activation(&req.data).await?
            }
            (FlowIdentity::ResetPin, screen::VALIDATION) => {
                self.validate_identity(&req.data).await?
            }
            (FlowIdentity::ResetPin, screen::RESET_PIN) => self.choose_pin(&req.data),
            (FlowIdentity::ResetPin, screen::CONFIRMATION) => self.commit_pin(&req.data).await?,
            (identity, other) => {
                tracing::warn!("Screen {} does not belong to {:?}", other, identity);
                ScreenOutcome::Unknown
            }
        };

        Ok(outcome.into_response(version))
    }

    /// ACTIVATION / REGISTER: require name and birth date, then hand off to
    /// the confirmation screen.
    fn register(&self, data: &Value) -> ScreenOutcome {
        let name = field(data, "name");
        let birth_date = field(data, "birth_date");
        let phone_number = field(data, "phone_number");

        let name_error = if name.is_empty() { msg::NAME_REQUIRED } else { "" };
        let birth_date_error = if birth_date.is_empty() {
            msg::BIRTH_DATE_REQUIRED
        } else {
            ""
        };

        if !name_error.is_empty() || !birth_date_error.is_empty() {
            return ScreenOutcome::Reject {
                screen: screen::REGISTER,
                data: json!({
                    "name_error": name_error,
                    "birth_date_error": birth_date_error,
                    "phone_number": phone_number,
                }),
            };
        }

        ScreenOutcome::Advance {
            screen: screen::CONFIRM,
            data: json!({
                "name": name,
                "birth_date": birth_date,
                "phone_number": phone_number,
            }),
        }
    }

    /// ACTIVATION / CONFIRM: commit the registration to the loyalty backend.
    async fn commit_activation(&self, data: &Value) -> Result<ScreenOutcome> {
        let registration = ActivationData {
            name: field(data, "name").to_string(),
            birth_date: field(data, "birth_date").to_string(),
            phone_number: field(data, "phone_number").to_string(),
            email: field(data, "email").to_string(),
            card_number: field(data, "card_number").to_string(),
            gender: field(data, "gender").to_string(),
            marital: field(data, "marital").to_string(),
            address: field(data, "address").to_string(),
        };

        if registration.name.is_empty() || registration.birth_date.is_empty() {
            // A CONFIRM submission without the REGISTER payload means the
            // client skipped a screen; send it back to the start.
            return Ok(ScreenOutcome::Reject {
                screen: screen::REGISTER,
                data: json!({ "name_error": msg::NAME_REQUIRED, "birth_date_error": "" }),
            });
        }

        let record = self.api.member_activation(&registration).await?;
        match record.response_code.as_str() {
            response_code::OK => {
                let data = match self.accept_terms(&registration.phone_number).await {
                    Some(terms_message) => json!({
                        "success_message": msg::ACTIVATION_DONE,
                        "terms_message": terms_message,
                    }),
                    None => json!({ "success_message": msg::ACTIVATION_DONE }),
                };
                Ok(ScreenOutcome::Done { data })
            }
            response_code::ALREADY_REGISTERED => Ok(ScreenOutcome::Reject {
                screen: screen::CONFIRM,
                data: json!({
                    "error_message": format!(
                        "Nomor {} telah terdaftar sebagai member.",
                        registration.phone_number
                    ),
                }),
            }),
            code => {
                tracing::warn!("Unexpected activation response_code {}", code);
                Ok(ScreenOutcome::Reject {
                    screen: screen::CONFIRM,
                    data: json!({ "error_message": msg::GENERIC_RETRY }),
                })
            }
        }
    }

    /// Best-effort terms acceptance after a successful registration: inquiry
    /// then commit, as the backend requires. Returns the note for the DONE
    /// screen when the terms are still pending; never fails the activation.
    async fn accept_terms(&self, phone_number: &str) -> Option<&'static str> {
        let inquiry = match self.api.tnc_inquiry(phone_number).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("TnC inquiry failed for {}: {}", phone_number, e);
                return None;
            }
        };

        match inquiry.response_code.as_str() {
            response_code::OK => {
                if let Err(e) = self.api.tnc_commit(phone_number).await {
                    tracing::warn!("TnC commit failed for {}: {}", phone_number, e);
                }
                None
            }
            response_code::TNC_NOT_ACCEPTED => Some(msg::TNC_NOT_ACCEPTED),
            code => {
                tracing::warn!("Unexpected tnc_inquiry response_code {}", code);
                None
            }
        }
    }

    /// RESET_PIN / VALIDATION: the claimed birth date must match the member
    /// record before the PIN screens become reachable.
    async fn validate_identity(&self, data: &Value) -> Result<ScreenOutcome> {
        let phone_number = field(data, "phone_number");
        let claimed = field(data, "birth_date");

        if phone_number.is_empty() {
            return Ok(ScreenOutcome::Reject {
                screen: screen::VALIDATION,
                data: json!({ "phone_number_error": msg::PHONE_REQUIRED, "birth_date": claimed }),
            });
        }
        if claimed.is_empty() {
            return Ok(ScreenOutcome::Reject {
                screen: screen::VALIDATION,
                data: json!({
                    "birth_date_error": msg::BIRTH_DATE_REQUIRED,
                    "phone_number": phone_number,
                }),
            });
        }

        let membership = self.api.validate_member(phone_number).await?;
        match membership.response_code.as_str() {
            response_code::OK => {}
            response_code::NOT_A_MEMBER => {
                return Ok(ScreenOutcome::Reject {
                    screen: screen::VALIDATION,
                    data: json!({
                        "phone_number_error": msg::NOT_A_MEMBER,
                        "birth_date": claimed,
                    }),
                });
            }
            code => {
                tracing::warn!("Unexpected validate_member response_code {}", code);
                return Ok(ScreenOutcome::Reject {
                    screen: screen::VALIDATION,
                    data: json!({
                        "error_message": msg::GENERIC_RETRY,
                        "phone_number": phone_number,
                        "birth_date": claimed,
                    }),
                });
            }
        }

        let record = self.api.inquiry(phone_number).await?;
        let matches = match (
            parse_birth_date(claimed),
            record.birth_date.as_deref().and_then(parse_birth_date),
        ) {
            (Some(claimed), Some(actual)) => claimed == actual,
            _ => false,
        };

        if !record.is_ok() || !matches {
            return Ok(ScreenOutcome::Reject {
                screen: screen::VALIDATION,
                data: json!({
                    "birth_date_error": msg::BIRTH_DATE_MISMATCH,
                    "phone_number": phone_number,
                }),
            });
        }

        tracing::debug!(
            "Identity verified for card {}",
            record.card_number.as_deref().unwrap_or("-")
        );

        Ok(ScreenOutcome::Advance {
            screen: screen::RESET_PIN,
            data: json!({ "phone_number": phone_number, "birth_date": claimed }),
        })
    }

    /// RESET_PIN / RESET_PIN: run the PIN policy; the new PIN rides along to
    /// the confirmation screen inside the encrypted payload.
    fn choose_pin(&self, data: &Value) -> ScreenOutcome {
        let pin = field(data, "pin");
        let confirm_pin = field(data, "confirm_pin");
        let phone_number = field(data, "phone_number");
        let birth_date = field(data, "birth_date");

        let birth = (!birth_date.is_empty()).then_some(birth_date);
        match validate_pin(pin, confirm_pin, birth) {
            Err(violation) => ScreenOutcome::Reject {
                screen: screen::RESET_PIN,
                data: json!({
                    "pin_error": violation.message(),
                    "phone_number": phone_number,
                    "birth_date": birth_date,
                }),
            },
            Ok(()) => ScreenOutcome::Advance {
                screen: screen::CONFIRMATION,
                data: json!({
                    "phone_number": phone_number,
                    "birth_date": birth_date,
                    "pin": pin,
                }),
            },
        }
    }

    /// RESET_PIN / CONFIRMATION: final commit to the loyalty backend.
    async fn commit_pin(&self, data: &Value) -> Result<ScreenOutcome> {
        let phone_number = field(data, "phone_number");
        let birth_date = field(data, "birth_date");
        let pin = field(data, "pin");

        if phone_number.is_empty() || pin.is_empty() {
            return Ok(ScreenOutcome::Reject {
                screen: screen::CONFIRMATION,
                data: json!({ "error_message": msg::GENERIC_RETRY }),
            });
        }

        let record = self.api.pin_reset(phone_number, pin).await?;
        match record.response_code.as_str() {
            response_code::OK => Ok(ScreenOutcome::Done {
                data: json!({ "success_message": msg::PIN_RESET_DONE }),
            }),
            response_code::PIN_REUSED => Ok(ScreenOutcome::Reject {
                screen: screen::RESET_PIN,
                data: json!({
                    "pin_error": msg::PIN_REUSED,
                    "phone_number": phone_number,
                    "birth_date": birth_date,
                }),
            }),
            code => {
                tracing::warn!("Unexpected pin_reset response_code {}", code);
                Ok(ScreenOutcome::Reject {
                    screen: screen::CONFIRMATION,
                    data: json!({ "error_message": msg::GENERIC_RETRY }),
                })
            }
        }
    }
}
