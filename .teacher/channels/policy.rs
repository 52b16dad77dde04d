use crate::config::Settings;
use crate::queue::IncomingMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseEligibility {
    NotApplicable,
    MustReply,
    Opportunistic,
}

pub fn classify_response_eligibility(
    _settings: &Settings,
    inbound: &IncomingMessage,
) -> ResponseEligibility {
    if inbound.is_direct || is_explicit_profile_mention(inbound) {
        return ResponseEligibility::MustReply;
    }
    ResponseEligibility::Opportunistic
}

pub fn is_explicit_profile_mention(inbound: &IncomingMessage) -> bool {
    inbound.is_mentioned
}
