//! Localized texts sent to users

use st_shared::Language;

/// Renders the SMS body carrying a verification code
pub fn render_code_message(language: Language, code: &str, minutes: i64) -> String {
    match language {
        Language::English => format!(
            "SayToAI: your verification code is {}. It expires in {} minutes. Do not share it with anyone.",
            code, minutes
        ),
        Language::Russian => format!(
            "SayToAI: ваш код подтверждения {}. Код действителен {} минут. Никому его не сообщайте.",
            code, minutes
        ),
        Language::Uzbek => format!(
            "SayToAI: tasdiqlash kodingiz {}. Kod {} daqiqa amal qiladi. Uni hech kimga bermang.",
            code, minutes
        ),
    }
}

pub(crate) const MSG_CODE_SENT: &str = "Verification code sent";
pub(crate) const MSG_DELIVERY_FAILED: &str =
    "We could not deliver the verification code. Please confirm to try again";
pub(crate) const MSG_RETRY_SCHEDULED: &str = "A new delivery attempt has been scheduled";
pub(crate) const MSG_ADMIN_REVIEW: &str =
    "Automatic delivery failed. An administrator will verify your phone number";
pub(crate) const MSG_DISCARDED: &str = "Verification cancelled";
pub(crate) const MSG_COMPLETED: &str = "Phone number verified";
