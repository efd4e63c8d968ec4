use std::fmt;

use validator::ValidateEmail;

/// 经过校验的邮件地址，收件人和发件人共用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn parse(s: &str) -> Result<EmailAddress, String> {
        let s = s.trim();
        if s.validate_email() {
            Ok(Self(s.into()))
        } else {
            Err(format!("`{s}` is not a valid email address."))
        }
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
