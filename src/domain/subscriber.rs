use crate::routes::FormData;

use super::{EmailAddress, SubscriberName, SubscriberStatus};

pub struct Subscriber {
    pub name: SubscriberName,
    pub email: EmailAddress,
    pub status: SubscriberStatus,
}

impl TryFrom<FormData> for Subscriber {
    type Error = String;

    fn try_from(form: FormData) -> Result<Self, Self::Error> {
        Ok(Self {
            name: SubscriberName::parse(&form.name)?,
            email: EmailAddress::parse(&form.email)?,
            status: SubscriberStatus::PendingConfirmation,
        })
    }
}
