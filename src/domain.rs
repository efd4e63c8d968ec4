mod email_address;
mod subscriber;
mod subscriber_name;
mod subscriber_status;

pub use email_address::EmailAddress;
pub use subscriber::Subscriber;
pub use subscriber_name::SubscriberName;
pub use subscriber_status::SubscriberStatus;
