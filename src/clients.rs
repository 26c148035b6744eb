pub mod mailchimp;
pub mod pabau;

pub use mailchimp::MailchimpClient;
pub use pabau::PabauClient;
