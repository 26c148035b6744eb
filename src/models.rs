pub mod contact;
pub mod dashboard;
pub mod mailchimp;
pub mod pabau;
pub mod sync_log;
