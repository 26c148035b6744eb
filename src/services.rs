pub mod backfill;
pub mod dashboard_service;
pub mod mailchimp_push;
pub mod pabau_contacts;
pub mod pabau_sync;
pub mod scheduler;
pub mod unsubscribe_sync;
