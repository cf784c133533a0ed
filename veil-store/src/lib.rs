pub mod abuse;
pub mod users;

pub use abuse::AbuseLog;
pub use users::UserStore;
