pub mod api_types;
pub mod cache;
pub mod client;
pub mod types;

pub use cache::AttendanceKey;
pub use client::ApiClient;
