pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod enquiry_repo;
pub mod events;
pub mod memory;
pub mod redis_repo;
pub mod user_repo;

pub use booking_repo::PgBookingRepository;
pub use database::DbClient;
pub use enquiry_repo::PgEnquiryRepository;
pub use events::EventProducer;
pub use memory::{MemoryStore, RecordingPublisher};
pub use redis_repo::RedisClient;
pub use user_repo::PgUserRepository;
