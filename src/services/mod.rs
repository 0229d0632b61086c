pub mod firebase_service;
pub mod user_service;
