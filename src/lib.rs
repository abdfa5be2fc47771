pub mod config;
pub mod conversation;
pub mod engagement;
pub mod follow;
pub mod identity;
pub mod logging;
pub mod notification;
pub mod posts;
pub mod social;
pub mod storage;
pub mod sync;
