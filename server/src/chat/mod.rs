pub mod broadcast;
pub mod messages;
pub mod model;
pub mod presence;
pub mod service;
pub mod store;
