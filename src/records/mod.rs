pub mod decode;
pub mod layout;
pub mod models;
