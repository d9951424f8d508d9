pub mod access;
pub mod message;
pub mod provider;
pub mod tools;
