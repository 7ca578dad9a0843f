pub mod broadcast;
pub mod connection;
pub mod gateway;
pub mod send;
