pub mod notification;
pub mod request;
