pub mod chat;
pub mod invoke;
pub mod profiles;
pub mod serve;
pub mod status;
pub mod tools;
