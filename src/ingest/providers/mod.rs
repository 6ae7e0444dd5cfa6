pub mod boamp;
pub mod scripted;
