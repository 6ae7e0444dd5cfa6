pub mod boamp;
