pub mod choreography;
pub mod health;
