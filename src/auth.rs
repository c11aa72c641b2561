pub mod cookie;
pub mod gate;
pub mod hash;
pub mod token;
