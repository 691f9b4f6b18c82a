pub mod scenario;
pub mod sensitivity;
