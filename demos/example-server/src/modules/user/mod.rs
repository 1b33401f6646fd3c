mod controller;
mod domain;
mod repository;
mod service;

pub use controller::UserController;
pub use repository::{InMemoryUserRepository, UserRepository};
pub use service::UserService;
