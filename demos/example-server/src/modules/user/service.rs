use crate::infrastructure::request_log::RequestLog;
use crate::modules::user::domain::{CreateUserRequest, User};
use crate::modules::user::repository::UserRepository;
use trestle::prelude::*;

#[derive(Injectable)]
pub struct UserService {
    repository: Arc<dyn UserRepository>,
    log: Arc<RequestLog>,
}

impl UserService {
    pub async fn create(&self, req: CreateUserRequest) -> User {
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            display_name: req.display_name,
            email: req.email,
        };
        self.log.record(format!("created {}", user.id));
        self.repository.save(user.clone()).await;
        user
    }

    pub async fn get(&self, id: &str) -> Option<User> {
        self.log.record(format!("lookup {}", id));
        self.repository.find_by_id(id).await
    }

    pub async fn list(&self) -> Vec<User> {
        self.log.record("list");
        self.repository.find_all().await
    }
}
