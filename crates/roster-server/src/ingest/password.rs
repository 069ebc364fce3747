//! Password hashing for imported user accounts

use futures::future::try_join_all;

#[derive(Debug, thiserror::Error)]
pub enum PasswordHashError {
    #[error("bcrypt error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    #[error("hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// bcrypt hasher that runs off the async executor
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub async fn hash(&self, password: String) -> Result<String, PasswordHashError> {
        let cost = self.cost;
        let hashed = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;
        Ok(hashed)
    }

    /// Hash every password concurrently, preserving input order
    pub async fn hash_all(&self, passwords: Vec<String>) -> Result<Vec<String>, PasswordHashError> {
        try_join_all(passwords.into_iter().map(|p| self.hash(p))).await
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}
