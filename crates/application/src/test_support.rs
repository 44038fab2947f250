//! 单元测试共用的假实现

use std::sync::Mutex;

use async_trait::async_trait;
use domain::PasswordHash;

use crate::image_store::{ImageStoreError, ProfileImageStore};
use crate::mailer::{MailError, Mailer, OutgoingEmail};
use crate::password::{PasswordHasher, PasswordHasherError};

/// 明文加前缀，足够区分哈希前后
pub struct PlainHasher;

#[async_trait]
impl PasswordHasher for PlainHasher {
    async fn hash(&self, plaintext: &str) -> Result<PasswordHash, PasswordHasherError> {
        PasswordHash::new(format!("plain:{plaintext}"))
            .map_err(|err| PasswordHasherError::hash_error(err.to_string()))
    }

    async fn verify(
        &self,
        plaintext: &str,
        hashed: &PasswordHash,
    ) -> Result<bool, PasswordHasherError> {
        Ok(hashed.as_str() == format!("plain:{plaintext}"))
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryImageStore {
    pub objects: Mutex<Vec<(String, String, usize)>>,
}

#[async_trait]
impl ProfileImageStore for MemoryImageStore {
    async fn put(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, ImageStoreError> {
        self.objects
            .lock()
            .unwrap()
            .push((key.to_owned(), content_type.to_owned(), bytes.len()));
        Ok(format!("https://images.test/{key}"))
    }
}
