//! JobSigner - 配送メッセージの HMAC-SHA256 署名
//!
//! キューから届いた body は署名を検証するまで信用しない。
//! 比較は `verify_slice` による定数時間比較。

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::domain::{JobMessage, SignedDelivery};
use crate::error::QueueError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct JobSigner {
    secret: Vec<u8>,
}

impl JobSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self) -> Result<HmacSha256, QueueError> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| QueueError::OperationFailed(format!("hmac key: {e}")))
    }

    /// Hex signature over `body`.
    pub fn sign(&self, body: &str) -> Result<String, QueueError> {
        let mut mac = self.mac()?;
        mac.update(body.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Check the signature, then parse the body.
    pub fn verify(&self, delivery: &SignedDelivery) -> Result<JobMessage, QueueError> {
        let signature = hex::decode(&delivery.signature).map_err(|_| QueueError::BadSignature)?;
        let mut mac = self.mac()?;
        mac.update(delivery.body.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| QueueError::BadSignature)?;

        JobMessage::from_json(&delivery.body).map_err(|e| QueueError::Malformed(e.to_string()))
    }
}
