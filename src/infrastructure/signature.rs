use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs and checks gateway completion callbacks.
///
/// The signed payload is `"{gateway_order_ref}|{payment_ref}"`, hex-encoded
/// HMAC-SHA256 under the merchant's key secret.
#[derive(Clone)]
pub struct PaymentSignature {
    secret: Vec<u8>,
}

impl PaymentSignature {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self, gateway_order_ref: &str, payment_ref: &str) -> HmacSha256 {
        // HMAC accepts keys of any length.
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("hmac key of any size is valid"));
        mac.update(gateway_order_ref.as_bytes());
        mac.update(b"|");
        mac.update(payment_ref.as_bytes());
        mac
    }

    pub fn sign(&self, gateway_order_ref: &str, payment_ref: &str) -> String {
        hex::encode(self.mac(gateway_order_ref, payment_ref).finalize().into_bytes())
    }

    /// Constant-time comparison. Malformed signatures are simply `false`.
    pub fn verify(&self, gateway_order_ref: &str, payment_ref: &str, signature: &str) -> bool {
        let Ok(provided) = hex::decode(signature.trim()) else {
            return false;
        };
        self.mac(gateway_order_ref, payment_ref)
            .verify_slice(&provided)
            .is_ok()
    }
}

impl std::fmt::Debug for PaymentSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentSignature")
            .field("secret", &"<redacted>")
            .finish()
    }
}
