//! Razorpay checkout callback verification.
//!
//! Razorpay signs `"{order_id}|{payment_id}"` with the account key secret using
//! HMAC-SHA256 and sends the hex digest as `razorpay_signature`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn keyed_mac(provider_order_id: &str, provider_payment_id: &str, secret: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(provider_order_id.as_bytes());
    mac.update(b"|");
    mac.update(provider_payment_id.as_bytes());
    Some(mac)
}

/// Hex-encoded signature Razorpay would send for this order/payment pair.
pub fn payment_signature(provider_order_id: &str, provider_payment_id: &str, secret: &str) -> String {
    keyed_mac(provider_order_id, provider_payment_id, secret)
        .map(|mac| hex::encode(mac.finalize().into_bytes()))
        .unwrap_or_default()
}

/// Constant-time check of a callback signature. An empty secret never verifies.
pub fn verify_payment_signature(
    provider_order_id: &str,
    provider_payment_id: &str,
    signature: &str,
    secret: &str,
) -> bool {
    if secret.is_empty() {
        return false;
    }

    let Ok(supplied) = hex::decode(signature.trim()) else {
        return false;
    };

    keyed_mac(provider_order_id, provider_payment_id, secret)
        .map(|mac| mac.verify_slice(&supplied).is_ok())
        .unwrap_or(false)
}
