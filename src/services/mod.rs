// Order lifecycle
pub mod order_status;
pub mod orders;

// Payment gateway integration
pub mod payment_verifier;
pub mod payments;
