pub mod order;
pub mod order_item;
pub mod order_tracking_update;
pub mod product;
pub mod user;

pub use order::{OrderStatus, PaymentMethod};
