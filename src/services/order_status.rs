use crate::entities::OrderStatus;

/// Whether the lifecycle permits moving an order from `from` to `to`.
///
/// `Pending -> Paid` is legal here but only reachable through a verified
/// payment; see [`is_admin_target`].
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;

    match (from, to) {
        // From pending
        (Pending, Paid) => true,
        (Pending, Processing) => true,
        (Pending, Shipped) => true,
        (Pending, Cancelled) => true,

        // From paid
        (Paid, Processing) => true,
        (Paid, Shipped) => true,
        (Paid, Cancelled) => true,

        // From processing
        (Processing, Shipped) => true,
        (Processing, Cancelled) => true,

        // From shipped
        (Shipped, Delivered) => true,

        // Delivered and Cancelled are terminal
        _ => false,
    }
}

/// Statuses an administrator may set directly.
pub fn is_admin_target(status: OrderStatus) -> bool {
    !matches!(status, OrderStatus::Paid | OrderStatus::Pending)
}

pub fn is_terminal(status: OrderStatus) -> bool {
    matches!(status, OrderStatus::Delivered | OrderStatus::Cancelled)
}
