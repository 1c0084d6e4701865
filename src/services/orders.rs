use crate::{
    auth::AuthUser,
    db::DbPool,
    entities::{
        order::{self, Entity as OrderEntity, Model as OrderModel},
        order_item::{self, Entity as OrderItemEntity},
        order_tracking_update::{self, Entity as TrackingEntity},
        product::{self, Entity as ProductEntity},
        user::{self, Entity as UserEntity},
        OrderStatus, PaymentMethod,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::{NotificationGateway, OrderSummary},
    services::{
        order_status::{is_admin_target, is_terminal, is_valid_transition},
        payment_verifier::verify_payment_signature,
        payments::{to_subunits, PaymentProvider, ProviderOrderRequest},
    },
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub const DEFAULT_TRACKING_LOCATION: &str = "Processing Center";
pub const ESTIMATED_DELIVERY_DAYS: i64 = 3;
pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\S+@\S+\.\S+$").unwrap());
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?\d{10,15}$").unwrap());

/// Request/Response types for the order service
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    #[validate(regex(path = "EMAIL_RE", message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "State is required"))]
    pub state: String,
    #[validate(length(min = 1, message = "Zipcode is required"))]
    pub zipcode: String,
    #[validate(length(min = 1, message = "Country is required"))]
    pub country: String,
    #[validate(regex(path = "PHONE_RE", message = "Invalid phone number"))]
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderItemInput>,
    /// Client-side total; checked against the catalog total when present
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[validate]
    pub address: ShippingAddress,
    pub payment_method: PaymentMethod,
}

/// Razorpay checkout callback fields
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct PaymentDetails {
    #[validate(length(min = 1))]
    pub razorpay_order_id: String,
    #[validate(length(min = 1))]
    pub razorpay_payment_id: String,
    #[validate(length(min = 1))]
    pub razorpay_signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemView {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    /// Catalog entry, absent if the product has since been removed
    pub product: Option<ProductSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackingUpdateView {
    pub status: OrderStatus,
    pub location: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OwnerSummary {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<OwnerSummary>,
    pub items: Vec<OrderItemView>,
    pub amount: Decimal,
    pub address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub tracking_updates: Vec<TrackingUpdateView>,
    pub estimated_delivery_date: Option<DateTime<Utc>>,
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderPage {
    pub orders: Vec<OrderView>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

#[derive(Debug, Clone)]
pub struct PaymentConfirmation {
    pub order: OrderView,
    /// The same payment had already been recorded; nothing changed
    pub already_confirmed: bool,
}

#[derive(Debug, Clone)]
pub struct CancellationOutcome {
    pub order: OrderView,
    pub email_sent: bool,
}

#[derive(Debug, Clone)]
pub enum ItemRemoval {
    ItemRemoved(OrderView),
    OrderDeleted(Uuid),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderListFilter {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub status: Option<OrderStatus>,
}

/// Runtime settings for the order lifecycle
#[derive(Debug, Clone)]
pub struct OrderSettings {
    pub payment_secret: String,
    pub currency: String,
    pub provider_timeout: Duration,
    pub notification_timeout: Duration,
}

/// Service for the order lifecycle: placement, payment, fulfillment and cancellation
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    provider: Arc<dyn PaymentProvider>,
    notifier: Arc<dyn NotificationGateway>,
    settings: OrderSettings,
    event_sender: Option<Arc<EventSender>>,
}

fn db_error(context: &'static str, order_id: Option<Uuid>) -> impl FnOnce(sea_orm::DbErr) -> ServiceError {
    move |e| {
        match order_id {
            Some(id) => error!(error = %e, order_id = %id, "{}", context),
            None => error!(error = %e, "{}", context),
        }
        ServiceError::DatabaseError(e)
    }
}

fn order_not_found() -> ServiceError {
    ServiceError::NotFound("Order not found".to_string())
}

impl OrderService {
    /// Creates a new order service instance
    pub fn new(
        db_pool: Arc<DbPool>,
        provider: Arc<dyn PaymentProvider>,
        notifier: Arc<dyn NotificationGateway>,
        settings: OrderSettings,
    ) -> Self {
        Self {
            db_pool,
            provider,
            notifier,
            settings,
            event_sender: None,
        }
    }

    pub fn with_events(mut self, event_sender: Arc<EventSender>) -> Self {
        self.event_sender = Some(event_sender);
        self
    }

    fn publish(&self, event: Event) {
        if let Some(event_sender) = &self.event_sender {
            let order_id = event.order_id();
            if let Err(e) = event_sender.try_send(event) {
                warn!(error = %e, order_id = %order_id, "Dropped order event");
            }
        }
    }

    /// Places a new `Pending` order for `owner_id`; for Razorpay also opens a provider order.
    #[instrument(skip(self, request), fields(user_id = %owner_id, payment_method = %request.payment_method))]
    pub async fn place_order(
        &self,
        owner_id: Uuid,
        request: PlaceOrderRequest,
    ) -> Result<OrderView, ServiceError> {
        request.validate()?;
        for item in &request.items {
            item.validate()?;
        }

        let db = &*self.db_pool;

        UserEntity::find_by_id(owner_id)
            .one(db)
            .await
            .map_err(db_error("Failed to load order owner", None))?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;

        let product_ids: Vec<Uuid> = request
            .items
            .iter()
            .map(|i| i.product_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let products: HashMap<Uuid, product::Model> = ProductEntity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(db)
            .await
            .map_err(db_error("Failed to load products for order", None))?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut amount = Decimal::ZERO;
        for item in &request.items {
            let product = products.get(&item.product_id).ok_or_else(|| {
                ServiceError::ValidationError(format!("Unknown product {}", item.product_id))
            })?;
            amount += product.price * Decimal::from(item.quantity);
        }

        if let Some(declared) = request.amount {
            if declared != amount {
                warn!(%declared, computed = %amount, "Declared order amount does not match catalog total");
                return Err(ServiceError::ValidationError(format!(
                    "Declared amount {} does not match order total {}",
                    declared, amount
                )));
            }
        }

        let amount_subunits = match request.payment_method {
            PaymentMethod::Razorpay => Some(
                to_subunits(amount)
                    .map_err(|e| ServiceError::ValidationError(e.to_string()))?,
            ),
            PaymentMethod::Cod => None,
        };

        let order_id = Uuid::new_v4();
        let now = Utc::now();
        let address = request.address;

        let txn = db
            .begin()
            .await
            .map_err(db_error("Failed to start transaction for order placement", Some(order_id)))?;

        let mut order = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(owner_id),
            amount: Set(amount),
            ship_first_name: Set(address.first_name),
            ship_last_name: Set(address.last_name),
            ship_email: Set(address.email),
            ship_street: Set(address.street),
            ship_city: Set(address.city),
            ship_state: Set(address.state),
            ship_zipcode: Set(address.zipcode),
            ship_country: Set(address.country),
            ship_phone: Set(address.phone),
            payment_method: Set(request.payment_method),
            status: Set(OrderStatus::Pending),
            razorpay_order_id: Set(None),
            razorpay_payment_id: Set(None),
            estimated_delivery_date: Set(None),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(db_error("Failed to create order in database", Some(order_id)))?;

        let items: Vec<order_item::ActiveModel> = request
            .items
            .iter()
            .enumerate()
            .filter_map(|(position, item)| {
                products.get(&item.product_id).map(|product| order_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_id: Set(order_id),
                    product_id: Set(item.product_id),
                    quantity: Set(item.quantity),
                    unit_price: Set(product.price),
                    position: Set(position as i32),
                })
            })
            .collect();
        OrderItemEntity::insert_many(items)
            .exec(&txn)
            .await
            .map_err(db_error("Failed to create order items", Some(order_id)))?;

        txn.commit()
            .await
            .map_err(db_error("Failed to commit order placement", Some(order_id)))?;

        counter!("storefront.orders.placed", 1);
        info!(order_id = %order_id, %amount, "Order placed");

        if let Some(amount_subunits) = amount_subunits {
            let provider_request = ProviderOrderRequest::new(
                amount_subunits,
                self.settings.currency.clone(),
                format!("order_{}", order_id),
            );

            let provider_order = match tokio::time::timeout(
                self.settings.provider_timeout,
                self.provider.create_order(provider_request),
            )
            .await
            {
                Ok(Ok(provider_order)) => provider_order,
                Ok(Err(e)) => {
                    counter!("storefront.payments.provider_failures", 1);
                    error!(error = %e, order_id = %order_id, "Payment provider order creation failed");
                    return Err(ServiceError::ExternalServiceError(
                        "Failed to create payment provider order".to_string(),
                    ));
                }
                Err(_) => {
                    counter!("storefront.payments.provider_failures", 1);
                    error!(order_id = %order_id, "Payment provider order creation timed out");
                    return Err(ServiceError::ExternalServiceError(
                        "Failed to create payment provider order".to_string(),
                    ));
                }
            };

            let changes = order::ActiveModel {
                razorpay_order_id: Set(Some(provider_order.id.clone())),
                ..Default::default()
            };
            order = guarded_update(db, &order, changes).await?;
            info!(order_id = %order_id, provider_order_id = %provider_order.id, "Payment provider order attached");
        }

        self.publish(Event::OrderPlaced {
            order_id,
            user_id: owner_id,
            amount,
        });

        self.load_view(db, order, false).await
    }

    /// Applies a verified Razorpay payment callback to an order.
    #[instrument(skip(self, details), fields(order_id = %order_id))]
    pub async fn confirm_payment(
        &self,
        order_id: Uuid,
        details: PaymentDetails,
    ) -> Result<PaymentConfirmation, ServiceError> {
        details.validate()?;
        let db = &*self.db_pool;

        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await
            .map_err(db_error("Failed to fetch order for payment confirmation", Some(order_id)))?
            .ok_or_else(order_not_found)?;

        if !verify_payment_signature(
            &details.razorpay_order_id,
            &details.razorpay_payment_id,
            &details.razorpay_signature,
            &self.settings.payment_secret,
        ) {
            counter!("storefront.payments.verification_failures", 1);
            warn!(order_id = %order_id, "Payment signature mismatch");
            return Err(ServiceError::SignatureMismatch);
        }

        if order.payment_method != PaymentMethod::Razorpay {
            warn!(order_id = %order_id, "Payment callback for a cash on delivery order");
            return Err(ServiceError::InvalidTransition(
                "Cash on delivery orders are not settled online".to_string(),
            ));
        }

        // The payload must settle the provider order opened for this order
        match order.razorpay_order_id.as_deref() {
            None => {
                warn!(order_id = %order_id, "Payment callback for an order without a payment session");
                return Err(ServiceError::InvalidTransition(
                    "Order has no open payment session".to_string(),
                ));
            }
            Some(expected) if expected != details.razorpay_order_id => {
                counter!("storefront.payments.verification_failures", 1);
                warn!(order_id = %order_id, "Payment callback references a different provider order");
                return Err(ServiceError::SignatureMismatch);
            }
            Some(_) => {}
        }

        if order.razorpay_payment_id.as_deref() == Some(details.razorpay_payment_id.as_str()) {
            info!(order_id = %order_id, "Payment already recorded; replay ignored");
            let view = self.load_view(db, order, false).await?;
            return Ok(PaymentConfirmation {
                order: view,
                already_confirmed: true,
            });
        }

        if order.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidTransition(format!(
                "Cannot confirm payment for an order that is {}",
                order.status
            )));
        }

        let changes = order::ActiveModel {
            status: Set(OrderStatus::Paid),
            razorpay_payment_id: Set(Some(details.razorpay_payment_id.clone())),
            ..Default::default()
        };
        let updated = guarded_update(db, &order, changes).await?;

        counter!("storefront.payments.confirmed", 1);
        info!(order_id = %order_id, "Payment verified and order marked paid");

        self.publish(Event::PaymentConfirmed {
            order_id,
            payment_id: details.razorpay_payment_id,
        });

        Ok(PaymentConfirmation {
            order: self.load_view(db, updated, false).await?,
            already_confirmed: false,
        })
    }

    /// Administrative status change with a tracking entry.
    #[instrument(skip(self, location, description), fields(order_id = %order_id, new_status = %target))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        location: Option<String>,
        description: Option<String>,
    ) -> Result<OrderView, ServiceError> {
        if !is_admin_target(target) {
            return Err(ServiceError::InvalidTransition(format!(
                "Status {} cannot be set directly",
                target
            )));
        }

        let db = &*self.db_pool;
        let txn = db
            .begin()
            .await
            .map_err(db_error("Failed to start transaction for status update", Some(order_id)))?;

        let order = find_order(&txn, order_id).await?;
        let old_status = order.status;

        if is_terminal(old_status) {
            return Err(ServiceError::InvalidTransition(format!(
                "Order is already {} and can no longer change status",
                old_status
            )));
        }
        if !is_valid_transition(old_status, target) {
            return Err(ServiceError::InvalidTransition(format!(
                "Cannot transition order from {} to {}",
                old_status, target
            )));
        }

        let now = Utc::now();
        let mut changes = order::ActiveModel {
            status: Set(target),
            ..Default::default()
        };
        if target == OrderStatus::Shipped {
            changes.estimated_delivery_date =
                Set(Some(now + ChronoDuration::days(ESTIMATED_DELIVERY_DAYS)));
        }
        let updated = guarded_update(&txn, &order, changes).await?;
        append_tracking(&txn, order_id, target, location, description, now).await?;

        txn.commit()
            .await
            .map_err(db_error("Failed to commit status update", Some(order_id)))?;

        counter!("storefront.orders.status_changed", 1);
        info!(order_id = %order_id, old_status = %old_status, new_status = %target, "Order status updated");

        self.publish(Event::OrderStatusChanged {
            order_id,
            old_status,
            new_status: target,
        });

        self.load_view(db, updated, false).await
    }

    /// Customer cancellation of a pending order, followed by a best-effort email.
    #[instrument(skip(self, requester), fields(order_id = %order_id, requester = %requester.user_id))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        requester: &AuthUser,
    ) -> Result<CancellationOutcome, ServiceError> {
        let db = &*self.db_pool;
        let txn = db
            .begin()
            .await
            .map_err(db_error("Failed to start transaction for cancellation", Some(order_id)))?;

        let order = find_order(&txn, order_id).await?;
        ensure_access(requester, &order)?;

        if order.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidTransition(
                "Only pending orders can be cancelled".to_string(),
            ));
        }

        let owner = UserEntity::find_by_id(order.user_id)
            .one(&txn)
            .await
            .map_err(db_error("Failed to load order owner", Some(order_id)))?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;

        let now = Utc::now();
        let changes = order::ActiveModel {
            status: Set(OrderStatus::Cancelled),
            ..Default::default()
        };
        let updated = guarded_update(&txn, &order, changes).await?;
        append_tracking(&txn, order_id, OrderStatus::Cancelled, None, None, now).await?;

        let item_count = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .count(&txn)
            .await
            .map_err(db_error("Failed to count order items", Some(order_id)))?;

        txn.commit()
            .await
            .map_err(db_error("Failed to commit cancellation", Some(order_id)))?;

        counter!("storefront.orders.cancelled", 1);
        info!(order_id = %order_id, "Order cancelled");

        let summary = OrderSummary {
            id: updated.id,
            date: updated.created_at,
            amount: updated.amount,
            item_count: item_count as usize,
        };
        let email_sent = match tokio::time::timeout(
            self.settings.notification_timeout,
            self.notifier
                .send_cancellation_email(&owner.email, &owner.name, &summary),
        )
        .await
        {
            Ok(sent) => sent,
            Err(_) => {
                warn!(order_id = %order_id, "Cancellation email timed out");
                false
            }
        };
        if !email_sent {
            counter!("storefront.notifications.failures", 1);
        }

        self.publish(Event::OrderCancelled {
            order_id,
            email_sent,
        });

        Ok(CancellationOutcome {
            order: self.load_view(db, updated, false).await?,
            email_sent,
        })
    }

    /// Removes every line for `product_id`; deletes the order when nothing is left.
    #[instrument(skip(self, requester), fields(order_id = %order_id, product_id = %product_id))]
    pub async fn remove_item(
        &self,
        order_id: Uuid,
        product_id: Uuid,
        requester: &AuthUser,
    ) -> Result<ItemRemoval, ServiceError> {
        let db = &*self.db_pool;
        let txn = db
            .begin()
            .await
            .map_err(db_error("Failed to start transaction for item removal", Some(order_id)))?;

        let order = find_order(&txn, order_id).await?;
        ensure_access(requester, &order)?;

        if order.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidTransition(
                "Only pending orders can be modified".to_string(),
            ));
        }
        if order.razorpay_order_id.is_some() {
            return Err(ServiceError::InvalidTransition(
                "Orders with an open payment session cannot be modified".to_string(),
            ));
        }

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await
            .map_err(db_error("Failed to load order items", Some(order_id)))?;

        let (removed, remaining): (Vec<_>, Vec<_>) =
            items.into_iter().partition(|i| i.product_id == product_id);
        if removed.is_empty() {
            return Err(ServiceError::NotFound("Item not found in order".to_string()));
        }

        if remaining.is_empty() {
            TrackingEntity::delete_many()
                .filter(order_tracking_update::Column::OrderId.eq(order_id))
                .exec(&txn)
                .await
                .map_err(db_error("Failed to delete tracking history", Some(order_id)))?;
            OrderItemEntity::delete_many()
                .filter(order_item::Column::OrderId.eq(order_id))
                .exec(&txn)
                .await
                .map_err(db_error("Failed to delete order items", Some(order_id)))?;
            let deleted = OrderEntity::delete_many()
                .filter(order::Column::Id.eq(order_id))
                .filter(order::Column::Version.eq(order.version))
                .exec(&txn)
                .await
                .map_err(db_error("Failed to delete empty order", Some(order_id)))?;
            if deleted.rows_affected == 0 {
                return Err(ServiceError::ConcurrentModification(order_id));
            }

            txn.commit()
                .await
                .map_err(db_error("Failed to commit order deletion", Some(order_id)))?;

            info!(order_id = %order_id, "Last item removed; order deleted");
            self.publish(Event::OrderDeleted(order_id));
            return Ok(ItemRemoval::OrderDeleted(order_id));
        }

        OrderItemEntity::delete_many()
            .filter(order_item::Column::OrderId.eq(order_id))
            .filter(order_item::Column::ProductId.eq(product_id))
            .exec(&txn)
            .await
            .map_err(db_error("Failed to delete order item", Some(order_id)))?;

        let new_amount: Decimal = remaining.iter().map(|i| i.line_total()).sum();
        let changes = order::ActiveModel {
            amount: Set(new_amount),
            ..Default::default()
        };
        let updated = guarded_update(&txn, &order, changes).await?;

        txn.commit()
            .await
            .map_err(db_error("Failed to commit item removal", Some(order_id)))?;

        info!(order_id = %order_id, %new_amount, "Order item removed");
        self.publish(Event::OrderItemRemoved {
            order_id,
            product_id,
            new_amount,
        });

        Ok(ItemRemoval::ItemRemoved(
            self.load_view(db, updated, false).await?,
        ))
    }

    /// The caller's orders, newest first.
    #[instrument(skip(self), fields(user_id = %owner_id))]
    pub async fn list_user_orders(&self, owner_id: Uuid) -> Result<Vec<OrderView>, ServiceError> {
        let db = &*self.db_pool;
        let orders = OrderEntity::find()
            .filter(order::Column::UserId.eq(owner_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(db)
            .await
            .map_err(db_error("Failed to list user orders", None))?;

        self.load_views(db, orders, false).await
    }

    /// Every order, newest first, with owner details.
    #[instrument(skip(self))]
    pub async fn list_all_orders(&self, filter: OrderListFilter) -> Result<OrderPage, ServiceError> {
        let db = &*self.db_pool;
        let page = filter.page.unwrap_or(1).max(1);
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        let mut query = OrderEntity::find().order_by_desc(order::Column::CreatedAt);
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }
        let paginator = query.paginate(db, limit);

        let total = paginator
            .num_items()
            .await
            .map_err(db_error("Failed to count orders", None))?;
        let orders = paginator
            .fetch_page(page - 1)
            .await
            .map_err(db_error("Failed to fetch orders page", None))?;

        let orders = self.load_views(db, orders, true).await?;
        info!(total, page, limit, returned = orders.len(), "Orders listed");

        Ok(OrderPage {
            orders,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        })
    }

    /// A single order, visible to its owner and administrators.
    #[instrument(skip(self, requester), fields(order_id = %order_id))]
    pub async fn get_order(
        &self,
        order_id: Uuid,
        requester: &AuthUser,
    ) -> Result<OrderView, ServiceError> {
        let db = &*self.db_pool;
        let order = find_order(db, order_id).await?;
        ensure_access(requester, &order)?;
        self.load_view(db, order, true).await
    }

    async fn load_view<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: OrderModel,
        include_owner: bool,
    ) -> Result<OrderView, ServiceError> {
        let order_id = order.id;
        self.load_views(conn, vec![order], include_owner)
            .await?
            .pop()
            .ok_or_else(|| {
                error!(order_id = %order_id, "Order view could not be assembled");
                ServiceError::InternalError("Order view could not be assembled".to_string())
            })
    }

    /// Assembles views for a batch of orders with one query per related table.
    async fn load_views<C: ConnectionTrait>(
        &self,
        conn: &C,
        orders: Vec<OrderModel>,
        include_owner: bool,
    ) -> Result<Vec<OrderView>, ServiceError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }
        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();

        let mut items_by_order: HashMap<Uuid, Vec<order_item::Model>> = HashMap::new();
        for item in OrderItemEntity::find()
            .filter(order_item::Column::OrderId.is_in(order_ids.clone()))
            .order_by_asc(order_item::Column::Position)
            .all(conn)
            .await
            .map_err(db_error("Failed to load order items", None))?
        {
            items_by_order.entry(item.order_id).or_default().push(item);
        }

        let mut tracking_by_order: HashMap<Uuid, Vec<order_tracking_update::Model>> =
            HashMap::new();
        for update in TrackingEntity::find()
            .filter(order_tracking_update::Column::OrderId.is_in(order_ids))
            .order_by_asc(order_tracking_update::Column::Sequence)
            .all(conn)
            .await
            .map_err(db_error("Failed to load tracking history", None))?
        {
            tracking_by_order
                .entry(update.order_id)
                .or_default()
                .push(update);
        }

        let product_ids: HashSet<Uuid> = items_by_order
            .values()
            .flatten()
            .map(|i| i.product_id)
            .collect();
        let products: HashMap<Uuid, product::Model> = ProductEntity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(conn)
            .await
            .map_err(db_error("Failed to load products", None))?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let owners: HashMap<Uuid, user::Model> = if include_owner {
            let owner_ids: HashSet<Uuid> = orders.iter().map(|o| o.user_id).collect();
            UserEntity::find()
                .filter(user::Column::Id.is_in(owner_ids))
                .all(conn)
                .await
                .map_err(db_error("Failed to load order owners", None))?
                .into_iter()
                .map(|u| (u.id, u))
                .collect()
        } else {
            HashMap::new()
        };

        Ok(orders
            .into_iter()
            .map(|order| {
                let items = items_by_order
                    .remove(&order.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|item| OrderItemView {
                        product_id: item.product_id,
                        quantity: item.quantity,
                        unit_price: item.unit_price,
                        product: products.get(&item.product_id).map(|p| ProductSummary {
                            id: p.id,
                            name: p.name.clone(),
                            price: p.price,
                            images: p.image_urls(),
                            description: p.description.clone(),
                        }),
                    })
                    .collect();
                let tracking_updates = tracking_by_order
                    .remove(&order.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|t| TrackingUpdateView {
                        status: t.status,
                        location: t.location,
                        description: t.description,
                        timestamp: t.created_at,
                    })
                    .collect();
                let user = owners.get(&order.user_id).map(|u| OwnerSummary {
                    id: u.id,
                    email: u.email.clone(),
                    created_at: u.created_at,
                });

                OrderView {
                    id: order.id,
                    user_id: order.user_id,
                    user,
                    items,
                    amount: order.amount,
                    address: ShippingAddress {
                        first_name: order.ship_first_name,
                        last_name: order.ship_last_name,
                        email: order.ship_email,
                        street: order.ship_street,
                        city: order.ship_city,
                        state: order.ship_state,
                        zipcode: order.ship_zipcode,
                        country: order.ship_country,
                        phone: order.ship_phone,
                    },
                    payment_method: order.payment_method,
                    status: order.status,
                    tracking_updates,
                    estimated_delivery_date: order.estimated_delivery_date,
                    razorpay_order_id: order.razorpay_order_id,
                    razorpay_payment_id: order.razorpay_payment_id,
                    created_at: order.created_at,
                    updated_at: order.updated_at,
                    version: order.version,
                }
            })
            .collect())
    }
}

async fn find_order<C: ConnectionTrait>(conn: &C, order_id: Uuid) -> Result<OrderModel, ServiceError> {
    OrderEntity::find_by_id(order_id)
        .one(conn)
        .await
        .map_err(db_error("Failed to fetch order", Some(order_id)))?
        .ok_or_else(|| {
            warn!(order_id = %order_id, "Order not found");
            order_not_found()
        })
}

fn ensure_access(requester: &AuthUser, order: &OrderModel) -> Result<(), ServiceError> {
    if requester.can_access(order.user_id) {
        Ok(())
    } else {
        warn!(order_id = %order.id, requester = %requester.user_id, "Order access denied");
        Err(ServiceError::Forbidden(
            "You do not have access to this order".to_string(),
        ))
    }
}

/// Writes `changes` only if the row still carries `current.version`, bumping it.
async fn guarded_update<C: ConnectionTrait>(
    conn: &C,
    current: &OrderModel,
    mut changes: order::ActiveModel,
) -> Result<OrderModel, ServiceError> {
    let now = Utc::now();
    changes.version = Set(current.version + 1);
    changes.updated_at = Set(now);

    let result = OrderEntity::update_many()
        .set(changes)
        .filter(order::Column::Id.eq(current.id))
        .filter(order::Column::Version.eq(current.version))
        .exec(conn)
        .await
        .map_err(db_error("Failed to update order", Some(current.id)))?;

    if result.rows_affected == 0 {
        warn!(order_id = %current.id, version = current.version, "Order changed concurrently");
        return Err(ServiceError::ConcurrentModification(current.id));
    }

    find_order(conn, current.id).await
}

async fn append_tracking(
    txn: &DatabaseTransaction,
    order_id: Uuid,
    status: OrderStatus,
    location: Option<String>,
    description: Option<String>,
    at: DateTime<Utc>,
) -> Result<(), ServiceError> {
    let existing = TrackingEntity::find()
        .filter(order_tracking_update::Column::OrderId.eq(order_id))
        .count(txn)
        .await
        .map_err(db_error("Failed to count tracking updates", Some(order_id)))?;

    let location = location
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TRACKING_LOCATION.to_string());
    let description = description
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| format!("Order {}", status.to_string().to_lowercase()));

    order_tracking_update::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        sequence: Set(existing as i32 + 1),
        status: Set(status),
        location: Set(location),
        description: Set(description),
        created_at: Set(at),
    }
    .insert(txn)
    .await
    .map_err(db_error("Failed to append tracking update", Some(order_id)))?;

    Ok(())
}
