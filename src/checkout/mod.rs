//! Order pipeline: turns a user's cart into a pending order.
//!
//! Steps run strictly in order: load cart, validate shipping, validate
//! payment details, price the cart, charge, then persist everything in one
//! transaction. Nothing is written unless the charge is approved, and a
//! failed write leaves the cart exactly as it was. Only the ordered units
//! leave the cart; anything added while the charge runs stays.

use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument};

use crate::api::metrics;
use crate::cart::{compute_totals, CartLine, CartService, CartTotals, Pricing};
use crate::db::{
    CartItem, DbPool, Order, OrderItem, OrderStatus, ShippingDetails, ShippingInfo, User,
};
use crate::error::{Error, FieldErrorsBuilder, Result};
use crate::payment::{card_last4, PaymentGateway, PaymentMethod, PaymentOutcome, PaymentRequest};

const DEFAULT_PHONE: &str = "N/A";

/// Shipping fields as submitted by the client
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShippingForm {
    #[serde(alias = "fullname", alias = "name")]
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    #[serde(alias = "zip")]
    pub zipcode: Option<String>,
    pub country: Option<String>,
}

fn trimmed(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or_default().to_string()
}

impl ShippingForm {
    /// Every field except the phone number is required
    pub fn validate(&self) -> Result<ShippingDetails> {
        let mut errors = FieldErrorsBuilder::new();
        errors
            .require("full_name", self.full_name.as_deref())
            .require("address", self.address.as_deref())
            .require("city", self.city.as_deref())
            .require("zipcode", self.zipcode.as_deref())
            .require("country", self.country.as_deref());
        errors.finish()?;

        let phone = trimmed(&self.phone);
        Ok(ShippingDetails {
            full_name: trimmed(&self.full_name),
            phone: if phone.is_empty() {
                DEFAULT_PHONE.to_string()
            } else {
                phone
            },
            address: trimmed(&self.address),
            city: trimmed(&self.city),
            zipcode: trimmed(&self.zipcode),
            country: trimmed(&self.country),
        })
    }
}

/// Payment fields as submitted by the client
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentForm {
    #[serde(alias = "payment_method")]
    pub method: Option<String>,
    pub card_number: Option<String>,
    pub expiry: Option<String>,
    pub cvv: Option<String>,
    pub card_holder: Option<String>,
    pub upi_id: Option<String>,
}

impl PaymentForm {
    /// Check the fields required by the chosen method. The card number is
    /// reduced to its last four digits and the CVV is dropped.
    pub fn validate(&self) -> Result<PaymentMethod> {
        let method = trimmed(&self.method).to_lowercase();
        let mut errors = FieldErrorsBuilder::new();

        match method.as_str() {
            "card" => {
                errors
                    .require("card_number", self.card_number.as_deref())
                    .require("expiry", self.expiry.as_deref())
                    .require("cvv", self.cvv.as_deref())
                    .require("card_holder", self.card_holder.as_deref());
                errors.finish()?;
                Ok(PaymentMethod::Card {
                    card_holder: trimmed(&self.card_holder),
                    last4: card_last4(self.card_number.as_deref().unwrap_or_default()),
                })
            }
            "upi" => {
                errors.require("upi_id", self.upi_id.as_deref());
                errors.finish()?;
                Ok(PaymentMethod::Upi {
                    upi_id: trimmed(&self.upi_id),
                })
            }
            "cod" => Ok(PaymentMethod::Cod),
            "" => Err(Error::invalid_field("method", "method is required")),
            other => Err(Error::invalid_field(
                "method",
                format!("unsupported payment method '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutRequest {
    /// A previously saved address; takes precedence over inline fields
    #[serde(default)]
    pub shipping_id: Option<i64>,
    #[serde(flatten)]
    pub shipping: ShippingForm,
    #[serde(flatten)]
    pub payment: PaymentForm,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutReceipt {
    pub order_id: i64,
    pub totals: CartTotals,
    pub payment_reference: String,
}

/// An order with its line items, as shown on the confirmation page
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

enum ShippingChoice {
    Saved(i64),
    New(ShippingDetails),
}

pub struct OrderPipeline {
    db: DbPool,
    gateway: Arc<dyn PaymentGateway>,
    pricing: Pricing,
    /// One mutex per user with a checkout in flight
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl OrderPipeline {
    pub fn new(db: DbPool, gateway: Arc<dyn PaymentGateway>, pricing: Pricing) -> Self {
        Self {
            db,
            gateway,
            pricing,
            locks: DashMap::new(),
        }
    }

    /// Place an order for everything in the user's cart.
    ///
    /// Concurrent checkouts for the same user run one after the other; the
    /// second sees the cart the first one left behind.
    pub async fn checkout(&self, email: &str, request: CheckoutRequest) -> Result<CheckoutReceipt> {
        let lock = self
            .locks
            .entry(email.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;
            self.checkout_locked(email, &request).await
        };

        drop(lock);
        self.locks
            .remove_if(email, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    #[instrument(skip_all, fields(email = %email))]
    async fn checkout_locked(&self, email: &str, request: &CheckoutRequest) -> Result<CheckoutReceipt> {
        let lines: Vec<CartLine> = CartItem::list_lines(&self.db, email)
            .await?
            .into_iter()
            .map(CartLine::try_from)
            .collect::<Result<_>>()?;
        if lines.is_empty() {
            return Err(Error::EmptyCart);
        }

        let shipping = match request.shipping_id {
            Some(id) => match ShippingInfo::find_for_user(&self.db, id, email).await? {
                Some(saved) => ShippingChoice::Saved(saved.shipping_id),
                None => return Err(Error::NotFound("Shipping address".to_string())),
            },
            None => ShippingChoice::New(request.shipping.validate()?),
        };

        let method = request.payment.validate()?;
        let totals = compute_totals(&lines, &self.pricing)?;

        let outcome = self
            .gateway
            .charge(&PaymentRequest {
                email: email.to_string(),
                amount: totals.total,
                method,
            })
            .await;
        metrics::record_payment(outcome.label());

        let reference = match outcome {
            PaymentOutcome::Approved { reference } => reference,
            PaymentOutcome::Declined { reason } => return Err(Error::PaymentDeclined(reason)),
            PaymentOutcome::TimedOut => return Err(Error::PaymentTimeout),
        };

        let order_id = self
            .persist_order(email, shipping, &lines, totals.total, &reference)
            .await
            .inspect_err(|e| {
                error!(
                    payment_reference = %reference,
                    error = %e,
                    "Payment approved but the order could not be stored"
                )
            })?;

        metrics::record_order_placed(OrderStatus::Pending.as_str());
        info!(order_id, total = %totals.total, "Order placed");

        Ok(CheckoutReceipt {
            order_id,
            totals,
            payment_reference: reference,
        })
    }

    async fn persist_order(
        &self,
        email: &str,
        shipping: ShippingChoice,
        lines: &[CartLine],
        total: Decimal,
        reference: &str,
    ) -> Result<i64> {
        let mut tx = self.db.begin().await?;

        let shipping_id = match shipping {
            ShippingChoice::Saved(id) => id,
            ShippingChoice::New(details) => ShippingInfo::create(&mut tx, email, &details).await?,
        };

        let order_id = Order::create(&mut tx, email, Some(shipping_id), total, reference).await?;
        for line in lines {
            OrderItem::insert(&mut tx, order_id, line.art_id, line.quantity, line.price).await?;
        }
        CartService::consume_ordered(&mut tx, email, lines).await?;

        tx.commit().await?;
        Ok(order_id)
    }

    /// Store a shipping address for later use; the cart is left alone
    pub async fn save_shipping(&self, email: &str, form: &ShippingForm) -> Result<i64> {
        let details = form.validate()?;
        if !User::exists(&self.db, email).await? {
            return Err(Error::NotFound("User".to_string()));
        }

        let mut conn = self.db.acquire().await?;
        let shipping_id = ShippingInfo::create(&mut conn, email, &details).await?;
        info!(email = %email, shipping_id, "Saved shipping address");
        Ok(shipping_id)
    }

    /// Order with items, visible to its purchaser or to anyone allowed to
    /// see every order
    pub async fn order_details(
        &self,
        order_id: i64,
        email: &str,
        can_view_all: bool,
    ) -> Result<OrderDetails> {
        let order = if can_view_all {
            Order::find_by_id(&self.db, order_id).await?
        } else {
            Order::find_for_user(&self.db, order_id, email).await?
        }
        .ok_or_else(|| Error::NotFound("Order".to_string()))?;

        let items = OrderItem::list_for_order(&self.db, order.order_id).await?;
        Ok(OrderDetails { order, items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::testing::seed_artwork;
    use crate::db::{test_pool, Role};
    use crate::payment::testing::ScriptedGateway;

    const BUYER: &str = "buyer@example.com";

    struct Fixture {
        pool: DbPool,
        gateway: Arc<ScriptedGateway>,
        pipeline: Arc<OrderPipeline>,
        cart: CartService,
    }

    async fn fixture(gateway: ScriptedGateway) -> Fixture {
        let pool = test_pool().await;
        User::create(&pool, BUYER, "Buyer", "hash", Role::User)
            .await
            .unwrap();
        let gateway = Arc::new(gateway);
        let pipeline = Arc::new(OrderPipeline::new(
            pool.clone(),
            gateway.clone(),
            Pricing::default(),
        ));
        let cart = CartService::new(pool.clone(), Pricing::default());
        Fixture {
            pool,
            gateway,
            pipeline,
            cart,
        }
    }

    /// Cart with one artwork at 100.00, quantity 2
    async fn fill_cart(f: &Fixture) -> i64 {
        let art_id = seed_artwork(&f.pool, "Harbour at Dusk", Decimal::new(10000, 2)).await;
        f.cart.add_item(BUYER, art_id).await.unwrap();
        f.cart.add_item(BUYER, art_id).await.unwrap();
        art_id
    }

    fn shipping_form() -> ShippingForm {
        ShippingForm {
            full_name: Some("Ada Lovelace".to_string()),
            phone: None,
            address: Some("12 Canal St".to_string()),
            city: Some("London".to_string()),
            zipcode: Some("N1 9GU".to_string()),
            country: Some("UK".to_string()),
        }
    }

    fn card_request() -> CheckoutRequest {
        CheckoutRequest {
            shipping_id: None,
            shipping: shipping_form(),
            payment: PaymentForm {
                method: Some("card".to_string()),
                card_number: Some("4111 1111 1111 1234".to_string()),
                expiry: Some("12/29".to_string()),
                cvv: Some("123".to_string()),
                card_holder: Some("Ada Lovelace".to_string()),
                upi_id: None,
            },
        }
    }

    #[tokio::test]
    async fn test_successful_checkout() {
        let f = fixture(ScriptedGateway::approving()).await;
        let art_id = fill_cart(&f).await;

        let receipt = f.pipeline.checkout(BUYER, card_request()).await.unwrap();
        assert_eq!(receipt.totals.total, Decimal::new(27000, 2));
        assert_eq!(receipt.payment_reference, "pay_test");

        assert!(f.cart.get_cart(BUYER).await.unwrap().is_empty());

        let details = f
            .pipeline
            .order_details(receipt.order_id, BUYER, false)
            .await
            .unwrap();
        assert_eq!(details.order.status, OrderStatus::Pending);
        assert_eq!(details.order.total().unwrap(), Decimal::new(27000, 2));
        assert_eq!(details.items.len(), 1);
        assert_eq!(details.items[0].art_id, art_id);
        assert_eq!(details.items[0].quantity, 2);
        assert_eq!(
            details.items[0].price_at_purchase().unwrap(),
            Decimal::new(10000, 2)
        );

        let shipping_id = details.order.shipping_id.unwrap();
        let saved = ShippingInfo::find_for_user(&f.pool, shipping_id, BUYER)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.phone, "N/A");
    }

    #[tokio::test]
    async fn test_declined_payment_leaves_cart() {
        let f = fixture(ScriptedGateway::declining()).await;
        fill_cart(&f).await;

        let result = f.pipeline.checkout(BUYER, card_request()).await;
        assert!(matches!(result, Err(Error::PaymentDeclined(_))));
        assert_eq!(f.cart.get_cart(BUYER).await.unwrap()[0].quantity, 2);
        assert_eq!(Order::count_for_user(&f.pool, BUYER).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_timed_out_payment_leaves_cart() {
        let f = fixture(ScriptedGateway::timing_out()).await;
        fill_cart(&f).await;

        let result = f.pipeline.checkout(BUYER, card_request()).await;
        assert!(matches!(result, Err(Error::PaymentTimeout)));
        assert_eq!(f.cart.get_cart(BUYER).await.unwrap().len(), 1);
        assert_eq!(Order::count_for_user(&f.pool, BUYER).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_item_insert_rolls_back_everything() {
        let f = fixture(ScriptedGateway::approving()).await;
        fill_cart(&f).await;

        sqlx::query(
            "CREATE TRIGGER fail_items BEFORE INSERT ON order_items BEGIN SELECT RAISE(ABORT, 'forced'); END",
        )
        .execute(&f.pool)
        .await
        .unwrap();

        let result = f.pipeline.checkout(BUYER, card_request()).await;
        assert!(matches!(result, Err(Error::Persistence(_))));

        assert_eq!(Order::count_for_user(&f.pool, BUYER).await.unwrap(), 0);
        let shipping_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shipping_info")
            .fetch_one(&f.pool)
            .await
            .unwrap();
        assert_eq!(shipping_rows, 0);
        assert_eq!(f.cart.get_cart(BUYER).await.unwrap()[0].quantity, 2);
    }

    /// Approves, but only after putting more art in the buyer's cart
    struct AddsDuringCharge {
        cart: CartService,
        art_ids: Vec<i64>,
    }

    #[async_trait::async_trait]
    impl PaymentGateway for AddsDuringCharge {
        async fn charge(&self, request: &PaymentRequest) -> PaymentOutcome {
            for art_id in &self.art_ids {
                self.cart.add_item(&request.email, *art_id).await.unwrap();
            }
            PaymentOutcome::Approved {
                reference: "pay_mid".to_string(),
            }
        }
    }

    #[tokio::test]
    async fn test_items_added_during_payment_stay_in_cart() {
        let pool = test_pool().await;
        User::create(&pool, BUYER, "Buyer", "hash", Role::User)
            .await
            .unwrap();
        let first = seed_artwork(&pool, "First Light", Decimal::new(10000, 2)).await;
        let second = seed_artwork(&pool, "Second Wind", Decimal::new(5000, 2)).await;

        let cart = CartService::new(pool.clone(), Pricing::default());
        cart.add_item(BUYER, first).await.unwrap();

        let gateway = AddsDuringCharge {
            cart: CartService::new(pool.clone(), Pricing::default()),
            art_ids: vec![first, second],
        };
        let pipeline = OrderPipeline::new(pool.clone(), Arc::new(gateway), Pricing::default());
        let receipt = pipeline.checkout(BUYER, card_request()).await.unwrap();

        let details = pipeline
            .order_details(receipt.order_id, BUYER, false)
            .await
            .unwrap();
        assert_eq!(details.items.len(), 1);
        assert_eq!(details.items[0].art_id, first);
        assert_eq!(details.items[0].quantity, 1);

        let left: Vec<(i64, i64)> = cart
            .get_cart(BUYER)
            .await
            .unwrap()
            .iter()
            .map(|line| (line.art_id, line.quantity))
            .collect();
        assert_eq!(left, vec![(first, 1), (second, 1)]);
    }

    #[tokio::test]
    async fn test_empty_cart_never_charges() {
        let f = fixture(ScriptedGateway::approving()).await;
        let result = f.pipeline.checkout(BUYER, card_request()).await;
        assert!(matches!(result, Err(Error::EmptyCart)));
        assert_eq!(f.gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_shipping_fields_listed() {
        let f = fixture(ScriptedGateway::approving()).await;
        fill_cart(&f).await;

        let mut request = card_request();
        request.shipping.city = None;
        request.shipping.zipcode = Some("  ".to_string());

        match f.pipeline.checkout(BUYER, request).await {
            Err(Error::Validation(errors)) => {
                assert!(errors.contains_key("city"));
                assert!(errors.contains_key("zipcode"));
                assert_eq!(errors.len(), 2);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert_eq!(f.gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn test_card_requires_cvv() {
        let f = fixture(ScriptedGateway::approving()).await;
        fill_cart(&f).await;

        let mut request = card_request();
        request.payment.cvv = None;

        match f.pipeline.checkout(BUYER, request).await {
            Err(Error::Validation(errors)) => assert!(errors.contains_key("cvv")),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert_eq!(f.gateway.call_count(), 0);
    }

    #[test]
    fn test_payment_methods() {
        let upi = PaymentForm {
            method: Some("UPI".to_string()),
            upi_id: Some("ada@upi".to_string()),
            ..Default::default()
        };
        assert_eq!(
            upi.validate().unwrap(),
            PaymentMethod::Upi {
                upi_id: "ada@upi".to_string()
            }
        );

        let cod = PaymentForm {
            method: Some("cod".to_string()),
            ..Default::default()
        };
        assert_eq!(cod.validate().unwrap(), PaymentMethod::Cod);

        let unknown = PaymentForm {
            method: Some("barter".to_string()),
            ..Default::default()
        };
        assert!(matches!(unknown.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_card_number_reduced_to_last4() {
        let method = card_request().payment.validate().unwrap();
        assert_eq!(
            method,
            PaymentMethod::Card {
                card_holder: "Ada Lovelace".to_string(),
                last4: "1234".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_saved_shipping_must_belong_to_user() {
        let f = fixture(ScriptedGateway::approving()).await;
        fill_cart(&f).await;
        User::create(&f.pool, "other@example.com", "Other", "hash", Role::User)
            .await
            .unwrap();
        let foreign = f
            .pipeline
            .save_shipping("other@example.com", &shipping_form())
            .await
            .unwrap();

        let request = CheckoutRequest {
            shipping_id: Some(foreign),
            ..card_request()
        };
        let result = f.pipeline.checkout(BUYER, request).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(f.gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn test_checkout_with_saved_shipping() {
        let f = fixture(ScriptedGateway::approving()).await;
        fill_cart(&f).await;
        let shipping_id = f.pipeline.save_shipping(BUYER, &shipping_form()).await.unwrap();

        let request = CheckoutRequest {
            shipping_id: Some(shipping_id),
            shipping: ShippingForm::default(),
            payment: PaymentForm {
                method: Some("cod".to_string()),
                ..Default::default()
            },
        };
        let receipt = f.pipeline.checkout(BUYER, request).await.unwrap();
        let details = f
            .pipeline
            .order_details(receipt.order_id, BUYER, false)
            .await
            .unwrap();
        assert_eq!(details.order.shipping_id, Some(shipping_id));
    }

    #[tokio::test]
    async fn test_save_shipping_keeps_cart() {
        let f = fixture(ScriptedGateway::approving()).await;
        fill_cart(&f).await;

        f.pipeline.save_shipping(BUYER, &shipping_form()).await.unwrap();
        assert_eq!(f.cart.get_cart(BUYER).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_save_shipping_unknown_user() {
        let f = fixture(ScriptedGateway::approving()).await;
        let result = f
            .pipeline
            .save_shipping("ghost@example.com", &shipping_form())
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_checkouts_place_one_order() {
        let f = fixture(ScriptedGateway::approving()).await;
        fill_cart(&f).await;

        let (a, b) = tokio::join!(
            f.pipeline.checkout(BUYER, card_request()),
            f.pipeline.checkout(BUYER, card_request())
        );

        let placed = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(placed, 1);
        assert!(matches!(a, Err(Error::EmptyCart)) || matches!(b, Err(Error::EmptyCart)));
        assert_eq!(Order::count_for_user(&f.pool, BUYER).await.unwrap(), 1);
        assert!(f.pipeline.locks.is_empty());
    }

    #[tokio::test]
    async fn test_order_visible_to_owner_and_admin_only() {
        let f = fixture(ScriptedGateway::approving()).await;
        fill_cart(&f).await;
        let receipt = f.pipeline.checkout(BUYER, card_request()).await.unwrap();

        let stranger = f
            .pipeline
            .order_details(receipt.order_id, "other@example.com", false)
            .await;
        assert!(matches!(stranger, Err(Error::NotFound(_))));

        assert!(f
            .pipeline
            .order_details(receipt.order_id, "admin@example.com", true)
            .await
            .is_ok());
    }
}
