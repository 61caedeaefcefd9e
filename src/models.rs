//! Domain types shared across the storefront core.
//!
//! Pricing is a tagged variant rather than a pair of optional fields: a
//! product is either single-priced or plan-priced, and which one is legal
//! follows from its target screen.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Plan tiers for the Parque catalog.
pub const PARQUE_PLANS: &[&str] = &["Bronze", "Ouro", "Diamante", "Diamante Plus"];
/// Plan tiers for the Planos catalog.
pub const PLANOS_PLANS: &[&str] = &["Standard", "Master", "Prime"];

/// Catalog a product belongs to. Determines the backing table and which
/// pricing shape is legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetScreen {
    Funeraria,
    Parque,
    Planos,
}

impl TargetScreen {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetScreen::Funeraria => "Funeraria",
            TargetScreen::Parque => "Parque",
            TargetScreen::Planos => "Planos",
        }
    }

    /// Parse a stored tag. Unknown tags are `None`.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "Funeraria" => Some(TargetScreen::Funeraria),
            "Parque" => Some(TargetScreen::Parque),
            "Planos" => Some(TargetScreen::Planos),
            _ => None,
        }
    }

    /// The closed plan-name set for plan-bearing catalogs, `None` for
    /// single-priced ones.
    pub fn plan_names(&self) -> Option<&'static [&'static str]> {
        match self {
            TargetScreen::Parque => Some(PARQUE_PLANS),
            TargetScreen::Planos => Some(PLANOS_PLANS),
            TargetScreen::Funeraria => None,
        }
    }
}

impl fmt::Display for TargetScreen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Product pricing: exactly one shape per product.
///
/// Price values are localized currency strings ("R$ 1.234,56") exactly as
/// entered; numeric resolution happens in [`crate::price`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pricing {
    /// One price for the whole product (generic catalogs).
    Single(String),
    /// Plan-name to price mapping (Parque / Planos catalogs).
    Plans(BTreeMap<String, String>),
}

impl Pricing {
    pub fn plans(pairs: &[(&str, &str)]) -> Self {
        Pricing::Plans(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

/// A catalog product as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    /// Quantity on hand, never negative.
    pub quantity: i64,
    pub description: String,
    /// Ordered list of image references.
    pub images: Vec<String>,
    pub category: String,
    pub target_screen: TargetScreen,
    pub pricing: Pricing,
}

/// Insert/update payload for a product. The generated row id is not
/// returned on insert; callers re-query by other means.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub name: String,
    pub quantity: i64,
    pub description: String,
    pub images: Vec<String>,
    pub category: String,
    pub target_screen: TargetScreen,
    pub pricing: Pricing,
}

/// One cart line: a product snapshot plus selection state.
///
/// Dedup identity is the (product id, selected plan) pair; a present line
/// always has `quantity >= 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product: Product,
    pub selected_plan: Option<String>,
    pub quantity: u32,
}

impl CartLine {
    /// Whether this line matches the given dedup identity.
    pub fn matches(&self, product_id: i64, selected_plan: Option<&str>) -> bool {
        self.product.id == product_id && self.selected_plan.as_deref() == selected_plan
    }
}

/// Customer form input. CPF may arrive formatted; it is normalized to
/// digits before lookup or insert.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerDetails {
    pub name: String,
    pub cpf: String,
    pub cep: String,
    pub address: String,
    pub number: String,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
}

/// A persisted customer row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub cpf: String,
    pub cep: String,
    pub address: String,
    pub number: String,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
}

/// Closed set of accepted payment methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    Debito,
    Credito,
    Boleto,
    PagarNaFuneraria,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Debito => "Débito",
            PaymentMethod::Credito => "Crédito",
            PaymentMethod::Boleto => "Boleto",
            PaymentMethod::PagarNaFuneraria => "Pagar na Funerária",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Débito" => Some(PaymentMethod::Debito),
            "Crédito" => Some(PaymentMethod::Credito),
            "Boleto" => Some(PaymentMethod::Boleto),
            "Pagar na Funerária" => Some(PaymentMethod::PagarNaFuneraria),
            _ => None,
        }
    }

    /// Only credit payments carry an installment count.
    pub fn requires_installments(&self) -> bool {
        matches!(self, PaymentMethod::Credito)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An order as read back from the store, joined to its customer and
/// payment-type rows.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRecord {
    pub id: i64,
    pub user_id: i64,
    pub payment_type_id: i64,
    pub customer_name: String,
    pub payment_method: String,
    pub installments: Option<i64>,
    /// Line-item snapshot frozen at commit time; later product edits never
    /// affect it.
    pub items: Vec<CartLine>,
    pub total: f64,
    pub created_at: String,
}

/// One line of a remote order submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: i64,
    pub name: String,
    /// Resolved unit price (plan-aware), in numeric form.
    pub price: f64,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_plan: Option<String>,
    pub category: String,
    pub description: String,
    pub images: Vec<String>,
}

/// Payload POSTed to the remote order endpoint and persisted verbatim in
/// the pending queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub id: String,
    pub items: Vec<OrderItem>,
    pub total: f64,
    pub date: String,
    pub customer_name: String,
    pub customer_cpf: String,
}
