//! Memorial Storefront - embedded commerce backend
//!
//! Library backing a funeral-home storefront app: product catalogs per
//! target screen, a persisted cart, checkout against a local SQLite store,
//! and best-effort submission of orders to a remote endpoint with a
//! pending queue for offline sessions. Everything hangs off [`AppState`];
//! no module keeps global state, so hosts and tests construct as many
//! independent instances as they need.

use std::path::Path;

use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod api;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod customers;
pub mod db;
pub mod error;
pub mod models;
pub mod orders;
pub mod price;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};
pub use models::{
    CartLine, Customer, CustomerDetails, NewProduct, OrderPayload, OrderRecord, PaymentMethod,
    Pricing, Product, TargetScreen,
};

/// Subdirectory of the app data dir holding key-value JSON storage.
const STORAGE_DIR_NAME: &str = "storage";

/// Initialize structured logging to the console. Honors `RUST_LOG`;
/// defaults to info with debug for this crate. Safe to call once per
/// process; hosts embedding their own subscriber should skip it.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,memorial_storefront=debug"));

    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .init();
}

/// Application root: database handle, cart, key-value storage, HTTP
/// client, and the connectivity channel feeding the pending-order
/// listener. Constructed once by the host and shared behind an `Arc`.
pub struct AppState {
    pub db: db::DbState,
    pub cart: cart::CartState,
    pub storage: storage::LocalStorage,
    pub pending: sync::PendingQueue,
    pub http: reqwest::Client,
    pub order_endpoint: String,
    pub cep_lookup_url: String,
    connectivity: watch::Sender<bool>,
}

impl AppState {
    /// Open (or create) the store under `app_data_dir`, hydrate the cart
    /// from persisted storage, and build the HTTP client.
    pub fn init(app_data_dir: &Path, order_endpoint: &str) -> Result<AppState> {
        info!("Starting memorial storefront v{}", env!("CARGO_PKG_VERSION"));

        let db = db::init(app_data_dir)?;
        let storage = storage::LocalStorage::new(&app_data_dir.join(STORAGE_DIR_NAME))?;

        let cart = cart::CartState::new(storage.clone());
        cart.load();

        let pending = sync::PendingQueue::new(storage.clone());

        // Assume online until the host reports otherwise.
        let (connectivity, _) = watch::channel(true);

        Ok(AppState {
            db,
            cart,
            storage,
            pending,
            http: api::build_client()?,
            order_endpoint: api::normalize_endpoint_url(order_endpoint),
            cep_lookup_url: api::DEFAULT_CEP_LOOKUP_URL.to_string(),
            connectivity,
        })
    }

    /// Report a reachability change from the host platform. Feeds the
    /// bounded connectivity listener spawned after a failed submission.
    pub fn set_connectivity(&self, online: bool) {
        // send_replace never fails; the state is kept even with no
        // listener currently subscribed.
        self.connectivity.send_replace(online);
    }

    fn transport(&self) -> sync::HttpTransport {
        sync::HttpTransport::new(self.http.clone(), &self.order_endpoint)
    }

    /// Commit the current cart as an order and submit it to the remote
    /// endpoint. When submission fails the payload lands in the pending
    /// queue and a connectivity listener retries it for a bounded window.
    /// The local order is durable either way.
    pub async fn place_order(&self, form: &checkout::CheckoutForm) -> Result<checkout::CheckoutReceipt> {
        let receipt = checkout::commit(&self.db, &self.cart, form)?;

        let transport = self.transport();
        let delivered = self
            .pending
            .send_or_queue(&transport, receipt.payload.clone())
            .await?;
        if !delivered {
            warn!(order_id = receipt.order_id, "order queued; watching connectivity");
            tokio::spawn(sync::watch_connectivity(
                self.pending.clone(),
                transport,
                self.connectivity.subscribe(),
                sync::DEFAULT_LISTEN_WINDOW,
            ));
        }

        Ok(receipt)
    }

    /// Retry every queued order. Hosts call this on screen-focus events.
    pub async fn flush_pending_orders(&self) -> Result<usize> {
        self.pending.flush(&self.transport()).await
    }

    /// Resolve a CEP to address fields via the configured lookup service.
    pub async fn lookup_address(&self, cep: &str) -> Result<Option<api::AddressFields>> {
        api::lookup_address(&self.http, &self.cep_lookup_url, cep).await
    }
}
