//! Order/payment saga over a transactional outbox and inbox.
//!
//! The crate holds what both services share: contracts, store ports, the
//! relay, the order state machine and the payment saga engine. Each service
//! owns its own tables and routes; the Postgres and Kafka plumbing they build
//! on sits behind the `postgres` and `kafka` features. The in-memory adapters
//! are always available.

pub mod accounts;
pub mod api;
pub mod consumer;
pub mod error;
pub mod events;
pub mod memory;
pub mod models;
pub mod orders;
pub mod ports;
pub mod relay;
pub mod retry;
pub mod saga;

#[cfg(feature = "kafka")]
pub mod kafka;
#[cfg(feature = "postgres")]
pub mod pg;

pub use accounts::AccountService;
pub use consumer::{consume_queue, handle_until_done, Handled, InboxWriter};
pub use error::{AccountError, DeliveryError, OrderError, StoreError};
pub use events::{PaymentRequested, PaymentResult, Topology};
pub use models::{Account, NewMessage, Order, OrderStatus, PaymentRecord, StoredMessage};
pub use orders::{CreateOrder, OrderStateMachine, Resolution};
pub use ports::{
    Delivery, LedgerStore, LedgerTx, MessageHandler, MessageLog, MessagePublisher, OrderStore,
    StoreResult,
};
pub use relay::{Publish, Relay, TickReport};
pub use retry::StartupRetry;
pub use saga::{PaymentOutcome, PaymentSaga};
