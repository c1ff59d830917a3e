pub mod catalog;
pub mod config;
pub mod conflict;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod store;
pub mod wal;

pub use catalog::{RoomCatalog, StaticCatalog};
pub use config::{ApprovalPolicy, EngineConfig, OpeningHours, RetryPolicy};
pub use engine::{Engine, EngineError};
pub use model::{Booking, BookingRequest, BookingState, Identity, Ms, Role, Room, Span};
pub use store::{ReservationStore, StoreError, WalStore};
