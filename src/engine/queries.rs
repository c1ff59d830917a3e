use ulid::Ulid;

use crate::limits::MAX_QUERY_WINDOW_MS;
use crate::model::{Booking, Ms, Span};

use super::{Engine, EngineError};

impl Engine {
    /// Range-filtered listing, optionally scoped to one room. ACTIVE and
    /// PENDING records are always included; CANCELLED ones only when the
    /// config says so. Listings are not serialized against writers.
    pub async fn list_bookings(
        &self,
        room_id: Option<Ulid>,
        range_start: Ms,
        range_end: Ms,
    ) -> Result<Vec<Booking>, EngineError> {
        if range_end <= range_start {
            return Err(EngineError::Validation("empty or inverted range"));
        }
        if range_end - range_start > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let range = Span::new(range_start, range_end);
        Ok(self
            .store
            .list(room_id, range, self.config.list_includes_cancelled)
            .await?)
    }

    pub async fn get_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        Ok(self.store.get(id).await?)
    }
}
