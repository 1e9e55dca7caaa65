//! REST snapshot lookup for late-joining passive viewers.
//!
//! A screen display opened mid-round cannot assume it was subscribed before
//! the round began, so before attaching to the room channel it fetches
//! `GET /api/room/{code}/state`, which returns the equivalent of a
//! `ROOM_STATE` event. Feeding the result through
//! [`RoomProjection::apply`](crate::room::RoomProjection::apply) seeds the
//! projection exactly as the broadcast snapshot would.
//!
//! Only available with the `rest-lookup` feature.

use crate::error::{BuzzerError, Result};
use crate::protocol::{RoomCode, ServerEvent};

/// Fetch a full room snapshot from the engine's REST lookup.
///
/// `base_url` is the engine's HTTP origin (e.g. `http://localhost:8080`);
/// trailing slashes are tolerated.
///
/// # Errors
///
/// Returns [`BuzzerError::RoomNotFound`] when the engine reports 404 and
/// [`BuzzerError::Lookup`] for any other HTTP or decoding failure.
///
/// # Example
///
/// ```rust,ignore
/// let code = RoomCode::new("ab12");
/// let snapshot = rest::fetch_room_snapshot("http://localhost:8080", &code).await?;
/// view.apply(&snapshot);
/// ```
pub async fn fetch_room_snapshot(base_url: &str, code: &RoomCode) -> Result<ServerEvent> {
    let url = format!("{}/api/room/{code}/state", base_url.trim_end_matches('/'));
    tracing::debug!(%url, "fetching room snapshot");

    let response = reqwest::get(&url)
        .await
        .map_err(|e| BuzzerError::Lookup(e.to_string()))?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(BuzzerError::RoomNotFound);
    }
    let response = response
        .error_for_status()
        .map_err(|e| BuzzerError::Lookup(e.to_string()))?;

    let event: ServerEvent = response
        .json()
        .await
        .map_err(|e| BuzzerError::Lookup(e.to_string()))?;

    match event {
        snapshot @ ServerEvent::RoomState { .. } => Ok(snapshot),
        other => Err(BuzzerError::Lookup(format!(
            "expected a ROOM_STATE snapshot, got {other:?}"
        ))),
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_host_is_a_lookup_error() {
        let err = fetch_room_snapshot("http://127.0.0.1:1", &RoomCode::new("AB12"))
            .await
            .unwrap_err();
        assert!(matches!(err, BuzzerError::Lookup(_)));
    }
}
