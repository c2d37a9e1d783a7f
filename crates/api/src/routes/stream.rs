//! MJPEG Video Feed

use async_stream::stream;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures::Stream;
use session::FramePacket;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::AppState;

pub const BOUNDARY: &str = "frame";

/// One multipart part carrying a JPEG
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let header = format!("--{BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n");
    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

/// Multipart parts for every frame the session publishes.
///
/// Slow readers skip frames instead of buffering them. Ends when the
/// session stops.
pub fn frame_parts(mut frames: broadcast::Receiver<FramePacket>) -> impl Stream<Item = Result<Bytes, Infallible>> {
    stream! {
        loop {
            match frames.recv().await {
                Ok(packet) => yield Ok::<_, Infallible>(multipart_part(&packet.jpeg)),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Video feed client lagging");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

/// Stream annotated frames of the caller's active session
pub async fn video_feed(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, ApiError> {
    let Some(frames) = state.coordinator.subscribe_frames(&user)? else {
        return Err(ApiError::not_found(
            "NO_ACTIVE_SESSION",
            "Start monitoring before opening the video feed",
        ));
    };

    Ok((
        [
            (header::CONTENT_TYPE, format!("multipart/x-mixed-replace; boundary={BOUNDARY}")),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(frame_parts(frames)),
    )
        .into_response())
}
