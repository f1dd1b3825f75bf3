//! Tauri commands for the streaming layer
//!
//! The frontend starts and stops slots; events come back on the bridge topics.

use std::sync::Arc;
use tauri::{AppHandle, State};

use crate::bridge::DispatchBridge;
use crate::streaming::{Account, Slot, SlotStatus, StreamSessionManager};

/// Managed state holding the process-wide streaming manager
pub struct StreamingState(pub Arc<StreamSessionManager>);

/// Start streaming `slot` for `account`. Failures are delivered on the
/// slot's error topic, not as a command error.
#[tauri::command]
pub async fn start_streaming(
    app: AppHandle,
    state: State<'_, StreamingState>,
    slot: Slot,
    account: Account,
) -> Result<(), String> {
    let sink = Arc::new(DispatchBridge::new(app));
    if let Err(e) = state.0.start_slot(slot, account, sink).await {
        log::debug!("start_streaming({}) failed, reported on error topic: {}", slot, e);
    }
    Ok(())
}

#[tauri::command]
pub async fn stop_streaming(state: State<'_, StreamingState>, slot: Slot) -> Result<(), String> {
    state.0.stop_slot(slot).await;
    Ok(())
}

#[tauri::command]
pub fn streaming_status(state: State<'_, StreamingState>) -> Vec<SlotStatus> {
    state.0.status()
}
