//! Stream Session Manager
//!
//! Owns at most one `StreamConnection` per slot. Starting a slot replaces
//! whatever was running there; the three slots never affect each other.
//!
//! Every live connection is tagged with a generation number. Events are only
//! forwarded while the connection's generation is still the slot's current
//! one, so a straggler frame from a replaced or stopped connection is dropped
//! even if the transport delivers it late.

use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::accounts::CredentialResolver;
use crate::streaming::config::StreamingConfig;
use crate::streaming::connection::{StreamConnection, StreamListener};
use crate::streaming::error::StreamingError;
use crate::streaming::transport::{ConnectRequest, Connector};
use crate::streaming::types::{Account, ConnectionState, DomainEvent, EventKind, Slot, SlotStatus};

/// Receives a slot's events. Callbacks run on connection I/O tasks while the
/// slot is locked, so they must not call back into the manager.
pub trait StreamSink: Send + Sync {
    fn on_update(&self, slot: Slot, status: Value);

    /// Only the `user` slot produces notifications
    fn on_notification(&self, slot: Slot, notification: Value);

    /// Status deletions arrive on every slot, including `local` and `public`.
    /// Hosts that only render updates can leave this as the default no-op.
    fn on_delete(&self, _slot: Slot, _status_id: String) {}

    fn on_error(&self, slot: Slot, error: &StreamingError);
}

struct ActiveStream {
    account_id: String,
    connection: StreamConnection,
}

#[derive(Default)]
struct SlotEntry {
    /// Generation of `active`, 0 when the slot is empty
    generation: u64,
    active: Option<ActiveStream>,
}

#[derive(Default)]
struct SlotTable {
    entries: [Mutex<SlotEntry>; 3],
}

impl SlotTable {
    fn lock(&self, slot: Slot) -> MutexGuard<'_, SlotEntry> {
        self.entries[slot.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Empty the slot, returning what was running there
    fn take(&self, slot: Slot) -> Option<ActiveStream> {
        let mut entry = self.lock(slot);
        entry.generation = 0;
        entry.active.take()
    }
}

pub struct StreamSessionManager {
    config: StreamingConfig,
    resolver: Arc<dyn CredentialResolver>,
    connector: Arc<dyn Connector>,
    table: Arc<SlotTable>,
    /// Serialises start/stop per slot
    commands: [tokio::sync::Mutex<()>; 3],
    next_generation: AtomicU64,
}

impl StreamSessionManager {
    pub fn new(
        config: StreamingConfig,
        resolver: Arc<dyn CredentialResolver>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            config,
            resolver,
            connector,
            table: Arc::new(SlotTable::default()),
            commands: Default::default(),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Start streaming `slot` for `account`, replacing any stream already on the slot.
    ///
    /// Failures before a connection is attempted are reported once to
    /// `sink.on_error` and returned. Transport failures arrive later through
    /// `sink.on_error` and empty the slot.
    pub async fn start_slot(
        &self,
        slot: Slot,
        account: Account,
        sink: Arc<dyn StreamSink>,
    ) -> Result<(), StreamingError> {
        let _command = self.commands[slot.index()].lock().await;
        log::info!("Starting {} stream for account {}", slot, account.id);

        let request = match self.prepare(slot, &account).await {
            Ok(request) => request,
            Err(err) => {
                log::error!(
                    "Cannot start {} stream for account {}: {}",
                    slot,
                    account.id,
                    err
                );
                if self.config.stop_previous_on_credential_error {
                    self.clear(slot);
                }
                sink.on_error(slot, &err);
                return Err(err);
            }
        };

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let listener = Arc::new(SlotForwarder {
            slot,
            generation,
            sink,
            table: Arc::downgrade(&self.table),
        });

        // Held across open so an immediate transport error cannot clear the
        // slot before the new connection is registered.
        let replaced = {
            let mut entry = self.table.lock(slot);
            let previous = entry.active.take();
            if let Some(previous) = &previous {
                previous.connection.stop();
            }
            entry.generation = generation;
            entry.active = Some(ActiveStream {
                account_id: account.id.clone(),
                connection: StreamConnection::open(
                    Arc::clone(&self.connector),
                    slot.endpoint(),
                    request,
                    listener,
                ),
            });
            previous
        };

        if let Some(previous) = replaced {
            log::info!(
                "Replaced {} stream of account {} with account {}",
                slot,
                previous.account_id,
                account.id
            );
        }
        Ok(())
    }

    /// Stop and forget the slot's stream. No-op when nothing is running.
    pub async fn stop_slot(&self, slot: Slot) {
        let _command = self.commands[slot.index()].lock().await;
        self.clear(slot);
    }

    pub async fn stop_all(&self) {
        for slot in Slot::ALL {
            self.stop_slot(slot).await;
        }
    }

    pub fn is_active(&self, slot: Slot) -> bool {
        self.table.lock(slot).active.is_some()
    }

    pub fn slot_state(&self, slot: Slot) -> Option<ConnectionState> {
        self.table
            .lock(slot)
            .active
            .as_ref()
            .map(|active| active.connection.state())
    }

    /// Snapshot of every occupied slot
    pub fn status(&self) -> Vec<SlotStatus> {
        Slot::ALL
            .iter()
            .filter_map(|slot| {
                let entry = self.table.lock(*slot);
                entry.active.as_ref().map(|active| SlotStatus {
                    slot: *slot,
                    account_id: active.account_id.clone(),
                    state: active.connection.state(),
                    dropped_frames: active.connection.dropped_frames(),
                })
            })
            .collect()
    }

    async fn prepare(&self, slot: Slot, account: &Account) -> Result<ConnectRequest, StreamingError> {
        let credentials = self.resolver.resolve(&account.id).await?;
        let url = self.config.stream_url(&credentials.domain, slot.endpoint())?;
        Ok(ConnectRequest {
            url,
            access_token: credentials.access_token,
        })
    }

    fn clear(&self, slot: Slot) {
        match self.table.take(slot) {
            Some(active) => {
                active.connection.stop();
                log::info!("Stopped {} stream for account {}", slot, active.account_id);
            }
            None => log::debug!("No {} stream to stop", slot),
        }
    }
}

impl Drop for StreamSessionManager {
    fn drop(&mut self) {
        for slot in Slot::ALL {
            if let Some(active) = self.table.take(slot) {
                active.connection.stop();
            }
        }
    }
}

/// Connection listener that routes a slot's events to its sink, provided the
/// connection is still the slot's current one
struct SlotForwarder {
    slot: Slot,
    generation: u64,
    sink: Arc<dyn StreamSink>,
    table: Weak<SlotTable>,
}

impl StreamListener for SlotForwarder {
    fn on_event(&self, event: DomainEvent) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        let entry = table.lock(self.slot);
        if entry.generation != self.generation {
            log::debug!("Suppressed stale {} event on {}", event.kind.as_str(), self.slot);
            return;
        }

        match event.kind {
            EventKind::Update => self.sink.on_update(self.slot, event.payload),
            EventKind::Notification => self.sink.on_notification(self.slot, event.payload),
            EventKind::Delete => {
                let status_id = match event.payload {
                    Value::String(id) => id,
                    other => other.to_string(),
                };
                self.sink.on_delete(self.slot, status_id);
            }
        }
    }

    fn on_error(&self, error: StreamingError) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        let mut entry = table.lock(self.slot);
        if entry.generation != self.generation {
            log::debug!("Suppressed stale error on {}: {}", self.slot, error);
            return;
        }

        // The failed connection is already closed; drop the reference so a
        // later start does not try to stop it.
        entry.generation = 0;
        let failed = entry.active.take();
        self.sink.on_error(self.slot, &error);
        drop(entry);
        drop(failed);
    }
}
