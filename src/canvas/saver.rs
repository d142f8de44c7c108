use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use tokio::{
    sync::{mpsc::UnboundedReceiver, Mutex as AsyncMutex},
    task::JoinHandle,
    time::{sleep, Duration},
};

use super::{CanvasData, CanvasFile};
use crate::{
    editor::SharedEditor,
    error::DiscourseError,
    event::CanvasEvent,
    vault::{Vault, VaultPath},
};

struct SaverState {
    vault: Arc<dyn Vault>,
    editor: SharedEditor,
    path: VaultPath,
    debounce: Duration,
    generation: AtomicU64,
    writes: AtomicUsize,
    /// Held for the duration of a write, so a save in flight defers the next one.
    in_flight: AsyncMutex<()>,
    last_good: Mutex<String>,
}

/// Writes the editor's state back to its canvas file, debounced after the last mutation.
#[derive(Clone)]
pub struct CanvasSaver {
    state: Arc<SaverState>,
}

impl CanvasSaver {
    /// `last_good` is the canvas file content the editor was loaded from.
    pub fn new(
        vault: Arc<dyn Vault>,
        editor: SharedEditor,
        path: VaultPath,
        last_good: String,
    ) -> Self {
        let debounce = editor.lock().config().save_debounce();
        CanvasSaver {
            state: Arc::new(SaverState {
                vault,
                editor,
                path,
                debounce,
                generation: AtomicU64::new(0),
                writes: AtomicUsize::new(0),
                in_flight: AsyncMutex::new(()),
                last_good: Mutex::new(last_good),
            }),
        }
    }

    /// Read a canvas file into `editor` and return a saver for it.
    pub async fn open(
        vault: Arc<dyn Vault>,
        editor: SharedEditor,
        path: VaultPath,
    ) -> Result<Self, DiscourseError> {
        let text = vault.read_text(&path).await?;
        let file = CanvasFile::parse(&text)?;
        file.data.load_into(&mut editor.lock())?;
        tracing::info!("[CanvasSaver] Loaded {path}");
        Ok(CanvasSaver::new(vault, editor, path, text))
    }

    pub fn path(&self) -> &VaultPath {
        &self.state.path
    }

    /// Number of completed writes.
    pub fn write_count(&self) -> usize {
        self.state.writes.load(Ordering::SeqCst)
    }

    pub fn last_good(&self) -> String {
        self.state.last_good.lock().clone()
    }

    /// Schedule a save. Requests arriving within the debounce window collapse into one write of
    /// the state at the end of the window.
    pub fn request_save(&self) -> JoinHandle<()> {
        let generation = self.state.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let saver = self.clone();
        tokio::spawn(async move {
            sleep(saver.state.debounce).await;
            if saver.is_superseded(generation) {
                return;
            }
            let _in_flight = saver.state.in_flight.lock().await;
            if saver.is_superseded(generation) {
                return;
            }
            if let Err(e) = saver.write().await {
                saver.recover(e);
            }
        })
    }

    /// Write immediately, waiting for any save in flight.
    pub async fn save_now(&self) -> Result<(), DiscourseError> {
        let _in_flight = self.state.in_flight.lock().await;
        match self.write().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.recover(e.clone());
                Err(e)
            }
        }
    }

    fn is_superseded(&self, generation: u64) -> bool {
        self.state.generation.load(Ordering::SeqCst) != generation
    }

    #[tracing::instrument(skip_all)]
    async fn write(&self) -> Result<(), DiscourseError> {
        let state = &self.state;
        let on_disk = state.vault.read_text(&state.path).await?;
        let mut data = CanvasFile::parse(&on_disk)?.data;
        {
            let editor = state.editor.lock();
            data.update_from(&editor)?;
        }
        let text = CanvasFile::replace_data(&on_disk, &data)?;
        if text != on_disk {
            state.vault.write_text(&state.path, &text).await?;
        }
        *state.last_good.lock() = text;
        let writes = state.writes.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!("[CanvasSaver] Saved {} (write #{writes})", state.path);
        Ok(())
    }

    /// Put the editor back on the last content known to be on disk and tell the user.
    fn recover(&self, error: DiscourseError) {
        let state = &self.state;
        tracing::error!("[CanvasSaver] Saving {} failed: {error}", state.path);
        let last_good = state.last_good.lock().clone();
        let mut editor = state.editor.lock();
        match CanvasFile::parse(&last_good).map(|file| file.data) {
            Ok(data) => {
                if let Err(e) = CanvasData::load_into(&data, &mut editor) {
                    tracing::error!("[CanvasSaver] Reload of {} failed: {e}", state.path);
                }
            }
            Err(e) => tracing::error!("[CanvasSaver] Last good content unreadable: {e}"),
        }
        let (title, description) = error.toast();
        editor.error(&title, &description);
    }

    /// Request a save for every local mutation the editor reports.
    pub fn listen(&self, mut events: UnboundedReceiver<CanvasEvent>) -> JoinHandle<()> {
        let saver = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if event.is_local_mutation() {
                    tracing::trace!("[CanvasSaver] {event} -> save requested");
                    saver.request_save();
                }
            }
        })
    }
}
