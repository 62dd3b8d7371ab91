// src/editor.rs
use crate::api::{
    proxy_url, upload_file_name, ApiError, HttpApi, MediaKind, TaskAccepted, TaskStatusResponse, TimelineRequest,
    VideoApi, VideoLibrary,
};
use crate::config::ClientConfig;
use crate::edit::EditRequest;
use crate::playback::{
    CutMark, CutPoint, HeadlessPlayer, MediaElement, MediaMetadata, MediaReady, PlaybackError,
    PlaybackState, SelectedVideo,
};
use crate::tasks::{ActivePolls, PollHandle, PollOutcome, TaskKind, TaskRecord, TaskStatus};
use crate::timeline::{ClipId, Timeline, TimelineClip};
use crate::validator::{apply_cut_policy, validate_timeline, ValidationError};
use log::{debug, error, info, warn};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
    #[error("clip {0} is not on the timeline")]
    ClipNotFound(ClipId),
}

/// Keys the editor reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Space,
    ArrowLeft,
    ArrowRight,
    Enter,
    Char(char),
}

impl Key {
    /// Maps DOM-style key names (`" "`, `"ArrowLeft"`, `"Enter"`, `"i"`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            " " | "Space" | "Spacebar" => Some(Self::Space),
            "ArrowLeft" | "Left" => Some(Self::ArrowLeft),
            "ArrowRight" | "Right" => Some(Self::ArrowRight),
            "Enter" => Some(Self::Enter),
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(Self::Char(c)),
                    _ => None,
                }
            }
        }
    }
}

// --- STATE ---

#[derive(Clone, Debug, Default)]
pub struct EditorState {
    pub library: VideoLibrary,
    pub selected: Option<SelectedVideo>,
    pub playback: PlaybackState,
    pub cut: CutMark,
    pub timeline: Timeline,
    /// Every task of the session, in creation order.
    pub tasks: Vec<TaskRecord>,
    pub status_line: String,
    library_seq_issued: u64,
    library_seq_applied: u64,
    load_generation: u64,
}

impl EditorState {
    pub fn task(&self, task_id: &str) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    fn task_mut(&mut self, task_id: &str) -> Option<&mut TaskRecord> {
        self.tasks.iter_mut().find(|t| t.task_id == task_id)
    }

    fn register_task(&mut self, record: TaskRecord) {
        match self.task_mut(&record.task_id) {
            Some(existing) => *existing = record,
            None => self.tasks.push(record),
        }
    }
}

/// A media load started by `Editor::load_video`.
#[derive(Debug)]
pub struct PendingLoad {
    generation: u64,
    ready: MediaReady,
}

impl PendingLoad {
    pub fn url(&self) -> &str {
        self.ready.url()
    }
}

/// A task queued on the backend together with the chain polling it.
#[derive(Debug)]
pub struct TaskTicket {
    pub task_id: String,
    pub poll: PollHandle,
}

struct Inner {
    api: Arc<dyn VideoApi>,
    player: Arc<dyn MediaElement>,
    config: ClientConfig,
    state: Mutex<EditorState>,
    polls: ActivePolls,
}

// --- THE ENGINE ---

/// Client session of the editor. Cloning yields another handle on the same
/// session.
#[derive(Clone)]
pub struct Editor {
    inner: Arc<Inner>,
}

impl Editor {
    pub fn new(api: Arc<dyn VideoApi>, player: Arc<dyn MediaElement>, config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                player,
                config,
                state: Mutex::new(EditorState::default()),
                polls: ActivePolls::new(),
            }),
        }
    }

    /// Session against the HTTP backend with a display-less player.
    pub fn connect(config: ClientConfig) -> Result<Self, ApiError> {
        let api = HttpApi::new(&config)?;
        Ok(Self::new(
            Arc::new(api),
            Arc::new(HeadlessPlayer::new()),
            config,
        ))
    }

    fn state(&self) -> MutexGuard<'_, EditorState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, text: impl Into<String>) {
        self.state().status_line = text.into();
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn snapshot(&self) -> EditorState {
        self.state().clone()
    }

    pub fn library(&self) -> VideoLibrary {
        self.state().library.clone()
    }

    pub fn selected(&self) -> Option<SelectedVideo> {
        self.state().selected.clone()
    }

    pub fn playback(&self) -> PlaybackState {
        self.state().playback
    }

    pub fn cut_mark(&self) -> CutMark {
        self.state().cut
    }

    pub fn timeline(&self) -> Vec<TimelineClip> {
        self.state().timeline.clips().to_vec()
    }

    pub fn tasks(&self) -> Vec<TaskRecord> {
        self.state().tasks.clone()
    }

    pub fn task(&self, task_id: &str) -> Option<TaskRecord> {
        self.state().task(task_id).cloned()
    }

    pub fn status_line(&self) -> String {
        self.state().status_line.clone()
    }

    // --- LIBRARY ---

    /// Replaces the library with the server's listing. A response that
    /// arrives after a newer one has been applied is dropped.
    pub async fn fetch_videos(&self) -> Result<VideoLibrary, ApiError> {
        let seq = {
            let mut state = self.state();
            state.library_seq_issued += 1;
            state.library_seq_issued
        };

        let library = match self.inner.api.list_videos().await {
            Ok(library) => library,
            Err(e) => {
                error!("[Editor] Failed to fetch videos: {}", e);
                return Err(e);
            }
        };

        let mut state = self.state();
        if seq > state.library_seq_applied {
            state.library_seq_applied = seq;
            info!(
                "[Editor] Library #{}: {} originals, {} proxies",
                seq,
                library.originals.len(),
                library.proxies.len()
            );
            state.library = library.clone();
            Ok(library)
        } else {
            debug!(
                "[Editor] Dropping stale library #{} (have #{})",
                seq, state.library_seq_applied
            );
            Ok(state.library.clone())
        }
    }

    pub async fn health_check(&self) -> Result<String, ApiError> {
        Ok(self.inner.api.health().await?.message)
    }

    // --- TASKS ---

    async fn start_task(
        &self,
        accepted: Result<TaskAccepted, ApiError>,
        kind: TaskKind,
        filename: String,
        status_text: &str,
    ) -> Result<TaskTicket, ApiError> {
        let task_id = match accepted.and_then(TaskAccepted::into_task_id) {
            Ok(task_id) => task_id,
            Err(e) => {
                error!("[Editor] {:?} request for {} failed: {}", kind, filename, e);
                self.set_status(format!("Error: {}", e));
                return Err(e);
            }
        };

        info!("[Editor] {:?} task {} queued for {}", kind, task_id, filename);
        {
            let mut state = self.state();
            state.register_task(TaskRecord::new(task_id.clone(), kind, filename));
            state.status_line = status_text.to_string();
        }

        let poll = self.poll_task_status(&task_id).await;
        Ok(TaskTicket { task_id, poll })
    }

    pub async fn upload_video(
        &self,
        file_name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<TaskTicket, ApiError> {
        let file_name = file_name.into();
        info!("[Editor] Uploading {} ({} bytes)", file_name, bytes.len());
        let accepted = self.inner.api.upload_video(file_name.clone(), bytes).await;
        self.start_task(accepted, TaskKind::Upload, file_name, "Processing proxy...")
            .await
    }

    /// Uploads a file from disk. The body is streamed, not buffered.
    pub async fn upload_path(&self, path: &Path) -> Result<TaskTicket, ApiError> {
        let file_name = upload_file_name(path)?;
        info!("[Editor] Uploading {:?}", path);
        let accepted = self.inner.api.upload_file(path.to_path_buf()).await;
        self.start_task(accepted, TaskKind::Upload, file_name, "Processing proxy...")
            .await
    }

    pub async fn submit_edit(&self, request: EditRequest) -> Result<TaskTicket, ApiError> {
        let filename = request.filename.clone();
        info!("[Editor] Submitting {} edit of {}", request.edit_type(), filename);
        let accepted = self.inner.api.submit_edit(request).await;
        self.start_task(accepted, TaskKind::Edit, filename, "Edit job started...")
            .await
    }

    /// Queues a server-side cut of the selected video's original between the
    /// current marks.
    pub async fn cut_selection(&self) -> Result<TaskTicket, EditorError> {
        let (name, mark) = {
            let state = self.state();
            let selected = state.selected.as_ref().ok_or(ValidationError::NoSelection)?;
            (selected.name.clone(), state.cut)
        };
        let mark = apply_cut_policy(mark, self.inner.config.cut_policy)?;
        Ok(self
            .submit_edit(EditRequest::cut(name, mark.start, mark.end))
            .await?)
    }

    /// Sends the whole timeline for rendering. Returns `None` without any
    /// request when the timeline is empty.
    pub async fn process_timeline(&self) -> Result<Option<TaskTicket>, ApiError> {
        let clips = {
            let state = self.state();
            if let Err(e) = validate_timeline(&state.timeline) {
                debug!("[Editor] Not processing timeline: {}", e);
                return Ok(None);
            }
            state.timeline.clips().to_vec()
        };

        let output_filename = format!("timeline_{}.mp4", uuid::Uuid::new_v4());
        info!(
            "[Editor] Submitting {} clips as {}",
            clips.len(),
            output_filename
        );
        let request = TimelineRequest {
            clips,
            output_filename: output_filename.clone(),
        };
        let accepted = self.inner.api.process_timeline(request).await;
        self.start_task(
            accepted,
            TaskKind::Timeline,
            output_filename,
            "Processing timeline...",
        )
        .await
        .map(Some)
    }

    fn record_status(&self, task_id: &str, response: TaskStatusResponse) -> TaskStatus {
        let status = response.status;
        let mut state = self.state();
        match state.task_mut(task_id) {
            Some(record) => record.update(status.clone(), response.result),
            None => debug!("[Editor] Status for untracked task {}", task_id),
        }
        state.status_line = status.to_string();
        status
    }

    fn record_poll_error(&self, task_id: &str, e: &ApiError) {
        warn!("[Editor] Polling {} stopped: {}", task_id, e);
        let mut state = self.state();
        if let Some(record) = state.task_mut(task_id) {
            record.fail_request(e.to_string());
        }
        state.status_line = format!("Error: {}", e);
    }

    /// Starts (or restarts) the poll chain of `task_id`.
    pub async fn poll_task_status(&self, task_id: &str) -> PollHandle {
        let join = tokio::spawn(run_poll_chain(self.clone(), task_id.to_string()));
        self.inner.polls.track(task_id, join.abort_handle()).await;
        PollHandle::new(task_id, join)
    }

    /// Restarts polling of a known task whose chain stopped on an error.
    pub async fn resume_polling(&self, task_id: &str) -> Option<PollHandle> {
        self.task(task_id)?;
        info!("[Editor] Resuming poll of {}", task_id);
        Some(self.poll_task_status(task_id).await)
    }

    /// Polls a task this session did not create.
    pub async fn track_task(&self, task_id: &str) -> PollHandle {
        {
            let mut state = self.state();
            if state.task(task_id).is_none() {
                state.register_task(TaskRecord::new(task_id, TaskKind::Unknown, ""));
            }
        }
        self.poll_task_status(task_id).await
    }

    /// Single status request. A SUCCESS refreshes the library.
    pub async fn check_status(&self, task_id: &str) -> Result<TaskStatus, ApiError> {
        let response = match self.inner.api.task_status(task_id.to_string()).await {
            Ok(response) => response,
            Err(e) => {
                self.record_poll_error(task_id, &e);
                return Err(e);
            }
        };
        let status = self.record_status(task_id, response);
        if status.is_success() && self.fetch_videos().await.is_err() {
            warn!("[Editor] Task {} succeeded but the library refresh failed", task_id);
        }
        Ok(status)
    }

    pub async fn cancel_poll(&self, task_id: &str) -> bool {
        self.inner.polls.cancel(task_id).await
    }

    pub async fn active_polls(&self) -> usize {
        self.inner.polls.active_count().await
    }

    /// Stops every poll chain. Call on teardown.
    pub async fn shutdown(&self) -> usize {
        let stopped = self.inner.polls.cancel_all().await;
        if stopped > 0 {
            info!("[Editor] Stopped {} poll chains", stopped);
        }
        stopped
    }

    // --- PREVIEW ---

    /// Selects the proxy of `name` and hands it to the media element. No
    /// existence check is made.
    pub fn load_video(&self, name: &str) -> PendingLoad {
        let url = proxy_url(&self.inner.config.api_url, name);
        let generation = {
            let mut state = self.state();
            state.selected = Some(SelectedVideo {
                name: name.to_string(),
                url: url.clone(),
            });
            state.playback = PlaybackState::default();
            state.cut = CutMark::default();
            state.load_generation += 1;
            state.load_generation
        };
        info!("[Editor] Loading {}", url);
        let ready = self.inner.player.load(&url);
        PendingLoad { generation, ready }
    }

    /// Waits for the media element to accept `load`. Fails if another video
    /// was loaded in the meantime.
    pub async fn wait_until_ready(&self, load: PendingLoad) -> Result<MediaMetadata, PlaybackError> {
        self.settle_load(load, |_| {}).await
    }

    /// Waits for `load`, then runs `on_ready` under the same lock that
    /// confirms no newer load has started.
    async fn settle_load<F>(&self, load: PendingLoad, on_ready: F) -> Result<MediaMetadata, PlaybackError>
    where
        F: FnOnce(&mut EditorState) + Send,
    {
        let PendingLoad { generation, ready } = load;
        let url = ready.url().to_string();
        let metadata = ready.wait().await?;
        let mut state = self.state();
        if state.load_generation != generation {
            return Err(PlaybackError::Superseded(url));
        }
        state.playback.duration = metadata.duration;
        on_ready(&mut *state);
        Ok(metadata)
    }

    pub fn on_time_update(&self, time: f64) {
        self.state().playback.current_time = time;
    }

    pub fn on_duration_change(&self, duration: f64) {
        self.state().playback.duration = duration;
    }

    pub fn on_play(&self) {
        self.state().playback.is_playing = true;
    }

    pub fn on_pause(&self) {
        self.state().playback.is_playing = false;
    }

    /// Returns whether playback is now running.
    pub fn toggle_play(&self) -> bool {
        let playing = {
            let mut state = self.state();
            state.playback.is_playing = !state.playback.is_playing;
            state.playback.is_playing
        };
        if playing {
            self.inner.player.play();
        } else {
            self.inner.player.pause();
        }
        playing
    }

    pub fn seek_by(&self, delta: f64) -> f64 {
        let target = {
            let mut state = self.state();
            let target = state.playback.seek_target(delta);
            state.playback.current_time = target;
            target
        };
        self.inner.player.seek(target);
        target
    }

    // --- CUTTING ---

    pub fn set_cut_point(&self, point: CutPoint) -> CutMark {
        let mut state = self.state();
        let time = state.playback.current_time;
        match point {
            CutPoint::Start => state.cut.start = time,
            CutPoint::End => state.cut.end = time,
        }
        debug!("[Editor] Cut {:?} at {:.2}s", point, time);
        state.cut
    }

    pub fn set_cut_mark(&self, mark: CutMark) {
        self.state().cut = mark;
    }

    pub fn add_to_timeline(&self) -> Result<TimelineClip, ValidationError> {
        let mut state = self.state();
        let name = state
            .selected
            .as_ref()
            .map(|s| s.name.clone())
            .ok_or(ValidationError::NoSelection)?;
        let mark = apply_cut_policy(state.cut, self.inner.config.cut_policy)?;
        let clip = state.timeline.append(name, mark.start, mark.end);
        info!(
            "[Editor] Clip {} added ({:.2}s), timeline has {} clips",
            clip.id,
            clip.duration,
            state.timeline.len()
        );
        Ok(clip)
    }

    pub fn remove_clip(&self, id: ClipId) -> Option<TimelineClip> {
        self.state().timeline.remove(id)
    }

    pub fn reorder_clip(&self, id: ClipId, target_index: usize) -> Option<usize> {
        self.state().timeline.move_clip(id, target_index)
    }

    pub fn clear_timeline(&self) -> usize {
        self.state().timeline.clear()
    }

    /// Loads the clip's source, then seeks to its start once the media
    /// element reports ready and restores the clip bounds as cut marks.
    pub async fn play_timeline_clip(&self, id: ClipId) -> Result<(), EditorError> {
        let clip = self
            .state()
            .timeline
            .get(id)
            .cloned()
            .ok_or(EditorError::ClipNotFound(id))?;

        let load = self.load_video(&clip.video_name);
        let player = &self.inner.player;
        self.settle_load(load, |state| {
            state.cut = CutMark::new(clip.start_time, clip.end_time);
            state.playback.current_time = clip.start_time;
            player.seek(clip.start_time);
        })
        .await?;
        Ok(())
    }

    // --- KEYBOARD ---

    /// Returns whether the key was handled. Does nothing without a selected video.
    pub fn handle_key(&self, key: Key) -> bool {
        if self.state().selected.is_none() {
            return false;
        }
        let step = self.inner.config.seek_step_secs;
        match key {
            Key::Space => {
                self.toggle_play();
            }
            Key::ArrowLeft => {
                self.seek_by(-step);
            }
            Key::ArrowRight => {
                self.seek_by(step);
            }
            Key::Char('i' | 'I') => {
                self.set_cut_point(CutPoint::Start);
            }
            Key::Char('o' | 'O') => {
                self.set_cut_point(CutPoint::End);
            }
            Key::Enter => {
                if let Err(e) = self.add_to_timeline() {
                    warn!("[Editor] Clip not added: {}", e);
                }
            }
            Key::Char(_) => return false,
        }
        true
    }

    // --- FILES ---

    pub async fn download_proxy(&self, name: &str, dest: &Path) -> Result<u64, ApiError> {
        self.inner
            .api
            .download(MediaKind::Proxy, name.to_string(), dest.to_path_buf())
            .await
    }

    pub async fn download_original(&self, name: &str, dest: &Path) -> Result<u64, ApiError> {
        self.inner
            .api
            .download(MediaKind::Original, name.to_string(), dest.to_path_buf())
            .await
    }
}

/// Polls until the task leaves PENDING/RETRY/STARTED. No retry ceiling; the
/// chain ends on a terminal status, a request error, or cancellation.
async fn run_poll_chain(editor: Editor, task_id: String) -> PollOutcome {
    let interval = editor.inner.config.poll_interval();
    loop {
        let response = match editor.inner.api.task_status(task_id.clone()).await {
            Ok(response) => response,
            Err(e) => {
                editor.record_poll_error(&task_id, &e);
                return PollOutcome::Stopped(e.to_string());
            }
        };

        let status = editor.record_status(&task_id, response);
        if status.is_in_flight() {
            tokio::time::sleep(interval).await;
            continue;
        }

        if status.is_success() && editor.fetch_videos().await.is_err() {
            warn!("[Editor] Task {} succeeded but the library refresh failed", task_id);
        }
        info!("[Editor] Task {} finished with {}", task_id, status);
        return PollOutcome::Finished(status);
    }
}
