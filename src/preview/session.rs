// ============================================================================
// PREVIEW SESSION: the display lane event loop
// ============================================================================
//
// Editors and the render worker post into one channel, so edits and
// completions are handled strictly one after another on this lane.  That
// serial order is what makes the coalescer's state machine race-free.
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use super::SessionError;
use super::coalescer::{DisplaySink, RenderCoalescer, RenderCompletion, RenderJob, RequestUpdate};
use super::worker::RenderWorker;
use crate::filter::{FilterParams, ParamValue};
use crate::render::RenderEngine;
use crate::{log_err, log_info, log_warn};

pub enum LaneEvent {
    Edit(RequestUpdate),
    Rendered(RenderCompletion),
    /// Write the current request to a preset file.
    SavePreset(PathBuf),
    /// Stop once every queued edit has been rendered.
    Shutdown,
    /// The last editor handle was dropped; wakes the lane so it can drain
    /// and stop.
    EditorsGone,
}

/// Cloneable entry point for input editors.  Every method returns `false`
/// once the session has gone away.  Dropping the last handle ends the
/// session the same way `shutdown` does.
pub struct EditorHandle {
    events: Sender<LaneEvent>,
    live: Arc<AtomicUsize>,
}

impl Clone for EditorHandle {
    fn clone(&self) -> Self {
        Self::new(self.events.clone(), self.live.clone())
    }
}

impl Drop for EditorHandle {
    fn drop(&mut self) {
        if self.live.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.events.send(LaneEvent::EditorsGone);
        }
    }
}

impl EditorHandle {
    fn new(events: Sender<LaneEvent>, live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self { events, live }
    }

    pub fn select_filter(&self, name: impl Into<String>) -> bool {
        self.post(LaneEvent::Edit(RequestUpdate::SelectFilter(name.into())))
    }

    pub fn set_param(&self, key: impl Into<String>, value: ParamValue) -> bool {
        self.post(LaneEvent::Edit(RequestUpdate::SetParam(key.into(), value)))
    }

    pub fn merge_params(&self, params: FilterParams) -> bool {
        self.post(LaneEvent::Edit(RequestUpdate::MergeParams(params)))
    }

    pub fn save_preset(&self, path: impl Into<PathBuf>) -> bool {
        self.post(LaneEvent::SavePreset(path.into()))
    }

    pub fn shutdown(&self) -> bool {
        self.post(LaneEvent::Shutdown)
    }

    fn post(&self, event: LaneEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

pub struct PreviewSession<S: DisplaySink> {
    coalescer: RenderCoalescer,
    sink: S,
    events: Receiver<LaneEvent>,
    sender: Sender<LaneEvent>,
    /// Editor handles currently alive.
    live_editors: Arc<AtomicUsize>,
    worker: RenderWorker,
    shutting_down: bool,
    rejected: u64,
}

impl<S: DisplaySink> PreviewSession<S> {
    pub fn new(
        coalescer: RenderCoalescer,
        engine: Arc<dyn RenderEngine>,
        sink: S,
    ) -> Result<Self, SessionError> {
        let (sender, events) = mpsc::channel();
        let worker = RenderWorker::spawn(engine, sender.clone())?;
        Ok(Self {
            coalescer,
            sink,
            events,
            sender,
            live_editors: Arc::new(AtomicUsize::new(0)),
            worker,
            shutting_down: false,
            rejected: 0,
        })
    }

    pub fn editor(&self) -> EditorHandle {
        EditorHandle::new(self.sender.clone(), self.live_editors.clone())
    }

    pub fn coalescer(&self) -> &RenderCoalescer {
        &self.coalescer
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Edits refused so far (unknown filter names).
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Process events until shutdown has been requested (or every editor
    /// handle is gone), the queue is drained and the last render has
    /// completed, then hand back the sink.
    pub fn run(mut self) -> S {
        loop {
            let event = match self.events.try_recv() {
                Ok(event) => event,
                Err(_) if self.finished() => break,
                // The session holds a sender itself, so this only returns
                // once something is posted.
                Err(_) => match self.events.recv() {
                    Ok(event) => event,
                    Err(_) => break,
                },
            };
            self.handle(event);
        }
        log_info!("preview session finished: {:?}", self.coalescer.stats());
        let PreviewSession { sink, .. } = self;
        sink
    }

    /// Process everything queued so far, waiting for in-flight renders, until
    /// the queue is empty and no render is running.
    pub fn run_until_idle(&mut self) {
        loop {
            let event = if self.coalescer.is_idle() {
                match self.events.try_recv() {
                    Ok(event) => event,
                    Err(_) => return,
                }
            } else {
                match self.events.recv() {
                    Ok(event) => event,
                    Err(_) => return,
                }
            };
            self.handle(event);
        }
    }

    fn finished(&self) -> bool {
        self.coalescer.is_idle()
            && (self.shutting_down || self.live_editors.load(Ordering::SeqCst) == 0)
    }

    fn handle(&mut self, event: LaneEvent) {
        match event {
            LaneEvent::Edit(update) => {
                if self.shutting_down {
                    log_warn!("edit after shutdown ignored: {:?}", update);
                    return;
                }
                match self.coalescer.submit(update) {
                    Ok(Some(job)) => self.dispatch(job),
                    Ok(None) => {}
                    Err(e) => {
                        self.rejected += 1;
                        log_warn!("edit rejected: {}", e);
                    }
                }
            }
            LaneEvent::Rendered(completion) => {
                if let Some(job) = self.coalescer.complete(completion, &mut self.sink) {
                    self.dispatch(job);
                }
            }
            LaneEvent::SavePreset(path) => match self.coalescer.request() {
                Some(request) => match crate::io::save_preset(&request, &path) {
                    Ok(()) => log_info!("preset saved to {}", path.display()),
                    Err(e) => log_err!("saving preset {} failed: {}", path.display(), e),
                },
                None => log_warn!("no filter selected; preset {} not saved", path.display()),
            },
            LaneEvent::Shutdown => self.shutting_down = true,
            LaneEvent::EditorsGone => log_info!("all editors closed"),
        }
    }

    fn dispatch(&mut self, job: RenderJob) {
        if let Err(e) = self.worker.dispatch(job) {
            log_err!("{}", e);
            self.coalescer.abandon_in_flight();
        }
    }
}

impl<S: DisplaySink + Send + 'static> PreviewSession<S> {
    /// Run the display lane on its own thread; joining yields the sink.
    pub fn spawn(self) -> Result<JoinHandle<S>, SessionError> {
        thread::Builder::new()
            .name("display-lane".into())
            .spawn(move || self.run())
            .map_err(SessionError::Spawn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetLibrary;
    use crate::filter::{BuiltinCatalog, FilterCatalog};
    use crate::preview::RenderedImage;
    use crate::render::{CpuRenderEngine, FrameSpec};
    use image::Rgba;

    fn session() -> PreviewSession<Vec<RenderedImage>> {
        let catalog: Arc<dyn FilterCatalog> = Arc::new(BuiltinCatalog::new());
        let assets = AssetLibrary::builtin(32);
        let coalescer = RenderCoalescer::new(catalog.clone(), assets.first().clone());
        let engine = CpuRenderEngine::new(catalog, FrameSpec::square(32, Rgba([0, 0, 0, 255])));
        PreviewSession::new(coalescer, Arc::new(engine), Vec::new()).unwrap()
    }

    #[test]
    fn renders_selected_filter_until_idle() {
        let mut s = session();
        s.editor().select_filter("ColorInvert");
        s.run_until_idle();

        assert!(s.coalescer().is_idle());
        assert_eq!(s.sink().len(), 1);
        assert_eq!(s.sink()[0].filter, "ColorInvert");
        assert_eq!(s.sink()[0].pixels.dimensions(), (32, 32));
    }

    #[test]
    fn unknown_filter_is_rejected_and_nothing_renders() {
        let mut s = session();
        s.editor().select_filter("Sepia-ish");
        s.run_until_idle();
        assert_eq!(s.rejected(), 1);
        assert!(s.sink().is_empty());
    }

    #[test]
    fn run_drains_queued_edits_before_returning() {
        let s = session();
        let editor = s.editor();
        editor.select_filter("GaussianBlur");
        for r in 1..=5 {
            editor.set_param("inputRadius", ParamValue::Scalar(r as f32));
        }
        editor.shutdown();

        let frames = s.spawn().unwrap().join().unwrap();

        // At least the first render and at most one per edit; the final
        // frame always reflects the last edit.
        assert!(!frames.is_empty() && frames.len() <= 6);
        let sequences: Vec<u64> = frames.iter().map(|f| f.sequence).collect();
        let mut sorted = sequences.clone();
        sorted.sort();
        assert_eq!(sequences, sorted);
    }

    #[test]
    fn edits_after_shutdown_are_ignored() {
        let s = session();
        let editor = s.editor();
        editor.shutdown();
        editor.select_filter("ColorInvert");
        let frames = s.spawn().unwrap().join().unwrap();
        assert!(frames.is_empty());
    }

    #[test]
    fn save_preset_writes_current_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("look.fsp");
        let mut s = session();
        let editor = s.editor();
        editor.select_filter("Vignette");
        editor.set_param("inputIntensity", ParamValue::Scalar(0.75));
        editor.save_preset(&path);
        s.run_until_idle();

        let assets = AssetLibrary::builtin(8);
        let loaded = crate::io::load_preset(&path, &assets).unwrap();
        assert_eq!(loaded.filter, "Vignette");
        assert_eq!(
            loaded.params.get("inputIntensity"),
            Some(&ParamValue::Scalar(0.75))
        );
    }

    #[test]
    fn dropping_every_editor_drains_and_ends_the_lane() {
        let s = session();
        let editor = s.editor();
        let second = editor.clone();
        editor.select_filter("ColorInvert");
        second.set_param("inputRadius", ParamValue::Scalar(2.0));
        drop(editor);
        drop(second);

        let frames = s.spawn().unwrap().join().unwrap();
        assert!(!frames.is_empty());
        assert_eq!(frames.last().map(|f| f.filter.as_str()), Some("ColorInvert"));
    }

    #[test]
    fn blur_with_unbounded_radius_still_renders() {
        let mut s = session();
        let editor = s.editor();
        editor.select_filter("GaussianBlur");
        editor.set_param("inputRadius", ParamValue::Scalar(1.0e9));
        s.run_until_idle();
        editor.set_param("inputRadius", ParamValue::Scalar(f32::INFINITY));
        s.run_until_idle();

        // Default radius first, then one re-render per oversized edit.
        assert_eq!(s.sink().len(), 3);
        assert_eq!(
            s.coalescer().params().get("inputRadius"),
            Some(&ParamValue::Scalar(100.0))
        );
    }

    #[test]
    fn wrongly_typed_inputs_are_replaced_when_the_filter_is_selected() {
        let mut s = session();
        let editor = s.editor();
        editor.set_param("inputBackgroundImage", ParamValue::Scalar(3.0));
        editor.set_param("inputCenter", ParamValue::Scalar(5.0));
        editor.select_filter("SourceOverCompositing");
        s.run_until_idle();

        assert_eq!(s.sink().len(), 1);
        assert!(
            s.coalescer()
                .params()
                .get("inputBackgroundImage")
                .and_then(ParamValue::as_image)
                .is_some()
        );

        editor.select_filter("TwirlDistortion");
        s.run_until_idle();
        assert_eq!(
            s.coalescer().params().get("inputCenter"),
            Some(&ParamValue::Vector(vec![150.0, 150.0]))
        );
    }
}
